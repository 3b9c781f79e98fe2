//! DBC Compare Library
//!
//! A reusable library for comparing two releases of CAN database (DBC) files
//! bus by bus and categorizing every structural difference.
//!
//! # Architecture
//!
//! The core is a parse -> model -> diff -> categorize pipeline:
//! - [`dbc`] splits DBC text into records, resolves attributes and builds a [`Database`]
//! - [`diff`] compares two databases into a [`ComparisonResult`]
//! - [`matcher`] pairs the files of two folders by bus prefix
//! - [`comparator`] drives matching, parsing and diffing for whole folders
//!
//! The library does NOT:
//! - Validate DBC files against the full Vector grammar
//! - Merge or resolve conflicting versions
//! - Render or persist reports
//!
//! Report generation lives in the application layer (dbc-compare-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use dbc_compare::{Comparator, CompareConfig};
//! use std::path::Path;
//!
//! let config = CompareConfig::new().with_parallel(true);
//! let comparator = Comparator::new(config);
//!
//! let report = comparator
//!     .compare_folders(Path::new("EP1"), Path::new("EP2"))
//!     .unwrap();
//!
//! for bus in &report.comparisons {
//!     let summary = bus.result.summary();
//!     println!(
//!         "{}: {} new / {} removed / {} modified messages",
//!         bus.pair.bus_name,
//!         summary.new_messages,
//!         summary.removed_messages,
//!         summary.modified_messages
//!     );
//! }
//! ```

// Public modules
pub mod comparator;
pub mod config;
pub mod dbc;
pub mod diff;
pub mod matcher;
pub mod model;
pub mod types;

// Re-export main types for convenience
pub use comparator::{BusComparison, BusSummary, Comparator, FailedBus, RunReport, RunSummary};
pub use config::CompareConfig;
pub use dbc::attributes::{AttributeDefinition, AttributeDictionary, AttributeKind, AttributeScope};
pub use dbc::{parse_dbc_file, parse_str};
pub use diff::{
    compare, Column, ComparisonResult, ComparisonSummary, FieldChange, FullRow, MessageChange,
    MessageRef, RowSide, SignalChange, SignalRef,
};
pub use matcher::{extract_bus_prefix, match_buses, BusMatch, BusPair, SkipReason, SkippedFile, Side};
pub use model::{
    ByteOrder, Database, DatabaseStats, Diagnostic, DiagnosticKind, Message, MessageField, Signal,
    SignalField, ValueType,
};
pub use types::{CompareError, Result, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: an empty file parses into an empty database
        let comparator = Comparator::default();
        let db = parse_str("", "CAN", &comparator.config().dictionary);
        assert_eq!(db.stats().num_messages, 0);
        assert!(compare(&db, &db).is_empty());
    }
}
