//! Main comparison API
//!
//! The [`Comparator`] is the entry point of the library: it pairs the DBC files
//! of two release folders, parses both versions of every bus and runs the diff
//! engine on each pair.

use crate::config::CompareConfig;
use crate::dbc::parse_dbc_file;
use crate::diff::{compare, ComparisonResult};
use crate::matcher::{match_buses, BusPair, SkippedFile};
use crate::model::Database;
use crate::types::{CompareError, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Both versions of one bus and their comparison
#[derive(Debug, Clone)]
pub struct BusComparison {
    pub pair: BusPair,
    pub old: Database,
    pub new: Database,
    pub result: ComparisonResult,
}

/// A bus whose files could not be loaded
#[derive(Debug)]
pub struct FailedBus {
    pub pair: BusPair,
    pub error: CompareError,
}

/// Outcome of comparing two folders
#[derive(Debug, Default)]
pub struct RunReport {
    /// Prefix -> file, old folder
    pub old_files: BTreeMap<String, PathBuf>,
    /// Prefix -> file, new folder
    pub new_files: BTreeMap<String, PathBuf>,
    /// Compared buses in pairing order
    pub comparisons: Vec<BusComparison>,
    /// Files that took no part in the comparison
    pub skipped: Vec<SkippedFile>,
    /// Buses whose files could not be read
    pub failed: Vec<FailedBus>,
}

/// Row counts of one bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusSummary {
    pub bus_name: String,
    pub total_rows: usize,
    pub differing_rows: usize,
}

/// Per-bus row counts plus the grand total
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub buses: Vec<BusSummary>,
    pub total_rows: usize,
    pub differing_rows: usize,
}

impl RunReport {
    /// True when no bus pair was found in the two folders
    pub fn nothing_to_compare(&self) -> bool {
        self.comparisons.is_empty() && self.failed.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        let buses: Vec<BusSummary> = self
            .comparisons
            .iter()
            .map(|c| {
                let summary = c.result.summary();
                BusSummary {
                    bus_name: c.pair.bus_name.clone(),
                    total_rows: summary.total_rows,
                    differing_rows: summary.differing_rows,
                }
            })
            .collect();

        RunSummary {
            total_rows: buses.iter().map(|b| b.total_rows).sum(),
            differing_rows: buses.iter().map(|b| b.differing_rows).sum(),
            buses,
        }
    }
}

/// The comparator - entry point for all comparison operations
pub struct Comparator {
    config: CompareConfig,
}

impl Comparator {
    pub fn new(config: CompareConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Read and parse one DBC file
    pub fn load_database(&self, path: &Path, bus_name: &str) -> Result<Database> {
        parse_dbc_file(path, bus_name, &self.config)
    }

    /// Compare two DBC files directly, bypassing the bus matcher
    ///
    /// # Example
    /// ```no_run
    /// use dbc_compare::{Comparator, CompareConfig};
    /// use std::path::Path;
    ///
    /// let comparator = Comparator::new(CompareConfig::default());
    /// let bus = comparator
    ///     .compare_files(Path::new("old/01_PT_a.dbc"), Path::new("new/01_PT_b.dbc"), "PT")
    ///     .unwrap();
    /// println!("{} differing rows", bus.result.summary().differing_rows);
    /// ```
    pub fn compare_files(&self, old: &Path, new: &Path, bus_name: &str) -> Result<BusComparison> {
        self.compare_pair(&BusPair {
            prefix: bus_name.to_string(),
            bus_name: bus_name.to_string(),
            old: old.to_path_buf(),
            new: new.to_path_buf(),
        })
    }

    /// Parse both files of a matched bus and compare them
    pub fn compare_pair(&self, pair: &BusPair) -> Result<BusComparison> {
        log::info!("[{}] Comparing {:?} -> {:?}", pair.bus_name, pair.old, pair.new);

        let old = self.load_database(&pair.old, &pair.bus_name)?;
        let new = self.load_database(&pair.new, &pair.bus_name)?;
        let result = compare(&old, &new);

        let summary = result.summary();
        log::info!(
            "[{}] {} rows, {} with differences",
            pair.bus_name,
            summary.total_rows,
            summary.differing_rows
        );

        Ok(BusComparison {
            pair: pair.clone(),
            old,
            new,
            result,
        })
    }

    /// Match the DBC files of two folders and compare every bus pair
    ///
    /// Only folder listing errors fail the run. A bus whose files cannot be
    /// read is reported in [`RunReport::failed`].
    pub fn compare_folders(&self, old_dir: &Path, new_dir: &Path) -> Result<RunReport> {
        let matched = match_buses(old_dir, new_dir, self.config.bus_segments)?;
        log::info!(
            "Matched {} buses ({} files skipped)",
            matched.pairs.len(),
            matched.skipped.len()
        );

        let outcomes: Vec<(BusPair, Result<BusComparison>)> = if self.config.parallel {
            matched
                .pairs
                .into_par_iter()
                .map(|pair| {
                    let outcome = self.compare_pair(&pair);
                    (pair, outcome)
                })
                .collect()
        } else {
            matched
                .pairs
                .into_iter()
                .map(|pair| {
                    let outcome = self.compare_pair(&pair);
                    (pair, outcome)
                })
                .collect()
        };

        let mut report = RunReport {
            old_files: matched.old_files,
            new_files: matched.new_files,
            skipped: matched.skipped,
            ..Default::default()
        };
        for (pair, outcome) in outcomes {
            match outcome {
                Ok(comparison) => report.comparisons.push(comparison),
                Err(error) => {
                    log::error!("[{}] Comparison failed: {}", pair.bus_name, error);
                    report.failed.push(FailedBus { pair, error });
                }
            }
        }

        Ok(report)
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(CompareConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const DBC: &str = "BO_ 256 Engine: 8 ECU1\n SG_ Rpm : 0|16@1+ (1,0) [0|8000] \"rpm\" ECU2\n";

    #[test]
    fn test_empty_folders() {
        let old = tempdir().unwrap();
        let new = tempdir().unwrap();
        let report = Comparator::default()
            .compare_folders(old.path(), new.path())
            .unwrap();
        assert!(report.nothing_to_compare());
        assert_eq!(report.summary(), RunSummary::default());
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let old = tempdir().unwrap();
        let new = tempdir().unwrap();
        for (i, bus) in ["PT", "BODY", "CHASSIS", "FD"].iter().enumerate() {
            let name = format!("{:02}_{}_x.dbc", i + 1, bus);
            fs::write(old.path().join(&name), DBC).unwrap();
            fs::write(new.path().join(&name), DBC.replace("0|16", "0|12")).unwrap();
        }

        let parallel = Comparator::default()
            .compare_folders(old.path(), new.path())
            .unwrap();
        let sequential = Comparator::new(CompareConfig::new().with_parallel(false))
            .compare_folders(old.path(), new.path())
            .unwrap();

        assert_eq!(parallel.summary(), sequential.summary());
        let summary = parallel.summary();
        let buses: Vec<&str> = summary
            .buses
            .iter()
            .map(|b| b.bus_name.as_str())
            .collect();
        assert_eq!(buses, vec!["PT", "BODY", "CHASSIS", "FD"]);
        assert_eq!(parallel.summary().total_rows, 4);
        assert_eq!(parallel.summary().differing_rows, 4);
    }

    #[test]
    fn test_unreadable_file_fails_only_its_bus() {
        let old = tempdir().unwrap();
        let new = tempdir().unwrap();
        fs::write(old.path().join("01_PT_a.dbc"), DBC).unwrap();
        fs::write(new.path().join("01_PT_b.dbc"), DBC).unwrap();
        fs::write(old.path().join("02_BODY_a.dbc"), DBC).unwrap();
        fs::write(new.path().join("02_BODY_b.dbc"), b"BO_ 1 X: 8 A\n\xff\n").unwrap();

        let comparator = Comparator::new(CompareConfig::new().with_strict_encoding(true));
        let report = comparator.compare_folders(old.path(), new.path()).unwrap();

        assert_eq!(report.comparisons.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].pair.bus_name, "BODY");
        assert!(matches!(report.failed[0].error, CompareError::Encoding { .. }));
        assert!(!report.nothing_to_compare());
    }

    #[test]
    fn test_compare_files() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old.dbc");
        let new = dir.path().join("new.dbc");
        fs::write(&old, DBC).unwrap();
        fs::write(&new, DBC).unwrap();

        let bus = Comparator::default().compare_files(&old, &new, "PT").unwrap();
        assert!(bus.result.is_empty());
        assert_eq!(bus.old.bus_name, "PT");
    }
}
