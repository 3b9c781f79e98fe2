//! DBC file parser
//!
//! Parses Vector DBC files into a [`Database`]. Parsing is tolerant: anything
//! that cannot be understood is skipped and recorded as a diagnostic, so only
//! I/O and encoding problems fail.

pub mod attributes;
pub mod builder;
pub mod lexer;
pub mod resolver;

use crate::config::CompareConfig;
use crate::model::{Database, Diagnostic, DiagnosticKind};
use crate::types::{CompareError, Result};
use attributes::AttributeDictionary;
use builder::DatabaseBuilder;
use encoding_rs::WINDOWS_1252;
use lexer::Lexer;
use std::path::Path;

/// Parse DBC text into a database for `bus_name`
pub fn parse_str(text: &str, bus_name: &str, dictionary: &AttributeDictionary) -> Database {
    let mut lexer = Lexer::new(text);
    let mut db = DatabaseBuilder::new(dictionary)
        .with_bus_name(bus_name)
        .build(lexer.by_ref());

    if !lexer.skipped_lines().is_empty() {
        db.diagnostics.extend(lexer.skipped_lines().iter().map(|&line| Diagnostic {
            line,
            kind: DiagnosticKind::SkippedLine,
        }));
        db.diagnostics.sort_by_key(|d| d.line);
    }
    db
}

/// Read and parse a DBC file
pub fn parse_dbc_file(path: &Path, bus_name: &str, config: &CompareConfig) -> Result<Database> {
    log::info!("Parsing DBC file: {:?}", path);

    let bytes = std::fs::read(path).map_err(|source| CompareError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    // Try UTF-8 first, then fall back to Windows-1252
    let content = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) if config.strict_encoding => {
            return Err(CompareError::Encoding {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            log::warn!("DBC file {:?} is not UTF-8, decoding as Windows-1252", path);
            let (text, _, _) = WINDOWS_1252.decode(e.as_bytes());
            text.into_owned()
        }
    };

    let db = parse_str(&content, bus_name, &config.dictionary);
    let stats = db.stats();
    log::info!(
        "Parsed {} messages, {} signals from {:?} ({} diagnostics)",
        stats.num_messages,
        stats.num_signals,
        path,
        stats.num_diagnostics
    );
    for diagnostic in &db.diagnostics {
        log::debug!("{:?}: {}", path, diagnostic);
    }

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DBC: &str = "VERSION \"\"\n\nBU_: ECU1\n\nBO_ 256 Engine: 8 ECU1\n SG_ Rpm : 0|16@1+ (1,0) [0|8000] \"rpm\" Vector__XXX\n";

    #[test]
    fn test_parse_dbc_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(DBC.as_bytes()).unwrap();
        file.flush().unwrap();

        let db = parse_dbc_file(file.path(), "CAN1", &CompareConfig::default()).unwrap();
        assert_eq!(db.bus_name, "CAN1");
        assert_eq!(db.stats().num_signals, 1);
    }

    #[test]
    fn test_skipped_lines_become_diagnostics() {
        let text = format!("{}garbage here\n", DBC);
        let db = parse_str(&text, "CAN1", &AttributeDictionary::builtin());
        assert_eq!(
            db.diagnostics,
            vec![Diagnostic {
                line: 7,
                kind: DiagnosticKind::SkippedLine
            }]
        );
    }

    #[test]
    fn test_windows1252_fallback_and_strict_encoding() {
        let mut bytes = DBC.as_bytes().to_vec();
        bytes.extend_from_slice(b"CM_ BO_ 256 \"Motordrehzahl \xB0C \x80\";\n");
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let db = parse_dbc_file(file.path(), "CAN1", &CompareConfig::default()).unwrap();
        assert_eq!(db.message(256).unwrap().comment, "Motordrehzahl \u{B0}C \u{20AC}");

        let strict = CompareConfig::default().with_strict_encoding(true);
        let err = parse_dbc_file(file.path(), "CAN1", &strict).unwrap_err();
        assert!(matches!(err, CompareError::Encoding { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = parse_dbc_file(Path::new("/nonexistent/x.dbc"), "X", &CompareConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompareError::FileRead { .. }));
    }

    #[test]
    fn test_reparse_is_identical() {
        let dictionary = AttributeDictionary::builtin();
        assert_eq!(
            parse_str(DBC, "CAN1", &dictionary),
            parse_str(DBC, "CAN1", &dictionary)
        );
    }
}
