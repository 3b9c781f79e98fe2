//! Bus matcher
//!
//! Pairs the DBC files of an old and a new release folder by their bus prefix.
//! File names follow `<index>_<BUS_NAME>_<free text>.dbc`, e.g.
//! `01_CAN_CH1_Powertrain_v3.dbc` has the prefix `01_CAN_CH1` and the bus name
//! `CAN_CH1`.

use crate::types::{CompareError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Folder a file was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Old,
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Old => write!(f, "old"),
            Side::New => write!(f, "new"),
        }
    }
}

/// Why a file takes no part in the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Bus exists only in the old folder
    OnlyInOld,
    /// Bus exists only in the new folder
    OnlyInNew,
    /// File name carries no bus prefix
    NoBusPrefix,
    /// Another file in the same folder already claimed the prefix
    DuplicatePrefix,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OnlyInOld => write!(f, "only in old version"),
            SkipReason::OnlyInNew => write!(f, "only in new version"),
            SkipReason::NoBusPrefix => write!(f, "no bus prefix in file name"),
            SkipReason::DuplicatePrefix => write!(f, "bus prefix already used by another file"),
        }
    }
}

/// Old and new file of one bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusPair {
    /// `<index>_<BUS_NAME>`
    pub prefix: String,
    pub bus_name: String,
    pub old: PathBuf,
    pub new: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub side: Side,
    pub path: PathBuf,
    pub prefix: Option<String>,
    pub reason: SkipReason,
}

impl SkippedFile {
    /// Bus name if the file had a prefix, otherwise the file name
    pub fn label(&self) -> String {
        match &self.prefix {
            Some(prefix) => bus_name(prefix).to_string(),
            None => file_name(&self.path),
        }
    }
}

/// Result of matching two folders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusMatch {
    /// Prefix -> file, old folder
    pub old_files: BTreeMap<String, PathBuf>,
    /// Prefix -> file, new folder
    pub new_files: BTreeMap<String, PathBuf>,
    /// Matched buses in prefix order
    pub pairs: Vec<BusPair>,
    pub skipped: Vec<SkippedFile>,
}

/// Extract the bus prefix of a DBC file name
///
/// After the numeric index, the bus name is the longest run of segments
/// without lower-case letters, leaving at least one segment for the free text.
/// A release tag such as `EP2`, `V3` or `SW10` ends the bus name.
/// `bus_segments` fixes the number of bus name segments instead.
pub fn extract_bus_prefix(file_name: &str, bus_segments: Option<usize>) -> Option<String> {
    let stem = strip_dbc_extension(file_name).unwrap_or(file_name);
    let segments: Vec<&str> = stem.split('_').collect();

    let index = segments.first()?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let rest = &segments[1..];
    if rest.is_empty() {
        return None;
    }

    let count = match bus_segments {
        Some(n) if n == 0 || n > rest.len() => return None,
        Some(n) => n,
        None => {
            let limit = if rest.len() > 1 { rest.len() - 1 } else { 1 };
            rest.iter()
                .take(limit)
                .take_while(|s| {
                    !s.is_empty() && !s.chars().any(char::is_lowercase) && !is_release_tag(s)
                })
                .count()
                .max(1)
        }
    };

    if rest[..count].iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments[..=count].join("_"))
}

/// `EP1`, `V3`, `R2.1`, `SW10`: a version tag, never part of a bus name
fn is_release_tag(segment: &str) -> bool {
    ["EP", "SW", "V", "R"].iter().any(|tag| {
        segment
            .strip_prefix(tag)
            .map(|version| {
                version.starts_with(|c: char| c.is_ascii_digit())
                    && version.chars().all(|c| c.is_ascii_digit() || c == '.')
            })
            .unwrap_or(false)
    })
}

/// Bus name of a prefix (the prefix without its index)
pub fn bus_name(prefix: &str) -> &str {
    prefix.split_once('_').map(|(_, name)| name).unwrap_or(prefix)
}

/// List the `.dbc` files of a folder, sorted by file name
pub fn find_dbc_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CompareError::NotADirectory(dir.to_path_buf()));
    }
    let entries = std::fs::read_dir(dir).map_err(|source| CompareError::FolderRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CompareError::FolderRead {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let name = file_name(&path);
        if name.starts_with("~$") || strip_dbc_extension(&name).is_none() || !path.is_file() {
            continue;
        }
        files.push(path);
    }

    files.sort_by_key(|p| file_name(p));
    log::debug!("Found {} DBC files in {:?}", files.len(), dir);
    Ok(files)
}

/// Pair the DBC files of two folders by bus prefix
pub fn match_buses(old_dir: &Path, new_dir: &Path, bus_segments: Option<usize>) -> Result<BusMatch> {
    let mut result = BusMatch::default();

    let (old_files, mut skipped) = index_folder(old_dir, Side::Old, bus_segments)?;
    let (new_files, new_skipped) = index_folder(new_dir, Side::New, bus_segments)?;
    skipped.extend(new_skipped);

    let mut prefixes: Vec<&String> = old_files.keys().chain(new_files.keys()).collect();
    prefixes.sort();
    prefixes.dedup();

    for prefix in prefixes {
        match (old_files.get(prefix), new_files.get(prefix)) {
            (Some(old), Some(new)) => result.pairs.push(BusPair {
                prefix: prefix.clone(),
                bus_name: bus_name(prefix).to_string(),
                old: old.clone(),
                new: new.clone(),
            }),
            (Some(old), None) => {
                log::info!("[{}] Only in old version: {}", bus_name(prefix), file_name(old));
                skipped.push(SkippedFile {
                    side: Side::Old,
                    path: old.clone(),
                    prefix: Some(prefix.clone()),
                    reason: SkipReason::OnlyInOld,
                });
            }
            (None, Some(new)) => {
                log::info!("[{}] Only in new version: {}", bus_name(prefix), file_name(new));
                skipped.push(SkippedFile {
                    side: Side::New,
                    path: new.clone(),
                    prefix: Some(prefix.clone()),
                    reason: SkipReason::OnlyInNew,
                });
            }
            (None, None) => {}
        }
    }

    result.old_files = old_files;
    result.new_files = new_files;
    result.skipped = skipped;
    Ok(result)
}

fn index_folder(
    dir: &Path,
    side: Side,
    bus_segments: Option<usize>,
) -> Result<(BTreeMap<String, PathBuf>, Vec<SkippedFile>)> {
    let mut files = BTreeMap::new();
    let mut skipped = Vec::new();

    for path in find_dbc_files(dir)? {
        let prefix = extract_bus_prefix(&file_name(&path), bus_segments);
        let reason = match &prefix {
            None => SkipReason::NoBusPrefix,
            Some(prefix) if files.contains_key(prefix) => SkipReason::DuplicatePrefix,
            Some(prefix) => {
                files.insert(prefix.clone(), path);
                continue;
            }
        };
        log::warn!("Ignoring {} file {:?}: {}", side, path, reason);
        skipped.push(SkippedFile {
            side,
            path,
            prefix,
            reason,
        });
    }
    Ok((files, skipped))
}

fn strip_dbc_extension(name: &str) -> Option<&str> {
    let split = name.len().checked_sub(4)?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (stem, ext) = name.split_at(split);
    ext.eq_ignore_ascii_case(".dbc").then_some(stem)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_extract_bus_prefix() {
        assert_eq!(
            extract_bus_prefix("01_CAN_CH1_Powertrain_v3.dbc", None).as_deref(),
            Some("01_CAN_CH1")
        );
        assert_eq!(
            extract_bus_prefix("02_Body_2024.dbc", None).as_deref(),
            Some("02_Body")
        );
        assert_eq!(extract_bus_prefix("03_FD.DBC", None).as_deref(), Some("03_FD"));
        // the last segment is always free text
        assert_eq!(
            extract_bus_prefix("04_CAN_CH2_EP2.dbc", None).as_deref(),
            Some("04_CAN_CH2")
        );
        // release tags end the bus name
        assert_eq!(
            extract_bus_prefix("01_PT_EP1_Release.dbc", None).as_deref(),
            Some("01_PT")
        );
        assert_eq!(
            extract_bus_prefix("01_CAN_CH1_V3_FINAL.dbc", None).as_deref(),
            Some("01_CAN_CH1")
        );
        assert_eq!(
            extract_bus_prefix("02_BODY_SW10_R2.1_x.dbc", None).as_deref(),
            Some("02_BODY")
        );
        assert_eq!(extract_bus_prefix("Powertrain.dbc", None), None);
        assert_eq!(extract_bus_prefix("05__x.dbc", None), None);
    }

    #[test]
    fn test_fixed_bus_segments() {
        assert_eq!(
            extract_bus_prefix("01_CAN_CH1_EP2_V3.dbc", Some(1)).as_deref(),
            Some("01_CAN")
        );
        assert_eq!(
            extract_bus_prefix("01_CAN_CH1_EP2_V3.dbc", Some(3)).as_deref(),
            Some("01_CAN_CH1_EP2")
        );
        assert_eq!(extract_bus_prefix("01_CAN.dbc", Some(2)), None);
    }

    #[test]
    fn test_bus_name() {
        assert_eq!(bus_name("01_CAN_CH1"), "CAN_CH1");
        assert_eq!(bus_name("CAN"), "CAN");
    }

    #[test]
    fn test_find_dbc_files_filters() {
        let dir = tempdir().unwrap();
        for name in ["02_B_x.dbc", "01_A_x.DBC", "~$01_A_x.dbc", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("03_C_dir.dbc")).unwrap();

        let names: Vec<String> = find_dbc_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| file_name(p))
            .collect();
        assert_eq!(names, vec!["01_A_x.DBC", "02_B_x.dbc"]);
    }

    #[test]
    fn test_match_buses() {
        let old = tempdir().unwrap();
        let new = tempdir().unwrap();
        for name in ["01_PT_old.dbc", "02_BODY_old.dbc", "misc.dbc"] {
            fs::write(old.path().join(name), "").unwrap();
        }
        for name in ["01_PT_new.dbc", "01_PT_copy.dbc", "03_CHASSIS_new.dbc"] {
            fs::write(new.path().join(name), "").unwrap();
        }

        let matched = match_buses(old.path(), new.path(), None).unwrap();

        assert_eq!(matched.pairs.len(), 1);
        assert_eq!(matched.pairs[0].bus_name, "PT");
        // sorted by file name: 01_PT_copy.dbc claims the prefix first
        assert_eq!(file_name(&matched.pairs[0].new), "01_PT_copy.dbc");

        let reasons: Vec<(Side, SkipReason)> =
            matched.skipped.iter().map(|s| (s.side, s.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (Side::Old, SkipReason::NoBusPrefix),
                (Side::New, SkipReason::DuplicatePrefix),
                (Side::Old, SkipReason::OnlyInOld),
                (Side::New, SkipReason::OnlyInNew),
            ]
        );
        assert_eq!(matched.skipped[3].label(), "CHASSIS");
    }

    #[test]
    fn test_match_release_tagged_names() {
        let old = tempdir().unwrap();
        let new = tempdir().unwrap();
        for name in ["01_PT_EP1_Release.dbc", "02_CAN_CH1_EP1_Release.dbc"] {
            fs::write(old.path().join(name), "").unwrap();
        }
        for name in ["01_PT_EP2_Release.dbc", "02_CAN_CH1_EP2_Release.dbc"] {
            fs::write(new.path().join(name), "").unwrap();
        }

        let matched = match_buses(old.path(), new.path(), None).unwrap();

        let buses: Vec<&str> = matched.pairs.iter().map(|p| p.bus_name.as_str()).collect();
        assert_eq!(buses, vec!["PT", "CAN_CH1"]);
        assert_eq!(file_name(&matched.pairs[1].new), "02_CAN_CH1_EP2_Release.dbc");
        assert!(matched.skipped.is_empty());
    }

    #[test]
    fn test_missing_folder() {
        let dir = tempdir().unwrap();
        let err = match_buses(&dir.path().join("nope"), dir.path(), None).unwrap_err();
        assert!(matches!(err, CompareError::NotADirectory(_)));
    }
}
