//! Removal of intermediate files after a unit's commands.

use crate::errors::CleanupError;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// What a cleanup pass did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Paths that were removed.
    pub removed: Vec<PathBuf>,
    /// Paths that could not be removed.
    pub errors: Vec<CleanupError>,
}

/// A set of resolved cleanup entries for one unit.
///
/// Entries are plain paths, or paths whose last component contains `*` or
/// `?` wildcards. Directories are removed recursively. Absent entries are
/// ignored and failures are logged, never propagated.
#[derive(Debug, Clone)]
pub struct CleanupScope {
    entries: Vec<PathBuf>,
}

impl CleanupScope {
    /// Creates a scope over resolved cleanup entries.
    #[must_use]
    pub fn new(entries: Vec<PathBuf>) -> Self {
        Self { entries }
    }

    /// Returns true if there is nothing to clean.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub async fn run(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for entry in &self.entries {
            let targets = match expand(entry).await {
                Ok(targets) => targets,
                Err(err) => {
                    report.errors.push(err);
                    continue;
                }
            };
            for target in targets {
                match remove(&target).await {
                    Ok(true) => {
                        debug!(path = %target.display(), "Removed intermediate");
                        report.removed.push(target);
                    }
                    Ok(false) => {}
                    Err(err) => report.errors.push(err),
                }
            }
        }

        for err in &report.errors {
            warn!(path = %err.path.display(), error = %err.message, "Cleanup failed");
        }

        report
    }
}

fn has_wildcard(name: &str) -> bool {
    name.contains(['*', '?'])
}

fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

async fn expand(entry: &Path) -> Result<Vec<PathBuf>, CleanupError> {
    let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
        return Ok(vec![entry.to_path_buf()]);
    };
    if !has_wildcard(name) {
        return Ok(vec![entry.to_path_buf()]);
    }

    let parent = entry
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let pattern = wildcard_regex(name).map_err(|e| CleanupError::new(entry, e.to_string()))?;

    let mut dir = match fs::read_dir(parent).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CleanupError::new(entry, e.to_string())),
    };

    let mut matches = Vec::new();
    loop {
        match dir.next_entry().await {
            Ok(Some(item)) => {
                if item.file_name().to_str().is_some_and(|n| pattern.is_match(n)) {
                    matches.push(item.path());
                }
            }
            Ok(None) => break,
            Err(e) => return Err(CleanupError::new(entry, e.to_string())),
        }
    }
    matches.sort();
    Ok(matches)
}

// Ok(false) when the path was already gone.
async fn remove(path: &Path) -> Result<bool, CleanupError> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(CleanupError::new(path, e.to_string())),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CleanupError::new(path, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[tokio::test]
    async fn test_removes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tmp_brain.nii.gz");
        let subdir = dir.path().join("segment");
        stdfs::write(&file, b"").unwrap();
        stdfs::create_dir_all(subdir.join("nested")).unwrap();
        stdfs::write(subdir.join("nested/fast_seg.nii.gz"), b"").unwrap();

        let report = CleanupScope::new(vec![file.clone(), subdir.clone()]).run().await;

        assert_eq!(report.removed.len(), 2);
        assert!(report.errors.is_empty());
        assert!(!file.exists());
        assert!(!subdir.exists());
    }

    #[tokio::test]
    async fn test_absent_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let report = CleanupScope::new(vec![
            dir.path().join("never_created.nii"),
            dir.path().join("missing_dir/fast*"),
        ])
        .run()
        .await;

        assert!(report.removed.is_empty());
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_wildcard_in_last_component() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["fast_pve_0.nii.gz", "fast_pve_1.nii.gz", "fast_seg.nii.gz", "csf_mask.nii.gz"] {
            stdfs::write(dir.path().join(name), b"").unwrap();
        }

        let report = CleanupScope::new(vec![dir.path().join("fast_pve_?.nii.gz")])
            .run()
            .await;
        assert_eq!(report.removed.len(), 2);

        let report = CleanupScope::new(vec![dir.path().join("fast*")]).run().await;
        assert_eq!(report.removed, vec![dir.path().join("fast_seg.nii.gz")]);
        assert!(dir.path().join("csf_mask.nii.gz").exists());
    }

    #[test]
    fn test_wildcard_regex_escapes_dots() {
        let re = wildcard_regex("tmp_*.nii").unwrap();
        assert!(re.is_match("tmp_brain.nii"));
        assert!(!re.is_match("tmp_brainXnii"));
        assert!(!re.is_match("tmp_brain.nii.gz"));
    }
}
