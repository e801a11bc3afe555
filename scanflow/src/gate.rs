//! Existence checks that decide whether a unit needs to run.
//!
//! Inputs are always checked before outputs: stale outputs from an earlier
//! partial batch must not hide inputs that have since gone missing.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What the gate decided for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Inputs are present and at least one output is missing.
    Proceed,
    /// One or more declared inputs do not exist.
    MissingInputs(BTreeSet<PathBuf>),
    /// Every declared output already exists.
    OutputsExist,
}

/// Read-only filesystem checks for declared inputs and outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistenceGate;

impl ExistenceGate {
    /// Creates a new gate.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns every path in `paths` that does not exist right now.
    pub async fn missing_inputs<P: AsRef<Path>>(&self, paths: &[P]) -> BTreeSet<PathBuf> {
        let mut missing = BTreeSet::new();
        for path in paths.iter().map(AsRef::as_ref) {
            if !path_exists(path).await {
                warn!(path = %path.display(), "Input doesn't exist");
                missing.insert(path.to_path_buf());
            }
        }
        missing
    }

    /// Returns true iff every path in `paths` exists.
    pub async fn all_outputs_exist<P: AsRef<Path>>(&self, paths: &[P]) -> bool {
        // check every path so the log lists all existing outputs
        let mut all = true;
        for path in paths.iter().map(AsRef::as_ref) {
            if path_exists(path).await {
                info!(path = %path.display(), "Output already exists");
            } else {
                all = false;
            }
        }
        all
    }

    /// Applies the missing-inputs-first policy.
    ///
    /// A stage that declares no outputs is never considered complete.
    pub async fn check<P: AsRef<Path>>(&self, inputs: &[P], outputs: &[P]) -> GateDecision {
        let missing = self.missing_inputs(inputs).await;
        if !missing.is_empty() {
            return GateDecision::MissingInputs(missing);
        }
        if !outputs.is_empty() && self.all_outputs_exist(outputs).await {
            return GateDecision::OutputsExist;
        }
        GateDecision::Proceed
    }
}

// Symlinked outputs (`ln -s` of a shared reference) count when the link
// itself exists, even if its target has moved. Checks go through tokio::fs
// so parallel subjects do not block a runtime worker.
async fn path_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("brain.nii.gz");
        let absent = dir.path().join("head.nii.gz");
        fs::write(&present, b"").unwrap();

        let missing = ExistenceGate::new().missing_inputs(&[present, absent.clone()]).await;

        assert_eq!(missing.len(), 1);
        assert!(missing.contains(&absent));
    }

    #[tokio::test]
    async fn test_all_outputs_exist() {
        let dir = tempfile::tempdir().unwrap();
        let csf = dir.path().join("csf.nii");
        let wm = dir.path().join("wm.nii");
        fs::write(&csf, b"").unwrap();

        let gate = ExistenceGate::new();
        assert!(!gate.all_outputs_exist(&[csf.clone(), wm.clone()]).await);

        fs::write(&wm, b"").unwrap();
        assert!(gate.all_outputs_exist(&[csf, wm]).await);
    }

    #[tokio::test]
    async fn test_missing_inputs_take_priority() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("brain.nii");
        fs::write(&output, b"").unwrap();

        let decision = ExistenceGate::new().check(&[dir.path().join("gone.nii")], &[output]).await;

        assert!(matches!(decision, GateDecision::MissingInputs(ref m) if m.len() == 1));
    }

    #[tokio::test]
    async fn test_no_outputs_always_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mprage.nii.gz");
        fs::write(&input, b"").unwrap();

        let decision = ExistenceGate::new().check(&[input], &[]).await;
        assert_eq!(decision, GateDecision::Proceed);
    }

    #[tokio::test]
    async fn test_dangling_symlink_counts_as_existing() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("standard.nii.gz");
        std::os::unix::fs::symlink(dir.path().join("nowhere"), &link).unwrap();

        assert!(ExistenceGate::new().all_outputs_exist(&[link]).await);
    }
}
