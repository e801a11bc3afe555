//! Filesystem fixtures for pipeline tests.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::RootsConfig;
use crate::errors::ConfigError;
use crate::paths::Bindings;
use crate::pipeline::Pipeline;
use crate::stages::{CommandStep, StageSpec};

/// A directory tree with the four configured roots.
///
/// ```text
/// <root>/orig  <root>/out  <root>/reports  <root>/reference
/// ```
#[derive(Debug, Clone)]
pub struct ScratchLayout {
    root: PathBuf,
}

impl ScratchLayout {
    /// Creates the root directories under `root`.
    ///
    /// # Errors
    ///
    /// Returns any error from creating the directories.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let layout = Self { root: root.into() };
        for dir in [
            layout.orig_root(),
            layout.output_root(),
            layout.report_root(),
            layout.reference_root(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(layout)
    }

    /// Returns the base directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw data root.
    #[must_use]
    pub fn orig_root(&self) -> PathBuf {
        self.root.join("orig")
    }

    /// Output root.
    #[must_use]
    pub fn output_root(&self) -> PathBuf {
        self.root.join("out")
    }

    /// Report root.
    #[must_use]
    pub fn report_root(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Reference data root.
    #[must_use]
    pub fn reference_root(&self) -> PathBuf {
        self.root.join("reference")
    }

    /// Returns a config pointing at all four roots.
    #[must_use]
    pub fn roots_config(&self) -> RootsConfig {
        RootsConfig::new()
            .with_orig_root(self.orig_root())
            .with_output_root(self.output_root())
            .with_report_root(self.report_root())
            .with_reference_data_root(self.reference_root())
    }

    /// Returns the root bindings.
    ///
    /// # Errors
    ///
    /// Fails if the base directory is not valid UTF-8.
    pub fn bindings(&self) -> Result<Bindings, ConfigError> {
        self.roots_config().bindings()
    }

    /// Creates an empty file at `relative` under the base directory.
    ///
    /// # Errors
    ///
    /// Returns any error from creating the file or its parents.
    pub fn touch(&self, relative: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, b"")?;
        Ok(path)
    }
}

/// Skull strip then segment, with `touch` standing in for the imaging tools.
///
/// - `skullstrip`: `{orig_root}/<subject>/mprage.nii` -> `{output_root}/<subject>/brain.nii`
/// - `segment`: `brain.nii` -> `csf.nii`, `wm.nii`
#[must_use]
pub fn touch_pipeline() -> Pipeline {
    let skullstrip = StageSpec::new("skullstrip")
        .input("mprage", "{orig_root}/{subject}/mprage.nii")
        .output("brain", "{output_root}/{subject}/brain.nii")
        .work_dir("tmpdir", "{output_root}/{subject}/tmp")
        .step(CommandStep::new("touch {tmpdir}/scratch.nii").described("Skull stripping"))
        .command("touch {brain}")
        .cleanup("{tmpdir}")
        .report("skullstrip: {status}");

    let segment = StageSpec::new("segment")
        .input("brain", "{output_root}/{subject}/brain.nii")
        .output("csf", "{output_root}/{subject}/csf.nii")
        .output("wm", "{output_root}/{subject}/wm.nii")
        .command("touch {csf}")
        .command("touch {wm}")
        .report("segment: {status}");

    Pipeline::new("touch-anat", vec![skullstrip, segment])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_creates_roots() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::create(dir.path()).unwrap();

        assert!(layout.roots_config().validate(true).is_ok());
        let input = layout.touch("orig/A/mprage.nii").unwrap();
        assert!(input.is_file());
    }

    #[test]
    fn test_touch_pipeline_is_valid() {
        assert!(touch_pipeline().validate_with(&Bindings::new()).is_ok());
    }
}
