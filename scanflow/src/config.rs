//! Root directory configuration.
//!
//! Roots come from an optional JSON file and are then overridden by
//! environment variables. The result is validated once at startup and
//! handed to the executor as template bindings.

use crate::errors::ConfigError;
use crate::paths::Bindings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SCANFLOW_CONFIG";

/// Binding name for the original data root.
pub const ORIG_ROOT: &str = "orig_root";
/// Binding name for the processed output root.
pub const OUTPUT_ROOT: &str = "output_root";
/// Binding name for the report root.
pub const REPORT_ROOT: &str = "report_root";
/// Binding name for the reference data root.
pub const REFERENCE_ROOT: &str = "reference_root";

struct RootField {
    key: &'static str,
    env_var: &'static str,
    binding: &'static str,
}

static FIELDS: [RootField; 4] = [
    RootField {
        key: "origRoot",
        env_var: "SCANFLOW_ORIG_ROOT",
        binding: ORIG_ROOT,
    },
    RootField {
        key: "outputRoot",
        env_var: "SCANFLOW_OUTPUT_ROOT",
        binding: OUTPUT_ROOT,
    },
    RootField {
        key: "reportRoot",
        env_var: "SCANFLOW_REPORT_ROOT",
        binding: REPORT_ROOT,
    },
    RootField {
        key: "referenceDataRoot",
        env_var: "SCANFLOW_REFERENCE_ROOT",
        binding: REFERENCE_ROOT,
    },
];

/// The directories every pipeline resolves its paths against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsConfig {
    /// Raw scanner data.
    #[serde(default)]
    pub orig_root: Option<PathBuf>,
    /// Processed data.
    #[serde(default)]
    pub output_root: Option<PathBuf>,
    /// Generated reports.
    #[serde(default)]
    pub report_root: Option<PathBuf>,
    /// Standard templates and atlases; only needed by registration stages.
    #[serde(default)]
    pub reference_data_root: Option<PathBuf>,
}

impl RootsConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the original data root.
    #[must_use]
    pub fn with_orig_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.orig_root = Some(path.into());
        self
    }

    /// Sets the output root.
    #[must_use]
    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = Some(path.into());
        self
    }

    /// Sets the report root.
    #[must_use]
    pub fn with_report_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_root = Some(path.into());
        self
    }

    /// Sets the reference data root.
    #[must_use]
    pub fn with_reference_data_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_data_root = Some(path.into());
        self
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::File`] if the config file cannot be read.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(file, |name| std::env::var(name).ok())
    }

    /// Loads the configuration using `lookup` for environment variables.
    ///
    /// An explicit `file` wins over `SCANFLOW_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::File`] if the config file cannot be read.
    pub fn load_with<F>(file: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| lookup(CONFIG_ENV).map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        for field in &FIELDS {
            if let Some(value) = lookup(field.env_var).filter(|v| !v.is_empty()) {
                debug!(key = field.key, env_var = field.env_var, "Root taken from environment");
                *config.slot_mut(field.binding) = Some(PathBuf::from(value));
            }
        }

        Ok(config)
    }

    /// Reads a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::File`] on I/O or parse failure.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn slot(&self, binding: &str) -> Option<&PathBuf> {
        match binding {
            ORIG_ROOT => self.orig_root.as_ref(),
            OUTPUT_ROOT => self.output_root.as_ref(),
            REPORT_ROOT => self.report_root.as_ref(),
            _ => self.reference_data_root.as_ref(),
        }
    }

    fn slot_mut(&mut self, binding: &str) -> &mut Option<PathBuf> {
        match binding {
            ORIG_ROOT => &mut self.orig_root,
            OUTPUT_ROOT => &mut self.output_root,
            REPORT_ROOT => &mut self.report_root,
            _ => &mut self.reference_data_root,
        }
    }

    /// Checks the original, output and report roots, plus the reference
    /// root when `needs_reference` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRoot`] for an unset root and
    /// [`ConfigError::RootNotFound`] for one that is not a directory.
    pub fn validate(&self, needs_reference: bool) -> Result<(), ConfigError> {
        for field in &FIELDS {
            let required = field.binding != REFERENCE_ROOT || needs_reference;
            match self.slot(field.binding) {
                None if required => {
                    return Err(ConfigError::MissingRoot {
                        key: field.key.to_string(),
                        env_var: field.env_var.to_string(),
                    })
                }
                None => {}
                Some(path) if !path.is_dir() => {
                    return Err(ConfigError::RootNotFound {
                        key: field.key.to_string(),
                        path: path.clone(),
                    })
                }
                Some(path) => {
                    root_str(field, path)?;
                }
            }
        }
        Ok(())
    }

    /// Returns the configured roots as template bindings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonUtf8Root`] for a root that is not valid
    /// UTF-8; substituting a lossy rendering would point at another path.
    pub fn bindings(&self) -> Result<Bindings, ConfigError> {
        let mut bindings = Bindings::new();
        for field in &FIELDS {
            if let Some(path) = self.slot(field.binding) {
                bindings.insert(field.binding, root_str(field, path)?);
            }
        }
        Ok(bindings)
    }

    /// Returns every binding name a root may supply.
    pub fn binding_names() -> impl Iterator<Item = &'static str> {
        FIELDS.iter().map(|field| field.binding)
    }
}

fn root_str<'a>(field: &RootField, path: &'a Path) -> Result<&'a str, ConfigError> {
    path.to_str().ok_or_else(|| ConfigError::NonUtf8Root {
        key: field.key.to_string(),
        path: path.to_path_buf(),
    })
}

/// Parses `key=value` pipeline variable assignments.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidVariable`] for an assignment without `=`
/// or with a key that is not a placeholder name.
pub fn parse_variables<S: AsRef<str>>(assignments: &[S]) -> Result<Bindings, ConfigError> {
    let mut bindings = Bindings::new();
    for assignment in assignments {
        let assignment = assignment.as_ref();
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(ConfigError::InvalidVariable(assignment.to_string()));
        };
        let key = key.trim();
        let valid = key
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(ConfigError::InvalidVariable(assignment.to_string()));
        }
        bindings.insert(key, value);
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scanflow.json");
        std::fs::write(
            &file,
            r#"{"origRoot": "/data/orig", "outputRoot": "/data/out", "reportRoot": "/data/reports"}"#,
        )
        .unwrap();

        let config =
            RootsConfig::load_with(Some(file.as_path()), env(&[("SCANFLOW_OUTPUT_ROOT", "/scratch/out")]))
                .unwrap();

        assert_eq!(config.orig_root, Some(PathBuf::from("/data/orig")));
        assert_eq!(config.output_root, Some(PathBuf::from("/scratch/out")));
        assert_eq!(config.reference_data_root, None);
    }

    #[test]
    fn test_config_file_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("roots.json");
        std::fs::write(&file, r#"{"reportRoot": "/reports"}"#).unwrap();

        let config = RootsConfig::load_with(
            None,
            env(&[("SCANFLOW_CONFIG", file.to_str().unwrap())]),
        )
        .unwrap();

        assert_eq!(config.report_root, Some(PathBuf::from("/reports")));
    }

    #[test]
    fn test_unreadable_file() {
        let err = RootsConfig::load_with(Some(Path::new("/no/such/scanflow.json")), env(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::File { .. }));
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let missing = RootsConfig::new().with_orig_root(&root).with_output_root(&root);
        let err = missing.validate(false).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRoot {
                key: "reportRoot".into(),
                env_var: "SCANFLOW_REPORT_ROOT".into()
            }
        );
        assert!(err.is_missing_root());

        let complete = missing.with_report_root(&root);
        assert!(complete.validate(false).is_ok());
        assert!(complete.validate(true).is_err());

        let absent = complete.with_reference_data_root(root.join("atlases"));
        assert!(matches!(
            absent.validate(true).unwrap_err(),
            ConfigError::RootNotFound { ref key, .. } if key == "referenceDataRoot"
        ));
    }

    #[test]
    fn test_bindings() {
        let config = RootsConfig::new()
            .with_orig_root("/orig")
            .with_output_root("/out");
        let bindings = config.bindings().unwrap();

        assert_eq!(bindings.get(ORIG_ROOT), Some("/orig"));
        assert_eq!(bindings.get(OUTPUT_ROOT), Some("/out"));
        assert!(!bindings.contains(REPORT_ROOT));
        assert_eq!(RootsConfig::binding_names().count(), 4);
    }

    #[test]
    fn test_non_utf8_root_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join(OsStr::from_bytes(b"sub\xff"));
        std::fs::create_dir(&bad).unwrap();
        let config = RootsConfig::new()
            .with_orig_root(&bad)
            .with_output_root(dir.path())
            .with_report_root(dir.path());

        assert!(matches!(
            config.validate(false).unwrap_err(),
            ConfigError::NonUtf8Root { ref key, .. } if key == "origRoot"
        ));
        assert!(matches!(
            config.bindings().unwrap_err(),
            ConfigError::NonUtf8Root { .. }
        ));
    }

    #[test]
    fn test_parse_variables() {
        let vars = parse_variables(&["fwhm=6", "scan=movie", "expr=a=b"]).unwrap();
        assert_eq!(vars.get("fwhm"), Some("6"));
        assert_eq!(vars.get("expr"), Some("a=b"));

        assert!(parse_variables(&["fwhm"]).is_err());
        assert!(parse_variables(&["6x=1"]).is_err());
    }
}
