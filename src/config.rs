//! Driver configuration.
//!
//! Options come from an optional `wmlsc.toml`; command-line flags are
//! applied on top by the caller.
//!
//! ```toml
//! [compiler]
//! use_latin1_strings = true
//!
//! [compiler.optimizer]
//! dead_code = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use wmlsc_compiler::CompilerOptions;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "wmlsc.toml";

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compiler options
    pub compiler: CompilerOptions,
    /// Extension given to output files when `-o` is absent
    pub output_extension: Option<String>,
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicit path must exist. Without one, `wmlsc.toml` in the working
    /// directory is used if present, else the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parses a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Output extension, `wmlsc` unless configured.
    pub fn output_extension(&self) -> &str {
        self.output_extension.as_deref().unwrap_or("wmlsc")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.compiler.use_latin1_strings);
        assert!(config.compiler.optimizer.dead_code);
        assert_eq!(config.output_extension(), "wmlsc");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "output_extension = \"wmlc\"\n\n[compiler]\nuse_latin1_strings = true\n\n[compiler.optimizer]\ndead_code = false"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.compiler.use_latin1_strings);
        assert!(!config.compiler.optimizer.dead_code);
        assert!(config.compiler.optimizer.peephole);
        assert_eq!(config.output_extension(), "wmlc");
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[compiler]\nuse_latin1_strings = \"yes\"").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("invalid config"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(Some(&missing)).is_err());
    }
}
