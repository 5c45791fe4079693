//! Configuration parsing for the `lapidary` binary.

use lapidary_core::{CompileOptions, DEFAULT_WIDTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG: &str = "lapidary.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Settings from `lapidary.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_width")]
    pub width: usize,

    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,

    /// Load the built-in stylesheet before each document
    #[serde(default = "default_true")]
    pub prelude: bool,

    /// Force CR LF line ends
    #[serde(default)]
    pub crlf: bool,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_width() -> usize {
    DEFAULT_WIDTH
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: default_width(),
            include_dirs: Vec::new(),
            prelude: true,
            crlf: false,
            config_path: None,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Explicit config file, else `lapidary.yml` if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG).is_file() => Self::from_file(DEFAULT_CONFIG),
            None => Ok(Self::default()),
        }
    }

    /// Include directories, relative ones taken from the config file's directory
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        self.include_dirs.iter().map(|dir| self.resolve_path(dir)).collect()
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_path.as_deref().and_then(Path::parent) {
            Some(parent) => parent.join(path),
            None => path.to_path_buf(),
        }
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            width: self.width,
            prelude: self.prelude,
            include_dirs: self.include_dirs(),
            crlf: self.crlf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_fields_missing() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.width, 72);
        assert!(config.prelude);
        assert!(!config.crlf);
        assert!(config.include_dirs.is_empty());
    }

    #[test]
    fn test_include_dirs_resolve_against_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lapidary.yml");
        fs::write(&path, "width: 60\ninclude_dirs: [lib, /abs/inc]\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.width, 60);
        assert_eq!(
            config.include_dirs(),
            vec![dir.path().join("lib"), PathBuf::from("/abs/inc")]
        );
        assert_eq!(config.compile_options().width, 60);
    }

    #[test]
    fn test_bad_yaml_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lapidary.yml");
        fs::write(&path, "width: [not a number").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::ParseError(_))));
    }
}
