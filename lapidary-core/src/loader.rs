//! File access for `@include` and `@require`

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// A source file resolved by a [`SourceLoader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    /// Name used in diagnostics and for resolving nested includes
    pub name: String,
    pub text: String,
}

/// Resolves and reads included files
pub trait SourceLoader {
    /// Load `path` as referenced from the source named `from`
    fn load(&self, path: &str, from: &str) -> io::Result<LoadedSource>;
}

/// Loader over the file system
///
/// Relative paths are searched in the include directories first and then in
/// the directory of the including file.
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    include_dirs: Vec<PathBuf>,
}

impl FsLoader {
    pub fn new(include_dirs: Vec<PathBuf>) -> Self {
        Self { include_dirs }
    }

    fn candidates(&self, path: &str, from: &str) -> Vec<PathBuf> {
        let path = Path::new(path);
        if path.is_absolute() {
            return vec![path.to_path_buf()];
        }
        let mut candidates: Vec<PathBuf> = self.include_dirs.iter().map(|dir| dir.join(path)).collect();
        let base = Path::new(from).parent().unwrap_or_else(|| Path::new(""));
        candidates.push(base.join(path));
        candidates
    }
}

impl SourceLoader for FsLoader {
    fn load(&self, path: &str, from: &str) -> io::Result<LoadedSource> {
        let mut last_error = None;
        for candidate in self.candidates(path, from) {
            match std::fs::read_to_string(&candidate) {
                Ok(text) => {
                    tracing::debug!("Loaded {}", candidate.display());
                    return Ok(LoadedSource {
                        name: candidate.display().to_string(),
                        text,
                    });
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file")))
    }
}

/// In-memory loader, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.files.insert(name.into(), text.into());
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, path: &str, _from: &str) -> io::Result<LoadedSource> {
        self.files
            .get(path)
            .map(|text| LoadedSource {
                name: path.to_string(),
                text: text.clone(),
            })
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path} not found")))
    }
}
