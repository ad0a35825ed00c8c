//! Where module text comes from.
//!
//! The core only needs two things from the outside world: the text of a named
//! module, and the list of module identifiers matching a pattern. Both are
//! traits here, with a filesystem and an in-memory implementation.

use rustc_hash::FxHashMap;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Module not found: {id}")]
    NotFound { id: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

type Opener = dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync;

/// A readable resource with a path, backed by a file or by memory
#[derive(Clone)]
pub struct VirtualFile {
    path: String,
    opener: Arc<Opener>,
}

impl VirtualFile {
    /// A file on disk, opened on every read
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display = path.to_string_lossy().into_owned();
        Self {
            path: display,
            opener: Arc::new(move || {
                let file = std::fs::File::open(&path)?;
                Ok(Box::new(file) as Box<dyn Read + Send>)
            }),
        }
    }

    /// A resource whose content is already in memory
    pub fn from_memory(path: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        let content: Arc<str> = content.into();
        Self {
            path: path.into(),
            opener: Arc::new(move || {
                let bytes = content.as_bytes().to_vec();
                Ok(Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>)
            }),
        }
    }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        (self.opener)()
    }

    pub fn read_to_string(&self) -> Result<String, SourceError> {
        let mut text = String::new();
        self.open()
            .and_then(|mut reader| reader.read_to_string(&mut text))
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(text)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        crate::module::file_name(&self.path)
    }
}

impl fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Looks up a module by identifier
pub trait SourceProvider: Send + Sync {
    fn fetch(&self, id: &str) -> Result<VirtualFile, SourceError>;

    fn read(&self, id: &str) -> Result<String, SourceError> {
        self.fetch(id)?.read_to_string()
    }
}

/// Lists the module identifiers matching a glob-like pattern
pub trait ModuleEnumerator: Send + Sync {
    /// Matching identifiers, sorted and without duplicates
    fn enumerate(&self, pattern: &str) -> Result<Vec<String>, SourceError>;
}

/// Modules stored under a directory, identified by `/`-separated relative paths
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a module identifier
    pub fn path_of(&self, id: &str) -> PathBuf {
        self.root.join(id.trim_start_matches('/'))
    }

    /// Module identifier of a filesystem path under the root
    pub fn id_of(&self, path: &Path) -> Option<String> {
        // glob reports `./a/b` as `a/b`, so compare without `.` components
        let path = without_cur_dir(path);
        let relative = path.strip_prefix(without_cur_dir(&self.root)).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

impl SourceProvider for DirectorySource {
    fn fetch(&self, id: &str) -> Result<VirtualFile, SourceError> {
        let path = self.path_of(id);
        if !path.is_file() {
            return Err(SourceError::NotFound { id: id.to_string() });
        }
        Ok(VirtualFile::from_path(path))
    }
}

impl ModuleEnumerator for DirectorySource {
    fn enumerate(&self, pattern: &str) -> Result<Vec<String>, SourceError> {
        let full = self.path_of(pattern);
        let full = full.to_string_lossy();
        let invalid = |message: String| SourceError::InvalidPattern {
            pattern: pattern.to_string(),
            message,
        };

        let mut ids = Vec::new();
        for entry in glob::glob(&full).map_err(|e| invalid(e.to_string()))? {
            let path = entry.map_err(|e| SourceError::Io {
                path: e.path().to_string_lossy().into_owned(),
                source: e.into(),
            })?;
            if path.is_file() {
                if let Some(id) = self.id_of(&path) {
                    ids.push(id);
                }
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// Modules held in memory, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    modules: FxHashMap<String, Arc<str>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, content: impl Into<Arc<str>>) {
        self.modules.insert(id.into(), content.into());
    }

    pub fn with(mut self, id: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        self.insert(id, content);
        self
    }
}

impl SourceProvider for MemorySource {
    fn fetch(&self, id: &str) -> Result<VirtualFile, SourceError> {
        self.modules
            .get(id)
            .map(|content| VirtualFile::from_memory(id, content.clone()))
            .ok_or_else(|| SourceError::NotFound { id: id.to_string() })
    }
}

impl ModuleEnumerator for MemorySource {
    fn enumerate(&self, pattern: &str) -> Result<Vec<String>, SourceError> {
        let matcher = glob::Pattern::new(pattern).map_err(|e| SourceError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..glob::MatchOptions::new()
        };

        let mut ids: Vec<String> = self
            .modules
            .keys()
            .filter(|id| matcher.matches_with(id, options))
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}
