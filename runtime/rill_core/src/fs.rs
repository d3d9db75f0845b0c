//! The filesystem seam.
//!
//! Rill never touches the host filesystem directly: every value that does
//! I/O goes through the `Filesystem` handle injected into its Context.
//! The runtime ships only the trait and an in-memory implementation used
//! by effects and tests; embedders provide a real one.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Filesystem operation failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file already exists: {0}")]
    AlreadyExists(String),
    #[error("{0}")]
    Other(String),
}

/// Minimal filesystem surface required by built-in effects and the walk
/// statement's directory values.
pub trait Filesystem: Send + Sync {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;
    /// Create a file; fails when it already exists.
    fn create_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;
    fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;
    fn append_to_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;
    fn truncate_file(&self, path: &str, len: u64) -> Result<(), FsError>;
    fn delete_file(&self, path: &str) -> Result<(), FsError>;
    fn exists(&self, path: &str) -> bool;
    fn file_len(&self, path: &str) -> Result<u64, FsError>;
}

/// In-memory filesystem used by tests and reversible-effect verification.
#[derive(Default)]
pub struct MemFilesystem {
    files: Mutex<FxHashMap<String, Vec<u8>>>,
}

impl MemFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// All paths currently present, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Filesystem for MemFilesystem {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_owned()))
    }

    fn create_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let mut files = self.files.lock();
        if files.contains_key(path) {
            return Err(FsError::AlreadyExists(path.to_owned()));
        }
        files.insert(path.to_owned(), content.to_vec());
        Ok(())
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        self.files.lock().insert(path.to_owned(), content.to_vec());
        Ok(())
    }

    fn append_to_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let mut files = self.files.lock();
        let entry = files.entry(path.to_owned()).or_default();
        entry.extend_from_slice(content);
        Ok(())
    }

    fn truncate_file(&self, path: &str, len: u64) -> Result<(), FsError> {
        let mut files = self.files.lock();
        let file = files
            .get_mut(path)
            .ok_or_else(|| FsError::NotFound(path.to_owned()))?;
        let len = usize::try_from(len).map_err(|_| FsError::Other("length overflow".into()))?;
        file.truncate(len);
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<(), FsError> {
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FsError::NotFound(path.to_owned()))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    fn file_len(&self, path: &str) -> Result<u64, FsError> {
        self.files
            .lock()
            .get(path)
            .map(|f| f.len() as u64)
            .ok_or_else(|| FsError::NotFound(path.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn create_then_append_then_truncate() {
        let fs = MemFilesystem::new();
        fs.create_file("/a.txt", b"hello").unwrap();
        assert!(matches!(
            fs.create_file("/a.txt", b""),
            Err(FsError::AlreadyExists(_))
        ));
        fs.append_to_file("/a.txt", b" world").unwrap();
        assert_eq!(fs.read_file("/a.txt").unwrap(), b"hello world");
        fs.truncate_file("/a.txt", 5).unwrap();
        assert_eq!(fs.read_file("/a.txt").unwrap(), b"hello");
    }
}
