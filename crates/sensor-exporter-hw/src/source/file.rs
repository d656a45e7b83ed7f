//! JSON snapshot file source.

use super::ReadingSource;
use crate::{Error, Result, Snapshot};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Source that re-reads a JSON snapshot file on every call.
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    /// Creates a source for the snapshot file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: format!("file:{}", path.display()),
            path,
        }
    }
}

impl ReadingSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let bytes = std::fs::read(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::SourceNotFound(self.path.clone()),
            _ => Error::Io(e),
        })?;
        Snapshot::from_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let source = FileSource::new(&path);

        assert!(matches!(source.snapshot(), Err(Error::SourceNotFound(_))));

        std::fs::write(&path, r#"{"Power": {"CPU (Total)": {"value": "15.3 W"}}}"#).unwrap();
        assert_eq!(source.snapshot().unwrap().readings().count(), 1);

        std::fs::write(&path, "{}").unwrap();
        assert!(source.snapshot().unwrap().is_empty());
    }
}
