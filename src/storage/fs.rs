//! Check files in a local directory.

use std::path::{Path, PathBuf};

use super::{Index, StorageError, StorageReader, INDEX_NAME};
use crate::model::CheckFile;

/// Reads `index.json` and check files from a directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl StorageReader for FsStorage {
    /// A missing index means nothing has been stored yet.
    async fn get_index(&self) -> Result<Index, StorageError> {
        let path = self.dir.join(INDEX_NAME);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Index::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    async fn fetch(&self, name: &str) -> Result<CheckFile, StorageError> {
        // Check files always live directly in the directory
        if name.contains('/') || name.contains('\\') || name == ".." {
            return Err(StorageError::NotFound(name.to_string()));
        }

        let data = match tokio::fs::read(self.dir.join(name)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(CheckFile::parse(name, &data)?)
    }
}
