//! Filesystem registry storage.
//!
//! Each set lives in `{base}/{set}.json`. Writes go to a temp file that is
//! synced and then renamed over the old one, so a crash leaves either the
//! previous or the new contents and never a torn file.

use gatehouse_core::effects::{RegistryStorage, SetEntries};
use gatehouse_core::{CredentialSet, StorageError};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One JSON document per credential set
#[derive(Debug, Clone)]
pub struct FilesystemRegistryStorage {
    base_path: PathBuf,
}

impl FilesystemRegistryStorage {
    /// Create storage rooted at `base_path`, creating the directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::WriteFailed(format!(
                "failed to create registry directory {}: {e}",
                base_path.display()
            ))
        })?;
        Ok(Self { base_path })
    }

    /// Directory holding the set files
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn set_path(&self, set: CredentialSet) -> PathBuf {
        self.base_path.join(format!("{}.json", set.as_str()))
    }
}

impl RegistryStorage for FilesystemRegistryStorage {
    fn load(&self, set: CredentialSet) -> Result<SetEntries, StorageError> {
        let path = self.set_path(set);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SetEntries::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))
    }

    fn persist(&self, set: CredentialSet, entries: &SetEntries) -> Result<(), StorageError> {
        let path = self.set_path(set);
        let tmp = path.with_extension("json.tmp");
        let write_err = |e: std::io::Error| StorageError::WriteFailed(format!("{}: {e}", path.display()));

        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| StorageError::WriteFailed(format!("encode {set}: {e}")))?;
        let mut file = File::create(&tmp).map_err(write_err)?;
        file.write_all(&bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);
        fs::rename(&tmp, &path).map_err(write_err)?;

        // Make the rename itself durable; not every platform allows this.
        if let Ok(dir) = File::open(&self.base_path) {
            let _ = dir.sync_all();
        }
        debug!(%set, entries = entries.len(), "registry set persisted");
        Ok(())
    }
}
