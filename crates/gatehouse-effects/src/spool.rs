//! Spool-directory remote handler.
//!
//! The remote tree is mirrored onto a local directory that an external
//! uplink process synchronizes with the cloud service. Node
//! `/devices/d1/logs/k` is the file `{root}/devices/d1/logs/k.json`; a node
//! with children is a directory. The uplink signals connectivity by keeping
//! the marker file `{root}/.online` present.
//!
//! Writes are atomic (temp file, then rename) so the uplink never picks up a
//! half-written object.

use async_trait::async_trait;
use gatehouse_core::effects::RemoteEffects;
use gatehouse_core::{RemotePath, TransportError};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::trace;

const ONLINE_MARKER: &str = ".online";
const NODE_EXTENSION: &str = "json";

/// Remote tree on a spool directory
#[derive(Debug, Clone)]
pub struct SpoolRemoteHandler {
    root: PathBuf,
}

impl SpoolRemoteHandler {
    /// Create a handler over `root`, creating the directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| TransportError::RequestFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { root })
    }

    /// Spool root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory path of a node, rejecting segments that escape the root.
    fn node_dir(&self, path: &RemotePath) -> Result<PathBuf, TransportError> {
        let mut dir = self.root.clone();
        for segment in path.segments() {
            if segment == "." || segment == ".." || segment.contains('\\') {
                return Err(TransportError::RequestFailed {
                    path: path.to_string(),
                    reason: format!("invalid path segment {segment:?}"),
                });
            }
            dir.push(segment);
        }
        Ok(dir)
    }

    fn node_file(&self, path: &RemotePath) -> Result<PathBuf, TransportError> {
        Ok(with_suffix(&self.node_dir(path)?, NODE_EXTENSION))
    }
}

/// Append `.{suffix}` without touching any dot already in the name.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn io_failure(path: &RemotePath, err: std::io::Error) -> TransportError {
    TransportError::RequestFailed {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl RemoteEffects for SpoolRemoteHandler {
    fn is_connected(&self) -> bool {
        self.root.join(ONLINE_MARKER).exists()
    }

    async fn send(&self, path: &RemotePath, value: Value) -> Result<(), TransportError> {
        let file = self.node_file(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure(path, e))?;
        }
        let bytes = serde_json::to_vec(&value).map_err(|e| TransportError::Payload(e.to_string()))?;
        let tmp = with_suffix(&file, "tmp");
        fs::write(&tmp, bytes).await.map_err(|e| io_failure(path, e))?;
        fs::rename(&tmp, &file)
            .await
            .map_err(|e| io_failure(path, e))?;
        trace!(%path, "spooled");
        Ok(())
    }

    async fn receive(&self, path: &RemotePath) -> Result<Option<Value>, TransportError> {
        let file = self.node_file(path)?;
        let bytes = match fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_failure(path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| TransportError::Payload(format!("{path}: {e}")))
    }

    async fn delete(&self, path: &RemotePath) -> Result<(), TransportError> {
        let file = self.node_file(path)?;
        match fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_failure(path, e)),
        }
        let dir = self.node_dir(path)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_failure(path, e)),
        }
    }
}
