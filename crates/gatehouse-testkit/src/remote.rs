//! In-memory remote tree with failure injection.

use async_trait::async_trait;
use gatehouse_core::effects::RemoteEffects;
use gatehouse_core::{RemotePath, TransportError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Path-addressed JSON tree held in memory.
///
/// Every successful `send` and `delete` is journaled so tests can assert on
/// exactly what the processor wrote, not just the final state.
#[derive(Debug)]
pub struct MemoryRemote {
    nodes: Mutex<BTreeMap<String, Value>>,
    sends: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    connected: AtomicBool,
    fail_sends: AtomicBool,
    fail_receives: AtomicBool,
    fail_deletes: AtomicBool,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Create an empty, connected tree
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
            sends: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            fail_receives: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Write a node directly, as the remote side would (e.g. a command).
    pub fn put(&self, path: &RemotePath, value: Value) {
        self.nodes.lock().insert(path.as_str().to_string(), value);
    }

    /// Read a node
    pub fn get(&self, path: &RemotePath) -> Option<Value> {
        self.nodes.lock().get(path.as_str()).cloned()
    }

    /// Direct children of `path`, keyed by their last segment
    pub fn children(&self, path: &RemotePath) -> BTreeMap<String, Value> {
        let prefix = format!("{}/", path.as_str());
        self.nodes
            .lock()
            .iter()
            .filter_map(|(key, value)| {
                let rest = key.strip_prefix(&prefix)?;
                (!rest.contains('/')).then(|| (rest.to_string(), value.clone()))
            })
            .collect()
    }

    /// Paths written so far, in order
    pub fn sent_paths(&self) -> Vec<String> {
        self.sends.lock().clone()
    }

    /// Paths deleted so far, in order
    pub fn deleted_paths(&self) -> Vec<String> {
        self.deletes.lock().clone()
    }

    /// Forget the send/delete journals
    pub fn clear_journal(&self) {
        self.sends.lock().clear();
        self.deletes.lock().clear();
    }

    /// Toggle connectivity
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every send fail
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make every receive fail
    pub fn fail_receives(&self, fail: bool) {
        self.fail_receives.store(fail, Ordering::SeqCst);
    }

    /// Make every delete fail
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, path: &RemotePath) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable);
        }
        if flag.load(Ordering::SeqCst) {
            return Err(TransportError::RequestFailed {
                path: path.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteEffects for MemoryRemote {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, path: &RemotePath, value: Value) -> Result<(), TransportError> {
        self.check(&self.fail_sends, path)?;
        self.nodes.lock().insert(path.as_str().to_string(), value);
        self.sends.lock().push(path.as_str().to_string());
        Ok(())
    }

    async fn receive(&self, path: &RemotePath) -> Result<Option<Value>, TransportError> {
        self.check(&self.fail_receives, path)?;
        Ok(self.get(path))
    }

    async fn delete(&self, path: &RemotePath) -> Result<(), TransportError> {
        self.check(&self.fail_deletes, path)?;
        let prefix = format!("{}/", path.as_str());
        self.nodes
            .lock()
            .retain(|key, _| key != path.as_str() && !key.starts_with(&prefix));
        self.deletes.lock().push(path.as_str().to_string());
        Ok(())
    }
}
