//! Line-oriented credential reader.
//!
//! Keyboard-wedge readers and most serial bridges deliver one identifier per
//! line. A dedicated thread does the blocking reads and hands lines to the
//! control loop through a bounded channel, so `poll_scan` never blocks.

use gatehouse_core::effects::CredentialReaderEffects;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Scans buffered between control cycles
const SCAN_BUFFER: usize = 16;

/// Credential reader fed by a line source
#[derive(Debug)]
pub struct LineReaderHandler {
    scans: Mutex<mpsc::Receiver<String>>,
}

impl LineReaderHandler {
    /// Read scans from standard input.
    pub fn stdin() -> io::Result<Self> {
        Self::from_source("stdin", BufReader::new(io::stdin()))
    }

    /// Read scans from a device node or FIFO.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_source(&path.display().to_string(), BufReader::new(file))
    }

    /// Read scans from any line source.
    pub fn from_source<R>(name: &str, source: R) -> io::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SCAN_BUFFER);
        let source_name = name.to_string();
        thread::Builder::new()
            .name("credential-reader".into())
            .spawn(move || pump(&source_name, source, tx))?;
        Ok(Self {
            scans: Mutex::new(rx),
        })
    }
}

fn pump<R: BufRead>(name: &str, source: R, tx: mpsc::Sender<String>) {
    for line in source.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(source = name, error = %e, "credential reader failed");
                return;
            }
        };
        let scan = line.trim();
        if scan.is_empty() {
            continue;
        }
        if tx.blocking_send(scan.to_string()).is_err() {
            return;
        }
    }
    debug!(source = name, "credential reader closed");
}

impl CredentialReaderEffects for LineReaderHandler {
    fn poll_scan(&self) -> Option<String> {
        self.scans.lock().try_recv().ok()
    }
}
