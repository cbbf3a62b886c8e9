//! In-memory backing store

use std::sync::{Arc, Mutex};

use super::error::{DiskError, DiskResult};
use super::BackingStore;

/// Backing store held in memory
///
/// Clones share the same buffer, so a test can keep one clone and inspect
/// what the filesystem wrote back through the other.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    data: Arc<Mutex<Vec<u8>>>,
    syncs: Arc<Mutex<usize>>,
}

impl MemoryStore {
    /// Store holding `data`; its length is the environment capacity
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            syncs: Arc::new(Mutex::new(0)),
        }
    }

    /// Zero-filled store of `capacity` bytes
    pub fn zeroed(capacity: usize) -> Self {
        Self::new(vec![0; capacity])
    }

    /// Current contents
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Number of completed `sync` calls
    pub fn sync_count(&self) -> usize {
        self.syncs.lock().map(|n| *n).unwrap_or(0)
    }
}

fn poisoned() -> DiskError {
    DiskError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "memory store lock poisoned",
    ))
}

impl BackingStore for MemoryStore {
    fn load(&mut self) -> DiskResult<Vec<u8>> {
        self.data.lock().map(|d| d.clone()).map_err(|_| poisoned())
    }

    fn store(&mut self, data: &[u8]) -> DiskResult<()> {
        let mut buf = self.data.lock().map_err(|_| poisoned())?;
        if data.len() != buf.len() {
            return Err(DiskError::SizeMismatch {
                expected: buf.len() as u64,
                actual: data.len() as u64,
            });
        }
        buf.copy_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> DiskResult<()> {
        *self.syncs.lock().map_err(|_| poisoned())? += 1;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.lock().map(|d| d.len() as u64).unwrap_or(0)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
