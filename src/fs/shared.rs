//! Thread-safe handle to a [`VarFs`]
//!
//! The environment store does not synchronize internally. Hosts that serve
//! requests from several threads go through `SharedVarFs`, which serializes
//! every operation behind one mutex. Reads take the same lock as writes; a
//! relocation moves bytes under every other variable, so there is no useful
//! finer granularity.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::VfsResult;
use super::fuse_shim::{DirEntry, FileAttr, Ino, StatFs, VarFs};

/// Cloneable, lock-protected [`VarFs`]
#[derive(Clone, Debug)]
pub struct SharedVarFs {
    inner: Arc<Mutex<VarFs>>,
}

impl SharedVarFs {
    /// Wrap a filesystem
    pub fn new(fs: VarFs) -> Self {
        Self {
            inner: Arc::new(Mutex::new(fs)),
        }
    }

    /// Run `f` with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut VarFs) -> R) -> R {
        f(&mut self.lock())
    }

    /// See [`VarFs::lookup`]
    pub fn lookup(&self, parent: Ino, name: &[u8]) -> VfsResult<FileAttr> {
        self.lock().lookup(parent, name)
    }

    /// See [`VarFs::getattr`]
    pub fn getattr(&self, ino: Ino) -> VfsResult<FileAttr> {
        self.lock().getattr(ino)
    }

    /// See [`VarFs::readdir`]
    pub fn readdir(&self, ino: Ino) -> VfsResult<Vec<DirEntry>> {
        self.lock().readdir(ino)
    }

    /// See [`VarFs::create`]
    pub fn create(&self, parent: Ino, name: &[u8], mode: u32) -> VfsResult<FileAttr> {
        self.lock().create(parent, name, mode)
    }

    /// See [`VarFs::unlink`]
    pub fn unlink(&self, parent: Ino, name: &[u8]) -> VfsResult<()> {
        self.lock().unlink(parent, name)
    }

    /// See [`VarFs::truncate`]
    pub fn truncate(&self, ino: Ino, size: u64) -> VfsResult<FileAttr> {
        self.lock().truncate(ino, size)
    }

    /// See [`VarFs::read`]
    pub fn read(&self, ino: Ino, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        self.lock().read(ino, offset, size)
    }

    /// See [`VarFs::write`]
    pub fn write(&self, ino: Ino, offset: u64, data: &[u8]) -> VfsResult<usize> {
        self.lock().write(ino, offset, data)
    }

    /// See [`VarFs::statfs`]
    pub fn statfs(&self) -> StatFs {
        self.lock().statfs()
    }

    /// See [`VarFs::sync`]
    pub fn sync(&self) -> VfsResult<()> {
        self.lock().sync()
    }

    /// Take the filesystem back if this is the last handle
    pub fn into_inner(self) -> Option<VarFs> {
        Arc::try_unwrap(self.inner)
            .ok()
            .map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    // Every table operation either completes or fails before mutating, so a
    // panic in another holder cannot leave a half-applied change behind.
    fn lock(&self) -> MutexGuard<'_, VarFs> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
