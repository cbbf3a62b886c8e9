//! Filesystem view of an environment
//!
//! [`VarFs`] exposes a [`VarTable`] as a flat directory: the root inode holds
//! one regular file per variable, the file name is the variable name and the
//! file contents are its value. Creating a file adds a variable, unlinking
//! removes it, and writing or truncating resizes the value in place.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     User Applications                          │
//! │              (cat, echo >, rm, ls, truncate ...)               │
//! └────────────────────────────────────────────────────────────────┘
//!                                  │ VFS syscalls
//!                                  ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │             Linux Kernel VFS  →  /dev/fuse  →  fuser           │
//! └────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      VarFs (this module)                       │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────────┐  │
//! │  │  inode map   │  │     VarTable     │  │   BackingStore   │  │
//! │  │ ino ↔ VarId  │  │ KEY=VALUE\0 blob │  │ (sync / unmount) │  │
//! │  └──────────────┘  └──────────────────┘  └──────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The adapter methods (`lookup`, `create`, `write`, ...) are plain Rust and
//! always available; the `fuser::Filesystem` impl and the [`mount`] /
//! [`spawn_mount`] helpers need the `fuse` feature.
//!
//! # Usage
//!
//! ```bash
//! ubootvar-fs --image env.bin mount /mnt/env
//!
//! cat /mnt/env/bootcmd
//! echo -n "run netboot" > /mnt/env/bootcmd
//! rm /mnt/env/bootdelay
//!
//! fusermount -u /mnt/env
//! ```

use std::time::{Duration, SystemTime};

use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::disk::BackingStore;

use super::error::{VarError, VfsError, VfsResult};
use super::format;
use super::table::{VarId, VarTable};

#[cfg(feature = "fuse")]
use std::ffi::OsStr;
#[cfg(feature = "fuse")]
use std::os::unix::ffi::OsStrExt;
#[cfg(feature = "fuse")]
use std::path::Path;

/// Inode number type (matches fuser's u64 inode convention)
pub type Ino = u64;

/// Root inode number (FUSE convention: inode 1 is root)
pub const ROOT_INO: Ino = 1;

/// Smallest possible record: one-byte name, separator, terminator
#[cfg(feature = "fuse")]
const MIN_RECORD: u64 = 3;

/// File attributes
///
/// This mirrors fuser::FileAttr but is always available regardless
/// of feature flags, allowing the adapter to be used and tested
/// without the fuser crate.
#[derive(Clone, Debug)]
pub struct FileAttr {
    /// Inode number
    pub ino: Ino,
    /// File size in bytes
    pub size: u64,
    /// Number of 512-byte blocks allocated
    pub blocks: u64,
    /// Last access time
    pub atime: SystemTime,
    /// Last modification time
    pub mtime: SystemTime,
    /// Last status change time
    pub ctime: SystemTime,
    /// Creation time (macOS only)
    pub crtime: SystemTime,
    /// File type
    pub kind: FileKind,
    /// Permissions (mode & 0o7777)
    pub perm: u16,
    /// Hard link count
    pub nlink: u32,
    /// User ID of owner
    pub uid: u32,
    /// Group ID of owner
    pub gid: u32,
    /// Device ID (for special files)
    pub rdev: u32,
    /// Block size for filesystem I/O
    pub blksize: u32,
    /// Flags (macOS only)
    pub flags: u32,
}

impl Default for FileAttr {
    fn default() -> Self {
        let now = SystemTime::now();
        FileAttr {
            ino: 0,
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: FileKind::RegularFile,
            perm: 0o644,
            nlink: 1,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

#[cfg(feature = "fuse")]
impl From<FileAttr> for fuser::FileAttr {
    fn from(attr: FileAttr) -> Self {
        fuser::FileAttr {
            ino: attr.ino,
            size: attr.size,
            blocks: attr.blocks,
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            crtime: attr.crtime,
            kind: attr.kind.into(),
            perm: attr.perm,
            nlink: attr.nlink,
            uid: attr.uid,
            gid: attr.gid,
            rdev: attr.rdev,
            blksize: attr.blksize,
            flags: attr.flags,
        }
    }
}

/// File type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// The root directory
    Directory,
    /// A variable
    RegularFile,
}

#[cfg(feature = "fuse")]
impl From<FileKind> for fuser::FileType {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Directory => fuser::FileType::Directory,
            FileKind::RegularFile => fuser::FileType::RegularFile,
        }
    }
}

/// Directory entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number
    pub ino: Ino,
    /// Entry name (variable names are bytes, not necessarily UTF-8)
    pub name: Vec<u8>,
    /// Entry type
    pub kind: FileKind,
}

/// Space accounting for `statfs`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatFs {
    /// Blob size in bytes
    pub capacity: u64,
    /// Bytes occupied by records
    pub used: u64,
    /// Bytes that can still be claimed by create or grow
    pub free: u64,
    /// Number of variables
    pub variables: u64,
}

/// Mount configuration
#[derive(Clone, Debug)]
pub struct MountOptions {
    /// Refuse every mutation (default: false)
    pub read_only: bool,
    /// Allow other users to access the mount (default: false)
    pub allow_other: bool,
    /// Allow root to access the mount (default: true)
    pub allow_root: bool,
    /// Filesystem name shown in mount output
    pub fsname: String,
    /// Permission bits reported for variables found in the blob at mount
    /// time. Files created later take the mode given to `create`.
    pub file_perm: u16,
    /// TTL the kernel may cache attributes and entries for
    pub attr_ttl: Duration,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            read_only: false,
            allow_other: false,
            allow_root: true,
            fsname: "ubootvarfs".to_string(),
            file_perm: 0o644,
            attr_ttl: Duration::from_secs(1),
        }
    }
}

/// Per-inode bookkeeping
///
/// Modes live only here; the blob has nowhere to store them, so they reset
/// to `file_perm` on the next mount.
#[derive(Clone, Copy, Debug)]
struct Node {
    id: VarId,
    perm: u16,
    mtime: SystemTime,
}

/// Environment exposed as a flat directory of files
///
/// Inode numbers are handed out lazily the first time a variable is looked
/// up or listed, and stay with that variable until it is unlinked. They are
/// never reused within one mount.
///
/// A `VarFs` is single-threaded like the table it wraps. Use
/// [`SharedVarFs`](super::SharedVarFs) to share one between threads.
pub struct VarFs {
    table: VarTable,

    /// Where the blob came from and goes back to (None for in-memory use)
    store: Option<Box<dyn BackingStore>>,

    nodes: FxHashMap<Ino, Node>,
    inos: FxHashMap<VarId, Ino>,
    next_ino: Ino,

    /// Blob changed since the last sync
    dirty: bool,

    read_only: bool,
    file_perm: u16,
    attr_ttl: Duration,
    mounted_at: SystemTime,
}

impl VarFs {
    /// Wrap an already mounted table with no backing store
    pub fn new(table: VarTable, options: &MountOptions) -> Self {
        VarFs {
            table,
            store: None,
            nodes: FxHashMap::default(),
            inos: FxHashMap::default(),
            next_ino: ROOT_INO + 1,
            dirty: false,
            read_only: options.read_only,
            file_perm: options.file_perm,
            attr_ttl: options.attr_ttl,
            mounted_at: SystemTime::now(),
        }
    }

    /// Mount an environment blob held in memory
    pub fn from_bytes(bytes: Vec<u8>, options: &MountOptions) -> VfsResult<Self> {
        let table = VarTable::mount(bytes)?;
        Ok(Self::new(table, options))
    }

    /// Load the blob from `store` and mount it.
    ///
    /// A store that refuses writes forces a read-only mount.
    pub fn mount(mut store: Box<dyn BackingStore>, options: &MountOptions) -> VfsResult<Self> {
        let bytes = store.load()?;
        let table = VarTable::mount(bytes)?;

        let mut fs = Self::new(table, options);
        fs.read_only |= store.is_read_only();

        info!(
            "mounted {}: {} variables, {}/{} bytes used{}",
            store.describe(),
            fs.table.len(),
            fs.table.end(),
            fs.table.capacity(),
            if fs.read_only { ", read-only" } else { "" }
        );

        fs.store = Some(store);
        Ok(fs)
    }

    /// The underlying table
    pub fn table(&self) -> &VarTable {
        &self.table
    }

    /// Whether mutations are refused
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether there are changes not yet written to the store
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// TTL for cached attributes
    pub fn attr_ttl(&self) -> Duration {
        self.attr_ttl
    }

    /// TTL for cached entries
    pub fn entry_ttl(&self) -> Duration {
        self.attr_ttl
    }

    /// Look up a variable by name in the root directory
    pub fn lookup(&mut self, parent: Ino, name: &[u8]) -> VfsResult<FileAttr> {
        self.check_dir(parent)?;
        let (id, len) = match self.table.lookup(name) {
            Some(var) => (var.id(), var.len()),
            None => return Err(VfsError::NotFound(lossy(name))),
        };
        let ino = self.ino_for(id);
        Ok(self.file_attr(ino, len))
    }

    /// Get attributes of the root or of a variable
    pub fn getattr(&self, ino: Ino) -> VfsResult<FileAttr> {
        if ino == ROOT_INO {
            return Ok(self.root_attr());
        }
        let id = self.resolve(ino)?;
        let len = self.value_len(id)?;
        Ok(self.file_attr(ino, len))
    }

    /// List the root directory: `.`, `..`, then variables in blob order
    pub fn readdir(&mut self, ino: Ino) -> VfsResult<Vec<DirEntry>> {
        self.check_dir(ino)?;

        let vars: Vec<(VarId, Vec<u8>)> = self
            .table
            .iter()
            .map(|v| (v.id(), v.name().to_vec()))
            .collect();

        let mut entries = Vec::with_capacity(vars.len() + 2);
        entries.push(DirEntry {
            ino: ROOT_INO,
            name: b".".to_vec(),
            kind: FileKind::Directory,
        });
        entries.push(DirEntry {
            ino: ROOT_INO,
            name: b"..".to_vec(),
            kind: FileKind::Directory,
        });
        for (id, name) in vars {
            entries.push(DirEntry {
                ino: self.ino_for(id),
                name,
                kind: FileKind::RegularFile,
            });
        }
        Ok(entries)
    }

    /// Create an empty variable with permission bits `mode & 0o777`
    pub fn create(&mut self, parent: Ino, name: &[u8], mode: u32) -> VfsResult<FileAttr> {
        self.check_writable()?;
        self.check_dir(parent)?;
        if self.table.lookup(name).is_some() {
            return Err(VfsError::Exists(lossy(name)));
        }

        let id = self.table.create(name, b"")?;
        let ino = self.ino_for(id);
        if let Some(node) = self.nodes.get_mut(&ino) {
            node.perm = (mode & 0o777) as u16;
        }
        self.touch(ino);
        Ok(self.file_attr(ino, 0))
    }

    /// Change the permission bits of a variable
    pub fn chmod(&mut self, ino: Ino, mode: u32) -> VfsResult<FileAttr> {
        self.check_writable()?;
        let id = self.resolve(ino)?;
        let len = self.value_len(id)?;
        if let Some(node) = self.nodes.get_mut(&ino) {
            node.perm = (mode & 0o777) as u16;
        }
        Ok(self.file_attr(ino, len))
    }

    /// Remove a variable
    pub fn unlink(&mut self, parent: Ino, name: &[u8]) -> VfsResult<()> {
        self.check_writable()?;
        self.check_dir(parent)?;
        let id = match self.table.lookup(name) {
            Some(var) => var.id(),
            None => return Err(VfsError::NotFound(lossy(name))),
        };

        self.table.remove(id)?;
        if let Some(ino) = self.inos.remove(&id) {
            self.nodes.remove(&ino);
        }
        self.dirty = true;
        Ok(())
    }

    /// Set a value's length, zero-filling any growth
    pub fn truncate(&mut self, ino: Ino, size: u64) -> VfsResult<FileAttr> {
        self.check_writable()?;
        let id = self.resolve(ino)?;
        let size = usize::try_from(size).map_err(|_| VfsError::InvalidArgument("size too large"))?;

        self.table.resize(id, size)?;
        self.touch(ino);
        Ok(self.file_attr(ino, size))
    }

    /// Read up to `size` bytes of a value starting at `offset`
    pub fn read(&self, ino: Ino, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let id = self.resolve(ino)?;
        let len = self.value_len(id)?;
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        if offset >= len {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; (size as usize).min(len - offset)];
        let n = self.table.read(id, offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Write `data` into a value at `offset`, growing the value as needed.
    ///
    /// Writing past the current end would leave NUL bytes inside the value,
    /// which the on-disk format cannot represent, so `offset` may be at most
    /// the current length.
    pub fn write(&mut self, ino: Ino, offset: u64, data: &[u8]) -> VfsResult<usize> {
        self.check_writable()?;
        let id = self.resolve(ino)?;
        let len = self.value_len(id)?;

        let offset = usize::try_from(offset).map_err(|_| VfsError::InvalidArgument("offset too large"))?;
        if offset > len {
            return Err(VfsError::InvalidArgument("write would leave a hole in the value"));
        }
        format::validate_value(data)?;

        let end = offset + data.len();
        if end > len {
            self.table.resize(id, end)?;
        }
        let n = self.table.write(id, offset, data)?;
        self.touch(ino);
        Ok(n)
    }

    /// Space accounting
    pub fn statfs(&self) -> StatFs {
        StatFs {
            capacity: self.table.capacity() as u64,
            used: self.table.end() as u64,
            // One byte stays reserved for the end marker
            free: self.table.free_space().saturating_sub(1) as u64,
            variables: self.table.len() as u64,
        }
    }

    /// Write the blob back to the backing store if it changed
    pub fn sync(&mut self) -> VfsResult<()> {
        if !self.dirty || self.read_only {
            return Ok(());
        }
        if let Some(store) = self.store.as_mut() {
            store.store(self.table.as_bytes())?;
            store.sync()?;
            debug!("synced {} bytes to {}", self.table.capacity(), store.describe());
        }
        self.dirty = false;
        Ok(())
    }

    /// Sync and hand back the blob
    pub fn unmount(mut self) -> VfsResult<Vec<u8>> {
        self.sync()?;
        if let Some(store) = self.store.as_ref() {
            info!("unmounted {}", store.describe());
        }
        Ok(self.table.unmount())
    }

    fn check_dir(&self, ino: Ino) -> VfsResult<()> {
        if ino == ROOT_INO {
            Ok(())
        } else if self.nodes.contains_key(&ino) {
            Err(VfsError::NotADirectory(ino))
        } else {
            Err(VfsError::NoSuchInode(ino))
        }
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn resolve(&self, ino: Ino) -> VfsResult<VarId> {
        if ino == ROOT_INO {
            return Err(VfsError::IsADirectory(ino));
        }
        self.nodes
            .get(&ino)
            .map(|node| node.id)
            .ok_or(VfsError::NoSuchInode(ino))
    }

    fn value_len(&self, id: VarId) -> VfsResult<usize> {
        match self.table.get(id) {
            Some(var) => Ok(var.len()),
            None => Err(VarError::StaleHandle(id).into()),
        }
    }

    fn ino_for(&mut self, id: VarId) -> Ino {
        if let Some(&ino) = self.inos.get(&id) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.inos.insert(id, ino);
        self.nodes.insert(
            ino,
            Node {
                id,
                perm: self.file_perm,
                mtime: self.mounted_at,
            },
        );
        ino
    }

    fn touch(&mut self, ino: Ino) {
        if let Some(node) = self.nodes.get_mut(&ino) {
            node.mtime = SystemTime::now();
        }
        self.dirty = true;
    }

    fn root_attr(&self) -> FileAttr {
        FileAttr {
            ino: ROOT_INO,
            size: 0,
            blocks: 0,
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind: FileKind::Directory,
            perm: if self.read_only { 0o555 } else { 0o755 },
            nlink: 2,
            ..Default::default()
        }
    }

    fn file_attr(&self, ino: Ino, len: usize) -> FileAttr {
        let (perm, mtime) = self
            .nodes
            .get(&ino)
            .map(|node| (node.perm, node.mtime))
            .unwrap_or((self.file_perm, self.mounted_at));
        let perm = if self.read_only { perm & !0o222 } else { perm };
        FileAttr {
            ino,
            size: len as u64,
            blocks: (len as u64).div_ceil(512),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: self.mounted_at,
            kind: FileKind::RegularFile,
            perm,
            nlink: 1,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for VarFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VarFs")
            .field("table", &self.table)
            .field("inodes", &self.nodes.len())
            .field("dirty", &self.dirty)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

// =============================================================================
// FUSE TRAIT IMPLEMENTATION
// =============================================================================

#[cfg(feature = "fuse")]
impl fuser::Filesystem for VarFs {
    fn init(
        &mut self,
        _req: &fuser::Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        debug!("fuse session started, {} variables", self.table.len());
        Ok(())
    }

    /// Flush everything back to the store
    fn destroy(&mut self) {
        if let Err(e) = self.sync() {
            log::error!("failed to write environment back on unmount: {}", e);
        }
    }

    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        match VarFs::lookup(self, parent, name.as_bytes()) {
            Ok(attr) => reply.entry(&self.entry_ttl(), &attr.into(), 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        match VarFs::getattr(self, ino) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr.into()),
            Err(e) => reply.error(e.errno()),
        }
    }

    /// Mode and size changes are supported; everything else is reported back
    /// unchanged.
    fn setattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        if let Some(mode) = mode {
            if let Err(e) = self.chmod(ino, mode) {
                reply.error(e.errno());
                return;
            }
        }
        let result = match size {
            Some(size) => self.truncate(ino, size),
            None => VarFs::getattr(self, ino),
        };
        match result {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr.into()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match VarFs::read(self, ino, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match VarFs::write(self, ino, offset as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        match VarFs::create(self, parent, name.as_bytes(), mode & !umask) {
            Ok(attr) => reply.created(&self.entry_ttl(), &attr.into(), 0, 0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _rdev: u32,
        reply: fuser::ReplyEntry,
    ) {
        if (mode & libc::S_IFMT as u32) != libc::S_IFREG as u32 {
            reply.error(libc::EPERM);
            return;
        }
        match VarFs::create(self, parent, name.as_bytes(), mode & !umask) {
            Ok(attr) => reply.entry(&self.entry_ttl(), &attr.into(), 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &fuser::Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: fuser::ReplyEntry,
    ) {
        reply.error(libc::EPERM);
    }

    fn unlink(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        match VarFs::unlink(self, parent, name.as_bytes()) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        if let Err(e) = self.resolve(ino) {
            reply.error(e.errno());
            return;
        }

        if self.read_only {
            let write_flags = libc::O_WRONLY | libc::O_RDWR | libc::O_APPEND | libc::O_TRUNC;
            if flags & write_flags != 0 {
                reply.error(libc::EROFS);
                return;
            }
        }

        // Stateless: every handle is 0
        reply.opened(0, 0);
    }

    fn flush(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: fuser::ReplyEmpty,
    ) {
        match self.sync() {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn fsync(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: fuser::ReplyEmpty,
    ) {
        match self.sync() {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &fuser::Request<'_>, ino: u64, _flags: i32, reply: fuser::ReplyOpen) {
        match self.check_dir(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        let entries = match VarFs::readdir(self, ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        for (i, entry) in entries.into_iter().enumerate().skip(offset as usize) {
            // Reply returns true if buffer is full
            if reply.add(entry.ino, (i + 1) as i64, entry.kind.into(), OsStr::from_bytes(&entry.name)) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    /// Byte-granular: one block per byte of environment
    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let stat = VarFs::statfs(self);
        reply.statfs(
            stat.capacity,          // blocks
            stat.free,              // bfree
            stat.free,              // bavail
            stat.variables,         // files
            stat.free / MIN_RECORD, // ffree
            1,                      // bsize
            255,                    // namelen
            1,                      // frsize
        );
    }

    fn access(&mut self, _req: &fuser::Request<'_>, ino: u64, mask: i32, reply: fuser::ReplyEmpty) {
        if let Err(e) = VarFs::getattr(self, ino) {
            reply.error(e.errno());
            return;
        }
        if self.read_only && (mask & libc::W_OK != 0) {
            reply.error(libc::EROFS);
            return;
        }
        reply.ok();
    }
}

// =============================================================================
// MOUNT FUNCTIONS
// =============================================================================

#[cfg(feature = "fuse")]
fn fuse_options(options: &MountOptions) -> Vec<fuser::MountOption> {
    use fuser::MountOption;

    let mut mount_options = vec![
        MountOption::FSName(options.fsname.clone()),
        MountOption::Subtype("ubootvarfs".to_string()),
        MountOption::AutoUnmount,
        MountOption::DefaultPermissions,
    ];

    if options.read_only {
        mount_options.push(MountOption::RO);
    }

    if options.allow_other {
        mount_options.push(MountOption::AllowOther);
    } else if options.allow_root {
        mount_options.push(MountOption::AllowRoot);
    }
    mount_options
}

/// Mount a VarFs at the specified path
///
/// This function blocks until the filesystem is unmounted. The blob is
/// written back to the store when the session ends.
///
/// # Example
///
/// ```no_run
/// use ubootvar_fs::disk::open_store;
/// use ubootvar_fs::{mount, MountOptions, VarFs};
///
/// let options = MountOptions::default();
/// let store = open_store("env.bin", 0, None, false)?;
/// let fs = VarFs::mount(store, &options)?;
/// mount(fs, "/mnt/env", &options)?;
/// # Ok::<(), ubootvar_fs::VfsError>(())
/// ```
#[cfg(feature = "fuse")]
pub fn mount<P: AsRef<Path>>(fs: VarFs, mountpoint: P, options: &MountOptions) -> VfsResult<()> {
    let path = mountpoint.as_ref();
    fuser::mount2(fs, path, &fuse_options(options)).map_err(|source| VfsError::Mount {
        path: path.to_path_buf(),
        source,
    })
}

/// Spawn a VarFs mount in a background thread
///
/// Returns a `BackgroundSession` that will automatically unmount when dropped.
#[cfg(feature = "fuse")]
pub fn spawn_mount<P: AsRef<Path>>(
    fs: VarFs,
    mountpoint: P,
    options: &MountOptions,
) -> VfsResult<fuser::BackgroundSession> {
    let path = mountpoint.as_ref();
    fuser::spawn_mount2(fs, path, &fuse_options(options)).map_err(|source| VfsError::Mount {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// TESTS
// =============================================================================
