//! Backing stores for environment blobs
//!
//! The store layer hands the environment engine a byte buffer and takes it
//! back when the filesystem is synced or unmounted. It knows nothing about
//! the `KEY=VALUE` format.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐   load()    ┌────────────┐   mount   ┌──────────┐
//! │  image file / device │ ──────────▶ │  Vec<u8>   │ ────────▶ │ VarTable │
//! │  region (raw.rs)     │ ◀────────── │  capacity  │ ◀──────── │          │
//! └──────────────────────┘   store()   └────────────┘  unmount  └──────────┘
//! ```
//!
//! An environment usually lives in a fixed window of a flash image or an
//! MTD/eMMC device, hence the `offset`/`size` pair on [`RawImage`].
//!
//! # Durability
//!
//! [`BackingStore::store`] writes the bytes back and [`BackingStore::sync`]
//! asks the OS to flush them. Nothing stronger is promised: a crash between
//! the two can leave a torn environment on the device.

pub mod memory;
pub mod raw;

mod error;

pub use error::{DiskError, DiskResult};
pub use memory::MemoryStore;
pub use raw::RawImage;

use std::path::Path;

/// Source and sink of an environment blob
///
/// Implementations are synchronous; the engine never blocks on anything
/// but these calls.
pub trait BackingStore: Send {
    /// Read the whole region
    fn load(&mut self) -> DiskResult<Vec<u8>>;

    /// Write the whole region back. `data` must be exactly `size()` bytes.
    fn store(&mut self, data: &[u8]) -> DiskResult<()>;

    /// Flush written data to stable storage
    fn sync(&mut self) -> DiskResult<()> {
        Ok(())
    }

    /// Region size in bytes (the environment capacity)
    fn size(&self) -> u64;

    /// Whether `store` is refused
    fn is_read_only(&self) -> bool {
        false
    }

    /// Human-readable origin, used in logs and as the FUSE fsname
    fn describe(&self) -> String;
}

/// Open a file-backed store.
///
/// `size` of `None` means "from `offset` to the end of the file".
///
/// # Example
///
/// ```rust,no_run
/// use ubootvar_fs::disk::{open_store, BackingStore};
///
/// // U-Boot environment at 0x3e0000 in a 4 MiB SPI flash dump
/// let store = open_store("flash.bin", 0x3e_0000, Some(0x2_0000), false)?;
/// assert_eq!(store.size(), 0x2_0000);
/// # Ok::<(), ubootvar_fs::disk::DiskError>(())
/// ```
pub fn open_store(
    path: impl AsRef<Path>,
    offset: u64,
    size: Option<u64>,
    read_only: bool,
) -> DiskResult<Box<dyn BackingStore>> {
    let image = RawImage::open_region(path, offset, size, read_only)?;
    Ok(Box::new(image))
}
