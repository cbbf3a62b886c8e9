//! Raw environment images
//!
//! A raw image is a plain file or device node. The environment occupies a
//! byte window `[offset, offset + size)` of it; for a dedicated environment
//! file the window is the whole file.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ubootvar_fs::disk::{BackingStore, RawImage};
//!
//! let mut image = RawImage::open("uboot.env")?;
//! let bytes = image.load()?;
//! // ... mount, modify ...
//! image.store(&bytes)?;
//! image.sync()?;
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use super::error::{DiskError, DiskResult};
use super::BackingStore;

/// Environment window of a file or block device
pub struct RawImage {
    /// Path to the image (for error messages)
    path: PathBuf,

    /// Start of the environment inside the file
    offset: u64,

    /// Environment size
    size: u64,

    read_only: bool,

    file: File,
}

impl RawImage {
    /// Open a whole file read-write
    pub fn open(path: impl AsRef<Path>) -> DiskResult<Self> {
        Self::open_region(path, 0, None, false)
    }

    /// Open a window of a file.
    ///
    /// `size` of `None` extends the window to the end of the file.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` when the file is missing, unreadable or the window is
    ///   empty
    /// - `OutOfBounds` when the window extends past the end of the file
    pub fn open_region(
        path: impl AsRef<Path>,
        offset: u64,
        size: Option<u64>,
        read_only: bool,
    ) -> DiskResult<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DiskError::InvalidFormat {
                    path: path.clone(),
                    reason: "File not found".to_string(),
                },
                std::io::ErrorKind::PermissionDenied => DiskError::InvalidFormat {
                    path: path.clone(),
                    reason: "Permission denied".to_string(),
                },
                _ => DiskError::Io(e),
            })?;

        let file_size = file_len(&file)?;
        let size = match size {
            Some(size) => size,
            None => file_size.saturating_sub(offset),
        };

        let region_end = offset.checked_add(size).ok_or(DiskError::OutOfBounds {
            requested: u64::MAX,
            size: file_size,
        })?;
        if region_end > file_size {
            return Err(DiskError::OutOfBounds {
                requested: region_end,
                size: file_size,
            });
        }
        if size == 0 {
            return Err(DiskError::InvalidFormat {
                path,
                reason: "Environment region is empty".to_string(),
            });
        }

        debug!(
            "opened {} [{:#x}..{:#x}]{}",
            path.display(),
            offset,
            region_end,
            if read_only { " read-only" } else { "" }
        );

        Ok(Self {
            path,
            offset,
            size,
            read_only,
            file,
        })
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start of the environment inside the file
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl BackingStore for RawImage {
    fn load(&mut self) -> DiskResult<Vec<u8>> {
        let mut buf = vec![0u8; self.size as usize];
        self.file.seek(SeekFrom::Start(self.offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn store(&mut self, data: &[u8]) -> DiskResult<()> {
        if self.read_only {
            return Err(DiskError::ReadOnly {
                path: self.path.clone(),
            });
        }
        if data.len() as u64 != self.size {
            return Err(DiskError::SizeMismatch {
                expected: self.size,
                actual: data.len() as u64,
            });
        }

        self.file.seek(SeekFrom::Start(self.offset))?;
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> DiskResult<()> {
        if !self.read_only {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn describe(&self) -> String {
        if self.offset == 0 {
            self.path.display().to_string()
        } else {
            format!("{}@{:#x}", self.path.display(), self.offset)
        }
    }
}

/// Size of a regular file, or of a block device via seeking to its end
fn file_len(file: &File) -> DiskResult<u64> {
    let metadata = file.metadata()?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    let mut handle = file;
    let len = handle.seek(SeekFrom::End(0))?;
    handle.seek(SeekFrom::Start(0))?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_whole_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("env.bin");
        std::fs::write(&path, b"a=1\0\0\0\0\0").unwrap();

        let mut image = RawImage::open(&path).unwrap();
        assert_eq!(image.size(), 8);
        assert_eq!(image.load().unwrap(), b"a=1\0\0\0\0\0");
    }

    #[test]
    fn test_region_load_and_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.bin");
        let mut data = vec![0xffu8; 64];
        data[16..24].copy_from_slice(b"x=y\0\0\0\0\0");
        std::fs::write(&path, &data).unwrap();

        let mut image = RawImage::open_region(&path, 16, Some(8), false).unwrap();
        assert_eq!(image.load().unwrap(), b"x=y\0\0\0\0\0");

        image.store(b"x=zz\0\0\0\0").unwrap();
        image.sync().unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(&on_disk[16..24], b"x=zz\0\0\0\0");
        // Bytes outside the window are untouched.
        assert!(on_disk[..16].iter().all(|&b| b == 0xff));
        assert!(on_disk[24..].iter().all(|&b| b == 0xff));
        assert_eq!(image.describe(), format!("{}@0x10", path.display()));
    }

    #[test]
    fn test_region_out_of_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.bin");
        std::fs::write(&path, [0u8; 32]).unwrap();

        let result = RawImage::open_region(&path, 16, Some(32), false);
        assert!(matches!(
            result,
            Err(DiskError::OutOfBounds {
                requested: 48,
                size: 32
            })
        ));
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let result = RawImage::open(&path);
        assert!(matches!(result, Err(DiskError::InvalidFormat { .. })));
    }

    #[test]
    fn test_missing_file_rejected() {
        let dir = tempdir().unwrap();
        let result = RawImage::open(dir.path().join("nope.bin"));
        assert!(matches!(result, Err(DiskError::InvalidFormat { .. })));
    }

    #[test]
    fn test_read_only_refuses_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.bin");
        std::fs::write(&path, [0u8; 8]).unwrap();

        let mut image = RawImage::open_region(&path, 0, None, true).unwrap();
        assert!(image.is_read_only());
        assert!(matches!(
            image.store(&[0u8; 8]),
            Err(DiskError::ReadOnly { .. })
        ));
    }

    #[test]
    fn test_store_size_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("env.bin");
        std::fs::write(&path, [0u8; 8]).unwrap();

        let mut image = RawImage::open(&path).unwrap();
        assert!(matches!(
            image.store(&[0u8; 4]),
            Err(DiskError::SizeMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }
}
