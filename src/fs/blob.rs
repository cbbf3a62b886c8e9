//! Fixed-capacity byte buffer backing the environment
//!
//! ```text
//!  0                                   end                    capacity
//!  ├───────────────────────────────────┼──┬───────────────────────┤
//!  │ name=value\0 name=value\0 ...     │\0│ free (zero-filled)    │
//!  └───────────────────────────────────┴──┴───────────────────────┘
//! ```
//!
//! `end` is the offset of the end-of-table sentinel. `blob[end] == 0` holds at
//! all times and `end <= capacity - 1`, so one byte of every blob is
//! permanently spent on the sentinel.
//!
//! The blob is crate-private. All mutation goes through
//! [`VarTable`](super::VarTable), which keeps the cached variable offsets in
//! step with the bytes.

use std::ops::Range;

use log::trace;

use super::error::{VarError, VarResult};

pub(crate) struct Blob {
    bytes: Vec<u8>,
    end: usize,
}

impl Blob {
    /// Wrap parsed bytes. `end` must point at a NUL inside the buffer.
    ///
    /// Whatever follows the sentinel (erased flash, records left behind by an
    /// older environment) is cleared, so `[end, capacity)` is all zero from
    /// here on.
    pub(crate) fn new(mut bytes: Vec<u8>, end: usize) -> Self {
        debug_assert!(end < bytes.len());
        debug_assert_eq!(bytes[end], 0);
        bytes[end + 1..].fill(0);
        Self { bytes, end }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Bytes that can still be claimed without evicting the sentinel
    #[inline]
    pub(crate) fn available(&self) -> usize {
        self.capacity() - 1 - self.end
    }

    /// Fail with `OutOfSpace` unless `requested` more bytes fit
    pub(crate) fn ensure_room(&self, requested: usize) -> VarResult<()> {
        let available = self.available();
        if requested > available {
            return Err(VarError::OutOfSpace {
                requested,
                available,
            });
        }
        Ok(())
    }

    /// Append `name=value\0` at `end`, move `end` past it and rewrite the
    /// sentinel. Returns the offset the record starts at.
    ///
    /// The caller has already checked the room with [`Blob::ensure_room`].
    pub(crate) fn append_record(&mut self, name: &[u8], value: &[u8]) -> usize {
        let start = self.end;
        let sep = start + name.len();
        let value_start = sep + 1;
        let value_end = value_start + value.len();

        self.bytes[start..sep].copy_from_slice(name);
        self.bytes[sep] = b'=';
        self.bytes[value_start..value_end].copy_from_slice(value);
        self.bytes[value_end] = 0;

        self.end = value_end + 1;
        self.bytes[self.end] = 0;
        start
    }

    /// Move everything from `from` up to and including the sentinel by
    /// `delta` bytes and update `end`.
    ///
    /// The sentinel travels with the data, so `blob[end] == 0` holds
    /// afterwards. When shrinking, the bytes vacated behind the new sentinel
    /// are zero-filled, which keeps the free area clear.
    ///
    /// The caller guarantees `from <= end` and that the new end stays below
    /// `capacity`; this is never checked here.
    pub(crate) fn relocate_tail(&mut self, from: usize, delta: isize) {
        let old_end = self.end;
        let new_end = old_end.wrapping_add_signed(delta);
        let dest = from.wrapping_add_signed(delta);

        debug_assert!(from <= old_end);
        debug_assert!(new_end < self.capacity());

        trace!(
            "relocate [{:#x}..={:#x}] -> {:#x} (delta {})",
            from,
            old_end,
            dest,
            delta
        );

        self.bytes.copy_within(from..=old_end, dest);
        if delta < 0 {
            self.bytes[new_end + 1..=old_end].fill(0);
        }
        self.end = new_end;
    }

    pub(crate) fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.bytes[range]
    }

    pub(crate) fn write(&mut self, at: usize, data: &[u8]) {
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }

    pub(crate) fn zero(&mut self, range: Range<usize>) {
        self.bytes[range].fill(0);
    }

    pub(crate) fn put(&mut self, at: usize, byte: u8) {
        self.bytes[at] = byte;
    }
}
