//! Variable table over an environment blob
//!
//! A [`VarTable`] owns the blob and an ordered vector of [`Variable`]
//! records. A record holds no pointers, only offsets into the blob:
//!
//! ```text
//!   name_start      value_start        value_end
//!   │               │                  │
//!   ▼               ▼                  ▼
//!   b a u d r a t e = 1 1 5 2 0 0      \0  n e x t = ...
//!   └── name_len ──┘ └─ value_len ─┘        ▲
//!                                           next record starts here
//! ```
//!
//! The vector is kept in ascending offset order. Every insertion happens at
//! the tail, and removals and resizes close or open gaps in place, so the
//! order never changes. That order is what the relocation step relies on to
//! find the records it has to renumber.
//!
//! # Relocation
//!
//! Growing, shrinking or removing a record moves every byte after it:
//!
//! ```text
//! resize(b, +2)
//!   before: a=1\0 b=22\0 c=3\0 \0
//!   after:  a=1\0 b=22..\0 c=3\0 \0      c.* offsets += 2, end += 2
//! ```
//!
//! The capacity check always happens before any byte moves, so an
//! operation that fails leaves blob and table untouched.
//!
//! # Handles
//!
//! Mutators take a [`VarId`]. Ids are assigned in blob order and never
//! reused, so the vector is also sorted by id and a handle can be resolved
//! with a binary search. A handle to a removed variable reports
//! [`VarError::StaleHandle`].
//!
//! # Concurrency
//!
//! None. Relocation moves bytes and then patches offsets; nothing else may
//! touch the table in between. Multi-threaded hosts wrap the whole thing in a
//! mutex, see [`SharedVarFs`](super::SharedVarFs).

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use log::debug;

use super::blob::Blob;
use super::error::{VarError, VarResult};
use super::format;

/// Stable handle to a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u64);

impl VarId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        VarId(raw)
    }

    /// Raw handle value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Location of one `name=value\0` record inside the blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    id: VarId,
    name_start: usize,
    name_len: usize,
    value_start: usize,
    value_len: usize,
}

impl Variable {
    pub(crate) fn new(id: VarId, name_start: usize, name_len: usize, value_len: usize) -> Self {
        Self {
            id,
            name_start,
            name_len,
            value_start: name_start + name_len + 1,
            value_len,
        }
    }

    /// Handle of this variable
    pub fn id(&self) -> VarId {
        self.id
    }

    /// Byte range of the name (not including `=`)
    pub fn name_range(&self) -> Range<usize> {
        self.name_start..self.name_start + self.name_len
    }

    /// Byte range of the value (not including the terminator)
    pub fn value_range(&self) -> Range<usize> {
        self.value_start..self.value_end()
    }

    /// Offset of the record's terminating NUL
    pub fn value_end(&self) -> usize {
        self.value_start + self.value_len
    }

    /// Value length in bytes
    pub fn value_len(&self) -> usize {
        self.value_len
    }

    /// Size of the whole record including `=` and the terminator
    pub fn record_len(&self) -> usize {
        self.value_end() + 1 - self.name_start
    }

    fn shift(&mut self, delta: isize) {
        self.name_start = self.name_start.wrapping_add_signed(delta);
        self.value_start = self.value_start.wrapping_add_signed(delta);
    }
}

/// Borrowed view of a variable and its bytes
#[derive(Clone, Copy)]
pub struct VarRef<'a> {
    var: &'a Variable,
    blob: &'a [u8],
}

impl<'a> VarRef<'a> {
    /// Handle for use with the mutators
    pub fn id(&self) -> VarId {
        self.var.id
    }

    /// Name bytes
    pub fn name(&self) -> &'a [u8] {
        &self.blob[self.var.name_range()]
    }

    /// Name as text, with invalid UTF-8 replaced
    pub fn name_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.name())
    }

    /// Value bytes
    pub fn value(&self) -> &'a [u8] {
        &self.blob[self.var.value_range()]
    }

    /// Value length in bytes
    pub fn len(&self) -> usize {
        self.var.value_len
    }

    /// True when the value is empty
    pub fn is_empty(&self) -> bool {
        self.var.value_len == 0
    }

    /// Underlying offsets
    pub fn variable(&self) -> &'a Variable {
        self.var
    }
}

impl fmt::Debug for VarRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarRef")
            .field("id", &self.var.id)
            .field("name", &self.name_lossy())
            .field("value", &String::from_utf8_lossy(self.value()))
            .field("offset", &self.var.name_start)
            .finish()
    }
}

/// Iterator over variables in blob order
pub struct Iter<'a> {
    vars: std::slice::Iter<'a, Variable>,
    blob: &'a [u8],
}

impl<'a> Iterator for Iter<'a> {
    type Item = VarRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let blob = self.blob;
        self.vars.next().map(|var| VarRef { var, blob })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.vars.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

/// Mounted environment: blob plus ordered variable records
pub struct VarTable {
    blob: Blob,
    vars: Vec<Variable>,
    next_id: u64,
    skipped: usize,
}

impl VarTable {
    /// Parse `bytes` and take ownership of them.
    ///
    /// The length of `bytes` is the capacity; it never changes while mounted.
    /// Bytes after the end marker are zeroed once the parse has succeeded.
    pub fn mount(bytes: Vec<u8>) -> VarResult<Self> {
        let parsed = format::parse(&bytes)?;
        let table = Self {
            next_id: parsed.vars.len() as u64,
            skipped: parsed.skipped,
            vars: parsed.vars,
            blob: Blob::new(bytes, parsed.end),
        };

        debug!(
            "mounted environment: {} variables, {}/{} bytes used, {} records skipped",
            table.vars.len(),
            table.end(),
            table.capacity(),
            table.skipped
        );
        Ok(table)
    }

    /// Mount a zero-filled blob of `capacity` bytes
    pub fn empty(capacity: usize) -> VarResult<Self> {
        Self::mount(vec![0; capacity])
    }

    /// Drop the records and hand back the blob
    pub fn unmount(self) -> Vec<u8> {
        self.blob.into_bytes()
    }

    /// Blob size
    pub fn capacity(&self) -> usize {
        self.blob.capacity()
    }

    /// Offset of the end-of-table sentinel
    pub fn end(&self) -> usize {
        self.blob.end()
    }

    /// `capacity - end`
    pub fn free_space(&self) -> usize {
        self.capacity() - self.end()
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when there are no variables
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Records dropped at mount time for lack of a separator
    pub fn skipped_records(&self) -> usize {
        self.skipped
    }

    /// Read-only view of the whole blob
    pub fn as_bytes(&self) -> &[u8] {
        self.blob.as_bytes()
    }

    /// Find a variable by name.
    ///
    /// Linear scan comparing length first, then bytes. If the blob holds the
    /// same name twice, the first one in blob order wins.
    pub fn lookup(&self, name: impl AsRef<[u8]>) -> Option<VarRef<'_>> {
        let name = name.as_ref();
        let blob = self.blob.as_bytes();
        self.vars
            .iter()
            .find(|var| var.name_len == name.len() && &blob[var.name_range()] == name)
            .map(|var| VarRef { var, blob })
    }

    /// Resolve a handle
    pub fn get(&self, id: VarId) -> Option<VarRef<'_>> {
        let idx = self.position(id).ok()?;
        Some(VarRef {
            var: &self.vars[idx],
            blob: self.blob.as_bytes(),
        })
    }

    /// Variables in ascending offset order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            vars: self.vars.iter(),
            blob: self.blob.as_bytes(),
        }
    }

    /// Append a new `name=value` record at the end of the table.
    ///
    /// The caller must make sure `name` is not already present; the table
    /// does not check. See [`VarTable::set`] for the checked variant.
    pub fn create(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> VarResult<VarId> {
        let (name, value) = (name.as_ref(), value.as_ref());
        format::validate_name(name)?;
        format::validate_value(value)?;

        let required = name.len() + value.len() + 2;
        self.blob.ensure_room(required)?;

        let start = self.blob.append_record(name, value);
        let id = self.alloc_id();
        self.vars
            .push(Variable::new(id, start, name.len(), value.len()));

        debug!(
            "create {:?} ({} bytes) at {:#x}",
            String::from_utf8_lossy(name),
            value.len(),
            start
        );
        Ok(id)
    }

    /// Remove a variable and close the gap it leaves
    pub fn remove(&mut self, id: VarId) -> VarResult<()> {
        let idx = self.position(id)?;
        let removed = self.vars[idx].record_len();

        self.adjust(idx, -(removed as isize));
        let var = self.vars.remove(idx);

        debug!(
            "remove {} at {:#x}, {} bytes reclaimed",
            var.id, var.name_start, removed
        );
        Ok(())
    }

    /// Grow or shrink a value to `new_len` bytes.
    ///
    /// Grown bytes are zero-filled. Fails with `OutOfSpace` before touching
    /// anything if the blob cannot absorb the growth.
    pub fn resize(&mut self, id: VarId, new_len: usize) -> VarResult<()> {
        let idx = self.position(id)?;
        let old_len = self.vars[idx].value_len;
        if new_len == old_len {
            return Ok(());
        }
        if new_len > old_len {
            self.blob.ensure_room(new_len - old_len)?;
        }

        let delta = new_len as isize - old_len as isize;
        let old_value_end = self.vars[idx].value_end();

        self.adjust(idx, delta);

        let var = &mut self.vars[idx];
        var.value_len = new_len;
        let new_value_end = var.value_end();

        if delta > 0 {
            self.blob.zero(old_value_end..new_value_end);
        }
        self.blob.put(new_value_end, format::TERMINATOR);

        debug!("resize {} from {} to {} bytes", id, old_len, new_len);
        Ok(())
    }

    /// Copy value bytes starting at `pos` into `buf`.
    ///
    /// Returns the number of bytes copied, which is short at the end of the
    /// value and zero at or past it.
    pub fn read(&self, id: VarId, pos: usize, buf: &mut [u8]) -> VarResult<usize> {
        let var = &self.vars[self.position(id)?];
        if pos >= var.value_len {
            return Ok(0);
        }

        let n = buf.len().min(var.value_len - pos);
        let start = var.value_start + pos;
        buf[..n].copy_from_slice(self.blob.slice(start..start + n));
        Ok(n)
    }

    /// Overwrite value bytes starting at `pos`.
    ///
    /// The range must lie inside the current value; growing is a separate
    /// [`VarTable::resize`].
    pub fn write(&mut self, id: VarId, pos: usize, buf: &[u8]) -> VarResult<usize> {
        let var = &self.vars[self.position(id)?];
        let size = var.value_len;
        match pos.checked_add(buf.len()) {
            Some(end) if end <= size => {}
            _ => {
                return Err(VarError::OutOfBounds {
                    pos,
                    len: buf.len(),
                    size,
                })
            }
        }
        format::validate_value(buf)?;

        let start = var.value_start + pos;
        self.blob.write(start, buf);
        Ok(buf.len())
    }

    /// Set `name` to `value`, creating the variable if it does not exist.
    ///
    /// Existing variables keep their position in the table.
    pub fn set(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> VarResult<VarId> {
        let (name, value) = (name.as_ref(), value.as_ref());
        format::validate_value(value)?;

        match self.lookup(name).map(|v| v.id()) {
            Some(id) => {
                self.resize(id, value.len())?;
                self.write(id, 0, value)?;
                Ok(id)
            }
            None => self.create(name, value),
        }
    }

    /// Move all bytes after the record at `idx` by `delta` and renumber the
    /// records that follow it.
    ///
    /// The anchor record itself is left alone; callers update it. The room
    /// check must already have been done.
    fn adjust(&mut self, idx: usize, delta: isize) {
        let from = self.vars[idx].value_end() + 1;
        self.blob.relocate_tail(from, delta);

        for var in &mut self.vars[idx + 1..] {
            var.shift(delta);
        }
    }

    fn position(&self, id: VarId) -> VarResult<usize> {
        self.vars
            .binary_search_by_key(&id, |var| var.id)
            .map_err(|_| VarError::StaleHandle(id))
    }

    fn alloc_id(&mut self) -> VarId {
        let id = VarId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<'a> IntoIterator for &'a VarTable {
    type Item = VarRef<'a>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for VarTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarTable")
            .field("capacity", &self.capacity())
            .field("end", &self.end())
            .field("vars", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}
