//! On-disk environment format
//!
//! The blob is a flat run of NUL-terminated `KEY=VALUE` records with no
//! header, length table or checksum:
//!
//! ```text
//! b o o t d e l a y = 3 \0 b a u d r a t e = 1 1 5 2 0 0 \0 \0 ...
//! └──────── record ──────┘ └────────── record ──────────┘  └ end marker
//! ```
//!
//! The table ends at the first empty record, i.e. at two consecutive NUL
//! bytes. Anything after the end marker is ignored. This is the same layout
//! U-Boot uses for its environment, minus the CRC/flag header that the
//! device layer strips before the bytes reach us.

use log::warn;

use super::error::{VarError, VarResult};
use super::table::{VarId, Variable};

/// Separator between name and value
pub const SEPARATOR: u8 = b'=';

/// Record terminator
pub const TERMINATOR: u8 = 0;

/// Result of scanning a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    /// Variables in ascending offset order
    pub vars: Vec<Variable>,
    /// Offset of the end marker
    pub end: usize,
    /// Records dropped because they had no separator
    pub skipped: usize,
}

/// Scan `blob` into variables.
///
/// Records without a `=` are logged and skipped; scanning continues after
/// their terminator. Fails only when no end marker exists inside the blob.
/// No byte is modified.
pub fn parse(blob: &[u8]) -> VarResult<Parsed> {
    let mut vars = Vec::new();
    let mut skipped = 0;
    let mut pos = 0;

    loop {
        let rest = &blob[pos..];
        let Some(len) = rest.iter().position(|&b| b == TERMINATOR) else {
            return Err(VarError::Unterminated {
                capacity: blob.len(),
            });
        };
        if len == 0 {
            break;
        }

        let record = &rest[..len];
        match record.iter().position(|&b| b == SEPARATOR) {
            Some(sep) => {
                let id = VarId::from_raw(vars.len() as u64);
                vars.push(Variable::new(id, pos, sep, len - sep - 1));
            }
            None => {
                warn!("no separator in data @ {:#010x}, skipped", pos);
                skipped += 1;
            }
        }

        pos += len + 1;
    }

    Ok(Parsed {
        vars,
        end: pos,
        skipped,
    })
}

/// Encode `(name, value)` pairs into a zero-padded blob of `capacity` bytes.
///
/// Pairs are written in iteration order. Fails with `OutOfSpace` when the
/// records plus the end marker do not fit.
pub fn serialize<I, N, V>(pairs: I, capacity: usize) -> VarResult<Vec<u8>>
where
    I: IntoIterator<Item = (N, V)>,
    N: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let mut out = Vec::with_capacity(capacity);
    for (name, value) in pairs {
        let (name, value) = (name.as_ref(), value.as_ref());
        validate_name(name)?;
        validate_value(value)?;

        out.extend_from_slice(name);
        out.push(SEPARATOR);
        out.extend_from_slice(value);
        out.push(TERMINATOR);
    }

    let requested = out.len() + 1;
    if requested > capacity {
        return Err(VarError::OutOfSpace {
            requested,
            available: capacity,
        });
    }

    out.resize(capacity, 0);
    Ok(out)
}

/// Check that `name` can be stored as a record key
pub fn validate_name(name: &[u8]) -> VarResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains(&SEPARATOR) {
        "name contains '='"
    } else if name.contains(&TERMINATOR) {
        "name contains a NUL byte"
    } else {
        return Ok(());
    };

    Err(VarError::InvalidName {
        name: String::from_utf8_lossy(name).into_owned(),
        reason,
    })
}

/// Check that `value` bytes will not split the record
pub fn validate_value(value: &[u8]) -> VarResult<()> {
    match value.iter().position(|&b| b == TERMINATOR) {
        Some(offset) => Err(VarError::InvalidValue { offset }),
        None => Ok(()),
    }
}
