//! Common test utilities
//!
//! Blob builders, a deterministic pseudo-random generator and a plain
//! ordered model of an environment for differential checks.

#![allow(dead_code)] // Utility functions may not be used by all tests

use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;
use ubootvar_fs::VarTable;

/// `records` followed by zero bytes up to `capacity`
pub fn blob(records: &[u8], capacity: usize) -> Vec<u8> {
    assert!(records.len() <= capacity, "records exceed capacity");
    let mut bytes = records.to_vec();
    bytes.resize(capacity, 0);
    bytes
}

/// Encode pairs as `name=value\0` records without the end marker
pub fn records(pairs: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in pairs {
        out.extend_from_slice(name.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }
    out
}

/// `(name, value)` pairs of a table in iteration order
pub fn pairs(table: &VarTable) -> Vec<(Vec<u8>, Vec<u8>)> {
    table
        .iter()
        .map(|v| (v.name().to_vec(), v.value().to_vec()))
        .collect()
}

/// Value of `name`, or `None`
pub fn value_of(table: &VarTable, name: &str) -> Option<Vec<u8>> {
    table.lookup(name).map(|v| v.value().to_vec())
}

/// Check the blob-level invariants that hold after every operation:
/// the sentinel at `end`, a zero tail and a consistent reparse.
pub fn assert_well_formed(table: &VarTable) {
    let bytes = table.as_bytes();
    let end = table.end();

    assert!(end < table.capacity(), "end {} not below capacity", end);
    assert_eq!(bytes[end], 0, "missing sentinel at {}", end);
    assert!(
        bytes[end..].iter().all(|&b| b == 0),
        "non-zero byte after end {}",
        end
    );

    let used: usize = table.iter().map(|v| v.variable().record_len()).sum();
    assert_eq!(used, end, "record lengths do not add up to end");
}

/// Image file inside a temporary directory
pub struct TestImage {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestImage {
    pub fn new(contents: &[u8]) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("env.bin");
        let mut file = std::fs::File::create(&path).expect("create image");
        file.write_all(contents).expect("write image");
        Self { dir, path }
    }

    pub fn contents(&self) -> Vec<u8> {
        std::fs::read(&self.path).expect("read image")
    }
}

/// Deterministic 64-bit LCG (Knuth's MMIX constants)
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    /// Uniform-ish value in `0..n`
    pub fn below(&mut self, n: usize) -> usize {
        (self.next_u32() as usize) % n
    }

    /// Lowercase ASCII bytes of the given length
    pub fn letters(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| b'a' + self.below(26) as u8).collect()
    }
}

/// Ordered reference model: survivors keep their relative order, new names
/// go to the tail.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Model {
    pub vars: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Model {
    pub fn position(&self, name: &[u8]) -> Option<usize> {
        self.vars.iter().position(|(n, _)| n == name)
    }

    pub fn used(&self) -> usize {
        self.vars.iter().map(|(n, v)| n.len() + v.len() + 2).sum()
    }
}
