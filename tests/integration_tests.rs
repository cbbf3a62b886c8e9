// Copyright (c) 2024-2026 Tyler Zervas
// SPDX-License-Identifier: MIT

//! Integration tests for ubootvar-fs
//!
//! These tests drive the environment table through its public API only:
//! - The concrete remove/resize/fill-up walkthroughs
//! - Neighbor isolation and space accounting
//! - Atomicity of failed mutations
//! - Round trips through serialize and mount
//! - A randomized comparison against an ordered reference model

mod common;

use common::{assert_well_formed, blob, pairs, records, value_of, Lcg, Model};
use ubootvar_fs::{format, VarError, VarTable};

#[test]
fn test_remove_closes_gap() {
    let mut t = VarTable::mount(blob(b"foo=bar\0baz=1\0\0", 64)).unwrap();
    assert_eq!(value_of(&t, "foo").unwrap(), b"bar");
    assert_eq!(value_of(&t, "baz").unwrap(), b"1");

    let foo = t.lookup("foo").unwrap().id();
    t.remove(foo).unwrap();

    assert_eq!(t.as_bytes(), &blob(b"baz=1\0\0", 64)[..]);
    assert_eq!(value_of(&t, "baz").unwrap(), b"1");
    assert!(t.lookup("foo").is_none());
    assert_well_formed(&t);
}

#[test]
fn test_grow_after_remove() {
    let mut t = VarTable::mount(blob(b"foo=bar\0baz=1\0\0", 64)).unwrap();
    let foo = t.lookup("foo").unwrap().id();
    t.remove(foo).unwrap();

    let baz = t.lookup("baz").unwrap().id();
    t.resize(baz, 3).unwrap();
    t.write(baz, 0, b"100").unwrap();

    assert_eq!(t.as_bytes(), &blob(b"baz=100\0\0", 64)[..]);
    assert_eq!(value_of(&t, "baz").unwrap(), b"100");
    assert_well_formed(&t);
}

#[test]
fn test_create_until_full() {
    let capacity = 32;
    let mut t = VarTable::empty(capacity).unwrap();
    let mut created = Vec::new();

    let failure = loop {
        let name = format!("v{}", created.len());
        let snapshot = t.as_bytes().to_vec();
        let fits = t.end() + name.len() + 1 + 2 <= capacity - 1;

        match t.create(&name, "x") {
            Ok(_) => {
                assert!(fits, "create of {} should have failed", name);
                created.push(name);
            }
            Err(e) => {
                assert!(!fits, "create of {} should have succeeded", name);
                assert_eq!(t.as_bytes(), &snapshot[..]);
                break e;
            }
        }
    };

    // "vN=x\0" is five bytes; six records end at 30, the seventh would pass 31
    assert_eq!(created.len(), 6);
    assert!(matches!(failure, VarError::OutOfSpace { .. }));
    assert_eq!(failure.errno(), libc::ENOSPC);

    for name in &created {
        assert_eq!(value_of(&t, name).unwrap(), b"x");
    }
    assert_well_formed(&t);
}

#[test]
fn test_lookup_after_create() {
    let mut t = VarTable::mount(blob(b"a=1\0", 64)).unwrap();
    let cases = [("bootcmd", "run netboot"), ("e", ""), ("serial#", "A1B2C3")];

    for (name, value) in cases {
        assert!(name.len() + value.len() + 2 < t.capacity() - t.end());
        t.create(name, value).unwrap();
        assert_eq!(value_of(&t, name).unwrap(), value.as_bytes());
    }
    assert_eq!(t.len(), 4);
    assert_well_formed(&t);
}

#[test]
fn test_neighbor_isolation() {
    let initial = records(&[
        ("alpha", "one"),
        ("beta", "two two"),
        ("gamma", ""),
        ("delta", "four"),
    ]);
    let names = ["alpha", "beta", "gamma", "delta"];

    for target in names {
        for new_len in [0usize, 2, 9] {
            let mut t = VarTable::mount(blob(&initial, 96)).unwrap();
            let before: Vec<_> = names.iter().map(|n| value_of(&t, n)).collect();

            let id = t.lookup(target).unwrap().id();
            t.resize(id, new_len).unwrap();

            for (name, old) in names.iter().zip(&before) {
                if *name != target {
                    assert_eq!(&value_of(&t, name), old, "{} changed after resizing {}", name, target);
                }
            }
            assert_well_formed(&t);
        }

        let mut t = VarTable::mount(blob(&initial, 96)).unwrap();
        let before: Vec<_> = names.iter().map(|n| value_of(&t, n)).collect();
        let id = t.lookup(target).unwrap().id();
        t.remove(id).unwrap();

        for (name, old) in names.iter().zip(&before) {
            if *name != target {
                assert_eq!(&value_of(&t, name), old, "{} changed after removing {}", name, target);
            }
        }
        assert_well_formed(&t);
    }
}

#[test]
fn test_space_accounting_on_remove() {
    let initial = records(&[("ethaddr", "00:11:22:33:44:55"), ("x", ""), ("bootargs", "console=ttyS0")]);

    for name in ["ethaddr", "x", "bootargs"] {
        let mut t = VarTable::mount(blob(&initial, 128)).unwrap();
        let (id, value_len) = {
            let var = t.lookup(name).unwrap();
            (var.id(), var.len())
        };
        let free_before = t.free_space();

        t.remove(id).unwrap();
        assert_eq!(t.free_space() - free_before, name.len() + value_len + 2);
    }
}

#[test]
fn test_failed_operations_leave_blob_untouched() {
    let mut t = VarTable::mount(blob(b"a=12345\0b=x\0", 16)).unwrap();
    let snapshot = t.as_bytes().to_vec();
    let a = t.lookup("a").unwrap().id();

    // end = 12, so at most 3 bytes can still be claimed
    assert!(matches!(t.resize(a, 9), Err(VarError::OutOfSpace { .. })));
    assert!(matches!(t.create("cc", "1"), Err(VarError::OutOfSpace { .. })));
    assert!(matches!(t.create("", "1"), Err(VarError::InvalidName { .. })));
    assert!(matches!(t.create("a=b", "1"), Err(VarError::InvalidName { .. })));
    assert!(matches!(t.set("a", "12\0"), Err(VarError::InvalidValue { offset: 2 })));
    assert!(matches!(t.write(a, 4, b"xyz"), Err(VarError::OutOfBounds { .. })));

    assert_eq!(t.as_bytes(), &snapshot[..]);
    assert_eq!(value_of(&t, "a").unwrap(), b"12345");
    assert_eq!(value_of(&t, "b").unwrap(), b"x");
}

#[test]
fn test_stale_handle_after_remove() {
    let mut t = VarTable::mount(blob(b"a=1\0b=2\0", 16)).unwrap();
    let a = t.lookup("a").unwrap().id();
    t.remove(a).unwrap();

    assert!(t.get(a).is_none());
    assert_eq!(t.remove(a), Err(VarError::StaleHandle(a)));
    assert_eq!(t.resize(a, 1), Err(VarError::StaleHandle(a)));
    assert_eq!(t.read(a, 0, &mut [0u8; 1]), Err(VarError::StaleHandle(a)));

    // A re-created variable gets a fresh handle
    let again = t.create("a", "1").unwrap();
    assert_ne!(again, a);
}

#[test]
fn test_round_trip_through_serialize() {
    let vars: Vec<(&str, &str)> = vec![
        ("bootdelay", "3"),
        ("baudrate", "115200"),
        ("empty", ""),
        ("bootcmd", "setenv bootargs ${bootargs} rw; bootm 0x82000000"),
        ("stdin", "serial"),
    ];

    let bytes = format::serialize(vars.iter().copied(), 256).unwrap();
    let t = VarTable::mount(bytes.clone()).unwrap();
    let expected: Vec<(Vec<u8>, Vec<u8>)> = vars
        .iter()
        .map(|(n, v)| (n.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect();
    assert_eq!(pairs(&t), expected);
    assert_well_formed(&t);

    // And back: the mounted bytes serialize to the same blob
    let again = format::serialize(pairs(&t), 256).unwrap();
    assert_eq!(again, bytes);

    let parsed = format::parse(&bytes).unwrap();
    assert_eq!(parsed.vars.len(), vars.len());
    assert_eq!(parsed.skipped, 0);
    assert_eq!(parsed.end, t.end());
}

#[test]
fn test_serialize_needs_room_for_end_marker() {
    // "a=1\0" is 4 bytes; the end marker needs a fifth
    assert!(format::serialize([("a", "1")], 5).is_ok());
    assert!(matches!(
        format::serialize([("a", "1")], 4),
        Err(VarError::OutOfSpace {
            requested: 5,
            available: 4
        })
    ));
}

#[test]
fn test_malformed_records_survive_relocation() {
    let mut t = VarTable::mount(blob(b"foo=bar\0garbage\0baz=1\0\0", 48)).unwrap();
    assert_eq!(t.len(), 2);
    assert_eq!(t.skipped_records(), 1);

    let foo = t.lookup("foo").unwrap().id();
    t.remove(foo).unwrap();
    assert_eq!(t.as_bytes(), &blob(b"garbage\0baz=1\0\0", 48)[..]);

    let baz = t.lookup("baz").unwrap().id();
    t.resize(baz, 0).unwrap();
    assert_eq!(&t.as_bytes()[..14], b"garbage\0baz=\0\0");

    let reparsed = VarTable::mount(t.as_bytes().to_vec()).unwrap();
    assert_eq!(reparsed.skipped_records(), 1);
    assert_eq!(pairs(&reparsed), vec![(b"baz".to_vec(), Vec::new())]);
}

#[test]
fn test_junk_after_end_marker() {
    let mut bytes = b"a=1\0\0stale=9\0".to_vec();
    bytes.resize(24, 0xff);
    let mut t = VarTable::mount(bytes).unwrap();
    assert_eq!(t.len(), 1);
    assert!(t.as_bytes()[4..].iter().all(|&b| b == 0));

    t.create("b", "2").unwrap();
    assert_eq!(&t.as_bytes()[..9], b"a=1\0b=2\0\0");

    let a = t.lookup("a").unwrap().id();
    t.remove(a).unwrap();
    assert_eq!(t.end(), 4);
    assert_eq!(&t.as_bytes()[..4], b"b=2\0");
    assert!(t.as_bytes()[4..].iter().all(|&b| b == 0));
    assert_well_formed(&t);

    let reparsed = VarTable::mount(t.unmount()).unwrap();
    assert_eq!(pairs(&reparsed), vec![(b"b".to_vec(), b"2".to_vec())]);
}

#[test]
fn test_unterminated_blob_rejected() {
    assert!(matches!(
        VarTable::mount(b"a=1".to_vec()),
        Err(VarError::Unterminated { capacity: 3 })
    ));
    assert!(matches!(
        VarTable::mount(Vec::new()),
        Err(VarError::Unterminated { capacity: 0 })
    ));
}

/// Apply random operations to the table and to an ordered model, comparing
/// them after every step.
#[test]
fn test_random_operations_match_model() {
    const CAPACITY: usize = 192;
    let names: Vec<Vec<u8>> = (0..10).map(|k| format!("var{}", k).into_bytes()).collect();

    for seed in 1..=8u64 {
        let mut rng = Lcg::new(seed);
        let mut t = VarTable::empty(CAPACITY).unwrap();
        let mut model = Model::default();

        for step in 0..400 {
            let snapshot = t.as_bytes().to_vec();
            let op = rng.below(5);

            match op {
                // create
                0 => {
                    let name = &names[rng.below(names.len())];
                    if model.position(name).is_some() {
                        continue;
                    }
                    let len = rng.below(12);
                    let value = rng.letters(len);
                    let fits = t.end() + name.len() + value.len() + 2 <= CAPACITY - 1;

                    match t.create(name, &value) {
                        Ok(_) => {
                            assert!(fits, "seed {} step {}: create should fail", seed, step);
                            model.vars.push((name.clone(), value));
                        }
                        Err(e) => {
                            assert!(!fits, "seed {} step {}: unexpected {}", seed, step, e);
                            assert_eq!(t.as_bytes(), &snapshot[..]);
                        }
                    }
                }

                // remove
                1 if !model.vars.is_empty() => {
                    let idx = rng.below(model.vars.len());
                    let (name, value) = model.vars.remove(idx);
                    let free_before = t.free_space();

                    let id = t.lookup(&name).unwrap().id();
                    t.remove(id).unwrap();
                    assert_eq!(t.free_space() - free_before, name.len() + value.len() + 2);
                }

                // shrink
                2 if !model.vars.is_empty() => {
                    let idx = rng.below(model.vars.len());
                    let new_len = rng.below(model.vars[idx].1.len() + 1);

                    let id = t.lookup(&model.vars[idx].0).unwrap().id();
                    t.resize(id, new_len).unwrap();
                    model.vars[idx].1.truncate(new_len);
                }

                // grow and fill
                3 if !model.vars.is_empty() => {
                    let idx = rng.below(model.vars.len());
                    let extra = 1 + rng.below(10);
                    let old_len = model.vars[idx].1.len();
                    let fits = t.end() + extra <= CAPACITY - 1;

                    let id = t.lookup(&model.vars[idx].0).unwrap().id();
                    match t.resize(id, old_len + extra) {
                        Ok(()) => {
                            assert!(fits);
                            assert_eq!(t.get(id).unwrap().value()[old_len..], vec![0u8; extra][..]);
                            let fill = rng.letters(extra);
                            t.write(id, old_len, &fill).unwrap();
                            model.vars[idx].1.extend_from_slice(&fill);
                        }
                        Err(e) => {
                            assert!(!fits, "seed {} step {}: unexpected {}", seed, step, e);
                            assert!(matches!(e, VarError::OutOfSpace { .. }));
                            assert_eq!(t.as_bytes(), &snapshot[..]);
                        }
                    }
                }

                // overwrite in place
                4 if !model.vars.is_empty() => {
                    let idx = rng.below(model.vars.len());
                    let len = model.vars[idx].1.len();
                    if len == 0 {
                        continue;
                    }
                    let pos = rng.below(len);
                    let n = 1 + rng.below(len - pos);
                    let data = rng.letters(n);

                    let id = t.lookup(&model.vars[idx].0).unwrap().id();
                    assert_eq!(t.write(id, pos, &data).unwrap(), data.len());
                    model.vars[idx].1[pos..pos + data.len()].copy_from_slice(&data);
                }

                _ => continue,
            }

            assert_eq!(pairs(&t), model.vars, "seed {} step {} op {}", seed, step, op);
            assert_eq!(t.end(), model.used());
            assert_well_formed(&t);

            if step % 25 == 0 {
                let reparsed = VarTable::mount(t.as_bytes().to_vec()).unwrap();
                assert_eq!(pairs(&reparsed), model.vars);
            }
        }
    }
}
