//! # ubootvar-fs
//!
//! U-Boot style environments (`KEY=VALUE\0` records followed by a zero byte)
//! edited in place and exposed as a flat filesystem.
//!
//! - [`VarTable`] parses a fixed-capacity blob and keeps an offset-ordered
//!   table of its variables. Create appends at the end, while remove and
//!   resize move every byte behind the changed record. The blob never grows.
//! - [`VarFs`] maps the table onto inodes: one directory, one file per
//!   variable. With the `fuse` feature it can be mounted through `fuser`.
//! - [`disk`] loads and stores the blob from a file or a window of a flash
//!   image.
//!
//! ```
//! use ubootvar_fs::VarTable;
//!
//! let mut blob = b"bootdelay=3\0baudrate=115200\0".to_vec();
//! blob.resize(64, 0);
//!
//! let mut env = VarTable::mount(blob)?;
//! let id = env.lookup("bootdelay").map(|v| v.id()).unwrap();
//! env.resize(id, 1)?;
//! env.write(id, 0, b"0")?;
//! env.create("ipaddr", "10.0.0.2")?;
//!
//! let names: Vec<_> = env.iter().map(|v| v.name_lossy().into_owned()).collect();
//! assert_eq!(names, ["bootdelay", "baudrate", "ipaddr"]);
//! # Ok::<(), ubootvar_fs::VarError>(())
//! ```

pub mod disk;
pub mod fs;
pub use fs::*;
