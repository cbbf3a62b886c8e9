mod blob;
pub mod error;
pub mod format;
pub mod fuse_shim;
pub mod shared;
pub mod signal;
pub mod table;

pub use error::*;
pub use format::{parse, serialize, Parsed};
pub use fuse_shim::*;
pub use shared::*;
pub use table::*;
