//! A single-volume, inode-based filesystem on top of a fixed-size block
//! device. Files are flat (no directories): `create` hands out an inode
//! number and all further operations address the file by that number.

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

mod block_dev;
mod block_cache;
mod error;
mod layout;
mod free_map;
mod fs;

pub use block_dev::BlockDevice;
pub use error::{FsError, Result};
pub use free_map::FreeMap;
pub use fs::FileSystem;
pub use layout::{Geometry, MAX_FILE_SIZE};

pub const BLOCK_SZ: usize = 4096;
type DataBlock = [u8; BLOCK_SZ];
