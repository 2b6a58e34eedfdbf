//! A small on-disk file system for fixed-size, sector-addressable devices.
//!
//! Layout on disk:
//! - sector 0: header of the free-map file
//! - sector 1: header of the root directory file
//! - everything else: file headers, index blocks and data, wherever the
//!   free map placed them
//!
//! The layers, from bottom to top:
//! 1. `block_dev`: synchronous sector read/write, implemented by the user.
//! 2. `bitmap`: device-wide free-sector map, persisted as a regular file.
//! 3. `layout`: the on-disk records - file headers with direct,
//!    single-indirect and double-indirect pointer tiers, index blocks,
//!    directory entries.
//! 4. `file` / `directory`: open-file handles and the directory table.
//! 5. `fs`: the `FileSystem` object tying it all together.
//!
//! Files have a fixed size chosen at creation; there is no journalling and
//! no internal locking. A caller that shares a `FileSystem` across threads
//! is expected to wrap it in a single mutex.

#![no_std]

extern crate alloc;

#[macro_use]
extern crate static_assertions;

pub mod bitmap;
pub mod block_dev;
pub mod consts;
pub mod directory;
pub mod error;
pub mod file;
pub mod fs;
pub mod layout;

pub(crate) use consts::*;

pub use bitmap::FreeMap;
pub use block_dev::BlockDevice;
pub use directory::Directory;
pub use error::{FsError, Result};
pub use file::OpenFile;
pub use fs::FileSystem;
pub use layout::{DirEntry, FileHeader, FileKind, IndexBlock};
