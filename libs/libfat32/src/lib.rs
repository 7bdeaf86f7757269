//! libfat32 — read-only access to FAT32 disk images.
//!
//! Given a binary image file, this library decodes the on-disk metadata and
//! exposes an API for walking directory trees, reading file contents, and
//! serving a user-space filesystem.
//!
//! The library is organized into these layers:
//! - **Reader** (`reader`) — typed little-endian reads over a seekable source
//! - **Headers** (`bpb`) — BPB, EBPB, and FSInfo decode and validation
//! - **Volume** (`volume`) — cluster arithmetic and FAT chain lookups
//! - **Directories** (`dir`, `lfn`) — 32-byte slot parsing with VFAT long
//!   filename reconstruction
//! - **Files** (`file`) — offset/length reads along a cluster chain
//! - **Session** (`session`, `path`) — path resolution and the open image
//! - **Adapter** (`fuse`) — filesystem-callback surface for mounting
//!
//! The image is never written to. FAT12 and FAT16 volumes are rejected at
//! open time.

pub mod bpb;
pub mod datetime;
pub mod dir;
pub mod error;
pub mod file;
pub mod fuse;
pub mod lfn;
pub mod path;
pub mod reader;
pub mod session;
pub mod volume;

#[cfg(test)]
pub(crate) mod testimg;

pub use dir::{Attributes, DirectoryEntry};
pub use error::{FsError, Result};
pub use session::{FileSystem, VolumeInfo};
pub use volume::Volume;
