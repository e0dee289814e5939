//! # ewfkit Pool
//!
//! Segment file providers for the ewfkit EWF image library.
//!
//! An EWF image is a chain of segment files (`.E01`, `.E02`, ...); the
//! media engine addresses them through the [`ewfkit_core::SegmentPool`]
//! contract. This crate supplies:
//! - **FileSegmentPool**: on-disk chains with extension rolling
//! - **MemorySegmentPool**: in-memory chains for tests and assembly
//! - **naming**: the `E01..E99, EAA..ZZZ` extension arithmetic

pub mod file;
pub mod memory;
pub mod naming;

pub use file::FileSegmentPool;
pub use memory::MemorySegmentPool;
pub use naming::{segment_extension, NamingScheme, MAX_SEGMENT_NUMBER};
