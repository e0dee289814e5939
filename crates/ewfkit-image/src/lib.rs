//! # ewfkit Image
//!
//! The media engine and public handle of the ewfkit EWF image library.
//!
//! [`EwfImage`] opens, creates, reads and writes Expert Witness Format
//! images over any [`ewfkit_core::SegmentPool`]:
//! - buffered random-access reads with per-chunk decompression and
//!   checksum verification, served through an LRU chunk cache
//! - streaming writes with chunk compression, segment rolling and the
//!   full trailer-section layout
//! - write-resume of partial acquisitions and delta-shadowed writes over
//!   read-only images
//! - acquisition metadata, hash values, sector-range tables and logical
//!   evidence trees
//!
//! ## Example
//!
//! ```rust,no_run
//! use ewfkit_image::{EwfImage, ImageCreateOptions};
//! use std::path::Path;
//!
//! let mut image =
//!     EwfImage::create_path(Path::new("evidence.E01"), ImageCreateOptions::default()).unwrap();
//! image.set_header_value("case_number", "2024-117").unwrap();
//! image.write_buffer(&[0u8; 4096]).unwrap();
//! image.close().unwrap();
//! ```

pub mod cache;
mod delta;
pub mod handle;
pub mod media;
mod scan;
mod writer;

pub use cache::{ChunkCache, DEFAULT_CACHE_CAPACITY};
pub use handle::{EwfImage, HandleState, ImageCreateOptions, ImageOpenOptions};
pub use media::PreparedChunk;
pub use writer::{DEFAULT_MAX_SEGMENT_SIZE, MAX_SEGMENT_SIZE, MIN_SEGMENT_SIZE};
