//! # ewfkit Format
//!
//! On-disk codecs for the ewfkit EWF image library.
//!
//! Everything that understands bytes lives here:
//! - **checksum**: Adler-32 with seed chaining, empty-block detection
//! - **codec**: deflate/bzip2 chunk codecs and the empty-block record
//! - **section**: the 76-byte section envelope and segment traversal
//! - **volume**: media geometry payloads (EnCase and SMART layouts)
//! - **header**: header value tables, codepage and UTF-16 text handling
//! - **table**: chunk offset tables and the dense chunk location map
//! - **hashes**: `hash`/`digest`/`xhash` payloads
//! - **ranges**: acquiry-error and session sector-range tables
//! - **lef**: logical evidence record streams and the file entry tree
//! - **dialect**: format dialect detection
//! - **metadata**: the in-memory metadata store
//!
//! The codecs are stateless; all image state lives on the handle in
//! `ewfkit-image`.

pub mod checksum;
pub mod codec;
pub mod dialect;
pub mod hashes;
pub mod header;
pub mod lef;
pub mod metadata;
pub mod ranges;
pub mod section;
pub mod table;
pub mod volume;

pub use dialect::detect_dialect;
pub use metadata::MetadataStore;
pub use section::{Section, SectionKind, SectionWalker, SegmentHeader};
pub use table::{ChunkTable, TablePayload};
pub use volume::VolumePayload;
