//! Trait seams between the engine and its collaborators

use crate::error::Result;
use std::io::{Read, Seek};

/// Addressable pool of segment files consumed by the media engine
///
/// The pool owns file naming, descriptor limits and retry policy; the
/// engine addresses segments by zero-based index and surfaces pool errors
/// verbatim. Segment index 0 is the first segment of the image (`.E01`).
pub trait SegmentPool: Send {
    /// Number of segments currently in the pool
    fn count(&self) -> usize;

    /// Append a new, empty segment and return its index
    fn add_segment(&mut self) -> Result<usize>;

    /// Current size in bytes of a segment
    fn size(&mut self, index: usize) -> Result<u64>;

    /// Read exactly `buf.len()` bytes at `offset` within a segment
    fn read_at(&mut self, index: usize, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` at `offset` within a segment, extending it as
    /// needed
    fn write_at(&mut self, index: usize, offset: u64, buf: &[u8]) -> Result<()>;

    /// Truncate a segment to `len` bytes
    fn truncate(&mut self, index: usize, len: u64) -> Result<()>;

    /// Release any resources held for a segment; subsequent accesses
    /// reacquire them
    fn close(&mut self, index: usize) -> Result<()>;
}

/// Bound for consumers that treat decoded media as one seekable stream
///
/// Partition and filesystem layers built on top of an image want a
/// `File`-like view of the media, not chunk or segment structure. An
/// image handle presents exactly that: it decodes chunks through its
/// [`SegmentPool`] on demand while exposing plain `Read` + `Seek`, so it
/// satisfies this bound through the blanket impl, as does any raw
/// stand-in used in tests.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}
