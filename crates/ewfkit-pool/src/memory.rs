//! In-memory segment pool
//!
//! Backs the test suites and any caller that assembles or inspects images
//! without touching the filesystem.

use ewfkit_core::{Error, Result, SegmentPool};

/// Segment pool backed by in-memory buffers
#[derive(Debug, Default)]
pub struct MemorySegmentPool {
    segments: Vec<Vec<u8>>,
}

impl MemorySegmentPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool over existing segment images
    pub fn from_segments(segments: Vec<Vec<u8>>) -> Self {
        Self { segments }
    }

    /// Borrow a segment's bytes
    pub fn segment(&self, index: usize) -> Option<&[u8]> {
        self.segments.get(index).map(|s| s.as_slice())
    }

    /// Mutably borrow a segment's bytes, e.g. to inject corruption in tests
    pub fn segment_mut(&mut self, index: usize) -> Option<&mut Vec<u8>> {
        self.segments.get_mut(index)
    }

    /// Consume the pool and return its segment images
    pub fn into_segments(self) -> Vec<Vec<u8>> {
        self.segments
    }
}

impl SegmentPool for MemorySegmentPool {
    fn count(&self) -> usize {
        self.segments.len()
    }

    fn add_segment(&mut self) -> Result<usize> {
        self.segments.push(Vec::new());
        Ok(self.segments.len() - 1)
    }

    fn size(&mut self, index: usize) -> Result<u64> {
        self.segments
            .get(index)
            .map(|s| s.len() as u64)
            .ok_or_else(|| Error::argument(format!("segment index {} out of range", index)))
    }

    fn read_at(&mut self, index: usize, offset: u64, buf: &mut [u8]) -> Result<()> {
        let segment = self
            .segments
            .get(index)
            .ok_or_else(|| Error::argument(format!("segment index {} out of range", index)))?;
        let start = offset as usize;
        let end = start + buf.len();
        if end > segment.len() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at {} beyond segment size {}",
                    buf.len(),
                    offset,
                    segment.len()
                ),
            )));
        }
        buf.copy_from_slice(&segment[start..end]);
        Ok(())
    }

    fn write_at(&mut self, index: usize, offset: u64, buf: &[u8]) -> Result<()> {
        let segment = self
            .segments
            .get_mut(index)
            .ok_or_else(|| Error::argument(format!("segment index {} out of range", index)))?;
        let start = offset as usize;
        let end = start + buf.len();
        if end > segment.len() {
            segment.resize(end, 0);
        }
        segment[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn truncate(&mut self, index: usize, len: u64) -> Result<()> {
        let segment = self
            .segments
            .get_mut(index)
            .ok_or_else(|| Error::argument(format!("segment index {} out of range", index)))?;
        segment.truncate(len as usize);
        Ok(())
    }

    fn close(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_extends_segment() {
        let mut pool = MemorySegmentPool::new();
        let index = pool.add_segment().unwrap();
        pool.write_at(index, 10, b"abc").unwrap();
        assert_eq!(pool.size(index).unwrap(), 13);
        assert_eq!(&pool.segment(index).unwrap()[10..], b"abc");
    }

    #[test]
    fn test_short_read_is_an_error() {
        let mut pool = MemorySegmentPool::from_segments(vec![vec![1, 2, 3]]);
        let mut buf = [0u8; 4];
        assert!(matches!(
            pool.read_at(0, 1, &mut buf),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_truncate_and_rewrite() {
        let mut pool = MemorySegmentPool::from_segments(vec![vec![0xFF; 100]]);
        pool.truncate(0, 40).unwrap();
        assert_eq!(pool.size(0).unwrap(), 40);
        pool.write_at(0, 40, &[0x11; 8]).unwrap();
        assert_eq!(pool.size(0).unwrap(), 48);
    }
}
