//! Delta chunk chain
//!
//! Read-write mode never touches the acquired segments. Modified chunks
//! are appended to delta segments that follow the primary chain in the
//! pool; each is a `delta_chunk` section whose payload is the chunk index,
//! 4 bytes of padding, the uncompressed chunk bytes and a trailing
//! Adler-32. Readers overlay the newest copy of each chunk over the
//! primary table.

use ewfkit_core::{Result, SegmentPool};
use ewfkit_format::checksum::{adler32, ADLER_SEED};
use ewfkit_format::section::{
    MagicFamily, Section, SectionKind, SegmentHeader, SECTION_DESCRIPTOR_SIZE,
    SEGMENT_HEADER_SIZE,
};
use ewfkit_format::table::ChunkLocation;

/// Bytes before the chunk data within a `delta_chunk` payload
pub const DELTA_CHUNK_HEADER_SIZE: usize = 8;

struct OpenDeltaSegment {
    index: usize,
    cursor: u64,
}

/// Appends shadow chunks to the image's delta chain
pub(crate) struct DeltaWriter {
    magic: MagicFamily,
    segment: Option<OpenDeltaSegment>,
    finalized: bool,
}

impl DeltaWriter {
    /// Writer for a pool whose primary chain is complete
    pub fn new(magic: MagicFamily) -> Self {
        Self {
            magic,
            segment: None,
            finalized: false,
        }
    }

    /// Append one modified chunk and return where it now lives
    pub fn write_chunk(
        &mut self,
        pool: &mut dyn SegmentPool,
        chunk_index: u64,
        payload: &[u8],
    ) -> Result<ChunkLocation> {
        if self.segment.is_none() {
            let index = pool.add_segment()?;
            let header = SegmentHeader {
                family: self.magic,
                segment_number: (index + 1) as u16,
            };
            pool.write_at(index, 0, &header.to_bytes())?;
            tracing::debug!(segment = index, "opened delta segment");
            self.segment = Some(OpenDeltaSegment {
                index,
                cursor: SEGMENT_HEADER_SIZE as u64,
            });
        }
        let segment = self.segment.as_mut().expect("delta segment is open");

        let mut section_payload =
            Vec::with_capacity(DELTA_CHUNK_HEADER_SIZE + payload.len() + 4);
        section_payload.extend_from_slice(&(chunk_index as u32).to_le_bytes());
        section_payload.extend_from_slice(&[0u8; 4]);
        section_payload.extend_from_slice(payload);
        section_payload.extend_from_slice(&adler32(payload, ADLER_SEED).to_le_bytes());

        let next = segment.cursor + SECTION_DESCRIPTOR_SIZE as u64 + section_payload.len() as u64;
        let descriptor = Section::encode(
            &SectionKind::DeltaChunk,
            section_payload.len() as u64,
            next,
        );
        pool.write_at(segment.index, segment.cursor, &descriptor)?;
        pool.write_at(
            segment.index,
            segment.cursor + SECTION_DESCRIPTOR_SIZE as u64,
            &section_payload,
        )?;

        let location = ChunkLocation {
            segment: segment.index as u32,
            offset: segment.cursor
                + SECTION_DESCRIPTOR_SIZE as u64
                + DELTA_CHUNK_HEADER_SIZE as u64,
            stored_size: (payload.len() + 4) as u32,
            is_compressed: false,
            is_delta: true,
            is_missing: false,
        };
        segment.cursor = next;
        Ok(location)
    }

    /// Seal the open delta segment with a `done` section
    pub fn finalize(&mut self, pool: &mut dyn SegmentPool) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        if let Some(segment) = self.segment.take() {
            let descriptor = Section::encode(&SectionKind::Done, 0, segment.cursor);
            pool.write_at(segment.index, segment.cursor, &descriptor)?;
            pool.close(segment.index)?;
        }
        self.finalized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ewfkit_format::codec::decode_chunk;
    use ewfkit_format::section::scan_segment;
    use ewfkit_pool::MemorySegmentPool;

    #[test]
    fn test_delta_chunk_roundtrip() {
        // Pool with one (placeholder) primary segment.
        let mut pool = MemorySegmentPool::from_segments(vec![vec![0u8; 64]]);
        let mut writer = DeltaWriter::new(MagicFamily::Evf);

        let payload = vec![0xCD; 4096];
        let location = writer.write_chunk(&mut pool, 7, &payload).unwrap();
        writer.finalize(&mut pool).unwrap();

        assert_eq!(location.segment, 1);
        assert!(location.is_delta);

        let mut stored = vec![0u8; location.stored_size as usize];
        pool.read_at(location.segment as usize, location.offset, &mut stored)
            .unwrap();
        let recovered = decode_chunk(
            &stored,
            false,
            payload.len(),
            ewfkit_core::CompressionMethod::None,
        )
        .unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn test_delta_segment_sections() {
        let mut pool = MemorySegmentPool::from_segments(vec![vec![0u8; 64]]);
        let mut writer = DeltaWriter::new(MagicFamily::Evf);
        writer.write_chunk(&mut pool, 0, &[0x11; 512]).unwrap();
        writer.write_chunk(&mut pool, 3, &[0x22; 512]).unwrap();
        writer.finalize(&mut pool).unwrap();

        let (header, sections) = scan_segment(&mut pool, 1).unwrap();
        assert_eq!(header.segment_number, 2);
        let kinds: Vec<_> = sections.iter().map(|s| s.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::DeltaChunk,
                SectionKind::DeltaChunk,
                SectionKind::Done,
            ]
        );
    }

    #[test]
    fn test_finalize_without_writes_is_noop() {
        let mut pool = MemorySegmentPool::from_segments(vec![vec![0u8; 64]]);
        let mut writer = DeltaWriter::new(MagicFamily::Evf);
        writer.finalize(&mut pool).unwrap();
        assert_eq!(pool.count(), 1);
    }
}
