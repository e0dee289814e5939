//! Chunk offset tables
//!
//! Each `sectors` section is described by a `table` section (and a
//! redundant `table2` copy used for recovery). The table payload is a
//! 24-byte header (entry count, base offset, Adler-32 of the header)
//! followed by 4-byte entries and an Adler-32 of the entry array. An entry
//! is a 31-bit offset relative to the base offset, with the most
//! significant bit flagging a compressed chunk.
//!
//! Entry stored sizes are implicit: each chunk ends where the next one
//! starts, and the last chunk of a table ends at the enclosing chunk-data
//! region's end.

use crate::checksum::{adler32, ADLER_SEED};
use ewfkit_core::{Error, Result};

/// Size of the table payload header
pub const TABLE_HEADER_SIZE: usize = 24;

/// Maximum entries per table section (conservative bound shared by all
/// dialects)
pub const TABLE_ENTRY_LIMIT: usize = 16_375;

const COMPRESSED_FLAG: u32 = 0x8000_0000;
const OFFSET_MASK: u32 = 0x7fff_ffff;

/// One table entry: a chunk's position relative to the table base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    /// Offset relative to the table's base offset
    pub offset: u32,
    /// Whether the chunk is stored compressed
    pub is_compressed: bool,
}

impl TableEntry {
    fn to_raw(self) -> u32 {
        if self.is_compressed {
            self.offset | COMPRESSED_FLAG
        } else {
            self.offset
        }
    }

    fn from_raw(raw: u32) -> Self {
        Self {
            offset: raw & OFFSET_MASK,
            is_compressed: raw & COMPRESSED_FLAG != 0,
        }
    }
}

/// A decoded `table`/`table2` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePayload {
    /// Base file offset the entries are relative to
    pub base_offset: u64,
    /// Chunk entries in media order
    pub entries: Vec<TableEntry>,
}

impl TablePayload {
    /// Encode the payload with header and entry checksums
    pub fn encode(&self) -> Vec<u8> {
        let mut payload =
            Vec::with_capacity(TABLE_HEADER_SIZE + self.entries.len() * 4 + 4);
        payload.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        payload.extend_from_slice(&[0u8; 4]);
        payload.extend_from_slice(&self.base_offset.to_le_bytes());
        payload.extend_from_slice(&[0u8; 4]);
        let header_checksum = adler32(&payload[..TABLE_HEADER_SIZE - 4], ADLER_SEED);
        payload.extend_from_slice(&header_checksum.to_le_bytes());

        let entries_start = payload.len();
        for entry in &self.entries {
            payload.extend_from_slice(&entry.to_raw().to_le_bytes());
        }
        let entries_checksum = adler32(&payload[entries_start..], ADLER_SEED);
        payload.extend_from_slice(&entries_checksum.to_le_bytes());
        payload
    }

    /// Decode and verify a payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < TABLE_HEADER_SIZE {
            return Err(Error::bad_section_header("table payload too short"));
        }
        let stored_header_checksum =
            u32::from_le_bytes(payload[20..24].try_into().expect("4 bytes"));
        let header_checksum = adler32(&payload[..TABLE_HEADER_SIZE - 4], ADLER_SEED);
        if header_checksum != stored_header_checksum {
            return Err(Error::bad_section_header(format!(
                "table header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_header_checksum, header_checksum
            )));
        }
        let count = u32::from_le_bytes(payload[0..4].try_into().expect("4 bytes")) as usize;
        if count > TABLE_ENTRY_LIMIT {
            return Err(Error::bad_section_header(format!(
                "table declares {} entries, limit is {}",
                count, TABLE_ENTRY_LIMIT
            )));
        }
        let base_offset = u64::from_le_bytes(payload[8..16].try_into().expect("8 bytes"));

        let entries_start = TABLE_HEADER_SIZE;
        let entries_end = entries_start + count * 4;
        if payload.len() < entries_end + 4 {
            return Err(Error::bad_section_header(format!(
                "table payload of {} bytes cannot hold {} entries",
                payload.len(),
                count
            )));
        }
        let stored_entries_checksum =
            u32::from_le_bytes(payload[entries_end..entries_end + 4].try_into().expect("4 bytes"));
        let entries_checksum = adler32(&payload[entries_start..entries_end], ADLER_SEED);
        if entries_checksum != stored_entries_checksum {
            return Err(Error::bad_section_header(format!(
                "table entries checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_entries_checksum, entries_checksum
            )));
        }
        let entries = payload[entries_start..entries_end]
            .chunks_exact(4)
            .map(|raw| TableEntry::from_raw(u32::from_le_bytes(raw.try_into().expect("4 bytes"))))
            .collect();
        Ok(Self {
            base_offset,
            entries,
        })
    }
}

/// Where a chunk's stored bytes live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    /// Pool index of the segment holding the chunk
    pub segment: u32,
    /// Absolute file offset of the stored bytes within the segment
    pub offset: u64,
    /// Stored length in bytes
    pub stored_size: u32,
    /// Whether the stored form is compressed
    pub is_compressed: bool,
    /// Whether the chunk comes from a delta segment
    pub is_delta: bool,
    /// Whether the chunk's location could not be recovered
    pub is_missing: bool,
}

/// Dense map from logical chunk index to stored location
///
/// Built by appending each segment's table payloads in segment order;
/// delta chunks are overlaid afterwards and shadow the primary entries.
#[derive(Debug, Default)]
pub struct ChunkTable {
    locations: Vec<ChunkLocation>,
}

impl ChunkTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks currently mapped
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no chunks are mapped yet
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Append a parsed table payload
    ///
    /// `chunk_data_end` is the absolute end offset of the chunk-data
    /// region the entries point into; it bounds the last chunk's size.
    pub fn append_payload(
        &mut self,
        segment: u32,
        payload: &TablePayload,
        chunk_data_end: u64,
    ) -> Result<()> {
        for (index, entry) in payload.entries.iter().enumerate() {
            let offset = payload.base_offset + entry.offset as u64;
            let end = match payload.entries.get(index + 1) {
                Some(next) => payload.base_offset + next.offset as u64,
                None => chunk_data_end,
            };
            if end < offset {
                return Err(Error::bad_section_header(format!(
                    "table entry {} at offset {} extends past its data region end {}",
                    index, offset, end
                )));
            }
            self.locations.push(ChunkLocation {
                segment,
                offset,
                stored_size: (end - offset) as u32,
                is_compressed: entry.is_compressed,
                is_delta: false,
                is_missing: false,
            });
        }
        Ok(())
    }

    /// Append `count` entries marked missing (both table copies failed)
    pub fn append_missing(&mut self, count: usize) {
        let missing = ChunkLocation {
            segment: 0,
            offset: 0,
            stored_size: 0,
            is_compressed: false,
            is_delta: false,
            is_missing: true,
        };
        self.locations.resize(self.locations.len() + count, missing);
    }

    /// Shadow a chunk with its delta-segment copy
    pub fn overlay_delta(&mut self, chunk_index: u64, location: ChunkLocation) -> Result<()> {
        let slot = self
            .locations
            .get_mut(chunk_index as usize)
            .ok_or_else(|| {
                Error::argument(format!(
                    "delta chunk index {} beyond chunk count",
                    chunk_index
                ))
            })?;
        *slot = ChunkLocation {
            is_delta: true,
            ..location
        };
        Ok(())
    }

    /// Resolve a chunk index to its stored location
    pub fn lookup(&self, chunk_index: u64) -> Result<ChunkLocation> {
        match self.locations.get(chunk_index as usize) {
            Some(location) if location.is_missing => Err(Error::MissingChunk(chunk_index)),
            Some(location) => Ok(*location),
            None => Err(Error::MissingChunk(chunk_index)),
        }
    }

    /// Whether a chunk index is mapped and recoverable
    pub fn is_resolvable(&self, chunk_index: u64) -> bool {
        matches!(self.locations.get(chunk_index as usize), Some(location) if !location.is_missing)
    }

    /// Drop every entry past `len`; used when resuming a partial write
    pub fn truncate(&mut self, len: usize) {
        self.locations.truncate(len);
    }

    /// Sum of all stored chunk sizes, excluding missing entries
    pub fn stored_bytes(&self) -> u64 {
        self.locations
            .iter()
            .filter(|location| !location.is_missing)
            .map(|location| location.stored_size as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> TablePayload {
        TablePayload {
            base_offset: 1000,
            entries: vec![
                TableEntry {
                    offset: 0,
                    is_compressed: true,
                },
                TableEntry {
                    offset: 700,
                    is_compressed: false,
                },
                TableEntry {
                    offset: 1500,
                    is_compressed: true,
                },
            ],
        }
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = sample_payload();
        let encoded = payload.encode();
        assert_eq!(encoded.len(), TABLE_HEADER_SIZE + 3 * 4 + 4);
        let parsed = TablePayload::parse(&encoded).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_header_checksum_detects_corruption() {
        let mut encoded = sample_payload().encode();
        encoded[9] ^= 0x01; // inside base_offset
        assert!(matches!(
            TablePayload::parse(&encoded),
            Err(Error::BadSectionHeader(_))
        ));
    }

    #[test]
    fn test_entries_checksum_detects_corruption() {
        let mut encoded = sample_payload().encode();
        let entry_byte = TABLE_HEADER_SIZE + 5;
        encoded[entry_byte] ^= 0x01;
        assert!(matches!(
            TablePayload::parse(&encoded),
            Err(Error::BadSectionHeader(_))
        ));
    }

    #[test]
    fn test_entry_limit_enforced() {
        let payload = TablePayload {
            base_offset: 0,
            entries: vec![
                TableEntry {
                    offset: 0,
                    is_compressed: false,
                };
                TABLE_ENTRY_LIMIT + 1
            ],
        };
        let encoded = payload.encode();
        assert!(TablePayload::parse(&encoded).is_err());
    }

    #[test]
    fn test_chunk_table_sizes_from_offsets() {
        let mut table = ChunkTable::new();
        table.append_payload(0, &sample_payload(), 1000 + 2100).unwrap();

        let first = table.lookup(0).unwrap();
        assert_eq!(first.offset, 1000);
        assert_eq!(first.stored_size, 700);
        assert!(first.is_compressed);

        let second = table.lookup(1).unwrap();
        assert_eq!(second.offset, 1700);
        assert_eq!(second.stored_size, 800);
        assert!(!second.is_compressed);

        // Last chunk is bounded by the data region end.
        let third = table.lookup(2).unwrap();
        assert_eq!(third.offset, 2500);
        assert_eq!(third.stored_size, 600);
    }

    #[test]
    fn test_missing_entries() {
        let mut table = ChunkTable::new();
        table.append_missing(2);
        assert_eq!(table.len(), 2);
        assert!(matches!(table.lookup(0), Err(Error::MissingChunk(0))));
        assert!(matches!(table.lookup(5), Err(Error::MissingChunk(5))));
        assert!(!table.is_resolvable(1));
    }

    #[test]
    fn test_delta_overlay() {
        let mut table = ChunkTable::new();
        table.append_payload(0, &sample_payload(), 3100).unwrap();
        table
            .overlay_delta(
                1,
                ChunkLocation {
                    segment: 3,
                    offset: 89,
                    stored_size: 32772,
                    is_compressed: false,
                    is_delta: false,
                    is_missing: false,
                },
            )
            .unwrap();
        let shadowed = table.lookup(1).unwrap();
        assert!(shadowed.is_delta);
        assert_eq!(shadowed.segment, 3);
        assert_eq!(shadowed.offset, 89);
    }

    #[test]
    fn test_compressed_flag_is_msb() {
        let entry = TableEntry {
            offset: 0x7fff_ffff,
            is_compressed: true,
        };
        assert_eq!(entry.to_raw(), 0xffff_ffff);
        assert_eq!(TableEntry::from_raw(0xffff_ffff), entry);
    }
}
