//! Sector-range table sections
//!
//! The `error2` section lists sector ranges that could not be read during
//! acquisition; the `session` section lists session start boundaries on
//! optical media. Both share the same envelope: a count, zero padding, an
//! Adler-32 of the header, then (start sector, sector count) entry pairs
//! followed by an Adler-32 of the entry array.

use crate::checksum::{adler32, ADLER_SEED};
use ewfkit_core::{Error, Result, SectorRange};

/// Padding between the count and the header checksum in `error2`
pub const ERROR2_HEADER_PADDING: usize = 508;

/// Padding between the count and the header checksum in `session`
pub const SESSION_HEADER_PADDING: usize = 28;

/// Serialize a range table with the given header padding
pub fn encode_ranges(ranges: &[SectorRange], header_padding: usize) -> Vec<u8> {
    let header_size = 4 + header_padding;
    let mut payload = Vec::with_capacity(header_size + 4 + ranges.len() * 8 + 4);
    payload.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
    payload.resize(header_size, 0);
    let header_checksum = adler32(&payload, ADLER_SEED);
    payload.extend_from_slice(&header_checksum.to_le_bytes());

    let entries_start = payload.len();
    for range in ranges {
        payload.extend_from_slice(&(range.start_sector as u32).to_le_bytes());
        payload.extend_from_slice(&(range.number_of_sectors as u32).to_le_bytes());
    }
    let entries_checksum = adler32(&payload[entries_start..], ADLER_SEED);
    payload.extend_from_slice(&entries_checksum.to_le_bytes());
    payload
}

/// Parse and verify a range table with the given header padding
pub fn parse_ranges(payload: &[u8], header_padding: usize) -> Result<Vec<SectorRange>> {
    let header_size = 4 + header_padding;
    if payload.len() < header_size + 4 {
        return Err(Error::bad_section_header("range table payload too short"));
    }
    let stored_header_checksum =
        u32::from_le_bytes(payload[header_size..header_size + 4].try_into().expect("4 bytes"));
    let header_checksum = adler32(&payload[..header_size], ADLER_SEED);
    if header_checksum != stored_header_checksum {
        return Err(Error::bad_section_header(format!(
            "range table header checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_header_checksum, header_checksum
        )));
    }
    let count = u32::from_le_bytes(payload[0..4].try_into().expect("4 bytes")) as usize;
    let entries_start = header_size + 4;
    let entries_end = entries_start + count * 8;
    if payload.len() < entries_end + 4 {
        return Err(Error::bad_section_header(format!(
            "range table of {} bytes cannot hold {} entries",
            payload.len(),
            count
        )));
    }
    let stored_entries_checksum =
        u32::from_le_bytes(payload[entries_end..entries_end + 4].try_into().expect("4 bytes"));
    let entries_checksum = adler32(&payload[entries_start..entries_end], ADLER_SEED);
    if entries_checksum != stored_entries_checksum {
        return Err(Error::bad_section_header(format!(
            "range table entries checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_entries_checksum, entries_checksum
        )));
    }
    let ranges = payload[entries_start..entries_end]
        .chunks_exact(8)
        .map(|entry| SectorRange {
            start_sector: u32::from_le_bytes(entry[0..4].try_into().expect("4 bytes")) as u64,
            number_of_sectors: u32::from_le_bytes(entry[4..8].try_into().expect("4 bytes")) as u64,
        })
        .collect();
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ranges() -> Vec<SectorRange> {
        vec![
            SectorRange {
                start_sector: 100,
                number_of_sectors: 8,
            },
            SectorRange {
                start_sector: 4096,
                number_of_sectors: 64,
            },
        ]
    }

    #[test]
    fn test_error2_roundtrip() {
        let ranges = sample_ranges();
        let payload = encode_ranges(&ranges, ERROR2_HEADER_PADDING);
        let parsed = parse_ranges(&payload, ERROR2_HEADER_PADDING).unwrap();
        assert_eq!(parsed, ranges);
    }

    #[test]
    fn test_session_roundtrip() {
        let ranges = sample_ranges();
        let payload = encode_ranges(&ranges, SESSION_HEADER_PADDING);
        let parsed = parse_ranges(&payload, SESSION_HEADER_PADDING).unwrap();
        assert_eq!(parsed, ranges);
    }

    #[test]
    fn test_empty_table() {
        let payload = encode_ranges(&[], SESSION_HEADER_PADDING);
        let parsed = parse_ranges(&payload, SESSION_HEADER_PADDING).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_corruption_detected() {
        let mut payload = encode_ranges(&sample_ranges(), ERROR2_HEADER_PADDING);
        payload[0] ^= 0x01;
        assert!(parse_ranges(&payload, ERROR2_HEADER_PADDING).is_err());

        let mut payload = encode_ranges(&sample_ranges(), ERROR2_HEADER_PADDING);
        let entry_byte = 4 + ERROR2_HEADER_PADDING + 4 + 2;
        payload[entry_byte] ^= 0x01;
        assert!(parse_ranges(&payload, ERROR2_HEADER_PADDING).is_err());
    }

    #[test]
    fn test_padding_mismatch_fails() {
        let payload = encode_ranges(&sample_ranges(), ERROR2_HEADER_PADDING);
        assert!(parse_ranges(&payload, SESSION_HEADER_PADDING).is_err());
    }
}
