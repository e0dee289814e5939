//! Chunk and header payload codecs
//!
//! Chunks are compressed and checksummed independently. Stored forms:
//! - uncompressed: payload followed by a 4-byte Adler-32 trailer
//! - deflate: a zlib stream (whose container carries its own Adler-32)
//! - bzip2: a bzip2 stream followed by a 4-byte Adler-32 of the payload
//! - empty block: a 16-byte run-length record, stored with the compressed
//!   flag set; byte 0 is 0x00, which no zlib or bzip2 stream starts with

use crate::checksum::{adler32, is_empty_block, ADLER_SEED};
use bzip2::read::{BzDecoder, BzEncoder};
use ewfkit_core::{CompressionMethod, CompressionPolicy, Error, Result};
use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use std::io::Read;

/// Size of the stored empty-block run-length record
pub const EMPTY_BLOCK_RECORD_SIZE: usize = 16;

/// A chunk in its on-disk form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    /// The stored bytes, including any checksum trailer
    pub data: Vec<u8>,
    /// Whether the chunk table entry carries the compressed flag
    pub is_compressed: bool,
}

/// Compress `input` with DEFLATE at `level`
///
/// Returns the zlib stream and whether it is at least one byte shorter
/// than the input.
pub fn deflate_compress(input: &[u8], level: u32) -> Result<(Vec<u8>, bool)> {
    let mut encoder = ZlibEncoder::new(input, Compression::new(level.min(9)));
    let mut output = Vec::with_capacity(input.len() / 2);
    encoder
        .read_to_end(&mut output)
        .map_err(|e| Error::corrupt_chunk(format!("deflate compression failed: {}", e)))?;
    let is_smaller = output.len() < input.len();
    Ok((output, is_smaller))
}

/// Decompress a zlib stream that must inflate to exactly
/// `expected_uncompressed_len` bytes
pub fn deflate_decompress(input: &[u8], expected_uncompressed_len: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(input);
    let mut output = Vec::with_capacity(expected_uncompressed_len);
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::corrupt_chunk(format!("zlib stream error: {}", e)))?;
    if output.len() != expected_uncompressed_len {
        return Err(Error::corrupt_chunk(format!(
            "inflated to {} bytes, expected {}",
            output.len(),
            expected_uncompressed_len
        )));
    }
    Ok(output)
}

/// Compress `input` with bzip2 at `level`
pub fn bzip2_compress(input: &[u8], level: u32) -> Result<(Vec<u8>, bool)> {
    let compression = bzip2::Compression::new(level.clamp(1, 9));
    let mut encoder = BzEncoder::new(input, compression);
    let mut output = Vec::with_capacity(input.len() / 2);
    encoder
        .read_to_end(&mut output)
        .map_err(|e| Error::corrupt_chunk(format!("bzip2 compression failed: {}", e)))?;
    let is_smaller = output.len() < input.len();
    Ok((output, is_smaller))
}

/// Decompress a bzip2 stream that must expand to exactly
/// `expected_uncompressed_len` bytes
pub fn bzip2_decompress(input: &[u8], expected_uncompressed_len: usize) -> Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(input);
    let mut output = Vec::with_capacity(expected_uncompressed_len);
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::corrupt_chunk(format!("bzip2 stream error: {}", e)))?;
    if output.len() != expected_uncompressed_len {
        return Err(Error::corrupt_chunk(format!(
            "bzip2 expanded to {} bytes, expected {}",
            output.len(),
            expected_uncompressed_len
        )));
    }
    Ok(output)
}

/// Encode the 16-byte run-length record for an all-constant chunk
fn encode_empty_block_record(fill: u8, len: u64, checksum: u32) -> Vec<u8> {
    let mut record = vec![0u8; EMPTY_BLOCK_RECORD_SIZE];
    record[1] = fill;
    record[4..12].copy_from_slice(&len.to_le_bytes());
    record[12..16].copy_from_slice(&checksum.to_le_bytes());
    record
}

/// Whether a stored compressed chunk is an empty-block record
fn is_empty_block_record(data: &[u8]) -> bool {
    data.len() == EMPTY_BLOCK_RECORD_SIZE && data[0] == 0x00
}

/// Expand a 16-byte run-length record, verifying its checksum
fn decode_empty_block_record(data: &[u8], expected_uncompressed_len: usize) -> Result<Vec<u8>> {
    let fill = data[1];
    let len = u64::from_le_bytes(data[4..12].try_into().expect("record is 16 bytes"));
    if len != expected_uncompressed_len as u64 {
        return Err(Error::corrupt_chunk(format!(
            "empty-block record declares {} bytes, expected {}",
            len, expected_uncompressed_len
        )));
    }
    let stored_checksum = u32::from_le_bytes(data[12..16].try_into().expect("record is 16 bytes"));
    let expanded = vec![fill; expected_uncompressed_len];
    let checksum = adler32(&expanded, ADLER_SEED);
    if checksum != stored_checksum {
        return Err(Error::corrupt_chunk(format!(
            "empty-block record checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_checksum, checksum
        )));
    }
    Ok(expanded)
}

/// Produce the stored form of a chunk under the given policy
///
/// Compression that does not shrink the chunk falls back to the
/// uncompressed form, matching the table-entry flag semantics.
pub fn encode_chunk(payload: &[u8], policy: &CompressionPolicy) -> Result<StoredChunk> {
    if policy.empty_block && is_empty_block(payload) && !payload.is_empty() {
        let checksum = adler32(payload, ADLER_SEED);
        return Ok(StoredChunk {
            data: encode_empty_block_record(payload[0], payload.len() as u64, checksum),
            is_compressed: true,
        });
    }
    match policy.method {
        CompressionMethod::None => Ok(StoredChunk {
            data: append_checksum(payload),
            is_compressed: false,
        }),
        CompressionMethod::Deflate => {
            let (compressed, is_smaller) = deflate_compress(payload, policy.level)?;
            if is_smaller {
                Ok(StoredChunk {
                    data: compressed,
                    is_compressed: true,
                })
            } else {
                Ok(StoredChunk {
                    data: append_checksum(payload),
                    is_compressed: false,
                })
            }
        }
        CompressionMethod::Bzip2 => {
            let (mut compressed, is_smaller) = bzip2_compress(payload, policy.level)?;
            if is_smaller {
                let checksum = adler32(payload, ADLER_SEED);
                compressed.extend_from_slice(&checksum.to_le_bytes());
                Ok(StoredChunk {
                    data: compressed,
                    is_compressed: true,
                })
            } else {
                Ok(StoredChunk {
                    data: append_checksum(payload),
                    is_compressed: false,
                })
            }
        }
    }
}

/// Recover the uncompressed payload of a stored chunk
///
/// `method` selects the codec for compressed chunks; empty-block records
/// are recognized for every method. Uncompressed chunks have their
/// trailing Adler-32 verified and stripped.
pub fn decode_chunk(
    stored: &[u8],
    is_compressed: bool,
    expected_uncompressed_len: usize,
    method: CompressionMethod,
) -> Result<Vec<u8>> {
    if !is_compressed {
        return split_checksum(stored, expected_uncompressed_len);
    }
    if is_empty_block_record(stored) {
        return decode_empty_block_record(stored, expected_uncompressed_len);
    }
    match method {
        CompressionMethod::Deflate | CompressionMethod::None => {
            deflate_decompress(stored, expected_uncompressed_len)
        }
        CompressionMethod::Bzip2 => {
            if stored.len() < 4 {
                return Err(Error::corrupt_chunk("bzip2 chunk shorter than its trailer"));
            }
            let (stream, trailer) = stored.split_at(stored.len() - 4);
            let payload = bzip2_decompress(stream, expected_uncompressed_len)?;
            let stored_checksum = u32::from_le_bytes(trailer.try_into().expect("4-byte trailer"));
            let checksum = adler32(&payload, ADLER_SEED);
            if checksum != stored_checksum {
                return Err(Error::corrupt_chunk(format!(
                    "bzip2 chunk checksum mismatch: stored {:#010x}, computed {:#010x}",
                    stored_checksum, checksum
                )));
            }
            Ok(payload)
        }
    }
}

/// Validate a caller-prepared chunk without re-encoding it
///
/// Used by the prepared-chunk write path: acquisition front-ends compress
/// in worker threads and hand the engine finished stored forms. The chunk
/// must decode to `expected_uncompressed_len` bytes under `method`.
pub fn validate_prepared_chunk(
    stored: &[u8],
    is_compressed: bool,
    expected_uncompressed_len: usize,
    method: CompressionMethod,
) -> Result<()> {
    decode_chunk(stored, is_compressed, expected_uncompressed_len, method).map(|_| ())
}

fn append_checksum(payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&adler32(payload, ADLER_SEED).to_le_bytes());
    data
}

fn split_checksum(stored: &[u8], expected_uncompressed_len: usize) -> Result<Vec<u8>> {
    if stored.len() != expected_uncompressed_len + 4 {
        return Err(Error::corrupt_chunk(format!(
            "uncompressed chunk stored as {} bytes, expected {} + trailer",
            stored.len(),
            expected_uncompressed_len
        )));
    }
    let (payload, trailer) = stored.split_at(expected_uncompressed_len);
    let stored_checksum = u32::from_le_bytes(trailer.try_into().expect("4-byte trailer"));
    let checksum = adler32(payload, ADLER_SEED);
    if checksum != stored_checksum {
        return Err(Error::corrupt_chunk(format!(
            "chunk checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_checksum, checksum
        )));
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Vec<u8> {
        (0..4096u32).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_deflate_roundtrip() {
        let payload = sample_payload();
        let (compressed, is_smaller) = deflate_compress(&payload, 6).unwrap();
        assert!(is_smaller);
        let recovered = deflate_decompress(&compressed, payload.len()).unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn test_deflate_rejects_wrong_length() {
        let payload = sample_payload();
        let (compressed, _) = deflate_compress(&payload, 6).unwrap();
        assert!(matches!(
            deflate_decompress(&compressed, payload.len() - 1),
            Err(Error::CorruptChunk(_))
        ));
    }

    #[test]
    fn test_deflate_rejects_garbage() {
        assert!(matches!(
            deflate_decompress(&[0xDE, 0xAD, 0xBE, 0xEF], 16),
            Err(Error::CorruptChunk(_))
        ));
    }

    #[test]
    fn test_bzip2_roundtrip() {
        let payload = sample_payload();
        let (compressed, is_smaller) = bzip2_compress(&payload, 6).unwrap();
        assert!(is_smaller);
        let recovered = bzip2_decompress(&compressed, payload.len()).unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn test_uncompressed_chunk_roundtrip() {
        let payload = sample_payload();
        let stored = encode_chunk(&payload, &CompressionPolicy::none()).unwrap();
        assert!(!stored.is_compressed);
        assert_eq!(stored.data.len(), payload.len() + 4);
        let recovered = decode_chunk(
            &stored.data,
            stored.is_compressed,
            payload.len(),
            CompressionMethod::None,
        )
        .unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn test_uncompressed_chunk_detects_flip() {
        let payload = sample_payload();
        let stored = encode_chunk(&payload, &CompressionPolicy::none()).unwrap();
        let mut data = stored.data;
        data[100] ^= 0x01;
        assert!(matches!(
            decode_chunk(&data, false, payload.len(), CompressionMethod::None),
            Err(Error::CorruptChunk(_))
        ));
    }

    #[test]
    fn test_empty_block_record() {
        let payload = vec![0x00u8; 32 * 1024];
        let policy = CompressionPolicy::none_with_empty_block();
        let stored = encode_chunk(&payload, &policy).unwrap();
        assert!(stored.is_compressed);
        assert_eq!(stored.data.len(), EMPTY_BLOCK_RECORD_SIZE);

        let recovered = decode_chunk(
            &stored.data,
            true,
            payload.len(),
            CompressionMethod::None,
        )
        .unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn test_empty_block_nonzero_fill() {
        let payload = vec![0xA5u8; 512];
        let policy = CompressionPolicy {
            empty_block: true,
            ..CompressionPolicy::default()
        };
        let stored = encode_chunk(&payload, &policy).unwrap();
        assert_eq!(stored.data.len(), EMPTY_BLOCK_RECORD_SIZE);
        assert_eq!(stored.data[1], 0xA5);

        let recovered =
            decode_chunk(&stored.data, true, 512, CompressionMethod::Deflate).unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn test_empty_block_record_length_mismatch() {
        let payload = vec![0u8; 512];
        let policy = CompressionPolicy::none_with_empty_block();
        let stored = encode_chunk(&payload, &policy).unwrap();
        assert!(matches!(
            decode_chunk(&stored.data, true, 1024, CompressionMethod::None),
            Err(Error::CorruptChunk(_))
        ));
    }

    #[test]
    fn test_incompressible_falls_back_to_stored() {
        // High-entropy bytes deflate to something larger; the encoder must
        // fall back to the uncompressed form.
        let payload: Vec<u8> = (0..64u32)
            .flat_map(|i| {
                let x = i.wrapping_mul(2654435761);
                x.to_le_bytes()
            })
            .collect();
        let stored = encode_chunk(&payload, &CompressionPolicy::default()).unwrap();
        if !stored.is_compressed {
            assert_eq!(stored.data.len(), payload.len() + 4);
        }
        let recovered = decode_chunk(
            &stored.data,
            stored.is_compressed,
            payload.len(),
            CompressionMethod::Deflate,
        )
        .unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn test_prepared_chunk_validation() {
        let payload = sample_payload();
        let stored = encode_chunk(&payload, &CompressionPolicy::default()).unwrap();
        validate_prepared_chunk(
            &stored.data,
            stored.is_compressed,
            payload.len(),
            CompressionMethod::Deflate,
        )
        .unwrap();

        assert!(validate_prepared_chunk(
            &stored.data,
            stored.is_compressed,
            payload.len() + 1,
            CompressionMethod::Deflate,
        )
        .is_err());
    }

    #[test]
    fn test_bzip2_chunk_roundtrip() {
        let payload = sample_payload();
        let policy = CompressionPolicy {
            method: CompressionMethod::Bzip2,
            level: 6,
            empty_block: false,
        };
        let stored = encode_chunk(&payload, &policy).unwrap();
        assert!(stored.is_compressed);
        let recovered = decode_chunk(
            &stored.data,
            true,
            payload.len(),
            CompressionMethod::Bzip2,
        )
        .unwrap();
        assert_eq!(recovered, payload);
    }
}
