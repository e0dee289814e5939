//! Integrity hash sections
//!
//! The `hash` section stores the MD5 of the media; the `digest` section
//! adds SHA1. The `xhash` section is compressed UTF-16 text carrying
//! arbitrary named hash values.

use crate::checksum::{adler32, ADLER_SEED};
use crate::header::{encode_header2, parse_header2};
use ewfkit_core::{Error, Result};

/// Payload size of the `hash` section
pub const HASH_PAYLOAD_SIZE: usize = 36;

/// Payload size of the `digest` section
pub const DIGEST_PAYLOAD_SIZE: usize = 80;

/// Decoded `hash` section payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPayload {
    /// MD5 of the uncompressed media
    pub md5: [u8; 16],
}

impl HashPayload {
    /// Encode with trailing Adler-32
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = vec![0u8; HASH_PAYLOAD_SIZE];
        payload[0..16].copy_from_slice(&self.md5);
        let checksum = adler32(&payload[..HASH_PAYLOAD_SIZE - 4], ADLER_SEED);
        payload[HASH_PAYLOAD_SIZE - 4..].copy_from_slice(&checksum.to_le_bytes());
        payload
    }

    /// Decode and verify
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() != HASH_PAYLOAD_SIZE {
            return Err(Error::bad_section_header(format!(
                "hash payload is {} bytes, expected {}",
                payload.len(),
                HASH_PAYLOAD_SIZE
            )));
        }
        verify_trailing_checksum(payload, "hash")?;
        let mut md5 = [0u8; 16];
        md5.copy_from_slice(&payload[0..16]);
        Ok(Self { md5 })
    }
}

/// Decoded `digest` section payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestPayload {
    /// MD5 of the uncompressed media
    pub md5: [u8; 16],
    /// SHA1 of the uncompressed media
    pub sha1: [u8; 20],
}

impl DigestPayload {
    /// Encode with trailing Adler-32
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = vec![0u8; DIGEST_PAYLOAD_SIZE];
        payload[0..16].copy_from_slice(&self.md5);
        payload[16..36].copy_from_slice(&self.sha1);
        let checksum = adler32(&payload[..DIGEST_PAYLOAD_SIZE - 4], ADLER_SEED);
        payload[DIGEST_PAYLOAD_SIZE - 4..].copy_from_slice(&checksum.to_le_bytes());
        payload
    }

    /// Decode and verify
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() != DIGEST_PAYLOAD_SIZE {
            return Err(Error::bad_section_header(format!(
                "digest payload is {} bytes, expected {}",
                payload.len(),
                DIGEST_PAYLOAD_SIZE
            )));
        }
        verify_trailing_checksum(payload, "digest")?;
        let mut md5 = [0u8; 16];
        md5.copy_from_slice(&payload[0..16]);
        let mut sha1 = [0u8; 20];
        sha1.copy_from_slice(&payload[16..36]);
        Ok(Self { md5, sha1 })
    }
}

/// Serialize an `xhash` payload from (name, value) pairs
pub fn encode_xhash(values: &[(String, String)]) -> Result<Vec<u8>> {
    encode_header2(values)
}

/// Parse an `xhash` payload into (name, value) pairs
pub fn parse_xhash(payload: &[u8]) -> Result<Vec<(String, String)>> {
    parse_header2(payload)
}

fn verify_trailing_checksum(payload: &[u8], what: &str) -> Result<()> {
    let body = &payload[..payload.len() - 4];
    let stored = u32::from_le_bytes(payload[payload.len() - 4..].try_into().expect("4 bytes"));
    let computed = adler32(body, ADLER_SEED);
    if stored != computed {
        return Err(Error::bad_section_header(format!(
            "{} payload checksum mismatch: stored {:#010x}, computed {:#010x}",
            what, stored, computed
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip() {
        let payload = HashPayload { md5: [0x5A; 16] };
        let encoded = payload.encode();
        assert_eq!(encoded.len(), HASH_PAYLOAD_SIZE);
        assert_eq!(HashPayload::parse(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_digest_roundtrip() {
        let payload = DigestPayload {
            md5: [0x11; 16],
            sha1: [0x22; 20],
        };
        let encoded = payload.encode();
        assert_eq!(encoded.len(), DIGEST_PAYLOAD_SIZE);
        assert_eq!(DigestPayload::parse(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_corruption_detected() {
        let mut encoded = HashPayload { md5: [0x5A; 16] }.encode();
        encoded[3] ^= 0x10;
        assert!(HashPayload::parse(&encoded).is_err());

        let mut encoded = DigestPayload {
            md5: [0x11; 16],
            sha1: [0x22; 20],
        }
        .encode();
        encoded[20] ^= 0x01;
        assert!(DigestPayload::parse(&encoded).is_err());
    }

    #[test]
    fn test_xhash_roundtrip() {
        let values = vec![
            ("MD5".to_string(), "d41d8cd98f00b204e9800998ecf8427e".to_string()),
            ("BLAKE2".to_string(), "0e5751c0".to_string()),
        ];
        let payload = encode_xhash(&values).unwrap();
        let parsed = parse_xhash(&payload).unwrap();
        for pair in &values {
            assert!(parsed.contains(pair));
        }
    }
}
