//! Volume and data section payloads
//!
//! The `volume` (or SMART `disk`) section declares the media geometry:
//! chunk count, sectors per chunk, bytes per sector, sector count, media
//! type and flags, compression level, error granularity and the
//! acquisition set identifier. The `data` section is a per-segment copy
//! whose set identifier must match the volume's.

use crate::checksum::{adler32, ADLER_SEED};
use ewfkit_core::{
    CompressionMethod, Error, MediaFlags, MediaGeometry, MediaType, Result,
};
use uuid::Uuid;

/// Payload size of the EnCase volume layout
pub const VOLUME_PAYLOAD_SIZE: usize = 1052;

/// Payload size of the SMART volume layout
pub const SMART_VOLUME_PAYLOAD_SIZE: usize = 94;

/// Decoded volume payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePayload {
    /// Media type byte
    pub media_type: MediaType,
    /// Declared number of chunks
    pub chunk_count: u32,
    /// Sectors per chunk
    pub sectors_per_chunk: u32,
    /// Bytes per sector
    pub bytes_per_sector: u32,
    /// Total number of sectors
    pub number_of_sectors: u64,
    /// Exact media size in bytes; logical evidence sizes are not sector
    /// multiples, so the sector count alone cannot reproduce them
    pub media_size: u64,
    /// Media flags
    pub media_flags: MediaFlags,
    /// Compression level hint (0 none, 1 fast, 2 best)
    pub compression_level: u8,
    /// Error granularity in sectors
    pub error_granularity: u32,
    /// Acquisition set identifier; nil for SMART images
    pub set_identifier: Uuid,
}

impl VolumePayload {
    /// Build a payload from geometry and compression settings
    pub fn from_geometry(
        geometry: &MediaGeometry,
        compression: CompressionMethod,
        set_identifier: Uuid,
    ) -> Self {
        let compression_level = match compression {
            CompressionMethod::None => 0,
            CompressionMethod::Deflate | CompressionMethod::Bzip2 => 1,
        };
        Self {
            media_type: geometry.media_type,
            chunk_count: geometry.number_of_chunks() as u32,
            sectors_per_chunk: geometry.sectors_per_chunk,
            bytes_per_sector: geometry.bytes_per_sector,
            number_of_sectors: geometry.number_of_sectors(),
            media_size: geometry.media_size,
            media_flags: geometry.media_flags,
            compression_level,
            error_granularity: geometry.error_granularity,
            set_identifier,
        }
    }

    /// Convert back to engine geometry
    pub fn to_geometry(&self) -> MediaGeometry {
        MediaGeometry {
            media_size: self.effective_media_size(),
            bytes_per_sector: self.bytes_per_sector,
            sectors_per_chunk: self.sectors_per_chunk,
            error_granularity: self.error_granularity,
            media_type: self.media_type,
            media_flags: self.media_flags,
        }
    }

    /// Encode the 1052-byte EnCase layout
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = vec![0u8; VOLUME_PAYLOAD_SIZE];
        payload[0] = self.media_type.into();
        payload[4..8].copy_from_slice(&self.chunk_count.to_le_bytes());
        payload[8..12].copy_from_slice(&self.sectors_per_chunk.to_le_bytes());
        payload[12..16].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        payload[16..24].copy_from_slice(&self.number_of_sectors.to_le_bytes());
        payload[24..32].copy_from_slice(&self.media_size.to_le_bytes());
        payload[36] = self.media_flags.0;
        payload[52] = self.compression_level;
        payload[56..60].copy_from_slice(&self.error_granularity.to_le_bytes());
        payload[64..80].copy_from_slice(self.set_identifier.as_bytes());
        let checksum = adler32(&payload[..VOLUME_PAYLOAD_SIZE - 4], ADLER_SEED);
        payload[VOLUME_PAYLOAD_SIZE - 4..].copy_from_slice(&checksum.to_le_bytes());
        payload
    }

    /// Encode the 94-byte SMART layout
    pub fn encode_smart(&self) -> Vec<u8> {
        let mut payload = vec![0u8; SMART_VOLUME_PAYLOAD_SIZE];
        payload[0] = self.media_type.into();
        payload[4..8].copy_from_slice(&self.chunk_count.to_le_bytes());
        payload[8..12].copy_from_slice(&self.sectors_per_chunk.to_le_bytes());
        payload[12..16].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        payload[16..20].copy_from_slice(&(self.number_of_sectors as u32).to_le_bytes());
        payload[20..28].copy_from_slice(&self.media_size.to_le_bytes());
        let checksum = adler32(&payload[..SMART_VOLUME_PAYLOAD_SIZE - 4], ADLER_SEED);
        payload[SMART_VOLUME_PAYLOAD_SIZE - 4..].copy_from_slice(&checksum.to_le_bytes());
        payload
    }

    /// Decode either layout, selected by payload size
    pub fn parse(payload: &[u8]) -> Result<Self> {
        match payload.len() {
            VOLUME_PAYLOAD_SIZE => Self::parse_encase(payload),
            SMART_VOLUME_PAYLOAD_SIZE => Self::parse_smart(payload),
            other => Err(Error::unsupported(format!(
                "volume payload of {} bytes matches no known layout",
                other
            ))),
        }
    }

    fn parse_encase(payload: &[u8]) -> Result<Self> {
        verify_trailing_checksum(payload, "volume")?;
        Ok(Self {
            media_type: MediaType::from(payload[0]),
            chunk_count: u32::from_le_bytes(payload[4..8].try_into().expect("4 bytes")),
            sectors_per_chunk: u32::from_le_bytes(payload[8..12].try_into().expect("4 bytes")),
            bytes_per_sector: u32::from_le_bytes(payload[12..16].try_into().expect("4 bytes")),
            number_of_sectors: u64::from_le_bytes(payload[16..24].try_into().expect("8 bytes")),
            media_size: u64::from_le_bytes(payload[24..32].try_into().expect("8 bytes")),
            media_flags: MediaFlags(payload[36]),
            compression_level: payload[52],
            error_granularity: u32::from_le_bytes(payload[56..60].try_into().expect("4 bytes")),
            set_identifier: Uuid::from_slice(&payload[64..80])
                .map_err(|e| Error::bad_section_header(format!("set identifier: {}", e)))?,
        })
    }

    fn parse_smart(payload: &[u8]) -> Result<Self> {
        verify_trailing_checksum(payload, "disk")?;
        Ok(Self {
            media_type: MediaType::from(payload[0]),
            chunk_count: u32::from_le_bytes(payload[4..8].try_into().expect("4 bytes")),
            sectors_per_chunk: u32::from_le_bytes(payload[8..12].try_into().expect("4 bytes")),
            bytes_per_sector: u32::from_le_bytes(payload[12..16].try_into().expect("4 bytes")),
            number_of_sectors: u32::from_le_bytes(payload[16..20].try_into().expect("4 bytes"))
                as u64,
            media_size: u64::from_le_bytes(payload[20..28].try_into().expect("8 bytes")),
            media_flags: MediaFlags::default(),
            compression_level: 0,
            error_granularity: 0,
            set_identifier: Uuid::nil(),
        })
    }

    /// Whether this payload uses the SMART layout on disk
    pub fn is_smart_layout(payload_size: u64) -> bool {
        payload_size == SMART_VOLUME_PAYLOAD_SIZE as u64
    }

    /// The media size, preferring the exact byte count when it is
    /// consistent with the sector count
    ///
    /// Images produced elsewhere carry other data (CHS geometry) in the
    /// exact-size field; the range check rejects those values and falls
    /// back to the sector arithmetic.
    fn effective_media_size(&self) -> u64 {
        let from_sectors = self.number_of_sectors * self.bytes_per_sector as u64;
        let lower_bound =
            from_sectors.saturating_sub(self.bytes_per_sector.saturating_sub(1) as u64);
        if self.media_size >= lower_bound && self.media_size <= from_sectors && self.media_size > 0
        {
            self.media_size
        } else {
            from_sectors
        }
    }
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
