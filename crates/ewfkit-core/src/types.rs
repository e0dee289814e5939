//! Shared value types for EWF images

use std::fmt;

/// On-disk format dialect of an image
///
/// The dialect is detected from the first segment file and is immutable for
/// the lifetime of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// EnCase 1
    Encase1,
    /// EnCase 2
    Encase2,
    /// EnCase 3
    Encase3,
    /// EnCase 4
    Encase4,
    /// EnCase 5
    Encase5,
    /// EnCase 6
    Encase6,
    /// EnCase 7
    Encase7,
    /// ASR Data SMART
    Smart,
    /// Linux EnCase (linen)
    Linen,
    /// AccessData FTK Imager
    Ftk,
    /// EnCase 7 extended (bzip2 chunk codec)
    Ex01,
    /// Logical Evidence File
    L01,
}

impl Dialect {
    /// Whether images in this dialect store a file-entry tree instead of
    /// raw media
    pub fn is_logical(&self) -> bool {
        matches!(self, Dialect::L01)
    }

    /// Whether the dialect serializes header values as UTF-16 (`header2`)
    pub fn has_header2(&self) -> bool {
        matches!(
            self,
            Dialect::Encase4
                | Dialect::Encase5
                | Dialect::Encase6
                | Dialect::Encase7
                | Dialect::Linen
                | Dialect::Ftk
                | Dialect::Ex01
                | Dialect::L01
        )
    }

    /// Whether the dialect writes a `digest` section (MD5 + SHA1) in
    /// addition to the `hash` section
    pub fn has_digest(&self) -> bool {
        matches!(
            self,
            Dialect::Encase5 | Dialect::Encase6 | Dialect::Encase7 | Dialect::Ex01 | Dialect::L01
        )
    }

    /// Default chunk compression method for the dialect
    pub fn default_compression(&self) -> CompressionMethod {
        match self {
            Dialect::Ex01 => CompressionMethod::Bzip2,
            _ => CompressionMethod::Deflate,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Encase1 => "EnCase 1",
            Dialect::Encase2 => "EnCase 2",
            Dialect::Encase3 => "EnCase 3",
            Dialect::Encase4 => "EnCase 4",
            Dialect::Encase5 => "EnCase 5",
            Dialect::Encase6 => "EnCase 6",
            Dialect::Encase7 => "EnCase 7",
            Dialect::Smart => "SMART",
            Dialect::Linen => "linen",
            Dialect::Ftk => "FTK Imager",
            Dialect::Ex01 => "EnCase Ex01",
            Dialect::L01 => "Logical Evidence L01",
        };
        write!(f, "{}", name)
    }
}

/// Media type stored in the volume section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Removable media (floppy, USB, etc.)
    Removable,
    /// Fixed disk (hard drive)
    Fixed,
    /// Optical media (CD, DVD)
    Optical,
    /// Single files acquired as logical evidence
    LogicalEvidence,
    /// Physical memory (RAM)
    Memory,
    /// Unknown media type
    Unknown(u8),
}

impl From<u8> for MediaType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Removable,
            0x01 => Self::Fixed,
            0x03 => Self::Optical,
            0x0e => Self::LogicalEvidence,
            0x10 => Self::Memory,
            v => Self::Unknown(v),
        }
    }
}

impl From<MediaType> for u8 {
    fn from(value: MediaType) -> Self {
        match value {
            MediaType::Removable => 0x00,
            MediaType::Fixed => 0x01,
            MediaType::Optical => 0x03,
            MediaType::LogicalEvidence => 0x0e,
            MediaType::Memory => 0x10,
            MediaType::Unknown(v) => v,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removable => write!(f, "Removable"),
            Self::Fixed => write!(f, "Fixed Disk"),
            Self::Optical => write!(f, "Optical"),
            Self::LogicalEvidence => write!(f, "Logical Evidence"),
            Self::Memory => write!(f, "Memory"),
            Self::Unknown(v) => write!(f, "Unknown (0x{:02X})", v),
        }
    }
}

/// Media flag bits stored in the volume section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaFlags(pub u8);

impl MediaFlags {
    /// The image is a physical device acquisition
    pub const PHYSICAL: u8 = 0x02;
    /// A Fastbloc write blocker was in use
    pub const FASTBLOC: u8 = 0x04;
    /// A Tableau write blocker was in use
    pub const TABLEAU: u8 = 0x08;

    /// Whether the physical-device bit is set
    pub fn is_physical(&self) -> bool {
        self.0 & Self::PHYSICAL != 0
    }
}

/// Chunk compression method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression
    None,
    /// DEFLATE (zlib) compression
    Deflate,
    /// bzip2 compression (Ex01 dialect only)
    Bzip2,
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Deflate => write!(f, "deflate"),
            Self::Bzip2 => write!(f, "bzip2"),
        }
    }
}

/// Compression policy applied chunk by chunk during writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    /// Codec applied to chunk payloads
    pub method: CompressionMethod,
    /// Codec level (0-9 for deflate and bzip2; ignored for none)
    pub level: u32,
    /// Substitute a run-length record for all-constant chunks
    pub empty_block: bool,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Deflate,
            level: 1,
            empty_block: false,
        }
    }
}

impl CompressionPolicy {
    /// Policy that stores chunks verbatim
    pub fn none() -> Self {
        Self {
            method: CompressionMethod::None,
            level: 0,
            empty_block: false,
        }
    }

    /// Policy that stores chunks verbatim but substitutes run-length
    /// records for all-constant chunks
    pub fn none_with_empty_block() -> Self {
        Self {
            method: CompressionMethod::None,
            level: 0,
            empty_block: true,
        }
    }
}

/// Media geometry declared by the volume section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaGeometry {
    /// Total media size in bytes
    pub media_size: u64,
    /// Logical sector size in bytes
    pub bytes_per_sector: u32,
    /// Number of sectors packed into one chunk
    pub sectors_per_chunk: u32,
    /// Read-error granularity in sectors
    pub error_granularity: u32,
    /// Media type
    pub media_type: MediaType,
    /// Media flags
    pub media_flags: MediaFlags,
}

impl Default for MediaGeometry {
    fn default() -> Self {
        Self {
            media_size: 0,
            bytes_per_sector: 512,
            sectors_per_chunk: 64,
            error_granularity: 64,
            media_type: MediaType::Fixed,
            media_flags: MediaFlags(MediaFlags::PHYSICAL),
        }
    }
}

impl MediaGeometry {
    /// Chunk size in bytes (`sectors_per_chunk * bytes_per_sector`)
    pub fn chunk_size(&self) -> u32 {
        self.sectors_per_chunk * self.bytes_per_sector
    }

    /// Total number of sectors on the media
    pub fn number_of_sectors(&self) -> u64 {
        self.media_size.div_ceil(self.bytes_per_sector as u64)
    }

    /// Number of chunks needed to cover the media
    pub fn number_of_chunks(&self) -> u64 {
        self.media_size.div_ceil(self.chunk_size() as u64)
    }

    /// Uncompressed size of a given chunk; only the final chunk may be
    /// shorter than the chunk size
    pub fn chunk_payload_size(&self, chunk_index: u64) -> u64 {
        let chunk_size = self.chunk_size() as u64;
        let start = chunk_index * chunk_size;
        (self.media_size - start.min(self.media_size)).min(chunk_size)
    }
}

/// A contiguous run of sectors, used by the acquiry-error and session tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRange {
    /// First sector of the range
    pub start_sector: u64,
    /// Number of sectors in the range
    pub number_of_sectors: u64,
}

/// Open mode for an image handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read an existing image
    Read,
    /// Create and write a new image
    Write,
    /// Continue a partially-written acquisition
    WriteResume,
    /// Read an existing image, shadowing writes into a delta chain
    ReadWrite,
}

impl OpenMode {
    /// Whether this mode allows write operations
    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}
