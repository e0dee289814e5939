//! Section envelope codec and segment traversal
//!
//! Every segment file starts with a 13-byte file header and then holds a
//! chain of sections. Each section is a 76-byte descriptor (16-byte ASCII
//! type tag, next-section offset, total size, padding, Adler-32 over the
//! first 72 bytes) followed by its payload. A `next` section ends a
//! segment, a `done` section ends the image; both point at themselves.

use crate::checksum::{adler32, ADLER_SEED};
use ewfkit_core::{Error, Result, SegmentPool};

/// Size of the section descriptor
pub const SECTION_DESCRIPTOR_SIZE: usize = 76;

/// Size of the segment file header
pub const SEGMENT_HEADER_SIZE: usize = 13;

/// File magic of the EWF-E01 / SMART family
pub const EVF_MAGIC: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00];

/// File magic of logical evidence (L01) segment files
pub const LVF_MAGIC: [u8; 8] = [0x4d, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00];

/// File magic of the Ex01 dialect
pub const EVF2_MAGIC: [u8; 8] = [0x45, 0x56, 0x46, 0x32, 0x0d, 0x0a, 0x81, 0x00];

/// Magic family of a segment file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicFamily {
    /// `EVF\x09...`: EnCase, SMART, linen, FTK
    Evf,
    /// `MVF\x09...`: logical evidence
    Lvf,
    /// `EVF2...`: Ex01
    Evf2,
}

impl MagicFamily {
    fn magic(&self) -> &'static [u8; 8] {
        match self {
            MagicFamily::Evf => &EVF_MAGIC,
            MagicFamily::Lvf => &LVF_MAGIC,
            MagicFamily::Evf2 => &EVF2_MAGIC,
        }
    }
}

/// The 13-byte header at the start of every segment file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Magic family of the chain
    pub family: MagicFamily,
    /// 1-based position of this segment in the chain
    pub segment_number: u16,
}

impl SegmentHeader {
    /// Encode the header for writing
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..8].copy_from_slice(self.family.magic());
        bytes[8] = 0x01;
        bytes[9..11].copy_from_slice(&self.segment_number.to_le_bytes());
        bytes
    }

    /// Parse and validate a segment file header
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SEGMENT_HEADER_SIZE {
            return Err(Error::bad_section_header("segment file header too short"));
        }
        let family = if bytes[0..8] == EVF_MAGIC {
            MagicFamily::Evf
        } else if bytes[0..8] == LVF_MAGIC {
            MagicFamily::Lvf
        } else if bytes[0..8] == EVF2_MAGIC {
            MagicFamily::Evf2
        } else {
            return Err(Error::unsupported("unrecognized segment file signature"));
        };
        if bytes[8] != 0x01 || bytes[11] != 0x00 || bytes[12] != 0x00 {
            return Err(Error::bad_section_header(
                "segment file header field bytes are invalid",
            ));
        }
        let segment_number = u16::from_le_bytes([bytes[9], bytes[10]]);
        Ok(Self {
            family,
            segment_number,
        })
    }
}

/// Section type tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    /// Acquisition metadata, codepage text
    Header,
    /// Acquisition metadata, UTF-16 text
    Header2,
    /// Extended metadata, UTF-16 text
    Xheader,
    /// Media geometry
    Volume,
    /// Media geometry (SMART tag)
    Disk,
    /// Per-segment copy of the geometry
    Data,
    /// Raw chunked media payload
    Sectors,
    /// Chunk offset array
    Table,
    /// Redundant copy of the chunk offset array
    Table2,
    /// MD5 + SHA1 of the media
    Digest,
    /// MD5 of the media
    Hash,
    /// Extended hash values, UTF-16 text
    Xhash,
    /// Acquiry read-error sector ranges
    Error2,
    /// Optical session sector ranges
    Session,
    /// Logical evidence record stream
    Ltree,
    /// Shadow chunk in a delta segment
    DeltaChunk,
    /// End of this segment; the chain continues
    Next,
    /// End of the image
    Done,
    /// Unrecognized tag, preserved for diagnostics
    Unknown(String),
}

impl SectionKind {
    /// Parse a NUL-padded 16-byte ASCII tag
    pub fn from_tag(tag: &[u8; 16]) -> Self {
        let text = match std::str::from_utf8(tag) {
            Ok(text) => text.trim_end_matches('\0'),
            Err(_) => return SectionKind::Unknown(hex::encode(tag)),
        };
        match text {
            "header" => SectionKind::Header,
            "header2" => SectionKind::Header2,
            "xheader" => SectionKind::Xheader,
            "volume" => SectionKind::Volume,
            "disk" => SectionKind::Disk,
            "data" => SectionKind::Data,
            "sectors" => SectionKind::Sectors,
            "table" => SectionKind::Table,
            "table2" => SectionKind::Table2,
            "digest" => SectionKind::Digest,
            "hash" => SectionKind::Hash,
            "xhash" => SectionKind::Xhash,
            "error2" => SectionKind::Error2,
            "session" => SectionKind::Session,
            "ltree" => SectionKind::Ltree,
            "delta_chunk" => SectionKind::DeltaChunk,
            "next" => SectionKind::Next,
            "done" => SectionKind::Done,
            other => SectionKind::Unknown(other.to_string()),
        }
    }

    /// The on-disk tag text
    pub fn tag(&self) -> &str {
        match self {
            SectionKind::Header => "header",
            SectionKind::Header2 => "header2",
            SectionKind::Xheader => "xheader",
            SectionKind::Volume => "volume",
            SectionKind::Disk => "disk",
            SectionKind::Data => "data",
            SectionKind::Sectors => "sectors",
            SectionKind::Table => "table",
            SectionKind::Table2 => "table2",
            SectionKind::Digest => "digest",
            SectionKind::Hash => "hash",
            SectionKind::Xhash => "xhash",
            SectionKind::Error2 => "error2",
            SectionKind::Session => "session",
            SectionKind::Ltree => "ltree",
            SectionKind::DeltaChunk => "delta_chunk",
            SectionKind::Next => "next",
            SectionKind::Done => "done",
            SectionKind::Unknown(tag) => tag,
        }
    }

    /// Whether this section terminates its segment's chain
    pub fn is_terminal(&self) -> bool {
        matches!(self, SectionKind::Next | SectionKind::Done)
    }
}

/// A parsed section descriptor, located within its segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section type
    pub kind: SectionKind,
    /// Offset of the descriptor within the segment file
    pub offset: u64,
    /// Offset of the next section's descriptor
    pub next_offset: u64,
    /// Total size including the descriptor
    pub size: u64,
}

impl Section {
    /// Offset of the payload within the segment file
    pub fn payload_offset(&self) -> u64 {
        self.offset + SECTION_DESCRIPTOR_SIZE as u64
    }

    /// Payload size in bytes
    pub fn payload_size(&self) -> u64 {
        self.size.saturating_sub(SECTION_DESCRIPTOR_SIZE as u64)
    }

    /// Encode a descriptor; terminal sections pass their own offset as
    /// `next_offset`
    pub fn encode(
        kind: &SectionKind,
        payload_size: u64,
        next_offset: u64,
    ) -> [u8; SECTION_DESCRIPTOR_SIZE] {
        let mut bytes = [0u8; SECTION_DESCRIPTOR_SIZE];
        let tag = kind.tag().as_bytes();
        bytes[..tag.len().min(16)].copy_from_slice(&tag[..tag.len().min(16)]);
        bytes[16..24].copy_from_slice(&next_offset.to_le_bytes());
        bytes[24..32]
            .copy_from_slice(&(payload_size + SECTION_DESCRIPTOR_SIZE as u64).to_le_bytes());
        let checksum = adler32(&bytes[..72], ADLER_SEED);
        bytes[72..76].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Parse and validate a descriptor read from `offset`
    pub fn parse(bytes: &[u8], offset: u64) -> Result<Self> {
        if bytes.len() < SECTION_DESCRIPTOR_SIZE {
            return Err(Error::bad_section_header("section descriptor too short"));
        }
        let stored_checksum = u32::from_le_bytes(bytes[72..76].try_into().expect("4 bytes"));
        let checksum = adler32(&bytes[..72], ADLER_SEED);
        if checksum != stored_checksum {
            return Err(Error::bad_section_header(format!(
                "descriptor checksum mismatch at offset {}: stored {:#010x}, computed {:#010x}",
                offset, stored_checksum, checksum
            )));
        }
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&bytes[0..16]);
        let kind = SectionKind::from_tag(&tag);
        let next_offset = u64::from_le_bytes(bytes[16..24].try_into().expect("8 bytes"));
        let size = u64::from_le_bytes(bytes[24..32].try_into().expect("8 bytes"));
        Ok(Self {
            kind,
            offset,
            next_offset,
            size,
        })
    }
}

/// Lazy walk over the sections of one segment file
///
/// Yields each section until a terminal `next`/`done` section (inclusive)
/// or the physical end of the segment. A non-terminal section whose next
/// offset fails to advance is a [`Error::SectionOverflow`].
pub struct SectionWalker<'a, P: SegmentPool + ?Sized> {
    pool: &'a mut P,
    segment_index: usize,
    segment_size: u64,
    offset: u64,
    finished: bool,
}

impl<'a, P: SegmentPool + ?Sized> SectionWalker<'a, P> {
    /// Begin walking a segment, validating its file header first
    pub fn new(pool: &'a mut P, segment_index: usize) -> Result<(SegmentHeader, Self)> {
        let segment_size = pool.size(segment_index)?;
        let mut header_bytes = [0u8; SEGMENT_HEADER_SIZE];
        pool.read_at(segment_index, 0, &mut header_bytes)?;
        let header = SegmentHeader::parse(&header_bytes)?;
        Ok((
            header,
            Self {
                pool,
                segment_index,
                segment_size,
                offset: SEGMENT_HEADER_SIZE as u64,
                finished: false,
            },
        ))
    }

    /// Parse the next section, or `None` at the end of the segment
    pub fn next_section(&mut self) -> Result<Option<Section>> {
        if self.finished || self.offset + SECTION_DESCRIPTOR_SIZE as u64 > self.segment_size {
            self.finished = true;
            return Ok(None);
        }
        let mut bytes = [0u8; SECTION_DESCRIPTOR_SIZE];
        self.pool.read_at(self.segment_index, self.offset, &mut bytes)?;
        let section = Section::parse(&bytes, self.offset)?;

        if section.kind.is_terminal() || section.next_offset == self.offset {
            self.finished = true;
        } else if section.next_offset <= self.offset {
            return Err(Error::section_overflow(format!(
                "section at offset {} points backwards to {}",
                self.offset, section.next_offset
            )));
        } else {
            self.offset = section.next_offset;
        }
        Ok(Some(section))
    }

    /// Fetch a section's payload bytes
    pub fn payload(&mut self, section: &Section) -> Result<Vec<u8>> {
        read_payload(self.pool, self.segment_index, section)
    }
}

/// Read a section payload through the pool
pub fn read_payload<P: SegmentPool + ?Sized>(
    pool: &mut P,
    segment_index: usize,
    section: &Section,
) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; section.payload_size() as usize];
    pool.read_at(segment_index, section.payload_offset(), &mut payload)?;
    Ok(payload)
}

/// Collect all sections of a segment
pub fn scan_segment<P: SegmentPool + ?Sized>(
    pool: &mut P,
    segment_index: usize,
) -> Result<(SegmentHeader, Vec<Section>)> {
    let (header, mut walker) = SectionWalker::new(pool, segment_index)?;
    let mut sections = Vec::new();
    while let Some(section) = walker.next_section()? {
        sections.push(section);
    }
    Ok((header, sections))
}
