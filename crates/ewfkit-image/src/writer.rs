//! Write planner
//!
//! Owns the layout of segments being written: when segment 1 receives its
//! metadata sections, when a `sectors`/`table`/`table2` triple closes,
//! when the segment-size ceiling forces a roll to the next segment, and
//! how the image is finalized with its trailer sections. Running MD5 and
//! SHA1 contexts cover every media byte accepted.

use ewfkit_core::{
    CompressionPolicy, Dialect, Error, MediaGeometry, Result, SectorRange, SegmentPool,
};
use ewfkit_format::codec::{encode_chunk, StoredChunk};
use ewfkit_format::header::{encode_header, encode_header2, HeaderCodepage};
use ewfkit_format::hashes::{encode_xhash, DigestPayload, HashPayload};
use ewfkit_format::lef::{encode_ltree, LefRecords};
use ewfkit_format::metadata::MetadataStore;
use ewfkit_format::ranges::{encode_ranges, ERROR2_HEADER_PADDING, SESSION_HEADER_PADDING};
use ewfkit_format::section::{
    MagicFamily, Section, SectionKind, SegmentHeader, SECTION_DESCRIPTOR_SIZE,
    SEGMENT_HEADER_SIZE,
};
use ewfkit_format::table::{TableEntry, TablePayload, TABLE_ENTRY_LIMIT};
use ewfkit_format::volume::VolumePayload;
use md5::{Digest, Md5};
use sha1::Sha1;
use uuid::Uuid;

/// Default maximum segment file size (~1.5 GB, the EnCase 6 default)
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 1_572_864_000;

/// Smallest usable segment ceiling
pub const MIN_SEGMENT_SIZE: u64 = 64 * 1024;

/// Largest segment ceiling expressible by 31-bit table offsets
pub const MAX_SEGMENT_SIZE: u64 = 0x7fff_ffff;

/// Borrowed state a planner operation needs from the handle
pub(crate) struct WriteContext<'a> {
    pub pool: &'a mut dyn SegmentPool,
    pub metadata: &'a MetadataStore,
    pub geometry: &'a MediaGeometry,
}

/// Final sections emitted when the image is closed
pub(crate) struct TrailerSections<'a> {
    pub acquiry_errors: &'a [SectorRange],
    pub sessions: &'a [SectorRange],
    pub lef: Option<&'a LefRecords>,
    pub extra_hash_values: &'a [(String, String)],
}

/// Hashes of the finished media
pub(crate) struct FinalizeSummary {
    pub md5: [u8; 16],
    pub sha1: [u8; 20],
}

struct OpenTriple {
    /// Descriptor offset of the open `sectors` section
    sectors_offset: u64,
    entries: Vec<TableEntry>,
}

struct OpenSegment {
    index: usize,
    cursor: u64,
    triple: Option<OpenTriple>,
    has_chunks: bool,
}

/// Segment and section layout state for an image being written
pub(crate) struct WritePlanner {
    dialect: Dialect,
    magic: MagicFamily,
    policy: CompressionPolicy,
    codepage: HeaderCodepage,
    max_segment_size: u64,
    set_identifier: Uuid,
    segment: Option<OpenSegment>,
    chunks_written: u64,
    /// Segment index and payload offset of the volume section, rewritten
    /// with the final chunk count at finalize
    volume_location: Option<(usize, u64)>,
    md5: Md5,
    sha1: Sha1,
    finalized: bool,
}

impl WritePlanner {
    /// Planner for a brand-new image
    pub fn new(
        dialect: Dialect,
        policy: CompressionPolicy,
        codepage: HeaderCodepage,
        max_segment_size: u64,
        set_identifier: Uuid,
    ) -> Result<Self> {
        if !(MIN_SEGMENT_SIZE..=MAX_SEGMENT_SIZE).contains(&max_segment_size) {
            return Err(Error::argument(format!(
                "maximum segment size {} is outside [{}, {}]",
                max_segment_size, MIN_SEGMENT_SIZE, MAX_SEGMENT_SIZE
            )));
        }
        Ok(Self {
            dialect,
            magic: magic_for(dialect),
            policy,
            codepage,
            max_segment_size,
            set_identifier,
            segment: None,
            chunks_written: 0,
            volume_location: None,
            md5: Md5::new(),
            sha1: Sha1::new(),
            finalized: false,
        })
    }

    /// Planner resuming a partially-written image
    ///
    /// `target` is the segment the handle truncated back to a section
    /// boundary and the cursor at that boundary; `None` means the chain
    /// ended cleanly after a roll and writing continues in a fresh
    /// segment. `chunks_written` counts the sealed chunks preceding the
    /// resume point.
    #[allow(clippy::too_many_arguments)]
    pub fn resume(
        dialect: Dialect,
        policy: CompressionPolicy,
        codepage: HeaderCodepage,
        max_segment_size: u64,
        set_identifier: Uuid,
        target: Option<(usize, u64)>,
        chunks_written: u64,
        volume_location: (usize, u64),
    ) -> Result<Self> {
        let mut planner = Self::new(dialect, policy, codepage, max_segment_size, set_identifier)?;
        planner.segment = target.map(|(index, cursor)| OpenSegment {
            index,
            cursor,
            triple: None,
            has_chunks: true,
        });
        planner.chunks_written = chunks_written;
        planner.volume_location = Some(volume_location);
        Ok(planner)
    }

    /// Number of chunks sealed so far
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Feed already-stored media into the running hashes (write-resume)
    pub fn rehash(&mut self, payload: &[u8]) {
        self.md5.update(payload);
        self.sha1.update(payload);
    }

    /// Compress and append one chunk of media
    pub fn append_chunk(&mut self, ctx: &mut WriteContext<'_>, payload: &[u8]) -> Result<()> {
        let stored = encode_chunk(payload, &self.policy)?;
        self.append_stored(ctx, stored, payload)
    }

    /// Append a chunk already in stored form
    ///
    /// `payload` is its uncompressed content, needed for the running
    /// hashes.
    pub fn append_stored(
        &mut self,
        ctx: &mut WriteContext<'_>,
        stored: StoredChunk,
        payload: &[u8],
    ) -> Result<()> {
        if self.finalized {
            return Err(Error::state("image is already finalized"));
        }
        self.md5.update(payload);
        self.sha1.update(payload);

        self.make_room(ctx, stored.data.len() as u64)?;
        let segment = self.segment.as_mut().expect("make_room opened a segment");
        let triple = segment.triple.as_mut().expect("make_room opened a triple");

        ctx.pool
            .write_at(segment.index, segment.cursor, &stored.data)?;
        triple.entries.push(TableEntry {
            offset: segment.cursor as u32,
            is_compressed: stored.is_compressed,
        });
        segment.cursor += stored.data.len() as u64;
        segment.has_chunks = true;
        self.chunks_written += 1;
        Ok(())
    }

    /// Close triples/segments and emit the trailer sections
    pub fn finalize(
        &mut self,
        ctx: &mut WriteContext<'_>,
        trailer: &TrailerSections<'_>,
    ) -> Result<FinalizeSummary> {
        let md5: [u8; 16] = self.md5.clone().finalize().into();
        let sha1: [u8; 20] = self.sha1.clone().finalize().into();
        if self.finalized {
            return Ok(FinalizeSummary { md5, sha1 });
        }
        if self.segment.is_none() {
            self.open_segment(ctx)?;
        }
        self.close_triple(ctx)?;

        if !trailer.acquiry_errors.is_empty() {
            let payload = encode_ranges(trailer.acquiry_errors, ERROR2_HEADER_PADDING);
            self.write_section(ctx, &SectionKind::Error2, &payload)?;
        }
        if !trailer.sessions.is_empty() {
            let payload = encode_ranges(trailer.sessions, SESSION_HEADER_PADDING);
            self.write_section(ctx, &SectionKind::Session, &payload)?;
        }
        if let Some(records) = trailer.lef {
            let payload = encode_ltree(records);
            self.write_section(ctx, &SectionKind::Ltree, &payload)?;
        }
        if self.dialect.has_digest() {
            let payload = DigestPayload { md5, sha1 }.encode();
            self.write_section(ctx, &SectionKind::Digest, &payload)?;
        }
        let payload = HashPayload { md5 }.encode();
        self.write_section(ctx, &SectionKind::Hash, &payload)?;
        if !trailer.extra_hash_values.is_empty() {
            let payload = encode_xhash(trailer.extra_hash_values)?;
            self.write_section(ctx, &SectionKind::Xhash, &payload)?;
        }
        self.write_terminal(ctx, &SectionKind::Done)?;
        self.rewrite_volume(ctx)?;

        let segment = self.segment.take().expect("segment is open");
        ctx.pool.close(segment.index)?;
        self.finalized = true;
        tracing::debug!(chunks = self.chunks_written, "image finalized");
        Ok(FinalizeSummary { md5, sha1 })
    }

    /// Ensure an open segment and triple with room for `stored_len` bytes
    fn make_room(&mut self, ctx: &mut WriteContext<'_>, stored_len: u64) -> Result<()> {
        if self.segment.is_none() {
            self.open_segment(ctx)?;
        }
        let entries = self
            .segment
            .as_ref()
            .and_then(|segment| segment.triple.as_ref())
            .map(|triple| triple.entries.len())
            .unwrap_or(0);
        if entries >= TABLE_ENTRY_LIMIT {
            self.close_triple(ctx)?;
        }

        let segment = self.segment.as_ref().expect("segment is open");
        let entries = segment
            .triple
            .as_ref()
            .map(|triple| triple.entries.len())
            .unwrap_or(0);
        let descriptor = SECTION_DESCRIPTOR_SIZE as u64;
        let pending_sectors = if segment.triple.is_some() { 0 } else { descriptor };
        let needed = pending_sectors
            + stored_len
            + triple_close_overhead(entries + 1)
            + descriptor;
        // A segment takes at least one chunk even when that busts the
        // ceiling, otherwise a tiny ceiling could roll forever.
        if segment.has_chunks && segment.cursor + needed > self.max_segment_size {
            self.close_triple(ctx)?;
            self.write_terminal(ctx, &SectionKind::Next)?;
            let finished = self.segment.take().expect("segment is open");
            ctx.pool.close(finished.index)?;
            tracing::debug!(segment = finished.index, "segment rolled at size ceiling");
            self.open_segment(ctx)?;
        }
        if self
            .segment
            .as_ref()
            .expect("segment is open")
            .triple
            .is_none()
        {
            self.open_triple(ctx)?;
        }
        Ok(())
    }

    /// Create the next segment file and write its leading sections
    fn open_segment(&mut self, ctx: &mut WriteContext<'_>) -> Result<()> {
        let index = ctx.pool.add_segment()?;
        let header = SegmentHeader {
            family: self.magic,
            segment_number: (index + 1) as u16,
        };
        ctx.pool.write_at(index, 0, &header.to_bytes())?;
        self.segment = Some(OpenSegment {
            index,
            cursor: SEGMENT_HEADER_SIZE as u64,
            triple: None,
            has_chunks: false,
        });

        let volume = VolumePayload::from_geometry(
            ctx.geometry,
            self.policy.method,
            self.set_identifier,
        );
        if index == 0 {
            let values = ctx.metadata.header_values().iter_ordered();
            if self.dialect.has_header2() {
                let payload = encode_header2(&values)?;
                self.write_section(ctx, &SectionKind::Header2, &payload)?;
            }
            let payload = encode_header(&values, self.codepage)?;
            self.write_section(ctx, &SectionKind::Header, &payload)?;
            if self.dialect == Dialect::Ftk {
                let payload = encode_header2(&values)?;
                self.write_section(ctx, &SectionKind::Xheader, &payload)?;
            }
            let payload = if self.dialect == Dialect::Smart {
                volume.encode_smart()
            } else {
                volume.encode()
            };
            let segment = self.segment.as_ref().expect("segment is open");
            self.volume_location = Some((index, segment.cursor + SECTION_DESCRIPTOR_SIZE as u64));
            self.write_section(ctx, &SectionKind::Volume, &payload)?;
        } else if self.dialect != Dialect::Smart {
            self.write_section(ctx, &SectionKind::Data, &volume.encode())?;
        }
        Ok(())
    }

    /// Reserve the `sectors` descriptor; it is rewritten when the triple
    /// closes and its payload size is known
    fn open_triple(&mut self, ctx: &mut WriteContext<'_>) -> Result<()> {
        let segment = self.segment.as_mut().expect("segment is open");
        let placeholder = [0u8; SECTION_DESCRIPTOR_SIZE];
        ctx.pool.write_at(segment.index, segment.cursor, &placeholder)?;
        segment.triple = Some(OpenTriple {
            sectors_offset: segment.cursor,
            entries: Vec::new(),
        });
        segment.cursor += SECTION_DESCRIPTOR_SIZE as u64;
        Ok(())
    }

    /// Seal the open triple: fix up `sectors`, emit `table` and `table2`
    fn close_triple(&mut self, ctx: &mut WriteContext<'_>) -> Result<()> {
        let segment = match self.segment.as_mut() {
            Some(segment) => segment,
            None => return Ok(()),
        };
        let Some(triple) = segment.triple.take() else {
            return Ok(());
        };
        if triple.entries.is_empty() {
            // Nothing was written; reclaim the reserved descriptor.
            segment.cursor = triple.sectors_offset;
            return Ok(());
        }
        let sectors_size = segment.cursor - triple.sectors_offset;
        let descriptor = Section::encode(
            &SectionKind::Sectors,
            sectors_size - SECTION_DESCRIPTOR_SIZE as u64,
            segment.cursor,
        );
        ctx.pool
            .write_at(segment.index, triple.sectors_offset, &descriptor)?;

        let payload = TablePayload {
            base_offset: 0,
            entries: triple.entries,
        }
        .encode();
        self.write_section(ctx, &SectionKind::Table, &payload)?;
        self.write_section(ctx, &SectionKind::Table2, &payload)?;
        Ok(())
    }

    /// Append a section with its payload at the cursor
    fn write_section(
        &mut self,
        ctx: &mut WriteContext<'_>,
        kind: &SectionKind,
        payload: &[u8],
    ) -> Result<()> {
        let segment = self.segment.as_mut().expect("segment is open");
        let next = segment.cursor + SECTION_DESCRIPTOR_SIZE as u64 + payload.len() as u64;
        let descriptor = Section::encode(kind, payload.len() as u64, next);
        ctx.pool.write_at(segment.index, segment.cursor, &descriptor)?;
        ctx.pool.write_at(
            segment.index,
            segment.cursor + SECTION_DESCRIPTOR_SIZE as u64,
            payload,
        )?;
        segment.cursor = next;
        Ok(())
    }

    /// Append a self-referential `next`/`done` section
    fn write_terminal(&mut self, ctx: &mut WriteContext<'_>, kind: &SectionKind) -> Result<()> {
        let segment = self.segment.as_mut().expect("segment is open");
        let descriptor = Section::encode(kind, 0, segment.cursor);
        ctx.pool.write_at(segment.index, segment.cursor, &descriptor)?;
        segment.cursor += SECTION_DESCRIPTOR_SIZE as u64;
        Ok(())
    }

    /// Rewrite the volume payload with the final chunk count
    fn rewrite_volume(&mut self, ctx: &mut WriteContext<'_>) -> Result<()> {
        let Some((segment_index, payload_offset)) = self.volume_location else {
            return Ok(());
        };
        let volume = VolumePayload::from_geometry(
            ctx.geometry,
            self.policy.method,
            self.set_identifier,
        );
        let payload = if self.dialect == Dialect::Smart {
            volume.encode_smart()
        } else {
            volume.encode()
        };
        ctx.pool.write_at(segment_index, payload_offset, &payload)?;
        Ok(())
    }
}

/// Bytes needed to close a triple holding `entries` chunks
fn triple_close_overhead(entries: usize) -> u64 {
    let table_payload = ewfkit_format::table::TABLE_HEADER_SIZE as u64 + entries as u64 * 4 + 4;
    2 * (SECTION_DESCRIPTOR_SIZE as u64 + table_payload)
}

/// Magic family a dialect's segment files carry
pub(crate) fn magic_for(dialect: Dialect) -> MagicFamily {
    match dialect {
        Dialect::Ex01 => MagicFamily::Evf2,
        Dialect::L01 => MagicFamily::Lvf,
        _ => MagicFamily::Evf,
    }
}
