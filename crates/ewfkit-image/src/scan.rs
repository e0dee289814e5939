//! Segment chain scanning
//!
//! Walks every segment of an existing image, populating the metadata
//! store and the chunk table, detecting the dialect, locating the delta
//! chain, and, for write-resume, finding the last safe section boundary
//! to truncate back to.

use ewfkit_core::{Diagnostics, Dialect, Error, Result, SegmentPool};
use ewfkit_format::dialect::detect_from_sections;
use ewfkit_format::header::{parse_header, parse_header2, HeaderCodepage};
use ewfkit_format::hashes::{parse_xhash, DigestPayload, HashPayload};
use ewfkit_format::lef::{parse_ltree, LefRecords};
use ewfkit_format::metadata::MetadataStore;
use ewfkit_format::ranges::{parse_ranges, ERROR2_HEADER_PADDING, SESSION_HEADER_PADDING};
use ewfkit_format::section::{
    read_payload, Section, SectionKind, SectionWalker, SegmentHeader, SEGMENT_HEADER_SIZE,
};
use ewfkit_format::table::{ChunkLocation, ChunkTable, TablePayload};
use ewfkit_format::volume::VolumePayload;

use crate::delta::DELTA_CHUNK_HEADER_SIZE;

/// Where a resumed write continues
pub(crate) struct ResumePoint {
    /// Segment to truncate and the offset to truncate it to; `None` when
    /// the chain ended cleanly after a segment roll and writing continues
    /// in a fresh segment
    pub target: Option<(usize, u64)>,
    /// Chunks sealed before the resume point
    pub chunks: u64,
}

/// Everything learned from scanning an existing chain
pub(crate) struct ScanOutcome {
    pub dialect: Dialect,
    pub volume: VolumePayload,
    pub metadata: MetadataStore,
    pub table: ChunkTable,
    pub lef: Option<LefRecords>,
    pub complete: bool,
    pub volume_location: Option<(usize, u64)>,
    pub resume: Option<ResumePoint>,
}

/// Scan the primary chain (and overlay the delta chain when complete)
///
/// With `allow_partial`, section-walk failures in the final segment mark
/// it partial instead of failing the scan; this is the write-resume path.
pub(crate) fn scan_chain(
    pool: &mut dyn SegmentPool,
    diagnostics: &Diagnostics,
    codepage: HeaderCodepage,
    allow_partial: bool,
) -> Result<ScanOutcome> {
    let segment_count = pool.count();
    if segment_count == 0 {
        return Err(Error::argument("segment pool is empty"));
    }

    let mut dialect = None;
    let mut volume: Option<VolumePayload> = None;
    let mut volume_location = None;
    let mut metadata = MetadataStore::new();
    let mut table = ChunkTable::new();
    let mut lef = None;
    let mut complete = false;
    let mut done_segment = 0usize;
    let mut resume = None;
    let mut tables_failed = false;

    for index in 0..segment_count {
        let chunks_at_segment_start = table.len() as u64;
        let (header, sections, terminated) = walk_segment(pool, index, allow_partial)?;
        if header.segment_number as usize != index + 1 {
            return Err(Error::bad_section_header(format!(
                "segment file {} carries segment number {}",
                index + 1,
                header.segment_number
            )));
        }
        if index == 0 {
            dialect = Some(detect_from_sections(header.family, &sections)?);
        }

        // (offset after section, chunks sealed at that point)
        let mut boundary: Option<(u64, u64)> = None;
        let mut last_sectors_end: Option<u64> = None;

        for (position, section) in sections.iter().enumerate() {
            match &section.kind {
                SectionKind::Volume | SectionKind::Disk => {
                    let payload = read_payload(pool, index, section)?;
                    let parsed = VolumePayload::parse(&payload)?;
                    if volume.is_none() {
                        volume_location = Some((index, section.payload_offset()));
                        volume = Some(parsed);
                    }
                    boundary = Some((section.offset + section.size, table.len() as u64));
                }
                SectionKind::Data => {
                    let payload = read_payload(pool, index, section)?;
                    let parsed = VolumePayload::parse(&payload)?;
                    match &volume {
                        Some(existing) => {
                            if existing.set_identifier != parsed.set_identifier {
                                return Err(Error::bad_section_header(format!(
                                    "set identifier mismatch between volume ({}) and data ({}) sections",
                                    existing.set_identifier, parsed.set_identifier
                                )));
                            }
                        }
                        None => volume = Some(parsed),
                    }
                    boundary = Some((section.offset + section.size, table.len() as u64));
                }
                SectionKind::Header => {
                    let payload = read_payload(pool, index, section)?;
                    let pairs = parse_header(&payload, codepage)?;
                    metadata.merge_header_pairs(&pairs);
                    boundary = Some((section.offset + section.size, table.len() as u64));
                }
                SectionKind::Header2 | SectionKind::Xheader => {
                    let payload = read_payload(pool, index, section)?;
                    let pairs = parse_header2(&payload)?;
                    metadata.merge_header_pairs(&pairs);
                    boundary = Some((section.offset + section.size, table.len() as u64));
                }
                SectionKind::Hash => {
                    let payload = read_payload(pool, index, section)?;
                    let hash = HashPayload::parse(&payload)?;
                    metadata
                        .hash_values_mut()
                        .set_if_unset("MD5", &hex::encode(hash.md5));
                }
                SectionKind::Digest => {
                    let payload = read_payload(pool, index, section)?;
                    let digest = DigestPayload::parse(&payload)?;
                    metadata
                        .hash_values_mut()
                        .set_if_unset("MD5", &hex::encode(digest.md5));
                    metadata
                        .hash_values_mut()
                        .set_if_unset("SHA1", &hex::encode(digest.sha1));
                }
                SectionKind::Xhash => {
                    let payload = read_payload(pool, index, section)?;
                    let pairs = parse_xhash(&payload)?;
                    metadata.merge_hash_pairs(&pairs);
                }
                SectionKind::Error2 => {
                    let payload = read_payload(pool, index, section)?;
                    metadata.acquiry_errors = parse_ranges(&payload, ERROR2_HEADER_PADDING)?;
                }
                SectionKind::Session => {
                    let payload = read_payload(pool, index, section)?;
                    metadata.sessions = parse_ranges(&payload, SESSION_HEADER_PADDING)?;
                }
                SectionKind::Ltree => {
                    let payload = read_payload(pool, index, section)?;
                    lef = Some(parse_ltree(&payload, diagnostics)?);
                }
                SectionKind::Sectors => {
                    last_sectors_end = Some(section.offset + section.size);
                }
                SectionKind::Table => {
                    if tables_failed {
                        continue;
                    }
                    let chunk_data_end = last_sectors_end.unwrap_or(section.offset);
                    let parsed = read_payload(pool, index, section)
                        .and_then(|payload| TablePayload::parse(&payload));
                    match parsed {
                        Ok(payload) => {
                            table.append_payload(index as u32, &payload, chunk_data_end)?;
                        }
                        Err(error) => {
                            let recovered = sections[position + 1..]
                                .iter()
                                .find(|candidate| candidate.kind == SectionKind::Table2)
                                .and_then(|mirror| read_payload(pool, index, mirror).ok())
                                .and_then(|payload| TablePayload::parse(&payload).ok());
                            match recovered {
                                Some(payload) => {
                                    diagnostics.count_recovered_table();
                                    table.append_payload(index as u32, &payload, chunk_data_end)?;
                                }
                                None => {
                                    tracing::warn!(
                                        segment = index,
                                        %error,
                                        "table and table2 both unreadable; remaining chunks marked missing"
                                    );
                                    tables_failed = true;
                                }
                            }
                        }
                    }
                }
                SectionKind::Table2 => {
                    // Consumed with its table; marks the triple as fully
                    // on disk for resume purposes.
                    boundary = Some((section.offset + section.size, table.len() as u64));
                }
                SectionKind::Next => {}
                SectionKind::Done => {
                    complete = true;
                    done_segment = index;
                }
                SectionKind::DeltaChunk => {}
                SectionKind::Unknown(tag) => diagnostics.count_unknown_section(tag),
            }
        }

        if complete {
            break;
        }
        if !terminated {
            if index + 1 != segment_count {
                return Err(Error::unsupported(format!(
                    "segment {} has no terminal section but the chain continues",
                    index + 1
                )));
            }
            let (truncate_at, chunks) =
                boundary.unwrap_or((SEGMENT_HEADER_SIZE as u64, chunks_at_segment_start));
            resume = Some(ResumePoint {
                target: Some((index, truncate_at)),
                chunks,
            });
        }
    }

    let dialect = dialect.expect("first segment was scanned");
    let volume = volume.ok_or_else(|| Error::unsupported("image has no volume section"))?;

    if complete {
        let expected = volume.to_geometry().number_of_chunks() as usize;
        if table.len() < expected {
            table.append_missing(expected - table.len());
        }
        if done_segment + 1 < segment_count {
            overlay_delta_chain(pool, done_segment + 1, segment_count, &mut table)?;
        }
    } else if resume.is_none() {
        // Every segment ended cleanly with `next`; resume in a fresh one.
        resume = Some(ResumePoint {
            target: None,
            chunks: table.len() as u64,
        });
    }

    Ok(ScanOutcome {
        dialect,
        volume,
        metadata,
        table,
        lef,
        complete,
        volume_location,
        resume,
    })
}

/// Walk one segment, optionally tolerating a corrupt tail
///
/// Returns the parsed sections and whether the walk reached a terminal
/// `next`/`done` section.
fn walk_segment(
    pool: &mut dyn SegmentPool,
    index: usize,
    allow_partial: bool,
) -> Result<(SegmentHeader, Vec<Section>, bool)> {
    let (header, mut walker) = SectionWalker::new(pool, index)?;
    let mut sections = Vec::new();
    loop {
        match walker.next_section() {
            Ok(Some(section)) => sections.push(section),
            Ok(None) => break,
            Err(error) if allow_partial => {
                tracing::debug!(segment = index, %error, "segment has a partial tail");
                return Ok((header, sections, false));
            }
            Err(error) => return Err(error),
        }
    }
    let terminated = sections
        .last()
        .map(|section| section.kind.is_terminal())
        .unwrap_or(false);
    Ok((header, sections, terminated))
}

/// Overlay `delta_chunk` sections from the segments past the `done`
/// segment
fn overlay_delta_chain(
    pool: &mut dyn SegmentPool,
    first: usize,
    end: usize,
    table: &mut ChunkTable,
) -> Result<()> {
    for index in first..end {
        let (_, sections, _) = walk_segment(pool, index, false)?;
        for section in &sections {
            if section.kind != SectionKind::DeltaChunk {
                continue;
            }
            if section.payload_size() < (DELTA_CHUNK_HEADER_SIZE + 4) as u64 {
                return Err(Error::bad_section_header(
                    "delta chunk section too small for its header",
                ));
            }
            let mut head = [0u8; DELTA_CHUNK_HEADER_SIZE];
            pool.read_at(index, section.payload_offset(), &mut head)?;
            let chunk_index = u32::from_le_bytes(head[0..4].try_into().expect("4 bytes")) as u64;
            table.overlay_delta(
                chunk_index,
                ChunkLocation {
                    segment: index as u32,
                    offset: section.payload_offset() + DELTA_CHUNK_HEADER_SIZE as u64,
                    stored_size: (section.payload_size() - DELTA_CHUNK_HEADER_SIZE as u64) as u32,
                    is_compressed: false,
                    is_delta: true,
                    is_missing: false,
                },
            )?;
        }
    }
    Ok(())
}
