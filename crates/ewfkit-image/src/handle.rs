//! Image handle
//!
//! [`EwfImage`] is the root entity: it owns the segment pool, the parsed
//! chunk table and metadata, the chunk cache, and in write modes the
//! write planner or delta writer. One handle is single-threaded at the
//! API boundary; the metadata store and chunk cache sit behind
//! read-write locks so metadata getters stay usable from shared
//! references while media operations hold the handle mutably.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use ewfkit_core::{
    CompressionMethod, CompressionPolicy, Diagnostics, Dialect, Error, MediaFlags, MediaGeometry,
    MediaType, OpenMode, Result, SectorRange, SegmentPool,
};
use ewfkit_format::header::HeaderCodepage;
use ewfkit_format::lef::{FileEntry, LefRecords};
use ewfkit_format::metadata::MetadataStore;
use ewfkit_format::table::ChunkTable;
use uuid::Uuid;

use crate::cache::{ChunkCache, DEFAULT_CACHE_CAPACITY};
use crate::delta::DeltaWriter;
use crate::scan::scan_chain;
use crate::writer::{
    magic_for, TrailerSections, WriteContext, WritePlanner, DEFAULT_MAX_SEGMENT_SIZE,
};

/// Lifecycle state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Open for reading
    ReadOnly,
    /// Open for a fresh acquisition
    Writing,
    /// Open to continue a partial acquisition
    WriteResuming,
    /// Open for reading with delta-shadowed writes
    ReadWrite,
    /// A close is in progress or failed partway; close may be retried
    Flushing,
    /// Closed; only `close` (a no-op) is valid
    Closed,
}

/// Options for creating a new image
#[derive(Debug, Clone)]
pub struct ImageCreateOptions {
    /// On-disk dialect to write
    pub dialect: Dialect,
    /// Logical sector size
    pub bytes_per_sector: u32,
    /// Sectors per chunk
    pub sectors_per_chunk: u32,
    /// Media type recorded in the volume section
    pub media_type: MediaType,
    /// Media flags recorded in the volume section
    pub media_flags: MediaFlags,
    /// Error granularity in sectors
    pub error_granularity: u32,
    /// Declared media size; `None` lets the size follow the writes
    pub media_size: Option<u64>,
    /// Segment file size ceiling
    pub maximum_segment_size: u64,
    /// Chunk compression policy
    pub compression: CompressionPolicy,
    /// Codepage for the `header` section
    pub header_codepage: HeaderCodepage,
    /// Chunk cache capacity
    pub cache_capacity: usize,
    /// Acquisition set identifier; `None` generates a fresh one. Fixing
    /// it makes image production reproducible byte for byte.
    pub set_identifier: Option<Uuid>,
}

impl Default for ImageCreateOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Encase6,
            bytes_per_sector: 512,
            sectors_per_chunk: 64,
            media_type: MediaType::Fixed,
            media_flags: MediaFlags(MediaFlags::PHYSICAL),
            error_granularity: 64,
            media_size: None,
            maximum_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            compression: CompressionPolicy::default(),
            header_codepage: HeaderCodepage::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            set_identifier: None,
        }
    }
}

/// Options for opening an existing image
#[derive(Debug, Clone)]
pub struct ImageOpenOptions {
    /// Return flagged bytes instead of failing on chunk checksum
    /// mismatches; mismatched ranges land in the checksum-error table
    pub tolerant: bool,
    /// Codepage for decoding the `header` section
    pub header_codepage: HeaderCodepage,
    /// Chunk cache capacity
    pub cache_capacity: usize,
    /// Segment ceiling for segments appended by write-resume; `None`
    /// keeps the default
    pub maximum_segment_size: Option<u64>,
}

impl Default for ImageOpenOptions {
    fn default() -> Self {
        Self {
            tolerant: false,
            header_codepage: HeaderCodepage::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            maximum_segment_size: None,
        }
    }
}

/// An EWF image: a chain of segment files holding chunked, compressed,
/// checksummed media plus acquisition metadata
pub struct EwfImage {
    pub(crate) pool: Box<dyn SegmentPool>,
    pub(crate) dialect: Dialect,
    pub(crate) mode: OpenMode,
    pub(crate) state: HandleState,
    pub(crate) tolerant: bool,
    pub(crate) codepage: HeaderCodepage,
    pub(crate) geometry: MediaGeometry,
    pub(crate) policy: CompressionPolicy,
    pub(crate) read_method: CompressionMethod,
    pub(crate) set_identifier: Uuid,
    pub(crate) position: u64,
    pub(crate) table: ChunkTable,
    pub(crate) cache: RwLock<ChunkCache>,
    pub(crate) metadata: RwLock<MetadataStore>,
    pub(crate) lef: Option<LefRecords>,
    pub(crate) diagnostics: Arc<Diagnostics>,
    pub(crate) abort: Arc<AtomicBool>,
    pub(crate) planner: Option<WritePlanner>,
    pub(crate) delta: Option<DeltaWriter>,
    pub(crate) assembly: Vec<u8>,
    pub(crate) media_written: u64,
    pub(crate) preset_media_size: Option<u64>,
}

impl EwfImage {
    /// Open an existing image
    ///
    /// `Read` and `ReadWrite` require a complete image; `WriteResume`
    /// requires an incomplete one and positions the write cursor after
    /// the last fully-written chunk triple.
    pub fn open(pool: Box<dyn SegmentPool>, mode: OpenMode) -> Result<Self> {
        Self::open_with_options(pool, mode, ImageOpenOptions::default())
    }

    /// Open an existing on-disk image from its first segment file
    ///
    /// The rest of the chain is discovered through the segment naming
    /// scheme (`.E02`, `.E03`, ...).
    pub fn open_path(first_segment: &std::path::Path, mode: OpenMode) -> Result<Self> {
        let pool: ewfkit_pool::FileSegmentPool = if mode.is_writable() {
            ewfkit_pool::FileSegmentPool::open_writable(first_segment)?
        } else {
            ewfkit_pool::FileSegmentPool::open(first_segment)?
        };
        Self::open(Box::new(pool), mode)
    }

    /// Create a new on-disk image whose first segment is `first_segment`
    pub fn create_path(
        first_segment: &std::path::Path,
        options: ImageCreateOptions,
    ) -> Result<Self> {
        let pool = ewfkit_pool::FileSegmentPool::create(first_segment)?;
        Self::create(Box::new(pool), options)
    }

    /// Open an existing image with explicit options
    pub fn open_with_options(
        mut pool: Box<dyn SegmentPool>,
        mode: OpenMode,
        options: ImageOpenOptions,
    ) -> Result<Self> {
        let diagnostics = Arc::new(Diagnostics::new());
        match mode {
            OpenMode::Write => Err(Error::argument(
                "open() is for existing images; use create() for new ones",
            )),
            OpenMode::Read | OpenMode::ReadWrite => {
                let outcome =
                    scan_chain(&mut *pool, &diagnostics, options.header_codepage, false)?;
                if !outcome.complete {
                    return Err(Error::state(
                        "image is incomplete; open it in write-resume mode",
                    ));
                }
                let geometry = outcome.volume.to_geometry();
                let dialect = outcome.dialect;
                let delta = (mode == OpenMode::ReadWrite)
                    .then(|| DeltaWriter::new(magic_for(dialect)));
                let state = if mode == OpenMode::Read {
                    HandleState::ReadOnly
                } else {
                    HandleState::ReadWrite
                };
                tracing::debug!(%dialect, media_size = geometry.media_size, "opened image");
                Ok(Self {
                    pool,
                    dialect,
                    mode,
                    state,
                    tolerant: options.tolerant,
                    codepage: options.header_codepage,
                    geometry,
                    policy: policy_from_volume(&outcome.volume, dialect),
                    read_method: dialect.default_compression(),
                    set_identifier: outcome.volume.set_identifier,
                    position: 0,
                    table: outcome.table,
                    cache: RwLock::new(ChunkCache::new(options.cache_capacity)),
                    metadata: RwLock::new(outcome.metadata),
                    lef: outcome.lef,
                    diagnostics,
                    abort: Arc::new(AtomicBool::new(false)),
                    planner: None,
                    delta,
                    assembly: Vec::new(),
                    media_written: geometry.media_size,
                    preset_media_size: None,
                })
            }
            OpenMode::WriteResume => {
                let outcome =
                    scan_chain(&mut *pool, &diagnostics, options.header_codepage, true)?;
                if outcome.complete {
                    return Err(Error::state("image is already complete"));
                }
                let resume = outcome
                    .resume
                    .expect("incomplete scans produce a resume point");
                let volume_location = outcome.volume_location.ok_or_else(|| {
                    Error::unsupported("cannot resume an image without a volume section")
                })?;
                let mut table = outcome.table;
                table.truncate(resume.chunks as usize);
                if let Some((segment, offset)) = resume.target {
                    pool.truncate(segment, offset)?;
                    tracing::debug!(segment, offset, "truncated partial segment tail");
                }
                let geometry = outcome.volume.to_geometry();
                let dialect = outcome.dialect;
                let policy = policy_from_volume(&outcome.volume, dialect);
                let planner = WritePlanner::resume(
                    dialect,
                    policy,
                    options.header_codepage,
                    options
                        .maximum_segment_size
                        .unwrap_or(DEFAULT_MAX_SEGMENT_SIZE),
                    outcome.volume.set_identifier,
                    resume.target,
                    resume.chunks,
                    volume_location,
                )?;
                let chunk_size = geometry.chunk_size() as u64;
                let preset = (geometry.media_size > 0).then_some(geometry.media_size);
                let media_written = match preset {
                    Some(preset) => (resume.chunks * chunk_size).min(preset),
                    None => resume.chunks * chunk_size,
                };
                let mut image = Self {
                    pool,
                    dialect,
                    mode,
                    state: HandleState::WriteResuming,
                    tolerant: options.tolerant,
                    codepage: options.header_codepage,
                    geometry,
                    policy,
                    read_method: dialect.default_compression(),
                    set_identifier: outcome.volume.set_identifier,
                    position: media_written,
                    table,
                    cache: RwLock::new(ChunkCache::new(options.cache_capacity)),
                    metadata: RwLock::new(outcome.metadata),
                    lef: outcome.lef,
                    diagnostics,
                    abort: Arc::new(AtomicBool::new(false)),
                    planner: Some(planner),
                    delta: None,
                    assembly: Vec::new(),
                    media_written,
                    preset_media_size: preset,
                };
                image.rehash_existing(resume.chunks)?;
                tracing::debug!(chunks = resume.chunks, "resuming acquisition");
                Ok(image)
            }
        }
    }

    /// Create a new image for writing
    ///
    /// The pool must be empty; the first segment file appears with the
    /// first flushed chunk. Header values must be staged before any
    /// media is written.
    pub fn create(pool: Box<dyn SegmentPool>, options: ImageCreateOptions) -> Result<Self> {
        if pool.count() != 0 {
            return Err(Error::argument("segment pool already contains segments"));
        }
        if options.bytes_per_sector == 0 || options.sectors_per_chunk == 0 {
            return Err(Error::argument("sector and chunk geometry must be nonzero"));
        }
        if options.compression.method == CompressionMethod::Bzip2
            && options.dialect != Dialect::Ex01
        {
            return Err(Error::unsupported(
                "bzip2 chunk compression requires the Ex01 dialect",
            ));
        }
        let set_identifier = options.set_identifier.unwrap_or_else(Uuid::new_v4);
        let planner = WritePlanner::new(
            options.dialect,
            options.compression,
            options.header_codepage,
            options.maximum_segment_size,
            set_identifier,
        )?;
        let geometry = MediaGeometry {
            media_size: options.media_size.unwrap_or(0),
            bytes_per_sector: options.bytes_per_sector,
            sectors_per_chunk: options.sectors_per_chunk,
            error_granularity: options.error_granularity,
            media_type: options.media_type,
            media_flags: options.media_flags,
        };
        Ok(Self {
            pool,
            dialect: options.dialect,
            mode: OpenMode::Write,
            state: HandleState::Writing,
            tolerant: false,
            codepage: options.header_codepage,
            geometry,
            policy: options.compression,
            read_method: options.compression.method,
            set_identifier,
            position: 0,
            table: ChunkTable::new(),
            cache: RwLock::new(ChunkCache::new(options.cache_capacity)),
            metadata: RwLock::new(MetadataStore::new()),
            lef: None,
            diagnostics: Arc::new(Diagnostics::new()),
            abort: Arc::new(AtomicBool::new(false)),
            planner: Some(planner),
            delta: None,
            assembly: Vec::new(),
            media_written: 0,
            preset_media_size: options.media_size,
        })
    }

    /// Close the handle
    ///
    /// In write modes this seals the trailing chunk, emits the trailer
    /// sections and the final hashes, and rewrites the volume with the
    /// final chunk count. Closing an already-closed handle is a no-op.
    /// After an abort with a partial chunk buffered, the image is left
    /// write-resumable instead of finalized.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            HandleState::Closed => Ok(()),
            HandleState::ReadOnly => {
                self.state = HandleState::Closed;
                Ok(())
            }
            HandleState::Writing | HandleState::WriteResuming => self.close_write(),
            HandleState::ReadWrite => self.close_delta(),
            HandleState::Flushing => {
                if self.planner.is_some() {
                    self.close_write()
                } else if self.delta.is_some() {
                    self.close_delta()
                } else {
                    self.state = HandleState::Closed;
                    Ok(())
                }
            }
        }
    }

    fn close_write(&mut self) -> Result<()> {
        self.state = HandleState::Flushing;
        if self.abort.load(Ordering::Relaxed) && !self.assembly.is_empty() {
            // A partial chunk was in flight; leave the image resumable.
            self.assembly.clear();
            self.planner = None;
            self.state = HandleState::Closed;
            tracing::warn!("aborted mid-chunk; image left in write-resume state");
            return Ok(());
        }
        self.flush_assembly()?;
        self.geometry.media_size = self.media_written;

        let summary = {
            let metadata = self.metadata.read().expect("metadata lock");
            let extra_hash_values: Vec<(String, String)> = metadata
                .hash_values()
                .iter_ordered()
                .into_iter()
                .filter(|(id, _)| id != "MD5" && id != "SHA1")
                .collect();
            let trailer = TrailerSections {
                acquiry_errors: &metadata.acquiry_errors,
                sessions: &metadata.sessions,
                lef: self.lef.as_ref(),
                extra_hash_values: &extra_hash_values,
            };
            let mut ctx = WriteContext {
                pool: &mut *self.pool,
                metadata: &metadata,
                geometry: &self.geometry,
            };
            self.planner
                .as_mut()
                .expect("write planner is present in write states")
                .finalize(&mut ctx, &trailer)?
        };
        {
            let mut metadata = self.metadata.write().expect("metadata lock");
            metadata.hash_values_mut().set("MD5", hex::encode(summary.md5));
            metadata
                .hash_values_mut()
                .set("SHA1", hex::encode(summary.sha1));
        }
        self.state = HandleState::Closed;
        Ok(())
    }

    fn close_delta(&mut self) -> Result<()> {
        self.state = HandleState::Flushing;
        let dirty = self.cache.write().expect("cache lock").take_dirty();
        for (chunk_index, data) in dirty {
            self.flush_delta_chunk(chunk_index, &data)?;
        }
        self.delta
            .as_mut()
            .expect("delta writer is present in read-write mode")
            .finalize(&mut *self.pool)?;
        self.state = HandleState::Closed;
        Ok(())
    }

    /// Request cooperative cancellation
    ///
    /// The engine checks the flag at chunk boundaries; affected
    /// operations return [`Error::Aborted`].
    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Move the media position
    ///
    /// Pure arithmetic; in write modes, positions beyond the written
    /// tail are rejected.
    pub fn seek(&mut self, pos: std::io::SeekFrom) -> Result<u64> {
        use std::io::SeekFrom;
        let media_size = self.media_size();
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => media_size as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };
        if target < 0 {
            return Err(Error::argument("seek before the start of the media"));
        }
        let target = target as u64;
        if matches!(
            self.state,
            HandleState::Writing | HandleState::WriteResuming
        ) {
            let tail = self.sealed_bytes() + self.assembly.len() as u64;
            if target > tail {
                return Err(Error::argument(format!(
                    "seek to {} is beyond the written tail {}",
                    target, tail
                )));
            }
        }
        self.position = target;
        Ok(self.position)
    }

    /// Current media position
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Total media size in bytes
    pub fn media_size(&self) -> u64 {
        self.geometry.media_size.max(self.media_written)
    }

    /// Logical sector size
    pub fn bytes_per_sector(&self) -> u32 {
        self.geometry.bytes_per_sector
    }

    /// Sectors per chunk
    pub fn sectors_per_chunk(&self) -> u32 {
        self.geometry.sectors_per_chunk
    }

    /// Chunk size in bytes
    pub fn chunk_size(&self) -> u32 {
        self.geometry.chunk_size()
    }

    /// Total number of sectors
    pub fn number_of_sectors(&self) -> u64 {
        self.media_size()
            .div_ceil(self.geometry.bytes_per_sector as u64)
    }

    /// Read-error granularity in sectors
    pub fn error_granularity(&self) -> u32 {
        self.geometry.error_granularity
    }

    /// Media type
    pub fn media_type(&self) -> MediaType {
        self.geometry.media_type
    }

    /// Media flags
    pub fn media_flags(&self) -> MediaFlags {
        self.geometry.media_flags
    }

    /// Chunk compression method
    pub fn compression_method(&self) -> CompressionMethod {
        self.policy.method
    }

    /// On-disk dialect
    pub fn format(&self) -> Dialect {
        self.dialect
    }

    /// Acquisition set identifier
    pub fn set_identifier(&self) -> Uuid {
        self.set_identifier
    }

    /// Codepage used for the `header` section
    pub fn header_codepage(&self) -> HeaderCodepage {
        self.codepage
    }

    /// Change the `header` section codepage
    pub fn set_header_codepage(&mut self, codepage: HeaderCodepage) {
        self.codepage = codepage;
    }

    /// Look up a header value by its long identifier
    pub fn header_value(&self, identifier: &str) -> Option<String> {
        self.metadata
            .read()
            .expect("metadata lock")
            .header_values()
            .get(identifier)
            .map(str::to_string)
    }

    /// All header values, known identifiers first
    pub fn header_values(&self) -> Vec<(String, String)> {
        self.metadata
            .read()
            .expect("metadata lock")
            .header_values()
            .iter_ordered()
    }

    /// Stage a header value; acquisition modes only, before media is
    /// written
    pub fn set_header_value(
        &mut self,
        identifier: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.ensure_metadata_writable()?;
        self.metadata
            .write()
            .expect("metadata lock")
            .header_values_mut()
            .set(identifier, value);
        Ok(())
    }

    /// Look up a hash value (`MD5`, `SHA1`, or custom)
    pub fn hash_value(&self, identifier: &str) -> Option<String> {
        self.metadata
            .read()
            .expect("metadata lock")
            .hash_values()
            .get(identifier)
            .map(str::to_string)
    }

    /// All hash values, `MD5` and `SHA1` first
    pub fn hash_values(&self) -> Vec<(String, String)> {
        self.metadata
            .read()
            .expect("metadata lock")
            .hash_values()
            .iter_ordered()
    }

    /// Stage a custom hash value; acquisition modes only
    pub fn set_hash_value(
        &mut self,
        identifier: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.ensure_metadata_writable()?;
        self.metadata
            .write()
            .expect("metadata lock")
            .hash_values_mut()
            .set(identifier, value);
        Ok(())
    }

    /// Sector ranges that failed to read during acquisition
    pub fn acquiry_errors(&self) -> Vec<SectorRange> {
        self.metadata
            .read()
            .expect("metadata lock")
            .acquiry_errors
            .clone()
    }

    /// Record an acquiry read error; acquisition modes only
    pub fn add_acquiry_error(&mut self, range: SectorRange) -> Result<()> {
        self.ensure_metadata_writable()?;
        self.metadata
            .write()
            .expect("metadata lock")
            .acquiry_errors
            .push(range);
        Ok(())
    }

    /// Session boundaries on optical media
    pub fn sessions(&self) -> Vec<SectorRange> {
        self.metadata
            .read()
            .expect("metadata lock")
            .sessions
            .clone()
    }

    /// Record a session boundary; acquisition modes only
    pub fn add_session(&mut self, range: SectorRange) -> Result<()> {
        self.ensure_metadata_writable()?;
        self.metadata
            .write()
            .expect("metadata lock")
            .sessions
            .push(range);
        Ok(())
    }

    /// Sector ranges whose checksums mismatched in tolerant mode
    pub fn checksum_errors(&self) -> Vec<SectorRange> {
        self.metadata
            .read()
            .expect("metadata lock")
            .checksum_errors
            .clone()
    }

    /// Counters for locally-recovered anomalies
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Root of the logical evidence file tree, if this is an L01 image
    pub fn root_file_entry(&self) -> Option<&FileEntry> {
        self.lef.as_ref().map(|records| records.tree.root())
    }

    /// All parsed logical evidence records
    pub fn logical_records(&self) -> Option<&LefRecords> {
        self.lef.as_ref()
    }

    /// Stage logical evidence records for writing; acquisition modes only
    pub fn set_logical_records(&mut self, records: LefRecords) -> Result<()> {
        self.ensure_metadata_writable()?;
        self.lef = Some(records);
        Ok(())
    }

    /// Read a file entry's data stream by entry identifier
    pub fn read_file_entry_data(&mut self, identifier: u64) -> Result<Vec<u8>> {
        let (offset, size) = {
            let records = self
                .lef
                .as_ref()
                .ok_or_else(|| Error::state("image has no logical evidence records"))?;
            let entry = records.tree.entry_by_identifier(identifier).ok_or_else(|| {
                Error::argument(format!("no file entry with identifier {}", identifier))
            })?;
            (entry.data_offset, entry.data_size)
        };
        let mut data = vec![0u8; size as usize];
        let count = self.read_at(offset, &mut data)?;
        if count as u64 != size {
            return Err(Error::corrupt_chunk(format!(
                "file entry {} data stream truncated at {} of {} bytes",
                identifier, count, size
            )));
        }
        Ok(data)
    }

    /// Current lifecycle state
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Metadata can only change while the image itself is being written;
    /// delta mode would drop the change silently at close
    fn ensure_metadata_writable(&self) -> Result<()> {
        match self.mode {
            OpenMode::Write | OpenMode::WriteResume => Ok(()),
            OpenMode::Read | OpenMode::ReadWrite => {
                Err(Error::state("metadata is immutable in this mode"))
            }
        }
    }
}

impl Drop for EwfImage {
    fn drop(&mut self) {
        if self.state != HandleState::Closed {
            if let Err(error) = self.close() {
                tracing::warn!(%error, "close during drop failed");
            }
        }
    }
}

impl std::io::Read for EwfImage {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read_buffer(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

impl std::io::Write for EwfImage {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_buffer(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::io::Seek for EwfImage {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        EwfImage::seek(self, pos)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
    }
}

/// Reconstruct the effective compression policy from a parsed volume
fn policy_from_volume(
    volume: &ewfkit_format::volume::VolumePayload,
    dialect: Dialect,
) -> CompressionPolicy {
    match volume.compression_level {
        0 => CompressionPolicy::none(),
        2 => CompressionPolicy {
            method: dialect.default_compression(),
            level: 9,
            empty_block: false,
        },
        _ => CompressionPolicy {
            method: dialect.default_compression(),
            level: 1,
            empty_block: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ewfkit_core::CompressionPolicy;
    use ewfkit_format::codec::deflate_compress;
    use ewfkit_format::lef::parse_records;
    use ewfkit_format::section::{Section, SectionKind};
    use ewfkit_pool::MemorySegmentPool;
    use md5::{Digest, Md5};
    use std::sync::Mutex;

    /// Pool whose storage outlives the handle, so tests can reopen and
    /// corrupt segments between sessions.
    #[derive(Clone)]
    struct SharedPool(Arc<Mutex<MemorySegmentPool>>);

    impl SharedPool {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(MemorySegmentPool::new())))
        }

        fn segment_count(&self) -> usize {
            self.0.lock().unwrap().count()
        }

        fn segment_len(&self, index: usize) -> usize {
            self.0.lock().unwrap().segment(index).unwrap().len()
        }

        fn flip_byte(&self, index: usize, offset: u64) {
            let mut pool = self.0.lock().unwrap();
            pool.segment_mut(index).unwrap()[offset as usize] ^= 0x01;
        }

        fn segments(&self) -> Vec<Vec<u8>> {
            let pool = self.0.lock().unwrap();
            (0..pool.count())
                .map(|index| pool.segment(index).unwrap().to_vec())
                .collect()
        }
    }

    impl SegmentPool for SharedPool {
        fn count(&self) -> usize {
            self.0.lock().unwrap().count()
        }

        fn add_segment(&mut self) -> Result<usize> {
            self.0.lock().unwrap().add_segment()
        }

        fn size(&mut self, index: usize) -> Result<u64> {
            self.0.lock().unwrap().size(index)
        }

        fn read_at(&mut self, index: usize, offset: u64, buf: &mut [u8]) -> Result<()> {
            self.0.lock().unwrap().read_at(index, offset, buf)
        }

        fn write_at(&mut self, index: usize, offset: u64, buf: &[u8]) -> Result<()> {
            self.0.lock().unwrap().write_at(index, offset, buf)
        }

        fn truncate(&mut self, index: usize, len: u64) -> Result<()> {
            self.0.lock().unwrap().truncate(index, len)
        }

        fn close(&mut self, index: usize) -> Result<()> {
            self.0.lock().unwrap().close(index)
        }
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
    }

    fn small_chunk_options() -> ImageCreateOptions {
        ImageCreateOptions {
            sectors_per_chunk: 64, // 32 KiB chunks
            ..ImageCreateOptions::default()
        }
    }

    fn write_image(pool: &SharedPool, data: &[u8], options: ImageCreateOptions) {
        let mut image = EwfImage::create(Box::new(pool.clone()), options).unwrap();
        image.set_header_value("case_number", "2024-117").unwrap();
        image.set_header_value("examiner_name", "J. Doe").unwrap();
        image.write_buffer(data).unwrap();
        image.close().unwrap();
    }

    fn read_all(pool: &SharedPool) -> Vec<u8> {
        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        let mut data = vec![0u8; image.media_size() as usize];
        let count = image.read_at(0, &mut data).unwrap();
        assert_eq!(count, data.len());
        data
    }

    /// Find a section of the given kind in a segment, via the format
    /// crate's walker.
    fn find_section(pool: &SharedPool, segment: usize, kind: SectionKind) -> Section {
        let mut shared = pool.clone();
        let (_, sections) =
            ewfkit_format::section::scan_segment(&mut shared, segment).unwrap();
        sections
            .into_iter()
            .find(|section| section.kind == kind)
            .expect("section present")
    }

    #[test]
    fn test_write_read_roundtrip_deflate() {
        let pool = SharedPool::new();
        // Not a multiple of the chunk size: exercises the short final
        // chunk.
        let data = patterned(100 * 1024);
        write_image(&pool, &data, small_chunk_options());

        let recovered = read_all(&pool);
        assert_eq!(recovered, data);

        let image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        let expected_md5 = hex::encode(Md5::digest(&data));
        assert_eq!(image.hash_value("MD5"), Some(expected_md5));
        assert!(image.hash_value("SHA1").is_some());
        assert_eq!(image.header_value("case_number").as_deref(), Some("2024-117"));
        assert_eq!(image.format(), Dialect::Encase6);
        assert_eq!(image.media_size(), data.len() as u64);
    }

    #[test]
    fn test_write_read_roundtrip_uncompressed() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        write_image(
            &pool,
            &data,
            ImageCreateOptions {
                compression: CompressionPolicy::none(),
                ..small_chunk_options()
            },
        );
        assert_eq!(read_all(&pool), data);
    }

    #[test]
    fn test_empty_block_chunks() {
        let pool = SharedPool::new();
        let data = vec![0u8; 64 * 1024];
        write_image(
            &pool,
            &data,
            ImageCreateOptions {
                compression: CompressionPolicy::none_with_empty_block(),
                ..small_chunk_options()
            },
        );
        // Two 32 KiB chunks stored as 16-byte records keep the whole
        // segment tiny.
        assert_eq!(pool.segment_count(), 1);
        assert!(pool.segment_len(0) < 8 * 1024, "segment is {} bytes", pool.segment_len(0));
        assert_eq!(read_all(&pool), data);
    }

    #[test]
    fn test_cross_chunk_read() {
        let pool = SharedPool::new();
        let mut data = vec![b'A'; 32 * 1024];
        data.extend(vec![b'B'; 32 * 1024]);
        write_image(&pool, &data, small_chunk_options());

        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        let mut buf = [0u8; 8];
        let count = image.read_at(32 * 1024 - 4, &mut buf).unwrap();
        assert_eq!(count, 8);
        assert_eq!(&buf, b"AAAABBBB");
    }

    #[test]
    fn test_segment_roll() {
        let pool = SharedPool::new();
        let data = patterned(512 * 1024);
        write_image(
            &pool,
            &data,
            ImageCreateOptions {
                compression: CompressionPolicy::none(),
                maximum_segment_size: 96 * 1024,
                ..small_chunk_options()
            },
        );
        assert!(pool.segment_count() >= 3, "got {} segments", pool.segment_count());
        assert_eq!(read_all(&pool), data);

        // Reads that span a segment boundary: chunk 1/2 straddle the
        // first roll.
        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        let mut buf = vec![0u8; 64 * 1024];
        let offset = 32 * 1024;
        image.read_at(offset as u64, &mut buf).unwrap();
        assert_eq!(buf, data[offset..offset + 64 * 1024]);
    }

    #[test]
    fn test_corruption_detection() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        write_image(&pool, &data, small_chunk_options());

        // Flip a byte in the middle of the first stored chunk.
        let sectors = find_section(&pool, 0, SectionKind::Sectors);
        pool.flip_byte(0, sectors.payload_offset() + 40);

        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            image.read_at(1000, &mut buf),
            Err(Error::CorruptChunk(_))
        ));
        // The second chunk is unaffected.
        let count = image.read_at(40 * 1024, &mut buf).unwrap();
        assert_eq!(count, 16);
        assert_eq!(buf[..], data[40 * 1024..40 * 1024 + 16]);
    }

    #[test]
    fn test_table2_fallback() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        write_image(&pool, &data, small_chunk_options());

        // Corrupt the table payload header; table2 takes over.
        let table = find_section(&pool, 0, SectionKind::Table);
        pool.flip_byte(0, table.payload_offset() + 1);

        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        let mut buf = vec![0u8; data.len()];
        image.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(image.diagnostics().recovered_tables(), 1);
    }

    #[test]
    fn test_both_tables_corrupt_marks_chunks_missing() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        write_image(&pool, &data, small_chunk_options());

        let table = find_section(&pool, 0, SectionKind::Table);
        pool.flip_byte(0, table.payload_offset() + 1);
        let table2 = find_section(&pool, 0, SectionKind::Table2);
        pool.flip_byte(0, table2.payload_offset() + 1);

        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            image.read_at(0, &mut buf),
            Err(Error::MissingChunk(0))
        ));
    }

    #[test]
    fn test_tolerant_mode_flags_and_returns_bytes() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        write_image(
            &pool,
            &data,
            ImageCreateOptions {
                compression: CompressionPolicy::none(),
                ..small_chunk_options()
            },
        );

        // Corrupt the checksum trailer of the first chunk; the payload
        // itself is intact.
        let sectors = find_section(&pool, 0, SectionKind::Sectors);
        pool.flip_byte(0, sectors.payload_offset() + 32 * 1024);

        let mut image = EwfImage::open_with_options(
            Box::new(pool.clone()),
            OpenMode::Read,
            ImageOpenOptions {
                tolerant: true,
                ..ImageOpenOptions::default()
            },
        )
        .unwrap();
        let mut buf = vec![0u8; data.len()];
        image.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(image.diagnostics().tolerated_checksum_errors(), 1);
        let errors = image.checksum_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].start_sector, 0);
        assert_eq!(errors[0].number_of_sectors, 64);
    }

    #[test]
    fn test_split_write_is_byte_identical() {
        let data = patterned(80 * 1024);
        let split = 13 * 1024 + 5;
        let set_identifier = Uuid::from_u128(0x11223344556677889900aabbccddeeff);
        let options = || ImageCreateOptions {
            set_identifier: Some(set_identifier),
            ..small_chunk_options()
        };

        let whole = SharedPool::new();
        write_image(&whole, &data, options());

        let split_pool = SharedPool::new();
        let mut image = EwfImage::create(Box::new(split_pool.clone()), options()).unwrap();
        image.set_header_value("case_number", "2024-117").unwrap();
        image.set_header_value("examiner_name", "J. Doe").unwrap();
        image.write_buffer(&data[..split]).unwrap();
        image.write_buffer(&data[split..]).unwrap();
        image.close().unwrap();

        assert_eq!(whole.segments(), split_pool.segments());
    }

    #[test]
    fn test_idempotent_close() {
        let pool = SharedPool::new();
        let data = patterned(32 * 1024);
        let mut image =
            EwfImage::create(Box::new(pool.clone()), small_chunk_options()).unwrap();
        image.write_buffer(&data).unwrap();
        image.close().unwrap();
        image.close().unwrap();
        assert_eq!(image.state(), HandleState::Closed);

        let mut reader = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        reader.close().unwrap();
        reader.close().unwrap();
    }

    #[test]
    fn test_abort_stops_media_operations() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        write_image(&pool, &data, small_chunk_options());

        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        image.signal_abort();
        let mut buf = [0u8; 16];
        assert!(matches!(image.read_at(0, &mut buf), Err(Error::Aborted)));

        let write_pool = SharedPool::new();
        let mut writer =
            EwfImage::create(Box::new(write_pool.clone()), small_chunk_options()).unwrap();
        writer.signal_abort();
        assert!(matches!(
            writer.write_buffer(&[0u8; 512]),
            Err(Error::Aborted)
        ));
    }

    #[test]
    fn test_sealed_chunks_are_read_only() {
        let pool = SharedPool::new();
        let mut image =
            EwfImage::create(Box::new(pool.clone()), small_chunk_options()).unwrap();
        image.write_buffer(&patterned(40 * 1024)).unwrap();
        // Chunk 0 is sealed; rewriting it needs delta mode.
        assert!(matches!(
            image.write_at(100, &[0u8; 16]),
            Err(Error::ReadOnlyChunk(0))
        ));
        // The buffered tail can still be patched.
        image.write_at(33 * 1024, &[0xEE; 16]).unwrap();
        image.close().unwrap();
    }

    #[test]
    fn test_write_resume_after_crash() {
        let pool = SharedPool::new();
        let data = patterned(256 * 1024); // 8 chunks of 32 KiB
        let options = ImageCreateOptions {
            compression: CompressionPolicy::none(),
            maximum_segment_size: 96 * 1024,
            ..small_chunk_options()
        };

        // First session: four chunks, then a simulated crash (no close).
        {
            let mut image = EwfImage::create(Box::new(pool.clone()), options).unwrap();
            image.set_header_value("case_number", "2024-117").unwrap();
            image.write_buffer(&data[..128 * 1024]).unwrap();
            image.state = HandleState::Closed; // suppress close-on-drop
        }
        assert!(pool.segment_count() >= 2);

        // A plain read refuses the incomplete image: the partial tail
        // fails the section walk.
        assert!(EwfImage::open(Box::new(pool.clone()), OpenMode::Read).is_err());

        // Second session: resume and finish.
        let mut image =
            EwfImage::open(Box::new(pool.clone()), OpenMode::WriteResume).unwrap();
        let resumed_at = image.tell();
        assert!(resumed_at >= 64 * 1024, "resumed at {}", resumed_at);
        assert!(resumed_at <= 128 * 1024);
        assert_eq!(resumed_at % (32 * 1024), 0);
        image.write_buffer(&data[resumed_at as usize..]).unwrap();
        image.close().unwrap();

        let recovered = read_all(&pool);
        assert_eq!(recovered, data);

        let image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        assert_eq!(
            image.hash_value("MD5"),
            Some(hex::encode(Md5::digest(&data)))
        );
        assert_eq!(image.header_value("case_number").as_deref(), Some("2024-117"));
    }

    #[test]
    fn test_delta_write_shadows_chunks() {
        let pool = SharedPool::new();
        let data = patterned(96 * 1024);
        write_image(&pool, &data, small_chunk_options());
        let primary_segments = pool.segment_count();

        let mut image =
            EwfImage::open(Box::new(pool.clone()), OpenMode::ReadWrite).unwrap();
        // Overwrite a range straddling the chunk 0 / chunk 1 boundary.
        let patch = vec![0x5A; 1024];
        let patch_offset = 32 * 1024 - 512;
        image.write_at(patch_offset, &patch).unwrap();

        // Visible immediately through the same handle.
        let mut buf = vec![0u8; 1024];
        image.read_at(patch_offset, &mut buf).unwrap();
        assert_eq!(buf, patch);
        image.close().unwrap();

        // The delta chain was appended, not rewritten in place.
        assert!(pool.segment_count() > primary_segments);

        // And it survives a reopen.
        let mut expected = data.clone();
        expected[patch_offset as usize..patch_offset as usize + 1024].copy_from_slice(&patch);
        assert_eq!(read_all(&pool), expected);

        // Writes beyond the media are rejected.
        let mut image =
            EwfImage::open(Box::new(pool.clone()), OpenMode::ReadWrite).unwrap();
        let media_size = image.media_size();
        assert!(matches!(
            image.write_at(media_size - 10, &[0u8; 32]),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn test_write_denied_on_read_only_handle() {
        let pool = SharedPool::new();
        write_image(&pool, &patterned(32 * 1024), small_chunk_options());
        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        assert!(matches!(
            image.write_at(0, &[0u8; 16]),
            Err(Error::State(_))
        ));
        assert!(image.set_header_value("notes", "x").is_err());
    }

    #[test]
    fn test_prepared_chunk_writes() {
        let pool = SharedPool::new();
        let chunk_size = 32 * 1024;
        let first = patterned(chunk_size);
        let second = vec![0x42u8; chunk_size];

        let mut image =
            EwfImage::create(Box::new(pool.clone()), small_chunk_options()).unwrap();

        let (compressed, is_smaller) = deflate_compress(&first, 6).unwrap();
        assert!(is_smaller);
        image
            .write_chunk(&crate::media::PreparedChunk {
                data: &compressed,
                is_compressed: true,
                uncompressed_size: chunk_size,
                checksum: None,
            })
            .unwrap();

        let checksum = ewfkit_format::checksum::adler32(
            &second,
            ewfkit_format::checksum::ADLER_SEED,
        );
        image
            .write_chunk(&crate::media::PreparedChunk {
                data: &second,
                is_compressed: false,
                uncompressed_size: chunk_size,
                checksum: Some(checksum),
            })
            .unwrap();
        image.close().unwrap();

        let mut expected = first;
        expected.extend(second);
        assert_eq!(read_all(&pool), expected);
    }

    #[test]
    fn test_prepared_chunk_bad_checksum_rejected() {
        let pool = SharedPool::new();
        let chunk = patterned(32 * 1024);
        let mut image =
            EwfImage::create(Box::new(pool.clone()), small_chunk_options()).unwrap();
        let result = image.write_chunk(&crate::media::PreparedChunk {
            data: &chunk,
            is_compressed: false,
            uncompressed_size: chunk.len(),
            checksum: Some(0xDEADBEEF),
        });
        assert!(matches!(result, Err(Error::CorruptChunk(_))));
        image.state = HandleState::Closed; // nothing worth finalizing
    }

    #[test]
    fn test_seek_semantics() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        write_image(&pool, &data, small_chunk_options());

        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        assert_eq!(image.seek(std::io::SeekFrom::End(-512)).unwrap(), 64 * 1024 - 512);
        assert!(image.seek(std::io::SeekFrom::Current(-(128 * 1024))).is_err());

        // Reads clamp beyond end of media.
        image.seek(std::io::SeekFrom::End(512)).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(image.read_buffer(&mut buf).unwrap(), 0);

        // Write handles reject seeking past the written tail.
        let write_pool = SharedPool::new();
        let mut writer =
            EwfImage::create(Box::new(write_pool.clone()), small_chunk_options()).unwrap();
        writer.write_buffer(&[1u8; 1000]).unwrap();
        assert!(writer.seek(std::io::SeekFrom::Start(2000)).is_err());
        assert_eq!(writer.seek(std::io::SeekFrom::Start(500)).unwrap(), 500);
        writer.close().unwrap();
    }

    #[test]
    fn test_ex01_bzip2_roundtrip() {
        let pool = SharedPool::new();
        let data = patterned(96 * 1024);
        write_image(
            &pool,
            &data,
            ImageCreateOptions {
                dialect: Dialect::Ex01,
                compression: CompressionPolicy {
                    method: CompressionMethod::Bzip2,
                    level: 6,
                    empty_block: false,
                },
                ..small_chunk_options()
            },
        );
        let image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        assert_eq!(image.format(), Dialect::Ex01);
        drop(image);
        assert_eq!(read_all(&pool), data);
    }

    #[test]
    fn test_bzip2_requires_ex01() {
        let pool = SharedPool::new();
        let result = EwfImage::create(
            Box::new(pool),
            ImageCreateOptions {
                dialect: Dialect::Encase6,
                compression: CompressionPolicy {
                    method: CompressionMethod::Bzip2,
                    level: 6,
                    empty_block: false,
                },
                ..ImageCreateOptions::default()
            },
        );
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_smart_dialect_roundtrip() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        write_image(
            &pool,
            &data,
            ImageCreateOptions {
                dialect: Dialect::Smart,
                ..small_chunk_options()
            },
        );
        let image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        assert_eq!(image.format(), Dialect::Smart);
        drop(image);
        assert_eq!(read_all(&pool), data);
    }

    #[test]
    fn test_logical_evidence_roundtrip() {
        let pool = SharedPool::new();

        // Two files concatenated as the media payload.
        let report = b"quarterly incident report\n".to_vec();
        let log = patterned(4096);
        let mut media = report.clone();
        media.extend_from_slice(&log);

        let text = format!(
            "file\nid\tpid\tn\tty\tsz\tofs\tdsz\n1\t0\tcase\td\t0\t0\t0\n2\t1\treport.txt\tf\t{rs}\t0\t{rs}\n3\t1\tsys.log\tf\t{ls}\t{rs}\t{ls}\nfile\n",
            rs = report.len(),
            ls = log.len(),
        );
        let records = parse_records(&text, &Diagnostics::new()).unwrap();

        let mut image = EwfImage::create(
            Box::new(pool.clone()),
            ImageCreateOptions {
                dialect: Dialect::L01,
                media_type: MediaType::LogicalEvidence,
                ..small_chunk_options()
            },
        )
        .unwrap();
        image.set_logical_records(records).unwrap();
        image.write_buffer(&media).unwrap();
        image.close().unwrap();

        let mut image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        assert_eq!(image.format(), Dialect::L01);
        let root = image.root_file_entry().unwrap();
        assert_eq!(root.children.len(), 1);
        let tree_len = image.logical_records().unwrap().tree.len();
        assert_eq!(tree_len, 4);

        assert_eq!(image.read_file_entry_data(2).unwrap(), report);
        assert_eq!(image.read_file_entry_data(3).unwrap(), log);
    }

    #[test]
    fn test_metadata_and_geometry_surface() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        write_image(&pool, &data, small_chunk_options());

        let image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        assert_eq!(image.bytes_per_sector(), 512);
        assert_eq!(image.sectors_per_chunk(), 64);
        assert_eq!(image.chunk_size(), 32 * 1024);
        assert_eq!(image.number_of_sectors(), 128);
        assert_eq!(image.media_type(), MediaType::Fixed);
        assert!(image.media_flags().is_physical());
        assert_eq!(image.compression_method(), CompressionMethod::Deflate);
        assert!(!image.set_identifier().is_nil());

        let values = image.header_values();
        assert!(values
            .iter()
            .any(|(id, value)| id == "examiner_name" && value == "J. Doe"));
    }

    #[test]
    fn test_acquiry_errors_and_sessions_roundtrip() {
        let pool = SharedPool::new();
        let data = patterned(64 * 1024);
        let mut image =
            EwfImage::create(Box::new(pool.clone()), small_chunk_options()).unwrap();
        image
            .add_acquiry_error(SectorRange {
                start_sector: 100,
                number_of_sectors: 8,
            })
            .unwrap();
        image
            .add_session(SectorRange {
                start_sector: 0,
                number_of_sectors: 64,
            })
            .unwrap();
        image.write_buffer(&data).unwrap();
        image.close().unwrap();

        let image = EwfImage::open(Box::new(pool.clone()), OpenMode::Read).unwrap();
        assert_eq!(
            image.acquiry_errors(),
            vec![SectorRange {
                start_sector: 100,
                number_of_sectors: 8,
            }]
        );
        assert_eq!(image.sessions().len(), 1);
    }

    #[test]
    fn test_on_disk_image_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("evidence.E01");
        let data = patterned(200 * 1024);

        let mut image = EwfImage::create_path(
            &first,
            ImageCreateOptions {
                compression: CompressionPolicy::none(),
                maximum_segment_size: 96 * 1024,
                ..small_chunk_options()
            },
        )
        .unwrap();
        image.write_buffer(&data).unwrap();
        image.close().unwrap();

        assert!(dir.path().join("evidence.E02").is_file());

        let mut image = EwfImage::open_path(&first, OpenMode::Read).unwrap();
        let mut buf = vec![0u8; data.len()];
        let count = image.read_at(0, &mut buf).unwrap();
        assert_eq!(count, data.len());
        assert_eq!(buf, data);
    }

    #[test]
    fn test_open_empty_pool_fails() {
        let pool = SharedPool::new();
        assert!(EwfImage::open(Box::new(pool), OpenMode::Read).is_err());
    }

    #[test]
    fn test_create_on_populated_pool_fails() {
        let pool = SharedPool::new();
        write_image(&pool, &patterned(1024), ImageCreateOptions::default());
        assert!(matches!(
            EwfImage::create(Box::new(pool), ImageCreateOptions::default()),
            Err(Error::Argument(_))
        ));
    }
}
