//! Media engine: buffered random-access read and write
//!
//! The read path resolves chunks through the chunk table, fetches stored
//! bytes from the pool, decodes and verifies them, and serves copies
//! through the chunk cache. The write path accumulates stream bytes into
//! a chunk-sized assembly buffer and hands full chunks to the write
//! planner; in delta mode, writes shadow existing chunks through the
//! delta chain instead.

use crate::handle::{EwfImage, HandleState};
use crate::writer::WriteContext;
use ewfkit_core::{Error, Result, SectorRange};
use ewfkit_format::codec::{decode_chunk, StoredChunk};
use std::sync::atomic::Ordering;

/// A chunk prepared outside the engine, e.g. by a worker-thread
/// compressor
///
/// `data` is the stored form without the uncompressed-chunk checksum
/// trailer; for uncompressed chunks the engine appends `checksum` (or
/// computes one when absent). Compressed chunks embed their checksum per
/// the codec.
#[derive(Debug, Clone, Copy)]
pub struct PreparedChunk<'a> {
    /// Stored chunk bytes
    pub data: &'a [u8],
    /// Whether `data` is compressed
    pub is_compressed: bool,
    /// Uncompressed length the chunk must expand to
    pub uncompressed_size: usize,
    /// Caller-supplied Adler-32 of the uncompressed bytes
    pub checksum: Option<u32>,
}

impl EwfImage {
    /// Read from the current position, advancing it
    pub fn read_buffer(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = self.read_at(self.position, buf)?;
        self.position += count as u64;
        Ok(count)
    }

    /// Read at an absolute media offset without moving the position
    ///
    /// Returns short counts only at end of media.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if !matches!(self.state, HandleState::ReadOnly | HandleState::ReadWrite) {
            return Err(Error::state("handle is not open for reading"));
        }
        let media_size = self.media_size();
        if offset >= media_size || buf.is_empty() {
            return Ok(0);
        }
        let count = buf.len().min((media_size - offset) as usize);
        let chunk_size = self.geometry.chunk_size() as u64;

        let mut copied = 0usize;
        while copied < count {
            if self.abort.load(Ordering::Relaxed) {
                return Err(Error::Aborted);
            }
            let position = offset + copied as u64;
            let chunk_index = position / chunk_size;
            let chunk_offset = (position % chunk_size) as usize;

            let data = self.chunk_data(chunk_index)?;
            let take = (count - copied).min(data.len() - chunk_offset);
            buf[copied..copied + take]
                .copy_from_slice(&data[chunk_offset..chunk_offset + take]);
            copied += take;
        }
        Ok(count)
    }

    /// Write at the current position, advancing it
    pub fn write_buffer(&mut self, buf: &[u8]) -> Result<usize> {
        let count = self.write_at(self.position, buf)?;
        self.position += count as u64;
        Ok(count)
    }

    /// Write at an absolute media offset without moving the position
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        match self.state {
            HandleState::Writing | HandleState::WriteResuming => self.write_stream(offset, buf),
            HandleState::ReadWrite => self.write_delta(offset, buf),
            _ => Err(Error::state("handle is not open for writing")),
        }
    }

    /// Append a chunk prepared by the caller, bypassing the codec
    pub fn write_chunk(&mut self, chunk: &PreparedChunk<'_>) -> Result<()> {
        if !matches!(
            self.state,
            HandleState::Writing | HandleState::WriteResuming
        ) {
            return Err(Error::state("handle is not open for chunked writes"));
        }
        if self.abort.load(Ordering::Relaxed) {
            return Err(Error::Aborted);
        }
        if !self.assembly.is_empty() {
            return Err(Error::state(
                "buffered stream bytes pending; prepared chunks cannot interleave",
            ));
        }
        let chunk_size = self.geometry.chunk_size() as usize;
        if chunk.uncompressed_size != chunk_size {
            let sealed = self.sealed_bytes();
            let is_final_short_chunk = self
                .preset_media_size
                .map(|preset| sealed + chunk.uncompressed_size as u64 == preset)
                .unwrap_or(false);
            if !is_final_short_chunk {
                return Err(Error::argument(format!(
                    "prepared chunk of {} bytes does not match the chunk size {}",
                    chunk.uncompressed_size, chunk_size
                )));
            }
        }

        let stored = if chunk.is_compressed {
            chunk.data.to_vec()
        } else {
            let checksum = chunk.checksum.unwrap_or_else(|| {
                ewfkit_format::checksum::adler32(chunk.data, ewfkit_format::checksum::ADLER_SEED)
            });
            let mut stored = Vec::with_capacity(chunk.data.len() + 4);
            stored.extend_from_slice(chunk.data);
            stored.extend_from_slice(&checksum.to_le_bytes());
            stored
        };
        // Full decode doubles as validation of the caller's checksum.
        let payload = decode_chunk(
            &stored,
            chunk.is_compressed,
            chunk.uncompressed_size,
            self.policy.method,
        )?;

        let metadata = self.metadata.read().expect("metadata lock");
        let mut ctx = WriteContext {
            pool: &mut *self.pool,
            metadata: &metadata,
            geometry: &self.geometry,
        };
        self.planner
            .as_mut()
            .expect("write planner is present in write states")
            .append_stored(
                &mut ctx,
                StoredChunk {
                    data: stored,
                    is_compressed: chunk.is_compressed,
                },
                &payload,
            )?;
        drop(metadata);
        self.media_written += chunk.uncompressed_size as u64;
        self.position = self.media_written;
        Ok(())
    }

    /// Media bytes sealed into finished chunks
    pub(crate) fn sealed_bytes(&self) -> u64 {
        let chunks = self
            .planner
            .as_ref()
            .map(|planner| planner.chunks_written())
            .unwrap_or(0);
        let chunk_size = self.geometry.chunk_size() as u64;
        match self.preset_media_size {
            Some(preset) => (chunks * chunk_size).min(preset),
            None => chunks * chunk_size,
        }
    }

    fn write_stream(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        if self.abort.load(Ordering::Relaxed) {
            return Err(Error::Aborted);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(preset) = self.preset_media_size {
            if offset + buf.len() as u64 > preset {
                return Err(Error::argument(format!(
                    "write of {} bytes at {} exceeds the declared media size {}",
                    buf.len(),
                    offset,
                    preset
                )));
            }
        }
        let sealed = self.sealed_bytes();
        if offset < sealed {
            let chunk_index = offset / self.geometry.chunk_size() as u64;
            return Err(Error::ReadOnlyChunk(chunk_index));
        }
        let tail = sealed + self.assembly.len() as u64;
        if offset > tail {
            return Err(Error::argument(format!(
                "write at {} would leave a gap after {}",
                offset, tail
            )));
        }

        let start = (offset - sealed) as usize;
        let end = start + buf.len();
        if self.assembly.len() < end {
            self.assembly.resize(end, 0);
        }
        self.assembly[start..end].copy_from_slice(buf);
        self.media_written = self.media_written.max(offset + buf.len() as u64);
        self.flush_full_chunks()?;
        Ok(buf.len())
    }

    /// Seal every complete chunk in the assembly buffer
    fn flush_full_chunks(&mut self) -> Result<()> {
        let chunk_size = self.geometry.chunk_size() as usize;
        while self.assembly.len() >= chunk_size {
            if self.abort.load(Ordering::Relaxed) {
                return Err(Error::Aborted);
            }
            let payload: Vec<u8> = self.assembly.drain(..chunk_size).collect();
            self.append_payload_chunk(&payload)?;
        }
        Ok(())
    }

    /// Seal the trailing partial chunk; only valid while closing
    pub(crate) fn flush_assembly(&mut self) -> Result<()> {
        if self.assembly.is_empty() {
            return Ok(());
        }
        let payload = std::mem::take(&mut self.assembly);
        self.append_payload_chunk(&payload)
    }

    fn append_payload_chunk(&mut self, payload: &[u8]) -> Result<()> {
        let metadata = self.metadata.read().expect("metadata lock");
        let mut ctx = WriteContext {
            pool: &mut *self.pool,
            metadata: &metadata,
            geometry: &self.geometry,
        };
        self.planner
            .as_mut()
            .expect("write planner is present in write states")
            .append_chunk(&mut ctx, payload)
    }

    fn write_delta(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let media_size = self.media_size();
        if offset + buf.len() as u64 > media_size {
            return Err(Error::argument(format!(
                "write of {} bytes at {} exceeds the media size {}",
                buf.len(),
                offset,
                media_size
            )));
        }
        let chunk_size = self.geometry.chunk_size() as u64;
        let mut written = 0usize;
        while written < buf.len() {
            if self.abort.load(Ordering::Relaxed) {
                return Err(Error::Aborted);
            }
            let position = offset + written as u64;
            let chunk_index = position / chunk_size;
            let chunk_offset = (position % chunk_size) as usize;

            let mut data = self.chunk_data(chunk_index)?;
            let take = (buf.len() - written).min(data.len() - chunk_offset);
            data[chunk_offset..chunk_offset + take]
                .copy_from_slice(&buf[written..written + take]);

            let flushed = self
                .cache
                .write()
                .expect("cache lock")
                .insert_dirty(chunk_index, data);
            if let Some((victim, bytes)) = flushed {
                self.flush_delta_chunk(victim, &bytes)?;
            }
            written += take;
        }
        Ok(buf.len())
    }

    /// Emit one shadowed chunk to the delta chain
    pub(crate) fn flush_delta_chunk(&mut self, chunk_index: u64, data: &[u8]) -> Result<()> {
        let delta = self
            .delta
            .as_mut()
            .expect("delta writer is present in read-write mode");
        let location = delta.write_chunk(&mut *self.pool, chunk_index, data)?;
        self.table.overlay_delta(chunk_index, location)?;
        Ok(())
    }

    /// Re-feed already-written chunks into the planner hashes
    /// (write-resume)
    pub(crate) fn rehash_existing(&mut self, chunks: u64) -> Result<()> {
        for chunk_index in 0..chunks {
            let data = self.chunk_data(chunk_index)?;
            self.planner
                .as_mut()
                .expect("write planner is present when resuming")
                .rehash(&data);
        }
        Ok(())
    }

    /// Decoded bytes of a chunk, via the cache
    fn chunk_data(&mut self, chunk_index: u64) -> Result<Vec<u8>> {
        if let Some(data) = self
            .cache
            .write()
            .expect("cache lock")
            .get(chunk_index)
        {
            return Ok(data.to_vec());
        }
        let data = self.fetch_chunk(chunk_index)?;
        let flushed = self
            .cache
            .write()
            .expect("cache lock")
            .insert(chunk_index, data.clone());
        if let Some((victim, bytes)) = flushed {
            self.flush_delta_chunk(victim, &bytes)?;
        }
        Ok(data)
    }

    /// Resolve, fetch, decode and verify one chunk
    fn fetch_chunk(&mut self, chunk_index: u64) -> Result<Vec<u8>> {
        let location = self.table.lookup(chunk_index)?;
        let expected = self.geometry.chunk_payload_size(chunk_index) as usize;

        let mut stored = vec![0u8; location.stored_size as usize];
        self.pool
            .read_at(location.segment as usize, location.offset, &mut stored)?;

        let decoded = decode_chunk(
            &stored,
            location.is_compressed,
            expected,
            self.read_method,
        );
        match decoded {
            Ok(data) => Ok(data),
            Err(Error::CorruptChunk(reason)) if self.tolerant => {
                self.diagnostics.count_tolerated_checksum_error(chunk_index);
                tracing::warn!(chunk_index, %reason, "tolerating corrupt chunk");
                let sectors_per_chunk = self.geometry.sectors_per_chunk as u64;
                self.metadata
                    .write()
                    .expect("metadata lock")
                    .record_checksum_error(SectorRange {
                        start_sector: chunk_index * sectors_per_chunk,
                        number_of_sectors: (expected as u64)
                            .div_ceil(self.geometry.bytes_per_sector as u64),
                    });
                if !location.is_compressed && stored.len() >= expected {
                    Ok(stored[..expected].to_vec())
                } else {
                    Ok(vec![0u8; expected])
                }
            }
            Err(error) => Err(error),
        }
    }
}
