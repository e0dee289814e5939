//! On-disk segment pool

use crate::naming::{segment_extension, NamingScheme, MAX_SEGMENT_NUMBER};
use ewfkit_core::{Error, Result, SegmentPool};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Segment pool backed by files on disk
///
/// Segments are named `<base>.<extension>` with the extension rolling per
/// the chain's naming scheme. Files are opened lazily and kept open until
/// [`SegmentPool::close`] is called for their index; callers that need to
/// stay below descriptor limits close segments they are done with.
pub struct FileSegmentPool {
    base_path: PathBuf,
    scheme: NamingScheme,
    writable: bool,
    segments: Vec<SegmentSlot>,
}

struct SegmentSlot {
    path: PathBuf,
    file: Option<File>,
}

impl FileSegmentPool {
    /// Open an existing segment chain starting from its first segment file
    ///
    /// `first_segment` must name the `.E01`/`.L01`/`.s01`/`.e01` file; the
    /// rest of the chain is discovered by probing successive extensions.
    pub fn open(first_segment: &Path) -> Result<Self> {
        let (base_path, scheme) = split_chain_name(first_segment)?;
        let mut pool = Self {
            base_path,
            scheme,
            writable: false,
            segments: Vec::new(),
        };
        loop {
            let number = pool.segments.len() as u16 + 1;
            if number > MAX_SEGMENT_NUMBER {
                break;
            }
            let path = pool.segment_path(number)?;
            if !path.is_file() {
                break;
            }
            pool.segments.push(SegmentSlot { path, file: None });
        }
        if pool.segments.is_empty() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such segment file: {}", first_segment.display()),
            )));
        }
        tracing::debug!(
            segments = pool.segments.len(),
            "opened segment chain {}",
            first_segment.display()
        );
        Ok(pool)
    }

    /// Open an existing chain for writing (write-resume and delta modes)
    pub fn open_writable(first_segment: &Path) -> Result<Self> {
        let mut pool = Self::open(first_segment)?;
        pool.writable = true;
        Ok(pool)
    }

    /// Create a new, empty segment chain
    ///
    /// `first_segment` names the `.E01`-style file the first
    /// [`SegmentPool::add_segment`] call will create. Fails if the file
    /// already exists.
    pub fn create(first_segment: &Path) -> Result<Self> {
        let (base_path, scheme) = split_chain_name(first_segment)?;
        if first_segment.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("segment file exists: {}", first_segment.display()),
            )));
        }
        Ok(Self {
            base_path,
            scheme,
            writable: true,
            segments: Vec::new(),
        })
    }

    fn segment_path(&self, segment_number: u16) -> Result<PathBuf> {
        let extension = segment_extension(segment_number, self.scheme)?;
        let mut path = self.base_path.clone();
        path.set_extension(extension);
        Ok(path)
    }

    fn file(&mut self, index: usize) -> Result<&mut File> {
        let writable = self.writable;
        let slot = self
            .segments
            .get_mut(index)
            .ok_or_else(|| Error::argument(format!("segment index {} out of range", index)))?;
        if slot.file.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(writable)
                .open(&slot.path)?;
            slot.file = Some(file);
        }
        Ok(slot.file.as_mut().expect("slot was just populated"))
    }
}

impl SegmentPool for FileSegmentPool {
    fn count(&self) -> usize {
        self.segments.len()
    }

    fn add_segment(&mut self) -> Result<usize> {
        if !self.writable {
            return Err(Error::state("segment pool is read-only"));
        }
        let number = self.segments.len() as u16 + 1;
        let path = self.segment_path(number)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        tracing::debug!("created segment file {}", path.display());
        self.segments.push(SegmentSlot {
            path,
            file: Some(file),
        });
        Ok(self.segments.len() - 1)
    }

    fn size(&mut self, index: usize) -> Result<u64> {
        let file = self.file(index)?;
        Ok(file.metadata()?.len())
    }

    fn read_at(&mut self, index: usize, offset: u64, buf: &mut [u8]) -> Result<()> {
        let file = self.file(index)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, index: usize, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Error::state("segment pool is read-only"));
        }
        let file = self.file(index)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn truncate(&mut self, index: usize, len: u64) -> Result<()> {
        if !self.writable {
            return Err(Error::state("segment pool is read-only"));
        }
        let file = self.file(index)?;
        file.set_len(len)?;
        Ok(())
    }

    fn close(&mut self, index: usize) -> Result<()> {
        if let Some(slot) = self.segments.get_mut(index) {
            slot.file = None;
        }
        Ok(())
    }
}

/// Split `<dir>/<base>.<first-extension>` into the chain base path and its
/// naming scheme.
fn split_chain_name(first_segment: &Path) -> Result<(PathBuf, NamingScheme)> {
    let extension = first_segment
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| Error::argument("segment file name has no extension"))?;
    let scheme = NamingScheme::from_extension(extension).ok_or_else(|| {
        Error::unsupported(format!("unrecognized segment extension: .{}", extension))
    })?;
    Ok((first_segment.to_path_buf(), scheme))
}
