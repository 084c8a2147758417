//! File-backed partial circular buffers
//!
//! A buffer file holds exactly the same bytes as an in-memory store: the
//! 12-byte header followed by the data area. Nothing else is added, so a
//! post-processor that understands the in-memory layout can read the file
//! directly.
//!
//! The file is memory-mapped, and every write lands in the page cache
//! immediately. [`persistent::MappedBuffer::flush`] forces it to disk.

pub mod persistent;

use std::fs::{File, OpenOptions};
use std::path::Path;

use log::debug;
use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::error::{BufferError, Result};
use crate::memory::HEADER_SIZE;

/// Map `path` for writing, creating or resizing it to `size` bytes
///
/// With `truncate` set, any existing content is zeroed first.
pub fn map_file<P: AsRef<Path>>(path: P, size: usize, truncate: bool) -> Result<MmapMut> {
    if size < HEADER_SIZE {
        return Err(BufferError::BufferTooSmall { size });
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(path.as_ref())?;

    if file.metadata()?.len() != size as u64 {
        file.set_len(size as u64)?;
    }

    debug!("mapped {:?} ({} bytes) for writing", path.as_ref(), size);

    // SAFETY: the file stays open for the lifetime of the map and callers
    // must not truncate it from elsewhere while it is mapped.
    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Map an existing buffer file for reading
pub fn map_file_read_only<P: AsRef<Path>>(path: P) -> Result<Mmap> {
    let file = File::open(path.as_ref())?;
    let size = file.metadata()?.len() as usize;
    if size < HEADER_SIZE {
        return Err(BufferError::BufferTooSmall { size });
    }

    debug!("mapped {:?} ({} bytes) for reading", path.as_ref(), size);

    // SAFETY: as for `map_file`; the map is never written through.
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    Ok(mmap)
}

/// Size of an existing file, if there is one
pub(crate) fn existing_size<P: AsRef<Path>>(path: P) -> Result<Option<usize>> {
    match std::fs::metadata(path.as_ref()) {
        Ok(metadata) => Ok(Some(metadata.len() as usize)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
