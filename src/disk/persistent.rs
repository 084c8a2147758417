//! Partial circular buffer backed by a memory-mapped file
//!
//! The writer side maps the file read-write and keeps the header in the
//! file current after every write, so a crash at any point leaves a file
//! that [`MappedBuffer::open_read_only`] (or any external reader of the
//! layout) can decode. Reopening with `append` continues the same stream
//! in a later session.

use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use crate::disk::{existing_size, map_file, map_file_read_only};
use crate::error::Result;
use crate::memory::cursor::ReadCursor;
use crate::memory::partial::PartialCircularBuffer;

/// Partial circular buffer stored in a file
#[derive(Debug)]
pub struct MappedBuffer {
    /// Path to the buffer file
    path: PathBuf,
    /// Buffer over the mapped file
    buffer: PartialCircularBuffer<MmapMut>,
}

impl MappedBuffer {
    /// Create (or overwrite) a buffer file of `size` bytes, header included
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the buffer file
    /// * `size` - Total file size in bytes
    /// * `wrap_position` - Length of the prologue in bytes
    pub fn create<P: AsRef<Path>>(path: P, size: usize, wrap_position: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mmap = map_file(&path, size, true)?;
        let buffer = PartialCircularBuffer::format_with_wrap_position(mmap, wrap_position)?;

        Ok(Self { path, buffer })
    }

    /// Open an existing buffer file for writing
    ///
    /// The file keeps its size. `append` has the same meaning as in
    /// [`PartialCircularBuffer::attach`].
    pub fn open<P: AsRef<Path>>(path: P, wrap_position: u32, append: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let size = existing_size(&path)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("buffer file {} does not exist", path.display()),
            )
        })?;
        let mmap = map_file(&path, size, false)?;
        let buffer = PartialCircularBuffer::attach(mmap, wrap_position, append)?;

        Ok(Self { path, buffer })
    }

    /// Open an existing buffer file for reading only
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<PartialCircularBuffer<Mmap>> {
        PartialCircularBuffer::open(map_file_read_only(path)?)
    }

    /// Path to the buffer file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes, header included
    pub fn size(&self) -> usize {
        self.buffer.capacity()
    }

    /// The underlying buffer
    pub fn buffer(&self) -> &PartialCircularBuffer<MmapMut> {
        &self.buffer
    }

    /// The underlying buffer, mutably
    pub fn buffer_mut(&mut self) -> &mut PartialCircularBuffer<MmapMut> {
        &mut self.buffer
    }

    /// Append bytes to the stream
    pub fn write(&mut self, input: &[u8]) {
        self.buffer.write(input);
    }

    /// Read with the built-in cursor, see [`PartialCircularBuffer::read`]
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.buffer.read(out)
    }

    /// Read with an external cursor
    pub fn read_with(&self, cursor: &mut ReadCursor, out: &mut [u8]) -> usize {
        self.buffer.read_with(cursor, out)
    }

    /// Everything still held, in chronological order
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.contents()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.buffer.storage().flush()?;
        Ok(())
    }

    /// Release the mapped buffer
    pub fn into_buffer(self) -> PartialCircularBuffer<MmapMut> {
        self.buffer
    }
}

impl io::Write for MappedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        MappedBuffer::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer.storage().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HEADER_SIZE;
    use tempfile::tempdir;

    #[test]
    fn test_create_new_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_buffer.dat");

        let buffer = MappedBuffer::create(&path, 1024, 128).unwrap();
        assert_eq!(buffer.size(), 1024);
        assert_eq!(buffer.path(), path);

        let header = buffer.buffer().header();
        assert_eq!(header.total_written, 0);
        assert_eq!(header.wrap_position, 128);
        assert_eq!(header.end_position, 0);
        assert_eq!(buffer.buffer().data_size() as usize, 1024 - HEADER_SIZE);
    }

    #[test]
    fn test_buffer_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_buffer.dat");

        {
            let mut buffer = MappedBuffer::create(&path, 64, 8).unwrap();
            buffer.write(b"persistence test");
            buffer.flush().unwrap();
        }

        {
            let mut buffer = MappedBuffer::open(&path, 8, true).unwrap();
            assert_eq!(buffer.size(), 64);
            assert_eq!(buffer.buffer().total_written(), 16);

            buffer.write(b" continued");
            assert_eq!(buffer.contents(), b"persistence test continued");
        }
    }

    #[test]
    fn test_file_holds_raw_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.dat");

        let mut buffer = MappedBuffer::create(&path, HEADER_SIZE + 8, 2).unwrap();
        buffer.write(b"abcd");
        buffer.flush().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], &4u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &4u32.to_le_bytes());
        assert_eq!(&bytes[12..16], b"abcd");
    }

    #[test]
    fn test_io_write_flushes_to_file() {
        use std::io::Write;

        let dir = tempdir().unwrap();
        let path = dir.path().join("io.dat");

        let mut buffer = MappedBuffer::create(&path, HEADER_SIZE + 32, 4).unwrap();
        writeln!(buffer, "boot {}", 42).unwrap();
        Write::flush(&mut buffer).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], &8u32.to_le_bytes());
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 8], b"boot 42\n");
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.dat");

        assert!(MappedBuffer::open(&path, 0, true).is_err());
        assert!(!path.exists());
    }
}
