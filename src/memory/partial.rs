//! Partial circular buffer over a caller-provided byte store
//!
//! The buffer keeps the first `wrap_position` bytes of a stream forever (the
//! prologue) and treats the rest of the data area as a ring holding the most
//! recent bytes. The backing store is any `AsRef<[u8]>` (read-only access) or
//! `AsRef<[u8]> + AsMut<[u8]>` (writable): a borrowed slice, a boxed slice, a
//! `Vec<u8>` or a memory map all work. The buffer never allocates and owns
//! nothing beyond what the store type itself owns.
//!
//! Writing and reading are separate cursors. The write cursor lives in the
//! stored header so it survives the buffer; read cursors are plain
//! [`ReadCursor`] values. Reads always return the stream in chronological
//! order: the prologue, then the wrap region from its oldest retained byte.
//! [`PartialCircularBuffer::data`] exposes the physical layout instead.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use super::cursor::ReadCursor;
use super::{data_size_of, BufferHeader, HEADER_SIZE};
use crate::error::{BufferError, Result};

/// Source of reset epochs, unique within the process
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// A non-appending attach that started a new stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reset {
    epoch: u64,
    /// Bytes of the old stream kept as the new stream's start
    kept: u32,
    prior_total_written: Option<u32>,
}

/// Fixed-capacity byte log with a preserved prologue and a wrapping tail
pub struct PartialCircularBuffer<B> {
    /// Header followed by the data area
    storage: B,
    /// Cached copy of the stored header, written through on every change
    header: BufferHeader,
    /// Length of the data area
    data_size: u32,
    /// Cursor used by [`PartialCircularBuffer::read`]
    cursor: ReadCursor,
    /// Set when this buffer discarded an earlier stream
    reset: Option<Reset>,
}

impl<B: AsRef<[u8]>> PartialCircularBuffer<B> {
    /// Attach to an existing buffer for reading only
    ///
    /// The stored header must describe a state a writer could have produced.
    pub fn open(storage: B) -> Result<Self> {
        let data_size = data_size_of(storage.as_ref().len())?;
        let header = BufferHeader::decode(storage.as_ref());
        header.validate(data_size)?;

        debug!(
            "opened buffer for reading: data_size={} total_written={} wrap_position={}",
            data_size, header.total_written, header.wrap_position
        );

        Ok(Self::assemble(storage, header, data_size, None))
    }

    fn assemble(
        storage: B,
        header: BufferHeader,
        data_size: u32,
        reset: Option<Reset>,
    ) -> Self {
        Self {
            storage,
            header,
            data_size,
            cursor: ReadCursor::start(),
            reset,
        }
    }

    /// Current header
    pub fn header(&self) -> BufferHeader {
        self.header
    }

    /// Logical length of everything ever written, including overwritten bytes
    ///
    /// After [`PartialCircularBuffer::attach`] without `append` this counts
    /// from the start of the new stream, so it begins at the number of kept
    /// prologue bytes. The earlier length is reported by
    /// [`PartialCircularBuffer::prior_total_written`] and is not stored.
    pub fn total_written(&self) -> u32 {
        self.header.total_written
    }

    /// Data offset at which the wrap region starts
    pub fn wrap_position(&self) -> u32 {
        self.header.wrap_position
    }

    /// Data offset of the next byte the writer will store
    pub fn end_position(&self) -> u32 {
        self.header.end_position
    }

    /// Size of the data area in bytes
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Size of the whole backing store, header included
    pub fn capacity(&self) -> usize {
        HEADER_SIZE + self.data_size as usize
    }

    /// Stream length recorded in the store before it was reset for writing
    pub fn prior_total_written(&self) -> Option<u32> {
        self.reset.and_then(|reset| reset.prior_total_written)
    }

    /// Whether this buffer discarded an earlier stream when it was attached
    pub fn was_reset(&self) -> bool {
        self.reset.is_some()
    }

    /// Whether the ring has overwritten any of its bytes
    pub fn has_wrapped(&self) -> bool {
        self.header.cycle(self.data_size) > 0 && self.overwritten_len() > 0
    }

    /// Number of bytes a full read from the start would return
    pub fn retained_len(&self) -> usize {
        let header = &self.header;
        let retained_end = header.retained_end(self.data_size);
        let wrapped = if retained_end > header.wrap_position {
            retained_end - header.oldest_wrapped(self.data_size)
        } else {
            0
        };
        header.prologue_end() as usize + wrapped as usize
    }

    /// Number of written bytes no longer held in the data area
    pub fn overwritten_len(&self) -> usize {
        (self.header.total_written as usize).saturating_sub(self.retained_len())
    }

    /// Data area in physical (layout) order
    pub fn data(&self) -> &[u8] {
        &self.storage.as_ref()[HEADER_SIZE..]
    }

    /// The backing store
    pub fn storage(&self) -> &B {
        &self.storage
    }

    /// Release the backing store
    pub fn into_inner(self) -> B {
        self.storage
    }

    /// Cursor used by [`PartialCircularBuffer::read`]
    pub fn cursor(&self) -> ReadCursor {
        self.cursor
    }

    /// Move the built-in cursor to a logical stream offset
    pub fn seek(&mut self, cursor: ReadCursor) {
        self.cursor = cursor;
    }

    /// Move the built-in cursor back to the start of the stream
    pub fn rewind(&mut self) {
        self.cursor = ReadCursor::start();
    }

    /// Re-read the header from the store and check it
    pub fn reload_header(&mut self) -> Result<()> {
        let header = BufferHeader::decode(self.storage.as_ref());
        header.validate(self.data_size)?;
        self.header = header;
        Ok(())
    }

    /// Read up to `out.len()` bytes with the built-in cursor
    ///
    /// Returns the number of bytes copied, which is short at the end of the
    /// retained data and zero once the reader has caught up with the writer.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut cursor = self.cursor;
        let read = self.read_with(&mut cursor, out);
        self.cursor = cursor;
        read
    }

    /// Read up to `out.len()` bytes starting at `cursor`, advancing it
    ///
    /// If the bytes under the cursor have been overwritten, reading resumes at
    /// the oldest byte still held and the gap is added to
    /// [`ReadCursor::skipped`]. A cursor from a stream this buffer discarded
    /// resumes at the end of the kept prologue.
    pub fn read_with(&self, cursor: &mut ReadCursor, out: &mut [u8]) -> usize {
        let header = self.header;
        if let Some(reset) = self.reset {
            if cursor.epoch() != Some(reset.epoch) {
                cursor.enter_epoch(reset.epoch, reset.kept);
            }
        }
        cursor.observe(header.total_written, header.prologue_end());

        let data = self.data();
        let retained_end = header.retained_end(self.data_size);
        let prologue_end = header.prologue_end();
        let mut read = 0usize;

        if cursor.position() < prologue_end {
            let start = cursor.position() as usize;
            let count = out.len().min((prologue_end - cursor.position()) as usize);
            out[..count].copy_from_slice(&data[start..start + count]);
            cursor.advance(count as u32);
            read += count;
        }

        if read == out.len() || cursor.position() >= retained_end {
            return read;
        }

        // Past the prologue with a non-empty ring behind the writer
        cursor.catch_up(header.oldest_wrapped(self.data_size));
        while read < out.len() && cursor.position() < retained_end {
            let physical = header.physical_offset(cursor.position(), self.data_size);
            let count = (out.len() - read)
                .min((retained_end - cursor.position()) as usize)
                .min((self.data_size - physical) as usize);
            let start = physical as usize;
            out[read..read + count].copy_from_slice(&data[start..start + count]);
            cursor.advance(count as u32);
            read += count;
        }

        read
    }

    /// Everything still held, in chronological order
    ///
    /// Leaves the built-in cursor untouched.
    pub fn contents(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.retained_len()];
        let read = self.read_with(&mut ReadCursor::start(), &mut out);
        out.truncate(read);
        out
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> PartialCircularBuffer<B> {
    /// Format `storage` as an empty buffer whose wrap position is the end of
    /// the data area
    ///
    /// Such a buffer fills once; bytes written after the data area is full
    /// are counted in `total_written` and dropped.
    pub fn format(storage: B) -> Result<Self> {
        let data_size = data_size_of(storage.as_ref().len())?;
        Self::format_with_wrap_position(storage, data_size)
    }

    /// Format `storage` as an empty buffer with a `wrap_position`-byte prologue
    pub fn format_with_wrap_position(storage: B, wrap_position: u32) -> Result<Self> {
        let data_size = data_size_of(storage.as_ref().len())?;
        check_wrap_position(wrap_position, data_size)?;

        let mut buffer = Self::assemble(storage, BufferHeader::new(wrap_position), data_size, None);
        buffer.store_header();

        debug!(
            "formatted buffer: data_size={} wrap_position={}",
            data_size, wrap_position
        );

        Ok(buffer)
    }

    /// Attach a writer to a store that may already hold a buffer
    ///
    /// With `append` set, the stored header must be consistent and use the
    /// same `wrap_position`; writing resumes where the previous writer
    /// stopped. Without it, writing restarts right after the prologue: the
    /// prologue bytes already written are kept when the stored layout matches,
    /// and anything else is discarded. The previous stream length stays
    /// available through [`PartialCircularBuffer::prior_total_written`].
    ///
    /// A reset starts a new logical stream, so saved cursors point into the
    /// old one. Cursors reading through the returned buffer are moved back to
    /// the end of the kept prologue; see [`ReadCursor`] for what readers of a
    /// reopened store can detect.
    pub fn attach(storage: B, wrap_position: u32, append: bool) -> Result<Self> {
        let data_size = data_size_of(storage.as_ref().len())?;
        check_wrap_position(wrap_position, data_size)?;
        let stored = BufferHeader::decode(storage.as_ref());

        if append {
            stored.validate(data_size)?;
            if stored.wrap_position != wrap_position {
                return Err(BufferError::WrapPositionMismatch {
                    stored: stored.wrap_position,
                    requested: wrap_position,
                });
            }

            debug!(
                "appending to buffer: total_written={} end_position={}",
                stored.total_written, stored.end_position
            );

            return Ok(Self::assemble(storage, stored, data_size, None));
        }

        let (header, prior) = if !stored.is_consistent(data_size) {
            warn!(
                "discarding inconsistent header: total_written={} wrap_position={} end_position={}",
                stored.total_written, stored.wrap_position, stored.end_position
            );
            (BufferHeader::new(wrap_position), None)
        } else if stored.wrap_position == wrap_position {
            let kept = stored.prologue_end();
            let header = BufferHeader {
                total_written: kept,
                wrap_position,
                end_position: kept,
            };
            (header, Some(stored.total_written))
        } else {
            (BufferHeader::new(wrap_position), Some(stored.total_written))
        };

        let reset = Reset {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            kept: header.total_written,
            prior_total_written: prior,
        };
        let mut buffer = Self::assemble(storage, header, data_size, Some(reset));
        buffer.store_header();

        debug!(
            "reset buffer for writing: kept {} prologue bytes of {:?}",
            header.total_written, prior
        );

        Ok(buffer)
    }

    /// Append `input` to the stream
    ///
    /// Never fails. Once the ring is full the oldest wrap-region bytes are
    /// overwritten. A write longer than the whole ring keeps only its last
    /// lap, leaving the store exactly as byte-by-byte writing would.
    pub fn write(&mut self, input: &[u8]) {
        let data_size = self.data_size;
        let mut header = self.header;
        let wrap = header.wrap_position;
        let cycle = header.cycle(data_size);
        let data = &mut self.storage.as_mut()[HEADER_SIZE..];
        let mut remaining = input;

        if header.end_position < wrap {
            let start = header.end_position as usize;
            let count = remaining.len().min((wrap - header.end_position) as usize);
            data[start..start + count].copy_from_slice(&remaining[..count]);
            header.end_position += count as u32;
            remaining = &remaining[count..];
        }

        // With no ring the rest is dropped
        if cycle > 0 && !remaining.is_empty() {
            if remaining.len() > cycle as usize {
                let skip = remaining.len() - cycle as usize;
                let lap = u64::from(header.end_position - wrap) + (skip % cycle as usize) as u64;
                header.end_position = wrap + (lap % u64::from(cycle)) as u32;
                remaining = &remaining[skip..];
            }

            while !remaining.is_empty() {
                let start = header.end_position as usize;
                let count = remaining.len().min(data_size as usize - start);
                data[start..start + count].copy_from_slice(&remaining[..count]);
                header.end_position += count as u32;
                if header.end_position == data_size {
                    header.end_position = wrap;
                }
                remaining = &remaining[count..];
            }
        }

        // 32-bit overflow of the stream length is not tracked
        header.total_written = header.total_written.wrapping_add(input.len() as u32);
        self.header = header;
        self.store_header();
    }

    fn store_header(&mut self) {
        let header = self.header;
        header.encode(self.storage.as_mut());
    }
}

fn check_wrap_position(wrap_position: u32, data_size: u32) -> Result<()> {
    if wrap_position > data_size {
        return Err(BufferError::InvalidWrapPosition {
            wrap_position,
            data_size,
        });
    }
    Ok(())
}

impl<B> fmt::Debug for PartialCircularBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialCircularBuffer")
            .field("header", &self.header)
            .field("data_size", &self.data_size)
            .field("cursor", &self.cursor)
            .field("reset", &self.reset)
            .finish()
    }
}

impl<B: AsRef<[u8]>> io::Read for PartialCircularBuffer<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(PartialCircularBuffer::read(self, buf))
    }
}

/// Writes land in the store immediately, so `flush` has nothing to do.
/// It does not sync a memory-mapped store to disk; use
/// [`MappedBuffer`](crate::MappedBuffer) for that.
impl<B: AsRef<[u8]> + AsMut<[u8]>> io::Write for PartialCircularBuffer<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PartialCircularBuffer::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(data_size: usize) -> Vec<u8> {
        vec![0u8; HEADER_SIZE + data_size]
    }

    #[test]
    fn test_format_fills_once() {
        let mut buffer = PartialCircularBuffer::format(store(8)).unwrap();
        assert_eq!(buffer.wrap_position(), 8);

        buffer.write(b"0123456789");
        assert_eq!(buffer.total_written(), 10);
        assert_eq!(buffer.end_position(), 8);
        assert_eq!(buffer.contents(), b"01234567");
        assert_eq!(buffer.overwritten_len(), 2);
        assert!(!buffer.has_wrapped());
    }

    #[test]
    fn test_header_written_through() {
        let mut buffer = PartialCircularBuffer::format_with_wrap_position(store(20), 4).unwrap();
        buffer.write(b"AAAABB");

        let stored = BufferHeader::decode(buffer.storage());
        assert_eq!(stored, buffer.header());
        assert_eq!(stored.total_written, 6);
        assert_eq!(stored.end_position, 6);
    }

    #[test]
    fn test_wrap_split_write() {
        let mut buffer = PartialCircularBuffer::format_with_wrap_position(store(10), 2).unwrap();
        buffer.write(b"PP");
        buffer.write(b"abcdef");
        // Crosses the end of the data area and continues at the wrap position
        buffer.write(b"ghij");

        assert_eq!(buffer.data(), b"PPijcdefgh");
        assert_eq!(buffer.end_position(), 4);
        assert_eq!(buffer.contents(), b"PPcdefghij");
    }

    #[test]
    fn test_pure_ring() {
        let mut buffer = PartialCircularBuffer::format_with_wrap_position(store(4), 0).unwrap();
        buffer.write(b"abcdef");

        assert_eq!(buffer.contents(), b"cdef");
        assert!(buffer.has_wrapped());
        assert_eq!(buffer.retained_len(), 4);
    }

    #[test]
    fn test_short_reads() {
        let mut buffer = PartialCircularBuffer::format_with_wrap_position(store(16), 4).unwrap();
        buffer.write(b"hello world");

        let mut out = [0u8; 4];
        assert_eq!(buffer.read(&mut out), 4);
        assert_eq!(&out, b"hell");
        assert_eq!(buffer.read(&mut out), 4);
        assert_eq!(&out, b"o wo");
        assert_eq!(buffer.read(&mut out), 3);
        assert_eq!(&out[..3], b"rld");
        assert_eq!(buffer.read(&mut out), 0);

        buffer.rewind();
        assert_eq!(buffer.read(&mut out), 4);
    }

    #[test]
    fn test_io_traits() {
        use std::io::{Read, Write};

        let mut buffer = PartialCircularBuffer::format_with_wrap_position(store(32), 8).unwrap();
        writeln!(buffer, "session {}", 7).unwrap();

        let mut text = String::new();
        buffer.read_to_string(&mut text).unwrap();
        assert_eq!(text, "session 7\n");
    }

    #[test]
    fn test_reload_header_revalidates() {
        let mut buffer = PartialCircularBuffer::format_with_wrap_position(store(8), 2).unwrap();
        buffer.write(b"abc");
        let header = buffer.header();

        let mut reader = PartialCircularBuffer::open(buffer.into_inner()).unwrap();
        reader.reload_header().unwrap();
        assert_eq!(reader.header(), header);
        assert_eq!(reader.contents(), b"abc");
    }

    #[test]
    fn test_has_wrapped_only_after_overwrite() {
        let mut buffer = PartialCircularBuffer::format_with_wrap_position(store(8), 2).unwrap();
        buffer.write(b"PPabcdef");
        assert_eq!(buffer.end_position(), 2);
        assert_eq!(buffer.overwritten_len(), 0);
        assert!(!buffer.has_wrapped());

        buffer.write(b"g");
        assert_eq!(buffer.overwritten_len(), 1);
        assert!(buffer.has_wrapped());
    }

    #[test]
    fn test_each_reset_restarts_cursors() {
        let memory = PartialCircularBuffer::format_with_wrap_position(store(16), 2)
            .unwrap()
            .into_inner();
        let mut first = PartialCircularBuffer::attach(memory, 2, false).unwrap();
        first.write(b"PPabc");

        let mut cursor = ReadCursor::start();
        let mut out = [0u8; 16];
        assert_eq!(first.read_with(&mut cursor, &mut out), 5);

        // The second stream outgrows the first before the cursor reads again
        let mut second = PartialCircularBuffer::attach(first.into_inner(), 2, false).unwrap();
        assert!(second.was_reset());
        second.write(b"0123456");

        let read = second.read_with(&mut cursor, &mut out);
        assert_eq!(&out[..read], b"0123456");
        assert_eq!(cursor.restarts(), 1);
        assert_eq!(cursor.skipped(), 0);
    }

    #[test]
    fn test_zero_data_area() {
        let mut buffer = PartialCircularBuffer::format(store(0)).unwrap();
        buffer.write(b"lost");
        assert_eq!(buffer.total_written(), 4);
        assert!(buffer.contents().is_empty());
    }
}
