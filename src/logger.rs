//! `log` sink writing into a partial circular buffer
//!
//! Each enabled record becomes one text line:
//!
//! ```text
//! <timestamp_us> <LEVEL> [<target>] <message>
//! ```
//!
//! The first `wrap_position` bytes of the session are kept for good and the
//! rest of the buffer holds the most recent lines. Writers on any thread
//! serialize on a single lock; nothing in this module logs, so the sink never
//! re-enters itself.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};
use memmap2::MmapMut;
use parking_lot::Mutex;

use crate::disk::{existing_size, map_file};
use crate::error::Result;
use crate::memory::cursor::ReadCursor;
use crate::memory::partial::PartialCircularBuffer;
use crate::memory::{data_size_of, BufferHeader};
use crate::LogBufferConfig;

/// Backing store of a [`LogBuffer`]
pub enum Backing {
    /// Heap memory owned by the sink
    Memory(Box<[u8]>),
    /// A memory-mapped buffer file
    Mapped(MmapMut),
}

impl AsRef<[u8]> for Backing {
    fn as_ref(&self) -> &[u8] {
        match self {
            Backing::Memory(bytes) => bytes,
            Backing::Mapped(mmap) => mmap,
        }
    }
}

impl AsMut<[u8]> for Backing {
    fn as_mut(&mut self) -> &mut [u8] {
        match self {
            Backing::Memory(bytes) => bytes,
            Backing::Mapped(mmap) => mmap,
        }
    }
}

/// Thread-safe text log over a partial circular buffer
pub struct LogBuffer {
    /// Buffer receiving formatted records
    buffer: Mutex<PartialCircularBuffer<Backing>>,
    /// Most verbose level accepted
    level: LevelFilter,
}

impl LogBuffer {
    /// Build a log buffer from a configuration
    ///
    /// With a `path`, an existing file is continued when `config.append` is
    /// set and replaced otherwise. An appended file keeps its own size.
    pub fn new(config: &LogBufferConfig) -> Result<Self> {
        let buffer = match &config.path {
            None => {
                let storage = Backing::Memory(vec![0u8; config.size].into_boxed_slice());
                let wrap_position = config.wrap_position_for(data_size_of(config.size)?);
                PartialCircularBuffer::format_with_wrap_position(storage, wrap_position)?
            }
            Some(path) => match existing_size(path)? {
                Some(size) if config.append => {
                    let wrap_position = config.wrap_position_for(data_size_of(size)?);
                    let storage = Backing::Mapped(map_file(path, size, false)?);
                    PartialCircularBuffer::attach(storage, wrap_position, true)?
                }
                _ => {
                    let wrap_position = config.wrap_position_for(data_size_of(config.size)?);
                    let storage = Backing::Mapped(map_file(path, config.size, true)?);
                    PartialCircularBuffer::format_with_wrap_position(storage, wrap_position)?
                }
            },
        };

        Ok(Self {
            buffer: Mutex::new(buffer),
            level: config.level,
        })
    }

    /// Most verbose level this sink records
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Append raw bytes
    pub fn write(&self, bytes: &[u8]) {
        self.buffer.lock().write(bytes);
    }

    /// Everything still held, in chronological order
    pub fn snapshot(&self) -> Vec<u8> {
        self.buffer.lock().contents()
    }

    /// Read from `cursor` onward, advancing it
    ///
    /// Lets a consumer tail the log without disturbing other readers.
    pub fn read_with(&self, cursor: &mut ReadCursor, out: &mut [u8]) -> usize {
        self.buffer.lock().read_with(cursor, out)
    }

    /// Logical length of everything ever logged
    pub fn total_written(&self) -> u32 {
        self.buffer.lock().total_written()
    }

    /// Current header of the underlying buffer
    pub fn header(&self) -> BufferHeader {
        self.buffer.lock().header()
    }

    /// Flush a file-backed buffer to disk; no-op in memory
    pub fn flush(&self) -> Result<()> {
        let buffer = self.buffer.lock();
        if let Backing::Mapped(mmap) = buffer.storage() {
            mmap.flush()?;
        }
        Ok(())
    }
}

impl Log for LogBuffer {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format!(
            "{} {:<5} [{}] {}\n",
            timestamp_us(),
            record.level(),
            record.target(),
            record.args()
        );
        self.write(line.as_bytes());
    }

    fn flush(&self) {
        if let Err(e) = LogBuffer::flush(self) {
            eprintln!("Error flushing log buffer: {:?}", e);
        }
    }
}

fn timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
