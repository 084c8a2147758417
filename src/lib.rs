//! Partial circular buffers - fixed-size byte logs that keep their beginning
//! and their most recent tail.
//!
//! # Overview
//!
//! A partial circular buffer lives in a caller-provided byte store: a
//! 12-byte header followed by a data area. The data area is split in two:
//!
//! 1. A prologue, written once and never overwritten
//! 2. A wrap region, a ring that overwrites its oldest bytes once full
//!
//! This is the classic shape of a diagnostic log: the start of a session
//! (versions, configuration, the first events) is kept no matter how long the
//! session runs, and the end of the session is kept for post-mortem analysis.
//!
//! # Key Features
//!
//! - Works over any byte store: slices, boxed slices, vectors, memory maps
//! - Explicit little-endian header layout shared with external readers
//! - Independent reader cursors that can resume across sessions
//! - File-backed buffers via memory-mapped I/O
//! - A `log` sink that records into a buffer from any thread
//!
//! # Usage
//!
//! ```
//! use partial_circular_buffer::PartialCircularBuffer;
//!
//! let mut store = vec![0u8; 12 + 20];
//! let mut buffer = PartialCircularBuffer::format_with_wrap_position(&mut store[..], 4).unwrap();
//! buffer.write(b"AAAA");
//! buffer.write(b"BBBBBBBBBBBBBBBB");
//! buffer.write(b"CCCC");
//!
//! assert_eq!(buffer.contents(), b"AAAABBBBBBBBBBBBCCCC");
//! assert_eq!(buffer.data(), b"AAAACCCCBBBBBBBBBBBB");
//! ```
//!
//! See `demos/basic_usage.rs` for the log sink and file-backed buffers.

#![deny(missing_docs)]

mod disk;
mod error;
mod logger;
mod memory;

pub use disk::persistent::MappedBuffer;
pub use error::{BufferError, Result};
pub use logger::{Backing, LogBuffer};
pub use memory::cursor::ReadCursor;
pub use memory::partial::PartialCircularBuffer;
pub use memory::{BufferHeader, HEADER_SIZE};

use log::LevelFilter;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;

/// Global instance of the process-wide log buffer
static LOG_BUFFER: OnceCell<Arc<LogBuffer>> = OnceCell::new();

/// Configuration for a [`LogBuffer`]
#[derive(Debug, Clone)]
pub struct LogBufferConfig {
    /// Total size of the backing store in bytes, header included
    pub size: usize,
    /// Prologue length; `None` keeps the first half of the data area
    pub wrap_position: Option<u32>,
    /// Most verbose level recorded
    pub level: LevelFilter,
    /// Buffer file, or `None` for a heap buffer
    pub path: Option<PathBuf>,
    /// Continue an existing buffer file instead of replacing it
    pub append: bool,
}

impl LogBufferConfig {
    /// Wrap position to use for a data area of `data_size` bytes
    ///
    /// An explicit position larger than the data area is passed through and
    /// rejected when the buffer is formatted.
    pub fn wrap_position_for(&self, data_size: u32) -> u32 {
        self.wrap_position.unwrap_or(data_size / 2)
    }
}

impl Default for LogBufferConfig {
    fn default() -> Self {
        Self {
            size: 1024 * 1024, // 1 MiB
            wrap_position: None,
            level: LevelFilter::Info,
            path: None,
            append: false,
        }
    }
}

/// Initialize the process-wide log buffer
///
/// # Arguments
///
/// * `config` - Size, layout and destination of the buffer
///
/// # Errors
///
/// Fails if the buffer cannot be built or was already initialized.
pub fn init_log_buffer(config: LogBufferConfig) -> Result<Arc<LogBuffer>> {
    // Only one caller builds the buffer; the others wait and never touch the file
    let mut built = false;
    let buffer = LOG_BUFFER.get_or_try_init(|| {
        built = true;
        LogBuffer::new(&config).map(Arc::new)
    })?;

    if !built {
        return Err(BufferError::AlreadyInitialized);
    }
    Ok(buffer.clone())
}

/// Get a reference to the process-wide log buffer, if initialized
pub fn log_buffer() -> Option<Arc<LogBuffer>> {
    LOG_BUFFER.get().cloned()
}

/// Route the `log` facade into the process-wide log buffer
///
/// # Errors
///
/// Fails if the buffer is not initialized or another logger is installed.
pub fn install_logger() -> Result<()> {
    let buffer = LOG_BUFFER.get().ok_or(BufferError::NotInitialized)?;
    log::set_logger(&**buffer)?;
    log::set_max_level(buffer.level());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_concurrent_init_builds_once() {
        let dir = tempdir().unwrap();
        let config = LogBufferConfig {
            size: 12 + 256,
            wrap_position: Some(16),
            path: Some(dir.path().join("global.dat")),
            ..LogBufferConfig::default()
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let config = config.clone();
                thread::spawn(move || init_log_buffer(config))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .all(|err| matches!(err, BufferError::AlreadyInitialized)));

        // The losers did not re-format the winner's file
        let buffer = log_buffer().unwrap();
        buffer.write(b"kept");
        assert!(init_log_buffer(config).is_err());
        assert_eq!(buffer.snapshot(), b"kept");
        let reader = MappedBuffer::open_read_only(dir.path().join("global.dat")).unwrap();
        assert_eq!(reader.contents(), b"kept");
    }
}
