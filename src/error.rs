//! Error types for partial circular buffers

use std::io;

/// Errors raised while formatting, attaching to or persisting a buffer
///
/// Every variant except `Io` and `Logger` indicates a caller error: the
/// backing store or the requested layout does not describe a usable buffer.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// The backing store cannot even hold the header
    #[error("buffer of {size} bytes cannot hold the 12-byte header")]
    BufferTooSmall {
        /// Size of the rejected store
        size: usize,
    },

    /// The data area cannot be addressed by the 32-bit header fields
    #[error("buffer of {size} bytes exceeds the 32-bit addressable data area")]
    BufferTooLarge {
        /// Size of the rejected store
        size: usize,
    },

    /// The wrap position lies past the end of the data area
    #[error("wrap position {wrap_position} lies beyond the {data_size}-byte data area")]
    InvalidWrapPosition {
        /// Requested wrap position
        wrap_position: u32,
        /// Size of the data area
        data_size: u32,
    },

    /// An appending writer asked for a different layout than the stored one
    #[error("stored wrap position {stored} does not match requested {requested}")]
    WrapPositionMismatch {
        /// Wrap position found in the header
        stored: u32,
        /// Wrap position the caller asked for
        requested: u32,
    },

    /// The stored header does not describe a reachable buffer state
    #[error(
        "corrupt header: total_written={total_written} wrap_position={wrap_position} \
         end_position={end_position} for a {data_size}-byte data area"
    )]
    CorruptHeader {
        /// Stored stream length
        total_written: u32,
        /// Stored wrap position
        wrap_position: u32,
        /// Stored write cursor
        end_position: u32,
        /// Size of the data area
        data_size: u32,
    },

    /// An I/O error occurred on a file-backed buffer
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The process-wide log buffer was initialized twice
    #[error("log buffer already initialized")]
    AlreadyInitialized,

    /// The process-wide log buffer has not been initialized
    #[error("log buffer not initialized")]
    NotInitialized,

    /// Another logger was already installed with the `log` facade
    #[error("failed to install logger: {0}")]
    Logger(#[from] log::SetLoggerError),
}

/// Result type for buffer operations
pub type Result<T> = std::result::Result<T, BufferError>;
