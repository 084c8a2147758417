//! In-memory layout of a partial circular buffer
//!
//! A backing store is a header followed by a data area:
//!
//! ```text
//! 0        4              8             12
//! +--------+--------------+-------------+------------------------------+
//! | total  | wrap_position| end_position| data (buffer_size - 12)      |
//! +--------+--------------+-------------+------------------------------+
//!                                        |<- prologue ->|<- wrap ring ->|
//! ```
//!
//! All header fields are little-endian `u32`s with no padding. The layout is
//! the contract shared with external readers of the store (for example a
//! crash-log post-processor), so it is encoded field by field rather than by
//! casting a struct.
//!
//! This module also owns the arithmetic that maps the logical byte stream
//! onto the physical data area:
//!
//! - logical bytes `[0, wrap_position)` live at the same physical offsets and
//!   are never overwritten
//! - a logical byte `L >= wrap_position` lives at
//!   `wrap_position + (L - wrap_position) % cycle`, where
//!   `cycle = data_size - wrap_position`

pub mod cursor;
pub mod partial;

use crate::error::{BufferError, Result};

/// Size of the encoded header in bytes
pub const HEADER_SIZE: usize = 12;

const TOTAL_WRITTEN_OFFSET: usize = 0;
const WRAP_POSITION_OFFSET: usize = 4;
const END_POSITION_OFFSET: usize = 8;

/// Header stored at the start of every backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferHeader {
    /// Logical length of the stream ever written, including dropped bytes
    pub total_written: u32,
    /// Data offset at which the wrap region starts
    pub wrap_position: u32,
    /// Data offset of the next byte the writer will store
    pub end_position: u32,
}

impl BufferHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = HEADER_SIZE;

    /// Header of a freshly formatted buffer
    pub fn new(wrap_position: u32) -> Self {
        Self {
            total_written: 0,
            wrap_position,
            end_position: 0,
        }
    }

    /// Decode a header from the first [`HEADER_SIZE`] bytes of `bytes`
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than the header. Callers check the store
    /// size with [`data_size_of`] first.
    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            total_written: read_u32(bytes, TOTAL_WRITTEN_OFFSET),
            wrap_position: read_u32(bytes, WRAP_POSITION_OFFSET),
            end_position: read_u32(bytes, END_POSITION_OFFSET),
        }
    }

    /// Encode the header into the first [`HEADER_SIZE`] bytes of `bytes`
    pub fn encode(&self, bytes: &mut [u8]) {
        write_u32(bytes, TOTAL_WRITTEN_OFFSET, self.total_written);
        write_u32(bytes, WRAP_POSITION_OFFSET, self.wrap_position);
        write_u32(bytes, END_POSITION_OFFSET, self.end_position);
    }

    /// Encoded header as a byte array
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        self.encode(&mut bytes);
        bytes
    }

    /// Length of the wrap region for a data area of `data_size` bytes
    pub fn cycle(&self, data_size: u32) -> u32 {
        data_size - self.wrap_position
    }

    /// Logical end of the prologue bytes written so far
    pub fn prologue_end(&self) -> u32 {
        self.total_written.min(self.wrap_position)
    }

    /// Logical offset one past the newest byte still held in the data area
    pub fn retained_end(&self, data_size: u32) -> u32 {
        if self.cycle(data_size) == 0 {
            self.prologue_end()
        } else {
            self.total_written
        }
    }

    /// Logical offset of the oldest byte still held in the wrap region
    pub fn oldest_wrapped(&self, data_size: u32) -> u32 {
        let cycle = self.cycle(data_size);
        self.wrap_position
            .max(self.total_written.saturating_sub(cycle))
    }

    /// Physical data offset of the logical byte `logical`
    ///
    /// `logical` must lie in the prologue or in the retained wrap window.
    pub fn physical_offset(&self, logical: u32, data_size: u32) -> u32 {
        if logical < self.wrap_position {
            return logical;
        }
        match self.cycle(data_size) {
            0 => logical,
            cycle => self.wrap_position + (logical - self.wrap_position) % cycle,
        }
    }

    /// Write cursor implied by `total_written`
    pub fn expected_end(&self, data_size: u32) -> u32 {
        if self.total_written <= self.wrap_position {
            return self.total_written;
        }
        match self.cycle(data_size) {
            0 => data_size,
            cycle => self.wrap_position + (self.total_written - self.wrap_position) % cycle,
        }
    }

    /// Whether this header describes a state a writer could have produced
    pub fn is_consistent(&self, data_size: u32) -> bool {
        self.wrap_position <= data_size
            && self.end_position <= data_size
            && self.end_position == self.expected_end(data_size)
    }

    /// Check the header against a data area of `data_size` bytes
    pub fn validate(&self, data_size: u32) -> Result<()> {
        if self.is_consistent(data_size) {
            Ok(())
        } else {
            Err(BufferError::CorruptHeader {
                total_written: self.total_written,
                wrap_position: self.wrap_position,
                end_position: self.end_position,
                data_size,
            })
        }
    }
}

/// Size of the data area carried by a store of `buffer_size` bytes
pub fn data_size_of(buffer_size: usize) -> Result<u32> {
    let data_size = buffer_size
        .checked_sub(HEADER_SIZE)
        .ok_or(BufferError::BufferTooSmall { size: buffer_size })?;
    u32::try_from(data_size).map_err(|_| BufferError::BufferTooLarge { size: buffer_size })
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
