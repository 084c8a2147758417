//! Reader cursors for partial circular buffers
//!
//! A cursor is a plain value: the logical stream offset of the next byte to
//! read plus the number of bytes it had to skip because the writer overwrote
//! them first. Cursors never touch the backing store, so any number of them
//! can read the same buffer, and a cursor saved from one session can resume
//! reading in the next when that session appended to the stream.
//!
//! A writer attached without `append` starts a new stream after the kept
//! prologue. Cursors from the old stream are moved back to the end of the
//! kept prologue when the reset is visible, which is the case when:
//!
//! - the cursor reads through the buffer that performed the reset, or
//! - the stream is shorter than the cursor last saw it.
//!
//! A reader that only reopens the store after the new stream has grown past
//! its old length cannot tell the two streams apart, because the header
//! carries no reset marker. [`ReadCursor::restarts`] counts the moves.

/// Position of a reader in the logical byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadCursor {
    /// Logical offset of the next byte to read
    position: u32,
    /// Bytes jumped over because they had been overwritten
    skipped: u64,
    /// Stream length at the last read
    seen: u32,
    /// Reset the cursor was last reconciled with
    epoch: Option<u64>,
    /// Times the cursor was moved back to a new stream
    restarts: u32,
}

impl ReadCursor {
    /// A cursor at the start of the stream
    pub fn start() -> Self {
        Self::default()
    }

    /// A cursor resuming at the logical offset `position`
    ///
    /// The offset refers to the stream as it was before any reset made by
    /// the buffer the cursor is first used with.
    pub fn at(position: u32) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Logical offset of the next byte to read
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Total bytes this cursor lost to overwrites
    ///
    /// Bytes of a discarded stream are not counted here, see
    /// [`ReadCursor::restarts`].
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Number of times the cursor was moved back because the stream restarted
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub(crate) fn advance(&mut self, count: u32) {
        self.position += count;
    }

    /// Move forward to `oldest` if the cursor points at overwritten data
    pub(crate) fn catch_up(&mut self, oldest: u32) {
        if self.position < oldest {
            self.skipped += u64::from(oldest - self.position);
            self.position = oldest;
        }
    }

    pub(crate) fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    /// Reconcile with the reset `epoch` that kept `kept` bytes of the old stream
    pub(crate) fn enter_epoch(&mut self, epoch: u64, kept: u32) {
        self.restart(kept);
        self.epoch = Some(epoch);
    }

    /// Record the stream length, restarting if the stream got shorter
    pub(crate) fn observe(&mut self, total_written: u32, prologue_end: u32) {
        if self.seen > total_written {
            self.restart(prologue_end);
        }
        self.seen = total_written;
    }

    fn restart(&mut self, kept: u32) {
        if self.position > kept {
            self.position = kept;
            self.restarts += 1;
        }
    }
}
