//! Transfer session bookkeeping.
//!
//! Pure state shared by the upload and download loops: byte offset,
//! chunk size, total size, terminal state. No I/O of its own, which
//! keeps the termination conditions independently testable.

use skylift_boundary::Error;

use crate::DEFAULT_CHUNK_SIZE;

/// Lifecycle of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Stream open, chunks moving.
    Open,
    /// All chunks exchanged; finalizing the stream handle.
    Committing,
    /// Terminal success.
    Closed,
    /// Terminal failure.
    Failed,
}

/// Bookkeeping for one in-progress upload or download.
///
/// Owned and mutated by exactly one transfer loop for its entire
/// lifetime; there are no concurrent readers or writers.
#[derive(Debug)]
pub struct TransferSession {
    chunk_size: u32,
    total_bytes: u64,
    transferred_bytes: u64,
    state: SessionState,
    error: Option<String>,
}

impl TransferSession {
    /// Creates a session. A zero `chunk_size` falls back to
    /// [`DEFAULT_CHUNK_SIZE`].
    pub fn new(chunk_size: u32, total_bytes: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            chunk_size,
            total_bytes,
            transferred_bytes: 0,
            state: SessionState::Open,
            error: None,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes transferred so far. Monotonically non-decreasing.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    /// Bytes still owed to reach the total.
    pub fn remaining(&self) -> u64 {
        self.total_bytes.saturating_sub(self.transferred_bytes)
    }

    /// Size of the next chunk: the configured chunk size capped by what
    /// remains. Zero exactly when the transfer is complete.
    pub fn next_want(&self) -> usize {
        self.remaining().min(u64::from(self.chunk_size)) as usize
    }

    /// Records `n` transferred bytes and returns the new offset.
    pub fn advance(&mut self, n: u64) -> u64 {
        self.transferred_bytes += n;
        self.transferred_bytes
    }

    pub fn is_complete(&self) -> bool {
        self.transferred_bytes >= self.total_bytes
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Enters the finalization phase (commit for uploads, close for
    /// downloads).
    pub fn begin_commit(&mut self) {
        self.state = SessionState::Committing;
    }

    /// Marks terminal success.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Marks terminal failure, keeping the error text for diagnostics.
    pub fn mark_failed(&mut self, err: &Error) {
        self.state = SessionState::Failed;
        self.error = Some(err.to_string());
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
