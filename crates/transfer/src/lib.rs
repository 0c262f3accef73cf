//! Chunked transfer engine for the skylift data plane.
//!
//! Moves object payloads between local byte sources/sinks and native
//! stream handles in bounded chunks, tracking progress against a known
//! or discovered total size and driving every stream handle to release
//! on every exit path. Metadata operations live in `skylift-client`;
//! everything here is iterative.

pub mod download;
pub mod session;
pub mod source;
pub mod upload;

pub use download::download;
pub use session::{SessionState, TransferSession};
pub use source::{ByteSink, ByteSource};
pub use upload::upload;

use skylift_boundary::RawUploadOptions;

/// Default chunk size: 256 bytes per boundary call.
///
/// A local tuning parameter only; the wire protocol behind the boundary
/// does its own framing.
pub const DEFAULT_CHUNK_SIZE: u32 = 256;

/// Consecutive zero-progress reads tolerated before a download is
/// declared stalled.
pub const MAX_ZERO_READS: u32 = 16;

/// Options recognized by [`upload`] and [`download`].
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Bytes exchanged per boundary call. 0 means [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: u32,
    /// Whether committing over an existing key replaces it. Enforcement
    /// belongs to the network layer, not this engine.
    pub overwrite: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overwrite: true,
        }
    }
}

impl TransferOptions {
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Chunk size with the zero-means-default rule applied.
    pub fn effective_chunk_size(&self) -> u32 {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }

    pub(crate) fn to_raw_upload(self) -> RawUploadOptions {
        RawUploadOptions {
            overwrite: self.overwrite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_chunk_size_falls_back_to_default() {
        let options = TransferOptions::default().with_chunk_size(0);
        assert_eq!(options.effective_chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn explicit_chunk_size_is_kept() {
        let options = TransferOptions::default().with_chunk_size(64);
        assert_eq!(options.effective_chunk_size(), 64);
    }
}
