//! Native-library boundary surface for the skylift data plane.
//!
//! Everything that crosses into the storage client library goes through
//! the [`NativeBoundary`] trait: raw C-shaped results, opaque handles,
//! and error fields that are either absent or populated. This crate owns
//! the three pieces every caller needs:
//!
//! - [`raw`] — the boundary trait and its result/option structs
//! - [`handle`] — typed, owned handles with guaranteed release
//! - [`error`] — translation of native errors into [`Error`]
//!
//! [`memory::MemoryBoundary`] is an in-process implementation used by
//! tests and local development.

pub mod error;
pub mod handle;
pub mod memory;
pub mod raw;

pub use error::{Error, check, translate};
pub use handle::{HandleKind, NativeHandle, kind};
pub use raw::{
    NativeBoundary, RawBucketInfo, RawDownloadOptions, RawError, RawHandle, RawListOptions,
    RawObjectInfo, RawPermission, RawSharePrefix, RawUploadOptions,
};
