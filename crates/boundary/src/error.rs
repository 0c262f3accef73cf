//! Domain errors and native error translation.

use crate::raw::RawError;

/// Native error codes reported by the storage client library.
///
/// Kept verbatim from the vendor headers; codes outside this set are
/// surfaced as [`Error::NativeFailure`] with the raw code preserved.
pub mod code {
    pub const INTERNAL: i32 = 0x02;
    pub const CANCELED: i32 = 0x03;
    pub const INVALID_HANDLE: i32 = 0x04;
    pub const TOO_MANY_REQUESTS: i32 = 0x05;
    pub const BANDWIDTH_LIMIT_EXCEEDED: i32 = 0x06;

    pub const BUCKET_NAME_INVALID: i32 = 0x10;
    pub const BUCKET_ALREADY_EXISTS: i32 = 0x11;
    pub const BUCKET_NOT_EMPTY: i32 = 0x12;
    pub const BUCKET_NOT_FOUND: i32 = 0x13;

    pub const OBJECT_KEY_INVALID: i32 = 0x20;
    pub const OBJECT_NOT_FOUND: i32 = 0x21;
    pub const UPLOAD_DONE: i32 = 0x22;
}

/// Errors produced by the skylift data plane.
///
/// Absence of error is `Ok(())` / `None`, never an empty error value.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation canceled: {0}")]
    Canceled(String),

    #[error("invalid handle passed to the native library: {0}")]
    InvalidHandle(String),

    #[error("too many requests: {0}")]
    TooManyRequests(String),

    #[error("bandwidth limit exceeded: {0}")]
    BandwidthLimitExceeded(String),

    #[error("invalid bucket name: {0}")]
    BucketNameInvalid(String),

    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("invalid object key: {0}")]
    ObjectKeyInvalid(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("upload already committed or aborted: {0}")]
    UploadDone(String),

    /// Boundary reported an error with no specific mapping.
    #[error("native failure (code {code:#x}): {message}")]
    NativeFailure { code: i32, message: String },

    #[error("size mismatch: expected {expected} bytes, transferred {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("transfer stalled after {transferred} of {total} bytes")]
    StalledTransfer { transferred: u64, total: u64 },

    /// A native handle was used after release. Programming error; should
    /// be unreachable.
    #[error("native handle used after release")]
    HandleReleased,
}

impl Error {
    /// The machine-readable native code behind this error, if it came
    /// from the boundary.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Internal(_) => Some(code::INTERNAL),
            Error::Canceled(_) => Some(code::CANCELED),
            Error::InvalidHandle(_) => Some(code::INVALID_HANDLE),
            Error::TooManyRequests(_) => Some(code::TOO_MANY_REQUESTS),
            Error::BandwidthLimitExceeded(_) => Some(code::BANDWIDTH_LIMIT_EXCEEDED),
            Error::BucketNameInvalid(_) => Some(code::BUCKET_NAME_INVALID),
            Error::BucketAlreadyExists(_) => Some(code::BUCKET_ALREADY_EXISTS),
            Error::BucketNotEmpty(_) => Some(code::BUCKET_NOT_EMPTY),
            Error::BucketNotFound(_) => Some(code::BUCKET_NOT_FOUND),
            Error::ObjectKeyInvalid(_) => Some(code::OBJECT_KEY_INVALID),
            Error::ObjectNotFound(_) => Some(code::OBJECT_NOT_FOUND),
            Error::UploadDone(_) => Some(code::UPLOAD_DONE),
            Error::NativeFailure { code, .. } => Some(*code),
            Error::LocalIo(_)
            | Error::SizeMismatch { .. }
            | Error::StalledTransfer { .. }
            | Error::HandleReleased => None,
        }
    }
}

/// Translates a raw boundary error field into a domain error.
///
/// Total and pure: every populated `RawError` maps to exactly one kind,
/// unknown codes fall back to [`Error::NativeFailure`] preserving code
/// and message, and an absent field maps to `None`.
pub fn translate(raw: Option<RawError>) -> Option<Error> {
    let RawError { code: c, message } = raw?;
    Some(match c {
        code::INTERNAL => Error::Internal(message),
        code::CANCELED => Error::Canceled(message),
        code::INVALID_HANDLE => Error::InvalidHandle(message),
        code::TOO_MANY_REQUESTS => Error::TooManyRequests(message),
        code::BANDWIDTH_LIMIT_EXCEEDED => Error::BandwidthLimitExceeded(message),
        code::BUCKET_NAME_INVALID => Error::BucketNameInvalid(message),
        code::BUCKET_ALREADY_EXISTS => Error::BucketAlreadyExists(message),
        code::BUCKET_NOT_EMPTY => Error::BucketNotEmpty(message),
        code::BUCKET_NOT_FOUND => Error::BucketNotFound(message),
        code::OBJECT_KEY_INVALID => Error::ObjectKeyInvalid(message),
        code::OBJECT_NOT_FOUND => Error::ObjectNotFound(message),
        code::UPLOAD_DONE => Error::UploadDone(message),
        _ => Error::NativeFailure { code: c, message },
    })
}

/// Turns a raw error field into a `Result`, for one-line call sites.
pub fn check(raw: Option<RawError>) -> Result<(), Error> {
    match translate(raw) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
