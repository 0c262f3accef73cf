//! Raw boundary surface.
//!
//! `NativeBoundary` mirrors the C surface of the storage client library:
//! opaque integer handles, result structs whose error field is either
//! absent (success) or populated (failure), and explicit byte counts on
//! every read/write. Nothing in this module interprets errors — that is
//! the job of [`crate::error::translate`].

/// Opaque reference to a resource owned by the native library.
///
/// Only meaningful to the boundary implementation that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub u64);

/// Error field carried by raw results: machine-readable code plus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawError {
    pub code: i32,
    pub message: String,
}

impl RawError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Result of a call that opens a resource (access, project, stream, iterator).
#[derive(Debug, Clone)]
pub struct RawHandleResult {
    pub handle: Option<RawHandle>,
    pub error: Option<RawError>,
}

impl RawHandleResult {
    pub fn ok(handle: RawHandle) -> Self {
        Self {
            handle: Some(handle),
            error: None,
        }
    }

    pub fn err(error: RawError) -> Self {
        Self {
            handle: None,
            error: Some(error),
        }
    }
}

/// Result of one `upload_write` call.
///
/// `bytes_written` may be less than the requested length; zero on a
/// non-empty request signals a stalled stream.
#[derive(Debug, Clone)]
pub struct RawWriteResult {
    pub bytes_written: usize,
    pub error: Option<RawError>,
}

/// Result of one `download_read` call.
///
/// `data` is the boundary-owned staging buffer; only the first
/// `bytes_read` bytes are valid and must be copied out before the next
/// call reuses the buffer.
#[derive(Debug, Clone)]
pub struct RawReadResult {
    pub data: Vec<u8>,
    pub bytes_read: usize,
    pub error: Option<RawError>,
}

/// Result of `access_serialize`.
#[derive(Debug, Clone)]
pub struct RawStringResult {
    pub string: Option<String>,
    pub error: Option<RawError>,
}

/// Object metadata view as reported by the native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObjectInfo {
    pub key: String,
    pub content_length: u64,
    /// Unix timestamp (seconds).
    pub created: i64,
}

/// Result of `stat_object` / `delete_object`.
///
/// Carries both the metadata view and the native result handle that
/// must be freed once the view has been copied out.
#[derive(Debug, Clone)]
pub struct RawObjectResult {
    pub handle: Option<RawHandle>,
    pub object: Option<RawObjectInfo>,
    pub error: Option<RawError>,
}

/// Bucket metadata view as reported by the native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBucketInfo {
    pub name: String,
    /// Unix timestamp (seconds).
    pub created: i64,
}

/// Result of `ensure_bucket` / `delete_bucket`.
#[derive(Debug, Clone)]
pub struct RawBucketResult {
    pub handle: Option<RawHandle>,
    pub bucket: Option<RawBucketInfo>,
    pub error: Option<RawError>,
}

/// Result of `list_buckets`.
#[derive(Debug, Clone)]
pub struct RawBucketListResult {
    pub buckets: Vec<RawBucketInfo>,
    pub error: Option<RawError>,
}

/// Result of one `object_iterator_next` call.
///
/// `object == None` with no error means the iterator is exhausted.
#[derive(Debug, Clone)]
pub struct RawIterResult {
    pub object: Option<RawObjectInfo>,
    pub error: Option<RawError>,
}

/// Access permissions for a shared grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawPermission {
    pub allow_download: bool,
    pub allow_upload: bool,
    pub allow_list: bool,
    pub allow_delete: bool,
}

impl RawPermission {
    /// Full permissions, as held by a root grant.
    pub fn full() -> Self {
        Self {
            allow_download: true,
            allow_upload: true,
            allow_list: true,
            allow_delete: true,
        }
    }
}

/// Bucket/prefix pair restricting a shared grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSharePrefix {
    pub bucket: String,
    pub prefix: String,
}

/// Options for opening an upload stream.
#[derive(Debug, Clone, Copy)]
pub struct RawUploadOptions {
    /// Whether committing over an existing key replaces it.
    pub overwrite: bool,
}

impl Default for RawUploadOptions {
    fn default() -> Self {
        Self { overwrite: true }
    }
}

/// Options for opening a download stream. Reserved for range requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDownloadOptions {}

/// Options for listing objects.
#[derive(Debug, Clone, Default)]
pub struct RawListOptions {
    pub prefix: String,
    pub recursive: bool,
}

/// The foreign-function boundary to the storage client library.
///
/// Every storage operation crosses this trait. Calls are synchronous and
/// blocking; implementations use interior mutability because the C
/// library they stand in for keeps its own state behind the handles.
///
/// Implementations must uphold the handle discipline: a handle returned
/// in a successful result stays valid until the matching free call, and
/// freeing twice is a no-op.
pub trait NativeBoundary: Send + Sync {
    // Access grants.
    fn request_access_with_passphrase(
        &self,
        satellite: &str,
        api_key: &str,
        passphrase: &str,
    ) -> RawHandleResult;
    fn parse_access(&self, serialized: &str) -> RawHandleResult;
    fn access_share(
        &self,
        access: RawHandle,
        permission: &RawPermission,
        prefixes: &[RawSharePrefix],
    ) -> RawHandleResult;
    fn access_serialize(&self, access: RawHandle) -> RawStringResult;
    fn free_access(&self, access: RawHandle);

    // Projects.
    fn open_project(&self, access: RawHandle) -> RawHandleResult;
    fn close_project(&self, project: RawHandle) -> Option<RawError>;

    // Bucket metadata.
    fn ensure_bucket(&self, project: RawHandle, bucket: &str) -> RawBucketResult;
    fn delete_bucket(&self, project: RawHandle, bucket: &str) -> RawBucketResult;
    fn list_buckets(&self, project: RawHandle) -> RawBucketListResult;
    fn free_bucket_result(&self, handle: RawHandle);

    // Object metadata.
    fn stat_object(&self, project: RawHandle, bucket: &str, key: &str) -> RawObjectResult;
    fn delete_object(&self, project: RawHandle, bucket: &str, key: &str) -> RawObjectResult;
    fn free_object_result(&self, handle: RawHandle);

    // Object iteration.
    fn list_objects(
        &self,
        project: RawHandle,
        bucket: &str,
        options: &RawListOptions,
    ) -> RawHandleResult;
    fn object_iterator_next(&self, iterator: RawHandle) -> RawIterResult;
    fn free_object_iterator(&self, iterator: RawHandle);

    // Upload streams.
    fn upload_object(
        &self,
        project: RawHandle,
        bucket: &str,
        key: &str,
        options: &RawUploadOptions,
    ) -> RawHandleResult;
    /// Writes up to `length` bytes from `data` into the stream.
    /// `length` never exceeds `data.len()`.
    fn upload_write(&self, upload: RawHandle, data: &[u8], length: usize) -> RawWriteResult;
    fn upload_commit(&self, upload: RawHandle) -> Option<RawError>;
    fn upload_abort(&self, upload: RawHandle) -> Option<RawError>;
    fn free_upload(&self, upload: RawHandle);

    // Download streams.
    fn download_object(
        &self,
        project: RawHandle,
        bucket: &str,
        key: &str,
        options: &RawDownloadOptions,
    ) -> RawHandleResult;
    fn download_read(&self, download: RawHandle, want: usize) -> RawReadResult;
    fn close_download(&self, download: RawHandle) -> Option<RawError>;
    fn free_download(&self, download: RawHandle);
}
