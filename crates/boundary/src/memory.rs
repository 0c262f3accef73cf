//! In-memory boundary implementation.
//!
//! Stands in for the native storage library in tests and local
//! development. Besides the full [`NativeBoundary`] surface it keeps
//! open/free accounting per handle class, per-operation call counts,
//! and a small fault-injection plan (scripted errors, write stalls,
//! short and padded reads) so transfer edge cases can be driven
//! deterministically in-process.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::code;
use crate::raw::{
    NativeBoundary, RawBucketInfo, RawBucketListResult, RawBucketResult, RawDownloadOptions,
    RawError, RawHandle, RawHandleResult, RawIterResult, RawListOptions, RawObjectInfo,
    RawObjectResult, RawPermission, RawReadResult, RawSharePrefix, RawStringResult,
    RawUploadOptions, RawWriteResult,
};

/// Handle classes tracked by the open/free counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleClass {
    Access,
    Project,
    Upload,
    Download,
    ObjectIterator,
    ObjectResult,
    BucketResult,
}

/// Boundary operations, used for scripted faults and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    RequestAccess,
    ParseAccess,
    ShareAccess,
    SerializeAccess,
    OpenProject,
    CloseProject,
    EnsureBucket,
    DeleteBucket,
    ListBuckets,
    ListObjects,
    IteratorNext,
    StatObject,
    DeleteObject,
    UploadObject,
    UploadWrite,
    UploadCommit,
    UploadAbort,
    DownloadObject,
    DownloadRead,
    CloseDownload,
}

#[derive(Debug, Clone)]
struct AccessState {
    satellite: String,
    api_key: String,
    passphrase: String,
    permission: RawPermission,
    prefixes: Vec<RawSharePrefix>,
}

#[derive(Debug, Clone)]
struct ProjectState {
    permission: RawPermission,
    prefixes: Vec<RawSharePrefix>,
}

#[derive(Debug, Clone)]
struct ObjectState {
    data: Vec<u8>,
    created: i64,
}

#[derive(Debug, Clone, Default)]
struct BucketState {
    created: i64,
    objects: BTreeMap<String, ObjectState>,
}

#[derive(Debug)]
struct UploadState {
    bucket: String,
    key: String,
    overwrite: bool,
    staged: Vec<u8>,
    done: bool,
}

#[derive(Debug)]
struct DownloadState {
    data: Vec<u8>,
    pos: usize,
    closed: bool,
}

#[derive(Debug)]
struct IterState {
    entries: Vec<RawObjectInfo>,
    pos: usize,
}

/// Grant wire form: JSON inside base64, opaque to callers.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerializedGrant {
    satellite: String,
    api_key: String,
    passphrase: String,
    allow_download: bool,
    allow_upload: bool,
    allow_list: bool,
    allow_delete: bool,
    prefixes: Vec<(String, String)>,
}

#[derive(Default)]
struct FaultPlan {
    scripted: HashMap<Op, VecDeque<RawError>>,
    /// Once an upload has staged this many bytes, further writes report 0.
    write_stall_after: Option<u64>,
    /// Serve at most this many bytes per read call.
    read_cap: Option<usize>,
    /// Every read reports 0 bytes.
    zero_reads: bool,
    /// Garbage bytes appended to the next read, once.
    pad_next_read: usize,
}

#[derive(Default)]
struct Inner {
    next_handle: u64,
    live: HashMap<u64, HandleClass>,
    open_counts: HashMap<HandleClass, u64>,
    free_counts: HashMap<HandleClass, u64>,
    call_counts: HashMap<Op, u64>,
    faults: FaultPlan,

    accesses: HashMap<u64, AccessState>,
    projects: HashMap<u64, ProjectState>,
    buckets: BTreeMap<String, BucketState>,
    uploads: HashMap<u64, UploadState>,
    downloads: HashMap<u64, DownloadState>,
    iterators: HashMap<u64, IterState>,
}

impl Inner {
    fn issue(&mut self, class: HandleClass) -> RawHandle {
        self.next_handle += 1;
        let id = self.next_handle;
        self.live.insert(id, class);
        *self.open_counts.entry(class).or_insert(0) += 1;
        RawHandle(id)
    }

    fn retire(&mut self, handle: RawHandle, class: HandleClass) -> bool {
        if self.live.get(&handle.0) == Some(&class) {
            self.live.remove(&handle.0);
            *self.free_counts.entry(class).or_insert(0) += 1;
            true
        } else {
            false
        }
    }

    fn count(&mut self, op: Op) {
        *self.call_counts.entry(op).or_insert(0) += 1;
    }

    fn scripted(&mut self, op: Op) -> Option<RawError> {
        self.faults.scripted.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn check_handle(&self, handle: RawHandle, class: HandleClass) -> Option<RawError> {
        if self.live.get(&handle.0) == Some(&class) {
            None
        } else {
            Some(RawError::new(
                code::INVALID_HANDLE,
                format!("{class:?} handle {} is not open", handle.0),
            ))
        }
    }

    fn project(&self, handle: RawHandle) -> Result<&ProjectState, RawError> {
        match self.check_handle(handle, HandleClass::Project) {
            None => Ok(&self.projects[&handle.0]),
            Some(err) => Err(err),
        }
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn denied(what: &str) -> RawError {
    RawError::new(code::INTERNAL, format!("permission denied: {what}"))
}

/// Checks a project's grant against an object operation.
fn authorize(
    project: &ProjectState,
    bucket: &str,
    key: &str,
    allowed: bool,
    what: &str,
) -> Option<RawError> {
    if !allowed {
        return Some(denied(what));
    }
    if project.prefixes.is_empty() {
        return None;
    }
    let in_scope = project
        .prefixes
        .iter()
        .any(|p| p.bucket == bucket && key.starts_with(p.prefix.as_str()));
    if in_scope { None } else { Some(denied(what)) }
}

/// In-memory storage network standing behind the boundary trait.
#[derive(Default)]
pub struct MemoryBoundary {
    inner: Mutex<Inner>,
}

impl MemoryBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------

    /// Scripts the next call to `op` to fail with the given native error.
    pub fn fail_next(&self, op: Op, error_code: i32, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .faults
            .scripted
            .entry(op)
            .or_default()
            .push_back(RawError::new(error_code, message));
    }

    /// After an upload stream has staged `bytes`, writes report 0 bytes.
    pub fn stall_writes_after(&self, bytes: u64) {
        self.inner.lock().unwrap().faults.write_stall_after = Some(bytes);
    }

    /// Serves at most `max` bytes per `download_read` call.
    pub fn cap_reads(&self, max: usize) {
        self.inner.lock().unwrap().faults.read_cap = Some(max);
    }

    /// Makes every `download_read` report zero bytes.
    pub fn force_zero_reads(&self, enabled: bool) {
        self.inner.lock().unwrap().faults.zero_reads = enabled;
    }

    /// Appends `extra` garbage bytes to the next positive read.
    pub fn pad_next_read(&self, extra: usize) {
        self.inner.lock().unwrap().faults.pad_next_read = extra;
    }

    // -----------------------------------------------------------------
    // Accounting & inspection
    // -----------------------------------------------------------------

    /// Handles of `class` successfully opened so far.
    pub fn open_count(&self, class: HandleClass) -> u64 {
        *self
            .inner
            .lock()
            .unwrap()
            .open_counts
            .get(&class)
            .unwrap_or(&0)
    }

    /// Handles of `class` freed so far.
    pub fn free_count(&self, class: HandleClass) -> u64 {
        *self
            .inner
            .lock()
            .unwrap()
            .free_counts
            .get(&class)
            .unwrap_or(&0)
    }

    /// Handles currently open across all classes.
    pub fn live_handles(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    /// Times `op` has been invoked.
    pub fn calls(&self, op: Op) -> u64 {
        *self
            .inner
            .lock()
            .unwrap()
            .call_counts
            .get(&op)
            .unwrap_or(&0)
    }

    /// Committed object payload, for test assertions.
    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.data.clone())
    }

    /// Seeds a bucket directly, bypassing the boundary surface.
    pub fn seed_bucket(&self, bucket: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| BucketState {
                created: now_secs(),
                objects: BTreeMap::new(),
            });
    }

    /// Seeds an object directly, bypassing the boundary surface.
    pub fn seed_object(&self, bucket: &str, key: &str, data: &[u8]) {
        self.seed_bucket(bucket);
        let mut inner = self.inner.lock().unwrap();
        let created = now_secs();
        inner.buckets.get_mut(bucket).unwrap().objects.insert(
            key.to_string(),
            ObjectState {
                data: data.to_vec(),
                created,
            },
        );
    }
}

impl NativeBoundary for MemoryBoundary {
    fn request_access_with_passphrase(
        &self,
        satellite: &str,
        api_key: &str,
        passphrase: &str,
    ) -> RawHandleResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::RequestAccess);
        if let Some(err) = inner.scripted(Op::RequestAccess) {
            return RawHandleResult::err(err);
        }
        if satellite.is_empty() || api_key.is_empty() {
            return RawHandleResult::err(RawError::new(
                code::INTERNAL,
                "satellite address and api key are required",
            ));
        }
        let handle = inner.issue(HandleClass::Access);
        inner.accesses.insert(
            handle.0,
            AccessState {
                satellite: satellite.to_string(),
                api_key: api_key.to_string(),
                passphrase: passphrase.to_string(),
                permission: RawPermission::full(),
                prefixes: Vec::new(),
            },
        );
        RawHandleResult::ok(handle)
    }

    fn parse_access(&self, serialized: &str) -> RawHandleResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::ParseAccess);
        if let Some(err) = inner.scripted(Op::ParseAccess) {
            return RawHandleResult::err(err);
        }
        let grant: SerializedGrant = match BASE64
            .decode(serialized)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        {
            Some(grant) => grant,
            None => {
                return RawHandleResult::err(RawError::new(
                    code::INTERNAL,
                    "malformed serialized access grant",
                ));
            }
        };
        let handle = inner.issue(HandleClass::Access);
        inner.accesses.insert(
            handle.0,
            AccessState {
                satellite: grant.satellite,
                api_key: grant.api_key,
                passphrase: grant.passphrase,
                permission: RawPermission {
                    allow_download: grant.allow_download,
                    allow_upload: grant.allow_upload,
                    allow_list: grant.allow_list,
                    allow_delete: grant.allow_delete,
                },
                prefixes: grant
                    .prefixes
                    .into_iter()
                    .map(|(bucket, prefix)| RawSharePrefix { bucket, prefix })
                    .collect(),
            },
        );
        RawHandleResult::ok(handle)
    }

    fn access_share(
        &self,
        access: RawHandle,
        permission: &RawPermission,
        prefixes: &[RawSharePrefix],
    ) -> RawHandleResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::ShareAccess);
        if let Some(err) = inner.scripted(Op::ShareAccess) {
            return RawHandleResult::err(err);
        }
        if let Some(err) = inner.check_handle(access, HandleClass::Access) {
            return RawHandleResult::err(err);
        }
        let parent = inner.accesses[&access.0].clone();
        // A derived grant can only narrow the parent.
        let effective = RawPermission {
            allow_download: permission.allow_download && parent.permission.allow_download,
            allow_upload: permission.allow_upload && parent.permission.allow_upload,
            allow_list: permission.allow_list && parent.permission.allow_list,
            allow_delete: permission.allow_delete && parent.permission.allow_delete,
        };
        let handle = inner.issue(HandleClass::Access);
        inner.accesses.insert(
            handle.0,
            AccessState {
                satellite: parent.satellite,
                api_key: parent.api_key,
                passphrase: parent.passphrase,
                permission: effective,
                prefixes: prefixes.to_vec(),
            },
        );
        RawHandleResult::ok(handle)
    }

    fn access_serialize(&self, access: RawHandle) -> RawStringResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::SerializeAccess);
        if let Some(err) = inner.scripted(Op::SerializeAccess) {
            return RawStringResult {
                string: None,
                error: Some(err),
            };
        }
        if let Some(err) = inner.check_handle(access, HandleClass::Access) {
            return RawStringResult {
                string: None,
                error: Some(err),
            };
        }
        let state = &inner.accesses[&access.0];
        let grant = SerializedGrant {
            satellite: state.satellite.clone(),
            api_key: state.api_key.clone(),
            passphrase: state.passphrase.clone(),
            allow_download: state.permission.allow_download,
            allow_upload: state.permission.allow_upload,
            allow_list: state.permission.allow_list,
            allow_delete: state.permission.allow_delete,
            prefixes: state
                .prefixes
                .iter()
                .map(|p| (p.bucket.clone(), p.prefix.clone()))
                .collect(),
        };
        let json = serde_json::to_vec(&grant).expect("grant serialization is infallible");
        RawStringResult {
            string: Some(BASE64.encode(json)),
            error: None,
        }
    }

    fn free_access(&self, access: RawHandle) {
        let mut inner = self.inner.lock().unwrap();
        if inner.retire(access, HandleClass::Access) {
            inner.accesses.remove(&access.0);
        }
    }

    fn open_project(&self, access: RawHandle) -> RawHandleResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::OpenProject);
        if let Some(err) = inner.scripted(Op::OpenProject) {
            return RawHandleResult::err(err);
        }
        if let Some(err) = inner.check_handle(access, HandleClass::Access) {
            return RawHandleResult::err(err);
        }
        let state = inner.accesses[&access.0].clone();
        let handle = inner.issue(HandleClass::Project);
        inner.projects.insert(
            handle.0,
            ProjectState {
                permission: state.permission,
                prefixes: state.prefixes,
            },
        );
        RawHandleResult::ok(handle)
    }

    fn close_project(&self, project: RawHandle) -> Option<RawError> {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::CloseProject);
        if let Some(err) = inner.scripted(Op::CloseProject) {
            return Some(err);
        }
        if inner.retire(project, HandleClass::Project) {
            inner.projects.remove(&project.0);
            None
        } else {
            // Double close is a no-op, matching the handle discipline.
            None
        }
    }

    fn ensure_bucket(&self, project: RawHandle, bucket: &str) -> RawBucketResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::EnsureBucket);
        if let Some(err) = inner.scripted(Op::EnsureBucket) {
            return RawBucketResult {
                handle: None,
                bucket: None,
                error: Some(err),
            };
        }
        if let Err(err) = inner.project(project) {
            return RawBucketResult {
                handle: None,
                bucket: None,
                error: Some(err),
            };
        }
        if bucket.is_empty() {
            return RawBucketResult {
                handle: None,
                bucket: None,
                error: Some(RawError::new(code::BUCKET_NAME_INVALID, "empty bucket name")),
            };
        }
        let created = now_secs();
        let state = inner
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| BucketState {
                created,
                objects: BTreeMap::new(),
            });
        let info = RawBucketInfo {
            name: bucket.to_string(),
            created: state.created,
        };
        let handle = inner.issue(HandleClass::BucketResult);
        RawBucketResult {
            handle: Some(handle),
            bucket: Some(info),
            error: None,
        }
    }

    fn delete_bucket(&self, project: RawHandle, bucket: &str) -> RawBucketResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::DeleteBucket);
        if let Some(err) = inner.scripted(Op::DeleteBucket) {
            return RawBucketResult {
                handle: None,
                bucket: None,
                error: Some(err),
            };
        }
        let state = match inner.project(project) {
            Ok(p) => p.clone(),
            Err(err) => {
                return RawBucketResult {
                    handle: None,
                    bucket: None,
                    error: Some(err),
                };
            }
        };
        if !state.permission.allow_delete {
            return RawBucketResult {
                handle: None,
                bucket: None,
                error: Some(denied("delete bucket")),
            };
        }
        let Some(existing) = inner.buckets.get(bucket) else {
            return RawBucketResult {
                handle: None,
                bucket: None,
                error: Some(RawError::new(
                    code::BUCKET_NOT_FOUND,
                    format!("bucket {bucket:?} does not exist"),
                )),
            };
        };
        if !existing.objects.is_empty() {
            return RawBucketResult {
                handle: None,
                bucket: None,
                error: Some(RawError::new(
                    code::BUCKET_NOT_EMPTY,
                    format!("bucket {bucket:?} is not empty"),
                )),
            };
        }
        let removed = inner.buckets.remove(bucket).unwrap();
        let handle = inner.issue(HandleClass::BucketResult);
        RawBucketResult {
            handle: Some(handle),
            bucket: Some(RawBucketInfo {
                name: bucket.to_string(),
                created: removed.created,
            }),
            error: None,
        }
    }

    fn list_buckets(&self, project: RawHandle) -> RawBucketListResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::ListBuckets);
        if let Some(err) = inner.scripted(Op::ListBuckets) {
            return RawBucketListResult {
                buckets: Vec::new(),
                error: Some(err),
            };
        }
        let state = match inner.project(project) {
            Ok(p) => p.clone(),
            Err(err) => {
                return RawBucketListResult {
                    buckets: Vec::new(),
                    error: Some(err),
                };
            }
        };
        if !state.permission.allow_list {
            return RawBucketListResult {
                buckets: Vec::new(),
                error: Some(denied("list buckets")),
            };
        }
        let buckets = inner
            .buckets
            .iter()
            .filter(|(name, _)| {
                state.prefixes.is_empty()
                    || state.prefixes.iter().any(|p| &p.bucket == *name)
            })
            .map(|(name, b)| RawBucketInfo {
                name: name.clone(),
                created: b.created,
            })
            .collect();
        RawBucketListResult {
            buckets,
            error: None,
        }
    }

    fn free_bucket_result(&self, handle: RawHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.retire(handle, HandleClass::BucketResult);
    }

    fn stat_object(&self, project: RawHandle, bucket: &str, key: &str) -> RawObjectResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::StatObject);
        if let Some(err) = inner.scripted(Op::StatObject) {
            return RawObjectResult {
                handle: None,
                object: None,
                error: Some(err),
            };
        }
        match object_lookup(&mut inner, project, bucket, key, Lookup::Stat) {
            Ok(info) => {
                let handle = inner.issue(HandleClass::ObjectResult);
                RawObjectResult {
                    handle: Some(handle),
                    object: Some(info),
                    error: None,
                }
            }
            Err(err) => RawObjectResult {
                handle: None,
                object: None,
                error: Some(err),
            },
        }
    }

    fn delete_object(&self, project: RawHandle, bucket: &str, key: &str) -> RawObjectResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::DeleteObject);
        if let Some(err) = inner.scripted(Op::DeleteObject) {
            return RawObjectResult {
                handle: None,
                object: None,
                error: Some(err),
            };
        }
        match object_lookup(&mut inner, project, bucket, key, Lookup::Delete) {
            Ok(info) => {
                if let Some(b) = inner.buckets.get_mut(bucket) {
                    b.objects.remove(key);
                }
                let handle = inner.issue(HandleClass::ObjectResult);
                RawObjectResult {
                    handle: Some(handle),
                    object: Some(info),
                    error: None,
                }
            }
            Err(err) => RawObjectResult {
                handle: None,
                object: None,
                error: Some(err),
            },
        }
    }

    fn free_object_result(&self, handle: RawHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.retire(handle, HandleClass::ObjectResult);
    }

    fn list_objects(
        &self,
        project: RawHandle,
        bucket: &str,
        options: &RawListOptions,
    ) -> RawHandleResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::ListObjects);
        if let Some(err) = inner.scripted(Op::ListObjects) {
            return RawHandleResult::err(err);
        }
        let state = match inner.project(project) {
            Ok(p) => p.clone(),
            Err(err) => return RawHandleResult::err(err),
        };
        if !state.permission.allow_list {
            return RawHandleResult::err(denied("list objects"));
        }
        let Some(bucket_state) = inner.buckets.get(bucket) else {
            return RawHandleResult::err(RawError::new(
                code::BUCKET_NOT_FOUND,
                format!("bucket {bucket:?} does not exist"),
            ));
        };
        let entries: Vec<RawObjectInfo> = bucket_state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(options.prefix.as_str()))
            .filter(|(key, _)| {
                // Non-recursive listings stop at the next path separator.
                options.recursive || !key[options.prefix.len()..].contains('/')
            })
            .map(|(key, obj)| RawObjectInfo {
                key: key.clone(),
                content_length: obj.data.len() as u64,
                created: obj.created,
            })
            .collect();
        let handle = inner.issue(HandleClass::ObjectIterator);
        inner.iterators.insert(handle.0, IterState { entries, pos: 0 });
        RawHandleResult::ok(handle)
    }

    fn object_iterator_next(&self, iterator: RawHandle) -> RawIterResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::IteratorNext);
        if let Some(err) = inner.scripted(Op::IteratorNext) {
            return RawIterResult {
                object: None,
                error: Some(err),
            };
        }
        if let Some(err) = inner.check_handle(iterator, HandleClass::ObjectIterator) {
            return RawIterResult {
                object: None,
                error: Some(err),
            };
        }
        let state = inner.iterators.get_mut(&iterator.0).unwrap();
        let object = state.entries.get(state.pos).cloned();
        if object.is_some() {
            state.pos += 1;
        }
        RawIterResult {
            object,
            error: None,
        }
    }

    fn free_object_iterator(&self, iterator: RawHandle) {
        let mut inner = self.inner.lock().unwrap();
        if inner.retire(iterator, HandleClass::ObjectIterator) {
            inner.iterators.remove(&iterator.0);
        }
    }

    fn upload_object(
        &self,
        project: RawHandle,
        bucket: &str,
        key: &str,
        options: &RawUploadOptions,
    ) -> RawHandleResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::UploadObject);
        if let Some(err) = inner.scripted(Op::UploadObject) {
            return RawHandleResult::err(err);
        }
        let state = match inner.project(project) {
            Ok(p) => p.clone(),
            Err(err) => return RawHandleResult::err(err),
        };
        if let Some(err) = authorize(&state, bucket, key, state.permission.allow_upload, "upload")
        {
            return RawHandleResult::err(err);
        }
        if key.is_empty() {
            return RawHandleResult::err(RawError::new(
                code::OBJECT_KEY_INVALID,
                "empty object key",
            ));
        }
        let Some(bucket_state) = inner.buckets.get(bucket) else {
            return RawHandleResult::err(RawError::new(
                code::BUCKET_NOT_FOUND,
                format!("bucket {bucket:?} does not exist"),
            ));
        };
        if !options.overwrite && bucket_state.objects.contains_key(key) {
            // Vendor code outside the mapped set; translates to the
            // generic native-failure kind.
            return RawHandleResult::err(RawError::new(
                0x23,
                format!("object {key:?} already exists"),
            ));
        }
        let overwrite = options.overwrite;
        let handle = inner.issue(HandleClass::Upload);
        inner.uploads.insert(
            handle.0,
            UploadState {
                bucket: bucket.to_string(),
                key: key.to_string(),
                overwrite,
                staged: Vec::new(),
                done: false,
            },
        );
        RawHandleResult::ok(handle)
    }

    fn upload_write(&self, upload: RawHandle, data: &[u8], length: usize) -> RawWriteResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::UploadWrite);
        if let Some(err) = inner.scripted(Op::UploadWrite) {
            return RawWriteResult {
                bytes_written: 0,
                error: Some(err),
            };
        }
        if let Some(err) = inner.check_handle(upload, HandleClass::Upload) {
            return RawWriteResult {
                bytes_written: 0,
                error: Some(err),
            };
        }
        let stall_after = inner.faults.write_stall_after;
        let state = inner.uploads.get_mut(&upload.0).unwrap();
        if state.done {
            return RawWriteResult {
                bytes_written: 0,
                error: Some(RawError::new(
                    code::UPLOAD_DONE,
                    "upload already committed or aborted",
                )),
            };
        }
        let mut n = length.min(data.len());
        if let Some(limit) = stall_after {
            let remaining = limit.saturating_sub(state.staged.len() as u64) as usize;
            n = n.min(remaining);
        }
        state.staged.extend_from_slice(&data[..n]);
        RawWriteResult {
            bytes_written: n,
            error: None,
        }
    }

    fn upload_commit(&self, upload: RawHandle) -> Option<RawError> {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::UploadCommit);
        if let Some(err) = inner.scripted(Op::UploadCommit) {
            return Some(err);
        }
        if let Some(err) = inner.check_handle(upload, HandleClass::Upload) {
            return Some(err);
        }
        let state = inner.uploads.get_mut(&upload.0).unwrap();
        if state.done {
            return Some(RawError::new(
                code::UPLOAD_DONE,
                "upload already committed or aborted",
            ));
        }
        state.done = true;
        let bucket = state.bucket.clone();
        let key = state.key.clone();
        let overwrite = state.overwrite;
        let data = std::mem::take(&mut state.staged);
        let Some(bucket_state) = inner.buckets.get_mut(&bucket) else {
            return Some(RawError::new(
                code::BUCKET_NOT_FOUND,
                format!("bucket {bucket:?} does not exist"),
            ));
        };
        if !overwrite && bucket_state.objects.contains_key(&key) {
            return Some(RawError::new(0x23, format!("object {key:?} already exists")));
        }
        let size = data.len();
        bucket_state.objects.insert(
            key.clone(),
            ObjectState {
                data,
                created: now_secs(),
            },
        );
        debug!(bucket, key, size, "object committed");
        None
    }

    fn upload_abort(&self, upload: RawHandle) -> Option<RawError> {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::UploadAbort);
        if let Some(err) = inner.scripted(Op::UploadAbort) {
            return Some(err);
        }
        if let Some(err) = inner.check_handle(upload, HandleClass::Upload) {
            return Some(err);
        }
        let state = inner.uploads.get_mut(&upload.0).unwrap();
        if state.done {
            return Some(RawError::new(
                code::UPLOAD_DONE,
                "upload already committed or aborted",
            ));
        }
        state.done = true;
        state.staged.clear();
        None
    }

    fn free_upload(&self, upload: RawHandle) {
        let mut inner = self.inner.lock().unwrap();
        if inner.retire(upload, HandleClass::Upload) {
            inner.uploads.remove(&upload.0);
        }
    }

    fn download_object(
        &self,
        project: RawHandle,
        bucket: &str,
        key: &str,
        _options: &RawDownloadOptions,
    ) -> RawHandleResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::DownloadObject);
        if let Some(err) = inner.scripted(Op::DownloadObject) {
            return RawHandleResult::err(err);
        }
        match object_lookup(&mut inner, project, bucket, key, Lookup::Download) {
            Ok(_) => {
                let data = inner.buckets[bucket].objects[key].data.clone();
                let handle = inner.issue(HandleClass::Download);
                inner.downloads.insert(
                    handle.0,
                    DownloadState {
                        data,
                        pos: 0,
                        closed: false,
                    },
                );
                RawHandleResult::ok(handle)
            }
            Err(err) => RawHandleResult::err(err),
        }
    }

    fn download_read(&self, download: RawHandle, want: usize) -> RawReadResult {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::DownloadRead);
        if let Some(err) = inner.scripted(Op::DownloadRead) {
            return RawReadResult {
                data: Vec::new(),
                bytes_read: 0,
                error: Some(err),
            };
        }
        if let Some(err) = inner.check_handle(download, HandleClass::Download) {
            return RawReadResult {
                data: Vec::new(),
                bytes_read: 0,
                error: Some(err),
            };
        }
        if inner.faults.zero_reads {
            return RawReadResult {
                data: vec![0; want],
                bytes_read: 0,
                error: None,
            };
        }
        let read_cap = inner.faults.read_cap;
        let pad = std::mem::take(&mut inner.faults.pad_next_read);
        let state = inner.downloads.get_mut(&download.0).unwrap();
        if state.closed {
            return RawReadResult {
                data: Vec::new(),
                bytes_read: 0,
                error: Some(RawError::new(
                    code::INVALID_HANDLE,
                    "read on closed download stream",
                )),
            };
        }
        let mut n = want.min(state.data.len() - state.pos);
        if let Some(cap) = read_cap {
            n = n.min(cap);
        }
        // Boundary-owned staging buffer; only the first bytes_read bytes
        // are meaningful to the caller.
        let mut data = vec![0u8; want.max(n + pad)];
        data[..n].copy_from_slice(&state.data[state.pos..state.pos + n]);
        state.pos += n;
        RawReadResult {
            data,
            bytes_read: n + pad,
            error: None,
        }
    }

    fn close_download(&self, download: RawHandle) -> Option<RawError> {
        let mut inner = self.inner.lock().unwrap();
        inner.count(Op::CloseDownload);
        if let Some(err) = inner.scripted(Op::CloseDownload) {
            return Some(err);
        }
        if let Some(err) = inner.check_handle(download, HandleClass::Download) {
            return Some(err);
        }
        inner.downloads.get_mut(&download.0).unwrap().closed = true;
        None
    }

    fn free_download(&self, download: RawHandle) {
        let mut inner = self.inner.lock().unwrap();
        if inner.retire(download, HandleClass::Download) {
            inner.downloads.remove(&download.0);
        }
    }
}

enum Lookup {
    Stat,
    Download,
    Delete,
}

fn object_lookup(
    inner: &mut Inner,
    project: RawHandle,
    bucket: &str,
    key: &str,
    lookup: Lookup,
) -> Result<RawObjectInfo, RawError> {
    let state = inner.project(project)?.clone();
    let (allowed, what) = match lookup {
        Lookup::Stat | Lookup::Download => (state.permission.allow_download, "download"),
        Lookup::Delete => (state.permission.allow_delete, "delete object"),
    };
    if let Some(err) = authorize(&state, bucket, key, allowed, what) {
        return Err(err);
    }
    if key.is_empty() {
        return Err(RawError::new(code::OBJECT_KEY_INVALID, "empty object key"));
    }
    let Some(bucket_state) = inner.buckets.get(bucket) else {
        return Err(RawError::new(
            code::BUCKET_NOT_FOUND,
            format!("bucket {bucket:?} does not exist"),
        ));
    };
    let Some(object) = bucket_state.objects.get(key) else {
        return Err(RawError::new(
            code::OBJECT_NOT_FOUND,
            format!("object {key:?} does not exist"),
        ));
    };
    Ok(RawObjectInfo {
        key: key.to_string(),
        content_length: object.data.len() as u64,
        created: object.created,
    })
}
