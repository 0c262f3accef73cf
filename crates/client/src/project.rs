//! Open projects and bucket/object metadata operations.
//!
//! Every operation here is a single request/response call across the
//! boundary: translate the error field, copy the metadata view out of
//! the native result, release the result handle. The iterative transfer
//! paths live in `skylift-transfer`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use skylift_boundary::handle::kind;
use skylift_boundary::raw::{RawBucketResult, RawHandleResult, RawListOptions, RawObjectResult};
use skylift_boundary::{Error, NativeBoundary, NativeHandle, translate};

use crate::access::Access;

/// Metadata for one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub name: String,
    /// Unix timestamp (seconds).
    pub created: i64,
}

/// Metadata for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub key: String,
    pub content_length: u64,
    /// Unix timestamp (seconds).
    pub created: i64,
}

/// Options for [`Project::list_objects`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsOptions {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    #[serde(default)]
    pub recursive: bool,
}

impl ListObjectsOptions {
    /// Recursive listing of the whole bucket.
    pub fn recursive() -> Self {
        Self {
            prefix: String::new(),
            recursive: true,
        }
    }

    fn to_raw(&self) -> RawListOptions {
        RawListOptions {
            prefix: self.prefix.clone(),
            recursive: self.recursive,
        }
    }
}

/// An open project: the root handle every data-plane operation hangs off.
pub struct Project {
    handle: NativeHandle<kind::Project>,
}

impl Project {
    /// Opens the project behind an access grant.
    pub fn open(access: &Access) -> Result<Self, Error> {
        let result = access
            .handle()
            .boundary()
            .open_project(access.handle().raw()?);
        Ok(Self {
            handle: NativeHandle::open(access.handle().boundary_arc().clone(), result)?,
        })
    }

    /// Creates the bucket if it does not exist yet.
    pub fn ensure_bucket(&self, bucket: &str) -> Result<BucketInfo, Error> {
        let result = self
            .handle
            .boundary()
            .ensure_bucket(self.handle.raw()?, bucket);
        adopt_bucket_result(self.handle.boundary_arc(), result)
    }

    /// Deletes an empty bucket; `Error::BucketNotEmpty` otherwise.
    pub fn delete_bucket(&self, bucket: &str) -> Result<BucketInfo, Error> {
        let result = self
            .handle
            .boundary()
            .delete_bucket(self.handle.raw()?, bucket);
        let info = adopt_bucket_result(self.handle.boundary_arc(), result)?;
        debug!(bucket, "bucket deleted");
        Ok(info)
    }

    /// Lists all buckets visible to the grant.
    pub fn list_buckets(&self) -> Result<Vec<BucketInfo>, Error> {
        let result = self.handle.boundary().list_buckets(self.handle.raw()?);
        if let Some(err) = translate(result.error) {
            return Err(err);
        }
        Ok(result
            .buckets
            .into_iter()
            .map(|b| BucketInfo {
                name: b.name,
                created: b.created,
            })
            .collect())
    }

    /// Fetches object metadata, including the content length a download
    /// uses as its expected total.
    pub fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, Error> {
        let result = self
            .handle
            .boundary()
            .stat_object(self.handle.raw()?, bucket, key);
        adopt_object_result(self.handle.boundary_arc(), result)
    }

    /// Deletes one object, returning its last-known metadata.
    pub fn delete_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, Error> {
        let result = self
            .handle
            .boundary()
            .delete_object(self.handle.raw()?, bucket, key);
        let info = adopt_object_result(self.handle.boundary_arc(), result)?;
        debug!(bucket, key, "object deleted");
        Ok(info)
    }

    /// Lists objects in a bucket by driving the native iterator handle
    /// to exhaustion, then releasing it.
    pub fn list_objects(
        &self,
        bucket: &str,
        options: &ListObjectsOptions,
    ) -> Result<Vec<ObjectInfo>, Error> {
        let result =
            self.handle
                .boundary()
                .list_objects(self.handle.raw()?, bucket, &options.to_raw());
        let iterator: NativeHandle<kind::ObjectIterator> =
            NativeHandle::open(self.handle.boundary_arc().clone(), result)?;

        let mut objects = Vec::new();
        loop {
            let step = self.handle.boundary().object_iterator_next(iterator.raw()?);
            if let Some(err) = translate(step.error) {
                let _ = iterator.release();
                return Err(err);
            }
            match step.object {
                Some(obj) => objects.push(ObjectInfo {
                    key: obj.key,
                    content_length: obj.content_length,
                    created: obj.created,
                }),
                None => break,
            }
        }
        iterator.release()?;
        Ok(objects)
    }

    /// Closes the project, surfacing any native close error.
    pub fn close(self) -> Result<(), Error> {
        self.handle.release()
    }

    /// The underlying project handle, used by the transfer engine to
    /// open streams against this project.
    pub fn handle(&self) -> &NativeHandle<kind::Project> {
        &self.handle
    }
}

/// Copies the metadata out of a bucket result and releases its handle,
/// on every path.
fn adopt_bucket_result(
    boundary: &Arc<dyn NativeBoundary>,
    result: RawBucketResult,
) -> Result<BucketInfo, Error> {
    if let Some(err) = translate(result.error) {
        return Err(err);
    }
    let guard: NativeHandle<kind::Bucket> = NativeHandle::open(
        boundary.clone(),
        RawHandleResult {
            handle: result.handle,
            error: None,
        },
    )?;
    let info = result
        .bucket
        .ok_or_else(|| Error::Internal("bucket result missing metadata".into()));
    let released = guard.release();
    let info = info?;
    released?;
    Ok(BucketInfo {
        name: info.name,
        created: info.created,
    })
}

/// Copies the metadata out of an object result and releases its handle,
/// on every path.
fn adopt_object_result(
    boundary: &Arc<dyn NativeBoundary>,
    result: RawObjectResult,
) -> Result<ObjectInfo, Error> {
    if let Some(err) = translate(result.error) {
        return Err(err);
    }
    let guard: NativeHandle<kind::ObjectStat> = NativeHandle::open(
        boundary.clone(),
        RawHandleResult {
            handle: result.handle,
            error: None,
        },
    )?;
    let info = result
        .object
        .ok_or_else(|| Error::Internal("object result missing metadata".into()));
    let released = guard.release();
    let info = info?;
    released?;
    Ok(ObjectInfo {
        key: info.key,
        content_length: info.content_length,
        created: info.created,
    })
}
