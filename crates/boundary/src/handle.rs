//! Typed ownership of native resources.
//!
//! Every resource the native library hands out (access grant, project,
//! upload/download stream, stat result, iterator) is wrapped in a
//! [`NativeHandle`] parameterized by its kind. The wrapper guarantees
//! exactly one free per successful open: `release` consumes the handle,
//! and a handle that reaches `Drop` still holding its raw id is freed
//! there with a warning, never leaked and never double-freed.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, translate};
use crate::raw::{NativeBoundary, RawError, RawHandle, RawHandleResult};

/// A resource kind the native library can hand out.
pub trait HandleKind {
    /// Kind name used in logs and diagnostics.
    const NAME: &'static str;

    /// Invokes the kind-specific native free/close call.
    fn free(boundary: &dyn NativeBoundary, raw: RawHandle) -> Option<RawError>;
}

/// Marker types for each handle kind.
pub mod kind {
    use super::HandleKind;
    use crate::raw::{NativeBoundary, RawError, RawHandle};

    macro_rules! handle_kind {
        ($(#[$doc:meta])* $name:ident, $label:literal, |$b:ident, $raw:ident| $free:expr) => {
            $(#[$doc])*
            #[derive(Debug)]
            pub struct $name;

            impl HandleKind for $name {
                const NAME: &'static str = $label;

                fn free($b: &dyn NativeBoundary, $raw: RawHandle) -> Option<RawError> {
                    $free
                }
            }
        };
    }

    handle_kind!(
        /// An access grant.
        Access, "access", |b, raw| {
            b.free_access(raw);
            None
        }
    );
    handle_kind!(
        /// An open project. Closing may itself report a native error.
        Project, "project", |b, raw| b.close_project(raw)
    );
    handle_kind!(
        /// An open upload stream.
        UploadStream, "upload-stream", |b, raw| {
            b.free_upload(raw);
            None
        }
    );
    handle_kind!(
        /// An open download stream.
        ///
        /// Freeing does not finalize the stream; a successful download
        /// calls `close_download` first.
        DownloadStream, "download-stream", |b, raw| {
            b.free_download(raw);
            None
        }
    );
    handle_kind!(
        /// A stat/delete result whose metadata view has been copied out.
        ObjectStat, "object-stat", |b, raw| {
            b.free_object_result(raw);
            None
        }
    );
    handle_kind!(
        /// An ensure/delete bucket result.
        Bucket, "bucket", |b, raw| {
            b.free_bucket_result(raw);
            None
        }
    );
    handle_kind!(
        /// An object listing iterator.
        ObjectIterator, "object-iterator", |b, raw| {
            b.free_object_iterator(raw);
            None
        }
    );
}

/// Owned wrapper around one native resource.
///
/// Either open (valid for operations) or released. Ownership is
/// exclusive; the handle may be moved but never shared.
pub struct NativeHandle<K: HandleKind> {
    boundary: Arc<dyn NativeBoundary>,
    raw: Option<RawHandle>,
    _kind: PhantomData<K>,
}

impl<K: HandleKind> NativeHandle<K> {
    /// Adopts the result of a native open call.
    ///
    /// On failure the error is translated and returned; there is nothing
    /// to release in that case.
    pub fn open(boundary: Arc<dyn NativeBoundary>, result: RawHandleResult) -> Result<Self, Error> {
        if let Some(err) = translate(result.error) {
            return Err(err);
        }
        let raw = result.handle.ok_or_else(|| Error::Internal(format!(
            "{} open returned neither handle nor error",
            K::NAME
        )))?;
        Ok(Self {
            boundary,
            raw: Some(raw),
            _kind: PhantomData,
        })
    }

    /// The raw id for boundary calls.
    ///
    /// Fails with [`Error::HandleReleased`] if the guard is violated.
    pub fn raw(&self) -> Result<RawHandle, Error> {
        self.raw.ok_or(Error::HandleReleased)
    }

    /// The boundary that issued this handle.
    pub fn boundary(&self) -> &dyn NativeBoundary {
        self.boundary.as_ref()
    }

    /// Shared reference to the boundary, for opening sibling resources.
    pub fn boundary_arc(&self) -> &Arc<dyn NativeBoundary> {
        &self.boundary
    }

    /// Releases the native resource.
    ///
    /// Consumes the handle, so a second release cannot happen; the drop
    /// glue sees the raw id already taken and does nothing.
    pub fn release(mut self) -> Result<(), Error> {
        match self.raw.take() {
            Some(raw) => match translate(K::free(self.boundary.as_ref(), raw)) {
                Some(err) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

impl<K: HandleKind> Drop for NativeHandle<K> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            warn!(
                kind = K::NAME,
                handle = raw.0,
                "native handle dropped without explicit release"
            );
            let _ = K::free(self.boundary.as_ref(), raw);
        }
    }
}

impl<K: HandleKind> fmt::Debug for NativeHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &K::NAME)
            .field("raw", &self.raw)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBoundary;
    use crate::raw::RawError;

    fn grant(boundary: &Arc<MemoryBoundary>) -> NativeHandle<kind::Access> {
        let result =
            boundary.request_access_with_passphrase("sat.test:7777", "key", "passphrase");
        NativeHandle::open(boundary.clone() as Arc<dyn NativeBoundary>, result).unwrap()
    }

    #[test]
    fn open_failure_translates_and_leaves_nothing_to_release() {
        let boundary = Arc::new(MemoryBoundary::new());
        let result = RawHandleResult::err(RawError::new(crate::error::code::INTERNAL, "down"));
        let err = NativeHandle::<kind::Access>::open(
            boundary.clone() as Arc<dyn NativeBoundary>,
            result,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(boundary.open_count(crate::memory::HandleClass::Access), 0);
    }

    #[test]
    fn release_frees_exactly_once() {
        let boundary = Arc::new(MemoryBoundary::new());
        let handle = grant(&boundary);
        assert_eq!(boundary.open_count(crate::memory::HandleClass::Access), 1);
        assert_eq!(boundary.free_count(crate::memory::HandleClass::Access), 0);

        handle.release().unwrap();
        assert_eq!(boundary.free_count(crate::memory::HandleClass::Access), 1);
    }

    #[test]
    fn drop_without_release_still_frees() {
        let boundary = Arc::new(MemoryBoundary::new());
        {
            let _handle = grant(&boundary);
        }
        assert_eq!(boundary.free_count(crate::memory::HandleClass::Access), 1);
    }

    #[test]
    fn raw_id_is_stable_while_open() {
        let boundary = Arc::new(MemoryBoundary::new());
        let handle = grant(&boundary);
        let a = handle.raw().unwrap();
        let b = handle.raw().unwrap();
        assert_eq!(a, b);
        handle.release().unwrap();
    }

    #[test]
    fn missing_handle_in_successful_result_is_internal_error() {
        let boundary = Arc::new(MemoryBoundary::new());
        let result = RawHandleResult {
            handle: None,
            error: None,
        };
        let err = NativeHandle::<kind::Project>::open(
            boundary as Arc<dyn NativeBoundary>,
            result,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
