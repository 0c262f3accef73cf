//! Access grants: request, parse, share, serialize.
//!
//! An [`Access`] is the opaque credential the native library exchanges
//! for an open project. Sharing derives a narrowed grant; serializing
//! turns it into a portable string the other side parses back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use skylift_boundary::handle::kind;
use skylift_boundary::{
    Error, NativeBoundary, NativeHandle, RawPermission, RawSharePrefix, translate,
};

/// Permissions carried by a shared grant. All false by default; a
/// derived grant can only narrow its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[serde(default)]
    pub allow_download: bool,
    #[serde(default)]
    pub allow_upload: bool,
    #[serde(default)]
    pub allow_list: bool,
    #[serde(default)]
    pub allow_delete: bool,
}

impl Permission {
    pub(crate) fn to_raw(self) -> RawPermission {
        RawPermission {
            allow_download: self.allow_download,
            allow_upload: self.allow_upload,
            allow_list: self.allow_list,
            allow_delete: self.allow_delete,
        }
    }
}

/// Bucket/prefix pair restricting a shared grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePrefix {
    pub bucket: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
}

impl SharePrefix {
    /// Grants access to a whole bucket.
    pub fn bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: String::new(),
        }
    }

    fn to_raw(&self) -> RawSharePrefix {
        RawSharePrefix {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

/// An owned access grant.
#[derive(Debug)]
pub struct Access {
    handle: NativeHandle<kind::Access>,
}

impl Access {
    /// Requests a root grant from the satellite using an API key and
    /// encryption passphrase.
    pub fn request_with_passphrase(
        boundary: Arc<dyn NativeBoundary>,
        satellite: &str,
        api_key: &str,
        passphrase: &str,
    ) -> Result<Self, Error> {
        let result = boundary.request_access_with_passphrase(satellite, api_key, passphrase);
        Ok(Self {
            handle: NativeHandle::open(boundary, result)?,
        })
    }

    /// Parses a serialized grant produced by [`Access::serialize`].
    pub fn parse(boundary: Arc<dyn NativeBoundary>, serialized: &str) -> Result<Self, Error> {
        let result = boundary.parse_access(serialized);
        Ok(Self {
            handle: NativeHandle::open(boundary, result)?,
        })
    }

    /// Derives a new grant limited to `permission` and `prefixes`.
    pub fn share(
        &self,
        permission: Permission,
        prefixes: &[SharePrefix],
    ) -> Result<Access, Error> {
        let raw_prefixes: Vec<RawSharePrefix> = prefixes.iter().map(SharePrefix::to_raw).collect();
        let result = self.handle.boundary().access_share(
            self.handle.raw()?,
            &permission.to_raw(),
            &raw_prefixes,
        );
        Ok(Access {
            handle: NativeHandle::open(self.handle.boundary_arc().clone(), result)?,
        })
    }

    /// Serializes the grant into a portable string.
    pub fn serialize(&self) -> Result<String, Error> {
        let result = self.handle.boundary().access_serialize(self.handle.raw()?);
        if let Some(err) = translate(result.error) {
            return Err(err);
        }
        result
            .string
            .ok_or_else(|| Error::Internal("serialize returned neither string nor error".into()))
    }

    /// Releases the underlying native grant.
    pub fn close(self) -> Result<(), Error> {
        self.handle.release()
    }

    pub(crate) fn handle(&self) -> &NativeHandle<kind::Access> {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_boundary::memory::{HandleClass, MemoryBoundary, Op};
    use skylift_boundary::error::code;

    fn boundary() -> Arc<MemoryBoundary> {
        Arc::new(MemoryBoundary::new())
    }

    fn root(b: &Arc<MemoryBoundary>) -> Access {
        Access::request_with_passphrase(
            b.clone() as Arc<dyn NativeBoundary>,
            "sat.test:7777",
            "api-key",
            "secret",
        )
        .unwrap()
    }

    #[test]
    fn request_failure_translates() {
        let b = boundary();
        b.fail_next(Op::RequestAccess, code::TOO_MANY_REQUESTS, "rate limited");
        let err = Access::request_with_passphrase(
            b.clone() as Arc<dyn NativeBoundary>,
            "sat.test:7777",
            "api-key",
            "secret",
        )
        .unwrap_err();
        assert!(matches!(err, Error::TooManyRequests(_)));
        assert_eq!(b.open_count(HandleClass::Access), 0);
    }

    #[test]
    fn share_serialize_parse_roundtrip() {
        let b = boundary();
        let access = root(&b);
        let shared = access
            .share(
                Permission {
                    allow_list: true,
                    ..Permission::default()
                },
                &[SharePrefix::bucket("media")],
            )
            .unwrap();

        let serialized = shared.serialize().unwrap();
        let reparsed = Access::parse(b.clone() as Arc<dyn NativeBoundary>, &serialized).unwrap();

        reparsed.close().unwrap();
        shared.close().unwrap();
        access.close().unwrap();
        assert_eq!(b.open_count(HandleClass::Access), 3);
        assert_eq!(b.free_count(HandleClass::Access), 3);
    }

    #[test]
    fn parse_garbage_is_native_error() {
        let b = boundary();
        let err =
            Access::parse(b.clone() as Arc<dyn NativeBoundary>, "definitely-not-a-grant")
                .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn permission_serde_shape() {
        let p = Permission {
            allow_list: true,
            allow_delete: false,
            ..Permission::default()
        };
        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["allowList"], true);
        assert_eq!(json["allowDelete"], false);
    }
}
