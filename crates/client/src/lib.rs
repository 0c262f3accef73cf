//! Metadata and access-grant layer for the skylift data plane.
//!
//! Wraps the boundary's single-call operations with typed results and
//! translated errors: access grants (request/parse/share/serialize) and
//! project metadata (ensure/list/delete buckets, stat/list/delete
//! objects). The chunked transfer engine in `skylift-transfer` consumes
//! the [`Project`] handle this crate produces.

pub mod access;
pub mod project;

pub use access::{Access, Permission, SharePrefix};
pub use project::{BucketInfo, ListObjectsOptions, ObjectInfo, Project};
