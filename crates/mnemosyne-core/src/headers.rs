//! Reserved header, metadata and query names.
//!
//! These names form the contract between the interception layers and the
//! backing store. Header names are lowercase so they can be used directly
//! with [`http::HeaderName::from_static`].

/// Object metadata header on the primary object naming the current revision.
///
/// The value is an opaque revision object name inside the revisions
/// container. It is never interpreted as a path.
pub const REVISION_POINTER: &str = "x-object-meta-revision-reference";

/// Container metadata key naming the revisions container.
///
/// Set on the primary container as `X-Container-Meta-Revisions-Location`.
pub const REVISIONS_LOCATION: &str = "revisions-location";

/// Prefix of container metadata headers.
pub const CONTAINER_META_PREFIX: &str = "x-container-meta-";

/// Prefix of object user-metadata headers.
pub const OBJECT_META_PREFIX: &str = "x-object-meta-";

/// Query parameter that requests the raw manifest object, bypassing
/// revision indirection.
pub const RAW_MANIFEST_PARAM: &str = "manifest";

/// Headers carrying the caller's credentials, copied onto every sub-request.
pub const AUTH_HEADERS: [&str; 3] = ["x-auth-token", "x-storage-token", "authorization"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_is_object_metadata() {
        assert!(REVISION_POINTER.starts_with(OBJECT_META_PREFIX));
    }

    #[test]
    fn test_header_names_are_valid() {
        for name in [REVISION_POINTER].into_iter().chain(AUTH_HEADERS) {
            assert!(http::HeaderName::from_lowercase(name.as_bytes()).is_ok(), "{name}");
        }
    }
}
