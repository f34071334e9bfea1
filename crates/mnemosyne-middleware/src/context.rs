//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the pipeline.
//! Collaborators upstream of a stage publish values into it (for example the
//! encryption parameters populated by key management), and sub-requests
//! issued on behalf of the request share it.

use mnemosyne_core::RequestId;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Instant;

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use mnemosyne_middleware::context::MiddlewareContext;
///
/// #[derive(Clone)]
/// struct Tenant(&'static str);
///
/// let mut ctx = MiddlewareContext::new();
/// ctx.set_extension(Tenant("acme"));
/// assert_eq!(ctx.get_extension::<Tenant>().unwrap().0, "acme");
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    request_id: RequestId,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a new middleware context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a context with a specific request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Publishes a value for downstream stages. One value per type.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Looks up a value published by an upstream stage.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Cipher(&'static str);

    #[test]
    fn test_later_value_replaces_earlier() {
        let mut ctx = MiddlewareContext::new();
        assert!(!ctx.has_extension::<Cipher>());

        ctx.set_extension(Cipher("aes-256"));
        ctx.set_extension(Cipher("chacha20"));
        assert_eq!(ctx.get_extension::<Cipher>(), Some(&Cipher("chacha20")));
    }

    #[test]
    fn test_values_are_keyed_by_type() {
        let mut ctx = MiddlewareContext::new();
        ctx.set_extension(Cipher("aes-256"));
        ctx.set_extension(7_u64);

        assert_eq!(ctx.get_extension::<u64>(), Some(&7));
        assert!(ctx.get_extension::<u32>().is_none());
    }

    #[test]
    fn test_with_request_id() {
        let id = RequestId::new();
        assert_eq!(MiddlewareContext::with_request_id(id).request_id(), id);
    }
}
