//! Handler bindings: one (owner, message, response) dispatch target.

use std::fmt;
use std::sync::Arc;

use crate::types::{Callable, Instance, Origin, TypeKey};

/// A single handler method bound to the instance that owns it.
///
/// Bindings are produced when a participant is added or discovered and are
/// immutable afterwards. Cloning a binding keeps its identity, so a clone
/// returned from a query can be used to remove the original.
#[derive(Clone)]
pub struct HandlerBinding {
    message: TypeKey,
    response: Option<TypeKey>,
    method: &'static str,
    owner: Instance,
    origin: Origin,
    callable: Callable,
}

impl HandlerBinding {
    pub(crate) const fn new(
        message: TypeKey,
        response: Option<TypeKey>,
        method: &'static str,
        owner: Instance,
        origin: Origin,
        callable: Callable,
    ) -> Self {
        Self {
            message,
            response,
            method,
            owner,
            origin,
            callable,
        }
    }

    /// Message type the handler accepts.
    #[must_use]
    pub const fn message_type(&self) -> TypeKey {
        self.message
    }

    /// Response type, or `None` for a fire-and-forget handler.
    #[must_use]
    pub const fn response_type(&self) -> Option<TypeKey> {
        self.response
    }

    /// Name the handler method was declared under.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        self.method
    }

    /// Instance that owns the handler.
    #[must_use]
    pub const fn owner(&self) -> &Instance {
        &self.owner
    }

    /// Whether the binding came from an add or a configure pass.
    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    /// Whether the handler produces a response.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        self.response.is_some()
    }

    /// Whether both values refer to the same registered binding.
    #[must_use]
    pub fn same_binding(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.callable), Arc::as_ptr(&other.callable))
    }

    pub(crate) const fn callable(&self) -> &Callable {
        &self.callable
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("message", &self.message)
            .field("response", &self.response)
            .field("method", &self.method)
            .field("owner", &self.owner)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Finds a request handler in `existing` that `candidate` would duplicate.
///
/// Only bindings with a response can conflict; fire-and-forget handlers may
/// share a message type freely.
pub(crate) fn find_response_conflict<'a>(
    existing: impl IntoIterator<Item = &'a HandlerBinding>,
    candidate: &HandlerBinding,
) -> Option<&'a HandlerBinding> {
    let response = candidate.response_type()?;
    existing.into_iter().find(|binding| {
        binding.message_type() == candidate.message_type()
            && binding.response_type() == Some(response)
    })
}
