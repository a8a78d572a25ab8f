//! Errors raised by registration, binding, and dispatch.
//!
//! Every failure is a variant of [`BusError`] carrying the type names
//! involved, so callers can match on the failure programmatically and the
//! rendered message stays useful in logs. Type names are `&'static str`
//! values taken from [`TypeKey`] to keep the error small.

use std::any::Any;

use thiserror::Error;

use crate::types::TypeKey;

/// Error type a handler body may return.
///
/// Handler failures are boxed so that any error type can cross the bus.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// No request handler is registered for the message and response pair.
    #[error("no handler registered for message '{message}' returning '{response}'")]
    HandlerNotFound {
        /// Message type name.
        message: &'static str,
        /// Requested response type name.
        response: &'static str,
    },

    /// A handler body failed or panicked.
    #[error("handler on '{owner}' failed for message '{message}': {source}")]
    HandlerInvocation {
        /// Message type name.
        message: &'static str,
        /// Type name of the instance that owns the handler.
        owner: &'static str,
        /// Failure raised by the handler, or a [`HandlerPanic`].
        #[source]
        source: HandlerError,
    },

    /// One or more handlers failed during a broadcast.
    ///
    /// Every target was still invoked; the first failure is the error source
    /// and the remainder are kept in `others`.
    #[error("{} of {invoked} handlers failed for message '{message}'", .others.len() + 1)]
    Broadcast {
        /// Message type name.
        message: &'static str,
        /// Number of handlers invoked.
        invoked: usize,
        /// First failure in registration order.
        #[source]
        first: Box<BusError>,
        /// Remaining failures in registration order.
        others: Vec<BusError>,
    },

    /// No instance could be obtained for a discovered type.
    #[error("cannot create an instance of '{type_name}': {reason}")]
    InstanceCreation {
        /// Type name that could not be instantiated.
        type_name: &'static str,
        /// Human-readable reason.
        reason: String,
        /// Optional failure reported by the instance provider.
        #[source]
        source: Option<HandlerError>,
    },

    /// A slot's shape is not one of the supported delegate shapes.
    #[error("slot '{slot}' on '{owner}' has unsupported shape {signature}")]
    BindingShapeMismatch {
        /// Type name of the slot owner.
        owner: &'static str,
        /// Slot name.
        slot: &'static str,
        /// Rendered slot signature.
        signature: String,
    },

    /// A slot already forwards into another live bus.
    #[error("slot '{slot}' on '{owner}' is already bound by another bus")]
    SlotClaimed {
        /// Type name of the slot owner.
        owner: &'static str,
        /// Slot name.
        slot: &'static str,
    },

    /// A second request handler was registered for the same message and
    /// response pair.
    #[error(
        "'{owner}' declares a handler for '{message}' returning '{response}', \
         already handled by '{existing_owner}'"
    )]
    DuplicateResponseHandler {
        /// Message type name.
        message: &'static str,
        /// Response type name.
        response: &'static str,
        /// Type name of the rejected owner.
        owner: &'static str,
        /// Type name of the owner already registered.
        existing_owner: &'static str,
    },

    /// A request slot was invoked before any bus bound it.
    #[error("request slot for message '{message}' returning '{response}' is not bound")]
    SlotUnbound {
        /// Message type name.
        message: &'static str,
        /// Response type name.
        response: &'static str,
    },

    /// A bound slot outlived the bus it forwards into.
    #[error("bus behind the slot for message '{message}' has been dropped")]
    BusUnavailable {
        /// Message type name.
        message: &'static str,
    },

    /// A handler produced a response of an unexpected type.
    #[error("handler for message '{message}' did not produce a '{expected}'")]
    ResponseMismatch {
        /// Message type name.
        message: &'static str,
        /// Expected response type name.
        expected: &'static str,
    },

    /// Configuration applied partially; some candidate types failed.
    #[error(
        "configure applied {handlers} handlers and {event_sources} event sources \
         but {} types failed",
        .failures.len()
    )]
    Configure {
        /// Handler bindings installed.
        handlers: usize,
        /// Slot bindings installed.
        event_sources: usize,
        /// Per-type failures in discovery order.
        failures: Vec<BusError>,
    },
}

impl BusError {
    /// Creates a [`BusError::HandlerNotFound`] error.
    #[must_use]
    pub const fn handler_not_found(message: TypeKey, response: TypeKey) -> Self {
        Self::HandlerNotFound {
            message: message.name(),
            response: response.name(),
        }
    }

    /// Creates a [`BusError::HandlerInvocation`] error.
    #[must_use]
    pub fn invocation(message: TypeKey, owner: TypeKey, source: impl Into<HandlerError>) -> Self {
        Self::HandlerInvocation {
            message: message.name(),
            owner: owner.name(),
            source: source.into(),
        }
    }

    /// Creates a [`BusError::InstanceCreation`] error.
    #[must_use]
    pub fn instance_creation(
        type_key: TypeKey,
        reason: impl Into<String>,
        source: Option<HandlerError>,
    ) -> Self {
        Self::InstanceCreation {
            type_name: type_key.name(),
            reason: reason.into(),
            source,
        }
    }

    /// Creates a [`BusError::SlotUnbound`] error.
    #[must_use]
    pub const fn slot_unbound(message: TypeKey, response: TypeKey) -> Self {
        Self::SlotUnbound {
            message: message.name(),
            response: response.name(),
        }
    }

    /// Creates a [`BusError::ResponseMismatch`] error.
    #[must_use]
    pub const fn response_mismatch(message: TypeKey, expected: TypeKey) -> Self {
        Self::ResponseMismatch {
            message: message.name(),
            expected: expected.name(),
        }
    }

    /// Folds broadcast failures into a single error.
    ///
    /// Returns `None` when `failures` is empty.
    pub(crate) fn broadcast(
        message: TypeKey,
        invoked: usize,
        failures: Vec<Self>,
    ) -> Option<Self> {
        let mut remaining = failures.into_iter();
        let first = remaining.next()?;
        Some(Self::Broadcast {
            message: message.name(),
            invoked,
            first: Box::new(first),
            others: remaining.collect(),
        })
    }

    /// Individual failures folded into an aggregate error.
    ///
    /// Returns the broadcast or configure failures in order, or the error
    /// itself for any other variant.
    #[must_use]
    pub fn failures(&self) -> Vec<&Self> {
        match self {
            Self::Broadcast { first, others, .. } => {
                std::iter::once(first.as_ref()).chain(others.iter()).collect()
            }
            Self::Configure { failures, .. } => failures.iter().collect(),
            other => vec![other],
        }
    }

    /// Whether the failure originated in a panicking handler.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::HandlerInvocation { source, .. } if source.is::<HandlerPanic>())
    }
}

/// A handler panicked instead of returning.
///
/// The panic is caught at the dispatch boundary and surfaced as the source
/// of a [`BusError::HandlerInvocation`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    message: String,
}

impl HandlerPanic {
    /// Builds a panic description from a caught unwind payload.
    #[must_use]
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| String::from("non-string panic payload"));
        Self { message }
    }

    /// Panic message, when the payload carried one.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
