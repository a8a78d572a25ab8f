//! Filters over registered handler and slot bindings.
//!
//! Every criterion is optional; an empty query matches everything. Criteria
//! combine with logical AND.

use crate::binding::HandlerBinding;
use crate::event_source::EventSourceBinding;
use crate::types::{Instance, Origin, TypeKey};

/// Selects handler bindings.
///
/// # Example
///
/// ```ignore
/// let audit_handlers = bus.handlers(&HandlerQuery::new().owner_type::<AuditLog>());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HandlerQuery {
    message: Option<TypeKey>,
    response: Option<TypeKey>,
    owner_type: Option<TypeKey>,
    owner: Option<Instance>,
    origin: Option<Origin>,
}

impl HandlerQuery {
    /// Matches every binding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to handlers of message type `M`.
    #[must_use]
    pub fn message<M: 'static>(self) -> Self {
        self.message_key(TypeKey::of::<M>())
    }

    /// Restricts to handlers of the given message type.
    #[must_use]
    pub const fn message_key(mut self, message: TypeKey) -> Self {
        self.message = Some(message);
        self
    }

    /// Restricts to request handlers producing `R`.
    #[must_use]
    pub fn response<R: 'static>(mut self) -> Self {
        self.response = Some(TypeKey::of::<R>());
        self
    }

    /// Restricts to handlers owned by instances of `T`.
    #[must_use]
    pub fn owner_type<T: 'static>(mut self) -> Self {
        self.owner_type = Some(TypeKey::of::<T>());
        self
    }

    /// Restricts to handlers owned by `owner`.
    #[must_use]
    pub fn owner(mut self, owner: Instance) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Restricts to handlers registered with the given origin.
    #[must_use]
    pub const fn origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Whether `binding` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, binding: &HandlerBinding) -> bool {
        self.message.is_none_or(|key| key == binding.message_type())
            && self
                .response
                .is_none_or(|key| binding.response_type() == Some(key))
            && self
                .owner_type
                .is_none_or(|key| key == binding.owner().type_key())
            && self
                .owner
                .as_ref()
                .is_none_or(|owner| owner.same_as(binding.owner()))
            && self.origin.is_none_or(|origin| origin == binding.origin())
    }
}

/// Selects slot bindings.
#[derive(Debug, Clone, Default)]
pub struct EventSourceQuery {
    message: Option<TypeKey>,
    slot: Option<String>,
    owner_type: Option<TypeKey>,
    owner: Option<Instance>,
    origin: Option<Origin>,
}

impl EventSourceQuery {
    /// Matches every binding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to slots carrying message type `M`.
    #[must_use]
    pub fn message<M: 'static>(mut self) -> Self {
        self.message = Some(TypeKey::of::<M>());
        self
    }

    /// Restricts to slots with the given name.
    #[must_use]
    pub fn slot(mut self, name: impl Into<String>) -> Self {
        self.slot = Some(name.into());
        self
    }

    /// Restricts to slots on instances of `T`.
    #[must_use]
    pub fn owner_type<T: 'static>(mut self) -> Self {
        self.owner_type = Some(TypeKey::of::<T>());
        self
    }

    /// Restricts to slots on `owner`.
    #[must_use]
    pub fn owner(mut self, owner: Instance) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Restricts to slots bound with the given origin.
    #[must_use]
    pub const fn origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Whether `binding` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, binding: &EventSourceBinding) -> bool {
        self.message.is_none_or(|key| key == binding.message_type())
            && self
                .slot
                .as_deref()
                .is_none_or(|name| name == binding.slot())
            && self
                .owner_type
                .is_none_or(|key| key == binding.owner().type_key())
            && self
                .owner
                .as_ref()
                .is_none_or(|owner| owner.same_as(binding.owner()))
            && self.origin.is_none_or(|origin| origin == binding.origin())
    }
}
