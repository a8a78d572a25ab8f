//! Slot bindings: one bound publish slot on an event-source instance.

use crate::slot::{SlotHandle, SlotShape};
use crate::types::{Instance, Origin, TypeKey};

/// Record of a slot the binder has wired into a bus.
///
/// The pair of owner instance and slot name is unique within a binder.
#[derive(Debug, Clone)]
pub struct EventSourceBinding {
    owner: Instance,
    slot: &'static str,
    message: TypeKey,
    shape: SlotShape,
    origin: Origin,
    handle: SlotHandle,
}

impl EventSourceBinding {
    pub(crate) const fn new(
        owner: Instance,
        slot: &'static str,
        message: TypeKey,
        shape: SlotShape,
        origin: Origin,
        handle: SlotHandle,
    ) -> Self {
        Self {
            owner,
            slot,
            message,
            shape,
            origin,
            handle,
        }
    }

    /// Instance that carries the slot.
    #[must_use]
    pub const fn owner(&self) -> &Instance {
        &self.owner
    }

    /// Declared slot name.
    #[must_use]
    pub const fn slot(&self) -> &'static str {
        self.slot
    }

    /// Message type the slot publishes.
    #[must_use]
    pub const fn message_type(&self) -> TypeKey {
        self.message
    }

    /// Delivery shape the slot was classified as.
    #[must_use]
    pub const fn shape(&self) -> SlotShape {
        self.shape
    }

    /// Whether the slot was bound by an add or a configure pass.
    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    /// Whether the slot still forwards into a bus.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.handle.is_bound()
    }

    pub(crate) const fn handle(&self) -> &SlotHandle {
        &self.handle
    }

    /// Whether both records describe the same slot on the same instance.
    pub(crate) fn same_slot(&self, other: &Self) -> bool {
        self.owner.same_as(&other.owner) && self.slot == other.slot
    }
}
