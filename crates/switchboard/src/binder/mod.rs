//! Wiring publish slots into a dispatcher.
//!
//! Binding is two-phase. Planning classifies every prefixed slot of an
//! instance and fails without side effects when any slot has an unsupported
//! shape; installing then points each planned slot at the dispatcher.
//!
//! A slot forwards into at most one live bus. Adding an instance whose slot
//! another bus already holds fails with [`BusError::SlotClaimed`], and a
//! binder only ever clears slots that still forward into its own bus.
//! Dropping the binder clears every slot it bound, so slots never outlive
//! their bus in a bound state.

use tracing::{debug, warn};

use crate::discovery::CandidateType;
use crate::dispatcher::WeakDispatcher;
use crate::error::BusError;
use crate::event_source::EventSourceBinding;
use crate::options::BusOptions;
use crate::query::EventSourceQuery;
use crate::slot::Forwarder;
use crate::telemetry::BINDER_TARGET;
use crate::types::{Instance, Origin};

/// Classifies the prefixed slots of `instance` for binding.
///
/// Slots whose names lack the options' event-source prefix are ignored.
///
/// # Errors
///
/// Returns [`BusError::BindingShapeMismatch`] for the first prefixed slot
/// whose signature is not a supported shape.
pub(crate) fn plan(
    instance: &Instance,
    candidate: &CandidateType,
    options: &BusOptions,
    origin: Origin,
) -> Result<Vec<EventSourceBinding>, BusError> {
    candidate
        .extract_slots(instance)
        .into_iter()
        .filter(|open| options.is_event_source_slot(open.descriptor.name()))
        .map(|open| {
            let signature = open.descriptor.signature();
            let shape = signature
                .classify()
                .ok_or_else(|| BusError::BindingShapeMismatch {
                    owner: instance.type_key().name(),
                    slot: open.descriptor.name(),
                    signature: signature.to_string(),
                })?;
            Ok(EventSourceBinding::new(
                instance.clone(),
                open.descriptor.name(),
                signature.message_type(),
                shape,
                origin,
                open.handle,
            ))
        })
        .collect()
}

/// Tracks the slots a bus has bound.
#[derive(Debug)]
pub struct EventSourceBinder {
    dispatcher: WeakDispatcher,
    bindings: Vec<EventSourceBinding>,
}

impl EventSourceBinder {
    /// Creates a binder that forwards slots into `dispatcher`.
    pub(crate) const fn new(dispatcher: WeakDispatcher) -> Self {
        Self {
            dispatcher,
            bindings: Vec::new(),
        }
    }

    /// Fails when any planned slot already forwards into another live bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SlotClaimed`] for the first such slot.
    pub(crate) fn ensure_unclaimed(&self, planned: &[EventSourceBinding]) -> Result<(), BusError> {
        planned
            .iter()
            .find(|binding| binding.handle().is_claimed_elsewhere(&self.dispatcher))
            .map_or(Ok(()), |binding| {
                Err(BusError::SlotClaimed {
                    owner: binding.owner().type_key().name(),
                    slot: binding.slot(),
                })
            })
    }

    /// Points each planned slot at this binder's dispatcher.
    ///
    /// Slots already bound by this binder are skipped, as are slots another
    /// live bus took over since planning. Returns the number of slots newly
    /// bound.
    pub(crate) fn install(&mut self, planned: Vec<EventSourceBinding>) -> usize {
        let mut bound = 0;
        for binding in planned {
            if self
                .bindings
                .iter()
                .any(|existing| existing.same_slot(&binding))
            {
                continue;
            }
            let installed = binding.handle().install(Forwarder::new(
                self.dispatcher.clone(),
                binding.message_type(),
                binding.shape(),
            ));
            if !installed {
                warn!(
                    target: BINDER_TARGET,
                    owner = binding.owner().type_key().name(),
                    slot = binding.slot(),
                    "slot claimed by another bus; skipped"
                );
                continue;
            }
            debug!(
                target: BINDER_TARGET,
                owner = binding.owner().type_key().name(),
                slot = binding.slot(),
                message = binding.message_type().name(),
                shape = ?binding.shape(),
                "slot bound"
            );
            self.bindings.push(binding);
            bound += 1;
        }
        bound
    }

    /// Clears and forgets every binding matching `query`.
    ///
    /// Returns the number of slots unbound.
    pub fn unbind(&mut self, query: &EventSourceQuery) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|binding| {
            if query.matches(binding) {
                binding.handle().release(&self.dispatcher);
                false
            } else {
                true
            }
        });
        before - self.bindings.len()
    }

    /// Returns clones of every binding matching `query`.
    #[must_use]
    pub fn query(&self, query: &EventSourceQuery) -> Vec<EventSourceBinding> {
        self.bindings
            .iter()
            .filter(|binding| query.matches(binding))
            .cloned()
            .collect()
    }

    /// Whether any slot of `owner` is bound.
    #[must_use]
    pub fn binds(&self, owner: &Instance) -> bool {
        self.bindings
            .iter()
            .any(|binding| binding.owner().same_as(owner))
    }

    /// Number of bound slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no slots are bound.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Drop for EventSourceBinder {
    fn drop(&mut self) {
        for binding in &self.bindings {
            binding.handle().release(&self.dispatcher);
        }
    }
}
