//! The message bus facade.
//!
//! [`MessageBus`] owns a handler registry, a slot binder, and the options
//! that drive discovery. Registration takes `&mut self`; sending only needs
//! `&self` or a cloned [`Dispatcher`], so hosts typically finish setup and
//! then share the bus or its dispatcher across tasks.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use switchboard_config::BusSettings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binder::{self, EventSourceBinder};
use crate::binding::{HandlerBinding, find_response_conflict};
use crate::discovery::{
    CandidateType, ConventionClassifier, InstanceProvider, Member, NoContainer, TypeCatalog,
    TypeClassifier,
};
use crate::dispatcher::Dispatcher;
use crate::error::BusError;
use crate::event_source::EventSourceBinding;
use crate::options::BusOptions;
use crate::participant::Participant;
use crate::query::{EventSourceQuery, HandlerQuery};
use crate::registry::HandlerRegistry;
use crate::telemetry::BUS_TARGET;
use crate::types::{Instance, Message, Origin, TypeKey};

/// Outcome of a fully successful configure pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigureReport {
    /// Handler bindings installed by this pass.
    pub handlers: usize,
    /// Slots bound by this pass.
    pub event_sources: usize,
    /// Handler bindings from the previous pass that were dropped.
    pub removed_handlers: usize,
    /// Slots from the previous pass that were unbound.
    pub removed_event_sources: usize,
}

/// In-process publish/dispatch bus.
///
/// # Example
///
/// ```ignore
/// let mut bus = MessageBus::new();
/// bus.add(Arc::new(PriceBook::default()))?;
/// let quote: Quote = bus.request(QuoteRequest::new("ACME"), CancellationToken::new()).await?;
/// ```
pub struct MessageBus {
    registry: Arc<RwLock<HandlerRegistry>>,
    dispatcher: Dispatcher,
    binder: EventSourceBinder,
    options: BusOptions,
    catalog: TypeCatalog,
    classifier: Box<dyn TypeClassifier>,
    provider: Box<dyn InstanceProvider>,
}

impl MessageBus {
    /// Creates an empty bus with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    /// Creates an empty bus with the given options.
    ///
    /// Options take effect for discovery on the first
    /// [`MessageBus::configure`] call; the naming conventions apply to every
    /// add immediately.
    #[must_use]
    pub fn with_options(options: BusOptions) -> Self {
        let registry = Arc::new(RwLock::new(HandlerRegistry::new()));
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        Self {
            binder: EventSourceBinder::new(dispatcher.downgrade()),
            dispatcher,
            registry,
            options,
            catalog: TypeCatalog::new(),
            classifier: Box::new(ConventionClassifier),
            provider: Box::new(NoContainer),
        }
    }

    /// Creates an empty bus whose options come from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &BusSettings) -> Self {
        Self::with_options(BusOptions::from_settings(settings))
    }

    /// Replaces the candidate catalogue used by discovery.
    #[must_use]
    pub fn with_catalog(mut self, catalog: TypeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the classifier used by discovery.
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl TypeClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Replaces the provider consulted for discovered instances.
    #[must_use]
    pub fn with_provider(mut self, provider: impl InstanceProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    /// Registers a participant's handlers and binds its prefixed slots.
    ///
    /// Adding an instance that is already registered is a no-op for the
    /// part already present. Returns the number of handler and slot
    /// bindings created.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DuplicateResponseHandler`],
    /// [`BusError::BindingShapeMismatch`] or [`BusError::SlotClaimed`] when
    /// another bus holds one of the instance's slots; nothing is registered
    /// in any case.
    pub fn add<T: Participant>(&mut self, object: Arc<T>) -> Result<usize, BusError> {
        self.add_member(&Member::new(object))
    }

    /// Registers one pre-described member.
    ///
    /// # Errors
    ///
    /// As for [`MessageBus::add`].
    pub fn add_member(&mut self, member: &Member) -> Result<usize, BusError> {
        self.register(member.instance(), member.candidate(), Origin::Direct)
    }

    /// Registers members in order, stopping at the first failure.
    ///
    /// Members before the failing one stay registered; the failing member
    /// leaves no partial state.
    ///
    /// # Errors
    ///
    /// As for [`MessageBus::add`].
    pub fn add_members<I>(&mut self, members: I) -> Result<usize, BusError>
    where
        I: IntoIterator,
        I::Item: Into<Member>,
    {
        let mut added = 0;
        for member in members {
            added += self.add_member(&member.into())?;
        }
        Ok(added)
    }

    /// Unregisters every handler and unbinds every slot of `instance`.
    ///
    /// Returns the number of bindings removed; unknown instances yield zero.
    pub fn remove(&mut self, instance: &Instance) -> usize {
        let handlers = self.remove_handlers(&HandlerQuery::new().owner(instance.clone()));
        let event_sources =
            self.remove_event_sources(&EventSourceQuery::new().owner(instance.clone()));
        handlers + event_sources
    }

    /// Removes each instance in turn.
    pub fn remove_all<'a>(&mut self, instances: impl IntoIterator<Item = &'a Instance>) -> usize {
        instances
            .into_iter()
            .map(|instance| self.remove(instance))
            .sum()
    }

    /// Unregisters every handler binding matching `query`.
    pub fn remove_handlers(&mut self, query: &HandlerQuery) -> usize {
        let removed = self.write_registry().remove_matching(query);
        debug!(target: BUS_TARGET, removed, "handler bindings removed");
        removed
    }

    /// Unbinds every slot binding matching `query`.
    pub fn remove_event_sources(&mut self, query: &EventSourceQuery) -> usize {
        let removed = self.binder.unbind(query);
        debug!(target: BUS_TARGET, removed, "slot bindings removed");
        removed
    }

    /// Handler bindings matching `query`, grouped by message type.
    #[must_use]
    pub fn handlers(&self, query: &HandlerQuery) -> Vec<HandlerBinding> {
        self.read_registry().query(query)
    }

    /// Slot bindings matching `query`, in binding order.
    #[must_use]
    pub fn event_sources(&self, query: &EventSourceQuery) -> Vec<EventSourceBinding> {
        self.binder.query(query)
    }

    /// Current options.
    #[must_use]
    pub const fn options(&self) -> &BusOptions {
        &self.options
    }

    /// A dispatcher sharing this bus's registry.
    ///
    /// The dispatcher keeps the registry alive on its own; slots bound by
    /// this bus do not.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Broadcasts `message` to every fire-and-forget handler.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::broadcast`].
    pub async fn send<M: Message>(
        &self,
        message: M,
        cancel: CancellationToken,
    ) -> Result<(), BusError> {
        self.dispatcher.broadcast(message, cancel).await
    }

    /// Sends `message` to the request handler producing `R`.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::request`].
    pub async fn request<M: Message, R: Send + 'static>(
        &self,
        message: M,
        cancel: CancellationToken,
    ) -> Result<R, BusError> {
        self.dispatcher.request(message, cancel).await
    }

    /// Updates the options and re-runs discovery.
    ///
    /// Candidate types come from the catalogue when
    /// [`BusOptions::discover`] is set and from the explicit type lists
    /// otherwise. All new bindings are staged first; the previous pass's
    /// bindings are then replaced in one step. Direct registrations are
    /// never removed.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Configure`] listing the candidate types that
    /// failed. Every other type is still applied.
    pub fn configure(
        &mut self,
        update: impl FnOnce(&mut BusOptions),
    ) -> Result<ConfigureReport, BusError> {
        update(&mut self.options);
        let handler_types = self.handler_candidates();
        let event_source_types = self.event_source_candidates();
        let direct = DirectRegistrations::capture(&self.read_registry(), &self.binder);

        let mut stage = Stage::default();
        for candidate in &handler_types {
            if let Err(error) = self.stage_handlers(candidate, &direct, &mut stage) {
                stage.reject(candidate, error);
            }
        }
        for candidate in &event_source_types {
            if let Err(error) = self.stage_event_source(candidate, &direct, &mut stage) {
                stage.reject(candidate, error);
            }
        }

        let Stage {
            handlers,
            event_sources,
            failures,
            ..
        } = stage;
        let (removed_handlers, handler_count) = {
            let mut registry = self.write_registry();
            let removed = registry
                .remove_matching(&HandlerQuery::new().origin(Origin::Discovered));
            let added = handlers.len();
            for binding in handlers {
                registry.add(binding);
            }
            (removed, added)
        };
        let removed_event_sources = self
            .binder
            .unbind(&EventSourceQuery::new().origin(Origin::Discovered));
        let event_source_count = self
            .binder
            .install(event_sources);

        info!(
            target: BUS_TARGET,
            handlers = handler_count,
            event_sources = event_source_count,
            removed_handlers,
            removed_event_sources,
            failed = failures.len(),
            "configure applied"
        );
        if failures.is_empty() {
            Ok(ConfigureReport {
                handlers: handler_count,
                event_sources: event_source_count,
                removed_handlers,
                removed_event_sources,
            })
        } else {
            Err(BusError::Configure {
                handlers: handler_count,
                event_sources: event_source_count,
                failures,
            })
        }
    }

    fn register(
        &mut self,
        instance: &Instance,
        candidate: &CandidateType,
        origin: Origin,
    ) -> Result<usize, BusError> {
        let event_sources = if self.binder.binds(instance) {
            Vec::new()
        } else {
            binder::plan(instance, candidate, &self.options, origin)?
        };
        self.binder.ensure_unclaimed(&event_sources)?;
        let handlers = {
            let registry = self.read_registry();
            if registry.owns(instance) {
                Vec::new()
            } else {
                let extracted =
                    candidate.extract_handlers(instance, &self.options.handler_method_name, origin);
                ensure_unique_responses(registry.iter(), &extracted)?;
                extracted
            }
        };

        let handler_count = handlers.len();
        {
            let mut registry = self.write_registry();
            for binding in handlers {
                registry.add(binding);
            }
        }
        let event_source_count = self
            .binder
            .install(event_sources);
        debug!(
            target: BUS_TARGET,
            owner = instance.type_key().name(),
            handlers = handler_count,
            event_sources = event_source_count,
            ?origin,
            "participant registered"
        );
        Ok(handler_count + event_source_count)
    }

    fn handler_candidates(&self) -> Vec<CandidateType> {
        if self.options.discover {
            self.catalog
                .iter()
                .filter(|candidate| self.classifier.is_handler(candidate, &self.options))
                .cloned()
                .collect()
        } else {
            self.options.handler_types.clone().unwrap_or_default()
        }
    }

    fn event_source_candidates(&self) -> Vec<CandidateType> {
        if self.options.discover {
            self.catalog
                .iter()
                .filter(|candidate| self.classifier.is_event_source(candidate, &self.options))
                .cloned()
                .collect()
        } else {
            self.options.event_source_types.clone().unwrap_or_default()
        }
    }

    fn stage_handlers(
        &self,
        candidate: &CandidateType,
        direct: &DirectRegistrations,
        stage: &mut Stage,
    ) -> Result<(), BusError> {
        let instance = self.resolve_instance(candidate, direct, stage)?;
        stage.remember(&instance);
        if direct.owns_handlers(&instance) || stage.owns_handlers(&instance) {
            return Ok(());
        }
        let extracted = candidate.extract_handlers(
            &instance,
            &self.options.handler_method_name,
            Origin::Discovered,
        );
        ensure_unique_responses(direct.handlers.iter().chain(&stage.handlers), &extracted)?;
        stage.handlers.extend(extracted);
        Ok(())
    }

    fn stage_event_source(
        &self,
        candidate: &CandidateType,
        direct: &DirectRegistrations,
        stage: &mut Stage,
    ) -> Result<(), BusError> {
        let instance = self.resolve_instance(candidate, direct, stage)?;
        stage.remember(&instance);
        if direct.binds(&instance) || stage.binds(&instance) {
            return Ok(());
        }
        let planned = binder::plan(
            &instance,
            candidate,
            &self.options,
            Origin::Discovered,
        )?;
        self.binder.ensure_unclaimed(&planned)?;
        stage.event_sources.extend(planned);
        Ok(())
    }

    /// Finds or creates the instance a discovered type binds to.
    ///
    /// Lookup order: an instance staged earlier in this pass, then a direct
    /// registration of the same type, then the provider, then the type's own
    /// constructor.
    fn resolve_instance(
        &self,
        candidate: &CandidateType,
        direct: &DirectRegistrations,
        stage: &Stage,
    ) -> Result<Instance, BusError> {
        let type_key = candidate.type_key();
        if let Some(existing) = stage
            .instance_of(type_key)
            .or_else(|| direct.instance_of(type_key))
        {
            return Ok(existing);
        }
        match self.provider.provide(candidate) {
            Ok(Some(provided)) if provided.type_key() == type_key => return Ok(provided),
            Ok(Some(provided)) => {
                return Err(BusError::instance_creation(
                    type_key,
                    format!("provider returned a '{}'", provided.type_key()),
                    None,
                ));
            }
            Ok(None) => {}
            Err(source) => {
                return Err(BusError::instance_creation(
                    type_key,
                    "provider failed",
                    Some(source),
                ));
            }
        }
        candidate.construct().ok_or_else(|| {
            BusError::instance_creation(
                type_key,
                "no provider registration and no default constructor",
                None,
            )
        })
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, HandlerRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, HandlerRegistry> {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("handlers", &self.read_registry().len())
            .field("event_sources", &self.binder.len())
            .field("options", &self.options)
            .field("catalog", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

/// Rejects any request handler in `additions` that duplicates one in
/// `existing` or an earlier addition.
fn ensure_unique_responses<'a>(
    existing: impl Iterator<Item = &'a HandlerBinding> + Clone,
    additions: &'a [HandlerBinding],
) -> Result<(), BusError> {
    for (index, candidate) in additions.iter().enumerate() {
        let earlier = additions.get(..index).unwrap_or_default();
        if let Some(conflict) = find_response_conflict(existing.clone().chain(earlier), candidate) {
            return Err(BusError::DuplicateResponseHandler {
                message: candidate.message_type().name(),
                response: candidate.response_type().map_or("", |key| key.name()),
                owner: candidate.owner().type_key().name(),
                existing_owner: conflict.owner().type_key().name(),
            });
        }
    }
    Ok(())
}

/// Direct registrations captured before a configure pass.
struct DirectRegistrations {
    handlers: Vec<HandlerBinding>,
    event_sources: Vec<EventSourceBinding>,
}

impl DirectRegistrations {
    fn capture(registry: &HandlerRegistry, binder: &EventSourceBinder) -> Self {
        Self {
            handlers: registry.query(&HandlerQuery::new().origin(Origin::Direct)),
            event_sources: binder.query(&EventSourceQuery::new().origin(Origin::Direct)),
        }
    }

    fn instance_of(&self, type_key: TypeKey) -> Option<Instance> {
        self.handlers
            .iter()
            .map(HandlerBinding::owner)
            .chain(self.event_sources.iter().map(EventSourceBinding::owner))
            .find(|owner| owner.type_key() == type_key)
            .cloned()
    }

    fn owns_handlers(&self, instance: &Instance) -> bool {
        self.handlers
            .iter()
            .any(|binding| binding.owner().same_as(instance))
    }

    fn binds(&self, instance: &Instance) -> bool {
        self.event_sources
            .iter()
            .any(|binding| binding.owner().same_as(instance))
    }
}

/// Bindings staged by a configure pass before they are applied.
#[derive(Default)]
struct Stage {
    instances: Vec<Instance>,
    handlers: Vec<HandlerBinding>,
    event_sources: Vec<EventSourceBinding>,
    failures: Vec<BusError>,
}

impl Stage {
    fn remember(&mut self, instance: &Instance) {
        if !self
            .instances
            .iter()
            .any(|known| known.same_as(instance))
        {
            self.instances.push(instance.clone());
        }
    }

    fn instance_of(&self, type_key: TypeKey) -> Option<Instance> {
        self.instances
            .iter()
            .find(|instance| instance.type_key() == type_key)
            .cloned()
    }

    fn owns_handlers(&self, instance: &Instance) -> bool {
        self.handlers
            .iter()
            .any(|binding| binding.owner().same_as(instance))
    }

    fn binds(&self, instance: &Instance) -> bool {
        self.event_sources
            .iter()
            .any(|binding| binding.owner().same_as(instance))
    }

    fn reject(&mut self, candidate: &CandidateType, error: BusError) {
        warn!(
            target: BUS_TARGET,
            candidate = candidate.name(),
            %error,
            "candidate type skipped"
        );
        self.failures.push(error);
    }
}
