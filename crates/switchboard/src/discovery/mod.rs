//! Candidate types, classification, and instance resolution.
//!
//! Discovery works over an explicit [`TypeCatalog`] of candidate types
//! rather than scanning loaded code. A [`TypeClassifier`] decides which
//! candidates are handlers or event sources, and an [`InstanceProvider`]
//! supplies instances for them before the bus falls back to a candidate's
//! own constructor.

use std::fmt;
use std::sync::Arc;

use crate::binding::HandlerBinding;
use crate::error::HandlerError;
use crate::options::BusOptions;
use crate::participant::{
    HandlerMethod, HandlerTable, OpenSlot, Participant, SlotDescriptor, SlotTable,
};
use crate::types::{Instance, Origin, TypeKey};

type ExtractHandlers = Arc<dyn Fn(&Instance, &str, Origin) -> Vec<HandlerBinding> + Send + Sync>;
type ExtractSlots = Arc<dyn Fn(&Instance) -> Vec<OpenSlot> + Send + Sync>;
type Construct = Arc<dyn Fn() -> Instance + Send + Sync>;

/// A participant type the bus can inspect and instantiate at run time.
///
/// # Example
///
/// ```ignore
/// let catalog = TypeCatalog::new()
///     .with(CandidateType::constructible::<AuditLog>())
///     .with(CandidateType::of::<OrderDesk>());
/// ```
#[derive(Clone)]
pub struct CandidateType {
    type_key: TypeKey,
    methods: Vec<HandlerMethod>,
    slots: Vec<SlotDescriptor>,
    extract_handlers: ExtractHandlers,
    extract_slots: ExtractSlots,
    construct: Option<Construct>,
}

impl CandidateType {
    /// Describes `T` without a way to construct it.
    ///
    /// Instances must then come from the bus's [`InstanceProvider`] or from
    /// a direct registration of the same type.
    #[must_use]
    pub fn of<T: Participant>() -> Self {
        let mut handler_table = HandlerTable::<T>::new();
        T::handlers(&mut handler_table);
        let mut slot_table = SlotTable::<T>::new();
        T::slots(&mut slot_table);

        let methods = handler_table.methods();
        let descriptors = slot_table.descriptors();
        let handlers = Arc::new(handler_table);
        let slots = Arc::new(slot_table);

        Self {
            type_key: TypeKey::of::<T>(),
            methods,
            slots: descriptors,
            extract_handlers: Arc::new(move |instance: &Instance, method: &str, origin: Origin| {
                instance
                    .downcast::<T>()
                    .map(|typed| handlers.bind(&typed, instance, method, origin))
                    .unwrap_or_default()
            }),
            extract_slots: Arc::new(move |instance: &Instance| {
                instance
                    .downcast::<T>()
                    .map(|typed| slots.open(&typed))
                    .unwrap_or_default()
            }),
            construct: None,
        }
    }

    /// Describes `T` and constructs instances through [`Default`].
    #[must_use]
    pub fn constructible<T: Participant + Default>() -> Self {
        Self {
            construct: Some(Arc::new(|| Instance::new(Arc::new(T::default())))),
            ..Self::of::<T>()
        }
    }

    /// Runtime identity of the type.
    #[must_use]
    pub const fn type_key(&self) -> TypeKey {
        self.type_key
    }

    /// Fully qualified type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.type_key.name()
    }

    /// Handler methods the type declares, under any method name.
    #[must_use]
    pub fn handler_methods(&self) -> &[HandlerMethod] {
        &self.methods
    }

    /// Slots the type declares, under any name.
    #[must_use]
    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    /// Whether the type can construct its own instances.
    #[must_use]
    pub const fn is_constructible(&self) -> bool {
        self.construct.is_some()
    }

    /// Whether any handler method is declared under `name`.
    #[must_use]
    pub fn declares_method(&self, name: &str) -> bool {
        self.methods.iter().any(|method| method.name() == name)
    }

    pub(crate) fn extract_handlers(
        &self,
        instance: &Instance,
        method: &str,
        origin: Origin,
    ) -> Vec<HandlerBinding> {
        (self.extract_handlers)(instance, method, origin)
    }

    pub(crate) fn extract_slots(&self, instance: &Instance) -> Vec<OpenSlot> {
        (self.extract_slots)(instance)
    }

    pub(crate) fn construct(&self) -> Option<Instance> {
        self.construct.as_ref().map(|construct| construct())
    }
}

impl fmt::Debug for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateType")
            .field("type", &self.type_key)
            .field("methods", &self.methods)
            .field("slots", &self.slots)
            .field("constructible", &self.is_constructible())
            .finish_non_exhaustive()
    }
}

/// An instance paired with the description of its type.
///
/// Members are what [`crate::MessageBus::add_members`] registers; they let a
/// heterogeneous batch travel as one collection.
#[derive(Debug, Clone)]
pub struct Member {
    instance: Instance,
    candidate: CandidateType,
}

impl Member {
    /// Wraps a shared participant.
    #[must_use]
    pub fn new<T: Participant>(object: Arc<T>) -> Self {
        Self {
            instance: Instance::new(object),
            candidate: CandidateType::of::<T>(),
        }
    }

    /// Instance being registered.
    #[must_use]
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Description of the instance's type.
    #[must_use]
    pub const fn candidate(&self) -> &CandidateType {
        &self.candidate
    }
}

impl<T: Participant> From<Arc<T>> for Member {
    fn from(object: Arc<T>) -> Self {
        Self::new(object)
    }
}

/// Ordered collection of candidate types available to discovery.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    candidates: Vec<CandidateType>,
}

impl TypeCatalog {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the catalogue with `candidate` appended.
    #[must_use]
    pub fn with(mut self, candidate: CandidateType) -> Self {
        self.push(candidate);
        self
    }

    /// Appends `candidate` unless its type is already listed.
    pub fn push(&mut self, candidate: CandidateType) {
        if self.find(candidate.type_key()).is_none() {
            self.candidates.push(candidate);
        }
    }

    /// Looks up a candidate by type.
    #[must_use]
    pub fn find(&self, type_key: TypeKey) -> Option<&CandidateType> {
        self.candidates
            .iter()
            .find(|candidate| candidate.type_key() == type_key)
    }

    /// Iterates over candidates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, CandidateType> {
        self.candidates.iter()
    }

    /// Number of candidates.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the catalogue is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl FromIterator<CandidateType> for TypeCatalog {
    fn from_iter<I: IntoIterator<Item = CandidateType>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for candidate in iter {
            catalog.push(candidate);
        }
        catalog
    }
}

impl<'a> IntoIterator for &'a TypeCatalog {
    type Item = &'a CandidateType;
    type IntoIter = std::slice::Iter<'a, CandidateType>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Decides which discovered candidates take part in a configure pass.
pub trait TypeClassifier: Send + Sync {
    /// Whether `candidate` should be registered as a handler type.
    fn is_handler(&self, candidate: &CandidateType, options: &BusOptions) -> bool;

    /// Whether `candidate` should be bound as an event source.
    fn is_event_source(&self, candidate: &CandidateType, options: &BusOptions) -> bool;
}

/// Classifies by naming convention.
///
/// A handler type declares at least one method under the configured handler
/// method name; an event source declares at least one slot carrying the
/// configured prefix. Each role must also pass its own filter from the
/// options.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConventionClassifier;

impl TypeClassifier for ConventionClassifier {
    fn is_handler(&self, candidate: &CandidateType, options: &BusOptions) -> bool {
        candidate.declares_method(&options.handler_method_name) && options.admits_handler(candidate)
    }

    fn is_event_source(&self, candidate: &CandidateType, options: &BusOptions) -> bool {
        candidate
            .slots()
            .iter()
            .any(|slot| options.is_event_source_slot(slot.name()))
            && options.admits_event_source(candidate)
    }
}

/// Supplies instances for discovered types.
///
/// Returning `Ok(None)` defers to the candidate's own constructor.
pub trait InstanceProvider: Send + Sync {
    /// Resolves an instance of `candidate`'s type.
    ///
    /// # Errors
    ///
    /// Any error is reported as a creation failure for that type only.
    fn provide(&self, candidate: &CandidateType) -> Result<Option<Instance>, HandlerError>;
}

/// Provider with no registrations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContainer;

impl InstanceProvider for NoContainer {
    fn provide(&self, _candidate: &CandidateType) -> Result<Option<Instance>, HandlerError> {
        Ok(None)
    }
}
