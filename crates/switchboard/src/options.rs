//! Options read by [`crate::MessageBus::configure`].

use std::fmt;
use std::sync::Arc;

use switchboard_config::BusSettings;

use crate::discovery::CandidateType;

/// Predicate applied to candidate types during discovery.
///
/// Handler and event-source roles carry separate filters, so a hybrid type
/// can be admitted for one role and excluded from the other.
pub type TypeFilter = Arc<dyn Fn(&CandidateType) -> bool + Send + Sync>;

/// Discovery and naming options for a bus.
///
/// Options are plain data; mutate them through
/// [`crate::MessageBus::configure`], which re-runs discovery afterwards.
#[derive(Clone)]
pub struct BusOptions {
    /// Classify candidates from the bus's catalogue instead of using the
    /// explicit type lists.
    pub discover: bool,
    /// Handler types registered when discovery is off.
    pub handler_types: Option<Vec<CandidateType>>,
    /// Event-source types bound when discovery is off.
    pub event_source_types: Option<Vec<CandidateType>>,
    /// Predicate a discovered handler type must satisfy.
    pub handler_filter: Option<TypeFilter>,
    /// Predicate a discovered event-source type must satisfy.
    pub event_source_filter: Option<TypeFilter>,
    /// Prefix a slot name must start with to be bound.
    pub event_source_prefix: String,
    /// Method name under which handlers are extracted.
    pub handler_method_name: String,
}

impl BusOptions {
    /// Builds options from loaded settings.
    ///
    /// Type lists and filters are code-level concerns and start empty.
    #[must_use]
    pub fn from_settings(settings: &BusSettings) -> Self {
        Self {
            discover: settings.discover(),
            handler_types: None,
            event_source_types: None,
            handler_filter: None,
            event_source_filter: None,
            event_source_prefix: settings.event_source_prefix().to_owned(),
            handler_method_name: settings.handler_method_name().to_owned(),
        }
    }

    /// Installs the filter applied to discovered handler types.
    pub fn set_handler_filter(
        &mut self,
        filter: impl Fn(&CandidateType) -> bool + Send + Sync + 'static,
    ) {
        self.handler_filter = Some(Arc::new(filter));
    }

    /// Installs the filter applied to discovered event-source types.
    pub fn set_event_source_filter(
        &mut self,
        filter: impl Fn(&CandidateType) -> bool + Send + Sync + 'static,
    ) {
        self.event_source_filter = Some(Arc::new(filter));
    }

    /// Whether the handler filter, if any, admits `candidate`.
    #[must_use]
    pub fn admits_handler(&self, candidate: &CandidateType) -> bool {
        admits(self.handler_filter.as_ref(), candidate)
    }

    /// Whether the event-source filter, if any, admits `candidate`.
    #[must_use]
    pub fn admits_event_source(&self, candidate: &CandidateType) -> bool {
        admits(self.event_source_filter.as_ref(), candidate)
    }

    /// Whether `slot` carries the event-source prefix.
    #[must_use]
    pub fn is_event_source_slot(&self, slot: &str) -> bool {
        slot.starts_with(self.event_source_prefix.as_str())
    }
}

fn admits(filter: Option<&TypeFilter>, candidate: &CandidateType) -> bool {
    filter.is_none_or(|accept| accept(candidate))
}

impl Default for BusOptions {
    fn default() -> Self {
        Self::from_settings(&BusSettings::default())
    }
}

impl fmt::Debug for BusOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |types: &Option<Vec<CandidateType>>| {
            types
                .as_ref()
                .map(|list| list.iter().map(CandidateType::name).collect::<Vec<_>>())
        };
        f.debug_struct("BusOptions")
            .field("discover", &self.discover)
            .field("handler_types", &names(&self.handler_types))
            .field("event_source_types", &names(&self.event_source_types))
            .field("handler_filter", &self.handler_filter.is_some())
            .field("event_source_filter", &self.event_source_filter.is_some())
            .field("event_source_prefix", &self.event_source_prefix)
            .field("handler_method_name", &self.handler_method_name)
            .finish()
    }
}
