//! Handler registry keyed by message type.
//!
//! Bindings are grouped per message type and kept in registration order
//! within each group. Groups are ordered by [`TypeKey`], so a full query is
//! deterministic for a given process.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::iter::Flatten;

use crate::binding::HandlerBinding;
use crate::query::HandlerQuery;
use crate::types::{Instance, TypeKey};

/// In-memory store of handler bindings.
///
/// The registry is a plain data structure; the bus wraps it in a lock and
/// enforces registration policy before calling [`HandlerRegistry::add`].
///
/// # Example
///
/// ```ignore
/// let mut registry = HandlerRegistry::new();
/// registry.add(binding);
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    groups: BTreeMap<TypeKey, Vec<HandlerBinding>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a binding to the group of its message type.
    pub fn add(&mut self, binding: HandlerBinding) {
        self.groups
            .entry(binding.message_type())
            .or_default()
            .push(binding);
    }

    /// Removes the binding with the same identity as `binding`.
    ///
    /// Returns `true` when a binding was removed. Empty groups are dropped.
    pub fn remove(&mut self, binding: &HandlerBinding) -> bool {
        let message = binding.message_type();
        let Some(group) = self.groups.get_mut(&message) else {
            return false;
        };
        let before = group.len();
        group.retain(|existing| !existing.same_binding(binding));
        let removed = group.len() != before;
        if group.is_empty() {
            self.groups.remove(&message);
        }
        removed
    }

    /// Removes every binding matching `query` and returns how many went.
    pub fn remove_matching(&mut self, query: &HandlerQuery) -> usize {
        let mut removed = 0;
        self.groups.retain(|_, group| {
            let before = group.len();
            group.retain(|binding| !query.matches(binding));
            removed += before - group.len();
            !group.is_empty()
        });
        removed
    }

    /// Returns clones of every binding matching `query`.
    #[must_use]
    pub fn query(&self, query: &HandlerQuery) -> Vec<HandlerBinding> {
        self.iter()
            .filter(|binding| query.matches(binding))
            .cloned()
            .collect()
    }

    /// Iterates over all bindings, grouped by message type.
    pub fn iter(&self) -> Iter<'_> {
        self.groups.values().flatten()
    }

    /// Whether any binding is owned by `owner`.
    #[must_use]
    pub fn owns(&self, owner: &Instance) -> bool {
        self.iter().any(|binding| binding.owner().same_as(owner))
    }

    /// Number of registered bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether no bindings are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Fire-and-forget handlers for `message`, in registration order.
    pub(crate) fn broadcast_targets(&self, message: TypeKey) -> Vec<HandlerBinding> {
        self.groups
            .get(&message)
            .map(|group| {
                group
                    .iter()
                    .filter(|binding| !binding.is_request())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The request handler for `message` producing `response`, if any.
    pub(crate) fn request_target(
        &self,
        message: TypeKey,
        response: TypeKey,
    ) -> Option<HandlerBinding> {
        self.groups
            .get(&message)?
            .iter()
            .find(|binding| binding.response_type() == Some(response))
            .cloned()
    }
}

/// Iterator over registered bindings.
pub type Iter<'a> = Flatten<btree_map::Values<'a, TypeKey, Vec<HandlerBinding>>>;

impl<'a> IntoIterator for &'a HandlerRegistry {
    type Item = &'a HandlerBinding;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
