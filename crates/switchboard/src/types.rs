//! Runtime type identity and instance handles.
//!
//! The bus routes on types chosen at run time, so message, response, and
//! owner types are carried as [`TypeKey`] values and participant objects as
//! type-erased [`Instance`] handles.

use std::any::{Any, TypeId, type_name};
use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;

/// Marker for values that can travel over the bus.
///
/// Messages are shared between every handler of a broadcast, so each
/// handler receives its own clone.
pub trait Message: Any + Clone + Send + Sync {}

impl<T: Any + Clone + Send + Sync> Message for T {}

/// A message after its static type has been erased.
pub(crate) type ErasedMessage = Arc<dyn Any + Send + Sync>;

/// A handler response after its static type has been erased.
pub(crate) type ErasedResponse = Box<dyn Any + Send>;

/// Future returned by an erased handler invocation.
pub(crate) type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<ErasedResponse, HandlerError>> + Send + 'static>>;

/// Erased handler entry point bound to its owning instance.
pub(crate) type Callable =
    Arc<dyn Fn(ErasedMessage, CancellationToken) -> HandlerFuture + Send + Sync>;

/// Runtime identity of a type together with its name.
///
/// Equality, ordering, and hashing consider the [`TypeId`] only; the name is
/// carried for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Underlying type identifier.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for TypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Shared, type-erased handle to a participant object.
///
/// Two handles are the same instance when they point at the same
/// allocation; the bus uses this identity for deduplication and removal.
///
/// # Example
///
/// ```ignore
/// let handler = Arc::new(AuditLog::default());
/// let instance = Instance::of(&handler);
/// assert!(instance.refers_to(&handler));
/// ```
#[derive(Clone)]
pub struct Instance {
    object: Arc<dyn Any + Send + Sync>,
    type_key: TypeKey,
}

impl Instance {
    /// Wraps a shared object.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self {
            type_key: TypeKey::of::<T>(),
            object,
        }
    }

    /// Wraps a clone of a shared object without consuming it.
    #[must_use]
    pub fn of<T: Any + Send + Sync>(object: &Arc<T>) -> Self {
        Self::new(Arc::clone(object))
    }

    /// Concrete type of the wrapped object.
    #[must_use]
    pub const fn type_key(&self) -> TypeKey {
        self.type_key
    }

    /// Whether both handles point at the same object.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.object), Arc::as_ptr(&other.object))
    }

    /// Whether this handle points at `object`.
    #[must_use]
    pub fn refers_to<T: Any + Send + Sync>(&self, object: &Arc<T>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.object), Arc::as_ptr(object))
    }

    /// Recovers the typed object, if `T` is its concrete type.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.object).downcast::<T>().ok()
    }
}

impl<T: Any + Send + Sync> From<Arc<T>> for Instance {
    fn from(object: Arc<T>) -> Self {
        Self::new(object)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_key)
            .field("address", &Arc::as_ptr(&self.object).cast::<()>())
            .finish()
    }
}

/// How a binding entered the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Registered through an explicit add.
    Direct,
    /// Produced by a configure pass; replaced by the next one.
    Discovered,
}
