//! Publish slots: assignable delegate fields on event-source types.
//!
//! A slot starts unbound. When its owner is added to a bus, the binder
//! installs a forwarder that routes invocations into the bus's dispatcher.
//! Three slot kinds cover the supported shapes:
//!
//! - [`EventSlot`]: synchronous, no cancellation, no result. Fire and forget.
//! - [`AsyncEventSlot`]: asynchronous with cancellation, awaits every handler.
//! - [`RequestSlot`]: asynchronous with cancellation, returns one response.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::dispatcher::{WeakDispatcher, downcast_response};
use crate::error::BusError;
use crate::telemetry::BINDER_TARGET;
use crate::types::{ErasedMessage, ErasedResponse, Message, TypeKey};

/// How a bound slot delivers its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotShape {
    /// Broadcast without waiting for handlers to finish.
    FireAndForget,
    /// Broadcast and await every handler.
    Broadcast,
    /// Request one response of the given type.
    Request {
        /// Response type the slot returns.
        response: TypeKey,
    },
}

/// Delegate signature of a slot.
///
/// A signature is supported only when it matches one of the [`SlotShape`]
/// variants; [`SlotSignature::classify`] performs the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSignature {
    message: TypeKey,
    cancellable: bool,
    asynchronous: bool,
    response: Option<TypeKey>,
}

impl SlotSignature {
    /// Synchronous signature taking `message` and returning nothing.
    #[must_use]
    pub const fn new(message: TypeKey) -> Self {
        Self {
            message,
            cancellable: false,
            asynchronous: false,
            response: None,
        }
    }

    /// Adds a cancellation token parameter.
    #[must_use]
    pub const fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// Makes the delegate return a future.
    #[must_use]
    pub const fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    /// Makes the delegate produce `response`.
    #[must_use]
    pub const fn returning(mut self, response: TypeKey) -> Self {
        self.response = Some(response);
        self
    }

    /// Message parameter type.
    #[must_use]
    pub const fn message_type(&self) -> TypeKey {
        self.message
    }

    /// Response type, if the delegate produces one.
    #[must_use]
    pub const fn response_type(&self) -> Option<TypeKey> {
        self.response
    }

    /// Maps the signature onto a supported shape.
    ///
    /// Returns `None` for any combination the bus cannot forward, such as a
    /// synchronous delegate with a result or an asynchronous one without a
    /// cancellation token.
    #[must_use]
    pub const fn classify(&self) -> Option<SlotShape> {
        match (self.cancellable, self.asynchronous, self.response) {
            (false, false, None) => Some(SlotShape::FireAndForget),
            (true, true, None) => Some(SlotShape::Broadcast),
            (true, true, Some(response)) => Some(SlotShape::Request { response }),
            _ => None,
        }
    }
}

impl fmt::Display for SlotSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn({}", self.message)?;
        if self.cancellable {
            f.write_str(", CancellationToken")?;
        }
        f.write_str(")")?;
        match (self.asynchronous, self.response) {
            (false, None) => Ok(()),
            (false, Some(response)) => write!(f, " -> {response}"),
            (true, None) => f.write_str(" -> impl Future<Output = ()>"),
            (true, Some(response)) => write!(f, " -> impl Future<Output = {response}>"),
        }
    }
}

/// Routes slot invocations into a dispatcher.
#[derive(Clone)]
pub(crate) struct Forwarder {
    dispatcher: WeakDispatcher,
    message: TypeKey,
    shape: SlotShape,
}

impl Forwarder {
    pub(crate) const fn new(dispatcher: WeakDispatcher, message: TypeKey, shape: SlotShape) -> Self {
        Self {
            dispatcher,
            message,
            shape,
        }
    }

    /// Whether this forwarder feeds a live bus other than `dispatcher`'s.
    fn serves_other_bus(&self, dispatcher: &WeakDispatcher) -> bool {
        self.dispatcher.is_live() && !self.dispatcher.same_bus(dispatcher)
    }

    /// Forwards a message according to the slot's shape.
    ///
    /// Broadcast shapes resolve to `None`, request shapes to the erased
    /// response.
    pub(crate) fn forward(
        &self,
        payload: ErasedMessage,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Option<ErasedResponse>, BusError>> {
        let message = self.message;
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return future::ready(Err(BusError::BusUnavailable {
                message: message.name(),
            }))
            .boxed();
        };
        match self.shape {
            SlotShape::FireAndForget | SlotShape::Broadcast => async move {
                dispatcher
                    .broadcast_erased(message, payload, cancel)
                    .await
                    .map(|()| None)
            }
            .boxed(),
            SlotShape::Request { response } => async move {
                dispatcher
                    .request_erased(message, response, payload, cancel)
                    .await
                    .map(Some)
            }
            .boxed(),
        }
    }
}

/// Shared binding state behind a slot.
///
/// Clones refer to the same slot, so the binder can install and clear the
/// forwarder while the owner keeps its field.
#[derive(Clone, Default)]
pub struct SlotHandle {
    forwarder: Arc<RwLock<Option<Forwarder>>>,
}

impl SlotHandle {
    /// Creates an unbound handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a bus currently forwards this slot.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.forwarder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Whether both handles refer to the same slot.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.forwarder, &other.forwarder)
    }

    /// Whether another live bus currently forwards this slot.
    pub(crate) fn is_claimed_elsewhere(&self, dispatcher: &WeakDispatcher) -> bool {
        self.forwarder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|current| current.serves_other_bus(dispatcher))
    }

    /// Installs `forwarder` unless another live bus holds the slot.
    ///
    /// Returns whether the forwarder was installed.
    pub(crate) fn install(&self, forwarder: Forwarder) -> bool {
        let mut current = self
            .forwarder
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .is_some_and(|existing| existing.serves_other_bus(&forwarder.dispatcher))
        {
            return false;
        }
        *current = Some(forwarder);
        true
    }

    /// Clears the slot if it still forwards into `dispatcher`'s bus.
    ///
    /// A slot taken over by another bus is left alone.
    pub(crate) fn release(&self, dispatcher: &WeakDispatcher) {
        let mut current = self
            .forwarder
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .is_some_and(|existing| existing.dispatcher.same_bus(dispatcher))
        {
            *current = None;
        }
    }

    pub(crate) fn forwarder(&self) -> Option<Forwarder> {
        self.forwarder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for SlotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotHandle")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// A field type the binder can wire.
///
/// Implemented by the three built-in slot kinds. Custom implementations are
/// accepted by [`crate::SlotTable::slot`] but bind only when their signature
/// classifies into a supported [`SlotShape`].
pub trait SlotKind: Send + Sync {
    /// Delegate signature shared by every value of this type.
    fn signature() -> SlotSignature;

    /// Binding state of this slot value.
    fn handle(&self) -> SlotHandle;
}

/// Fire-and-forget publish slot.
///
/// [`EventSlot::publish`] returns immediately. Delivery runs on the current
/// Tokio runtime when one is available and inline otherwise; failures are
/// logged rather than returned.
pub struct EventSlot<M> {
    handle: SlotHandle,
    _message: PhantomData<fn(M)>,
}

impl<M: Message> EventSlot<M> {
    /// Creates an unbound slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `message` to every fire-and-forget handler.
    ///
    /// Does nothing while the slot is unbound.
    pub fn publish(&self, message: M) {
        let message_type = TypeKey::of::<M>();
        let Some(forwarder) = self.handle.forwarder() else {
            trace!(
                target: BINDER_TARGET,
                message = message_type.name(),
                "publish on unbound slot ignored"
            );
            return;
        };
        let delivery = forwarder.forward(Arc::new(message), CancellationToken::new());
        let report = async move {
            if let Err(error) = delivery.await {
                warn!(
                    target: BINDER_TARGET,
                    message = message_type.name(),
                    %error,
                    "fire-and-forget delivery failed"
                );
            }
        };
        match Handle::try_current() {
            Ok(runtime) => drop(runtime.spawn(report)),
            Err(_) => futures::executor::block_on(report),
        }
    }

    /// Whether a bus currently forwards this slot.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.handle.is_bound()
    }
}

/// Awaitable broadcast slot.
pub struct AsyncEventSlot<M> {
    handle: SlotHandle,
    _message: PhantomData<fn(M)>,
}

impl<M: Message> AsyncEventSlot<M> {
    /// Creates an unbound slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `message` and waits for every fire-and-forget handler.
    ///
    /// Resolves immediately while the slot is unbound.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Broadcast`] when any handler fails and
    /// [`BusError::BusUnavailable`] when the bound bus has been dropped.
    pub async fn publish(&self, message: M, cancel: CancellationToken) -> Result<(), BusError> {
        let Some(forwarder) = self.handle.forwarder() else {
            return Ok(());
        };
        forwarder.forward(Arc::new(message), cancel).await.map(drop)
    }

    /// Whether a bus currently forwards this slot.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.handle.is_bound()
    }
}

/// Request slot returning one response.
pub struct RequestSlot<M, R> {
    handle: SlotHandle,
    _message: PhantomData<fn(M) -> R>,
}

impl<M: Message, R: Send + 'static> RequestSlot<M, R> {
    /// Creates an unbound slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `message` to the request handler returning `R`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SlotUnbound`] while the slot is unbound, and
    /// otherwise any error of [`crate::MessageBus::request`].
    pub async fn request(&self, message: M, cancel: CancellationToken) -> Result<R, BusError> {
        let message_type = TypeKey::of::<M>();
        let response_type = TypeKey::of::<R>();
        let forwarder = self
            .handle
            .forwarder()
            .ok_or_else(|| BusError::slot_unbound(message_type, response_type))?;
        let response = forwarder
            .forward(Arc::new(message), cancel)
            .await?
            .ok_or_else(|| BusError::response_mismatch(message_type, response_type))?;
        downcast_response::<R>(message_type, response)
    }

    /// Whether a bus currently forwards this slot.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.handle.is_bound()
    }
}

impl<M> Default for EventSlot<M> {
    fn default() -> Self {
        Self {
            handle: SlotHandle::new(),
            _message: PhantomData,
        }
    }
}

impl<M> Default for AsyncEventSlot<M> {
    fn default() -> Self {
        Self {
            handle: SlotHandle::new(),
            _message: PhantomData,
        }
    }
}

impl<M, R> Default for RequestSlot<M, R> {
    fn default() -> Self {
        Self {
            handle: SlotHandle::new(),
            _message: PhantomData,
        }
    }
}

impl<M: Message> SlotKind for EventSlot<M> {
    fn signature() -> SlotSignature {
        SlotSignature::new(TypeKey::of::<M>())
    }

    fn handle(&self) -> SlotHandle {
        self.handle.clone()
    }
}

impl<M: Message> SlotKind for AsyncEventSlot<M> {
    fn signature() -> SlotSignature {
        SlotSignature::new(TypeKey::of::<M>())
            .cancellable()
            .asynchronous()
    }

    fn handle(&self) -> SlotHandle {
        self.handle.clone()
    }
}

impl<M: Message, R: Send + 'static> SlotKind for RequestSlot<M, R> {
    fn signature() -> SlotSignature {
        SlotSignature::new(TypeKey::of::<M>())
            .cancellable()
            .asynchronous()
            .returning(TypeKey::of::<R>())
    }

    fn handle(&self) -> SlotHandle {
        self.handle.clone()
    }
}

impl<M> fmt::Debug for EventSlot<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventSlot").field(&self.handle).finish()
    }
}

impl<M> fmt::Debug for AsyncEventSlot<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AsyncEventSlot").field(&self.handle).finish()
    }
}

impl<M, R> fmt::Debug for RequestSlot<M, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestSlot").field(&self.handle).finish()
    }
}

#[cfg(test)]
mod tests;
