//! Message dispatch over a shared handler registry.
//!
//! The dispatcher snapshots matching bindings under a read lock and invokes
//! them after releasing it, so handlers may run for as long as they like
//! without blocking registration. A broadcast spawns one task per target on
//! the current Tokio runtime, so handlers run in parallel up to the
//! runtime's worker count, and waits for all of them. Without a runtime the
//! targets are polled together on the calling thread. A request routes to
//! exactly one handler.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::binding::HandlerBinding;
use crate::error::{BusError, HandlerPanic};
use crate::registry::HandlerRegistry;
use crate::telemetry::DISPATCH_TARGET;
use crate::types::{ErasedMessage, ErasedResponse, Message, TypeKey};

/// Cloneable entry point for sending messages.
///
/// Every clone reads the same registry, so registrations made through the
/// owning [`crate::MessageBus`] are visible to sends already in flight on
/// other tasks from their next snapshot onwards.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<RwLock<HandlerRegistry>>,
}

/// Non-owning reference held by bound slots.
#[derive(Clone, Debug)]
pub(crate) struct WeakDispatcher {
    registry: Weak<RwLock<HandlerRegistry>>,
}

impl WeakDispatcher {
    pub(crate) fn upgrade(&self) -> Option<Dispatcher> {
        self.registry
            .upgrade()
            .map(|registry| Dispatcher { registry })
    }

    /// Whether both references lead to the same registry.
    pub(crate) fn same_bus(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.registry, &other.registry)
    }

    /// Whether the registry is still alive.
    pub(crate) fn is_live(&self) -> bool {
        self.registry.strong_count() > 0
    }
}

impl Dispatcher {
    pub(crate) const fn new(registry: Arc<RwLock<HandlerRegistry>>) -> Self {
        Self { registry }
    }

    pub(crate) fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers `message` to every fire-and-forget handler registered for
    /// its type and waits for all of them.
    ///
    /// Completes immediately when no handler is registered. The token is
    /// passed to each handler unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Broadcast`] when any handler fails or panics.
    /// Every handler is still invoked.
    pub async fn broadcast<M: Message>(
        &self,
        message: M,
        cancel: CancellationToken,
    ) -> Result<(), BusError> {
        self.broadcast_erased(TypeKey::of::<M>(), Arc::new(message), cancel)
            .await
    }

    /// Delivers `message` to the request handler producing `R`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::HandlerNotFound`] when no handler matches,
    /// [`BusError::HandlerInvocation`] when the handler fails or panics, and
    /// [`BusError::ResponseMismatch`] when the response is not an `R`.
    pub async fn request<M: Message, R: Send + 'static>(
        &self,
        message: M,
        cancel: CancellationToken,
    ) -> Result<R, BusError> {
        let message_type = TypeKey::of::<M>();
        let response = self
            .request_erased(message_type, TypeKey::of::<R>(), Arc::new(message), cancel)
            .await?;
        downcast_response::<R>(message_type, response)
    }

    pub(crate) async fn broadcast_erased(
        &self,
        message: TypeKey,
        payload: ErasedMessage,
        cancel: CancellationToken,
    ) -> Result<(), BusError> {
        let targets = self.snapshot(|registry| registry.broadcast_targets(message));
        if targets.is_empty() {
            trace!(
                target: DISPATCH_TARGET,
                message = message.name(),
                "broadcast has no subscribers"
            );
            return Ok(());
        }

        let invoked = targets.len();
        debug!(
            target: DISPATCH_TARGET,
            message = message.name(),
            handlers = invoked,
            "broadcasting"
        );
        let runtime = Handle::try_current().ok();
        let outcomes = join_all(targets.into_iter().map(|binding| {
            run_target(runtime.as_ref(), binding, Arc::clone(&payload), cancel.clone())
        }))
        .await;

        let failures: Vec<BusError> = outcomes.into_iter().filter_map(Result::err).collect();
        BusError::broadcast(message, invoked, failures).map_or(Ok(()), Err)
    }

    pub(crate) async fn request_erased(
        &self,
        message: TypeKey,
        response: TypeKey,
        payload: ErasedMessage,
        cancel: CancellationToken,
    ) -> Result<ErasedResponse, BusError> {
        let target = self
            .snapshot(|registry| registry.request_target(message, response))
            .ok_or_else(|| BusError::handler_not_found(message, response))?;
        debug!(
            target: DISPATCH_TARGET,
            message = message.name(),
            response = response.name(),
            owner = target.owner().type_key().name(),
            "dispatching request"
        );
        invoke(&target, payload, cancel).await
    }

    fn snapshot<T>(&self, read: impl FnOnce(&HandlerRegistry) -> T) -> T {
        let registry = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        read(&registry)
    }
}

/// Invokes one binding, converting failures and panics into bus errors.
fn invoke(
    binding: &HandlerBinding,
    payload: ErasedMessage,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<ErasedResponse, BusError>> {
    let message = binding.message_type();
    let owner = binding.owner().type_key();
    let started = panic::catch_unwind(AssertUnwindSafe(|| (binding.callable())(payload, cancel)));
    async move {
        let running = started.map_err(|unwind| panicked(message, owner, unwind.as_ref()))?;
        match AssertUnwindSafe(running).catch_unwind().await {
            Ok(outcome) => outcome.map_err(|source| BusError::invocation(message, owner, source)),
            Err(unwind) => Err(panicked(message, owner, unwind.as_ref())),
        }
    }
    .boxed()
}

/// Runs one broadcast target on its own task when a runtime is available.
///
/// Without a runtime the invocation is returned for inline polling.
fn run_target(
    runtime: Option<&Handle>,
    binding: HandlerBinding,
    payload: ErasedMessage,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<ErasedResponse, BusError>> {
    let Some(runtime) = runtime else {
        return invoke(&binding, payload, cancel);
    };
    let message = binding.message_type();
    let owner = binding.owner().type_key();
    let task = runtime.spawn(async move { invoke(&binding, payload, cancel).await });
    async move {
        task.await
            .unwrap_or_else(|error| Err(task_failed(message, owner, error)))
    }
    .boxed()
}

fn panicked(message: TypeKey, owner: TypeKey, payload: &(dyn Any + Send)) -> BusError {
    BusError::invocation(message, owner, HandlerPanic::from_payload(payload))
}

/// Maps a broadcast task that did not complete onto a bus error.
fn task_failed(message: TypeKey, owner: TypeKey, error: JoinError) -> BusError {
    match error.try_into_panic() {
        Ok(unwind) => panicked(message, owner, unwind.as_ref()),
        Err(cancelled) => BusError::invocation(message, owner, cancelled),
    }
}

/// Recovers a typed response from an erased one.
pub(crate) fn downcast_response<R: 'static>(
    message: TypeKey,
    response: ErasedResponse,
) -> Result<R, BusError> {
    response
        .downcast::<R>()
        .map(|typed| *typed)
        .map_err(|_| BusError::response_mismatch(message, TypeKey::of::<R>()))
}
