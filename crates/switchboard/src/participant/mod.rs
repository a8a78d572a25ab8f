//! Participant declarations: which handlers and slots a type exposes.
//!
//! A type joins the bus by implementing [`Participant`]. Its
//! [`Participant::handlers`] hook fills a [`HandlerTable`] with handler
//! methods and its [`Participant::slots`] hook fills a [`SlotTable`] with
//! publish slots. Both hooks run per type, not per instance, so the bus can
//! inspect a type before any instance exists.
//!
//! Handler methods are declared under a method name. Only declarations whose
//! name equals the bus's configured handler method name are registered; the
//! typed [`HandlerTable::event`] and [`HandlerTable::request`] shortcuts
//! declare under [`switchboard_config::defaults::DEFAULT_HANDLER_METHOD_NAME`].

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future;
use switchboard_config::defaults::DEFAULT_HANDLER_METHOD_NAME;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::binding::HandlerBinding;
use crate::error::HandlerError;
use crate::slot::{SlotHandle, SlotKind, SlotSignature};
use crate::types::{
    Callable, ErasedMessage, ErasedResponse, HandlerFuture, Instance, Message, Origin, TypeKey,
};

/// Handles messages of type `M` without producing a response.
///
/// # Example
///
/// ```ignore
/// impl EventHandler<OrderPlaced> for AuditLog {
///     async fn handle(&self, event: OrderPlaced, _: CancellationToken) -> Result<(), HandlerError> {
///         self.record(event);
///         Ok(())
///     }
/// }
/// ```
pub trait EventHandler<M: Message>: Send + Sync {
    /// Processes one message.
    fn handle(
        &self,
        message: M,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send;
}

/// Handles messages of type `M` and produces a response.
pub trait RequestHandler<M: Message>: Send + Sync {
    /// Type returned to the requester.
    type Response: Send + 'static;

    /// Processes one message and produces its response.
    fn handle(
        &self,
        message: M,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Self::Response, HandlerError>> + Send;
}

/// A type that can be added to a bus.
///
/// Both hooks default to declaring nothing, so a pure handler only overrides
/// [`Participant::handlers`] and a pure event source only
/// [`Participant::slots`].
pub trait Participant: Send + Sync + Sized + 'static {
    /// Declares the handler methods of this type.
    fn handlers(table: &mut HandlerTable<Self>) {
        let _ = table;
    }

    /// Declares the publish slots of this type.
    fn slots(table: &mut SlotTable<Self>) {
        let _ = table;
    }
}

/// Shape of a declared handler method, inspectable without an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerMethod {
    name: &'static str,
    message: TypeKey,
    response: Option<TypeKey>,
}

impl HandlerMethod {
    /// Declared method name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Message type the method accepts.
    #[must_use]
    pub const fn message_type(&self) -> TypeKey {
        self.message
    }

    /// Response type, or `None` for a fire-and-forget method.
    #[must_use]
    pub const fn response_type(&self) -> Option<TypeKey> {
        self.response
    }
}

/// Shape of a declared slot, inspectable without an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDescriptor {
    name: &'static str,
    signature: SlotSignature,
}

impl SlotDescriptor {
    /// Declared slot name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Delegate signature of the slot.
    #[must_use]
    pub const fn signature(&self) -> SlotSignature {
        self.signature
    }
}

type Invoke<T> = Arc<dyn Fn(Arc<T>, ErasedMessage, CancellationToken) -> HandlerFuture + Send + Sync>;

struct HandlerDeclaration<T> {
    method: HandlerMethod,
    invoke: Invoke<T>,
}

/// Handler methods declared by a participant type.
pub struct HandlerTable<T> {
    declarations: Vec<HandlerDeclaration<T>>,
}

impl<T: Send + Sync + 'static> HandlerTable<T> {
    pub(crate) const fn new() -> Self {
        Self {
            declarations: Vec::new(),
        }
    }

    /// Declares the [`EventHandler`] implementation for `M`.
    pub fn event<M>(&mut self) -> &mut Self
    where
        M: Message,
        T: EventHandler<M>,
    {
        self.event_with::<M, _, _>(
            DEFAULT_HANDLER_METHOD_NAME,
            |this: Arc<T>, message: M, cancel: CancellationToken| async move {
                <T as EventHandler<M>>::handle(&this, message, cancel).await
            },
        )
    }

    /// Declares the [`RequestHandler`] implementation for `M`.
    pub fn request<M>(&mut self) -> &mut Self
    where
        M: Message,
        T: RequestHandler<M>,
    {
        self.request_with::<M, <T as RequestHandler<M>>::Response, _, _>(
            DEFAULT_HANDLER_METHOD_NAME,
            |this: Arc<T>, message: M, cancel: CancellationToken| async move {
                <T as RequestHandler<M>>::handle(&this, message, cancel).await
            },
        )
    }

    /// Declares a fire-and-forget handler under an explicit method name.
    pub fn event_with<M, F, Fut>(&mut self, method: &'static str, handler: F) -> &mut Self
    where
        M: Message,
        F: Fn(Arc<T>, M, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let invoke = move |owner: Arc<T>, payload: ErasedMessage, cancel: CancellationToken| {
            match decode::<M>(&payload) {
                Ok(message) => handler(owner, message, cancel)
                    .map(|outcome| outcome.map(|()| Box::new(()) as ErasedResponse))
                    .boxed(),
                Err(error) => future::ready(Err(error)).boxed(),
            }
        };
        self.declarations.push(HandlerDeclaration {
            method: HandlerMethod {
                name: method,
                message: TypeKey::of::<M>(),
                response: None,
            },
            invoke: Arc::new(invoke),
        });
        self
    }

    /// Declares a request handler under an explicit method name.
    pub fn request_with<M, R, F, Fut>(&mut self, method: &'static str, handler: F) -> &mut Self
    where
        M: Message,
        R: Send + 'static,
        F: Fn(Arc<T>, M, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    {
        let invoke = move |owner: Arc<T>, payload: ErasedMessage, cancel: CancellationToken| {
            match decode::<M>(&payload) {
                Ok(message) => handler(owner, message, cancel)
                    .map(|outcome| outcome.map(|response| Box::new(response) as ErasedResponse))
                    .boxed(),
                Err(error) => future::ready(Err(error)).boxed(),
            }
        };
        self.declarations.push(HandlerDeclaration {
            method: HandlerMethod {
                name: method,
                message: TypeKey::of::<M>(),
                response: Some(TypeKey::of::<R>()),
            },
            invoke: Arc::new(invoke),
        });
        self
    }

    pub(crate) fn methods(&self) -> Vec<HandlerMethod> {
        self.declarations
            .iter()
            .map(|declaration| declaration.method)
            .collect()
    }

    /// Binds every declaration named `method` to `typed`.
    pub(crate) fn bind(
        &self,
        typed: &Arc<T>,
        owner: &Instance,
        method: &str,
        origin: Origin,
    ) -> Vec<HandlerBinding> {
        self.declarations
            .iter()
            .filter(|declaration| declaration.method.name == method)
            .map(|declaration| {
                let target = Arc::clone(typed);
                let invoke = Arc::clone(&declaration.invoke);
                let callable: Callable =
                    Arc::new(move |payload: ErasedMessage, cancel: CancellationToken| {
                        invoke(Arc::clone(&target), payload, cancel)
                    });
                HandlerBinding::new(
                    declaration.method.message,
                    declaration.method.response,
                    declaration.method.name,
                    owner.clone(),
                    origin,
                    callable,
                )
            })
            .collect()
    }
}

type Accessor<T> = Arc<dyn Fn(&T) -> SlotHandle + Send + Sync>;

struct SlotDeclaration<T> {
    descriptor: SlotDescriptor,
    accessor: Accessor<T>,
}

/// Publish slots declared by a participant type.
pub struct SlotTable<T> {
    declarations: Vec<SlotDeclaration<T>>,
}

/// A slot of a concrete instance, ready for binding.
pub(crate) struct OpenSlot {
    pub(crate) descriptor: SlotDescriptor,
    pub(crate) handle: SlotHandle,
}

impl<T: Send + Sync + 'static> SlotTable<T> {
    pub(crate) const fn new() -> Self {
        Self {
            declarations: Vec::new(),
        }
    }

    /// Declares a slot field under `name`.
    ///
    /// Only slots whose name starts with the bus's event-source prefix are
    /// bound.
    pub fn slot<S, F>(&mut self, name: &'static str, accessor: F) -> &mut Self
    where
        S: SlotKind,
        F: Fn(&T) -> &S + Send + Sync + 'static,
    {
        self.declarations.push(SlotDeclaration {
            descriptor: SlotDescriptor {
                name,
                signature: S::signature(),
            },
            accessor: Arc::new(move |owner: &T| accessor(owner).handle()),
        });
        self
    }

    pub(crate) fn descriptors(&self) -> Vec<SlotDescriptor> {
        self.declarations
            .iter()
            .map(|declaration| declaration.descriptor)
            .collect()
    }

    pub(crate) fn open(&self, typed: &T) -> Vec<OpenSlot> {
        self.declarations
            .iter()
            .map(|declaration| OpenSlot {
                descriptor: declaration.descriptor,
                handle: (declaration.accessor)(typed),
            })
            .collect()
    }
}

/// The erased payload was not of the declared message type.
#[derive(Debug, Error)]
#[error("payload is not a '{expected}'")]
struct PayloadMismatch {
    expected: &'static str,
}

fn decode<M: Message>(payload: &ErasedMessage) -> Result<M, HandlerError> {
    (**payload).downcast_ref::<M>().cloned().ok_or_else(|| {
        Box::new(PayloadMismatch {
            expected: type_name::<M>(),
        }) as HandlerError
    })
}
