//! In-process publish/dispatch message bus.
//!
//! The `switchboard` crate routes typed messages between participants that
//! share a process. Handlers register for a message type and are invoked when
//! a message of that type is sent; event sources expose publish slots that
//! the bus wires into its dispatcher, so publishing through a slot reaches
//! the handlers without the source knowing who they are.
//!
//! # Architecture
//!
//! - [`HandlerRegistry`] stores [`HandlerBinding`] records grouped by message
//!   type.
//! - [`Dispatcher`] delivers messages: a broadcast reaches every
//!   fire-and-forget handler concurrently, a request reaches the single
//!   handler producing the requested response type.
//! - [`EventSourceBinder`] points publish slots ([`EventSlot`],
//!   [`AsyncEventSlot`], [`RequestSlot`]) at the dispatcher and clears them
//!   when the bus is dropped.
//! - [`MessageBus`] ties these together and runs discovery over a
//!   [`TypeCatalog`] when [`MessageBus::configure`] is called.
//!
//! Types take part by implementing [`Participant`], declaring their handler
//! methods and slots in per-type tables.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use switchboard::{
//!     CancellationToken, HandlerError, HandlerTable, MessageBus, Participant, RequestHandler,
//! };
//!
//! #[derive(Clone)]
//! struct QuoteRequest(String);
//!
//! #[derive(Default)]
//! struct PriceBook;
//!
//! impl RequestHandler<QuoteRequest> for PriceBook {
//!     type Response = u64;
//!
//!     async fn handle(&self, _: QuoteRequest, _: CancellationToken) -> Result<u64, HandlerError> {
//!         Ok(42)
//!     }
//! }
//!
//! impl Participant for PriceBook {
//!     fn handlers(table: &mut HandlerTable<Self>) {
//!         table.request::<QuoteRequest>();
//!     }
//! }
//!
//! let mut bus = MessageBus::new();
//! bus.add(Arc::new(PriceBook))?;
//! let price: u64 = bus
//!     .request(QuoteRequest("ACME".into()), CancellationToken::new())
//!     .await?;
//! ```

pub mod binder;
pub mod binding;
pub mod bus;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod event_source;
pub mod options;
pub mod participant;
pub mod query;
pub mod registry;
pub mod slot;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod tests;

pub use self::binder::EventSourceBinder;
pub use self::binding::HandlerBinding;
pub use self::bus::{ConfigureReport, MessageBus};
pub use self::discovery::{
    CandidateType, ConventionClassifier, InstanceProvider, Member, NoContainer, TypeCatalog,
    TypeClassifier,
};
pub use self::dispatcher::Dispatcher;
pub use self::error::{BusError, HandlerError, HandlerPanic};
pub use self::event_source::EventSourceBinding;
pub use self::options::{BusOptions, TypeFilter};
pub use self::participant::{
    EventHandler, HandlerMethod, HandlerTable, Participant, RequestHandler, SlotDescriptor,
    SlotTable,
};
pub use self::query::{EventSourceQuery, HandlerQuery};
pub use self::registry::HandlerRegistry;
pub use self::slot::{
    AsyncEventSlot, EventSlot, RequestSlot, SlotHandle, SlotKind, SlotShape, SlotSignature,
};
pub use self::types::{Instance, Message, Origin, TypeKey};
pub use switchboard_config::{BusSettings, LogFormat};
pub use tokio_util::sync::CancellationToken;
