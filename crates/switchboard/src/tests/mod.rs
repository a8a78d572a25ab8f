//! Shared participants for unit and BDD tests.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Barrier, Notify};
use tokio_util::sync::CancellationToken;

use crate::discovery::CandidateType;
use crate::error::HandlerError;
use crate::participant::{EventHandler, HandlerTable, Participant, RequestHandler, SlotTable};
use crate::slot::{AsyncEventSlot, EventSlot, RequestSlot, SlotHandle, SlotKind, SlotSignature};
use crate::types::{Instance, Origin, TypeKey};
use crate::HandlerBinding;

mod behaviour;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MessageA {
    pub(crate) text: String,
}

impl MessageA {
    pub(crate) fn new(text: &str) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MessageB {
    pub(crate) text: String,
}

impl MessageB {
    pub(crate) fn new(text: &str) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MessageC {
    pub(crate) text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseA {
    pub(crate) text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseB {
    pub(crate) length: usize,
}

/// Records every delivery so tests can assert on what arrived.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Mutex<Vec<String>>,
    cancelled: AtomicUsize,
    delivered: Notify,
}

impl Journal {
    pub(crate) fn record(&self, entry: String, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
        self.entries.lock().expect("journal lock").push(entry);
        self.delivered.notify_one();
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("journal lock").clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().expect("journal lock").len()
    }

    pub(crate) fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) async fn delivery(&self) {
        self.delivered.notified().await;
    }
}

/// Requests on `MessageA`, events on `MessageB` and `MessageC`, plus a
/// `run` method for `MessageA` outside the default naming convention.
#[derive(Debug, Default)]
pub(crate) struct SampleHandler {
    pub(crate) journal: Journal,
}

impl RequestHandler<MessageA> for SampleHandler {
    type Response = ResponseA;

    async fn handle(
        &self,
        message: MessageA,
        _cancel: CancellationToken,
    ) -> Result<ResponseA, HandlerError> {
        Ok(ResponseA { text: message.text })
    }
}

impl EventHandler<MessageB> for SampleHandler {
    async fn handle(&self, message: MessageB, cancel: CancellationToken) -> Result<(), HandlerError> {
        self.journal.record(format!("b:{}", message.text), &cancel);
        Ok(())
    }
}

impl EventHandler<MessageC> for SampleHandler {
    async fn handle(&self, message: MessageC, cancel: CancellationToken) -> Result<(), HandlerError> {
        self.journal.record(format!("c:{}", message.text), &cancel);
        Ok(())
    }
}

impl Participant for SampleHandler {
    fn handlers(table: &mut HandlerTable<Self>) {
        table
            .request::<MessageA>()
            .event::<MessageB>()
            .event::<MessageC>()
            .event_with(
                "run",
                |this: Arc<Self>, message: MessageA, cancel: CancellationToken| async move {
                    this.journal.record(format!("run:{}", message.text), &cancel);
                    Ok::<(), HandlerError>(())
                },
            );
    }
}

/// A second request handler for `MessageA` returning the same response.
#[derive(Debug, Default)]
pub(crate) struct RivalResponder;

impl RequestHandler<MessageA> for RivalResponder {
    type Response = ResponseA;

    async fn handle(
        &self,
        message: MessageA,
        _cancel: CancellationToken,
    ) -> Result<ResponseA, HandlerError> {
        Ok(ResponseA {
            text: format!("rival:{}", message.text),
        })
    }
}

impl EventHandler<MessageC> for RivalResponder {
    async fn handle(&self, _message: MessageC, _cancel: CancellationToken) -> Result<(), HandlerError> {
        Ok(())
    }
}

impl Participant for RivalResponder {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.event::<MessageC>().request::<MessageA>();
    }
}

/// Answers `MessageA` with a different response type.
#[derive(Debug, Default)]
pub(crate) struct LengthResponder;

impl RequestHandler<MessageA> for LengthResponder {
    type Response = ResponseB;

    async fn handle(
        &self,
        message: MessageA,
        _cancel: CancellationToken,
    ) -> Result<ResponseB, HandlerError> {
        Ok(ResponseB {
            length: message.text.len(),
        })
    }
}

impl Participant for LengthResponder {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.request::<MessageA>();
    }
}

/// Fails every `MessageB` and `MessageA` it receives.
#[derive(Debug, Default)]
pub(crate) struct FailingHandler;

impl EventHandler<MessageB> for FailingHandler {
    async fn handle(&self, message: MessageB, _cancel: CancellationToken) -> Result<(), HandlerError> {
        Err(format!("cannot accept '{}'", message.text).into())
    }
}

impl RequestHandler<MessageA> for FailingHandler {
    type Response = ResponseA;

    async fn handle(
        &self,
        _message: MessageA,
        _cancel: CancellationToken,
    ) -> Result<ResponseA, HandlerError> {
        Err("lookup failed".into())
    }
}

impl Participant for FailingHandler {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.event::<MessageB>().request::<MessageA>();
    }
}

/// Subscribes to `MessageB` only and rejects every delivery.
#[derive(Debug, Default)]
pub(crate) struct RejectingSubscriber;

impl EventHandler<MessageB> for RejectingSubscriber {
    async fn handle(&self, message: MessageB, _cancel: CancellationToken) -> Result<(), HandlerError> {
        Err(format!("rejected '{}'", message.text).into())
    }
}

impl Participant for RejectingSubscriber {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.event::<MessageB>();
    }
}

/// Panics on every `MessageB`.
#[derive(Debug, Default)]
pub(crate) struct PanickingHandler;

impl EventHandler<MessageB> for PanickingHandler {
    async fn handle(&self, message: MessageB, _cancel: CancellationToken) -> Result<(), HandlerError> {
        panic!("handler exploded on '{}'", message.text);
    }
}

impl Participant for PanickingHandler {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.event::<MessageB>();
    }
}

/// Waits on a shared barrier, proving handlers of one broadcast overlap.
#[derive(Debug)]
pub(crate) struct RendezvousHandler {
    pub(crate) barrier: Arc<Barrier>,
}

impl EventHandler<MessageB> for RendezvousHandler {
    async fn handle(&self, _message: MessageB, _cancel: CancellationToken) -> Result<(), HandlerError> {
        self.barrier.wait().await;
        Ok(())
    }
}

impl Participant for RendezvousHandler {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.event::<MessageB>();
    }
}

/// Blocks its worker thread for `pause` on every `MessageB`.
#[derive(Debug)]
pub(crate) struct StallingHandler {
    pub(crate) pause: Duration,
}

impl EventHandler<MessageB> for StallingHandler {
    async fn handle(&self, _message: MessageB, _cancel: CancellationToken) -> Result<(), HandlerError> {
        std::thread::sleep(self.pause);
        Ok(())
    }
}

impl Participant for StallingHandler {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.event::<MessageB>();
    }
}

/// Handles `MessageC` but has no default constructor.
#[derive(Debug)]
pub(crate) struct LabelledHandler {
    pub(crate) label: String,
    pub(crate) journal: Journal,
}

impl LabelledHandler {
    pub(crate) fn new(label: &str) -> Self {
        Self {
            label: label.into(),
            journal: Journal::default(),
        }
    }
}

impl EventHandler<MessageC> for LabelledHandler {
    async fn handle(&self, message: MessageC, cancel: CancellationToken) -> Result<(), HandlerError> {
        self.journal
            .record(format!("{}:{}", self.label, message.text), &cancel);
        Ok(())
    }
}

impl Participant for LabelledHandler {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.event::<MessageC>();
    }
}

/// Event source exposing every supported slot shape and one slot without
/// the default prefix.
#[derive(Debug, Default)]
pub(crate) struct SampleSource {
    pub(crate) publish_query: RequestSlot<MessageA, ResponseA>,
    pub(crate) publish_update: AsyncEventSlot<MessageB>,
    pub(crate) publish_notice: EventSlot<MessageB>,
    pub(crate) raise_alarm: EventSlot<MessageC>,
}

impl Participant for SampleSource {
    fn slots(table: &mut SlotTable<Self>) {
        table
            .slot("publish_query", |source: &Self| &source.publish_query)
            .slot("publish_update", |source: &Self| &source.publish_update)
            .slot("publish_notice", |source: &Self| &source.publish_notice)
            .slot("raise_alarm", |source: &Self| &source.raise_alarm);
    }
}

/// Slot with a synchronous delegate that returns a value.
#[derive(Debug, Default)]
pub(crate) struct BlockingQuerySlot(SlotHandle);

impl SlotKind for BlockingQuerySlot {
    fn signature() -> SlotSignature {
        SlotSignature::new(TypeKey::of::<MessageA>()).returning(TypeKey::of::<ResponseA>())
    }

    fn handle(&self) -> SlotHandle {
        self.0.clone()
    }
}

/// Event source with one supported and one unsupported slot.
#[derive(Debug, Default)]
pub(crate) struct MalformedSource {
    pub(crate) publish_notice: EventSlot<MessageB>,
    pub(crate) publish_lookup: BlockingQuerySlot,
}

impl Participant for MalformedSource {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.event::<MessageC>();
    }

    fn slots(table: &mut SlotTable<Self>) {
        table
            .slot("publish_notice", |source: &Self| &source.publish_notice)
            .slot("publish_lookup", |source: &Self| &source.publish_lookup);
    }
}

impl EventHandler<MessageC> for MalformedSource {
    async fn handle(&self, _message: MessageC, _cancel: CancellationToken) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Both a handler and an event source.
#[derive(Debug, Default)]
pub(crate) struct Relay {
    pub(crate) journal: Journal,
    pub(crate) publish_forward: AsyncEventSlot<MessageB>,
}

impl EventHandler<MessageC> for Relay {
    async fn handle(&self, message: MessageC, cancel: CancellationToken) -> Result<(), HandlerError> {
        self.journal.record(format!("relay:{}", message.text), &cancel);
        self.publish_forward
            .publish(MessageB::new(&message.text), cancel)
            .await
            .map_err(HandlerError::from)
    }
}

impl Participant for Relay {
    fn handlers(table: &mut HandlerTable<Self>) {
        table.event::<MessageC>();
    }

    fn slots(table: &mut SlotTable<Self>) {
        table.slot("publish_forward", |relay: &Self| &relay.publish_forward);
    }
}

/// Handler bindings `T` would register under the default method name.
pub(crate) fn bindings_of<T: Participant>(object: &Arc<T>) -> Vec<HandlerBinding> {
    CandidateType::of::<T>().extract_handlers(&Instance::of(object), "handle", Origin::Direct)
}

/// Drives a future to completion on the current thread.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    futures::executor::block_on(future)
}

#[test]
fn journal_counts_cancelled_deliveries() {
    let journal = Journal::default();
    let cancel = CancellationToken::new();
    journal.record("first".into(), &cancel);
    cancel.cancel();
    journal.record("second".into(), &cancel);
    assert_eq!(journal.entries(), vec!["first", "second"]);
    assert_eq!(journal.len(), 2);
    assert_eq!(journal.cancelled(), 1);
}
