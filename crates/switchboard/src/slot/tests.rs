//! Unit tests for slot signatures and unbound slot behaviour.

use rstest::rstest;

use super::*;
use crate::dispatcher::Dispatcher;
use crate::registry::HandlerRegistry;
use crate::tests::{MessageA, MessageB, ResponseA, block_on};

fn message() -> TypeKey {
    TypeKey::of::<MessageA>()
}

fn response() -> TypeKey {
    TypeKey::of::<ResponseA>()
}

#[rstest]
#[case::fire_and_forget(SlotSignature::new(message()), Some(SlotShape::FireAndForget))]
#[case::awaited_broadcast(
    SlotSignature::new(message()).cancellable().asynchronous(),
    Some(SlotShape::Broadcast)
)]
#[case::request(
    SlotSignature::new(message()).cancellable().asynchronous().returning(response()),
    Some(SlotShape::Request { response: response() })
)]
#[case::sync_with_result(SlotSignature::new(message()).returning(response()), None)]
#[case::async_without_token(SlotSignature::new(message()).asynchronous(), None)]
#[case::token_without_async(SlotSignature::new(message()).cancellable(), None)]
#[case::sync_request_with_token(
    SlotSignature::new(message()).cancellable().returning(response()),
    None
)]
fn signatures_classify_into_supported_shapes(
    #[case] signature: SlotSignature,
    #[case] expected: Option<SlotShape>,
) {
    assert_eq!(signature.classify(), expected);
}

#[test]
fn built_in_slots_report_their_signatures() {
    assert_eq!(
        EventSlot::<MessageA>::signature().classify(),
        Some(SlotShape::FireAndForget)
    );
    assert_eq!(
        AsyncEventSlot::<MessageA>::signature().classify(),
        Some(SlotShape::Broadcast)
    );
    assert_eq!(
        RequestSlot::<MessageA, ResponseA>::signature().classify(),
        Some(SlotShape::Request {
            response: response()
        })
    );
}

#[test]
fn signature_renders_delegate_shape() {
    let rendered = SlotSignature::new(message())
        .cancellable()
        .asynchronous()
        .returning(response())
        .to_string();
    assert!(rendered.contains("CancellationToken"), "got {rendered}");
    assert!(rendered.contains("ResponseA"), "got {rendered}");

    let blocking = SlotSignature::new(message()).returning(response()).to_string();
    assert!(!blocking.contains("Future"), "got {blocking}");
}

#[test]
fn unbound_event_slot_ignores_publish() {
    let slot = EventSlot::<MessageB>::new();
    slot.publish(MessageB::new("dropped"));
    assert!(!slot.is_bound());
}

#[test]
fn unbound_async_slot_completes() {
    let slot = AsyncEventSlot::<MessageB>::new();
    block_on(slot.publish(MessageB::new("dropped"), CancellationToken::new()))
        .expect("unbound publish succeeds");
}

#[test]
fn unbound_request_slot_fails() {
    let slot = RequestSlot::<MessageA, ResponseA>::new();
    let error = block_on(slot.request(MessageA::new("who"), CancellationToken::new()))
        .expect_err("unbound request fails");
    assert!(matches!(error, BusError::SlotUnbound { .. }), "got {error}");
}

#[test]
fn handles_share_binding_state() {
    let slot = RequestSlot::<MessageA, ResponseA>::new();
    let handle = slot.handle();
    let registry = Arc::new(RwLock::new(HandlerRegistry::new()));
    let dispatcher = Dispatcher::new(registry);

    assert!(handle.install(Forwarder::new(
        dispatcher.downgrade(),
        message(),
        SlotShape::Request {
            response: response(),
        },
    )));
    assert!(slot.is_bound());
    assert!(handle.same_slot(&slot.handle()));

    handle.release(&dispatcher.downgrade());
    assert!(!slot.is_bound());
}

#[test]
fn slot_held_by_a_live_bus_resists_other_buses() {
    let slot = AsyncEventSlot::<MessageB>::new();
    let holder = Dispatcher::new(Arc::new(RwLock::new(HandlerRegistry::new())));
    let intruder = Dispatcher::new(Arc::new(RwLock::new(HandlerRegistry::new())));
    let forwarder = |dispatcher: &Dispatcher| {
        Forwarder::new(
            dispatcher.downgrade(),
            TypeKey::of::<MessageB>(),
            SlotShape::Broadcast,
        )
    };
    assert!(slot.handle().install(forwarder(&holder)));

    assert!(slot.handle().is_claimed_elsewhere(&intruder.downgrade()));
    assert!(!slot.handle().is_claimed_elsewhere(&holder.downgrade()));
    assert!(!slot.handle().install(forwarder(&intruder)));
    slot.handle().release(&intruder.downgrade());
    assert!(slot.is_bound(), "release by another bus must not clear the slot");

    drop(holder);
    assert!(!slot.handle().is_claimed_elsewhere(&intruder.downgrade()));
    assert!(slot.handle().install(forwarder(&intruder)));
}

#[test]
fn slot_outliving_its_registry_reports_bus_unavailable() {
    let slot = AsyncEventSlot::<MessageB>::new();
    let registry = Arc::new(RwLock::new(HandlerRegistry::new()));
    let dispatcher = Dispatcher::new(registry);
    slot.handle().install(Forwarder::new(
        dispatcher.downgrade(),
        TypeKey::of::<MessageB>(),
        SlotShape::Broadcast,
    ));
    drop(dispatcher);

    let error = block_on(slot.publish(MessageB::new("late"), CancellationToken::new()))
        .expect_err("bus is gone");
    assert!(matches!(error, BusError::BusUnavailable { .. }), "got {error}");
}

#[test]
fn bound_request_slot_without_handler_reports_not_found() {
    let slot = RequestSlot::<MessageA, ResponseA>::new();
    let dispatcher = Dispatcher::new(Arc::new(RwLock::new(HandlerRegistry::new())));
    slot.handle().install(Forwarder::new(
        dispatcher.downgrade(),
        message(),
        SlotShape::Request {
            response: response(),
        },
    ));

    let error = block_on(slot.request(MessageA::new("who"), CancellationToken::new()))
        .expect_err("no handler");
    assert!(matches!(error, BusError::HandlerNotFound { .. }), "got {error}");
}
