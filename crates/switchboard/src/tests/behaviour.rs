//! Behaviour-driven tests for registration, dispatch, and discovery.

use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tokio_util::sync::CancellationToken;

use crate::bus::MessageBus;
use crate::discovery::CandidateType;
use crate::error::BusError;
use crate::query::{EventSourceQuery, HandlerQuery};

use super::{
    MessageA, MessageB, RejectingSubscriber, ResponseA, RivalResponder, SampleHandler,
    SampleSource, block_on,
};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    bus: MessageBus,
    handler: Option<Arc<SampleHandler>>,
    source: Option<Arc<SampleSource>>,
    response: Option<Result<ResponseA, BusError>>,
    broadcast: Option<Result<(), BusError>>,
    registration: Option<Result<usize, BusError>>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn captured<'a, T>(outcome: Option<&'a Result<T, BusError>>, what: &str) -> &'a Result<T, BusError> {
    outcome.unwrap_or_else(|| panic!("no {what} captured"))
}

fn assert_error_kind(error: &BusError, kind: &str) {
    match kind {
        "not_found" => assert!(
            matches!(error, BusError::HandlerNotFound { .. }),
            "expected HandlerNotFound, got: {error}"
        ),
        "duplicate_response" => assert!(
            matches!(error, BusError::DuplicateResponseHandler { .. }),
            "expected DuplicateResponseHandler, got: {error}"
        ),
        other => panic!(
            "unsupported error kind: '{other}' (supported: not_found, duplicate_response)"
        ),
    }
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("an empty bus")]
fn given_empty_bus(world: &mut TestWorld) {
    world.bus = MessageBus::new();
}

#[given("a bus with a sample handler")]
fn given_sample_handler(world: &mut TestWorld) {
    let handler = Arc::new(SampleHandler::default());
    world
        .bus
        .add(Arc::clone(&handler))
        .expect("sample handler registers");
    world.handler = Some(handler);
}

#[given("a subscriber that rejects updates")]
fn given_rejecting_subscriber(world: &mut TestWorld) {
    world
        .bus
        .add(Arc::new(RejectingSubscriber))
        .expect("rejecting subscriber registers");
}

#[given("a sample event source")]
fn given_sample_source(world: &mut TestWorld) {
    let source = Arc::new(SampleSource::default());
    world
        .bus
        .add(Arc::clone(&source))
        .expect("sample source binds");
    world.source = Some(source);
}

#[given("an empty bus with a discoverable handler and source")]
fn given_discoverable_types(world: &mut TestWorld) {
    world.bus = MessageBus::new().with_catalog(
        [
            CandidateType::constructible::<SampleHandler>(),
            CandidateType::constructible::<SampleSource>(),
        ]
        .into_iter()
        .collect(),
    );
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("a request with text {text} is sent")]
fn when_request(world: &mut TestWorld, text: String) {
    let message = MessageA::new(text.trim_matches('"'));
    world.response = Some(block_on(
        world.bus.request(message, CancellationToken::new()),
    ));
}

#[when("an update with text {text} is broadcast")]
fn when_broadcast(world: &mut TestWorld, text: String) {
    let message = MessageB::new(text.trim_matches('"'));
    world.broadcast = Some(block_on(world.bus.send(message, CancellationToken::new())));
}

#[when("the source requests with text {text}")]
fn when_source_requests(world: &mut TestWorld, text: String) {
    let source = world.source.as_ref().expect("source registered");
    let message = MessageA::new(text.trim_matches('"'));
    world.response = Some(block_on(
        source
            .publish_query
            .request(message, CancellationToken::new()),
    ));
}

#[when("a rival responder is added")]
fn when_rival_added(world: &mut TestWorld) {
    world.registration = Some(world.bus.add(Arc::new(RivalResponder)));
}

#[when("the bus is configured with discovery enabled")]
fn when_configured(world: &mut TestWorld) {
    world
        .bus
        .configure(|options| options.discover = true)
        .expect("configure succeeds");
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the response text is {text}")]
fn then_response_text(world: &mut TestWorld, text: String) {
    let response = captured(world.response.as_ref(), "response")
        .as_ref()
        .expect("expected a response but got an error");
    assert_eq!(response.text, text.trim_matches('"'));
}

#[then("the request fails with {kind}")]
fn then_request_fails(world: &mut TestWorld, kind: String) {
    let error = captured(world.response.as_ref(), "response")
        .as_ref()
        .expect_err("expected an error but got a response");
    assert_error_kind(error, kind.trim_matches('"'));
}

#[then("the broadcast succeeds")]
fn then_broadcast_succeeds(world: &mut TestWorld) {
    captured(world.broadcast.as_ref(), "broadcast")
        .as_ref()
        .expect("broadcast should succeed");
}

#[then("the broadcast fails with {count} failure")]
fn then_broadcast_fails(world: &mut TestWorld, count: usize) {
    let error = captured(world.broadcast.as_ref(), "broadcast")
        .as_ref()
        .expect_err("broadcast should fail");
    assert_eq!(error.failures().len(), count, "got: {error}");
}

#[then("the sample handler recorded {entry}")]
fn then_handler_recorded(world: &mut TestWorld, entry: String) {
    let handler = world.handler.as_ref().expect("sample handler registered");
    assert!(
        handler
            .journal
            .entries()
            .iter()
            .any(|recorded| recorded == entry.trim_matches('"')),
        "missing {entry} in {:?}",
        handler.journal.entries()
    );
}

#[then("the registration fails with {kind}")]
fn then_registration_fails(world: &mut TestWorld, kind: String) {
    let error = captured(world.registration.as_ref(), "registration")
        .as_ref()
        .expect_err("expected registration to fail");
    assert_error_kind(error, kind.trim_matches('"'));
}

#[then("{count} handlers are registered")]
fn then_handler_count(world: &mut TestWorld, count: usize) {
    assert_eq!(world.bus.handlers(&HandlerQuery::new()).len(), count);
}

#[then("{count} slots are bound")]
fn then_slot_count(world: &mut TestWorld, count: usize) {
    assert_eq!(world.bus.event_sources(&EventSourceQuery::new()).len(), count);
}

#[then("a request with text {text} is answered")]
fn then_request_answered(world: &mut TestWorld, text: String) {
    let expected = text.trim_matches('"');
    let response: ResponseA = block_on(
        world
            .bus
            .request(MessageA::new(expected), CancellationToken::new()),
    )
    .expect("discovered responder answers");
    assert_eq!(response.text, expected);
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/message_bus.feature",
    name = "Request returns the registered handler's response"
)]
fn request_returns_response(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/message_bus.feature",
    name = "Request without a handler fails"
)]
fn request_without_handler(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/message_bus.feature",
    name = "Broadcast without subscribers succeeds"
)]
fn broadcast_without_subscribers(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/message_bus.feature",
    name = "Broadcast reports a failing handler after invoking the rest"
)]
fn broadcast_partial_failure(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/message_bus.feature",
    name = "Request slot forwards into the bus"
)]
fn request_slot_forwarding(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/message_bus.feature",
    name = "Second responder for the same pair is rejected"
)]
fn duplicate_responder_rejected(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/message_bus.feature",
    name = "Configure discovers catalogued types"
)]
fn configure_discovery(world: TestWorld) {
    drop(world);
}
