use sluice::filters::{ExpressionFilter, FilteringProcessor};
use sluice::testing::{CountingProcessor, RecordingProcessor};
use sluice::{Chain, ContextArena, ErrorKind, Event, processor_fn, processors};

mod common;
use common::append;

fn only_orders() -> ExpressionFilter {
    ExpressionFilter::new("#[attributes.kind == 'order']")
}

fn order(arena: &std::sync::Arc<ContextArena>, payload: &str) -> Event {
    Event::builder(arena.new_root())
        .payload(payload)
        .attribute("kind", "order")
        .build()
}

#[tokio::test]
async fn test_accepted_event_runs_rest_of_chain() {
    let arena = ContextArena::with_defaults();
    let chain = Chain::builder()
        .then(FilteringProcessor::new(only_orders()))
        .then(append("+handled"))
        .build();

    let out = processors::process(order(&arena, "o1"), &chain).await.unwrap().unwrap();
    assert_eq!(out.payload().as_str(), Some("o1+handled"));
}

#[tokio::test]
async fn test_rejected_event_is_returned_unmodified() {
    let arena = ContextArena::with_defaults();
    let downstream = CountingProcessor::new();
    let chain = Chain::builder()
        .then(FilteringProcessor::new(only_orders()))
        .then(downstream.clone())
        .build();

    let input = Event::new("ping", arena.new_root());
    let out = processors::process(input.clone(), &chain).await.unwrap().unwrap();

    assert_eq!(out, input);
    assert_eq!(downstream.count(), 0);
}

#[tokio::test]
async fn test_alternate_result_resolves_parent() {
    let arena = ContextArena::with_defaults();
    let downstream = CountingProcessor::new();
    let alternate = RecordingProcessor::new();
    let chain = Chain::builder()
        .then(
            FilteringProcessor::new(only_orders())
                .on_unaccepted(Chain::builder().then(alternate.clone()).then(append("+alt")).build()),
        )
        .then(downstream.clone())
        .build();

    let input = Event::new("ping", arena.new_root());
    let ctx = input.context().clone();
    let out = processors::process(input, &chain).await.unwrap().unwrap();

    assert_eq!(out.payload().as_str(), Some("ping+alt"));
    assert_eq!(out.context().id(), ctx.id());
    assert_eq!(alternate.count(), 1);
    assert_eq!(downstream.count(), 0);
}

#[tokio::test]
async fn test_alternate_failure_resolves_parent_with_error() {
    let arena = ContextArena::with_defaults();
    let chain = Chain::builder()
        .then(FilteringProcessor::new(only_orders()).on_unaccepted(processor_fn(
            "reject",
            |_e: Event| async { Err(sluice::ProcessError::msg("no thanks")) },
        )))
        .build();

    let err = processors::process(Event::new("ping", arena.new_root()), &chain)
        .await
        .unwrap_err();
    assert!(err.is_business());
    assert_eq!(err.processor(), Some("reject"));
}

#[tokio::test]
async fn test_throw_on_unaccepted_raises() {
    let arena = ContextArena::with_defaults();
    let chain = Chain::builder()
        .then(
            FilteringProcessor::new(only_orders())
                .named("orders-only")
                .throw_on_unaccepted(true),
        )
        .build();

    let err = processors::process(Event::new("ping", arena.new_root()), &chain)
        .await
        .unwrap_err();
    assert!(err.is_unaccepted());
    assert!(matches!(err.kind(), ErrorKind::Unaccepted { filter } if filter == "orders-only"));
    assert_eq!(err.event().and_then(|e| e.payload().as_str()), Some("ping"));
}
