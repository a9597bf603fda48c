use proptest::prelude::*;
use sluice::testing::{CountingProcessor, SpyProcessor};
use sluice::{
    BlockingAdapter, Chain, ChildOptions, Component, ContextArena, ErrorKind, Event,
    IntoProcessorRef, ProcessError, ProcessResult, Processor, processor_fn, processors,
};
use std::borrow::Cow;
use std::time::Duration;

mod common;
use common::{append, root_event};

proptest! {
    #[test]
    fn prop_first_resolution_wins(outcomes in proptest::collection::vec(any::<Option<bool>>(), 1..8)) {
        let arena = ContextArena::with_defaults();
        let ctx = arena.new_root();
        let mut completion = ctx.subscribe().unwrap();

        // Some(true): success, Some(false): error, None: empty.
        let accepted: Vec<bool> = outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| {
                let response = match outcome {
                    Some(true) => Ok(Some(Event::new(format!("r{i}"), ctx.clone()))),
                    Some(false) => Err(ProcessError::msg(format!("r{i}"))),
                    None => Ok(None),
                };
                ctx.resolve(response)
            })
            .collect();

        prop_assert!(accepted[0]);
        prop_assert!(accepted[1..].iter().all(|accepted| !accepted));

        let settled = completion.wait_blocking();
        match outcomes[0] {
            Some(true) => {
                let event = settled.unwrap().unwrap();
                prop_assert_eq!(event.payload().as_str(), Some("r0"));
            }
            Some(false) => prop_assert!(settled.unwrap_err().to_string().contains("r0")),
            None => prop_assert!(settled.unwrap().is_none()),
        }
    }
}

#[tokio::test]
async fn test_process_resolves_context() {
    let arena = ContextArena::with_defaults();
    let chain = Chain::builder().then(append("!")).build();
    let event = root_event(&arena, "hi");
    let ctx = event.context().clone();

    let out = processors::process(event, &chain).await.unwrap().unwrap();

    assert_eq!(out.payload().as_str(), Some("hi!"));
    assert!(ctx.is_terminated());
    assert_eq!(ctx.response().await.unwrap().unwrap().payload().as_str(), Some("hi!"));
    assert_eq!(arena.pending_count(), 0);
}

#[tokio::test]
async fn test_consumed_event_resolves_empty() {
    let arena = ContextArena::with_defaults();
    let spy = SpyProcessor::new();
    spy.consume();
    let after = CountingProcessor::new();
    let chain = Chain::builder().then(spy.clone()).then(after.clone()).build();

    let response = processors::process(root_event(&arena, "x"), &chain).await;

    assert!(response.unwrap().is_none());
    assert_eq!(spy.call_count(), 1);
    assert_eq!(after.count(), 0);
}

#[tokio::test]
async fn test_empty_child_result_resolves_parent_once() {
    let arena = ContextArena::with_defaults();
    let root = arena.new_root();
    let mut completion = root.subscribe().unwrap();
    let consume = processor_fn("consume", |_e: Event| async { Ok(None) });

    let event = Event::new("x", root.clone());
    let response = processors::process_with_child_context(&event, &consume, Some("fork")).await;

    assert!(response.unwrap().is_none());
    assert!(root.is_resolved());
    assert!(completion.wait().await.unwrap().is_none());
    // A later resolution attempt is ignored.
    assert!(!root.resolve_success(Some(event)));
    assert!(completion.try_get().unwrap().unwrap().is_none());
}

#[tokio::test]
async fn test_dont_complete_leaves_parent_open() {
    let arena = ContextArena::with_defaults();
    let root = arena.new_root();
    let consume = processor_fn("consume", |_e: Event| async { Ok(None) });

    let event = Event::new("x", root.clone());
    let response =
        processors::process_with_child_context_dont_complete(&event, &consume, None).await;

    assert!(response.unwrap().is_none());
    assert!(!root.is_resolved());
}

#[tokio::test]
async fn test_child_result_is_rebound_to_parent() {
    let arena = ContextArena::with_defaults();
    let root = arena.new_root();
    let event = Event::new("a", root.clone());

    let out = processors::process_with_child_context(&event, &append("b").into_processor_ref(), None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(out.payload().as_str(), Some("ab"));
    assert_eq!(out.context().id(), root.id());
}

#[tokio::test]
async fn test_parent_terminates_after_children() {
    let arena = ContextArena::with_defaults();
    let root = arena.new_root();
    let child = root.new_child(ChildOptions::default());
    let grandchild = child.new_child(ChildOptions::default());

    root.resolve_success(None);
    child.resolve_success(None);
    assert!(root.is_resolved());
    assert!(!root.is_terminated());
    assert!(!child.is_terminated());

    grandchild.resolve_success(None);
    assert!(grandchild.is_terminated());
    assert!(child.is_terminated());
    assert!(root.is_terminated());
    assert_eq!(arena.pending_count(), 0);
}

struct Explode;

impl Component for Explode {
    fn name(&self) -> Cow<'static, str> {
        "explode".into()
    }
}

impl Processor for Explode {
    async fn process(&self, _event: Event) -> ProcessResult {
        panic!("kaboom");
    }
}

#[tokio::test]
async fn test_panic_becomes_error() {
    let arena = ContextArena::with_defaults();
    let chain = Chain::builder().then(Explode).build();

    let err = processors::process(root_event(&arena, "x"), &chain).await.unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::Panic(message) if message.contains("kaboom")));
    assert_eq!(err.processor(), Some("explode"));
    assert!(err.event().is_some());
}

#[test]
fn test_blocking_caller_waits_for_async_chain() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let chain = Chain::builder()
        .then(CountingProcessor::new().with_delay(Duration::from_millis(20)))
        .then(append("-done"))
        .build();
    let adapter = BlockingAdapter::new(chain.into_processor_ref(), runtime.handle().clone());
    let arena = ContextArena::with_defaults();

    let out = std::thread::spawn(move || adapter.process(root_event(&arena, "job")))
        .join()
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(out.payload().as_str(), Some("job-done"));
}

fn blocking_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn test_blocking_fork_rebinds_result_to_parent() {
    let runtime = blocking_runtime();
    let adapter = BlockingAdapter::new(
        append("-forked").into_processor_ref(),
        runtime.handle().clone(),
    );
    let arena = ContextArena::with_defaults();
    let root = arena.new_root();
    let event = Event::new("job", root.clone());

    let out = std::thread::spawn(move || adapter.process_with_child_context(event, Some("fork")))
        .join()
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(out.payload().as_str(), Some("job-forked"));
    assert_eq!(out.context().id(), root.id());
    assert!(!root.is_resolved());
}

#[test]
fn test_blocking_fork_empty_result_resolves_parent_once() {
    let runtime = blocking_runtime();
    let spy = SpyProcessor::new();
    spy.consume();
    let adapter = BlockingAdapter::new(spy.clone().into_processor_ref(), runtime.handle().clone());
    let arena = ContextArena::with_defaults();
    let root = arena.new_root();
    let mut completion = root.subscribe().unwrap();
    let event = Event::new("job", root.clone());
    let late = event.clone();

    let response = std::thread::spawn(move || adapter.process_with_child_context(event, None))
        .join()
        .unwrap();

    assert!(response.unwrap().is_none());
    assert_eq!(spy.call_count(), 1);
    assert!(completion.wait_blocking().unwrap().is_none());
    assert!(root.is_resolved());
    assert!(!root.resolve_success(Some(late)));
    assert!(completion.try_get().unwrap().unwrap().is_none());
}
