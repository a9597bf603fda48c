use sluice::scopes::{
    REDELIVERY_FAIL_ON_FIRST, RedeliveryCounter, RedeliveryPolicy, RedeliveryPolicyConfig,
};
use sluice::store::{InMemoryObjectStore, ObjectStore, ObjectStoreConfig};
use sluice::testing::{FailingProcessor, SpyProcessor};
use sluice::{Chain, ContextArena, ErrorKind, Event, processors};
use std::sync::Arc;

mod common;
use common::{init_tracing, root_event};

#[tokio::test]
async fn test_exhausted_after_max_redeliveries() {
    init_tracing();
    let arena = ContextArena::with_defaults();
    let nested = FailingProcessor::new("downstream unavailable");
    let policy = RedeliveryPolicy::new(
        Chain::builder().then(nested.clone()).build(),
        RedeliveryPolicyConfig::builder().max_redelivery_count(2).build(),
    );

    let mut observed = Vec::new();
    for _ in 0..2 {
        let err = processors::process(root_event(&arena, "order-42"), &policy)
            .await
            .unwrap_err();
        assert!(err.is_business());
        let counter = policy
            .counter_for(&root_event(&arena, "order-42"))
            .await
            .unwrap()
            .unwrap();
        observed.push(counter.attempts);
    }
    assert_eq!(observed, [1, 2]);

    let err = processors::process(root_event(&arena, "order-42"), &policy)
        .await
        .unwrap_err();
    assert!(err.is_redelivery_exhausted());
    match err.kind() {
        ErrorKind::RedeliveryExhausted {
            attempts,
            max_redelivery_count,
            ..
        } => {
            assert_eq!(*attempts, 2);
            assert_eq!(*max_redelivery_count, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    // The nested chain was not invoked for the exhausted delivery.
    assert_eq!(nested.attempts(), 2);
}

#[tokio::test]
async fn test_success_resets_counter() {
    let arena = ContextArena::with_defaults();
    let nested = SpyProcessor::new();
    nested.fail("flaky");
    let policy = RedeliveryPolicy::new(
        Chain::builder().then(nested.clone()).build(),
        RedeliveryPolicyConfig::default(),
    );

    assert!(processors::process(root_event(&arena, "m"), &policy).await.is_err());
    assert!(processors::process(root_event(&arena, "m"), &policy).await.is_err());
    assert_eq!(
        policy.counter_for(&root_event(&arena, "m")).await.unwrap().map(|c| c.attempts),
        Some(2)
    );

    nested.forward();
    let out = processors::process(root_event(&arena, "m"), &policy).await.unwrap();
    assert_eq!(out.unwrap().payload().as_str(), Some("m"));
    assert_eq!(policy.counter_for(&root_event(&arena, "m")).await.unwrap(), None);
}

#[tokio::test]
async fn test_distinct_messages_are_counted_apart() {
    let arena = ContextArena::with_defaults();
    let policy = RedeliveryPolicy::new(
        Chain::builder().then(FailingProcessor::new("no")).build(),
        RedeliveryPolicyConfig::builder()
            .max_redelivery_count(REDELIVERY_FAIL_ON_FIRST)
            .build(),
    );

    let first = processors::process(root_event(&arena, "a"), &policy).await.unwrap_err();
    let other = processors::process(root_event(&arena, "b"), &policy).await.unwrap_err();
    let again = processors::process(root_event(&arena, "a"), &policy).await.unwrap_err();

    assert!(first.is_business());
    assert!(other.is_business());
    assert!(again.is_redelivery_exhausted());
}

#[tokio::test]
async fn test_id_expression_and_shared_store() {
    let arena = ContextArena::with_defaults();
    let store: Arc<dyn ObjectStore<RedeliveryCounter>> = Arc::new(
        InMemoryObjectStore::<RedeliveryCounter>::new(ObjectStoreConfig::default()),
    );
    let config = RedeliveryPolicyConfig::builder()
        .id_expression("#[variables.orderId]")
        .policy_id("orders")
        .build();
    let policy = RedeliveryPolicy::new(
        Chain::builder().then(FailingProcessor::new("no")).build(),
        config,
    )
    .with_object_store(Arc::clone(&store));

    // Different payloads, same order id.
    for payload in ["v1", "v2"] {
        let event = Event::builder(arena.new_root())
            .payload(payload)
            .variable("orderId", "A-7")
            .build();
        assert!(processors::process(event, &policy).await.is_err());
    }

    let counter = store.retrieve("orders:A-7").await.unwrap().unwrap();
    assert_eq!(counter.message_id, "A-7");
    assert_eq!(counter.attempts, 2);
}

#[tokio::test]
async fn test_concurrent_deliveries_of_one_message_are_serialized() {
    let arena = ContextArena::with_defaults();
    let policy = Arc::new(RedeliveryPolicy::new(
        Chain::builder().then(FailingProcessor::new("no")).build(),
        RedeliveryPolicyConfig::builder().max_redelivery_count(100).build(),
    ));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let policy = Arc::clone(&policy);
            let event = root_event(&arena, "same");
            tokio::spawn(async move { processors::process(event, policy.as_ref()).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }

    let counter = policy.counter_for(&root_event(&arena, "same")).await.unwrap().unwrap();
    assert_eq!(counter.attempts, 10);
}
