//! Deadline scope.

use sluice_core::{
    Capabilities, Chain, ChildOptions, Component, ErrorKind, Event, ProcessError, ProcessResult,
    Processor, Scope, processors,
};
use std::borrow::Cow;
use std::time::Duration;

/// Races a nested chain against a deadline.
///
/// The nested chain runs in a child context on its own task. Whichever
/// finishes first, the chain or the deadline, resolves the child; the other
/// resolution is a no-op. The nested work is not cancelled when the deadline
/// wins.
pub struct TimeoutScope {
    name: Cow<'static, str>,
    nested: Chain,
    duration: Duration,
}

impl TimeoutScope {
    /// Wraps `nested` with a deadline of `duration`.
    pub fn new(nested: Chain, duration: Duration) -> Self {
        Self {
            name: Cow::Borrowed("timeout"),
            nested,
            duration,
        }
    }

    /// Names the scope.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// The deadline.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Component for TimeoutScope {
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SCOPE | Capabilities::LIFECYCLE
    }

    fn as_scope(&self) -> Option<&dyn Scope> {
        Some(self)
    }

    delegate_lifecycle!(nested);
}

impl Scope for TimeoutScope {
    fn nested(&self) -> &Chain {
        &self.nested
    }
}

impl Processor for TimeoutScope {
    async fn process(&self, event: Event) -> ProcessResult {
        let parent = event.context().clone();
        let child = parent.new_child(ChildOptions::completing_parent().at(self.name.to_string()));
        let mut completion = child.subscribe()?;

        let nested = self.nested.clone();
        let child_event = event.rebind(child.clone());
        tokio::spawn(async move { processors::process(child_event, &nested).await });

        if let Ok(response) = tokio::time::timeout(self.duration, completion.wait()).await {
            return processors::rebind_response(response, &parent);
        }

        let error = ProcessError::new(ErrorKind::Timeout(self.duration))
            .with_event(event)
            .with_processor(self.name.clone());
        if child.resolve_error(error.clone()) {
            tracing::warn!(scope = %self.name, context = %parent.id(), timeout = ?self.duration, "nested chain timed out");
            return Err(error);
        }
        // The nested chain won the race after the deadline fired.
        match completion.try_get() {
            Some(response) => processors::rebind_response(response, &parent),
            None => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{ContextArena, processor_fn};

    fn sleeper(delay: Duration) -> Chain {
        Chain::builder()
            .then(processor_fn("sleeper", move |e: Event| async move {
                tokio::time::sleep(delay).await;
                Ok(Some(e.with_payload("slept")))
            }))
            .build()
    }

    #[tokio::test]
    async fn test_fast_chain_wins() {
        let arena = ContextArena::with_defaults();
        let root = arena.new_root();
        let scope = TimeoutScope::new(sleeper(Duration::from_millis(1)), Duration::from_secs(5));

        let out = scope.process(Event::new("x", root.clone())).await.unwrap().unwrap();
        assert_eq!(out.payload().as_str(), Some("slept"));
        assert_eq!(out.context().id(), root.id());
    }

    #[tokio::test]
    async fn test_deadline_wins() {
        let arena = ContextArena::with_defaults();
        let root = arena.new_root();
        let scope = TimeoutScope::new(sleeper(Duration::from_millis(200)), Duration::from_millis(10));

        let err = scope.process(Event::new("x", root.clone())).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Timeout(_)));
        assert!(!root.is_terminated());

        // The abandoned chain still finishes; its late resolution is ignored.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!root.is_resolved());
        assert_eq!(arena.pending_count(), 1);
    }
}
