//! # Chains
//!
//! A [`Chain`] runs processors strictly in declaration order, feeding each
//! one the output of its predecessor. It stops at the first failure or at the
//! first processor that consumes the event. A chain is itself a processor, so
//! chains nest.
//!
//! Building a chain from a single member that already is a chain returns that
//! chain unchanged.

use crate::error::{LifecycleError, ProcessError};
use crate::message::Event;
use crate::processor::{
    Capabilities, Component, IntoProcessorRef, ProcessResult, Processor, ProcessorRef, invoke,
};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// An ordered sequence of processors.
#[derive(Clone)]
pub struct Chain {
    name: Option<Arc<str>>,
    processors: Arc<[ProcessorRef]>,
}

impl Chain {
    /// Builds a chain, flattening a singleton chain.
    pub fn build(processors: impl IntoIterator<Item = ProcessorRef>) -> Self {
        let processors: Vec<ProcessorRef> = processors.into_iter().collect();
        if let [only] = processors.as_slice() {
            if let Some(chain) = only.as_chain() {
                return chain.clone();
            }
        }
        Self {
            name: None,
            processors: processors.into(),
        }
    }

    /// Starts building a chain.
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// A chain without processors. Passes every event through.
    pub fn empty() -> Self {
        Self::build(Vec::new())
    }

    /// Returns a copy of this chain with a diagnostic name.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Number of member processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Returns `true` if the chain has no members.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// The member processors in execution order.
    pub fn processors(&self) -> &[ProcessorRef] {
        &self.processors
    }

    async fn run(&self, event: Event) -> ProcessResult {
        let mut current = event;
        for processor in self.processors.iter() {
            match invoke(processor.as_ref(), current).await? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

impl Component for Chain {
    fn name(&self) -> Cow<'static, str> {
        match &self.name {
            Some(name) => Cow::Owned(name.to_string()),
            None => Cow::Borrowed("chain"),
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CHAIN | Capabilities::LIFECYCLE
    }

    fn as_chain(&self) -> Option<&Chain> {
        Some(self)
    }

    fn initialise(&self) -> Result<(), LifecycleError> {
        for (index, processor) in self.processors.iter().enumerate() {
            if let Err(error) = processor.initialise() {
                tracing::warn!(chain = %self.name(), processor = %processor.name(), error = %error, "initialise failed, disposing initialised members");
                for done in self.processors[..index].iter().rev() {
                    done.dispose();
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn start(&self) -> Result<(), LifecycleError> {
        self.processors.iter().try_for_each(|p| p.start())
    }

    fn stop(&self) -> Result<(), LifecycleError> {
        self.processors.iter().rev().try_for_each(|p| p.stop())
    }

    fn dispose(&self) {
        self.processors.iter().rev().for_each(|p| p.dispose());
    }
}

impl Processor for Chain {
    async fn process(&self, event: Event) -> Result<Option<Event>, ProcessError> {
        self.run(event).await
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field(
                "processors",
                &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder for [`Chain`].
#[derive(Default)]
pub struct ChainBuilder {
    name: Option<Arc<str>>,
    processors: Vec<ProcessorRef>,
}

impl ChainBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a processor.
    pub fn then(mut self, processor: impl IntoProcessorRef) -> Self {
        self.processors.push(processor.into_processor_ref());
        self
    }

    /// Appends an already shared processor.
    pub fn then_ref(mut self, processor: ProcessorRef) -> Self {
        self.processors.push(processor);
        self
    }

    /// Names the chain.
    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the chain.
    pub fn build(self) -> Chain {
        let chain = Chain::build(self.processors);
        match self.name {
            Some(name) => chain.named(name),
            None => chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextArena;
    use crate::processor::processor_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn append(suffix: &'static str) -> ProcessorRef {
        Arc::new(processor_fn(suffix, move |event: Event| async move {
            let text = format!("{}{suffix}", event.payload().as_str().unwrap_or_default());
            Ok(Some(event.with_payload(text)))
        }))
    }

    #[tokio::test]
    async fn test_runs_in_declaration_order() {
        let arena = ContextArena::with_defaults();
        let chain = Chain::build([append("a"), append("b"), append("c")]);
        let out = chain
            .process(Event::new("", arena.new_root()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.payload().as_str(), Some("abc"));
    }

    #[test]
    fn test_singleton_chain_is_flattened() {
        let inner = Chain::build([append("a"), append("b")]).named("inner");
        let outer = Chain::build([Arc::new(inner.clone()) as ProcessorRef]);
        assert_eq!(outer.len(), 2);
        assert_eq!(outer.name(), "inner");
    }

    #[tokio::test]
    async fn test_stops_on_consumed_event() {
        let arena = ContextArena::with_defaults();
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reached);
        let chain = Chain::builder()
            .then(processor_fn("swallow", |_event: Event| async { Ok(None) }))
            .then(processor_fn("after", move |event: Event| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(event))
                }
            }))
            .build();

        let out = chain.process(Event::new("x", arena.new_root())).await.unwrap();
        assert!(out.is_none());
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_carries_failing_input() {
        let arena = ContextArena::with_defaults();
        let chain = Chain::builder()
            .then_ref(append("a"))
            .then(processor_fn("reject", |_event: Event| async {
                Err(ProcessError::msg("rejected"))
            }))
            .then_ref(append("never"))
            .build();

        let err = chain
            .process(Event::new("", arena.new_root()))
            .await
            .unwrap_err();
        assert_eq!(err.processor(), Some("reject"));
        assert_eq!(err.event().and_then(|e| e.payload().as_str()), Some("a"));
    }
}
