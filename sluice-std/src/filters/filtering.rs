//! Filter processor with swallow, alternate and raise outcomes.

use sluice_core::{
    Capabilities, Component, ErrorKind, Event, Filter, IntoProcessorRef, LifecycleError,
    ProcessError, ProcessResult, Processor, ProcessorRef, processors,
};
use std::borrow::Cow;

/// Applies a filter to every event.
///
/// Accepted events continue down the chain. A rejected event leads to exactly
/// one of:
///
/// 1. an [`ErrorKind::Unaccepted`] error, when `throw_on_unaccepted` is set
/// 2. the unaccepted processor running in a child context, its outcome
///    resolving the event's context
/// 3. the event's context being resolved with the unmodified event
///
/// The first applicable rule wins. In cases 2 and 3 the chain stops.
pub struct FilteringProcessor<F> {
    filter: F,
    name: Cow<'static, str>,
    throw_on_unaccepted: bool,
    unaccepted: Option<ProcessorRef>,
}

impl<F: Filter + 'static> FilteringProcessor<F> {
    /// Creates a filtering processor that swallows rejected events.
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            name: Cow::Borrowed("filter"),
            throw_on_unaccepted: false,
            unaccepted: None,
        }
    }

    /// Names the processor.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Raise an error for rejected events.
    pub fn throw_on_unaccepted(mut self, throw: bool) -> Self {
        self.throw_on_unaccepted = throw;
        self
    }

    /// Route rejected events to `processor`.
    pub fn on_unaccepted(mut self, processor: impl IntoProcessorRef) -> Self {
        self.unaccepted = Some(processor.into_processor_ref());
        self
    }

    async fn reject(&self, event: Event) -> ProcessResult {
        if self.throw_on_unaccepted {
            tracing::debug!(filter = %self.name, context = %event.context().id(), "event not accepted, raising");
            return Err(ProcessError::new(ErrorKind::Unaccepted {
                filter: self.name.to_string(),
            })
            .with_event(event)
            .with_processor(self.name.clone()));
        }

        let context = event.context().clone();
        match &self.unaccepted {
            Some(unaccepted) => {
                tracing::debug!(filter = %self.name, context = %context.id(), "event not accepted, routing to unaccepted processor");
                let response = processors::process_with_child_context_dont_complete(
                    &event,
                    unaccepted.as_ref(),
                    Some(self.name.as_ref()),
                )
                .await;
                context.resolve(response);
            }
            None => {
                tracing::debug!(filter = %self.name, context = %context.id(), "event not accepted, swallowing");
                context.resolve_success(Some(event));
            }
        }
        Ok(None)
    }
}

impl<F: Filter + 'static> Component for FilteringProcessor<F> {
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn capabilities(&self) -> Capabilities {
        if self.unaccepted.is_some() {
            Capabilities::FILTER | Capabilities::LIFECYCLE
        } else {
            Capabilities::FILTER
        }
    }

    fn as_filter(&self) -> Option<&dyn Filter> {
        Some(&self.filter)
    }

    fn initialise(&self) -> Result<(), LifecycleError> {
        self.unaccepted.as_ref().map_or(Ok(()), |p| p.initialise())
    }

    fn start(&self) -> Result<(), LifecycleError> {
        self.unaccepted.as_ref().map_or(Ok(()), |p| p.start())
    }

    fn stop(&self) -> Result<(), LifecycleError> {
        self.unaccepted.as_ref().map_or(Ok(()), |p| p.stop())
    }

    fn dispose(&self) {
        if let Some(unaccepted) = &self.unaccepted {
            unaccepted.dispose();
        }
    }
}

impl<F: Filter + 'static> Processor for FilteringProcessor<F> {
    async fn process(&self, event: Event) -> ProcessResult {
        if self.filter.accept(&event) {
            return Ok(Some(event));
        }
        self.reject(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{ContextArena, processor_fn};

    fn is_ok(event: &Event) -> bool {
        event.payload().as_str() == Some("ok")
    }

    #[tokio::test]
    async fn test_accepted_event_continues() {
        let arena = ContextArena::with_defaults();
        let ctx = arena.new_root();
        let filter = FilteringProcessor::new(is_ok);

        let out = filter.process(Event::new("ok", ctx.clone())).await.unwrap();
        assert!(out.is_some());
        assert!(!ctx.is_resolved());
    }

    #[tokio::test]
    async fn test_throw_takes_precedence_over_alternate() {
        let arena = ContextArena::with_defaults();
        let ctx = arena.new_root();
        let filter = FilteringProcessor::new(is_ok)
            .named("only-ok")
            .on_unaccepted(processor_fn("alt", |e: Event| async move { Ok(Some(e)) }))
            .throw_on_unaccepted(true);

        let err = filter.process(Event::new("bad", ctx.clone())).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Unaccepted { filter } if filter == "only-ok"));
        assert!(!ctx.is_resolved());
    }

    #[test]
    fn test_advertises_filter_capability() {
        let filter = FilteringProcessor::new(is_ok);
        assert!(filter.capabilities().contains(Capabilities::FILTER));
        assert!(filter.as_filter().is_some());
    }
}
