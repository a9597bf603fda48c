//! Span-instrumented scope.

use sluice_core::{
    Capabilities, Chain, Component, Event, ProcessResult, Processor, Scope,
};
use std::borrow::Cow;
use tracing::Instrument;

/// Attribute carrying an upstream trace id, attached to the span when present.
pub const TRACE_ID_ATTRIBUTE: &str = "traceId";

/// Runs a nested chain inside a `tracing` span.
///
/// The span records the scope name, the context id and the correlation id. If
/// the event carries a [`TRACE_ID_ATTRIBUTE`] attribute, it is recorded too.
pub struct TracingScope {
    name: Cow<'static, str>,
    nested: Chain,
}

impl TracingScope {
    /// Wraps `nested` in a span called `name`.
    pub fn new(name: impl Into<Cow<'static, str>>, nested: Chain) -> Self {
        Self {
            name: name.into(),
            nested,
        }
    }
}

impl Component for TracingScope {
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

impl Scope for TracingScope {
    fn nested(&self) -> &Chain {
        &self.nested
    }
}

impl Processor for TracingScope {
    async fn process(&self, event: Event) -> ProcessResult {
        let context = event.context();
        let span = match event.attribute(TRACE_ID_ATTRIBUTE).and_then(|v| v.as_str()) {
            Some(trace_id) => tracing::info_span!(
                "scope",
                scope = %self.name,
                context = %context.id(),
                correlation = %context.correlation_id(),
                trace_id = %trace_id
            ),
            None => tracing::info_span!(
                "scope",
                scope = %self.name,
                context = %context.id(),
                correlation = %context.correlation_id()
            ),
        };

        self.nested.process(event).instrument(span).await
    }
}
