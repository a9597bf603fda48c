//! Error-handling scope.

use serde::Deserialize;
use serde_json::json;
use sluice_core::{
    Capabilities, Chain, Component, Event, ProcessError, ProcessResult, Processor, Scope,
    processors,
};
use std::borrow::Cow;
use std::sync::Arc;

/// Variable holding the error description while the handler chain runs.
pub const ERROR_VARIABLE: &str = "error";

type ErrorPredicate = Arc<dyn Fn(&ProcessError) -> bool + Send + Sync>;

/// What a [`TryScope`] does after its handler chain ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnError {
    /// Run the handler, then re-raise the original error.
    #[default]
    Propagate,
    /// Run the handler and return its result as success.
    Continue,
}

/// Runs a nested chain in a child context and handles its failures.
///
/// The handler chain receives the event the nested chain failed on, with the
/// variable [`ERROR_VARIABLE`] describing the failure:
///
/// ```json
/// { "kind": "BUSINESS", "message": "...", "processor": "..." }
/// ```
pub struct TryScope {
    name: Cow<'static, str>,
    nested: Chain,
    handler: Chain,
    on_error: OnError,
    when: Option<ErrorPredicate>,
}

impl TryScope {
    /// Wraps `nested`. Without a handler, failures propagate unchanged.
    pub fn new(nested: Chain) -> Self {
        Self {
            name: Cow::Borrowed("try"),
            nested,
            handler: Chain::empty(),
            on_error: OnError::Propagate,
            when: None,
        }
    }

    /// Names the scope.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the handler chain and what happens after it ran.
    pub fn on_error(mut self, on_error: OnError, handler: Chain) -> Self {
        self.on_error = on_error;
        self.handler = handler;
        self
    }

    /// Only handle errors matching `predicate`; others propagate untouched.
    pub fn when(mut self, predicate: impl Fn(&ProcessError) -> bool + Send + Sync + 'static) -> Self {
        self.when = Some(Arc::new(predicate));
        self
    }

    fn handles(&self, error: &ProcessError) -> bool {
        self.when.as_ref().is_none_or(|when| when(error))
    }
}

fn describe(error: &ProcessError) -> serde_json::Value {
    json!({
        "kind": error.kind().code(),
        "message": error.to_string(),
        "processor": error.processor(),
    })
}

impl Component for TryScope {
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SCOPE | Capabilities::LIFECYCLE
    }

    fn as_scope(&self) -> Option<&dyn Scope> {
        Some(self)
    }

    delegate_lifecycle!(nested, handler);
}

impl Scope for TryScope {
    fn nested(&self) -> &Chain {
        &self.nested
    }
}

impl Processor for TryScope {
    async fn process(&self, event: Event) -> ProcessResult {
        let location = Some(self.name.as_ref());
        let error =
            match processors::process_with_child_context_dont_complete(&event, &self.nested, location)
                .await
            {
                Ok(result) => return Ok(result),
                Err(error) if !self.handles(&error) => return Err(error),
                Err(error) => error,
            };

        tracing::debug!(scope = %self.name, kind = error.kind().code(), error = %error, "handling error");
        let failing = error
            .event()
            .cloned()
            .unwrap_or(event)
            .with_variable(ERROR_VARIABLE, describe(&error));
        let handled =
            processors::process_with_child_context_dont_complete(&failing, &self.handler, location)
                .await;

        match self.on_error {
            OnError::Continue => handled.map(|result| {
                result.map(|event| event.without_variable(ERROR_VARIABLE))
            }),
            OnError::Propagate => {
                handled?;
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{ContextArena, ErrorKind, processor_fn};

    fn failing() -> Chain {
        Chain::builder()
            .then(processor_fn("boom", |_e: Event| async {
                Err(ProcessError::msg("boom"))
            }))
            .build()
    }

    fn recover() -> Chain {
        Chain::builder()
            .then(processor_fn("recover", |e: Event| async move {
                let kind = e.variable(ERROR_VARIABLE).and_then(|v| v["kind"].as_str()).map(str::to_owned);
                Ok(Some(e.with_payload(format!("recovered from {}", kind.unwrap_or_default()))))
            }))
            .build()
    }

    #[tokio::test]
    async fn test_continue_returns_handler_result() {
        let arena = ContextArena::with_defaults();
        let scope = TryScope::new(failing()).on_error(OnError::Continue, recover());

        let out = scope
            .process(Event::new("in", arena.new_root()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.payload().as_str(), Some("recovered from BUSINESS"));
        assert!(out.variable(ERROR_VARIABLE).is_none());
    }

    #[tokio::test]
    async fn test_propagate_reraises_after_handler() {
        let arena = ContextArena::with_defaults();
        let root = arena.new_root();
        let scope = TryScope::new(failing()).on_error(OnError::Propagate, recover());

        let err = scope.process(Event::new("in", root.clone())).await.unwrap_err();
        assert_eq!(err.processor(), Some("boom"));
        assert_eq!(err.event().map(|e| e.context().id()), Some(root.id()));
    }

    #[tokio::test]
    async fn test_unmatched_errors_propagate() {
        let arena = ContextArena::with_defaults();
        let scope = TryScope::new(failing())
            .on_error(OnError::Continue, recover())
            .when(|error| matches!(error.kind(), ErrorKind::Timeout(_)));

        assert!(scope.process(Event::new("in", arena.new_root())).await.is_err());
    }
}
