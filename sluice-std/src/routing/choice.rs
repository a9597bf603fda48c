//! First-match content-based routing.

use sluice_core::{
    Capabilities, Component, Event, Filter, IntoProcessorRef, LifecycleError, ProcessResult,
    Processor, ProcessorRef, Route, Router, dispose_routes, initialise_routes, invoke,
    start_routes, stop_routes,
};
use std::borrow::Cow;

/// Sends each event down the first route whose condition accepts it.
///
/// When no route matches, the `otherwise` processor runs, or the event
/// passes through unchanged if none is configured. The chosen route runs in
/// the event's own context.
pub struct ChoiceRouter {
    name: Cow<'static, str>,
    routes: Vec<Route>,
    otherwise: Option<ProcessorRef>,
}

impl ChoiceRouter {
    /// An empty router that passes every event through.
    pub fn new() -> Self {
        Self {
            name: Cow::Borrowed("choice"),
            routes: Vec::new(),
            otherwise: None,
        }
    }

    /// Names the router.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a conditional route, tried after the ones already added.
    pub fn when(
        mut self,
        label: impl Into<std::sync::Arc<str>>,
        condition: impl Filter + 'static,
        processor: impl IntoProcessorRef,
    ) -> Self {
        self.routes
            .push(Route::when(label, condition, processor.into_processor_ref()));
        self
    }

    /// Sets the processor used when no route matches.
    pub fn otherwise(mut self, processor: impl IntoProcessorRef) -> Self {
        self.otherwise = Some(processor.into_processor_ref());
        self
    }

    fn select(&self, event: &Event) -> Option<(&str, &ProcessorRef)> {
        self.routes
            .iter()
            .find(|route| route.matches(event))
            .map(|route| (route.label(), route.processor()))
            .or_else(|| self.otherwise.as_ref().map(|p| ("otherwise", p)))
    }

    fn all_routes(&self) -> Vec<Route> {
        let mut routes = self.routes.clone();
        if let Some(otherwise) = &self.otherwise {
            routes.push(Route::new("otherwise", ProcessorRef::clone(otherwise)));
        }
        routes
    }
}

impl Default for ChoiceRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for ChoiceRouter {
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ROUTER | Capabilities::LIFECYCLE
    }

    fn as_router(&self) -> Option<&dyn Router> {
        Some(self)
    }

    fn initialise(&self) -> Result<(), LifecycleError> {
        initialise_routes(&self.all_routes())
    }

    fn start(&self) -> Result<(), LifecycleError> {
        start_routes(&self.all_routes())
    }

    fn stop(&self) -> Result<(), LifecycleError> {
        stop_routes(&self.all_routes())
    }

    fn dispose(&self) {
        dispose_routes(&self.all_routes());
    }
}

impl Router for ChoiceRouter {
    fn routes(&self) -> &[Route] {
        &self.routes
    }
}

impl Processor for ChoiceRouter {
    async fn process(&self, event: Event) -> ProcessResult {
        match self.select(&event) {
            Some((label, processor)) => {
                tracing::trace!(router = %self.name, route = label, context = %event.context().id(), "route selected");
                invoke(processor.as_ref(), event).await
            }
            None => Ok(Some(event)),
        }
    }
}
