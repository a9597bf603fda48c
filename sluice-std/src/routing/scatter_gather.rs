//! Concurrent fan-out with aggregated results.

use futures::future::join_all;
use serde_json::{Map, Value};
use sluice_core::{
    Capabilities, Component, ErrorKind, Event, LifecycleError, ProcessError,
    ProcessResult, Processor, Route, Router, RoutingError, dispose_routes, initialise_routes,
    processors, start_routes, stop_routes,
};
use std::borrow::Cow;

const MIN_ROUTES: usize = 2;

/// Sends each event to every route concurrently and aggregates the results.
///
/// Every route runs in its own child context. The aggregated payload is a
/// JSON object keyed by route index (`"0"`, `"1"`, ...); routes that consumed
/// the event contribute nothing. Variables set by the routes are merged into
/// the result in route order.
///
/// If any route fails, the router fails with [`ErrorKind::Composite`] listing
/// every failed route by index.
pub struct ScatterGatherRouter {
    name: Cow<'static, str>,
    routes: Vec<Route>,
}

impl ScatterGatherRouter {
    /// Creates the router. At least two routes are required.
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Result<Self, RoutingError> {
        let routes: Vec<Route> = routes.into_iter().collect();
        if routes.len() < MIN_ROUTES {
            return Err(RoutingError::TooFewRoutes {
                router: "scatter-gather".into(),
                required: MIN_ROUTES,
                actual: routes.len(),
            });
        }
        Ok(Self {
            name: Cow::Borrowed("scatter-gather"),
            routes,
        })
    }

    /// Names the router.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }
}

impl Component for ScatterGatherRouter {
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
        initialise_routes(&self.routes)
    }

    fn start(&self) -> Result<(), LifecycleError> {
        start_routes(&self.routes)
    }

    fn stop(&self) -> Result<(), LifecycleError> {
        stop_routes(&self.routes)
    }

    fn dispose(&self) {
        dispose_routes(&self.routes);
    }
}

impl Router for ScatterGatherRouter {
    fn routes(&self) -> &[Route] {
        &self.routes
    }
}

impl Processor for ScatterGatherRouter {
    async fn process(&self, event: Event) -> ProcessResult {
        let responses = join_all(self.routes.iter().map(|route| {
            processors::process_with_child_context_dont_complete(
                &event,
                route.processor().as_ref(),
                Some(route.label()),
            )
        }))
        .await;

        let mut aggregate = Map::new();
        let mut variables = Vec::new();
        let mut failures = Vec::new();
        for (index, response) in responses.into_iter().enumerate() {
            match response {
                Ok(Some(out)) => {
                    aggregate.insert(index.to_string(), out.payload().to_json().unwrap_or(Value::Null));
                    variables.extend(out.variables().iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Ok(None) => {}
                Err(error) => failures.push((index, error)),
            }
        }

        if !failures.is_empty() {
            tracing::warn!(router = %self.name, failed = failures.len(), total = self.routes.len(), "routes failed");
            return Err(ProcessError::new(ErrorKind::Composite {
                total: self.routes.len(),
                failures,
            })
            .with_event(event)
            .with_processor(self.name.clone()));
        }

        Ok(Some(
            event
                .with_variables(variables)
                .with_payload(Value::Object(aggregate)),
        ))
    }
}
