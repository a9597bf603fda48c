//! # Routers
//!
//! A router sends an event to zero or more [`Route`]s chosen by its own logic
//! and then aggregates or forwards their results. From the outside a router
//! is just another processor.

use crate::error::LifecycleError;
use crate::filter::Filter;
use crate::message::Event;
use crate::processor::{Component, ProcessorRef};
use std::fmt;
use std::sync::Arc;

/// One destination of a router.
#[derive(Clone)]
pub struct Route {
    label: Arc<str>,
    condition: Option<Arc<dyn Filter>>,
    processor: ProcessorRef,
}

impl Route {
    /// A route taken unconditionally.
    pub fn new(label: impl Into<Arc<str>>, processor: ProcessorRef) -> Self {
        Self {
            label: label.into(),
            condition: None,
            processor,
        }
    }

    /// A route guarded by a condition.
    pub fn when(
        label: impl Into<Arc<str>>,
        condition: impl Filter + 'static,
        processor: ProcessorRef,
    ) -> Self {
        Self {
            label: label.into(),
            condition: Some(Arc::new(condition)),
            processor,
        }
    }

    /// Label used in diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The processor behind this route.
    pub fn processor(&self) -> &ProcessorRef {
        &self.processor
    }

    /// Whether this route accepts the event. Unconditional routes always do.
    pub fn matches(&self, event: &Event) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.accept(event))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("label", &self.label)
            .field("conditional", &self.condition.is_some())
            .field("processor", &self.processor.name())
            .finish()
    }
}

/// A processor dispatching to routes.
pub trait Router: Send + Sync {
    /// The configured routes, in declaration order.
    fn routes(&self) -> &[Route];
}

/// Initialises every route, disposing the already initialised ones on failure.
pub fn initialise_routes(routes: &[Route]) -> Result<(), LifecycleError> {
    for (index, route) in routes.iter().enumerate() {
        if let Err(error) = route.processor.initialise() {
            for done in routes[..index].iter().rev() {
                done.processor.dispose();
            }
            return Err(error);
        }
    }
    Ok(())
}

/// Starts every route in order.
pub fn start_routes(routes: &[Route]) -> Result<(), LifecycleError> {
    routes.iter().try_for_each(|route| route.processor.start())
}

/// Stops every route in reverse order.
pub fn stop_routes(routes: &[Route]) -> Result<(), LifecycleError> {
    routes.iter().rev().try_for_each(|route| route.processor.stop())
}

/// Disposes every route in reverse order.
pub fn dispose_routes(routes: &[Route]) {
    routes.iter().rev().for_each(|route| route.processor.dispose());
}
