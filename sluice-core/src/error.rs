//! Error types for Sluice.
//!
//! - [`ProcessError`] - failure of a processor, carrying the event it failed on
//! - [`ErrorKind`] - what went wrong
//! - [`ContextError`] - context lookups and completion
//! - [`LifecycleError`] - initialise / start / stop failures
//! - [`RoutingError`] - invalid router configuration
//!
//! [`ErrorKind`] and [`ProcessError`] are cloneable so one failure can be
//! delivered to every subscriber of a context.

use crate::context::{ContextId, EventContext};
use crate::message::Event;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A shared error type, used where errors must be cloneable.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a processing failure.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An application-level failure raised by a processor.
    #[error("{0}")]
    Business(SharedError),

    /// A filter rejected the event and was configured to raise.
    #[error("event not accepted by filter `{filter}`")]
    Unaccepted {
        /// Name of the rejecting filter.
        filter: String,
    },

    /// The redelivery limit for a message was reached.
    #[error(
        "message `{message_id}` exhausted redelivery after {attempts} failed attempts (max {max_redelivery_count})"
    )]
    RedeliveryExhausted {
        /// Identity of the message.
        message_id: String,
        /// Failed attempts recorded so far.
        attempts: u32,
        /// Configured limit.
        max_redelivery_count: u32,
    },

    /// No stable message id could be derived for the event.
    #[error("cannot derive a message id: {0}")]
    CorrelationIdUnavailable(String),

    /// A token refresh failed while processing.
    #[error("token refresh failed: {0}")]
    Refresh(SharedError),

    /// A processor panicked.
    #[error("processor panicked: {0}")]
    Panic(String),

    /// A scope deadline elapsed first.
    #[error("processing timed out after {0:?}")]
    Timeout(Duration),

    /// One or more routes of a router failed.
    #[error("{} of {total} routes failed", .failures.len())]
    Composite {
        /// Number of routes that ran.
        total: usize,
        /// Route index and error of every failed route.
        failures: Vec<(usize, ProcessError)>,
    },

    /// Routing could not proceed.
    #[error("routing failed: {0}")]
    Routing(String),

    /// An expression could not be evaluated.
    #[error("expression failed: {0}")]
    Expression(SharedError),

    /// An object store operation failed.
    #[error("object store failed: {0}")]
    Store(SharedError),

    /// A context operation failed.
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl ErrorKind {
    /// Stable identifier of the kind, e.g. `REDELIVERY_EXHAUSTED`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Business(_) => "BUSINESS",
            ErrorKind::Unaccepted { .. } => "UNACCEPTED",
            ErrorKind::RedeliveryExhausted { .. } => "REDELIVERY_EXHAUSTED",
            ErrorKind::CorrelationIdUnavailable(_) => "CORRELATION_ID_UNAVAILABLE",
            ErrorKind::Refresh(_) => "REFRESH",
            ErrorKind::Panic(_) => "PANIC",
            ErrorKind::Timeout(_) => "TIMEOUT",
            ErrorKind::Composite { .. } => "COMPOSITE",
            ErrorKind::Routing(_) => "ROUTING",
            ErrorKind::Expression(_) => "EXPRESSION",
            ErrorKind::Store(_) => "STORE",
            ErrorKind::Context(_) => "CONTEXT",
        }
    }
}

/// A failed processing step.
///
/// Carries the [`ErrorKind`], the event that was being processed when the
/// failure happened and the name of the offending processor.
#[derive(Clone)]
pub struct ProcessError {
    kind: ErrorKind,
    event: Option<Event>,
    processor: Option<Cow<'static, str>>,
}

impl ProcessError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            event: None,
            processor: None,
        }
    }

    /// Wraps an application error as a business failure.
    pub fn business(error: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Business(Arc::from(error.into())))
    }

    /// Business failure with a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::business(message.to_string())
    }

    /// What went wrong.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The event being processed when the failure happened.
    pub fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    /// Name of the processor that failed.
    pub fn processor(&self) -> Option<&str> {
        self.processor.as_deref()
    }

    /// Sets the event, replacing any previous one.
    pub fn with_event(mut self, event: Event) -> Self {
        self.event = Some(event);
        self
    }

    /// Sets the event unless one is already attached.
    pub fn or_event(mut self, event: Event) -> Self {
        if self.event.is_none() {
            self.event = Some(event);
        }
        self
    }

    /// Sets the processor name, replacing any previous one.
    pub fn with_processor(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.processor = Some(name.into());
        self
    }

    /// Sets the processor name unless one is already attached.
    ///
    /// The innermost failing processor wins when errors cross nested chains.
    pub fn or_processor(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        if self.processor.is_none() {
            self.processor = Some(name.into());
        }
        self
    }

    /// Maps the attached event onto another context.
    pub fn rebind(mut self, context: &EventContext) -> Self {
        self.event = self.event.map(|event| event.rebind(context.clone()));
        self
    }

    /// Returns `true` if this is a [`ErrorKind::Business`] failure.
    pub fn is_business(&self) -> bool {
        matches!(self.kind, ErrorKind::Business(_))
    }

    /// Returns `true` if a filter raised this error.
    pub fn is_unaccepted(&self) -> bool {
        matches!(self.kind, ErrorKind::Unaccepted { .. })
    }

    /// Returns `true` if redelivery was exhausted.
    pub fn is_redelivery_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::RedeliveryExhausted { .. })
    }
}

impl From<ErrorKind> for ProcessError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ContextError> for ProcessError {
    fn from(error: ContextError) -> Self {
        Self::new(ErrorKind::Context(error))
    }
}

impl fmt::Debug for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessError")
            .field("kind", &self.kind)
            .field("processor", &self.processor)
            .field("context", &self.event.as_ref().map(|e| e.context().id()))
            .finish()
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.processor {
            Some(name) => write!(f, "`{name}` failed: {}", self.kind),
            None => fmt::Display::fmt(&self.kind, f),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Business(e)
            | ErrorKind::Refresh(e)
            | ErrorKind::Expression(e)
            | ErrorKind::Store(e) => Some(e.as_ref()),
            ErrorKind::Context(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised by context operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The context is neither pending nor retained.
    #[error("context {0} is unknown or already evicted")]
    Unknown(ContextId),

    /// The context went away without ever being resolved.
    #[error("context {0} was dropped without a response")]
    Abandoned(ContextId),
}

/// Lifecycle phase names, used in [`LifecycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Initialisation.
    Initialise,
    /// Start.
    Start,
    /// Stop.
    Stop,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecyclePhase::Initialise => "initialise",
            LifecyclePhase::Start => "start",
            LifecyclePhase::Stop => "stop",
        })
    }
}

/// A component failed a lifecycle transition.
#[derive(Error, Debug)]
#[error("failed to {phase} `{component}`")]
pub struct LifecycleError {
    /// Phase that failed.
    pub phase: LifecyclePhase,
    /// Name of the failing component.
    pub component: String,
    /// Underlying cause.
    #[source]
    pub source: BoxError,
}

impl LifecycleError {
    /// Creates a lifecycle error.
    pub fn new(
        phase: LifecyclePhase,
        component: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            phase,
            component: component.into(),
            source: source.into(),
        }
    }
}

/// Errors in router configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The router was configured with too few routes.
    #[error("router `{router}` needs at least {required} routes, got {actual}")]
    TooFewRoutes {
        /// Router name.
        router: String,
        /// Minimum number of routes.
        required: usize,
        /// Configured number of routes.
        actual: usize,
    },

    /// The router configuration is otherwise invalid.
    #[error("invalid router configuration: {0}")]
    InvalidConfig(String),
}
