//! # Processors
//!
//! A [`Processor`] is the atomic unit of work: it receives an [`Event`] and
//! produces a new event, no event (the event was consumed, typically by a
//! filter) or a [`ProcessError`].
//!
//! Every processor is also a [`Component`], which carries its name, its
//! [`Capabilities`] and its lifecycle. Scopes, routers and filters advertise
//! themselves through capability flags and the `as_*` accessors rather than
//! through downcasting.
//!
//! # Static vs Dynamic Dispatch
//!
//! [`Processor`] uses native `async fn` for static dispatch. Chains and
//! routers hold processors as [`ProcessorRef`], an `Arc<dyn DynProcessor>`.
//! Every `Processor` is a [`DynProcessor`] through a blanket implementation.

use crate::chain::Chain;
use crate::error::{ErrorKind, LifecycleError, ProcessError};
use crate::filter::Filter;
use crate::message::Event;
use crate::router::Router;
use crate::scope::Scope;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::borrow::Cow;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Result of a single processing step.
pub type ProcessResult = Result<Option<Event>, ProcessError>;

/// Shared, dynamically dispatched processor.
pub type ProcessorRef = Arc<dyn DynProcessor>;

bitflags::bitflags! {
    /// Capabilities a component advertises.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Wraps a nested chain. See [`Component::as_scope`].
        const SCOPE = 1;
        /// Dispatches to routes. See [`Component::as_router`].
        const ROUTER = 1 << 1;
        /// Conditionally consumes events. See [`Component::as_filter`].
        const FILTER = 1 << 2;
        /// Needs lifecycle calls.
        const LIFECYCLE = 1 << 3;
        /// Is a [`Chain`].
        const CHAIN = 1 << 4;
    }
}

/// Identity, capabilities and lifecycle of a processing component.
///
/// All methods have defaults, so a plain processor only needs an empty
/// `impl Component for MyProcessor {}`.
pub trait Component: Send + Sync + 'static {
    /// Name used in diagnostics and errors.
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }

    /// Capabilities of this component.
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// This component as a chain.
    fn as_chain(&self) -> Option<&Chain> {
        None
    }

    /// This component as a scope.
    fn as_scope(&self) -> Option<&dyn Scope> {
        None
    }

    /// This component as a router.
    fn as_router(&self) -> Option<&dyn Router> {
        None
    }

    /// This component as a filter.
    fn as_filter(&self) -> Option<&dyn Filter> {
        None
    }

    /// Prepares the component. Runs once before first use.
    fn initialise(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Starts the component.
    fn start(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Stops the component.
    fn stop(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Releases resources held by the component.
    fn dispose(&self) {}
}

/// The atomic unit of work.
///
/// Implementations must be safe for concurrent invocation: the same processor
/// may process many events at once.
///
/// # Example
///
/// ```rust,ignore
/// struct Upper;
///
/// impl Component for Upper {}
///
/// impl Processor for Upper {
///     async fn process(&self, event: Event) -> ProcessResult {
///         let text = event.payload().as_str().unwrap_or_default().to_uppercase();
///         Ok(Some(event.with_payload(text)))
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Processor`",
    label = "missing `Processor` implementation",
    note = "Implement `Component` and `Processor`, or wrap a closure with `processor_fn`."
)]
pub trait Processor: Component {
    /// Processes one event.
    fn process(&self, event: Event) -> impl Future<Output = ProcessResult> + Send;
}

/// Dynamic object-safe version of [`Processor`].
pub trait DynProcessor: Component {
    /// Processes one event (dynamic dispatch version).
    fn process_dyn(&self, event: Event) -> BoxFuture<'_, ProcessResult>;
}

impl<P: Processor> DynProcessor for P {
    fn process_dyn(&self, event: Event) -> BoxFuture<'_, ProcessResult> {
        Box::pin(self.process(event))
    }
}

impl Component for ProcessorRef {
    fn name(&self) -> Cow<'static, str> {
        (**self).name()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn as_chain(&self) -> Option<&Chain> {
        (**self).as_chain()
    }

    fn as_scope(&self) -> Option<&dyn Scope> {
        (**self).as_scope()
    }

    fn as_router(&self) -> Option<&dyn Router> {
        (**self).as_router()
    }

    fn as_filter(&self) -> Option<&dyn Filter> {
        (**self).as_filter()
    }

    fn initialise(&self) -> Result<(), LifecycleError> {
        (**self).initialise()
    }

    fn start(&self) -> Result<(), LifecycleError> {
        (**self).start()
    }

    fn stop(&self) -> Result<(), LifecycleError> {
        (**self).stop()
    }

    fn dispose(&self) {
        (**self).dispose()
    }
}

// Allow a ProcessorRef to be used where a Processor is expected.
impl Processor for ProcessorRef {
    async fn process(&self, event: Event) -> ProcessResult {
        (**self).process_dyn(event).await
    }
}

/// Converts a value into a [`ProcessorRef`].
pub trait IntoProcessorRef {
    /// Performs the conversion.
    fn into_processor_ref(self) -> ProcessorRef;
}

impl<P: Processor> IntoProcessorRef for P {
    fn into_processor_ref(self) -> ProcessorRef {
        Arc::new(self)
    }
}

/// A processor built from an async closure.
///
/// Created by [`processor_fn`].
pub struct FnProcessor<F> {
    name: Cow<'static, str>,
    f: F,
}

/// Wraps an async closure as a processor.
///
/// ```rust,ignore
/// let tag = processor_fn("tag", |event: Event| async move {
///     Ok(Some(event.with_variable("tagged", true)))
/// });
/// ```
pub fn processor_fn<F, Fut>(name: impl Into<Cow<'static, str>>, f: F) -> FnProcessor<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessResult> + Send + 'static,
{
    FnProcessor {
        name: name.into(),
        f,
    }
}

impl<F, Fut> Component for FnProcessor<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessResult> + Send + 'static,
{
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }
}

impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessResult> + Send + 'static,
{
    fn process(&self, event: Event) -> impl Future<Output = ProcessResult> + Send {
        (self.f)(event)
    }
}

/// Runs a processor, attributing failures and converting panics.
///
/// Errors get the input event and the processor name attached unless an inner
/// processor already set them. A panic becomes [`ErrorKind::Panic`].
pub async fn invoke(processor: &dyn DynProcessor, event: Event) -> ProcessResult {
    let input = event.clone();
    match AssertUnwindSafe(processor.process_dyn(event))
        .catch_unwind()
        .await
    {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(error)) => {
            let name = processor.name();
            tracing::warn!(processor = %name, context = %input.context().id(), error = %error, "processor failed");
            Err(error.or_event(input).or_processor(name))
        }
        Err(panic) => {
            let name = processor.name();
            let message = panic_message(panic.as_ref());
            tracing::error!(processor = %name, context = %input.context().id(), panic = %message, "processor panicked");
            Err(ProcessError::new(ErrorKind::Panic(message))
                .with_event(input)
                .with_processor(name))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
