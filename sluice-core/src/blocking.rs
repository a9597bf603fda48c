//! Call-and-wait bridge for synchronous callers.
//!
//! [`BlockingAdapter`] spawns the non-blocking processing onto a tokio runtime
//! and parks the calling thread on the context's [`Completion`], the same
//! primitive async callers await.
//!
//! [`Completion`]: crate::context::Completion

use crate::context::Response;
use crate::message::Event;
use crate::processor::{Component, ProcessorRef};
use crate::processors::{self, child_options, rebind_response};
use tokio::runtime::Handle;

/// Runs a processor to completion from a plain thread.
#[derive(Clone)]
pub struct BlockingAdapter {
    runtime: Handle,
    processor: ProcessorRef,
}

impl BlockingAdapter {
    /// Creates an adapter spawning onto `runtime`.
    pub fn new(processor: ProcessorRef, runtime: Handle) -> Self {
        Self { runtime, processor }
    }

    /// Creates an adapter spawning onto the runtime of the calling thread.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn current(processor: ProcessorRef) -> Option<Self> {
        Handle::try_current()
            .ok()
            .map(|runtime| Self::new(processor, runtime))
    }

    /// Processes `event` and blocks until its context is resolved.
    ///
    /// Must be called from a thread that is not driving the runtime.
    pub fn process(&self, event: Event) -> Response {
        self.warn_if_on_runtime();
        let mut completion = event.context().subscribe()?;
        let processor = ProcessorRef::clone(&self.processor);
        self.runtime.spawn(async move {
            processors::process(event, processor.as_ref()).await
        });
        completion.wait_blocking()
    }

    /// Blocking form of [`processors::process_with_child_context`].
    pub fn process_with_child_context(&self, event: Event, location: Option<&str>) -> Response {
        self.warn_if_on_runtime();
        let parent = event.context().clone();
        let child = parent.new_child(child_options(true, location));
        let mut completion = child.subscribe()?;
        let processor = ProcessorRef::clone(&self.processor);
        let child_event = event.rebind(child);
        self.runtime.spawn(async move {
            processors::process(child_event, processor.as_ref()).await
        });
        rebind_response(completion.wait_blocking(), &parent)
    }

    fn warn_if_on_runtime(&self) {
        if Handle::try_current().is_ok() {
            tracing::warn!(
                processor = %self.processor.name(),
                "blocking on a runtime thread; this can deadlock"
            );
        }
    }
}

impl std::fmt::Debug for BlockingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingAdapter")
            .field("processor", &self.processor.name())
            .finish()
    }
}
