//! Helpers for running processors against contexts.
//!
//! - [`process`] runs a processor and resolves the event's context
//! - [`process_with_child_context`] forks a child context for a nested run
//! - [`apply`] is the stream form of the processor contract
//! - [`new_chain`] builds a [`Chain`]

use crate::chain::Chain;
use crate::context::{ChildOptions, EventContext, Response};
use crate::message::Event;
use crate::processor::{DynProcessor, ProcessorRef, invoke};
use futures::stream::{BoxStream, Stream, StreamExt};

/// Builds a chain, flattening a singleton chain.
pub fn new_chain(processors: impl IntoIterator<Item = ProcessorRef>) -> Chain {
    Chain::build(processors)
}

/// Runs `processor` and resolves the event's context with the outcome.
///
/// The returned response is the one the context settled on. If the processor
/// consumes the event and nobody resolved the context, it is resolved empty so
/// callers never hang.
pub async fn process(event: Event, processor: &dyn DynProcessor) -> Response {
    let context = event.context().clone();
    let mut completion = context.subscribe()?;
    settle(&context, invoke(processor, event).await);
    completion.wait().await
}

/// Runs `processor` in a child context and maps the result back.
///
/// The processor sees a copy of `event` bound to a fresh child context. Its
/// result is rebound onto the original context before being returned. An
/// empty result resolves the original context as well.
pub async fn process_with_child_context(
    event: &Event,
    processor: &dyn DynProcessor,
    location: Option<&str>,
) -> Response {
    fork(event, processor, child_options(true, location)).await
}

/// Like [`process_with_child_context`], but an empty result leaves the
/// original context untouched.
pub async fn process_with_child_context_dont_complete(
    event: &Event,
    processor: &dyn DynProcessor,
    location: Option<&str>,
) -> Response {
    fork(event, processor, child_options(false, location)).await
}

/// Maps a child's response onto its parent context.
///
/// Events are rebound onto `parent`; errors keep their kind and have their
/// event rebound so handlers see the originating event in the parent.
pub fn rebind_response(response: Response, parent: &EventContext) -> Response {
    match response {
        Ok(Some(event)) => Ok(Some(event.rebind(parent.clone()))),
        Ok(None) => Ok(None),
        Err(error) => Err(error.rebind(parent)),
    }
}

/// Processes a stream of events, up to `concurrency` at a time.
///
/// No ordering is guaranteed between events.
pub fn apply<'a, S>(events: S, processor: ProcessorRef, concurrency: usize) -> BoxStream<'a, Response>
where
    S: Stream<Item = Event> + Send + 'a,
{
    events
        .map(move |event| {
            let processor = ProcessorRef::clone(&processor);
            async move { process(event, processor.as_ref()).await }
        })
        .buffer_unordered(concurrency.max(1))
        .boxed()
}

pub(crate) fn child_options(complete_parent_on_empty: bool, location: Option<&str>) -> ChildOptions {
    ChildOptions {
        complete_parent_on_empty,
        location: location.map(str::to_owned),
    }
}

pub(crate) fn settle(context: &EventContext, response: Response) {
    match response {
        Ok(result) => context.resolve_success(result),
        Err(error) => context.resolve_error(error),
    };
}

async fn fork(event: &Event, processor: &dyn DynProcessor, options: ChildOptions) -> Response {
    let parent = event.context().clone();
    let child = parent.new_child(options);
    let mut completion = child.subscribe()?;
    settle(&child, invoke(processor, event.rebind(child.clone())).await);
    rebind_response(completion.wait().await, &parent)
}
