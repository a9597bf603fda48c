//! # sluice-core
//!
//! Core contracts of the Sluice asynchronous message pipeline.
//!
//! This crate has few dependencies and is meant to be imported by components
//! that only need the contracts, not the standard processors of `sluice-std`.
//!
//! # Building Blocks
//!
//! ## Event ([`Event`])
//!
//! An immutable message: a [`Payload`], attributes and variables. Every event
//! is bound to exactly one [`EventContext`]. Changing a field produces a new
//! event.
//!
//! ## Context ([`EventContext`])
//!
//! The per-request lifecycle object. Contexts form a tree: scopes fork child
//! contexts to run nested chains. Each context is resolved at most once and
//! terminates after all of its children terminated. Async and blocking
//! callers observe the outcome through the same [`Completion`].
//!
//! ## Processor ([`Processor`])
//!
//! The atomic unit of work, `Event -> Event | nothing | error`. Processors
//! advertise [`Capabilities`]: a [`Scope`] wraps a nested chain, a [`Router`]
//! dispatches to routes and a [`Filter`] conditionally consumes events.
//!
//! ## Chain ([`Chain`])
//!
//! An ordered composition of processors, itself a processor.
//!
//! # Running Processors
//!
//! - [`processors::process`] - run and resolve the event's context
//! - [`processors::process_with_child_context`] - fork a child context
//! - [`processors::apply`] - stream form
//! - [`BlockingAdapter`] - call-and-wait for synchronous callers
//!
//! # Error Types
//!
//! - [`ProcessError`] - failure of a processor, with the event it failed on
//! - [`ErrorKind`] - classification of failures
//! - [`ContextError`] - context lookups
//! - [`LifecycleError`] - lifecycle transitions

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod blocking;
mod chain;
mod context;
mod error;
mod filter;
mod message;
mod processor;
pub mod processors;
mod router;
mod scope;

// Re-exports
pub use blocking::BlockingAdapter;
pub use chain::{Chain, ChainBuilder};
pub use context::{
    ChildOptions, Completion, ContextArena, ContextArenaConfig, ContextId, ContextInfo,
    EventContext, Response,
};
pub use error::{
    BoxError, ContextError, ErrorKind, LifecycleError, LifecyclePhase, ProcessError,
    RoutingError, SharedError,
};
pub use filter::Filter;
pub use message::{Attributes, Event, EventBuilder, Payload, Variables};
pub use processor::{
    Capabilities, Component, DynProcessor, FnProcessor, IntoProcessorRef, ProcessResult,
    Processor, ProcessorRef, invoke, processor_fn,
};
pub use router::{
    Route, Router, dispose_routes, initialise_routes, start_routes, stop_routes,
};
pub use scope::Scope;
