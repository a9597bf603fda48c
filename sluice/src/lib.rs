//! # sluice - Asynchronous Message-Processing Pipeline
//!
//! Events flow through chains of processors. Every event is bound to a
//! context that is resolved exactly once, so the caller that injected it can
//! wait for the outcome, asynchronously or from a plain thread.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sluice::prelude::*;
//!
//! let arena = ContextArena::with_defaults();
//! let chain = Chain::builder()
//!     .then(LoggingProcessor::new("received"))
//!     .then(FilteringProcessor::new(ExpressionFilter::new("#[attributes.kind == 'order']")))
//!     .then(processor_fn("handle", |event: Event| async move { Ok(Some(event)) }))
//!     .build();
//!
//! let response = processors::process(Event::new("payload", arena.new_root()), &chain).await;
//! ```
//!
//! ## Crates
//!
//! - `sluice-core`: events, contexts, the processor contract and chains
//! - `sluice-std`: standard processors, scopes, routers, stores and OAuth

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use sluice_core::{
    // Events
    Attributes,
    Event,
    EventBuilder,
    Payload,
    Variables,
    // Contexts
    BlockingAdapter,
    ChildOptions,
    Completion,
    ContextArena,
    ContextArenaConfig,
    ContextId,
    ContextInfo,
    EventContext,
    Response,
    // Processors
    Capabilities,
    Chain,
    ChainBuilder,
    Component,
    DynProcessor,
    Filter,
    FnProcessor,
    IntoProcessorRef,
    ProcessResult,
    Processor,
    ProcessorRef,
    Route,
    Router,
    Scope,
    invoke,
    processor_fn,
    processors,
    // Errors
    BoxError,
    ContextError,
    ErrorKind,
    LifecycleError,
    LifecyclePhase,
    ProcessError,
    RoutingError,
    SharedError,
};

pub use sluice_std::{expression, filters, oauth, routing, scopes, store, testing};

/// Standard plain processors.
pub mod std_processors {
    pub use sluice_std::processors::{LoggingProcessor, MapProcessor, TryMapProcessor};
}

/// Prelude module - common imports for Sluice.
///
/// # Usage
///
/// ```rust,ignore
/// use sluice::prelude::*;
/// ```
pub mod prelude {
    pub use crate::std_processors::{LoggingProcessor, MapProcessor, TryMapProcessor};
    pub use crate::{
        Chain, ChildOptions, Component, ContextArena, ErrorKind, Event, EventContext, Filter,
        IntoProcessorRef, Payload, ProcessError, ProcessResult, Processor, Response, processor_fn,
        processors,
    };
    pub use sluice_std::filters::{ExpressionFilter, FilteringProcessor};
    pub use sluice_std::routing::{ChoiceRouter, ScatterGatherRouter};
    pub use sluice_std::scopes::{
        OnError, RedeliveryPolicy, RedeliveryPolicyConfig, TimeoutScope, TracingScope, TryScope,
    };
}
