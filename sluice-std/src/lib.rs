//! # sluice-std
//!
//! Standard implementations for the Sluice message pipeline.
//!
//! This crate provides:
//! - **Processors**: [`processors::LoggingProcessor`], [`processors::MapProcessor`]
//! - **Filters**: [`filters::FilteringProcessor`], [`filters::ExpressionFilter`]
//! - **Scopes**: try, timeout, tracing and the idempotent
//!   [`scopes::RedeliveryPolicy`]
//! - **Routers**: [`routing::ChoiceRouter`], [`routing::ScatterGatherRouter`]
//! - **External state**: [`store::ObjectStore`], [`store::LockFactory`] and
//!   their in-memory implementations
//! - **Expressions**: [`expression::DefaultExpressionResolver`]
//! - **OAuth**: single-flight token refresh in [`oauth`]
//! - **Testing**: reusable doubles in [`testing`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core contracts
pub use sluice_core;

// Modules
pub mod expression;
pub mod filters;
pub mod oauth;
pub mod processors;
pub mod routing;
pub mod scopes;
pub mod store;
pub mod testing;
