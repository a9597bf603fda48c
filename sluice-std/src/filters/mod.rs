//! Filtering processors.
//!
//! [`FilteringProcessor`] applies a [`Filter`](sluice_core::Filter) and
//! decides what happens to rejected events. [`ExpressionFilter`] builds the
//! predicate from an expression.

mod expression;
mod filtering;

pub use expression::ExpressionFilter;
pub use filtering::FilteringProcessor;
