//! Expression-backed filter.

use crate::expression::{DefaultExpressionResolver, ExpressionResolver};
use sluice_core::{Event, Filter};
use std::sync::Arc;

/// A filter accepting events for which a boolean expression holds.
///
/// Evaluation errors reject the event.
#[derive(Clone)]
pub struct ExpressionFilter {
    expression: String,
    resolver: Arc<dyn ExpressionResolver>,
}

impl ExpressionFilter {
    /// Creates a filter using the [`DefaultExpressionResolver`].
    pub fn new(expression: impl Into<String>) -> Self {
        Self::with_resolver(expression, Arc::new(DefaultExpressionResolver))
    }

    /// Creates a filter using a custom resolver.
    pub fn with_resolver(
        expression: impl Into<String>,
        resolver: Arc<dyn ExpressionResolver>,
    ) -> Self {
        Self {
            expression: expression.into(),
            resolver,
        }
    }

    /// The expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl std::fmt::Debug for ExpressionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ExpressionFilter")
            .field(&self.expression)
            .finish()
    }
}

impl Filter for ExpressionFilter {
    fn accept(&self, event: &Event) -> bool {
        match self.resolver.resolve_bool(&self.expression, event) {
            Ok(accepted) => accepted,
            Err(error) => {
                tracing::debug!(expression = %self.expression, %error, "filter expression failed, rejecting");
                false
            }
        }
    }
}
