//! OAuth errors.

use crate::expression::ExpressionError;
use crate::store::StoreError;
use sluice_core::{BoxError, ErrorKind, ProcessError};
use std::sync::Arc;
use thiserror::Error;

/// Errors of the OAuth support.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OAuthError {
    /// A refresh was requested for an owner without a refresh token.
    #[error("resource owner `{owner}` has no refresh token")]
    NoRefreshToken {
        /// Resource owner id.
        owner: String,
    },

    /// The owner has not been authorized yet.
    #[error("resource owner `{owner}` has no access token")]
    NoAccessToken {
        /// Resource owner id.
        owner: String,
    },

    /// The token endpoint answered with a non-success status.
    #[error("token url answered {status}: {body}")]
    TokenUrl {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// The token endpoint response lacks a required field.
    #[error("field `{field}` not found in token response")]
    TokenNotFound {
        /// Configured path of the missing field.
        field: String,
    },

    /// The token endpoint response is not usable.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// A URL could not be built from the configuration.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The HTTP exchange failed.
    #[error("http request failed")]
    Http(#[source] BoxError),

    /// The context store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The retry expression could not be evaluated.
    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

impl From<OAuthError> for ProcessError {
    fn from(error: OAuthError) -> Self {
        ProcessError::new(ErrorKind::Refresh(Arc::new(error)))
    }
}
