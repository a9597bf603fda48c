//! Bearer authentication with one retry after a token refresh.

use super::dancer::AuthorizationCodeDancer;
use super::error::OAuthError;
use crate::expression::{DefaultExpressionResolver, ExpressionResolver};
use bytes::Bytes;
use serde_json::Value;
use sluice_core::{Attributes, Event};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A response of an authorized request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// A response with a status and no body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The response as seen by expressions: `origin` with the body as
    /// payload and the attributes `statusCode` and `headers`.
    pub fn to_event(&self, origin: &Event) -> Event {
        let attributes = Attributes::from([
            ("statusCode".to_owned(), Value::from(self.status)),
            (
                "headers".to_owned(),
                Value::Object(
                    self.headers
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                        .collect(),
                ),
            ),
        ]);
        origin
            .with_attributes(attributes)
            .with_payload(self.body.clone())
    }
}

/// Authorizes requests with a resource owner's access token.
///
/// When the response to a request matches the configured
/// `refresh_token_when` expression, the token is refreshed and the request is
/// sent once more. The second response is returned whatever it is.
pub struct OAuthRequestAuthenticator {
    dancer: Arc<AuthorizationCodeDancer>,
    resolver: Arc<dyn ExpressionResolver>,
}

impl OAuthRequestAuthenticator {
    /// Authenticates with tokens managed by `dancer`.
    pub fn new(dancer: Arc<AuthorizationCodeDancer>) -> Self {
        Self {
            dancer,
            resolver: Arc::new(DefaultExpressionResolver),
        }
    }

    /// Evaluates the retry expression with `resolver`.
    pub fn with_expression_resolver(mut self, resolver: Arc<dyn ExpressionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// The token manager.
    pub fn dancer(&self) -> &Arc<AuthorizationCodeDancer> {
        &self.dancer
    }

    /// `Authorization` header value for `owner`.
    pub async fn authorization_header(&self, owner: &str) -> Result<String, OAuthError> {
        Ok(format!("Bearer {}", self.dancer.access_token(owner).await?))
    }

    /// Whether `response` calls for a refresh and a retry.
    pub fn should_retry(&self, response: &HttpResponse, origin: &Event) -> Result<bool, OAuthError> {
        let expression = &self.dancer.config().refresh_token_when;
        Ok(self.resolver.resolve_bool(expression, &response.to_event(origin))?)
    }

    /// Sends a request with `send`, which receives the `Authorization` header
    /// value, and retries it at most once after a refresh.
    pub async fn send<F, Fut>(&self, owner: &str, origin: &Event, send: F) -> Result<HttpResponse, OAuthError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<HttpResponse, OAuthError>>,
    {
        let response = send(self.authorization_header(owner).await?).await?;
        if !self.should_retry(&response, origin)? {
            return Ok(response);
        }

        tracing::debug!(owner, status = response.status, "response requires a token refresh, retrying once");
        self.dancer.refresh_token(owner).await?;
        send(self.authorization_header(owner).await?).await
    }
}
