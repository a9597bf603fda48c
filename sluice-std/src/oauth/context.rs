//! Per-owner token state.

use super::token::TokenResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Owner used when a redirect carries no resource owner id.
pub const DEFAULT_RESOURCE_OWNER_ID: &str = "default";

/// OAuth state of one resource owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOwnerOAuthContext {
    /// The owner.
    pub resource_owner_id: String,
    /// Current access token.
    pub access_token: Option<String>,
    /// Refresh token, kept across refreshes that do not reissue one.
    pub refresh_token: Option<String>,
    /// Lifetime of the access token as reported by the provider.
    pub expires_in: Option<String>,
    /// Original state of the authorization request.
    pub state: Option<String>,
    /// Custom parameters extracted from token responses.
    #[serde(default)]
    pub token_response_parameters: HashMap<String, Value>,
}

impl ResourceOwnerOAuthContext {
    /// An owner without tokens.
    pub fn new(resource_owner_id: impl Into<String>) -> Self {
        Self {
            resource_owner_id: resource_owner_id.into(),
            ..Self::default()
        }
    }

    /// Applies a token response. The refresh token is only replaced when the
    /// provider issued a new one, and `state` only when given.
    pub(crate) fn apply(&mut self, response: TokenResponse, state: Option<String>) {
        self.access_token = Some(response.access_token);
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        self.expires_in = response.expires_in;
        if state.is_some() {
            self.state = state;
        }
        self.token_response_parameters.extend(
            response
                .custom_parameters
                .into_iter()
                .filter(|(_, value)| !value.is_null()),
        );
    }
}
