//! OAuth grant configuration.

use serde::Deserialize;
use std::collections::HashMap;

/// Retry expression used when none is configured: refresh on 401 or 403.
pub const DEFAULT_REFRESH_TOKEN_WHEN: &str =
    "attributes.statusCode == 401 || attributes.statusCode == 403";

/// Configuration of an authorization-code grant.
#[derive(Debug, Clone, Deserialize, bon::Builder)]
#[serde(default)]
pub struct OAuthConfig {
    /// Name of the configuration. Owner locks and stored contexts are scoped
    /// by it.
    #[builder(into, default = "oauth".to_owned())]
    pub name: String,
    /// Client id registered with the provider.
    #[builder(into)]
    pub client_id: String,
    /// Client secret registered with the provider.
    #[builder(into)]
    pub client_secret: String,
    /// Token endpoint.
    #[builder(into)]
    pub token_url: String,
    /// Authorization endpoint the resource owner is sent to.
    #[builder(into)]
    pub authorization_url: Option<String>,
    /// Redirect URI registered with the provider.
    #[builder(into)]
    pub external_callback_url: Option<String>,
    /// Space separated scopes.
    #[builder(into)]
    pub scopes: Option<String>,
    /// Extra query parameters of the authorization URL.
    #[builder(default)]
    pub custom_parameters: HashMap<String, String>,
    /// Boolean expression evaluated against a response to decide whether to
    /// refresh the token and retry.
    #[builder(into, default = DEFAULT_REFRESH_TOKEN_WHEN.to_owned())]
    pub refresh_token_when: String,
    /// Where to find the tokens in the token endpoint response.
    #[builder(default)]
    pub token_response: TokenResponseConfig,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            name: "oauth".to_owned(),
            client_id: String::new(),
            client_secret: String::new(),
            token_url: String::new(),
            authorization_url: None,
            external_callback_url: None,
            scopes: None,
            custom_parameters: HashMap::new(),
            refresh_token_when: DEFAULT_REFRESH_TOKEN_WHEN.to_owned(),
            token_response: TokenResponseConfig::default(),
        }
    }
}

/// Field names of a token endpoint response.
///
/// Fields are dot separated paths into the JSON body, so `data.token` reads
/// `{"data": {"token": ...}}`.
#[derive(Debug, Clone, Deserialize, bon::Builder)]
#[serde(default)]
pub struct TokenResponseConfig {
    /// Path of the access token.
    #[builder(into, default = "access_token".to_owned())]
    pub access_token_field: String,
    /// Path of the refresh token.
    #[builder(into, default = "refresh_token".to_owned())]
    pub refresh_token_field: String,
    /// Path of the token lifetime.
    #[builder(into, default = "expires_in".to_owned())]
    pub expires_in_field: String,
    /// Extra parameters to keep, by name, with the path they are read from.
    #[builder(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl Default for TokenResponseConfig {
    fn default() -> Self {
        Self {
            access_token_field: "access_token".to_owned(),
            refresh_token_field: "refresh_token".to_owned(),
            expires_in_field: "expires_in".to_owned(),
            custom_parameters: HashMap::new(),
        }
    }
}
