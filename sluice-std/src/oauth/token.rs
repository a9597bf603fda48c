//! Token endpoint client and response parsing.

use super::config::TokenResponseConfig;
use super::error::OAuthError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Tokens extracted from a token endpoint response.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResponse {
    /// The issued access token.
    pub access_token: String,
    /// The refresh token, when one was issued.
    pub refresh_token: Option<String>,
    /// Token lifetime as reported by the provider.
    pub expires_in: Option<String>,
    /// Configured custom parameters, `Null` when absent.
    pub custom_parameters: HashMap<String, Value>,
}

impl TokenResponse {
    /// Reads the tokens from a JSON body. A missing access token is an error.
    pub fn from_json(body: &Value, config: &TokenResponseConfig) -> Result<Self, OAuthError> {
        if !body.is_object() {
            return Err(OAuthError::InvalidResponse(format!(
                "expected a JSON object, got {body}"
            )));
        }
        let access_token = lookup(body, &config.access_token_field)
            .and_then(as_text)
            .ok_or_else(|| OAuthError::TokenNotFound {
                field: config.access_token_field.clone(),
            })?;

        Ok(Self {
            access_token,
            refresh_token: lookup(body, &config.refresh_token_field).and_then(as_text),
            expires_in: lookup(body, &config.expires_in_field).and_then(as_text),
            custom_parameters: config
                .custom_parameters
                .iter()
                .map(|(name, path)| {
                    (name.clone(), lookup(body, path).cloned().unwrap_or(Value::Null))
                })
                .collect(),
        })
    }
}

fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(body, |value, segment| value.get(segment))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Performs token endpoint exchanges.
#[async_trait]
pub trait TokenClient: Send + Sync {
    /// Posts `form` to `token_url` and returns the JSON response body.
    ///
    /// Non-success statuses are reported as [`OAuthError::TokenUrl`].
    async fn exchange(&self, token_url: &str, form: &[(String, String)])
    -> Result<Value, OAuthError>;
}

/// [`TokenClient`] over `reqwest`, posting form-encoded bodies.
#[cfg(feature = "reqwest")]
#[derive(Debug, Clone)]
pub struct ReqwestTokenClient {
    client: reqwest::Client,
    timeout: std::time::Duration,
}

#[cfg(feature = "reqwest")]
impl ReqwestTokenClient {
    /// A client with a 30 second timeout.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Uses an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: std::time::Duration::from_secs(30),
        }
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(feature = "reqwest")]
impl Default for ReqwestTokenClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl TokenClient for ReqwestTokenClient {
    async fn exchange(
        &self,
        token_url: &str,
        form: &[(String, String)],
    ) -> Result<Value, OAuthError> {
        let response = self
            .client
            .post(token_url)
            .form(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OAuthError::Http(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenUrl {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_fields() {
        let body = json!({"access_token": "at", "refresh_token": "rt", "expires_in": 3600});
        let response = TokenResponse::from_json(&body, &TokenResponseConfig::default()).unwrap();
        assert_eq!(response.access_token, "at");
        assert_eq!(response.refresh_token.as_deref(), Some("rt"));
        assert_eq!(response.expires_in.as_deref(), Some("3600"));
    }

    #[test]
    fn test_custom_fields() {
        let config = TokenResponseConfig::builder()
            .access_token_field("data.token")
            .custom_parameters(HashMap::from([("scope".to_owned(), "data.scope".to_owned())]))
            .build();
        let body = json!({"data": {"token": "at", "scope": "read"}});

        let response = TokenResponse::from_json(&body, &config).unwrap();
        assert_eq!(response.access_token, "at");
        assert_eq!(response.refresh_token, None);
        assert_eq!(response.custom_parameters["scope"], json!("read"));
    }

    #[test]
    fn test_missing_access_token() {
        let err = TokenResponse::from_json(&json!({"error": "x"}), &TokenResponseConfig::default())
            .unwrap_err();
        assert!(matches!(err, OAuthError::TokenNotFound { field } if field == "access_token"));
    }
}
