//! Authorization-code grant and single-flight token refresh.

use super::config::OAuthConfig;
use super::context::{DEFAULT_RESOURCE_OWNER_ID, ResourceOwnerOAuthContext};
use super::error::OAuthError;
use super::state::{decode_state, encode_state};
use super::token::{TokenClient, TokenResponse};
use crate::store::{
    InMemoryObjectStore, KeyedLockManager, LockFactory, NamedLock, NamedLockGuard, ObjectStore,
    ObjectStoreConfig,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

const CODE_PARAMETER: &str = "code";
const STATE_PARAMETER: &str = "state";
const AUTHORIZATION_STATUS_PARAMETER: &str = "authorizationStatus";

/// Outcome of an authorization redirect, reported to the page the user is
/// sent back to through the `authorizationStatus` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    /// Tokens were retrieved and stored.
    CodeReceived,
    /// The redirect carried no `code` parameter.
    NoAuthorizationCode,
    /// The token endpoint could not be called or rejected the request.
    TokenUrlCallFailed,
    /// The token endpoint response lacked the tokens.
    TokenNotFound,
}

impl AuthorizationStatus {
    /// Numeric code of the status.
    pub fn code(&self) -> u16 {
        match self {
            AuthorizationStatus::CodeReceived => 0,
            AuthorizationStatus::NoAuthorizationCode => 100,
            AuthorizationStatus::TokenUrlCallFailed => 200,
            AuthorizationStatus::TokenNotFound => 201,
        }
    }
}

/// The HTTP response to send for an authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOutcome {
    /// HTTP status: 200, 302, 400 or 500.
    pub status: u16,
    /// `Location` header, set for 302.
    pub location: Option<String>,
    /// Response body.
    pub message: String,
    /// What happened.
    pub authorization_status: AuthorizationStatus,
}

struct OwnerSlot {
    lock: NamedLock,
    context: RwLock<Option<ResourceOwnerOAuthContext>>,
}

/// Runs the authorization-code grant and keeps tokens per resource owner.
///
/// Contexts are cached in memory and persisted to an [`ObjectStore`] under
/// `"{config name}-{owner}"`. Each owner has a named lock with the same key;
/// it is held whenever the owner's tokens are written.
pub struct AuthorizationCodeDancer {
    config: OAuthConfig,
    client: Arc<dyn TokenClient>,
    store: Arc<dyn ObjectStore<ResourceOwnerOAuthContext>>,
    locks: Arc<dyn LockFactory>,
    owners: DashMap<String, Arc<OwnerSlot>>,
}

impl fmt::Debug for AuthorizationCodeDancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationCodeDancer")
            .field("name", &self.config.name)
            .field("token_url", &self.config.token_url)
            .field("owners", &self.owners.len())
            .finish_non_exhaustive()
    }
}

impl AuthorizationCodeDancer {
    /// Creates a dancer with an in-memory context store.
    pub fn new(config: OAuthConfig, client: Arc<dyn TokenClient>) -> Self {
        Self {
            config,
            client,
            store: Arc::new(InMemoryObjectStore::new(ObjectStoreConfig::default())),
            locks: Arc::new(KeyedLockManager::new()),
            owners: DashMap::new(),
        }
    }

    /// Persists contexts to `store`.
    pub fn with_object_store(
        mut self,
        store: Arc<dyn ObjectStore<ResourceOwnerOAuthContext>>,
    ) -> Self {
        self.store = store;
        self
    }

    /// Creates owner locks with `locks`.
    pub fn with_lock_factory(mut self, locks: Arc<dyn LockFactory>) -> Self {
        self.locks = locks;
        self.owners.clear();
        self
    }

    /// The configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    fn key(&self, owner: &str) -> String {
        format!("{}-{}", self.config.name, owner)
    }

    fn slot(&self, owner: &str) -> Arc<OwnerSlot> {
        self.owners
            .entry(owner.to_owned())
            .or_insert_with(|| {
                Arc::new(OwnerSlot {
                    lock: self.locks.create_lock(&self.key(owner)),
                    context: RwLock::new(None),
                })
            })
            .clone()
    }

    /// The current context of `owner`, empty if it was never authorized.
    pub async fn context_for(&self, owner: &str) -> Result<ResourceOwnerOAuthContext, OAuthError> {
        let slot = self.slot(owner);
        if let Some(context) = slot.context.read().clone() {
            return Ok(context);
        }
        let context = self
            .store
            .retrieve(&self.key(owner))
            .await?
            .unwrap_or_else(|| ResourceOwnerOAuthContext::new(owner));
        *slot.context.write() = Some(context.clone());
        Ok(context)
    }

    /// The current access token of `owner`.
    pub async fn access_token(&self, owner: &str) -> Result<String, OAuthError> {
        self.context_for(owner)
            .await?
            .access_token
            .ok_or_else(|| OAuthError::NoAccessToken {
                owner: owner.to_owned(),
            })
    }

    /// Forgets the tokens of `owner`.
    pub async fn invalidate_context(&self, owner: &str) -> Result<(), OAuthError> {
        let slot = self.slot(owner);
        let _guard = slot.lock.lock().await;
        *slot.context.write() = None;
        self.store.remove(&self.key(owner)).await?;
        tracing::debug!(config = %self.config.name, owner, "oauth context invalidated");
        Ok(())
    }

    /// The URL the resource owner is sent to in order to authorize the client.
    pub fn authorization_url(
        &self,
        resource_owner_id: Option<&str>,
        state: Option<&str>,
        on_complete_redirect_to: Option<&str>,
    ) -> Result<String, OAuthError> {
        let base = self
            .config
            .authorization_url
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidUrl("no authorization url configured".into()))?;

        let mut params: Vec<(&str, String)> = vec![
            ("response_type", "code".to_owned()),
            ("client_id", self.config.client_id.clone()),
        ];
        if let Some(scopes) = &self.config.scopes {
            params.push(("scope", scopes.clone()));
        }
        if let Some(redirect_uri) = &self.config.external_callback_url {
            params.push(("redirect_uri", redirect_uri.clone()));
        }
        let state = encode_state(state, resource_owner_id, on_complete_redirect_to);
        if !state.is_empty() {
            params.push((STATE_PARAMETER, state));
        }
        let mut custom: Vec<_> = self.config.custom_parameters.iter().collect();
        custom.sort();
        params.extend(custom.into_iter().map(|(k, v)| (k.as_str(), v.clone())));

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if base.contains('?') { '&' } else { '?' };
        Ok(format!("{base}{separator}{query}"))
    }

    /// Handles the provider's redirect back to the client.
    ///
    /// Exchanges the `code` for tokens and stores them for the owner encoded
    /// in `state`, or [`DEFAULT_RESOURCE_OWNER_ID`].
    pub async fn handle_redirect(&self, query: &HashMap<String, String>) -> RedirectOutcome {
        let decoded = decode_state(query.get(STATE_PARAMETER).map(String::as_str));
        let redirect_to = decoded.on_complete_redirect_to.clone();
        let respond = |status: u16, message: String, authorization_status: AuthorizationStatus| {
            match &redirect_to {
                Some(url) => RedirectOutcome {
                    status: 302,
                    location: Some(append_query_param(
                        url,
                        AUTHORIZATION_STATUS_PARAMETER,
                        &authorization_status.code().to_string(),
                    )),
                    message,
                    authorization_status,
                },
                None => RedirectOutcome {
                    status,
                    location: None,
                    message,
                    authorization_status,
                },
            }
        };

        let Some(code) = query.get(CODE_PARAMETER) else {
            tracing::error!(config = %self.config.name, "redirect carries no authorization code");
            return respond(
                400,
                "Failure retrieving access token: no authorization code".into(),
                AuthorizationStatus::NoAuthorizationCode,
            );
        };

        let form = self.client_form(CODE_PARAMETER, code, "authorization_code");
        let owner = decoded
            .resource_owner_id
            .as_deref()
            .unwrap_or(DEFAULT_RESOURCE_OWNER_ID);

        let result = match self.exchange(&form).await {
            Ok(response) => {
                let slot = self.slot(owner);
                let guard = slot.lock.lock().await;
                self.update_context(&guard, owner, response, decoded.original)
                    .await
            }
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => respond(
                200,
                "Successfully retrieved access token".into(),
                AuthorizationStatus::CodeReceived,
            ),
            Err(OAuthError::TokenNotFound { field }) => {
                tracing::error!(config = %self.config.name, field, "token not found in response");
                respond(
                    500,
                    "Failed getting access token or refresh token from token URL response".into(),
                    AuthorizationStatus::TokenNotFound,
                )
            }
            Err(error) => {
                tracing::error!(config = %self.config.name, error = %error, "token url call failed");
                respond(
                    500,
                    format!("Failure calling token url {}: {error}", self.config.token_url),
                    AuthorizationStatus::TokenUrlCallFailed,
                )
            }
        }
    }

    /// Refreshes the tokens of `owner`, at most once at a time.
    ///
    /// The first caller exchanges the refresh token and gets the outcome of
    /// that exchange. Callers arriving while it runs wait for it to finish
    /// and return `Ok` whatever happened; they re-read the context to see the
    /// new token, or the old one if the refresh failed.
    pub async fn refresh_token(&self, owner: &str) -> Result<(), OAuthError> {
        let slot = self.slot(owner);
        let Some(guard) = slot.lock.try_lock() else {
            tracing::debug!(config = %self.config.name, owner, "waiting for refresh in flight");
            drop(slot.lock.lock().await);
            return Ok(());
        };

        tracing::debug!(config = %self.config.name, owner, "refreshing token");
        let context = self.context_for(owner).await?;
        let refresh_token = context.refresh_token.ok_or_else(|| OAuthError::NoRefreshToken {
            owner: owner.to_owned(),
        })?;

        let form = self.client_form("refresh_token", &refresh_token, "refresh_token");
        match self.exchange(&form).await {
            Ok(response) => {
                self.update_context(&guard, owner, response, None).await?;
                tracing::debug!(config = %self.config.name, owner, "token refreshed");
                Ok(())
            }
            Err(error) => {
                tracing::error!(config = %self.config.name, owner, error = %error, "token refresh failed");
                Err(error)
            }
        }
    }

    fn client_form(&self, grant_field: &str, grant: &str, grant_type: &str) -> Vec<(String, String)> {
        let mut form = vec![
            (grant_field.to_owned(), grant.to_owned()),
            ("client_id".to_owned(), self.config.client_id.clone()),
            ("client_secret".to_owned(), self.config.client_secret.clone()),
            ("grant_type".to_owned(), grant_type.to_owned()),
        ];
        if let Some(redirect_uri) = &self.config.external_callback_url {
            form.push(("redirect_uri".to_owned(), redirect_uri.clone()));
        }
        form
    }

    async fn exchange(&self, form: &[(String, String)]) -> Result<TokenResponse, OAuthError> {
        let body = self.client.exchange(&self.config.token_url, form).await?;
        TokenResponse::from_json(&body, &self.config.token_response)
    }

    /// Applies `response` to the owner's context. `_guard` is the owner's lock.
    async fn update_context(
        &self,
        _guard: &NamedLockGuard,
        owner: &str,
        response: TokenResponse,
        state: Option<String>,
    ) -> Result<(), OAuthError> {
        let mut context = self.context_for(owner).await?;
        context.apply(response, state);
        self.store.store(&self.key(owner), context.clone()).await?;
        *self.slot(owner).context.write() = Some(context);
        Ok(())
    }
}

fn append_query_param(url: &str, name: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{name}={}", urlencoding::encode(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct FixedClient(Result<Value, u16>);

    #[async_trait]
    impl TokenClient for FixedClient {
        async fn exchange(&self, _url: &str, _form: &[(String, String)]) -> Result<Value, OAuthError> {
            self.0.clone().map_err(|status| OAuthError::TokenUrl {
                status,
                body: "denied".into(),
            })
        }
    }

    fn dancer(response: Result<Value, u16>) -> AuthorizationCodeDancer {
        let config = OAuthConfig::builder()
            .client_id("cid")
            .client_secret("secret")
            .token_url("http://idp/token")
            .authorization_url("http://idp/authorize")
            .external_callback_url("http://app/callback")
            .scopes("read write")
            .build();
        AuthorizationCodeDancer::new(config, Arc::new(FixedClient(response)))
    }

    #[test]
    fn test_authorization_url() {
        let url = dancer(Ok(json!({})))
            .authorization_url(Some("user1"), Some("s"), None)
            .unwrap();
        assert_eq!(
            url,
            "http://idp/authorize?response_type=code&client_id=cid&scope=read%20write\
             &redirect_uri=http%3A%2F%2Fapp%2Fcallback&state=s%3AresourceOwnerId%3Duser1"
        );
    }

    #[tokio::test]
    async fn test_redirect_stores_tokens_for_owner() {
        let dancer = dancer(Ok(json!({"access_token": "at", "refresh_token": "rt"})));
        let query = HashMap::from([
            ("code".to_owned(), "c0de".to_owned()),
            ("state".to_owned(), "orig:resourceOwnerId=user1".to_owned()),
        ]);

        let outcome = dancer.handle_redirect(&query).await;
        assert_eq!(outcome.status, 200);
        let ctx = dancer.context_for("user1").await.unwrap();
        assert_eq!(ctx.access_token.as_deref(), Some("at"));
        assert_eq!(ctx.state.as_deref(), Some("orig"));
    }

    #[tokio::test]
    async fn test_redirect_outcomes() {
        let no_code = dancer(Ok(json!({}))).handle_redirect(&HashMap::new()).await;
        assert_eq!(no_code.status, 400);

        let query = HashMap::from([
            ("code".to_owned(), "c".to_owned()),
            ("state".to_owned(), ":onCompleteRedirectTo=http://app/done".to_owned()),
        ]);
        let failed = dancer(Err(500)).handle_redirect(&query).await;
        assert_eq!(failed.status, 302);
        assert_eq!(
            failed.location.as_deref(),
            Some("http://app/done?authorizationStatus=200")
        );

        let missing = dancer(Ok(json!({"token": "x"})))
            .handle_redirect(&HashMap::from([("code".to_owned(), "c".to_owned())]))
            .await;
        assert_eq!(missing.status, 500);
        assert_eq!(missing.authorization_status, AuthorizationStatus::TokenNotFound);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let dancer = dancer(Ok(json!({"access_token": "at"})));
        let err = dancer.refresh_token("nobody").await.unwrap_err();
        assert!(matches!(err, OAuthError::NoRefreshToken { owner } if owner == "nobody"));
        // The lock was released.
        assert!(dancer.slot("nobody").lock.try_lock().is_some());
    }

    /// Holds refresh exchanges until the gate opens.
    #[derive(Default)]
    struct GatedClient {
        refreshing: tokio::sync::Notify,
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl TokenClient for GatedClient {
        async fn exchange(&self, _url: &str, form: &[(String, String)]) -> Result<Value, OAuthError> {
            let refresh = form
                .iter()
                .any(|(k, v)| k == "grant_type" && v == "refresh_token");
            if !refresh {
                return Ok(json!({"access_token": "from-redirect", "refresh_token": "rt-new"}));
            }
            self.refreshing.notify_one();
            self.gate.notified().await;
            Ok(json!({"access_token": "from-refresh"}))
        }
    }

    #[tokio::test]
    async fn test_redirect_waits_for_refresh_in_flight() {
        let client = Arc::new(GatedClient::default());
        let config = OAuthConfig::builder()
            .client_id("cid")
            .client_secret("secret")
            .token_url("http://idp/token")
            .build();
        let dancer = Arc::new(AuthorizationCodeDancer::new(config, client.clone()));
        let mut seeded = ResourceOwnerOAuthContext::new("user1");
        seeded.access_token = Some("stale".into());
        seeded.refresh_token = Some("rt-old".into());
        dancer.store.store(&dancer.key("user1"), seeded).await.unwrap();

        let refresh = tokio::spawn({
            let dancer = Arc::clone(&dancer);
            async move { dancer.refresh_token("user1").await }
        });
        client.refreshing.notified().await;

        let redirect = tokio::spawn({
            let dancer = Arc::clone(&dancer);
            async move {
                let query = HashMap::from([
                    ("code".to_owned(), "c0de".to_owned()),
                    ("state".to_owned(), ":resourceOwnerId=user1".to_owned()),
                ]);
                dancer.handle_redirect(&query).await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!redirect.is_finished());

        client.gate.notify_one();
        refresh.await.unwrap().unwrap();
        assert_eq!(redirect.await.unwrap().status, 200);

        let ctx = dancer.context_for("user1").await.unwrap();
        assert_eq!(ctx.access_token.as_deref(), Some("from-redirect"));
        assert_eq!(ctx.refresh_token.as_deref(), Some("rt-new"));
    }
}
