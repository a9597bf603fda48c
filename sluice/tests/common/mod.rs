#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use sluice::oauth::{
    AuthorizationCodeDancer, OAuthConfig, OAuthError, ResourceOwnerOAuthContext, TokenClient,
};
use sluice::store::{InMemoryObjectStore, ObjectStore, ObjectStoreConfig};
use sluice::{ContextArena, Event, IntoProcessorRef, processor_fn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Events and Processors
// ============================================================================

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn root_event(arena: &Arc<ContextArena>, payload: &str) -> Event {
    Event::new(payload, arena.new_root())
}

/// Appends `suffix` to a text payload.
pub fn append(suffix: &'static str) -> impl IntoProcessorRef {
    processor_fn(format!("append-{suffix}"), move |event: Event| async move {
        let text = event.payload().as_str().unwrap_or_default().to_owned();
        Ok(Some(event.with_payload(text + suffix)))
    })
}

// ============================================================================
// OAuth
// ============================================================================

pub const OWNER: &str = "user1";

/// Token endpoint double: counts exchanges and issues `at-<n>` tokens.
pub struct MockTokenClient {
    exchanges: AtomicUsize,
    delay: Duration,
    fail_with: Option<u16>,
}

impl MockTokenClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            exchanges: AtomicUsize::new(0),
            delay,
            fail_with: None,
        }
    }

    pub fn failing(delay: Duration, status: u16) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::new(delay)
        }
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenClient for MockTokenClient {
    async fn exchange(&self, _url: &str, form: &[(String, String)]) -> Result<Value, OAuthError> {
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if let Some(status) = self.fail_with {
            return Err(OAuthError::TokenUrl {
                status,
                body: "unavailable".into(),
            });
        }
        let grant = form
            .iter()
            .find(|(k, _)| k == "grant_type")
            .map(|(_, v)| v.clone());
        Ok(json!({
            "access_token": format!("at-{n}"),
            "expires_in": 3600,
            "grant": grant,
        }))
    }
}

/// A dancer whose owner [`OWNER`] holds a `stale` access token and a
/// refresh token.
pub async fn seeded_dancer(client: Arc<MockTokenClient>) -> Arc<AuthorizationCodeDancer> {
    let store = Arc::new(InMemoryObjectStore::<ResourceOwnerOAuthContext>::new(
        ObjectStoreConfig::default(),
    ));
    let mut context = ResourceOwnerOAuthContext::new(OWNER);
    context.access_token = Some("stale".into());
    context.refresh_token = Some("rt-0".into());
    store
        .store(&format!("oauth-{OWNER}"), context)
        .await
        .unwrap();

    let config = OAuthConfig::builder()
        .client_id("cid")
        .client_secret("secret")
        .token_url("http://idp.test/token")
        .build();
    Arc::new(AuthorizationCodeDancer::new(config, client).with_object_store(store))
}
