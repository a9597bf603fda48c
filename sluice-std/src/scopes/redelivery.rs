//! Idempotent redelivery policy.
//!
//! Each message gets a stable id, either from an expression or from a digest
//! of its payload. Failed attempts are counted per id in an [`ObjectStore`],
//! under a named lock scoped to the policy and the id:
//!
//! ```text
//! Unseen --fail--> Tracking(1) --fail--> ... Tracking(max) --next--> Exhausted
//!    ^                  |
//!    +----success-------+
//! ```
//!
//! Once the counter reaches `max_redelivery_count`, the next delivery of the
//! same id fails with [`ErrorKind::RedeliveryExhausted`] without running the
//! nested chain.
//!
//! With the default in-memory store, counters expire `counter_ttl` after
//! their last update. A background sweep removes them; it starts with the
//! first recorded failure and is stopped with the scope.

use crate::expression::{DefaultExpressionResolver, ExpressionResolver};
use crate::store::{InMemoryObjectStore, KeyedLockManager, LockFactory, ObjectStore, ObjectStoreConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use sluice_core::{
    Capabilities, Chain, Component, ErrorKind, Event, LifecycleError, ProcessError, ProcessResult,
    Processor, Scope,
};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A `max_redelivery_count` that tolerates no redelivery: the first failure
/// of a message makes every later delivery of it fail.
pub const REDELIVERY_FAIL_ON_FIRST: u32 = 0;

const DEFAULT_MAX_REDELIVERY_COUNT: u32 = 5;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Digest used to derive message ids from payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-224.
    #[serde(rename = "SHA-224")]
    Sha224,
    /// SHA-256.
    #[default]
    #[serde(rename = "SHA-256")]
    Sha256,
    /// SHA-384.
    #[serde(rename = "SHA-384")]
    Sha384,
    /// SHA-512.
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl DigestAlgorithm {
    /// Hex-encoded digest of `bytes`.
    pub fn hex_digest(&self, bytes: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha224 => hex::encode(Sha224::digest(bytes)),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            DigestAlgorithm::Sha384 => hex::encode(Sha384::digest(bytes)),
            DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DigestAlgorithm::Sha224 => "SHA-224",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        })
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "SHA-224" | "SHA224" => Ok(DigestAlgorithm::Sha224),
            "SHA-256" | "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA-384" | "SHA384" => Ok(DigestAlgorithm::Sha384),
            "SHA-512" | "SHA512" => Ok(DigestAlgorithm::Sha512),
            other => Err(format!("unsupported digest algorithm `{other}`")),
        }
    }
}

/// Configuration of a [`RedeliveryPolicy`].
#[derive(Debug, Clone, Deserialize, bon::Builder)]
#[serde(default)]
pub struct RedeliveryPolicyConfig {
    /// Failed attempts tolerated before deliveries are rejected.
    #[builder(default = DEFAULT_MAX_REDELIVERY_COUNT)]
    pub max_redelivery_count: u32,
    /// Derive ids by hashing the payload when no expression is configured.
    #[builder(default = true)]
    pub use_secure_hash: bool,
    /// Digest used when hashing payloads.
    #[builder(default)]
    pub message_digest_algorithm: DigestAlgorithm,
    /// Expression evaluated to obtain the message id.
    #[builder(into)]
    pub id_expression: Option<String>,
    /// Namespace of the counters. Defaults to a random UUID per policy.
    #[builder(into)]
    pub policy_id: Option<String>,
    /// Lifetime of a counter after its last update.
    #[builder(default = Duration::from_secs(300))]
    pub counter_ttl: Duration,
}

impl Default for RedeliveryPolicyConfig {
    fn default() -> Self {
        Self {
            max_redelivery_count: DEFAULT_MAX_REDELIVERY_COUNT,
            use_secure_hash: true,
            message_digest_algorithm: DigestAlgorithm::Sha256,
            id_expression: None,
            policy_id: None,
            counter_ttl: Duration::from_secs(300),
        }
    }
}

/// Failed attempts recorded for a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeliveryCounter {
    /// The message id.
    pub message_id: String,
    /// Failed attempts so far.
    pub attempts: u32,
}

/// Scope limiting how often a failing message is redelivered.
pub struct RedeliveryPolicy {
    name: Cow<'static, str>,
    nested: Chain,
    config: RedeliveryPolicyConfig,
    policy_id: String,
    store: Arc<dyn ObjectStore<RedeliveryCounter>>,
    // Set while `store` is the built-in one.
    counters: Option<Arc<InMemoryObjectStore<RedeliveryCounter>>>,
    sweep: Mutex<Option<JoinHandle<()>>>,
    locks: Arc<dyn LockFactory>,
    resolver: Arc<dyn ExpressionResolver>,
}

impl RedeliveryPolicy {
    /// Wraps `nested` with an in-memory counter store and lock manager.
    pub fn new(nested: Chain, config: RedeliveryPolicyConfig) -> Self {
        let counters = Arc::new(InMemoryObjectStore::<RedeliveryCounter>::new(
            ObjectStoreConfig::builder()
                .entry_ttl(config.counter_ttl)
                .expiration_interval(config.counter_ttl.max(MIN_SWEEP_INTERVAL))
                .build(),
        ));
        let policy_id = config
            .policy_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            name: Cow::Borrowed("redelivery-policy"),
            nested,
            config,
            policy_id,
            store: counters.clone(),
            counters: Some(counters),
            sweep: Mutex::new(None),
            locks: Arc::new(KeyedLockManager::new()),
            resolver: Arc::new(DefaultExpressionResolver),
        }
    }

    /// Names the scope.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Uses another counter store.
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore<RedeliveryCounter>>) -> Self {
        self.store = store;
        self.counters = None;
        self
    }

    /// Uses another lock factory.
    pub fn with_lock_factory(mut self, locks: Arc<dyn LockFactory>) -> Self {
        self.locks = locks;
        self
    }

    /// Uses another expression resolver.
    pub fn with_expression_resolver(mut self, resolver: Arc<dyn ExpressionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Namespace of this policy's counters and locks.
    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    /// The configuration.
    pub fn config(&self) -> &RedeliveryPolicyConfig {
        &self.config
    }

    /// Derives the id of a message.
    pub fn message_id(&self, event: &Event) -> Result<String, ProcessError> {
        if let Some(expression) = &self.config.id_expression {
            return self.resolver.resolve(expression, event).map_err(|error| {
                ProcessError::new(ErrorKind::CorrelationIdUnavailable(format!(
                    "id expression `{expression}` failed: {error}"
                )))
            });
        }
        if !self.config.use_secure_hash {
            return Err(ErrorKind::CorrelationIdUnavailable(
                "no id expression configured and payload hashing is disabled".into(),
            )
            .into());
        }
        match event.payload().to_bytes() {
            Some(bytes) => Ok(self.config.message_digest_algorithm.hex_digest(&bytes)),
            None => Err(ErrorKind::CorrelationIdUnavailable(format!(
                "payload of {event} cannot be serialized for hashing"
            ))
            .into()),
        }
    }

    /// The counter currently stored for the message carried by `event`.
    pub async fn counter_for(&self, event: &Event) -> Result<Option<RedeliveryCounter>, ProcessError> {
        let key = self.counter_key(&self.message_id(event)?);
        self.store.retrieve(&key).await.map_err(store_error)
    }

    fn counter_key(&self, message_id: &str) -> String {
        format!("{}:{}", self.policy_id, message_id)
    }

    fn ensure_sweep(&self) {
        let Some(counters) = &self.counters else {
            return;
        };
        let mut sweep = self.sweep.lock();
        if sweep.as_ref().is_none_or(JoinHandle::is_finished) {
            *sweep = Some(counters.spawn_expiration_sweep());
        }
    }

    fn stop_sweep(&self) {
        if let Some(sweep) = self.sweep.lock().take() {
            sweep.abort();
        }
    }

    async fn deliver(&self, event: Event, message_id: String) -> ProcessResult {
        let key = self.counter_key(&message_id);
        let _guard = self.locks.create_lock(&key).lock().await;

        let counter = match self.store.retrieve(&key).await {
            Ok(counter) => counter,
            Err(error) => return Err(store_error(error).with_event(event)),
        };
        if let Some(counter) = &counter {
            if counter.attempts >= self.config.max_redelivery_count {
                tracing::warn!(
                    policy = %self.policy_id,
                    message_id = %message_id,
                    attempts = counter.attempts,
                    max = self.config.max_redelivery_count,
                    "redelivery exhausted"
                );
                return Err(ProcessError::new(ErrorKind::RedeliveryExhausted {
                    message_id,
                    attempts: counter.attempts,
                    max_redelivery_count: self.config.max_redelivery_count,
                })
                .with_event(event));
            }
        }

        match self.nested.process(event.clone()).await {
            Ok(result) => {
                if counter.is_some() {
                    if let Err(error) = self.store.remove(&key).await {
                        return Err(store_error(error).with_event(event));
                    }
                }
                Ok(result)
            }
            Err(error) => {
                let attempts = counter.map_or(1, |counter| counter.attempts.saturating_add(1));
                tracing::debug!(policy = %self.policy_id, message_id = %message_id, attempts, "delivery failed");
                let counter = RedeliveryCounter {
                    message_id: message_id.clone(),
                    attempts,
                };
                match self.store.store(&key, counter).await {
                    Ok(()) => self.ensure_sweep(),
                    Err(store) => tracing::error!(
                        policy = %self.policy_id,
                        message_id = %message_id,
                        error = %store,
                        "failed to record delivery attempt"
                    ),
                }
                Err(error.or_event(event))
            }
        }
    }
}

fn store_error(error: crate::store::StoreError) -> ProcessError {
    ErrorKind::Store(Arc::new(error)).into()
}

impl Component for RedeliveryPolicy {
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SCOPE | Capabilities::LIFECYCLE
    }

    fn as_scope(&self) -> Option<&dyn Scope> {
        Some(self)
    }

    fn initialise(&self) -> Result<(), LifecycleError> {
        self.nested.initialise()
    }

    fn start(&self) -> Result<(), LifecycleError> {
        self.nested.start()
    }

    fn stop(&self) -> Result<(), LifecycleError> {
        self.stop_sweep();
        self.nested.stop()
    }

    fn dispose(&self) {
        self.stop_sweep();
        self.nested.dispose();
    }
}

impl Scope for RedeliveryPolicy {
    fn nested(&self) -> &Chain {
        &self.nested
    }
}

impl Processor for RedeliveryPolicy {
    async fn process(&self, event: Event) -> ProcessResult {
        let message_id = match self.message_id(&event) {
            Ok(id) => id,
            Err(error) => return Err(error.with_event(event)),
        };
        self.deliver(event, message_id).await
    }
}
