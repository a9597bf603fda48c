#![allow(dead_code)]

use sluice_std::oauth::{OAuthConfig, TokenResponseConfig};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn oauth_config(token_url: String) -> OAuthConfig {
    OAuthConfig::builder()
        .name("crm")
        .client_id("cid")
        .client_secret("s3cret")
        .token_url(token_url)
        .external_callback_url("http://app.test/callback")
        .token_response(TokenResponseConfig::default())
        .build()
}
