//! OAuth 2.0 authorization-code support.
//!
//! [`AuthorizationCodeDancer`] keeps one [`ResourceOwnerOAuthContext`] per
//! resource owner and refreshes tokens single-flight: concurrent refreshes
//! for the same owner result in one call to the token endpoint, the other
//! callers wait for it and re-read the context afterwards.
//!
//! [`OAuthRequestAuthenticator`] authorizes outgoing requests and retries a
//! request once after a refresh when the first response matches the
//! configured retry expression.

mod authenticator;
mod config;
mod context;
mod dancer;
mod error;
mod state;
mod token;

pub use authenticator::{HttpResponse, OAuthRequestAuthenticator};
pub use config::{DEFAULT_REFRESH_TOKEN_WHEN, OAuthConfig, TokenResponseConfig};
pub use context::{DEFAULT_RESOURCE_OWNER_ID, ResourceOwnerOAuthContext};
pub use dancer::{AuthorizationCodeDancer, AuthorizationStatus, RedirectOutcome};
pub use error::OAuthError;
pub use state::{DecodedState, decode_state, encode_state};
#[cfg(feature = "reqwest")]
pub use token::ReqwestTokenClient;
pub use token::{TokenClient, TokenResponse};
