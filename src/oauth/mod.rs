/// Third-party sign-in
///
/// The provider turns an authorization code into a verified identity; the
/// linker reconciles that identity with local accounts.

pub mod linker;
pub mod provider;

pub use linker::IdentityLinker;
pub use provider::GoogleProvider;

use crate::error::AppResult;
use async_trait::async_trait;

/// Cookie holding the anti-forgery state during the redirect round trip
pub const STATE_COOKIE: &str = "oauthstate";

/// State cookie lifetime in seconds (one year)
pub const STATE_COOKIE_MAX_AGE: i64 = 365 * 24 * 3600;

/// Identity asserted by a provider after a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub subject_id: String,
    pub email: String,
    pub display_name: String,
    pub access_token: String,
}

/// OAuth 2.0 authorization-code provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is redirected to, carrying `state`
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange the callback code for a verified identity
    async fn exchange_code(&self, code: &str) -> AppResult<ProviderIdentity>;
}

/// Compare the returned state with the cookie value byte-for-byte
pub fn state_matches(returned: Option<&str>, cookie: Option<&str>) -> bool {
    match (returned, cookie) {
        (Some(returned), Some(cookie)) => !cookie.is_empty() && returned == cookie,
        _ => false,
    }
}
