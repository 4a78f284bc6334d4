/// Google OAuth 2.0 provider
use super::{IdentityProvider, ProviderIdentity};
use crate::{
    config::OAuthConfig,
    error::{AppError, AppResult},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const SCOPES: &str = "https://www.googleapis.com/auth/userinfo.profile https://www.googleapis.com/auth/userinfo.email";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Fields of the v2 userinfo document we rely on
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    #[serde(default)]
    verified_email: bool,
    #[serde(default)]
    name: String,
}

/// Google sign-in over the authorization-code flow
pub struct GoogleProvider {
    http_client: Client,
    config: OAuthConfig,
}

impl GoogleProvider {
    pub fn new(config: OAuthConfig) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    async fn fetch_user_info(&self, access_token: &str) -> AppResult<GoogleUserInfo> {
        let response = self
            .http_client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("userinfo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Provider(format!(
                "userinfo returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("invalid userinfo document: {}", e)))
    }
}

fn identity_from(info: GoogleUserInfo, access_token: String) -> AppResult<ProviderIdentity> {
    if !info.verified_email {
        return Err(AppError::Authorization(
            "google account email is not verified".to_string(),
        ));
    }
    if info.email.is_empty() {
        return Err(AppError::Provider("google account has no email".to_string()));
    }

    let display_name = if info.name.trim().is_empty() {
        info.email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string()
    } else {
        info.name
    };

    Ok(ProviderIdentity {
        subject_id: info.id,
        email: info.email,
        display_name,
        access_token,
    })
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_url),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> AppResult<ProviderIdentity> {
        if code.is_empty() {
            return Err(AppError::Validation("missing authorization code".to_string()));
        }

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Provider(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("invalid token response: {}", e)))?;

        let info = self.fetch_user_info(&token.access_token).await?;
        tracing::debug!("Google identity {} resolved", info.id);

        identity_from(info, token.access_token)
    }
}
