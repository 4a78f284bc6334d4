/// Session extractors and cookie helpers
use crate::{
    context::AppContext,
    error::AppError,
    session::SESSION_COOKIE,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Value of a named cookie in the request
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Session token carried by the request: bearer header first, then the session cookie
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| cookie_value(headers, SESSION_COOKIE))
}

/// Set-Cookie value for a fresh session
pub fn session_cookie(token: &str, max_age: u64, secure: bool) -> Result<HeaderValue, AppError> {
    let mut cookie =
        format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    header_value(cookie)
}

/// Set-Cookie value for the OAuth state round trip
pub fn state_cookie(name: &str, state: &str, max_age: i64) -> Result<HeaderValue, AppError> {
    header_value(format!(
        "{name}={state}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    ))
}

/// Set-Cookie value that removes a cookie
pub fn clear_cookie(name: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"))
        .unwrap_or_else(|_| HeaderValue::from_static("invalid=; Max-Age=0"))
}

fn header_value(cookie: String) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(format!("invalid cookie value: {}", e)))
}

/// Signed-in caller
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: String,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| AppError::Authentication("not signed in".to_string()))?;

        let account_id = state
            .account_manager
            .session_account(&token)
            .await?
            .ok_or_else(|| AppError::Authentication("session expired".to_string()))?;

        Ok(AuthContext { account_id, token })
    }
}

/// Optional authenticated context - does not fail if no session is presented
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    /// Reject callers that already hold a live session
    pub fn require_signed_out(&self) -> Result<(), AppError> {
        match self.auth {
            Some(_) => Err(AppError::Authorization("already signed in".to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match session_token(&parts.headers) {
            Some(token) => state
                .account_manager
                .session_account(&token)
                .await?
                .map(|account_id| AuthContext { account_id, token }),
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; presence=tok42; oauthstate=xyz"),
        );

        assert_eq!(cookie_value(&headers, "presence"), Some("tok42".to_string()));
        assert_eq!(cookie_value(&headers, "oauthstate"), Some("xyz".to_string()));
        assert_eq!(cookie_value(&headers, "missing"), None);
        assert_eq!(session_token(&headers), Some("tok42".to_string()));
    }

    #[test]
    fn test_bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("presence=from-cookie"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));

        assert_eq!(session_token(&headers), Some("from-header".to_string()));
    }

    #[test]
    fn test_cookie_builders() {
        let cookie = session_cookie("tok", 60, true).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "presence=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=60; Secure"
        );

        let cleared = clear_cookie("oauthstate");
        assert!(cleared.to_str().unwrap().starts_with("oauthstate=;"));
        assert!(cleared.to_str().unwrap().ends_with("Max-Age=0"));
    }
}
