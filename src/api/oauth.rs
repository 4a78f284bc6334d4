/// Google sign-in endpoints
use crate::{
    account::StatusMessage,
    auth::{clear_cookie, cookie_value, session_cookie, state_cookie, OptionalAuthContext},
    context::AppContext,
    error::{AppError, AppResult},
    oauth::{state_matches, IdentityProvider, STATE_COOKIE, STATE_COOKIE_MAX_AGE},
};
use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Build OAuth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/account/google/login", get(google_login))
        .route("/account/google/callback", get(google_callback))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

fn provider(ctx: &AppContext) -> AppResult<Arc<dyn IdentityProvider>> {
    ctx.identity_provider
        .clone()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not configured".to_string()))
}

/// Redirect to Google with a fresh anti-forgery state
async fn google_login(
    State(ctx): State<AppContext>,
    caller: OptionalAuthContext,
) -> AppResult<Response> {
    caller.require_signed_out()?;
    let provider = provider(&ctx)?;

    let state = ctx.issuer.issue_state();
    let cookie = state_cookie(STATE_COOKIE, &state, STATE_COOKIE_MAX_AGE)?;

    Ok((
        [(SET_COOKIE, cookie)],
        Redirect::temporary(&provider.authorization_url(&state)),
    )
        .into_response())
}

/// Finish the round trip; the state cookie is cleared whatever the outcome
async fn google_callback(
    State(ctx): State<AppContext>,
    caller: OptionalAuthContext,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let mut response = match complete_sign_in(&ctx, &caller, &headers, params).await {
        Ok(session) => (
            [(SET_COOKIE, session)],
            Json(StatusMessage::new("logged into google")),
        )
            .into_response(),
        Err(e) => {
            tracing::debug!("Google sign-in rejected: {}", e);
            e.into_response()
        }
    };

    response
        .headers_mut()
        .append(SET_COOKIE, clear_cookie(STATE_COOKIE));
    response
}

async fn complete_sign_in(
    ctx: &AppContext,
    caller: &OptionalAuthContext,
    headers: &HeaderMap,
    params: CallbackParams,
) -> AppResult<HeaderValue> {
    caller.require_signed_out()?;
    let provider = provider(ctx)?;

    let expected = cookie_value(headers, STATE_COOKIE);
    if !state_matches(params.state.as_deref(), expected.as_deref()) {
        return Err(AppError::StateMismatch);
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("missing authorization code".to_string()))?;

    let identity = provider.exchange_code(&code).await?;
    let outcome = ctx.identity_linker.link(&identity).await?;
    tracing::info!("Google sign-in: {:?}", outcome);

    let token = ctx.account_manager.open_session(outcome.account_id()).await?;
    session_cookie(
        &token,
        ctx.config.session.ttl,
        ctx.config.session.cookie_secure,
    )
}
