/// Rate Limiting System
use crate::{
    auth::session_token,
    config::RateLimitConfig,
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
}

fn quota(rps: u32, burst: u32) -> Quota {
    Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN))
        .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN))
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(quota(
                config.authenticated_rps,
                config.burst_size,
            ))),
            unauthenticated: Arc::new(GovernorLimiter::direct(quota(
                config.unauthenticated_rps,
                (config.burst_size / 2).max(1),
            ))),
        }
    }

    /// Check rate limit for a caller holding a session
    pub fn check_authenticated(&self) -> AppResult<()> {
        self.check(&self.authenticated)
    }

    /// Check rate limit for anonymous callers
    pub fn check_unauthenticated(&self) -> AppResult<()> {
        self.check(&self.unauthenticated)
    }

    fn check(&self, limiter: &DirectLimiter) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        limiter.check().map_err(|_| AppError::RateLimitExceeded {
            retry_after: std::time::Duration::from_secs(1),
        })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    // Presence of a session credential selects the bucket; it is not verified here
    let result = if session_token(request.headers()).is_some() {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_unauthenticated()
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!("Rate limit exceeded for {}", request.uri().path());
            e.into_response()
        }
    }
}
