/// API routes and handlers
pub mod accounts;
pub mod board;
pub mod health;
pub mod middleware;
pub mod oauth;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(accounts::routes())
        .merge(oauth::routes())
        .merge(board::routes())
}
