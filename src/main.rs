/// Files backend
///
/// Accounts with email confirmation and password reset, Google sign-in,
/// cookie sessions and a question/answer board over SQLite.

mod account;
mod api;
mod auth;
mod board;
mod config;
mod context;
mod credentials;
mod db;
mod error;
mod jobs;
mod mailer;
mod metrics;
mod oauth;
mod rate_limit;
mod server;
mod session;
mod tokens;

use config::ServerConfig;
use context::AppContext;
use error::AppResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration first so the log level can come from it
    let config = ServerConfig::from_env()?;

    let json = config.logging.json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("files_backend={},tower_http=debug", config.logging.level).into()
            }),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    print_banner();
    metrics::record_start();

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
     _____ _ _
    |  ___(_) | ___  ___
    | |_  | | |/ _ \/ __|
    |  _| | | |  __/\__ \
    |_|   |_|_|\___||___/

        Files backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
