use crate::{context::AppContext, metrics};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expiry_sweep_job(Arc::clone(&self)));
        tokio::spawn(Self::expired_session_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Delete lapsed unconfirmed accounts (every 30 minutes by default)
    async fn expiry_sweep_job(scheduler: Arc<Self>) {
        let period = Duration::from_secs(scheduler.context.config.credentials.sweep_interval);
        let mut interval = interval(period);

        loop {
            interval.tick().await;
            let started = Instant::now();
            let now = scheduler.context.issuer.now();

            match tasks::sweep_unconfirmed_accounts(scheduler.context.credentials.as_ref(), now)
                .await
            {
                Ok(report) => {
                    if report.deleted > 0 || report.failed > 0 {
                        info!(
                            "Expiry sweep: examined {}, deleted {}, failed {}",
                            report.examined, report.deleted, report.failed
                        );
                    }
                    metrics::record_background_job(
                        "expiry_sweep",
                        "success",
                        started.elapsed().as_secs_f64(),
                    );
                }
                Err(e) => {
                    error!("Expiry sweep failed: {}", e);
                    metrics::record_background_job(
                        "expiry_sweep",
                        "failure",
                        started.elapsed().as_secs_f64(),
                    );
                }
            }
        }
    }

    /// Cleanup expired sessions (runs every hour)
    async fn expired_session_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;

            match tasks::cleanup_expired_sessions(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => error!("Failed to cleanup expired sessions: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
