/// Background task implementations
use crate::{context::AppContext, credentials::CredentialStore, error::AppResult, metrics};
use chrono::{DateTime, Utc};

/// Outcome of one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Unconfirmed additions looked at
    pub examined: usize,
    pub deleted: usize,
    /// Rows whose delete failed; retried on the next tick
    pub failed: usize,
}

/// Delete unconfirmed accounts whose confirmation window has lapsed.
///
/// Only the initial read can fail the sweep. A failing row is logged and
/// skipped; the delete itself re-checks `confirmed`, so an account confirmed
/// after the read survives.
pub async fn sweep_unconfirmed_accounts(
    store: &dyn CredentialStore,
    now: DateTime<Utc>,
) -> AppResult<SweepReport> {
    let additions = store.unconfirmed_additions().await?;
    let mut report = SweepReport {
        examined: additions.len(),
        ..SweepReport::default()
    };

    for addition in additions.iter().filter(|a| a.is_expired(now)) {
        match store.delete_unconfirmed_account(&addition.account_id, now).await {
            Ok(true) => {
                tracing::info!("Swept unconfirmed account {}", addition.account_id);
                report.deleted += 1;
            }
            Ok(false) => {
                tracing::debug!(
                    "Account {} changed since the sweep read it, skipping",
                    addition.account_id
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to sweep unconfirmed account {}: {}",
                    addition.account_id,
                    e
                );
                report.failed += 1;
            }
        }
    }

    metrics::record_sweep(report.deleted, report.failed);
    Ok(report)
}

/// Cleanup expired sessions
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> AppResult<u64> {
    ctx.sessions.purge_expired().await
}

/// Health check - verify all systems are operational
pub async fn health_check(ctx: &AppContext) -> AppResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}
