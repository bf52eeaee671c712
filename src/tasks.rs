use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::auth::session;
use crate::billing;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;
use crate::uploads;
use crate::users;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_users: usize,
    pub expired_sessions: usize,
    pub lapsed_subscriptions: usize,
    /// Listings that went with the deleted users; their image directories
    /// are still on disk.
    pub deleted_listings: Vec<String>,
}

impl SweepReport {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One maintenance pass over the database: scheduled account deletions,
/// dead sessions and lapsed subscriptions.
pub fn sweep(pool: &DbPool) -> AppResult<SweepReport> {
    let mut conn = pool.get()?;

    // Capture the listing ids before the cascade takes them.
    let tx = conn.transaction()?;
    let deleted_listings = users::listings_due_for_deletion(&tx)?;
    let deleted_users = users::purge_scheduled_deletions(&tx)?;
    tx.commit()?;

    Ok(SweepReport {
        deleted_users,
        expired_sessions: session::purge_expired(&conn)?,
        lapsed_subscriptions: billing::expire_lapsed(&conn)?,
        deleted_listings,
    })
}

/// [`sweep`] off the async runtime, then drop the image directories of
/// every listing it deleted.
pub async fn run_sweep(pool: DbPool, uploads_root: PathBuf) -> AppResult<SweepReport> {
    let report = tokio::task::spawn_blocking(move || sweep(&pool))
        .await
        .map_err(|e| AppError::Internal(format!("Maintenance task panicked: {e}")))??;
    for listing_id in &report.deleted_listings {
        uploads::remove_listing_dir(&uploads_root, listing_id).await;
    }
    Ok(report)
}

/// Run [`run_sweep`] on a fixed interval until the runtime shuts down.
pub fn spawn_maintenance(pool: DbPool, uploads_root: PathBuf, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(every);
        loop {
            timer.tick().await;
            match run_sweep(pool.clone(), uploads_root.clone()).await {
                Ok(report) if !report.is_empty() => {
                    tracing::info!(
                        deleted_users = report.deleted_users,
                        deleted_listings = report.deleted_listings.len(),
                        expired_sessions = report.expired_sessions,
                        lapsed_subscriptions = report.lapsed_subscriptions,
                        "Maintenance sweep"
                    );
                }
                Ok(_) => tracing::debug!("Maintenance sweep: nothing to do"),
                Err(e) => tracing::error!("Maintenance sweep failed: {}", e),
            }
        }
    })
}
