//! Background hygiene sweeps
//!
//! Physically evicts expired cache entries and dead invites on a cadence.
//! The visibility rules of both stores hold whether or not this task ever
//! runs; sweeping only reclaims space.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::cache::ResponseCache;
use crate::invites::InviteService;

/// Run one sweep pass, returning (cache entries, invites) removed.
pub async fn sweep_once(cache: &ResponseCache, invites: &InviteService) -> (u64, u64) {
    let now = Utc::now();

    let cache_removed = match cache.sweep_expired(now).await {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "Cache sweep failed");
            0
        }
    };
    let invites_removed = match invites.sweep_dead(now).await {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "Invite sweep failed");
            0
        }
    };

    (cache_removed, invites_removed)
}

/// Spawn the periodic sweep loop.
pub fn spawn(cache: ResponseCache, invites: InviteService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh process
        // doesn't sweep before serving anything
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&cache, &invites).await;
        }
    })
}
