//! Error taxonomy for the governance core
//!
//! Authorization and quota failures are surfaced to the caller verbatim;
//! retrying without addressing the cause would repeat the failure. Storage
//! connectivity errors come through as `Database` and are retryable by the
//! caller with backoff. Cache misses and duplicate billing deliveries are
//! not errors and never appear here.

use chrono::{DateTime, Utc};

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Authorization denied. Fails closed, no partial data is returned
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Plan ceiling reached for the current period; recoverable by waiting
    /// for `reset_at` or upgrading the plan
    #[error("quota exceeded, resets at {reset_at}")]
    QuotaExceeded { reset_at: DateTime<Utc> },

    /// Invite token past its expiry; terminal for that token
    #[error("invite expired")]
    InviteExpired,

    /// Invite token already consumed; terminal for that token
    #[error("invite already used")]
    InviteAlreadyUsed,

    /// Redeeming user already holds a membership in the tenant
    #[error("user is already a member of this tenant")]
    AlreadyMember,

    /// Would leave an active tenant without any owner
    #[error("tenant must retain at least one owner")]
    LastOwner,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl CoreError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }
}
