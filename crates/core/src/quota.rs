//! Quota engine
//!
//! Decides whether a metered operation may proceed given the tenant's plan
//! allowance and the period's consumption so far. The check is advisory:
//! it is correct at check time, but check-then-act is not atomic with the
//! later `record_usage`, so concurrent requests from one tenant can
//! overshoot the ceiling by up to the in-flight concurrency. That matches
//! the billing model upstream and is deliberate; callers wanting strict
//! admission must serialize their own check/record pairs.

use chrono::{DateTime, Datelike, Days, Months, NaiveTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use mealforge_shared::{ActionKind, QuotaPeriod, Tenant};

use crate::error::{CoreError, CoreResult};

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed {
        /// Requests left in the period after this one; `i64::MAX` for
        /// unbounded plans
        remaining: i64,
    },
    Denied {
        /// When the billing window rolls over and the counter resets
        reset_at: DateTime<Utc>,
    },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Start of the current billing window (UTC calendar boundaries).
pub(crate) fn period_start(period: QuotaPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let start = match period {
        QuotaPeriod::Day => today,
        QuotaPeriod::Month => today - Days::new(u64::from(today.day0())),
    };
    start.and_time(NaiveTime::MIN).and_utc()
}

/// First instant of the next billing window.
pub(crate) fn period_reset(period: QuotaPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    let start = period_start(period, now).date_naive();
    let next = match period {
        QuotaPeriod::Day => start + Days::new(1),
        QuotaPeriod::Month => start + Months::new(1),
    };
    next.and_time(NaiveTime::MIN).and_utc()
}

#[derive(Clone)]
pub struct QuotaEngine {
    pool: SqlitePool,
}

impl QuotaEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Check whether `tenant_id` may perform `action` right now.
    pub async fn check_quota(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        action: ActionKind,
    ) -> CoreResult<QuotaDecision> {
        self.check_quota_at(tenant_id, user_id, action, Utc::now())
            .await
    }

    /// Quota check evaluated at an explicit instant.
    pub async fn check_quota_at(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        action: ActionKind,
        now: DateTime<Utc>,
    ) -> CoreResult<QuotaDecision> {
        let tenant: Tenant = sqlx::query_as("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::NotFound("tenant"))?;

        let Some(allowance) = tenant.plan().allowance(action) else {
            return Ok(QuotaDecision::Allowed { remaining: i64::MAX });
        };

        let period = action.period();
        let window_start = period_start(period, now);

        let used: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM usage_logs
            WHERE tenant_id = $1 AND action = $2 AND created_at >= $3
            "#,
        )
        .bind(tenant_id)
        .bind(action.as_str())
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        if used >= allowance {
            let reset_at = period_reset(period, now);
            info!(
                tenant_id = %tenant_id,
                user_id = %user_id,
                action = %action,
                used,
                allowance,
                reset_at = %reset_at,
                "Quota denied"
            );
            return Ok(QuotaDecision::Denied { reset_at });
        }

        Ok(QuotaDecision::Allowed {
            remaining: allowance - used - 1,
        })
    }

    /// Like [`check_quota`](Self::check_quota) but maps a denial to
    /// [`CoreError::QuotaExceeded`] for callers on the error path.
    pub async fn enforce(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        action: ActionKind,
    ) -> CoreResult<()> {
        match self.check_quota(tenant_id, user_id, action).await? {
            QuotaDecision::Allowed { .. } => Ok(()),
            QuotaDecision::Denied { reset_at } => Err(CoreError::QuotaExceeded { reset_at }),
        }
    }
}
