//! Usage meter
//!
//! Append-only metering of paid operations. `usage_logs` rows are facts:
//! written once, never mutated, and every aggregate (quota counters,
//! billing summaries) is recomputed from them on demand. There is no
//! separately durable counter to drift out of sync.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use mealforge_shared::{ActionKind, MemberRole, QuotaPeriod, Tenant, UsageRecord};

use crate::authz::AuthzService;
use crate::error::{CoreError, CoreResult};
use crate::quota::period_start;

/// Derived per-tenant consumption snapshot for the current UTC day and
/// month, combined with the plan ceiling for the headline metered action.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub tenant_id: Uuid,
    pub meals_today: i64,
    pub meals_month: i64,
    pub tokens_today: i64,
    pub tokens_month: i64,
    pub cost_today_cents: i64,
    pub cost_month_cents: i64,
    /// Daily meal-generation ceiling; `i64::MAX` for unbounded plans
    pub plan_quota: i64,
    pub remaining_quota: i64,
}

#[derive(sqlx::FromRow)]
struct WindowAggregate {
    meals: i64,
    tokens: i64,
    cost_cents: i64,
}

#[derive(Clone)]
pub struct UsageMeter {
    pool: SqlitePool,
    authz: AuthzService,
}

impl UsageMeter {
    pub fn new(pool: SqlitePool, authz: AuthzService) -> Self {
        Self { pool, authz }
    }

    /// Append one usage fact. Rejects only when the (tenant, user) pair is
    /// unauthorized; metered actions are mutations, so editor privilege is
    /// required.
    pub async fn record_usage(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        action: ActionKind,
        tokens: i64,
        cost_cents: i64,
        metadata: serde_json::Value,
    ) -> CoreResult<UsageRecord> {
        self.record_usage_at(tenant_id, user_id, action, tokens, cost_cents, metadata, Utc::now())
            .await
    }

    /// [`record_usage`](Self::record_usage) with an explicit timestamp.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_usage_at(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        action: ActionKind,
        tokens: i64,
        cost_cents: i64,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> CoreResult<UsageRecord> {
        self.authz
            .authorize(user_id, tenant_id, MemberRole::Editor)
            .await?;

        if tokens < 0 || cost_cents < 0 {
            return Err(CoreError::InvalidInput(
                "tokens and cost must be non-negative".into(),
            ));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO usage_logs (id, tenant_id, user_id, action, tokens, cost_cents, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(user_id)
        .bind(action.as_str())
        .bind(tokens)
        .bind(cost_cents)
        .bind(metadata)
        .bind(at)
        .execute(&self.pool)
        .await?;

        debug!(
            tenant_id = %tenant_id,
            user_id = %user_id,
            action = %action,
            tokens,
            cost_cents,
            "Usage recorded"
        );

        sqlx::query_as::<_, UsageRecord>("SELECT * FROM usage_logs WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    /// Aggregate the log over the current UTC day and month.
    pub async fn summarize(&self, tenant_id: Uuid) -> CoreResult<UsageSummary> {
        self.summarize_at(tenant_id, Utc::now()).await
    }

    /// [`summarize`](Self::summarize) evaluated at an explicit instant.
    pub async fn summarize_at(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<UsageSummary> {
        let tenant: Tenant = sqlx::query_as("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::NotFound("tenant"))?;

        let day = self
            .aggregate_window(tenant_id, period_start(QuotaPeriod::Day, now))
            .await?;
        let month = self
            .aggregate_window(tenant_id, period_start(QuotaPeriod::Month, now))
            .await?;

        let plan_quota = tenant
            .plan()
            .allowance(ActionKind::MealGeneration)
            .unwrap_or(i64::MAX);
        let remaining_quota = if plan_quota == i64::MAX {
            i64::MAX
        } else {
            (plan_quota - day.meals).max(0)
        };

        Ok(UsageSummary {
            tenant_id,
            meals_today: day.meals,
            meals_month: month.meals,
            tokens_today: day.tokens,
            tokens_month: month.tokens,
            cost_today_cents: day.cost_cents,
            cost_month_cents: month.cost_cents,
            plan_quota,
            remaining_quota,
        })
    }

    async fn aggregate_window(
        &self,
        tenant_id: Uuid,
        window_start: DateTime<Utc>,
    ) -> CoreResult<WindowAggregate> {
        sqlx::query_as::<_, WindowAggregate>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN action = 'meal_generation' THEN 1 ELSE 0 END), 0) AS meals,
                COALESCE(SUM(tokens), 0) AS tokens,
                COALESCE(SUM(cost_cents), 0) AS cost_cents
            FROM usage_logs
            WHERE tenant_id = $1 AND created_at >= $2
            "#,
        )
        .bind(tenant_id)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }
}
