//! Billing event ledger
//!
//! Append-only, idempotent record of inbound billing-provider events. The
//! uniqueness constraint on `external_event_id` is the correctness
//! mechanism: a duplicate delivery loses the insert instead of racing a
//! check-then-insert, so the same external event can never drive a state
//! transition twice no matter how many times it is delivered.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use mealforge_shared::{BillingEvent, Plan};

use crate::error::{CoreError, CoreResult};
use crate::tenants::TenantService;

/// Result of ingesting a billing-provider event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First delivery: the event was recorded and processed
    Accepted,
    /// Already ingested; nothing was reprocessed. A success signal, not an
    /// error; the delivery source may retry freely.
    Duplicate,
}

/// Parsed event kind; unknown types are recorded and acknowledged so the
/// provider stops retrying them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    SubscriptionUpdated,
    SubscriptionCanceled,
    PaymentFailed,
    PaymentRecovered,
    Unknown,
}

impl EventKind {
    fn parse(event_type: &str) -> Self {
        match event_type {
            "subscription.updated" => Self::SubscriptionUpdated,
            "subscription.canceled" => Self::SubscriptionCanceled,
            "payment.failed" => Self::PaymentFailed,
            "payment.recovered" => Self::PaymentRecovered,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone)]
pub struct BillingLedger {
    pool: SqlitePool,
    tenants: TenantService,
}

impl BillingLedger {
    pub fn new(pool: SqlitePool, tenants: TenantService) -> Self {
        Self { pool, tenants }
    }

    /// Record an inbound event and, on first delivery, apply its state
    /// transition. Safe to call repeatedly with the same
    /// `external_event_id` from an unreliable delivery source.
    pub async fn ingest(
        &self,
        external_event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> CoreResult<IngestOutcome> {
        if external_event_id.is_empty() {
            return Err(CoreError::InvalidInput("external event id is empty".into()));
        }

        let event_id = Uuid::new_v4();
        let claimed = sqlx::query(
            r#"
            INSERT INTO billing_events
                (id, external_event_id, event_type, payload, processed, received_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            ON CONFLICT (external_event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(external_event_id)
        .bind(event_type)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if claimed == 0 {
            info!(
                external_event_id,
                event_type, "Duplicate billing event - already ingested"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        let event: BillingEvent = sqlx::query_as("SELECT * FROM billing_events WHERE id = $1")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;

        self.process_event(&event).await?;
        Ok(IngestOutcome::Accepted)
    }

    /// Re-drive events whose processing failed after the claim (e.g. a
    /// crash between insert and apply). Returns how many were processed.
    pub async fn process_pending(&self) -> CoreResult<u64> {
        let pending: Vec<BillingEvent> = sqlx::query_as(
            "SELECT * FROM billing_events WHERE processed = 0 ORDER BY received_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut processed = 0;
        for event in &pending {
            if self.process_event(event).await? {
                processed += 1;
            }
        }
        if processed > 0 {
            info!(processed, "Re-drove pending billing events");
        }
        Ok(processed)
    }

    /// Apply the event's state transition and flip `processed` exactly
    /// once. A transition failure is recorded on the row and left for
    /// [`process_pending`](Self::process_pending); it never double-applies.
    /// Returns whether the transition applied.
    async fn process_event(&self, event: &BillingEvent) -> CoreResult<bool> {
        match self.apply_transition(event).await {
            Ok(()) => {
                sqlx::query(
                    "UPDATE billing_events SET processed = 1, processed_at = $1, error_message = NULL WHERE id = $2",
                )
                .bind(Utc::now())
                .bind(event.id)
                .execute(&self.pool)
                .await?;
                Ok(true)
            }
            Err(e) => {
                warn!(
                    external_event_id = %event.external_event_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Billing event transition failed; left pending"
                );
                sqlx::query("UPDATE billing_events SET error_message = $1 WHERE id = $2")
                    .bind(e.to_string())
                    .bind(event.id)
                    .execute(&self.pool)
                    .await?;
                Ok(false)
            }
        }
    }

    async fn apply_transition(&self, event: &BillingEvent) -> CoreResult<()> {
        let kind = EventKind::parse(&event.event_type);

        if kind == EventKind::Unknown {
            info!(
                external_event_id = %event.external_event_id,
                event_type = %event.event_type,
                "Unhandled billing event type - recorded and acknowledged"
            );
            return Ok(());
        }

        let tenant_id = event
            .payload
            .get("tenant_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                CoreError::InvalidInput("billing event payload missing tenant_id".into())
            })?;

        match kind {
            EventKind::SubscriptionUpdated => {
                let plan: Plan = event
                    .payload
                    .get("plan")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .parse()
                    .map_err(CoreError::InvalidInput)?;
                self.tenants.change_plan(tenant_id, plan).await?;
            }
            EventKind::SubscriptionCanceled => {
                self.tenants.change_plan(tenant_id, Plan::Free).await?;
            }
            EventKind::PaymentFailed => {
                self.tenants.suspend_tenant(tenant_id).await?;
            }
            EventKind::PaymentRecovered => {
                self.tenants.reactivate_tenant(tenant_id).await?;
            }
            EventKind::Unknown => {}
        }

        info!(
            external_event_id = %event.external_event_id,
            event_type = %event.event_type,
            tenant_id = %tenant_id,
            "Billing event applied"
        );
        Ok(())
    }
}
