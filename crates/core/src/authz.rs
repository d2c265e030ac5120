//! Authorization layer
//!
//! Single point where cross-tenant leakage is prevented: every component
//! that touches tenant-scoped data resolves the caller's membership here
//! first. Pure decision, no side effects, and it fails closed: a missing
//! tenant, a missing or non-active membership, and an insufficient role
//! all resolve to a denial.

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use mealforge_shared::{MemberRole, MemberStatus, Membership, TenantStatus};

use crate::error::{CoreError, CoreResult};

#[derive(Clone)]
pub struct AuthzService {
    pool: SqlitePool,
}

impl AuthzService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Decide whether `caller_id` may act on `tenant_id` at `required`
    /// privilege. Returns the caller's membership on allow so callers can
    /// reuse it without a second lookup.
    pub async fn authorize(
        &self,
        caller_id: Uuid,
        tenant_id: Uuid,
        required: MemberRole,
    ) -> CoreResult<Membership> {
        let tenant_status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM tenants WHERE id = $1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        let status = match tenant_status {
            Some((s,)) => s.parse::<TenantStatus>().map_err(|_| {
                CoreError::unauthorized("tenant in unrecognized state")
            })?,
            None => return Err(CoreError::unauthorized("unknown tenant")),
        };

        match status {
            TenantStatus::Deleted => {
                return Err(CoreError::unauthorized("tenant is deleted"));
            }
            // Suspended tenants stay readable but reject mutations
            TenantStatus::Suspended if required.level() >= MemberRole::Editor.level() => {
                return Err(CoreError::unauthorized("tenant is suspended"));
            }
            _ => {}
        }

        let membership: Option<Membership> = sqlx::query_as(
            "SELECT * FROM memberships WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(caller_id)
        .fetch_optional(&self.pool)
        .await?;

        let membership = membership
            .ok_or_else(|| CoreError::unauthorized("no membership for tenant"))?;

        let member_status: MemberStatus = membership
            .status()
            .map_err(|_| CoreError::unauthorized("membership in unrecognized state"))?;
        if !member_status.is_active() {
            return Err(CoreError::unauthorized(format!(
                "membership is {}",
                member_status
            )));
        }

        let role: MemberRole = membership
            .role()
            .map_err(|_| CoreError::unauthorized("membership role unrecognized"))?;
        if !role.satisfies(required) {
            debug!(
                tenant_id = %tenant_id,
                caller_id = %caller_id,
                role = %role,
                required = %required,
                "Authorization denied: insufficient role"
            );
            return Err(CoreError::unauthorized(format!(
                "role {} does not satisfy {}",
                role, required
            )));
        }

        Ok(membership)
    }
}
