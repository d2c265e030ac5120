//! Tenant & membership store
//!
//! Tenants are the billing/isolation unit. They are created on first
//! signup (auto-provisioned with an owner membership) and never
//! hard-deleted; deletion is a terminal status transition so billing and
//! audit history survive.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use mealforge_shared::{MemberRole, Membership, Plan, Tenant, TenantStatus};

use crate::authz::AuthzService;
use crate::error::{CoreError, CoreResult};

#[derive(Clone)]
pub struct TenantService {
    pool: SqlitePool,
    authz: AuthzService,
}

impl TenantService {
    pub fn new(pool: SqlitePool, authz: AuthzService) -> Self {
        Self { pool, authz }
    }

    /// Create a tenant together with its owner membership.
    ///
    /// Both rows land in one transaction so the "every active tenant has
    /// an owner" invariant holds from the first instant.
    pub async fn create_tenant(&self, name: &str, owner_user_id: Uuid) -> CoreResult<Tenant> {
        if name.trim().is_empty() {
            return Err(CoreError::InvalidInput("tenant name is empty".into()));
        }

        let tenant_id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, plan, status, settings, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tenant_id)
        .bind(name.trim())
        .bind(Plan::Free.to_string())
        .bind(TenantStatus::Active.to_string())
        .bind(serde_json::json!({}))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO memberships (id, tenant_id, user_id, role, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'active', $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(owner_user_id)
        .bind(MemberRole::Owner.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(tenant_id = %tenant_id, owner = %owner_user_id, "Tenant created");
        self.get_tenant(tenant_id).await
    }

    pub async fn get_tenant(&self, tenant_id: Uuid) -> CoreResult<Tenant> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::NotFound("tenant"))
    }

    /// Replace the tenant settings blob. Requires editor privilege.
    pub async fn update_settings(
        &self,
        caller_id: Uuid,
        tenant_id: Uuid,
        settings: serde_json::Value,
    ) -> CoreResult<Tenant> {
        self.authz
            .authorize(caller_id, tenant_id, MemberRole::Editor)
            .await?;

        sqlx::query("UPDATE tenants SET settings = $1, updated_at = $2 WHERE id = $3")
            .bind(settings)
            .bind(Utc::now())
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        self.get_tenant(tenant_id).await
    }

    /// Move the tenant to a new plan. Internal: driven by the billing
    /// ledger or admin tooling, not by tenant members themselves.
    pub async fn change_plan(&self, tenant_id: Uuid, plan: Plan) -> CoreResult<()> {
        let updated = sqlx::query(
            "UPDATE tenants SET plan = $1, updated_at = $2 WHERE id = $3 AND status != 'deleted'",
        )
        .bind(plan.to_string())
        .bind(Utc::now())
        .bind(tenant_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(CoreError::NotFound("tenant"));
        }
        info!(tenant_id = %tenant_id, plan = %plan, "Tenant plan changed");
        Ok(())
    }

    pub async fn suspend_tenant(&self, tenant_id: Uuid) -> CoreResult<()> {
        self.set_status(tenant_id, TenantStatus::Suspended).await
    }

    pub async fn reactivate_tenant(&self, tenant_id: Uuid) -> CoreResult<()> {
        self.set_status(tenant_id, TenantStatus::Active).await
    }

    /// Soft delete: terminal status transition, owner only.
    pub async fn delete_tenant(&self, caller_id: Uuid, tenant_id: Uuid) -> CoreResult<()> {
        self.authz
            .authorize(caller_id, tenant_id, MemberRole::Owner)
            .await?;
        self.set_status(tenant_id, TenantStatus::Deleted).await
    }

    async fn set_status(&self, tenant_id: Uuid, status: TenantStatus) -> CoreResult<()> {
        let updated = sqlx::query(
            "UPDATE tenants SET status = $1, updated_at = $2 WHERE id = $3 AND status != 'deleted'",
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(tenant_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(CoreError::NotFound("tenant"));
        }
        info!(tenant_id = %tenant_id, status = %status, "Tenant status changed");
        Ok(())
    }

    pub async fn list_members(
        &self,
        caller_id: Uuid,
        tenant_id: Uuid,
    ) -> CoreResult<Vec<Membership>> {
        self.authz
            .authorize(caller_id, tenant_id, MemberRole::Viewer)
            .await?;

        let members = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE tenant_id = $1 ORDER BY created_at",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    /// Change a member's role. Owner only; refuses to demote the last
    /// active owner.
    pub async fn change_member_role(
        &self,
        caller_id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        new_role: MemberRole,
    ) -> CoreResult<Membership> {
        self.authz
            .authorize(caller_id, tenant_id, MemberRole::Owner)
            .await?;

        if !new_role.is_owner() && self.is_last_active_owner(tenant_id, user_id).await? {
            return Err(CoreError::LastOwner);
        }

        let updated = sqlx::query(
            r#"
            UPDATE memberships SET role = $1, updated_at = $2
            WHERE tenant_id = $3 AND user_id = $4
            "#,
        )
        .bind(new_role.to_string())
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(CoreError::NotFound("membership"));
        }

        sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CoreError::NotFound("membership"))
    }

    /// Remove a member. Owner only; refuses to remove the last active
    /// owner.
    pub async fn remove_member(
        &self,
        caller_id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> CoreResult<()> {
        self.authz
            .authorize(caller_id, tenant_id, MemberRole::Owner)
            .await?;

        if self.is_last_active_owner(tenant_id, user_id).await? {
            return Err(CoreError::LastOwner);
        }

        let removed = sqlx::query("DELETE FROM memberships WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if removed == 0 {
            return Err(CoreError::NotFound("membership"));
        }
        info!(tenant_id = %tenant_id, user_id = %user_id, "Member removed");
        Ok(())
    }

    async fn is_last_active_owner(&self, tenant_id: Uuid, user_id: Uuid) -> CoreResult<bool> {
        let is_owner: Option<(String,)> = sqlx::query_as(
            "SELECT role FROM memberships WHERE tenant_id = $1 AND user_id = $2 AND status = 'active'",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if !matches!(is_owner, Some((ref role,)) if role.as_str() == "owner") {
            return Ok(false);
        }

        let owners: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships WHERE tenant_id = $1 AND role = 'owner' AND status = 'active'",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(owners <= 1)
    }
}
