//! Invite lifecycle
//!
//! Time-bounded, single-use tokens that convert into memberships. The
//! state machine is pending -> redeemed (consumes the token) or pending ->
//! expired (checked at redemption time, not by a job). A hygiene sweep may
//! delete dead rows, but no correctness depends on it running.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use mealforge_shared::{Invite, InviteStatus, MemberRole, Membership};

use crate::authz::AuthzService;
use crate::error::{CoreError, CoreResult};

#[derive(Clone)]
pub struct InviteService {
    pool: SqlitePool,
    authz: AuthzService,
    invite_ttl_hours: i64,
}

impl InviteService {
    pub fn new(pool: SqlitePool, authz: AuthzService, invite_ttl_hours: i64) -> Self {
        Self {
            pool,
            authz,
            invite_ttl_hours,
        }
    }

    fn new_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes[..]);
        hex::encode(bytes)
    }

    /// Issue an invite. Editors may invite; granting the owner role takes
    /// an owner.
    pub async fn create_invite(
        &self,
        tenant_id: Uuid,
        email: &str,
        role: MemberRole,
        issuer_id: Uuid,
    ) -> CoreResult<Invite> {
        let required = if role.is_owner() {
            MemberRole::Owner
        } else {
            MemberRole::Editor
        };
        self.authz.authorize(issuer_id, tenant_id, required).await?;

        if !email.contains('@') {
            return Err(CoreError::InvalidInput(format!(
                "invalid invite email: {}",
                email
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let token = Self::new_token();

        sqlx::query(
            r#"
            INSERT INTO invites
                (id, tenant_id, email, role, token, invited_by, status, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(email)
        .bind(role.to_string())
        .bind(&token)
        .bind(issuer_id)
        .bind(now + Duration::hours(self.invite_ttl_hours))
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(tenant_id = %tenant_id, email, role = %role, "Invite created");

        sqlx::query_as::<_, Invite>("SELECT * FROM invites WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    /// Redeem a token, creating the membership it promised.
    pub async fn redeem_invite(&self, token: &str, user_id: Uuid) -> CoreResult<Membership> {
        self.redeem_invite_at(token, user_id, Utc::now()).await
    }

    /// [`redeem_invite`](Self::redeem_invite) evaluated at an explicit
    /// instant.
    pub async fn redeem_invite_at(
        &self,
        token: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<Membership> {
        let invite: Invite = sqlx::query_as("SELECT * FROM invites WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::NotFound("invite"))?;

        match invite.status().map_err(CoreError::InvalidInput)? {
            InviteStatus::Redeemed => return Err(CoreError::InviteAlreadyUsed),
            InviteStatus::Expired => return Err(CoreError::InviteExpired),
            InviteStatus::Pending => {}
        }

        if now > invite.expires_at {
            sqlx::query("UPDATE invites SET status = 'expired' WHERE id = $1 AND status = 'pending'")
                .bind(invite.id)
                .execute(&self.pool)
                .await?;
            return Err(CoreError::InviteExpired);
        }

        let tenant_status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM tenants WHERE id = $1")
                .bind(invite.tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        match tenant_status {
            Some((status,)) if status != "deleted" => {}
            _ => return Err(CoreError::NotFound("tenant")),
        }

        let mut tx = self.pool.begin().await?;

        // Atomic claim: losing a concurrent redemption race reads as
        // already-used, never as a second membership.
        let claimed = sqlx::query(
            r#"
            UPDATE invites
            SET status = 'redeemed', redeemed_by = $1, redeemed_at = $2
            WHERE id = $3 AND status = 'pending'
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(invite.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            return Err(CoreError::InviteAlreadyUsed);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO memberships (id, tenant_id, user_id, role, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'active', $5, $6)
            ON CONFLICT (tenant_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invite.tenant_id)
        .bind(user_id)
        .bind(&invite.role)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            // Roll back the claim; the token stays pending for its
            // intended recipient
            drop(tx);
            return Err(CoreError::AlreadyMember);
        }

        tx.commit().await?;

        info!(
            tenant_id = %invite.tenant_id,
            user_id = %user_id,
            role = %invite.role,
            "Invite redeemed"
        );

        sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(invite.tenant_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Delete redeemed/expired rows and pending rows past their expiry.
    /// Hygiene only.
    pub async fn sweep_dead(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let removed = sqlx::query(
            "DELETE FROM invites WHERE status != 'pending' OR expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if removed > 0 {
            info!(removed, "Dead invites swept");
        }
        Ok(removed)
    }
}
