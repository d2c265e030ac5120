// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! MealForge resource-governance core
//!
//! The multi-tenant enforcement layer behind the meal-planning product.
//! Everything tenant-scoped flows through here before money is spent:
//!
//! - **Tenants & memberships**: who owns what, with plan and role state
//! - **Authorization**: single allow/deny point preventing cross-tenant
//!   access
//! - **Quota engine**: per-plan, per-action allowance checks with period
//!   reset timestamps
//! - **Usage meter**: append-only metering of tokens and cost, with
//!   derived daily/monthly summaries
//! - **Response cache**: per-tenant content-addressed AI responses with
//!   TTL expiry and single-flight miss handling
//! - **Billing ledger**: idempotent ingestion of billing-provider events
//!   driving plan and status transitions
//! - **Invites**: single-use, time-bounded tokens that become memberships
//!
//! The web/API layer, AI prompt plumbing, and payment-provider transport
//! live outside this crate and call into it.

pub mod authz;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod invites;
pub mod ledger;
pub mod maintenance;
pub mod quota;
pub mod tenants;
pub mod usage;

#[cfg(test)]
mod edge_case_tests;

pub use authz::AuthzService;
pub use cache::{fingerprint, CachedResponse, ComputedResponse, ResponseCache};
pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use invites::InviteService;
pub use ledger::{BillingLedger, IngestOutcome};
pub use quota::{QuotaDecision, QuotaEngine};
pub use tenants::TenantService;
pub use usage::{UsageMeter, UsageSummary};

use sqlx::SqlitePool;

/// The assembled governance layer: one handle the surrounding application
/// holds to reach every service.
#[derive(Clone)]
pub struct Platform {
    pub tenants: TenantService,
    pub authz: AuthzService,
    pub quota: QuotaEngine,
    pub usage: UsageMeter,
    pub cache: ResponseCache,
    pub ledger: BillingLedger,
    pub invites: InviteService,
}

impl Platform {
    /// Wire the services over an existing pool.
    pub fn new(pool: SqlitePool, config: &CoreConfig) -> Self {
        let authz = AuthzService::new(pool.clone());
        let tenants = TenantService::new(pool.clone(), authz.clone());

        Self {
            quota: QuotaEngine::new(pool.clone()),
            usage: UsageMeter::new(pool.clone(), authz.clone()),
            cache: ResponseCache::new(pool.clone()),
            ledger: BillingLedger::new(pool.clone(), tenants.clone()),
            invites: InviteService::new(pool, authz.clone(), config.invite_ttl_hours),
            tenants,
            authz,
        }
    }

    /// Connect to `database_url`, run migrations, and wire the services.
    pub async fn connect(database_url: &str, config: &CoreConfig) -> CoreResult<Self> {
        let pool = db::connect(database_url).await?;
        Ok(Self::new(pool, config))
    }

    /// Build from environment configuration.
    pub async fn from_env() -> CoreResult<Self> {
        let config = CoreConfig::from_env();
        Self::connect(&config.database_url, &config).await
    }

    /// Start the periodic hygiene sweeps for this platform.
    pub fn spawn_maintenance(&self, config: &CoreConfig) -> tokio::task::JoinHandle<()> {
        maintenance::spawn(
            self.cache.clone(),
            self.invites.clone(),
            config.sweep_interval,
        )
    }
}
