// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! MealForge shared domain types
//!
//! Vocabulary used by both the governance core and the web/API layer:
//! plans, roles, metered actions, lifecycle statuses, and the persisted
//! row models.

pub mod types;

pub use types::{
    ActionKind, BillingEvent, CacheEntry, Invite, InviteStatus, MemberRole, MemberStatus,
    Membership, Plan, QuotaPeriod, Tenant, TenantStatus, UsageRecord,
};
