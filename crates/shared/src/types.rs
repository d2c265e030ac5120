//! Common types used across MealForge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan for a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Family,
    Enterprise,
}

impl Default for Plan {
    fn default() -> Self {
        Self::Free
    }
}

impl Plan {
    /// Metered-action allowance for this plan, per the action's billing
    /// period. `None` means unbounded (enterprise).
    pub fn allowance(&self, action: ActionKind) -> Option<i64> {
        match (self, action) {
            (Self::Enterprise, _) => None,
            (Self::Free, ActionKind::MealGeneration) => Some(3),
            (Self::Pro | Self::Family, ActionKind::MealGeneration) => Some(1_000),
            (Self::Free, ActionKind::NutritionAnalysis) => Some(30),
            (Self::Pro | Self::Family, ActionKind::NutritionAnalysis) => Some(2_000),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Family => write!(f, "family"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "family" => Ok(Self::Family),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("Invalid plan: {}", s)),
        }
    }
}

/// User role within a tenant
///
/// Owner > editor > viewer form a strict ordering; analyst is a parallel
/// read-only role (reporting access) that satisfies viewer-level
/// requirements but nothing above them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Editor,
    Viewer,
    Analyst,
}

impl MemberRole {
    /// Permission level (higher = more permissions)
    /// Owner: 3, Editor: 2, Viewer/Analyst: 1
    pub fn level(&self) -> u8 {
        match self {
            Self::Owner => 3,
            Self::Editor => 2,
            Self::Viewer | Self::Analyst => 1,
        }
    }

    /// Whether this role meets or exceeds `required`.
    ///
    /// Analyst only ever satisfies read-only requirements; an analyst
    /// membership never passes an editor or owner check even though both
    /// sit at level 1 of the read tier.
    pub fn satisfies(&self, required: MemberRole) -> bool {
        match required {
            MemberRole::Viewer | MemberRole::Analyst => self.level() >= 1,
            MemberRole::Editor => !matches!(self, Self::Analyst) && self.level() >= 2,
            MemberRole::Owner => matches!(self, Self::Owner),
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Editor => write!(f, "editor"),
            Self::Viewer => write!(f, "viewer"),
            Self::Analyst => write!(f, "analyst"),
        }
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            "analyst" => Ok(Self::Analyst),
            _ => Err(format!("Invalid member role: {}", s)),
        }
    }
}

/// Tenant lifecycle status
///
/// Tenants are never hard-deleted; `Deleted` is terminal so billing and
/// audit history stay intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Invalid tenant status: {}", s)),
        }
    }
}

/// Membership status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Pending,
    Suspended,
}

impl MemberStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Pending => write!(f, "pending"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

impl std::str::FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "pending" => Ok(Self::Pending),
            "suspended" => Ok(Self::Suspended),
            _ => Err(format!("Invalid member status: {}", s)),
        }
    }
}

/// Invite status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Redeemed,
    Expired,
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Redeemed => write!(f, "redeemed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for InviteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "redeemed" => Ok(Self::Redeemed),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid invite status: {}", s)),
        }
    }
}

/// Billing window for a metered action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Day,
    Month,
}

/// Metered action kinds
///
/// Each kind names a paid operation the application performs on behalf of
/// a tenant. The kind decides which billing window its quota is counted
/// over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Full AI meal-plan generation (the expensive call)
    MealGeneration,
    /// Per-recipe nutrition breakdown
    NutritionAnalysis,
}

impl ActionKind {
    pub fn period(&self) -> QuotaPeriod {
        match self {
            Self::MealGeneration => QuotaPeriod::Day,
            Self::NutritionAnalysis => QuotaPeriod::Month,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MealGeneration => "meal_generation",
            Self::NutritionAnalysis => "nutrition_analysis",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meal_generation" => Ok(Self::MealGeneration),
            "nutrition_analysis" => Ok(Self::NutritionAnalysis),
            _ => Err(format!("Invalid action kind: {}", s)),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Tenant (account/household) model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub plan: String,
    pub status: String,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Parsed plan, defaulting to free on an unrecognized value
    pub fn plan(&self) -> Plan {
        self.plan.parse().unwrap_or_default()
    }

    pub fn status(&self) -> Result<TenantStatus, String> {
        self.status.parse()
    }
}

/// Membership linking a user identity to a tenant
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn role(&self) -> Result<MemberRole, String> {
        self.role.parse()
    }

    pub fn status(&self) -> Result<MemberStatus, String> {
        self.status.parse()
    }
}

/// Append-only usage log row (the sole input to quota and billing
/// aggregation; immutable once written)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub tokens: i64,
    pub cost_cents: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Cached AI response, content-addressed per tenant
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CacheEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub cache_key: String,
    pub payload: serde_json::Value,
    pub model: String,
    pub tokens: i64,
    pub cost_cents: i64,
    pub ttl_seconds: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Inbound billing-provider event (append-only, idempotent by
/// `external_event_id`)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingEvent {
    pub id: Uuid,
    pub external_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub error_message: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Invitation model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invite {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub invited_by: Uuid,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub redeemed_by: Option<Uuid>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    pub fn status(&self) -> Result<InviteStatus, String> {
        self.status.parse()
    }
}

// =============================================================================
// Tests
// =============================================================================
