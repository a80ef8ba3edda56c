//! Record definitions for tenant configuration and the usage ledger.
//!
//! Tables:
//! - tenants: one document per tenant (plan, features, credentials, status)
//! - usage_records: append-only metering ledger

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

// ---------------------------------------------------------------------------
// Tenant identity and lifecycle
// ---------------------------------------------------------------------------

/// Tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    /// Generate a fresh `tenant_<uuid>` identifier.
    pub fn generate() -> Self {
        TenantId(format!("tenant_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId(s.to_string())
    }
}

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Starter,
    Professional,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [Self::Starter, Self::Professional, Self::Enterprise];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "professional" | "pro" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown plan tier: {other}")),
        }
    }
}

/// Lifecycle status of a tenant account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Trial,
    Cancelled,
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Trial => "trial",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Quotas and features
// ---------------------------------------------------------------------------

/// A per-period allowance. Serialized as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Quota {
    Limited(u32),
    Unlimited,
}

impl Quota {
    pub fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// `true` when a limited quota has no units left.
    pub fn is_exhausted(self) -> bool {
        matches!(self, Self::Limited(0))
    }

    /// Remaining units after `held` units are set aside. Unlimited stays unlimited.
    pub fn available(self, held: u32) -> Quota {
        match self {
            Self::Limited(n) => Self::Limited(n.saturating_sub(held)),
            Self::Unlimited => Self::Unlimited,
        }
    }

    /// Spend one unit. Never goes below zero; unlimited is untouched.
    pub fn consume(self) -> Quota {
        self.available(1)
    }
}

impl TryFrom<i64> for Quota {
    type Error = StorageError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unlimited),
            n if n >= 0 && n <= i64::from(u32::MAX) => Ok(Self::Limited(n as u32)),
            _ => Err(StorageError::InvalidQuota { value }),
        }
    }
}

impl From<Quota> for i64 {
    fn from(q: Quota) -> Self {
        match q {
            Quota::Limited(n) => i64::from(n),
            Quota::Unlimited => -1,
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{n}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Quotas and capability flags granted by a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    pub audits_per_month: Quota,
    pub pages_per_audit: Quota,
    pub fixes_per_month: Quota,
    pub competitor_analysis: bool,
    pub white_label: bool,
    pub api_access: bool,
    pub priority_support: bool,
}

/// Credentials for the tenant's CMS. The secret is never logged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmsCredentials {
    /// CMS flavour, e.g. `"wordpress"`, `"directory"`, `"memory"`.
    pub kind: String,
    /// Base URL or filesystem root of the site.
    pub endpoint: String,
    pub username: Option<String>,
    pub secret: Option<String>,
}

impl fmt::Debug for CmsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsCredentials")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Full tenant configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: TenantId,
    pub name: String,
    pub domain: String,
    pub plan: PlanTier,
    pub features: Features,
    pub cms: Option<CmsCredentials>,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Usage ledger
// ---------------------------------------------------------------------------

/// One metered operation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub usage_id: String,
    pub tenant_id: TenantId,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    pub cost: f64,
    pub details: serde_json::Value,
}

impl UsageRecord {
    pub fn new(
        tenant_id: TenantId,
        operation: impl Into<String>,
        cost: f64,
        details: serde_json::Value,
    ) -> Self {
        Self {
            usage_id: Uuid::new_v4().to_string(),
            tenant_id,
            operation: operation.into(),
            timestamp: Utc::now(),
            cost,
            details,
        }
    }
}

// ---------------------------------------------------------------------------
// Database rows
// ---------------------------------------------------------------------------

/// `tenants` row: the config document keyed by tenant id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub tenant_id: String,
    pub document: serde_json::Value,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl TenantRow {
    pub fn from_config(config: &TenantConfig) -> Result<Self, StorageError> {
        Ok(Self {
            id: None,
            tenant_id: config.id.0.clone(),
            document: serde_json::to_value(config)?,
            updated_at: config.updated_at,
        })
    }

    pub fn into_config(self) -> Result<TenantConfig, StorageError> {
        Ok(serde_json::from_value(self.document)?)
    }
}

/// `usage_records` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub usage_id: String,
    pub tenant_id: String,
    pub operation: String,
    pub cost: f64,
    pub details: serde_json::Value,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl From<&UsageRecord> for UsageRow {
    fn from(r: &UsageRecord) -> Self {
        Self {
            id: None,
            usage_id: r.usage_id.clone(),
            tenant_id: r.tenant_id.0.clone(),
            operation: r.operation.clone(),
            cost: r.cost,
            details: r.details.clone(),
            recorded_at: r.timestamp,
        }
    }
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        Self {
            usage_id: row.usage_id,
            tenant_id: TenantId(row.tenant_id),
            operation: row.operation,
            timestamp: row.recorded_at,
            cost: row.cost,
            details: row.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_serializes_unlimited_as_minus_one() {
        let json = serde_json::to_string(&Quota::Unlimited).unwrap();
        assert_eq!(json, "-1");
        let back: Quota = serde_json::from_str("-1").unwrap();
        assert_eq!(back, Quota::Unlimited);
        let limited: Quota = serde_json::from_str("12").unwrap();
        assert_eq!(limited, Quota::Limited(12));
    }

    #[test]
    fn test_quota_rejects_other_negatives() {
        assert!(serde_json::from_str::<Quota>("-2").is_err());
    }

    #[test]
    fn test_quota_consume_saturates_and_ignores_unlimited() {
        assert_eq!(Quota::Limited(1).consume(), Quota::Limited(0));
        assert_eq!(Quota::Limited(0).consume(), Quota::Limited(0));
        assert_eq!(Quota::Unlimited.consume(), Quota::Unlimited);
    }

    #[test]
    fn test_quota_available_subtracts_holds() {
        assert_eq!(Quota::Limited(3).available(2), Quota::Limited(1));
        assert!(Quota::Limited(1).available(1).is_exhausted());
        assert_eq!(Quota::Unlimited.available(100), Quota::Unlimited);
    }

    #[test]
    fn test_plan_tier_parse() {
        assert_eq!("Starter".parse::<PlanTier>().unwrap(), PlanTier::Starter);
        assert_eq!("pro".parse::<PlanTier>().unwrap(), PlanTier::Professional);
        assert!("gold".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = CmsCredentials {
            kind: "wordpress".into(),
            endpoint: "https://example.com".into(),
            username: Some("admin".into()),
            secret: Some("hunter2".into()),
        };
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn test_usage_row_round_trip_preserves_fields() {
        let record = UsageRecord::new(
            TenantId::from("t1"),
            "fix",
            0.25,
            serde_json::json!({"page": "/a"}),
        );
        let row = UsageRow::from(&record);
        let back = UsageRecord::from(row);
        assert_eq!(back, record);
    }
}
