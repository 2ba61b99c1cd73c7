//! Dashboard cache
//!
//! Everything here is derived from the document store and can be rebuilt at
//! any time. Keys live under one namespace (`dashboard` by default):
//!
//! | key                  | type       | value                                   |
//! |----------------------|------------|-----------------------------------------|
//! | `total_patients`     | string     | patient summary count                   |
//! | `high_cost_patients` | string     | patients above the high-cost threshold  |
//! | `today_encounters`   | string     | encounters starting on the current date |
//! | `departments`        | hash       | organization -> encounter count         |
//! | `top_conditions`     | sorted set | condition -> distinct patient count     |
//! | `cost_distribution`  | hash       | cost bracket -> patient count           |
//! | `last_updated`       | string     | RFC 3339 timestamp                      |
//! | `data_freshness`     | string     | `live`                                  |
//! | `data_version`       | string     | data version label                      |

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::Tally;

mod redis_store;

pub use redis_store::RedisCache;

pub const TOTAL_PATIENTS: &str = "total_patients";
pub const HIGH_COST_PATIENTS: &str = "high_cost_patients";
pub const TODAY_ENCOUNTERS: &str = "today_encounters";
pub const DEPARTMENTS: &str = "departments";
pub const TOP_CONDITIONS: &str = "top_conditions";
pub const COST_DISTRIBUTION: &str = "cost_distribution";
pub const LAST_UPDATED: &str = "last_updated";
pub const DATA_FRESHNESS: &str = "data_freshness";
pub const DATA_VERSION: &str = "data_version";

pub const FRESHNESS_LIVE: &str = "live";

/// Namespaced key names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    namespace: String,
}

impl CacheKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}:{}", self.namespace, name)
    }

    /// Glob matching every key in the namespace.
    pub fn pattern(&self) -> String {
        format!("{}:*", self.namespace)
    }
}

/// Timestamp format written to `last_updated`.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The complete cache state one synchronization writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSnapshot {
    pub total_patients: u64,
    pub high_cost_patients: u64,
    pub today_encounters: u64,
    pub departments: Vec<Tally>,
    pub top_conditions: Vec<Tally>,
    pub cost_distribution: Vec<Tally>,
    pub last_updated: DateTime<Utc>,
    pub data_freshness: String,
    pub data_version: String,
}

impl CacheSnapshot {
    /// Scalar keys and their values, in write order.
    pub fn scalars(&self) -> Vec<(&'static str, String)> {
        vec![
            (TOTAL_PATIENTS, self.total_patients.to_string()),
            (HIGH_COST_PATIENTS, self.high_cost_patients.to_string()),
            (TODAY_ENCOUNTERS, self.today_encounters.to_string()),
            (LAST_UPDATED, timestamp(self.last_updated)),
            (DATA_FRESHNESS, self.data_freshness.clone()),
            (DATA_VERSION, self.data_version.clone()),
        ]
    }
}

/// Cache store seam. Key arguments are names inside the store's namespace.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Delete every key in the namespace and write `snapshot`, all or nothing.
    async fn replace_namespace(&self, snapshot: &CacheSnapshot) -> Result<()>;

    async fn increment(&self, key: &str, by: i64) -> Result<i64>;

    async fn increment_field(&self, key: &str, field: &str, by: i64) -> Result<i64>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Field names of a hash; empty when the key is missing.
    async fn fields(&self, key: &str) -> Result<Vec<String>>;

    async fn key_count(&self) -> Result<u64>;
}
