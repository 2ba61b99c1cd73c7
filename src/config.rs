//! Application configuration
//!
//! Settings are layered: built-in defaults, then `config/default.toml`,
//! then `config/{HOSPITAL_ENV}.toml`, then `HOSPITAL_*` environment variables
//! (nested keys separated by `__`, e.g. `HOSPITAL_SOURCE__URL`).

use std::path::Path;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

use crate::error::Result;
use crate::models::cost::CostBasis;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceConfig,
    pub documents: DocumentConfig,
    pub cache: CacheConfig,
    pub migration: MigrationConfig,
    pub sync: SyncConfig,
    pub analytics: AnalyticsConfig,
    pub activity: ActivityConfig,
    pub log: LogConfig,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub url: String,
    pub database: String,
    pub patients_collection: String,
    pub metrics_collection: String,
    pub analytics_collection: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub url: String,
    pub namespace: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub schema_version: String,
    pub data_timeframe: String,
    pub top_conditions: usize,
    pub progress_every: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub high_cost_threshold: f64,
    pub cost_basis: CostBasis,
    pub department_limit: usize,
    pub condition_limit: usize,
    pub data_version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub department_limit: usize,
    pub trend_months: usize,
    /// Chronic conditions a patient needs to appear in the burden list.
    pub chronic_min_conditions: usize,
    pub chronic_limit: usize,
    /// Only patients with more encounters than this are risk-profiled.
    pub risk_min_encounters: i64,
    pub risk_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub ticks: u32,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            documents: DocumentConfig::default(),
            cache: CacheConfig::default(),
            migration: MigrationConfig::default(),
            sync: SyncConfig::default(),
            analytics: AnalyticsConfig::default(),
            activity: ActivityConfig::default(),
            log: LogConfig::default(),
            connect_timeout_secs: 5,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "mysql://root@localhost:3306/hospital_operations".to_string(),
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017".to_string(),
            database: "hospital_platform".to_string(),
            patients_collection: "patient_summaries".to_string(),
            metrics_collection: "operational_metrics".to_string(),
            analytics_collection: "analytics_summaries".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            namespace: "dashboard".to_string(),
            pool_size: 4,
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0".to_string(),
            data_timeframe: "2017-2018".to_string(),
            top_conditions: 10,
            progress_every: 100,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            high_cost_threshold: 50_000.0,
            cost_basis: CostBasis::Stated,
            department_limit: 15,
            condition_limit: 20,
            data_version: "1.0".to_string(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            department_limit: 10,
            trend_months: 12,
            chronic_min_conditions: 2,
            chronic_limit: 10,
            risk_min_encounters: 5,
            risk_limit: 5,
        }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            ticks: 5,
            interval_ms: 2_000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings from `config/` and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings, reading `path` in place of `config/default`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let env = std::env::var("HOSPITAL_ENV").unwrap_or_else(|_| "development".into());

        let base = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("config/default").required(false),
        };

        let settings = config::Config::builder()
            .add_source(base)
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("HOSPITAL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject ranking limits of zero; a `$limit` stage must be positive.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("migration.top_conditions", self.migration.top_conditions),
            ("sync.department_limit", self.sync.department_limit),
            ("sync.condition_limit", self.sync.condition_limit),
            ("analytics.department_limit", self.analytics.department_limit),
            ("analytics.trend_months", self.analytics.trend_months),
            ("analytics.chronic_limit", self.analytics.chronic_limit),
            ("analytics.risk_limit", self.analytics.risk_limit),
        ];
        for (key, value) in limits {
            if value == 0 {
                return Err(ConfigError::Message(format!("{} must be at least 1", key)).into());
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
