//! Error types for the hospital platform pipeline
//!
//! Startup failures (a store that cannot be reached) are fatal to a run.
//! Everything else is either a per-record failure, counted and skipped by
//! the Document Builder, or a store error that aborts the current operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot reach {store}: {reason}")]
    Unavailable { store: &'static str, reason: String },

    #[error("relational source error: {0}")]
    Source(#[from] sqlx::Error),

    #[error("document store error: {0}")]
    Documents(#[from] mongodb::error::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] bson::ser::Error),

    #[error("document decoding error: {0}")]
    Decoding(#[from] bson::de::Error),

    #[error("cache store error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("cache pool error: {0}")]
    CachePool(String),

    #[error("patient {patient}: {reason}")]
    Record { patient: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("unsupported source url: {0}")]
    UnsupportedSource(String),
}

impl PipelineError {
    pub fn unavailable(store: &'static str, reason: impl ToString) -> Self {
        Self::Unavailable {
            store,
            reason: reason.to_string(),
        }
    }

    pub fn record(patient: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Record {
            patient: patient.into(),
            reason: reason.into(),
        }
    }

    /// True for failures that must stop a run before anything is written.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Config(_) | Self::UnsupportedSource(_)
        )
    }
}

impl From<bb8_redis::bb8::RunError<redis::RedisError>> for PipelineError {
    fn from(err: bb8_redis::bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8_redis::bb8::RunError::User(e) => Self::Cache(e),
            bb8_redis::bb8::RunError::TimedOut => {
                Self::CachePool("timed out waiting for a cache connection".to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_failures_are_fatal() {
        assert!(PipelineError::unavailable("redis", "connection refused").is_fatal());
        assert!(PipelineError::UnsupportedSource("ftp://x".into()).is_fatal());
        assert!(!PipelineError::record("P1", "missing key").is_fatal());
        assert!(!PipelineError::CachePool("busy".into()).is_fatal());
    }

    #[test]
    fn record_error_names_the_patient() {
        let err = PipelineError::record("P-42", "malformed date");
        assert_eq!(err.to_string(), "patient P-42: malformed date");
    }
}
