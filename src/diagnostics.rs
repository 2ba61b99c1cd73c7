//! Store reachability checks. Read-only.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CacheStore, RedisCache};
use crate::config::Settings;
use crate::db::SqlSource;
use crate::store::{DocumentStore, MongoStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub service: &'static str,
    pub reachable: bool,
    /// Patients, summary documents or namespace keys, depending on the service.
    pub count: Option<u64>,
    pub detail: String,
}

impl ServiceStatus {
    fn up(service: &'static str, count: u64, what: &str) -> Self {
        Self {
            service,
            reachable: true,
            count: Some(count),
            detail: format!("{} {}", count, what),
        }
    }

    fn down(service: &'static str, err: impl fmt::Display) -> Self {
        Self {
            service,
            reachable: false,
            count: None,
            detail: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub source: ServiceStatus,
    pub documents: ServiceStatus,
    pub cache: ServiceStatus,
}

impl ServiceReport {
    pub fn all_reachable(&self) -> bool {
        [&self.source, &self.documents, &self.cache]
            .iter()
            .all(|s| s.reachable)
    }
}

/// Check each store independently; one being down does not stop the others being checked.
pub async fn check_services(settings: &Settings) -> ServiceReport {
    let timeout = settings.connect_timeout();

    let source = match SqlSource::connect(&settings.source.url, timeout).await {
        Ok(source) => {
            let status = source_status(&source).await;
            source.close().await;
            status
        }
        Err(e) => ServiceStatus::down("relational source", e),
    };
    let documents = match MongoStore::connect(&settings.documents, timeout).await {
        Ok(store) => document_status(&store).await,
        Err(e) => ServiceStatus::down("document store", e),
    };
    let cache = match RedisCache::connect(&settings.cache, timeout).await {
        Ok(cache) => cache_status(&cache).await,
        Err(e) => ServiceStatus::down("cache store", e),
    };

    let report = ServiceReport {
        source,
        documents,
        cache,
    };
    for status in [&report.source, &report.documents, &report.cache] {
        if status.reachable {
            info!(service = status.service, detail = %status.detail, "Service reachable");
        } else {
            warn!(service = status.service, detail = %status.detail, "Service unreachable");
        }
    }
    report
}

async fn source_status(source: &SqlSource) -> ServiceStatus {
    match source.count_patients().await {
        Ok(count) => ServiceStatus::up("relational source", count.max(0) as u64, "patients"),
        Err(e) => ServiceStatus::down("relational source", e),
    }
}

async fn document_status<D: DocumentStore>(store: &D) -> ServiceStatus {
    match store.count_patients().await {
        Ok(count) => ServiceStatus::up("document store", count, "patient summaries"),
        Err(e) => ServiceStatus::down("document store", e),
    }
}

async fn cache_status<C: CacheStore>(cache: &C) -> ServiceStatus {
    match cache.key_count().await {
        Ok(count) => ServiceStatus::up("cache store", count, "dashboard keys"),
        Err(e) => ServiceStatus::down("cache store", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockCacheStore;
    use crate::db::fixtures::hospital_source;
    use crate::error::PipelineError;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn source_status_counts_patients() {
        let status = source_status(&hospital_source().await).await;
        assert!(status.reachable);
        assert_eq!(status.count, Some(4));
        assert_eq!(status.detail, "4 patients");
    }

    #[tokio::test]
    async fn document_status_counts_summaries() {
        let status = document_status(&MemoryStore::default()).await;
        assert_eq!(status, ServiceStatus::up("document store", 0, "patient summaries"));
    }

    #[tokio::test]
    async fn cache_status_reports_failures_without_panicking() {
        let mut cache = MockCacheStore::new();
        cache
            .expect_key_count()
            .returning(|| Err(PipelineError::CachePool("timed out".into())));

        let status = cache_status(&cache).await;
        assert!(!status.reachable);
        assert_eq!(status.count, None);
        assert!(status.detail.contains("timed out"));
    }

    #[tokio::test]
    async fn unsupported_source_is_reported_unreachable() {
        let err = SqlSource::connect("ftp://archive", std::time::Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        let status = ServiceStatus::down("relational source", err);
        assert!(!status.reachable);
        assert!(status.detail.contains("ftp://archive"));
    }
}
