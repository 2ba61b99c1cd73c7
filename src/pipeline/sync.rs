//! Cache Synchronizer
//!
//! Recomputes every dashboard key from document-store aggregates and writes
//! them to the cache in one replacement. Never writes to the document store.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::cache::{CacheSnapshot, CacheStore, RedisCache, FRESHNESS_LIVE};
use crate::config::{Settings, SyncConfig};
use crate::error::Result;
use crate::store::{DocumentStore, MongoStore};

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub snapshot: CacheSnapshot,
    pub elapsed: Duration,
}

pub struct CacheSynchronizer<D, C> {
    documents: D,
    cache: C,
    config: SyncConfig,
}

impl CacheSynchronizer<MongoStore, RedisCache> {
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let timeout = settings.connect_timeout();
        let documents = MongoStore::connect(&settings.documents, timeout).await?;
        let cache = RedisCache::connect(&settings.cache, timeout).await?;
        Ok(Self::new(documents, cache, settings.sync.clone()))
    }
}

impl<D: DocumentStore, C: CacheStore> CacheSynchronizer<D, C> {
    pub fn new(documents: D, cache: C, config: SyncConfig) -> Self {
        Self {
            documents,
            cache,
            config,
        }
    }

    /// Compute the full cache state as of `now` without touching the cache.
    pub async fn snapshot(&self, now: DateTime<Utc>) -> Result<CacheSnapshot> {
        let basis = self.config.cost_basis;
        Ok(CacheSnapshot {
            total_patients: self.documents.count_patients().await?,
            high_cost_patients: self
                .documents
                .count_high_cost(basis, self.config.high_cost_threshold)
                .await?,
            today_encounters: self.documents.encounters_started_on(now.date_naive()).await?,
            departments: self
                .documents
                .encounters_by_organization(self.config.department_limit)
                .await?,
            top_conditions: self
                .documents
                .patients_by_condition(self.config.condition_limit)
                .await?,
            cost_distribution: self.documents.cost_histogram(basis).await?,
            last_updated: now,
            data_freshness: FRESHNESS_LIVE.to_string(),
            data_version: self.config.data_version.clone(),
        })
    }

    /// Replace the cache namespace with a fresh snapshot.
    ///
    /// Any failure fails the whole attempt; the caller retries the run, never
    /// individual keys.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncReport> {
        let started = Instant::now();
        let snapshot = self.snapshot(Utc::now()).await?;
        self.cache.replace_namespace(&snapshot).await?;

        info!(
            total_patients = snapshot.total_patients,
            high_cost_patients = snapshot.high_cost_patients,
            today_encounters = snapshot.today_encounters,
            departments = snapshot.departments.len(),
            top_conditions = snapshot.top_conditions.len(),
            "Cache synchronized"
        );
        Ok(SyncReport {
            snapshot,
            elapsed: started.elapsed(),
        })
    }
}
