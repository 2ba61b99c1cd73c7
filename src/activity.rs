//! Simulated live activity for dashboard demos.
//!
//! Nudges cache counters between synchronizations. Best-effort only: nothing
//! here is authoritative and the next synchronization overwrites all of it.

use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{timestamp, CacheStore, DEPARTMENTS, LAST_UPDATED, TODAY_ENCOUNTERS, TOTAL_PATIENTS};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityReport {
    pub ticks: u32,
    pub applied: u32,
    pub failed: u32,
    pub department_updates: u32,
}

pub struct ActivitySimulator<C> {
    cache: C,
    rng: StdRng,
}

impl<C: CacheStore> ActivitySimulator<C> {
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(cache: C, seed: u64) -> Self {
        Self {
            cache,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub async fn run(&mut self, ticks: u32, interval: Duration) -> ActivityReport {
        let mut report = ActivityReport {
            ticks,
            ..Default::default()
        };

        for tick in 0..ticks {
            if tick > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            match self.tick(tick).await {
                Ok(department_updated) => {
                    report.applied += 1;
                    if department_updated {
                        report.department_updates += 1;
                    }
                }
                Err(e) => {
                    warn!(tick, error = %e, "Activity tick skipped");
                    report.failed += 1;
                }
            }
        }

        info!(
            applied = report.applied,
            failed = report.failed,
            department_updates = report.department_updates,
            "Activity simulation finished"
        );
        report
    }

    async fn tick(&mut self, tick: u32) -> Result<bool> {
        let patients = self.cache.increment(TOTAL_PATIENTS, 1).await?;
        let encounters = self.cache.increment(TODAY_ENCOUNTERS, 1).await?;
        self.cache.set(LAST_UPDATED, &timestamp(Utc::now())).await?;
        debug!(tick, patients, encounters, "New registration and encounter");

        if tick % 2 == 0 {
            return Ok(false);
        }
        let departments = self.cache.fields(DEPARTMENTS).await?;
        match departments.choose(&mut self.rng) {
            Some(department) => {
                self.cache.increment_field(DEPARTMENTS, department, 1).await?;
                debug!(tick, department = %department, "Department activity");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
