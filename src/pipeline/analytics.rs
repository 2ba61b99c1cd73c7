//! Analytics summary
//!
//! Population metrics, department performance, monthly encounter trends,
//! chronic disease burden and risk profiles, all computed from live document
//! aggregates and stored as the `analytics_summary` singleton for dashboards.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::config::{AnalyticsConfig, Settings, SyncConfig};
use crate::error::Result;
use crate::models::metrics::{
    AnalyticsSummary, ConditionPrevalence, KeyMetrics, ANALYTICS_SUMMARY_ID, CARDIOVASCULAR_CONDITIONS,
};
use crate::store::DocumentStore;

const GENERATED_BY: &str = "hospital-platform analytics";

pub struct AnalyticsJob<D> {
    documents: D,
    sync: SyncConfig,
    config: AnalyticsConfig,
    top_conditions: usize,
}

impl<D: DocumentStore> AnalyticsJob<D> {
    pub fn new(documents: D, settings: &Settings) -> Self {
        Self {
            documents,
            sync: settings.sync.clone(),
            config: settings.analytics.clone(),
            top_conditions: settings.migration.top_conditions,
        }
    }

    pub async fn summarize(&self, now: DateTime<Utc>) -> Result<AnalyticsSummary> {
        let total_patients = self.documents.count_patients().await?;
        let totals = self.documents.totals().await?;
        let high_cost = self
            .documents
            .count_high_cost(self.sync.cost_basis, self.sync.high_cost_threshold)
            .await?;
        let conditions = self.documents.patients_by_condition(self.top_conditions).await?;

        let mut cardiovascular_prevalence = Vec::with_capacity(CARDIOVASCULAR_CONDITIONS.len());
        for condition in CARDIOVASCULAR_CONDITIONS {
            let count = self.documents.patients_with_condition(condition).await?;
            cardiovascular_prevalence.push(ConditionPrevalence {
                condition: condition.to_string(),
                patient_count: count as i64,
                percentage: share(count, total_patients) * 100.0,
            });
        }

        let department_performance = self
            .documents
            .department_performance(self.config.department_limit)
            .await?;
        let monthly_trends = self.documents.monthly_encounters(self.config.trend_months).await?;
        let chronic_disease_burden = self
            .documents
            .chronic_burden(self.config.chronic_min_conditions, self.config.chronic_limit)
            .await?;
        let risk_profiles = self
            .documents
            .risk_profiles(self.config.risk_min_encounters, self.config.risk_limit)
            .await?;

        Ok(AnalyticsSummary {
            id: ANALYTICS_SUMMARY_ID.to_string(),
            timestamp: now,
            key_metrics: KeyMetrics {
                total_patients: total_patients as i64,
                avg_encounters_per_patient: share(totals.encounters, total_patients),
                total_healthcare_costs: totals.healthcare_expenses,
                high_cost_patients_count: high_cost as i64,
            },
            top_conditions: conditions.into_iter().map(|t| t.label).collect(),
            cardiovascular_prevalence,
            department_performance,
            monthly_trends,
            chronic_disease_burden,
            risk_profiles,
            generated_by: GENERATED_BY.to_string(),
        })
    }

    /// Compute and upsert the summary.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<AnalyticsSummary> {
        let summary = self.summarize(Utc::now()).await?;
        self.documents.write_analytics_summary(&summary).await?;
        info!(
            total_patients = summary.key_metrics.total_patients,
            avg_encounters = summary.key_metrics.avg_encounters_per_patient,
            high_cost = summary.key_metrics.high_cost_patients_count,
            departments = summary.department_performance.len(),
            months = summary.monthly_trends.len(),
            chronic = summary.chronic_disease_burden.len(),
            "Analytics summary written"
        );
        Ok(summary)
    }
}

fn share(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
