//! Document store
//!
//! The Document Builder writes Patient Summary Documents and the Operational
//! Metrics singleton through [`DocumentStore`]; the Cache Synchronizer and the
//! analytics job read aggregates back through it.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Result;
use crate::models::cost::CostBasis;
use crate::models::metrics::{
    AnalyticsSummary, ChronicBurden, DepartmentPerformance, MonthlyEncounters, OperationalMetrics, RiskProfile,
};
use crate::models::summary::PatientSummary;
use crate::models::Tally;

mod mongo;
#[cfg(test)]
pub(crate) mod memory;

pub use mongo::MongoStore;

/// Document counts per collection after a migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionCounts {
    pub patient_summaries: u64,
    pub operational_metrics: u64,
}

/// Sums over every Patient Summary Document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub encounters: u64,
    pub healthcare_expenses: f64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Drop the patient summary and operational metrics collections.
    async fn reset_collections(&self) -> Result<()>;

    async fn insert_summary(&self, summary: &PatientSummary) -> Result<()>;

    /// Replace the Operational Metrics singleton.
    async fn write_operational_metrics(&self, metrics: &OperationalMetrics) -> Result<()>;

    async fn collection_counts(&self) -> Result<CollectionCounts>;

    async fn count_patients(&self) -> Result<u64>;

    /// Patients whose cost on `basis` is strictly greater than `threshold`.
    async fn count_high_cost(&self, basis: CostBasis, threshold: f64) -> Result<u64>;

    /// Encounter count per organization, null organizations under "Unknown", ranked.
    async fn encounters_by_organization(&self, limit: usize) -> Result<Vec<Tally>>;

    /// Distinct patient count per condition description, ranked.
    async fn patients_by_condition(&self, limit: usize) -> Result<Vec<Tally>>;

    /// One tally per cost bracket plus `off_scale`, in bracket order, zeros included.
    async fn cost_histogram(&self, basis: CostBasis) -> Result<Vec<Tally>>;

    async fn encounters_started_on(&self, day: NaiveDate) -> Result<u64>;

    async fn totals(&self) -> Result<Totals>;

    /// Patients with a condition description containing `pattern`, ignoring case.
    async fn patients_with_condition(&self, pattern: &str) -> Result<u64>;

    /// Encounter revenue per organization, highest revenue first.
    async fn department_performance(&self, limit: usize) -> Result<Vec<DepartmentPerformance>>;

    /// Encounter counts and claim costs per start month: the latest `months`, oldest first.
    /// Encounters without a start date are left out.
    async fn monthly_encounters(&self, months: usize) -> Result<Vec<MonthlyEncounters>>;

    /// Patients with at least `min_conditions` chronic condition entries, most burdened first.
    async fn chronic_burden(&self, min_conditions: usize, limit: usize) -> Result<Vec<ChronicBurden>>;

    /// Risk scores of patients with more than `min_encounters` encounters, highest first.
    async fn risk_profiles(&self, min_encounters: i64, limit: usize) -> Result<Vec<RiskProfile>>;

    /// Replace the Analytics Summary singleton.
    async fn write_analytics_summary(&self, summary: &AnalyticsSummary) -> Result<()>;
}
