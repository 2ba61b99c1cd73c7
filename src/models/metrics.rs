//! Singleton documents: the Operational Metrics Document written at the end of
//! a migration, and the Analytics Summary computed from live aggregates.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const OPERATIONAL_METRICS_ID: &str = "operational_dashboard";
pub const ANALYTICS_SUMMARY_ID: &str = "analytics_summary";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalMetrics {
    #[serde(rename = "_id")]
    pub id: String,
    pub migration_summary: MigrationSummary,
    pub department_utilization: Vec<DepartmentUtilization>,
    pub clinical_insights: ClinicalInsights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub run_id: String,
    pub total_patients_migrated: i64,
    pub total_errors: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub migration_date: DateTime<Utc>,
    pub data_timeframe: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentUtilization {
    pub department: String,
    pub encounter_count: i64,
    pub average_stay_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInsights {
    pub top_conditions: Vec<ConditionFrequency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionFrequency {
    pub condition: String,
    pub patient_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub key_metrics: KeyMetrics,
    pub top_conditions: Vec<String>,
    pub cardiovascular_prevalence: Vec<ConditionPrevalence>,
    pub department_performance: Vec<DepartmentPerformance>,
    pub monthly_trends: Vec<MonthlyEncounters>,
    pub chronic_disease_burden: Vec<ChronicBurden>,
    pub risk_profiles: Vec<RiskProfile>,
    pub generated_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetrics {
    pub total_patients: i64,
    pub avg_encounters_per_patient: f64,
    pub total_healthcare_costs: f64,
    pub high_cost_patients_count: i64,
}

/// Patients with at least one condition whose description contains `condition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionPrevalence {
    pub condition: String,
    pub patient_count: i64,
    pub percentage: f64,
}

/// Encounter volume and claim revenue for one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentPerformance {
    pub department: String,
    pub total_encounters: i64,
    pub avg_claim_cost: f64,
    pub total_revenue: f64,
    pub unique_patient_count: i64,
    pub encounters_per_patient: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEncounters {
    pub year: i32,
    pub month: u32,
    pub encounter_count: i64,
    pub total_cost: f64,
    pub avg_cost: f64,
}

/// A patient carrying several long-term conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronicBurden {
    pub patient_id: String,
    pub name: Option<String>,
    pub chronic_conditions: i64,
    pub total_encounters: i64,
    pub total_costs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub patient_id: String,
    pub name: Option<String>,
    pub encounter_count: i64,
    pub condition_count: i64,
    pub total_costs: f64,
    pub risk_score: f64,
}

/// Condition descriptions counted toward cardiovascular prevalence.
pub const CARDIOVASCULAR_CONDITIONS: [&str; 5] = [
    "Hypertension",
    "Heart Disease",
    "Myocardial Infarction",
    "Atrial Fibrillation",
    "Congestive heart failure",
];

/// Condition descriptions counted as chronic, matched case-insensitively anywhere in the description.
pub const CHRONIC_CONDITIONS: [&str; 5] = ["Hypertension", "Diabetes", "Heart Disease", "COPD", "Obesity"];

pub const RISK_ENCOUNTER_WEIGHT: f64 = 2.0;
pub const RISK_CONDITION_WEIGHT: f64 = 5.0;
pub const RISK_COST_DIVISOR: f64 = 1000.0;

/// Weighted sum of utilization, diagnoses and stated expenses.
pub fn risk_score(encounters: i64, conditions: i64, expenses: f64) -> f64 {
    encounters as f64 * RISK_ENCOUNTER_WEIGHT
        + conditions as f64 * RISK_CONDITION_WEIGHT
        + expenses / RISK_COST_DIVISOR
}

/// "First Last", or nothing when either part is missing.
pub fn display_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    Some(format!("{} {}", first?, last?))
}

/// True when `description` mentions any of `patterns`, ignoring case.
pub fn mentions_any(description: &str, patterns: &[&str]) -> bool {
    let description = description.to_lowercase();
    patterns
        .iter()
        .any(|pattern| description.contains(&pattern.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_score_weights_encounters_conditions_and_cost() {
        assert_eq!(risk_score(6, 3, 25_000.0), 12.0 + 15.0 + 25.0);
        assert_eq!(risk_score(0, 0, 0.0), 0.0);
    }

    #[test]
    fn chronic_matching_ignores_case_and_position() {
        assert!(mentions_any("Essential hypertension", &CHRONIC_CONDITIONS));
        assert!(mentions_any("Diabetes mellitus type 2", &CHRONIC_CONDITIONS));
        assert!(!mentions_any("Acute bronchitis", &CHRONIC_CONDITIONS));
    }

    #[test]
    fn names_need_both_parts() {
        assert_eq!(display_name(Some("Ada"), Some("Lovelace")).as_deref(), Some("Ada Lovelace"));
        assert_eq!(display_name(Some("Ada"), None), None);
    }
}
