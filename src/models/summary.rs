//! Patient Summary Document
//!
//! One self-contained document per patient, keyed by the patient's natural
//! key. Absent values are written as explicit nulls (dates, coordinates,
//! names) or zero (money); no field is omitted from the stored shape.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::cost::CostBasis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub metadata: MigrationMetadata,
    pub demographics: Demographics,
    pub clinical_summary: ClinicalSummary,
    pub encounters: Vec<EncounterEntry>,
    pub conditions: Vec<ConditionEntry>,
    pub procedures: Vec<ProcedureEntry>,
    pub medications: Vec<MedicationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationMetadata {
    #[serde(rename = "mysql_patient_id")]
    pub source_row_id: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub migration_timestamp: DateTime<Utc>,
    pub data_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub name: PersonName,
    pub birthdate: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub marital_status: Option<String>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonName {
    pub first: Option<String>,
    pub last: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalSummary {
    pub total_encounters: i64,
    pub active_conditions: Vec<String>,
    pub total_conditions: i64,
    pub total_procedures: i64,
    pub total_medications: i64,
    pub healthcare_metrics: HealthcareMetrics,
}

/// Stated lifetime figures from the patient row next to the cost recomputed
/// from encounter claims. The two are kept side by side and may differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthcareMetrics {
    pub total_expenses: f64,
    pub total_coverage: f64,
    pub calculated_costs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterEntry {
    pub encounter_id: Option<String>,
    pub date: Period,
    #[serde(rename = "type")]
    pub encounter_type: Option<String>,
    pub class: Option<String>,
    pub clinical: EncounterReason,
    pub providers: CareTeam,
    pub financial: EncounterFinancial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterReason {
    pub reason_code: Option<String>,
    pub reason_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareTeam {
    pub organization: Option<String>,
    pub provider: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterFinancial {
    pub base_cost: f64,
    pub total_claim_cost: f64,
    pub payer_coverage: f64,
    pub payer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionEntry {
    pub description: String,
    pub code: Option<String>,
    pub timeline: ConditionTimeline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionTimeline {
    pub start: Option<String>,
    pub end: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureEntry {
    pub description: Option<String>,
    pub code: Option<String>,
    pub date: Option<String>,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationEntry {
    pub description: Option<String>,
    pub code: Option<String>,
    pub timeline: Period,
    pub cost: MedicationCost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationCost {
    pub base: f64,
    pub total: f64,
}

impl PatientSummary {
    /// Stated or calculated lifetime cost, depending on `basis`.
    pub fn cost(&self, basis: CostBasis) -> f64 {
        let metrics = &self.clinical_summary.healthcare_metrics;
        match basis {
            CostBasis::Stated => metrics.total_expenses,
            CostBasis::Calculated => metrics.calculated_costs,
        }
    }
}
