//! Rows read from the relational source.
//!
//! Monetary and coordinate columns arrive as `Option<f64>` (the queries cast
//! DECIMAL columns to DOUBLE) and timestamps as `Option<NaiveDateTime>`; the
//! coercion into document values happens in `core::transform`.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PatientRow {
    pub patient_id: i64,
    pub patient_source_id: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub gender: Option<String>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub marital: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub healthcare_expenses: Option<f64>,
    pub healthcare_coverage: Option<f64>,
}

/// An encounter with its organization, provider and payer names joined inline.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct EncounterRow {
    pub encounter_source_id: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub stop: Option<NaiveDateTime>,
    pub description: Option<String>,
    pub class: Option<String>,
    pub reason_code: Option<String>,
    pub reason_description: Option<String>,
    pub base_encounter_cost: Option<f64>,
    pub total_claim_cost: Option<f64>,
    pub payer_coverage: Option<f64>,
    pub organization_name: Option<String>,
    pub provider_name: Option<String>,
    pub provider_specialty: Option<String>,
    pub payer_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ConditionRow {
    pub description: Option<String>,
    pub code: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub stop: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ProcedureRow {
    pub description: Option<String>,
    pub code: Option<String>,
    pub procedure_date: Option<NaiveDateTime>,
    pub base_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct MedicationRow {
    pub description: Option<String>,
    pub code: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub stop: Option<NaiveDateTime>,
    pub base_cost: Option<f64>,
    pub total_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DepartmentRow {
    pub department: String,
    pub encounter_count: i64,
    pub average_stay_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ConditionCountRow {
    pub description: Option<String>,
    pub patient_count: i64,
}

/// Everything the Document Builder reads for a single patient.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientRecords {
    pub encounters: Vec<EncounterRow>,
    pub conditions: Vec<ConditionRow>,
    pub procedures: Vec<ProcedureRow>,
    pub medications: Vec<MedicationRow>,
}
