use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

use crate::error::{PipelineError, Result};
use crate::models::source::{
    ConditionRow, EncounterRow, MedicationRow, PatientRecords, PatientRow, ProcedureRow,
};
use crate::models::summary::{
    CareTeam, ClinicalSummary, ConditionEntry, ConditionTimeline, Coordinates, Demographics,
    EncounterEntry, EncounterFinancial, EncounterReason, HealthcareMetrics, Location,
    MedicationCost, MedicationEntry, MigrationMetadata, PatientSummary, Period, PersonName,
    ProcedureEntry,
};
use crate::models::UNKNOWN_LABEL;

/// Run-wide values every document of one migration shares.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub today: NaiveDate,
    pub migrated_at: DateTime<Utc>,
    pub data_version: String,
}

impl TransformContext {
    pub fn now(data_version: impl Into<String>) -> Self {
        let migrated_at = Utc::now();
        Self {
            today: migrated_at.date_naive(),
            migrated_at,
            data_version: data_version.into(),
        }
    }
}

/// Whole years between `birthdate` and `today`, counting a year only once the birthday has passed.
pub fn age_on(birthdate: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birthdate.year();
    if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
        age -= 1;
    }
    age
}

pub fn iso_datetime(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string())
}

pub fn iso_date(value: Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Absent or non-finite money becomes 0.
pub fn money(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Absent or non-finite coordinates become null.
pub fn coordinate(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Sum of every encounter's total claim cost, missing costs counted as 0.
pub fn calculated_cost(encounters: &[EncounterRow]) -> f64 {
    encounters.iter().map(|e| money(e.total_claim_cost)).sum()
}

/// Descriptions of conditions with no stop timestamp, in input order.
pub fn active_conditions(conditions: &[ConditionRow]) -> Vec<String> {
    conditions
        .iter()
        .filter(|c| c.stop.is_none())
        .map(condition_description)
        .collect()
}

/// A null condition description is reported as "Unknown", as in the source-side rankings.
pub fn condition_description(condition: &ConditionRow) -> String {
    condition
        .description
        .clone()
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

/// Identifier used when reporting a patient, natural key first.
pub fn patient_label(patient: &PatientRow) -> String {
    natural_key(patient)
        .map(str::to_string)
        .unwrap_or_else(|| format!("row {}", patient.patient_id))
}

fn natural_key(patient: &PatientRow) -> Option<&str> {
    patient
        .patient_source_id
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Build the nested Patient Summary Document for one patient.
///
/// Fails only for problems with the patient row itself: no natural key, or a
/// birthdate after the run date.
pub fn assemble_summary(
    patient: &PatientRow,
    records: PatientRecords,
    ctx: &TransformContext,
) -> Result<PatientSummary> {
    let id = natural_key(patient).ok_or_else(|| {
        PipelineError::record(patient_label(patient), "missing patient_source_id")
    })?;

    let age = match patient.birthdate {
        Some(birthdate) if birthdate > ctx.today => {
            return Err(PipelineError::record(
                id,
                format!("birthdate {} is after the run date", birthdate),
            ));
        }
        Some(birthdate) => Some(age_on(birthdate, ctx.today)),
        None => None,
    };

    let PatientRecords {
        encounters,
        conditions,
        procedures,
        medications,
    } = records;

    let clinical_summary = ClinicalSummary {
        total_encounters: encounters.len() as i64,
        active_conditions: active_conditions(&conditions),
        total_conditions: conditions.len() as i64,
        total_procedures: procedures.len() as i64,
        total_medications: medications.len() as i64,
        healthcare_metrics: HealthcareMetrics {
            total_expenses: money(patient.healthcare_expenses),
            total_coverage: money(patient.healthcare_coverage),
            calculated_costs: calculated_cost(&encounters),
        },
    };

    Ok(PatientSummary {
        id: id.to_string(),
        metadata: MigrationMetadata {
            source_row_id: patient.patient_id,
            migration_timestamp: ctx.migrated_at,
            data_version: ctx.data_version.clone(),
        },
        demographics: demographics(patient, age),
        clinical_summary,
        encounters: encounters.into_iter().map(encounter_entry).collect(),
        conditions: conditions.into_iter().map(condition_entry).collect(),
        procedures: procedures.into_iter().map(procedure_entry).collect(),
        medications: medications.into_iter().map(medication_entry).collect(),
    })
}

fn demographics(patient: &PatientRow, age: Option<i32>) -> Demographics {
    Demographics {
        name: PersonName {
            first: patient.first.clone(),
            last: patient.last.clone(),
            prefix: patient.prefix.clone(),
            suffix: patient.suffix.clone(),
        },
        birthdate: iso_date(patient.birthdate),
        age,
        gender: patient.gender.clone(),
        race: patient.race.clone(),
        ethnicity: patient.ethnicity.clone(),
        marital_status: patient.marital.clone(),
        location: Location {
            address: patient.address.clone(),
            city: patient.city.clone(),
            state: patient.state.clone(),
            zip: patient.zip.clone(),
            coordinates: Coordinates {
                lat: coordinate(patient.lat),
                lon: coordinate(patient.lon),
            },
        },
    }
}

fn encounter_entry(row: EncounterRow) -> EncounterEntry {
    EncounterEntry {
        encounter_id: row.encounter_source_id,
        date: Period {
            start: iso_datetime(row.start),
            end: iso_datetime(row.stop),
        },
        encounter_type: row.description,
        class: row.class,
        clinical: EncounterReason {
            reason_code: row.reason_code,
            reason_description: row.reason_description,
        },
        providers: CareTeam {
            organization: row.organization_name,
            provider: row.provider_name,
            specialty: row.provider_specialty,
        },
        financial: EncounterFinancial {
            base_cost: money(row.base_encounter_cost),
            total_claim_cost: money(row.total_claim_cost),
            payer_coverage: money(row.payer_coverage),
            payer: row.payer_name,
        },
    }
}

fn condition_entry(row: ConditionRow) -> ConditionEntry {
    ConditionEntry {
        description: condition_description(&row),
        timeline: ConditionTimeline {
            start: iso_datetime(row.start),
            end: iso_datetime(row.stop),
            is_active: row.stop.is_none(),
        },
        code: row.code,
    }
}

fn procedure_entry(row: ProcedureRow) -> ProcedureEntry {
    ProcedureEntry {
        description: row.description,
        code: row.code,
        date: iso_datetime(row.procedure_date),
        cost: money(row.base_cost),
    }
}

fn medication_entry(row: MedicationRow) -> MedicationEntry {
    MedicationEntry {
        description: row.description,
        code: row.code,
        timeline: Period {
            start: iso_datetime(row.start),
            end: iso_datetime(row.stop),
        },
        cost: MedicationCost {
            base: money(row.base_cost),
            total: money(row.total_cost),
        },
    }
}
