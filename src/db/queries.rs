//! SQL read by the Document Builder.
//!
//! MySQL is the production source and SQLite serves local extracts. Both
//! accept `?` placeholders, so the statements differ only in how timestamps
//! are coerced and how an hour difference is computed.

use crate::models::UNKNOWN_LABEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl Dialect {
    /// Timestamp column readable as `NaiveDateTime`, whether stored as DATE or DATETIME.
    ///
    /// SQLite keeps dates as text, so a date-only value is padded to midnight.
    /// Anything else is passed through and still fails to decode if malformed.
    fn datetime(self, column: &str) -> String {
        match self {
            Dialect::MySql => format!("CAST({} AS DATETIME)", column),
            Dialect::Sqlite => format!(
                "CASE WHEN length({c}) = 10 THEN {c} || ' 00:00:00' ELSE {c} END",
                c = column
            ),
        }
    }

    fn hours_between(self, start: &str, stop: &str) -> String {
        match self {
            Dialect::MySql => format!("TIMESTAMPDIFF(HOUR, {}, {})", start, stop),
            Dialect::Sqlite => format!(
                "((strftime('%s', {}) - strftime('%s', {})) / 3600)",
                stop, start
            ),
        }
    }
}

fn double(column: &str) -> String {
    format!("CAST({} AS DOUBLE)", column)
}

fn text(column: &str) -> String {
    format!("CAST({} AS CHAR)", column)
}

#[derive(Debug, Clone)]
pub struct SourceQueries {
    pub ping: String,
    pub count_patients: String,
    pub patients: String,
    pub encounters: String,
    pub conditions: String,
    pub procedures: String,
    pub medications: String,
    pub department_utilization: String,
    pub top_conditions: String,
}

impl SourceQueries {
    pub fn for_dialect(dialect: Dialect) -> Self {
        let dt = |column: &str| dialect.datetime(column);

        let patients = format!(
            "SELECT patient_id,
                    {} AS patient_source_id,
                    first, last, prefix, suffix,
                    birthdate, gender, race, ethnicity, marital,
                    address, city, state,
                    {} AS zip,
                    {} AS lat,
                    {} AS lon,
                    {} AS healthcare_expenses,
                    {} AS healthcare_coverage
             FROM patients
             ORDER BY patient_id",
            text("patient_source_id"),
            text("zip"),
            double("lat"),
            double("lon"),
            double("healthcare_expenses"),
            double("healthcare_coverage"),
        );

        // Reference tables are left-joined so a dangling key yields a null name
        let encounters = format!(
            "SELECT {} AS encounter_source_id,
                    {} AS start,
                    {} AS stop,
                    e.description, e.class,
                    {} AS reason_code,
                    e.reason_description,
                    {} AS base_encounter_cost,
                    {} AS total_claim_cost,
                    {} AS payer_coverage,
                    o.name AS organization_name,
                    pr.name AS provider_name,
                    pr.specialty AS provider_specialty,
                    pay.name AS payer_name
             FROM encounters e
             LEFT JOIN organizations o ON e.organization_id = o.org_id
             LEFT JOIN providers pr ON e.provider_id = pr.provider_id
             LEFT JOIN payers pay ON e.payer_id = pay.payer_id
             WHERE e.patient_id = ?
             ORDER BY e.start DESC, e.encounter_source_id DESC",
            text("e.encounter_source_id"),
            dt("e.start"),
            dt("e.stop"),
            text("e.reason_code"),
            double("e.base_encounter_cost"),
            double("e.total_claim_cost"),
            double("e.payer_coverage"),
        );

        let conditions = format!(
            "SELECT description,
                    {} AS code,
                    {} AS start,
                    {} AS stop
             FROM conditions
             WHERE patient_id = ?
             ORDER BY start DESC, description ASC",
            text("code"),
            dt("start"),
            dt("stop"),
        );

        let procedures = format!(
            "SELECT description,
                    {} AS code,
                    {} AS procedure_date,
                    {} AS base_cost
             FROM procedures
             WHERE patient_id = ?
             ORDER BY procedure_date DESC, description ASC",
            text("code"),
            dt("procedure_date"),
            double("base_cost"),
        );

        let medications = format!(
            "SELECT description,
                    {} AS code,
                    {} AS start,
                    {} AS stop,
                    {} AS base_cost,
                    {} AS total_cost
             FROM medications
             WHERE patient_id = ?
             ORDER BY start DESC, description ASC",
            text("code"),
            dt("start"),
            dt("stop"),
            double("base_cost"),
            double("total_cost"),
        );

        // Every encounter counts toward its department; only those with both
        // ends contribute a stay length (AVG skips the NULL differences).
        let department_utilization = format!(
            "SELECT COALESCE(o.name, '{unknown}') AS department,
                    COUNT(*) AS encounter_count,
                    {avg} AS average_stay_hours
             FROM encounters e
             LEFT JOIN organizations o ON e.organization_id = o.org_id
             GROUP BY COALESCE(o.name, '{unknown}')
             ORDER BY encounter_count DESC, department ASC",
            unknown = UNKNOWN_LABEL,
            avg = double(&format!("AVG({})", dialect.hours_between("e.start", "e.stop"))),
        );

        let top_conditions = "SELECT description,
                    COUNT(DISTINCT patient_id) AS patient_count
             FROM conditions
             GROUP BY description
             ORDER BY patient_count DESC, description ASC
             LIMIT ?"
            .to_string();

        Self {
            ping: "SELECT 1".to_string(),
            count_patients: "SELECT COUNT(*) FROM patients".to_string(),
            patients,
            encounters,
            conditions,
            procedures,
            medications,
            department_utilization,
            top_conditions,
        }
    }
}
