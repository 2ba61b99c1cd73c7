//! Relational source for the hospital platform pipeline
//!
//! Read-only access to the patient, encounter, condition, procedure and
//! medication tables (with organization, provider and payer lookups).

use std::time::Duration;

use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, MySql, Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, Result};
use crate::models::source::{
    ConditionCountRow, ConditionRow, DepartmentRow, EncounterRow, MedicationRow, PatientRecords,
    PatientRow, ProcedureRow,
};

pub mod queries;

use queries::{Dialect, SourceQueries};

const STORE: &str = "relational source";

// Database backend enum
#[derive(Clone)]
pub enum SourceBackend {
    MySql(Pool<MySql>),
    Sqlite(Pool<Sqlite>),
}

/// Relational source connection
pub struct SqlSource {
    backend: SourceBackend,
    queries: SourceQueries,
}

impl SqlSource {
    /// Connect by URL scheme: `mysql://` or `sqlite:`.
    ///
    /// Establishing the connection is bounded by `timeout`; any failure here is
    /// reported as the source being unavailable.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let source = if url.starts_with("mysql://") {
            let pool = MySqlPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(timeout)
                .connect(url)
                .await
                .map_err(|e| PipelineError::unavailable(STORE, e))?;
            Self::from_mysql(pool)
        } else if url.starts_with("sqlite:") {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(timeout)
                .connect(url)
                .await
                .map_err(|e| PipelineError::unavailable(STORE, e))?;
            Self::from_sqlite(pool)
        } else {
            return Err(PipelineError::UnsupportedSource(url.to_string()));
        };

        source
            .ping()
            .await
            .map_err(|e| PipelineError::unavailable(STORE, e))?;
        info!("Connected to relational source ({:?})", source.dialect());
        Ok(source)
    }

    pub fn from_mysql(pool: Pool<MySql>) -> Self {
        Self {
            backend: SourceBackend::MySql(pool),
            queries: SourceQueries::for_dialect(Dialect::MySql),
        }
    }

    pub fn from_sqlite(pool: Pool<Sqlite>) -> Self {
        Self {
            backend: SourceBackend::Sqlite(pool),
            queries: SourceQueries::for_dialect(Dialect::Sqlite),
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self.backend {
            SourceBackend::MySql(_) => Dialect::MySql,
            SourceBackend::Sqlite(_) => Dialect::Sqlite,
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match &self.backend {
            SourceBackend::MySql(pool) => {
                sqlx::query(&self.queries.ping).execute(pool).await?;
            }
            SourceBackend::Sqlite(pool) => {
                sqlx::query(&self.queries.ping).execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn count_patients(&self) -> Result<i64> {
        let count = match &self.backend {
            SourceBackend::MySql(pool) => {
                sqlx::query_scalar::<_, i64>(&self.queries.count_patients)
                    .fetch_one(pool)
                    .await?
            }
            SourceBackend::Sqlite(pool) => {
                sqlx::query_scalar::<_, i64>(&self.queries.count_patients)
                    .fetch_one(pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Every patient row, decoded one at a time.
    ///
    /// A row that cannot be decoded comes back as a per-record error naming the
    /// patient, so one malformed row never hides the others.
    #[instrument(skip(self))]
    pub async fn patients(&self) -> Result<Vec<Result<PatientRow>>> {
        let patients = match &self.backend {
            SourceBackend::MySql(pool) => {
                let rows: Vec<MySqlRow> = sqlx::query(&self.queries.patients).fetch_all(pool).await?;
                decode_patients(rows)
            }
            SourceBackend::Sqlite(pool) => {
                let rows: Vec<SqliteRow> = sqlx::query(&self.queries.patients).fetch_all(pool).await?;
                decode_patients(rows)
            }
        };
        debug!("Read {} patient rows", patients.len());
        Ok(patients)
    }

    /// All child records of one patient, each list most recent first.
    #[instrument(skip(self), fields(patient_id = %patient_id))]
    pub async fn records(&self, patient_id: i64) -> Result<PatientRecords> {
        Ok(PatientRecords {
            encounters: self.encounters(patient_id).await?,
            conditions: self.conditions(patient_id).await?,
            procedures: self.procedures(patient_id).await?,
            medications: self.medications(patient_id).await?,
        })
    }

    pub async fn encounters(&self, patient_id: i64) -> Result<Vec<EncounterRow>> {
        self.fetch_for_patient(&self.queries.encounters, patient_id).await
    }

    pub async fn conditions(&self, patient_id: i64) -> Result<Vec<ConditionRow>> {
        self.fetch_for_patient(&self.queries.conditions, patient_id).await
    }

    pub async fn procedures(&self, patient_id: i64) -> Result<Vec<ProcedureRow>> {
        self.fetch_for_patient(&self.queries.procedures, patient_id).await
    }

    pub async fn medications(&self, patient_id: i64) -> Result<Vec<MedicationRow>> {
        self.fetch_for_patient(&self.queries.medications, patient_id).await
    }

    /// Encounter count and average stay per organization, null organizations grouped as "Unknown".
    #[instrument(skip(self))]
    pub async fn department_utilization(&self) -> Result<Vec<DepartmentRow>> {
        let sql = &self.queries.department_utilization;
        let rows = match &self.backend {
            SourceBackend::MySql(pool) => sqlx::query_as::<_, DepartmentRow>(sql).fetch_all(pool).await?,
            SourceBackend::Sqlite(pool) => sqlx::query_as::<_, DepartmentRow>(sql).fetch_all(pool).await?,
        };
        Ok(rows)
    }

    /// Most frequent condition descriptions across the whole condition table.
    #[instrument(skip(self))]
    pub async fn top_conditions(&self, limit: usize) -> Result<Vec<ConditionCountRow>> {
        let sql = &self.queries.top_conditions;
        let limit = limit as i64;
        let rows = match &self.backend {
            SourceBackend::MySql(pool) => {
                sqlx::query_as::<_, ConditionCountRow>(sql)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
            SourceBackend::Sqlite(pool) => {
                sqlx::query_as::<_, ConditionCountRow>(sql)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn close(&self) {
        match &self.backend {
            SourceBackend::MySql(pool) => pool.close().await,
            SourceBackend::Sqlite(pool) => pool.close().await,
        }
    }

    async fn fetch_for_patient<T>(&self, sql: &str, patient_id: i64) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, MySqlRow> + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let rows = match &self.backend {
            SourceBackend::MySql(pool) => {
                sqlx::query_as::<_, T>(sql)
                    .bind(patient_id)
                    .fetch_all(pool)
                    .await?
            }
            SourceBackend::Sqlite(pool) => {
                sqlx::query_as::<_, T>(sql)
                    .bind(patient_id)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows)
    }
}

fn decode_patients<R>(rows: Vec<R>) -> Vec<Result<PatientRow>>
where
    R: Row,
    for<'r> PatientRow: FromRow<'r, R>,
    for<'r> &'r str: sqlx::ColumnIndex<R>,
    for<'r> i64: sqlx::Decode<'r, R::Database>,
    i64: sqlx::Type<R::Database>,
    for<'r> String: sqlx::Decode<'r, R::Database>,
    String: sqlx::Type<R::Database>,
{
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            PatientRow::from_row(&row).map_err(|e| {
                let label = row
                    .try_get::<Option<String>, _>("patient_source_id")
                    .ok()
                    .flatten()
                    .or_else(|| {
                        row.try_get::<i64, _>("patient_id")
                            .ok()
                            .map(|id| format!("row {}", id))
                    })
                    .unwrap_or_else(|| format!("result row {}", index));
                PipelineError::record(label, e.to_string())
            })
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::hospital_source;
    use super::*;
    use crate::core::transform::tests::ts;

    #[tokio::test]
    async fn rejects_unknown_url_schemes() {
        let err = SqlSource::connect("postgres://localhost/db", Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::UnsupportedSource(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn decodes_every_patient_row() {
        let source = hospital_source().await;
        assert_eq!(source.count_patients().await.unwrap(), 4);

        let patients = source.patients().await.unwrap();
        assert_eq!(patients.len(), 4);
        let p1 = patients[0].as_ref().unwrap();
        assert_eq!(p1.patient_source_id.as_deref(), Some("P1"));
        assert_eq!(p1.healthcare_expenses, Some(60000.0));
        assert_eq!(p1.zip.as_deref(), Some("02108"));
        let p4 = patients[3].as_ref().unwrap();
        assert_eq!(p4.patient_source_id, None);
    }

    #[tokio::test]
    async fn encounters_are_denormalized_and_most_recent_first() {
        let source = hospital_source().await;
        let encounters = source.encounters(1).await.unwrap();

        assert_eq!(encounters.len(), 2);
        assert_eq!(encounters[0].encounter_source_id.as_deref(), Some("E2"));
        assert_eq!(encounters[0].start, Some(ts("2018-03-01 09:00:00")));
        assert_eq!(encounters[0].organization_name.as_deref(), Some("General Hospital"));
        assert_eq!(encounters[0].provider_specialty.as_deref(), Some("GENERAL PRACTICE"));
        assert_eq!(encounters[0].payer_name, None);
        assert_eq!(encounters[0].base_encounter_cost, None);
        assert_eq!(encounters[1].payer_name.as_deref(), Some("Medicare"));
        assert_eq!(encounters[1].total_claim_cost, Some(100.0));
    }

    #[tokio::test]
    async fn dangling_organization_key_yields_null_name() {
        let source = hospital_source().await;
        let encounters = source.encounters(2).await.unwrap();
        assert_eq!(encounters.len(), 2);
        assert!(encounters.iter().all(|e| e.organization_name.is_none()));
    }

    #[tokio::test]
    async fn malformed_timestamp_fails_the_patient_read() {
        let source = hospital_source().await;
        assert!(source.records(3).await.is_err());
        assert!(source.records(1).await.is_ok());
    }

    #[tokio::test]
    async fn child_records_are_ordered_by_date_descending() {
        let source = hospital_source().await;
        let records = source.records(1).await.unwrap();

        let conditions: Vec<_> = records.conditions.iter().map(|c| c.description.as_deref()).collect();
        assert_eq!(conditions, [Some("Hypertension"), Some("Flu")]);
        assert_eq!(records.procedures[0].description.as_deref(), Some("Colonoscopy"));
        assert_eq!(records.procedures[1].base_cost, None);
        assert_eq!(records.medications.len(), 1);
        assert_eq!(records.medications[0].code.as_deref(), Some("314076"));
    }

    #[tokio::test]
    async fn date_only_condition_dates_read_as_midnight() {
        let source = hospital_source().await;
        let conditions = source.conditions(1).await.unwrap();

        assert_eq!(conditions[0].start, Some(ts("2016-05-01 00:00:00")));
        assert_eq!(conditions[0].stop, None);
        assert_eq!(conditions[1].start, Some(ts("2015-01-01 00:00:00")));
        assert_eq!(conditions[1].stop, Some(ts("2015-01-20 00:00:00")));
    }

    #[tokio::test]
    async fn department_utilization_groups_null_organizations() {
        let source = hospital_source().await;
        let departments = source.department_utilization().await.unwrap();

        assert_eq!(
            departments,
            vec![
                DepartmentRow {
                    department: "General Hospital".into(),
                    encounter_count: 2,
                    average_stay_hours: Some(13.0),
                },
                DepartmentRow {
                    department: "Unknown".into(),
                    encounter_count: 2,
                    average_stay_hours: Some(4.0),
                },
                DepartmentRow {
                    department: "Children's Clinic".into(),
                    encounter_count: 1,
                    average_stay_hours: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn top_conditions_count_distinct_patients() {
        let source = hospital_source().await;
        let top = source.top_conditions(10).await.unwrap();

        assert_eq!(
            top,
            vec![
                ConditionCountRow { description: Some("Flu".into()), patient_count: 2 },
                ConditionCountRow { description: Some("Hypertension".into()), patient_count: 2 },
            ]
        );
        assert_eq!(source.top_conditions(1).await.unwrap().len(), 1);
    }
}
