//! Document Builder
//!
//! Rebuilds the patient summary collection from the relational source, one
//! self-contained document per patient, then writes the Operational Metrics
//! singleton. Every run drops the target collections first; there is no
//! append mode.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{MigrationConfig, Settings};
use crate::core::transform::{assemble_summary, patient_label, TransformContext};
use crate::db::SqlSource;
use crate::error::{PipelineError, Result};
use crate::models::metrics::{
    ClinicalInsights, ConditionFrequency, DepartmentUtilization, MigrationSummary, OperationalMetrics,
    OPERATIONAL_METRICS_ID,
};
use crate::models::source::PatientRow;
use crate::models::UNKNOWN_LABEL;
use crate::store::{CollectionCounts, DocumentStore, MongoStore};

/// A patient that did not produce a document, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub patient: String,
    pub reason: String,
}

impl RecordFailure {
    fn from_error(patient: &str, err: PipelineError) -> Self {
        match err {
            PipelineError::Record { patient, reason } => Self { patient, reason },
            other => Self {
                patient: patient.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub attempted: usize,
    pub migrated: usize,
    pub failures: Vec<RecordFailure>,
    pub metrics_written: bool,
    pub counts: CollectionCounts,
    pub elapsed: Duration,
}

impl MigrationReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

pub struct DocumentBuilder<D> {
    source: SqlSource,
    documents: D,
    config: MigrationConfig,
}

impl DocumentBuilder<MongoStore> {
    /// Connect to both stores. Either being unreachable is fatal and nothing is written.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let timeout = settings.connect_timeout();
        let source = SqlSource::connect(&settings.source.url, timeout).await?;
        let documents = match MongoStore::connect(&settings.documents, timeout).await {
            Ok(documents) => documents,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };
        Ok(Self::new(source, documents, settings.migration.clone()))
    }
}

impl<D: DocumentStore> DocumentBuilder<D> {
    pub fn new(source: SqlSource, documents: D, config: MigrationConfig) -> Self {
        Self {
            source,
            documents,
            config,
        }
    }

    /// Run a full rebuild. The relational source is closed whether or not the run succeeds.
    pub async fn run(self) -> Result<MigrationReport> {
        let run_id = Uuid::new_v4();
        let result = self.migrate(run_id).await;
        self.source.close().await;
        result
    }

    #[instrument(skip(self, run_id), fields(run_id = %run_id))]
    async fn migrate(&self, run_id: Uuid) -> Result<MigrationReport> {
        let started = Instant::now();

        warn!("Dropping patient summary and operational metrics collections for a full rebuild");
        self.documents.reset_collections().await?;

        let context = TransformContext::now(self.config.schema_version.clone());
        let rows = self.source.patients().await?;
        let attempted = rows.len();
        info!("Migrating {} patients", attempted);

        let mut migrated = 0;
        let mut failures = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            let outcome = match row {
                Ok(patient) => self.migrate_patient(&patient, &context).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => migrated += 1,
                Err(e) => {
                    let failure = RecordFailure::from_error(&format!("result row {}", index), e);
                    error!(patient = %failure.patient, reason = %failure.reason, "Patient not migrated");
                    failures.push(failure);
                }
            }

            let done = index + 1;
            if self.config.progress_every > 0 && done % self.config.progress_every == 0 {
                info!(done, attempted, migrated, failed = failures.len(), "Migration progress");
            }
        }

        let metrics_written = match self.write_metrics(run_id, migrated, failures.len()).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Operational metrics not written");
                false
            }
        };

        let counts = self.documents.collection_counts().await?;
        let report = MigrationReport {
            run_id,
            attempted,
            migrated,
            failures,
            metrics_written,
            counts,
            elapsed: started.elapsed(),
        };
        info!(
            attempted = report.attempted,
            migrated = report.migrated,
            failed = report.failed(),
            patient_summaries = report.counts.patient_summaries,
            operational_metrics = report.counts.operational_metrics,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Migration complete"
        );
        Ok(report)
    }

    async fn migrate_patient(&self, patient: &PatientRow, context: &TransformContext) -> Result<()> {
        let label = patient_label(patient);
        let records = self
            .source
            .records(patient.patient_id)
            .await
            .map_err(|e| PipelineError::record(label.clone(), e.to_string()))?;
        let summary = assemble_summary(patient, records, context)?;
        self.documents
            .insert_summary(&summary)
            .await
            .map_err(|e| match e {
                PipelineError::Record { .. } => e,
                other => PipelineError::record(label, other.to_string()),
            })
    }

    async fn write_metrics(&self, run_id: Uuid, migrated: usize, failed: usize) -> Result<()> {
        let departments = self.source.department_utilization().await?;
        let conditions = self.source.top_conditions(self.config.top_conditions).await?;

        let metrics = OperationalMetrics {
            id: OPERATIONAL_METRICS_ID.to_string(),
            migration_summary: MigrationSummary {
                run_id: run_id.to_string(),
                total_patients_migrated: migrated as i64,
                total_errors: failed as i64,
                migration_date: chrono::Utc::now(),
                data_timeframe: self.config.data_timeframe.clone(),
            },
            department_utilization: departments
                .into_iter()
                .map(|row| DepartmentUtilization {
                    department: row.department,
                    encounter_count: row.encounter_count,
                    average_stay_hours: row.average_stay_hours.filter(|h| h.is_finite()).unwrap_or(0.0),
                })
                .collect(),
            clinical_insights: ClinicalInsights {
                top_conditions: conditions
                    .into_iter()
                    .map(|row| ConditionFrequency {
                        condition: row.description.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                        patient_count: row.patient_count,
                    })
                    .collect(),
            },
        };
        self.documents.write_operational_metrics(&metrics).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{empty_source, hospital_source};
    use crate::store::memory::MemoryStore;

    fn config() -> MigrationConfig {
        MigrationConfig {
            progress_every: 1,
            ..MigrationConfig::default()
        }
    }

    #[tokio::test]
    async fn every_patient_is_migrated_or_counted_as_failed() {
        let store = MemoryStore::default();
        let builder = DocumentBuilder::new(hospital_source().await, store.clone(), config());
        let report = builder.run().await.unwrap();

        assert_eq!(report.attempted, 4);
        assert_eq!(report.migrated, 2);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.migrated + report.failed(), report.attempted);
        assert_eq!(store.ids().into_iter().collect::<Vec<_>>(), ["P1", "P2"]);

        let failed: Vec<_> = report.failures.iter().map(|f| f.patient.as_str()).collect();
        assert_eq!(failed, ["P3", "row 4"]);
        assert!(report.failures[1].reason.contains("missing"));
        assert_eq!(
            report.counts,
            CollectionCounts {
                patient_summaries: 2,
                operational_metrics: 1,
            }
        );
    }

    #[tokio::test]
    async fn worked_example_document() {
        let store = MemoryStore::default();
        DocumentBuilder::new(hospital_source().await, store.clone(), config())
            .run()
            .await
            .unwrap();

        let summaries = store.summaries.lock().unwrap();
        let p1 = summaries.iter().find(|s| s.id == "P1").unwrap();
        let clinical = &p1.clinical_summary;
        assert_eq!(clinical.total_encounters, 2);
        assert_eq!(clinical.total_encounters as usize, p1.encounters.len());
        assert_eq!(clinical.healthcare_metrics.calculated_costs, 350.5);
        assert_eq!(clinical.healthcare_metrics.total_expenses, 60000.0);
        assert_eq!(clinical.active_conditions, ["Hypertension"]);
        assert_eq!(clinical.total_conditions, 2);
        assert_eq!(p1.encounters[0].date.start.as_deref(), Some("2018-03-01T09:00:00"));
        assert_eq!(p1.encounters[0].financial.base_cost, 0.0);
        assert_eq!(p1.encounters[1].financial.payer.as_deref(), Some("Medicare"));

        let p2 = summaries.iter().find(|s| s.id == "P2").unwrap();
        assert_eq!(p2.demographics.location.coordinates.lat, None);
        assert_eq!(p2.clinical_summary.healthcare_metrics.total_expenses, 0.0);
        assert_eq!(p2.clinical_summary.healthcare_metrics.calculated_costs, 75.25);
    }

    #[tokio::test]
    async fn operational_metrics_cover_the_whole_source() {
        let store = MemoryStore::default();
        let report = DocumentBuilder::new(hospital_source().await, store.clone(), config())
            .run()
            .await
            .unwrap();
        assert!(report.metrics_written);

        let metrics = store.metrics.lock().unwrap().clone().unwrap();
        assert_eq!(metrics.id, "operational_dashboard");
        assert_eq!(metrics.migration_summary.run_id, report.run_id.to_string());
        assert_eq!(metrics.migration_summary.total_patients_migrated, 2);
        assert_eq!(metrics.migration_summary.total_errors, 2);
        assert_eq!(metrics.migration_summary.data_timeframe, "2017-2018");

        let unknown = metrics
            .department_utilization
            .iter()
            .find(|d| d.department == "Unknown")
            .unwrap();
        assert_eq!(unknown.encounter_count, 2);
        assert_eq!(unknown.average_stay_hours, 4.0);
        let clinic = metrics
            .department_utilization
            .iter()
            .find(|d| d.department == "Children's Clinic")
            .unwrap();
        assert_eq!(clinic.average_stay_hours, 0.0);

        // Includes the patient whose document failed
        let conditions: Vec<_> = metrics
            .clinical_insights
            .top_conditions
            .iter()
            .map(|c| (c.condition.as_str(), c.patient_count))
            .collect();
        assert_eq!(conditions, [("Flu", 2), ("Hypertension", 2)]);
    }

    #[tokio::test]
    async fn rerun_replaces_previous_output() {
        let store = MemoryStore::default();
        let first = DocumentBuilder::new(hospital_source().await, store.clone(), config())
            .run()
            .await
            .unwrap();
        let before: Vec<_> = store.summaries.lock().unwrap().clone();

        let second = DocumentBuilder::new(hospital_source().await, store.clone(), config())
            .run()
            .await
            .unwrap();
        let after: Vec<_> = store.summaries.lock().unwrap().clone();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(*store.resets.lock().unwrap(), 2);
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            let mut a = a.clone();
            a.metadata.migration_timestamp = b.metadata.migration_timestamp;
            assert_eq!(&a, b);
        }
    }

    #[tokio::test]
    async fn write_conflict_is_a_record_failure() {
        let store = MemoryStore {
            reject_inserts: ["P2".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let report = DocumentBuilder::new(hospital_source().await, store.clone(), config())
            .run()
            .await
            .unwrap();

        assert_eq!(report.migrated, 1);
        assert!(report.failures.iter().any(|f| f.patient == "P2"));
        assert_eq!(store.ids().into_iter().collect::<Vec<_>>(), ["P1"]);
    }

    #[tokio::test]
    async fn metrics_write_failure_is_reported_not_fatal() {
        let store = MemoryStore {
            reject_metrics: true,
            ..Default::default()
        };
        let report = DocumentBuilder::new(hospital_source().await, store.clone(), config())
            .run()
            .await
            .unwrap();

        assert!(!report.metrics_written);
        assert_eq!(report.migrated, 2);
        assert_eq!(report.counts.operational_metrics, 0);
    }

    #[tokio::test]
    async fn empty_source_still_writes_metrics() {
        let store = MemoryStore::default();
        let report = DocumentBuilder::new(empty_source().await, store.clone(), config())
            .run()
            .await
            .unwrap();

        assert_eq!(report.attempted, 0);
        assert!(report.metrics_written);
        let metrics = store.metrics.lock().unwrap().clone().unwrap();
        assert!(metrics.department_utilization.is_empty());
        assert!(metrics.clinical_insights.top_conditions.is_empty());
    }
}
