use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use chrono::NaiveDate;
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, ReplaceOptions};
use mongodb::{Client, Collection, Database};
use tracing::{debug, info, instrument};

use super::{CollectionCounts, DocumentStore, Totals};
use crate::config::DocumentConfig;
use crate::error::{PipelineError, Result};
use crate::models::cost::{bucket_boundaries, histogram_labels, label_for_lower_bound, CostBasis, OFF_SCALE};
use crate::models::metrics::{
    AnalyticsSummary, ChronicBurden, DepartmentPerformance, MonthlyEncounters, OperationalMetrics, RiskProfile,
    ANALYTICS_SUMMARY_ID, CHRONIC_CONDITIONS, OPERATIONAL_METRICS_ID, RISK_CONDITION_WEIGHT, RISK_COST_DIVISOR,
    RISK_ENCOUNTER_WEIGHT,
};
use crate::models::summary::PatientSummary;
use crate::models::{Tally, UNKNOWN_LABEL};

const STORE: &str = "document store";

const ORGANIZATION: &str = "$encounters.providers.organization";
const CLAIM_COST: &str = "$encounters.financial.total_claim_cost";
const TOTAL_ENCOUNTERS: &str = "$clinical_summary.total_encounters";
const TOTAL_CONDITIONS: &str = "$clinical_summary.total_conditions";
const TOTAL_EXPENSES: &str = "$clinical_summary.healthcare_metrics.total_expenses";

/// MongoDB-backed document store
pub struct MongoStore {
    db: Database,
    config: DocumentConfig,
}

impl MongoStore {
    /// Connect and ping. Server selection is bounded by `timeout`, so an
    /// unreachable server fails here rather than on the first write.
    pub async fn connect(config: &DocumentConfig, timeout: Duration) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.url)
            .await
            .map_err(|e| PipelineError::unavailable(STORE, e))?;
        options.app_name = Some("hospital-platform".to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options).map_err(|e| PipelineError::unavailable(STORE, e))?;
        let db = client.database(&config.database);
        let store = Self {
            db,
            config: config.clone(),
        };

        store
            .ping()
            .await
            .map_err(|e| PipelineError::unavailable(STORE, e))?;
        info!("Connected to document store database {}", config.database);
        Ok(store)
    }

    fn patients(&self) -> Collection<PatientSummary> {
        self.db.collection(&self.config.patients_collection)
    }

    fn metrics(&self) -> Collection<OperationalMetrics> {
        self.db.collection(&self.config.metrics_collection)
    }

    fn analytics(&self) -> Collection<AnalyticsSummary> {
        self.db.collection(&self.config.analytics_collection)
    }

    async fn aggregate_patients(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let cursor = self.patients().aggregate(pipeline, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn ranked(&self, pipeline: Vec<Document>) -> Result<Vec<Tally>> {
        let rows = self.aggregate_patients(pipeline).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let label = string_of(row.get("_id")).unwrap_or_else(|| UNKNOWN_LABEL.to_string());
                Tally::new(label, count_of(row.get("count")))
            })
            .collect())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn reset_collections(&self) -> Result<()> {
        self.patients().drop(None).await?;
        self.metrics().drop(None).await?;
        debug!(
            "Dropped {} and {}",
            self.config.patients_collection, self.config.metrics_collection
        );
        Ok(())
    }

    async fn insert_summary(&self, summary: &PatientSummary) -> Result<()> {
        self.patients().insert_one(summary, None).await?;
        Ok(())
    }

    #[instrument(skip(self, metrics))]
    async fn write_operational_metrics(&self, metrics: &OperationalMetrics) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.metrics()
            .replace_one(doc! { "_id": OPERATIONAL_METRICS_ID }, metrics, options)
            .await?;
        Ok(())
    }

    async fn collection_counts(&self) -> Result<CollectionCounts> {
        Ok(CollectionCounts {
            patient_summaries: self.patients().count_documents(None, None).await?,
            operational_metrics: self.metrics().count_documents(None, None).await?,
        })
    }

    async fn count_patients(&self) -> Result<u64> {
        Ok(self.patients().count_documents(None, None).await?)
    }

    async fn count_high_cost(&self, basis: CostBasis, threshold: f64) -> Result<u64> {
        Ok(self
            .patients()
            .count_documents(high_cost_filter(basis, threshold), None)
            .await?)
    }

    async fn encounters_by_organization(&self, limit: usize) -> Result<Vec<Tally>> {
        self.ranked(organization_pipeline(limit)).await
    }

    async fn patients_by_condition(&self, limit: usize) -> Result<Vec<Tally>> {
        self.ranked(condition_pipeline(limit)).await
    }

    async fn cost_histogram(&self, basis: CostBasis) -> Result<Vec<Tally>> {
        let rows = self.aggregate_patients(histogram_pipeline(basis)).await?;
        let mut histogram: Vec<Tally> = histogram_labels().map(|label| Tally::new(label, 0)).collect();
        for row in &rows {
            let label = match row.get("_id") {
                Some(Bson::String(_)) => Some(OFF_SCALE),
                Some(Bson::Double(bound)) => label_for_lower_bound(*bound),
                Some(Bson::Int32(bound)) => label_for_lower_bound(f64::from(*bound)),
                Some(Bson::Int64(bound)) => label_for_lower_bound(*bound as f64),
                _ => None,
            };
            if let Some(slot) = label.and_then(|l| histogram.iter_mut().find(|t| t.label == l)) {
                slot.count = count_of(row.get("count"));
            }
        }
        Ok(histogram)
    }

    async fn encounters_started_on(&self, day: NaiveDate) -> Result<u64> {
        let rows = self.aggregate_patients(started_on_pipeline(day)).await?;
        Ok(rows.first().map(|row| count_of(row.get("count"))).unwrap_or(0))
    }

    async fn totals(&self) -> Result<Totals> {
        let rows = self.aggregate_patients(totals_pipeline()).await?;
        Ok(rows
            .first()
            .map(|row| Totals {
                encounters: count_of(row.get("encounters")),
                healthcare_expenses: number_of(row.get("expenses")),
            })
            .unwrap_or_default())
    }

    async fn patients_with_condition(&self, pattern: &str) -> Result<u64> {
        Ok(self
            .patients()
            .count_documents(condition_filter(pattern), None)
            .await?)
    }

    async fn department_performance(&self, limit: usize) -> Result<Vec<DepartmentPerformance>> {
        let rows = self.aggregate_patients(department_performance_pipeline(limit)).await?;
        Ok(rows
            .iter()
            .map(|row| DepartmentPerformance {
                department: string_of(row.get("department")).unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                total_encounters: count_of(row.get("total_encounters")) as i64,
                avg_claim_cost: number_of(row.get("avg_claim_cost")),
                total_revenue: number_of(row.get("total_revenue")),
                unique_patient_count: count_of(row.get("unique_patient_count")) as i64,
                encounters_per_patient: number_of(row.get("encounters_per_patient")),
            })
            .collect())
    }

    async fn monthly_encounters(&self, months: usize) -> Result<Vec<MonthlyEncounters>> {
        let rows = self.aggregate_patients(monthly_trend_pipeline(months)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let period = row.get_document("_id").ok()?;
                Some(MonthlyEncounters {
                    year: number_of(period.get("year")) as i32,
                    month: number_of(period.get("month")) as u32,
                    encounter_count: count_of(row.get("encounter_count")) as i64,
                    total_cost: number_of(row.get("total_cost")),
                    avg_cost: number_of(row.get("avg_cost")),
                })
            })
            .collect())
    }

    async fn chronic_burden(&self, min_conditions: usize, limit: usize) -> Result<Vec<ChronicBurden>> {
        let rows = self
            .aggregate_patients(chronic_burden_pipeline(min_conditions, limit))
            .await?;
        Ok(rows
            .iter()
            .map(|row| ChronicBurden {
                patient_id: string_of(row.get("_id")).unwrap_or_default(),
                name: string_of(row.get("name")),
                chronic_conditions: count_of(row.get("chronic_conditions")) as i64,
                total_encounters: count_of(row.get("total_encounters")) as i64,
                total_costs: number_of(row.get("total_costs")),
            })
            .collect())
    }

    async fn risk_profiles(&self, min_encounters: i64, limit: usize) -> Result<Vec<RiskProfile>> {
        let rows = self.aggregate_patients(risk_pipeline(min_encounters, limit)).await?;
        Ok(rows
            .iter()
            .map(|row| RiskProfile {
                patient_id: string_of(row.get("_id")).unwrap_or_default(),
                name: string_of(row.get("name")),
                encounter_count: count_of(row.get("encounter_count")) as i64,
                condition_count: count_of(row.get("condition_count")) as i64,
                total_costs: number_of(row.get("total_costs")),
                risk_score: number_of(row.get("risk_score")),
            })
            .collect())
    }

    #[instrument(skip(self, summary))]
    async fn write_analytics_summary(&self, summary: &AnalyticsSummary) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.analytics()
            .replace_one(doc! { "_id": ANALYTICS_SUMMARY_ID }, summary, options)
            .await?;
        Ok(())
    }
}

fn high_cost_filter(basis: CostBasis, threshold: f64) -> Document {
    let mut filter = Document::new();
    filter.insert(basis.field_path(), doc! { "$gt": threshold });
    filter
}

fn condition_filter(pattern: &str) -> Document {
    doc! { "conditions.description": { "$regex": pattern, "$options": "i" } }
}

fn limit(n: usize) -> Document {
    doc! { "$limit": n as i64 }
}

fn display_name() -> Bson {
    Bson::from(doc! { "$concat": ["$demographics.name.first", " ", "$demographics.name.last"] })
}

fn organization_pipeline(n: usize) -> Vec<Document> {
    vec![
        doc! { "$unwind": "$encounters" },
        doc! { "$group": {
            "_id": { "$ifNull": [ORGANIZATION, UNKNOWN_LABEL] },
            "count": { "$sum": 1 },
        }},
        doc! { "$sort": { "count": -1, "_id": 1 } },
        limit(n),
    ]
}

fn condition_pipeline(n: usize) -> Vec<Document> {
    // Group on (patient, description) first so a repeated diagnosis counts once
    vec![
        doc! { "$unwind": "$conditions" },
        doc! { "$group": {
            "_id": { "patient": "$_id", "condition": "$conditions.description" },
        }},
        doc! { "$group": { "_id": "$_id.condition", "count": { "$sum": 1 } } },
        doc! { "$sort": { "count": -1, "_id": 1 } },
        limit(n),
    ]
}

fn histogram_pipeline(basis: CostBasis) -> Vec<Document> {
    vec![doc! { "$bucket": {
        "groupBy": { "$ifNull": [format!("${}", basis.field_path()), 0.0] },
        "boundaries": bucket_boundaries(),
        "default": OFF_SCALE,
        "output": { "count": { "$sum": 1 } },
    }}]
}

fn started_on_pipeline(day: NaiveDate) -> Vec<Document> {
    let prefix = format!("^{}", day.format("%Y-%m-%d"));
    vec![
        doc! { "$unwind": "$encounters" },
        doc! { "$match": { "encounters.date.start": { "$regex": prefix } } },
        doc! { "$count": "count" },
    ]
}

fn totals_pipeline() -> Vec<Document> {
    vec![doc! { "$group": {
        "_id": Bson::Null,
        "encounters": { "$sum": TOTAL_ENCOUNTERS },
        "expenses": { "$sum": TOTAL_EXPENSES },
    }}]
}

fn department_performance_pipeline(n: usize) -> Vec<Document> {
    vec![
        doc! { "$unwind": "$encounters" },
        doc! { "$group": {
            "_id": { "$ifNull": [ORGANIZATION, UNKNOWN_LABEL] },
            "total_encounters": { "$sum": 1 },
            "avg_claim_cost": { "$avg": CLAIM_COST },
            "total_revenue": { "$sum": CLAIM_COST },
            "patients": { "$addToSet": "$_id" },
        }},
        doc! { "$project": {
            "_id": 0,
            "department": "$_id",
            "total_encounters": 1,
            "avg_claim_cost": 1,
            "total_revenue": 1,
            "unique_patient_count": { "$size": "$patients" },
            "encounters_per_patient": { "$divide": ["$total_encounters", { "$size": "$patients" }] },
        }},
        doc! { "$sort": { "total_revenue": -1, "department": 1 } },
        limit(n),
    ]
}

fn monthly_trend_pipeline(months: usize) -> Vec<Document> {
    // Start dates are stored as ISO text, so year and month are its leading digits
    vec![
        doc! { "$unwind": "$encounters" },
        doc! { "$match": { "encounters.date.start": { "$type": "string" } } },
        doc! { "$project": {
            "year": { "$toInt": { "$substrBytes": ["$encounters.date.start", 0, 4] } },
            "month": { "$toInt": { "$substrBytes": ["$encounters.date.start", 5, 2] } },
            "cost": CLAIM_COST,
        }},
        doc! { "$group": {
            "_id": { "year": "$year", "month": "$month" },
            "encounter_count": { "$sum": 1 },
            "total_cost": { "$sum": "$cost" },
            "avg_cost": { "$avg": "$cost" },
        }},
        doc! { "$sort": { "_id.year": -1, "_id.month": -1 } },
        limit(months),
        doc! { "$sort": { "_id.year": 1, "_id.month": 1 } },
    ]
}

fn chronic_burden_pipeline(min_conditions: usize, n: usize) -> Vec<Document> {
    let matchers: Vec<Bson> = CHRONIC_CONDITIONS
        .iter()
        .map(|pattern| {
            Bson::from(doc! { "$regexMatch": { "input": "$$condition", "regex": *pattern, "options": "i" } })
        })
        .collect();
    vec![
        doc! { "$project": {
            "name": display_name(),
            "chronic_conditions": { "$size": { "$filter": {
                "input": "$conditions.description",
                "as": "condition",
                "cond": { "$or": matchers },
            }}},
            "total_encounters": TOTAL_ENCOUNTERS,
            "total_costs": TOTAL_EXPENSES,
        }},
        doc! { "$match": { "chronic_conditions": { "$gte": min_conditions as i64 } } },
        doc! { "$sort": { "chronic_conditions": -1, "total_costs": -1, "_id": 1 } },
        limit(n),
    ]
}

fn risk_pipeline(min_encounters: i64, n: usize) -> Vec<Document> {
    vec![
        doc! { "$match": { "clinical_summary.total_encounters": { "$gt": min_encounters } } },
        doc! { "$project": {
            "name": display_name(),
            "encounter_count": TOTAL_ENCOUNTERS,
            "condition_count": TOTAL_CONDITIONS,
            "total_costs": TOTAL_EXPENSES,
            "risk_score": { "$add": [
                { "$multiply": [TOTAL_ENCOUNTERS, RISK_ENCOUNTER_WEIGHT] },
                { "$multiply": [TOTAL_CONDITIONS, RISK_CONDITION_WEIGHT] },
                { "$divide": [TOTAL_EXPENSES, RISK_COST_DIVISOR] },
            ]},
        }},
        doc! { "$sort": { "risk_score": -1, "_id": 1 } },
        limit(n),
    ]
}

fn string_of(value: Option<&Bson>) -> Option<String> {
    match value {
        Some(Bson::String(s)) => Some(s.clone()),
        _ => None,
    }
}

// Aggregation sums come back as whichever numeric type the server chose
fn number_of(value: Option<&Bson>) -> f64 {
    match value {
        Some(Bson::Int32(n)) => f64::from(*n),
        Some(Bson::Int64(n)) => *n as f64,
        Some(Bson::Double(n)) => *n,
        _ => 0.0,
    }
}

fn count_of(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        Some(Bson::Double(n)) if n.is_finite() && *n > 0.0 => *n as u64,
        _ => 0,
    }
}
