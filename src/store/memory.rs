use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{CollectionCounts, DocumentStore, Totals};
use crate::error::{PipelineError, Result};
use crate::models::cost::{bracket_label, histogram_labels, CostBasis};
use crate::models::metrics::{
    display_name, mentions_any, risk_score, AnalyticsSummary, ChronicBurden, DepartmentPerformance, MonthlyEncounters,
    OperationalMetrics, RiskProfile, CHRONIC_CONDITIONS,
};
use crate::models::summary::PatientSummary;
use crate::models::{rank_tallies, Tally, UNKNOWN_LABEL};

/// In-process document store for pipeline tests. Clones share state.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    pub summaries: Arc<Mutex<Vec<PatientSummary>>>,
    pub metrics: Arc<Mutex<Option<OperationalMetrics>>>,
    pub analytics: Arc<Mutex<Option<AnalyticsSummary>>>,
    /// Natural keys whose insert is rejected, as a write conflict would be.
    pub reject_inserts: HashSet<String>,
    pub reject_metrics: bool,
    pub resets: Arc<Mutex<u32>>,
}

impl MemoryStore {
    pub fn with_summaries(summaries: Vec<PatientSummary>) -> Self {
        Self {
            summaries: Arc::new(Mutex::new(summaries)),
            ..Default::default()
        }
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.summaries.lock().unwrap().iter().map(|s| s.id.clone()).collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn reset_collections(&self) -> Result<()> {
        self.summaries.lock().unwrap().clear();
        *self.metrics.lock().unwrap() = None;
        *self.resets.lock().unwrap() += 1;
        Ok(())
    }

    async fn insert_summary(&self, summary: &PatientSummary) -> Result<()> {
        let mut summaries = self.summaries.lock().unwrap();
        if self.reject_inserts.contains(&summary.id) || summaries.iter().any(|s| s.id == summary.id) {
            return Err(PipelineError::record(&*summary.id, "duplicate key"));
        }
        summaries.push(summary.clone());
        Ok(())
    }

    async fn write_operational_metrics(&self, metrics: &OperationalMetrics) -> Result<()> {
        if self.reject_metrics {
            return Err(PipelineError::unavailable("document store", "metrics collection unavailable"));
        }
        *self.metrics.lock().unwrap() = Some(metrics.clone());
        Ok(())
    }

    async fn collection_counts(&self) -> Result<CollectionCounts> {
        Ok(CollectionCounts {
            patient_summaries: self.summaries.lock().unwrap().len() as u64,
            operational_metrics: self.metrics.lock().unwrap().iter().count() as u64,
        })
    }

    async fn count_patients(&self) -> Result<u64> {
        Ok(self.summaries.lock().unwrap().len() as u64)
    }

    async fn count_high_cost(&self, basis: CostBasis, threshold: f64) -> Result<u64> {
        let summaries = self.summaries.lock().unwrap();
        Ok(summaries.iter().filter(|s| s.cost(basis) > threshold).count() as u64)
    }

    async fn encounters_by_organization(&self, limit: usize) -> Result<Vec<Tally>> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for summary in self.summaries.lock().unwrap().iter() {
            for encounter in &summary.encounters {
                let organization = encounter
                    .providers
                    .organization
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
                *counts.entry(organization).or_default() += 1;
            }
        }
        Ok(rank_tallies(counts.into_iter().map(|(l, c)| Tally::new(l, c)).collect(), limit))
    }

    async fn patients_by_condition(&self, limit: usize) -> Result<Vec<Tally>> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for summary in self.summaries.lock().unwrap().iter() {
            let distinct: BTreeSet<&str> = summary.conditions.iter().map(|c| c.description.as_str()).collect();
            for description in distinct {
                *counts.entry(description.to_string()).or_default() += 1;
            }
        }
        Ok(rank_tallies(counts.into_iter().map(|(l, c)| Tally::new(l, c)).collect(), limit))
    }

    async fn cost_histogram(&self, basis: CostBasis) -> Result<Vec<Tally>> {
        let mut histogram: Vec<Tally> = histogram_labels().map(|label| Tally::new(label, 0)).collect();
        for summary in self.summaries.lock().unwrap().iter() {
            let label = bracket_label(summary.cost(basis));
            if let Some(slot) = histogram.iter_mut().find(|t| t.label == label) {
                slot.count += 1;
            }
        }
        Ok(histogram)
    }

    async fn encounters_started_on(&self, day: NaiveDate) -> Result<u64> {
        let prefix = day.format("%Y-%m-%d").to_string();
        let summaries = self.summaries.lock().unwrap();
        Ok(summaries
            .iter()
            .flat_map(|s| s.encounters.iter())
            .filter(|e| e.date.start.as_deref().is_some_and(|start| start.starts_with(&prefix)))
            .count() as u64)
    }

    async fn totals(&self) -> Result<Totals> {
        let summaries = self.summaries.lock().unwrap();
        Ok(Totals {
            encounters: summaries
                .iter()
                .map(|s| s.clinical_summary.total_encounters.max(0) as u64)
                .sum(),
            healthcare_expenses: summaries
                .iter()
                .map(|s| s.clinical_summary.healthcare_metrics.total_expenses)
                .sum(),
        })
    }

    async fn patients_with_condition(&self, pattern: &str) -> Result<u64> {
        let summaries = self.summaries.lock().unwrap();
        Ok(summaries
            .iter()
            .filter(|s| s.conditions.iter().any(|c| mentions_any(&c.description, &[pattern])))
            .count() as u64)
    }

    async fn department_performance(&self, limit: usize) -> Result<Vec<DepartmentPerformance>> {
        // organization -> (encounters, claim total, patients)
        let mut groups: BTreeMap<String, (i64, f64, BTreeSet<String>)> = BTreeMap::new();
        for summary in self.summaries.lock().unwrap().iter() {
            for encounter in &summary.encounters {
                let organization = encounter
                    .providers
                    .organization
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
                let group = groups.entry(organization).or_default();
                group.0 += 1;
                group.1 += encounter.financial.total_claim_cost;
                group.2.insert(summary.id.clone());
            }
        }
        let mut rows: Vec<DepartmentPerformance> = groups
            .into_iter()
            .map(|(department, (encounters, revenue, patients))| DepartmentPerformance {
                department,
                total_encounters: encounters,
                avg_claim_cost: revenue / encounters as f64,
                total_revenue: revenue,
                unique_patient_count: patients.len() as i64,
                encounters_per_patient: encounters as f64 / patients.len() as f64,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_revenue
                .total_cmp(&a.total_revenue)
                .then_with(|| a.department.cmp(&b.department))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn monthly_encounters(&self, months: usize) -> Result<Vec<MonthlyEncounters>> {
        let mut groups: BTreeMap<(i32, u32), (i64, f64)> = BTreeMap::new();
        for summary in self.summaries.lock().unwrap().iter() {
            for encounter in &summary.encounters {
                let Some(start) = encounter.date.start.as_deref() else {
                    continue;
                };
                let year = start.get(0..4).and_then(|y| y.parse().ok());
                let month = start.get(5..7).and_then(|m| m.parse().ok());
                if let (Some(year), Some(month)) = (year, month) {
                    let group = groups.entry((year, month)).or_default();
                    group.0 += 1;
                    group.1 += encounter.financial.total_claim_cost;
                }
            }
        }
        let skip = groups.len().saturating_sub(months);
        Ok(groups
            .into_iter()
            .skip(skip)
            .map(|((year, month), (count, total))| MonthlyEncounters {
                year,
                month,
                encounter_count: count,
                total_cost: total,
                avg_cost: total / count as f64,
            })
            .collect())
    }

    async fn chronic_burden(&self, min_conditions: usize, limit: usize) -> Result<Vec<ChronicBurden>> {
        let summaries = self.summaries.lock().unwrap();
        let mut rows: Vec<ChronicBurden> = summaries
            .iter()
            .map(|s| ChronicBurden {
                patient_id: s.id.clone(),
                name: display_name(s.demographics.name.first.as_deref(), s.demographics.name.last.as_deref()),
                chronic_conditions: s
                    .conditions
                    .iter()
                    .filter(|c| mentions_any(&c.description, &CHRONIC_CONDITIONS))
                    .count() as i64,
                total_encounters: s.clinical_summary.total_encounters,
                total_costs: s.clinical_summary.healthcare_metrics.total_expenses,
            })
            .filter(|row| row.chronic_conditions >= min_conditions as i64)
            .collect();
        rows.sort_by(|a, b| {
            b.chronic_conditions
                .cmp(&a.chronic_conditions)
                .then_with(|| b.total_costs.total_cmp(&a.total_costs))
                .then_with(|| a.patient_id.cmp(&b.patient_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn risk_profiles(&self, min_encounters: i64, limit: usize) -> Result<Vec<RiskProfile>> {
        let summaries = self.summaries.lock().unwrap();
        let mut rows: Vec<RiskProfile> = summaries
            .iter()
            .filter(|s| s.clinical_summary.total_encounters > min_encounters)
            .map(|s| {
                let clinical = &s.clinical_summary;
                let expenses = clinical.healthcare_metrics.total_expenses;
                RiskProfile {
                    patient_id: s.id.clone(),
                    name: display_name(s.demographics.name.first.as_deref(), s.demographics.name.last.as_deref()),
                    encounter_count: clinical.total_encounters,
                    condition_count: clinical.total_conditions,
                    total_costs: expenses,
                    risk_score: risk_score(clinical.total_encounters, clinical.total_conditions, expenses),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.risk_score
                .total_cmp(&a.risk_score)
                .then_with(|| a.patient_id.cmp(&b.patient_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn write_analytics_summary(&self, summary: &AnalyticsSummary) -> Result<()> {
        *self.analytics.lock().unwrap() = Some(summary.clone());
        Ok(())
    }
}
