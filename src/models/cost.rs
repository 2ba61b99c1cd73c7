//! Cost basis and cost brackets

use serde::{Deserialize, Serialize};

/// Which lifetime cost figure a threshold or histogram is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostBasis {
    /// `healthcare_expenses` as stated on the patient row.
    Stated,
    /// Sum of the patient's encounter claim costs.
    Calculated,
}

impl CostBasis {
    /// Dotted path of the figure inside a Patient Summary Document.
    pub fn field_path(self) -> &'static str {
        match self {
            CostBasis::Stated => "clinical_summary.healthcare_metrics.total_expenses",
            CostBasis::Calculated => "clinical_summary.healthcare_metrics.calculated_costs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBracket {
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
}

impl CostBracket {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }
}

/// Half-open, ascending, non-overlapping brackets covering `[0, 5_000_000)`.
pub const COST_BRACKETS: [CostBracket; 5] = [
    CostBracket { label: "low", min: 0.0, max: 10_000.0 },
    CostBracket { label: "medium", min: 10_000.0, max: 50_000.0 },
    CostBracket { label: "high", min: 50_000.0, max: 100_000.0 },
    CostBracket { label: "very_high", min: 100_000.0, max: 1_000_000.0 },
    CostBracket { label: "extreme", min: 1_000_000.0, max: 5_000_000.0 },
];

/// Counts values outside every bracket so a histogram always sums to the population.
pub const OFF_SCALE: &str = "off_scale";

pub fn bracket_label(value: f64) -> &'static str {
    COST_BRACKETS
        .iter()
        .find(|bracket| bracket.contains(value))
        .map(|bracket| bracket.label)
        .unwrap_or(OFF_SCALE)
}

/// Lower bound of every bracket followed by the upper bound of the last one.
pub fn bucket_boundaries() -> Vec<f64> {
    let mut boundaries: Vec<f64> = COST_BRACKETS.iter().map(|b| b.min).collect();
    boundaries.push(COST_BRACKETS[COST_BRACKETS.len() - 1].max);
    boundaries
}

/// Label of the bracket that starts at `lower_bound`.
pub fn label_for_lower_bound(lower_bound: f64) -> Option<&'static str> {
    COST_BRACKETS
        .iter()
        .find(|bracket| bracket.min == lower_bound)
        .map(|bracket| bracket.label)
}

/// Every histogram label in display order, `off_scale` last.
pub fn histogram_labels() -> impl Iterator<Item = &'static str> {
    COST_BRACKETS
        .iter()
        .map(|bracket| bracket.label)
        .chain(std::iter::once(OFF_SCALE))
}
