//! Data models
//!
//! `source` holds rows as read from the relational store, `summary` and
//! `metrics` hold the documents written to the document store, and `cost`
//! holds the cost basis and bracket tables shared by the cache and analytics.

pub mod cost;
pub mod metrics;
pub mod source;
pub mod summary;

use serde::{Deserialize, Serialize};

/// Label used when a grouping key is null at the source.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// One row of a grouping aggregation: a label and how many items fell under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub label: String,
    pub count: u64,
}

impl Tally {
    pub fn new(label: impl Into<String>, count: u64) -> Self {
        Self {
            label: label.into(),
            count,
        }
    }
}

/// Sort descending by count, then ascending by label, and keep the first `limit`.
pub fn rank_tallies(mut tallies: Vec<Tally>, limit: usize) -> Vec<Tally> {
    tallies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    tallies.truncate(limit);
    tallies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_breaks_ties_by_label() {
        let ranked = rank_tallies(
            vec![
                Tally::new("Cardiology", 4),
                Tally::new("Ambulatory", 4),
                Tally::new("Emergency", 9),
                Tally::new("Oncology", 1),
            ],
            3,
        );
        let labels: Vec<_> = ranked.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["Emergency", "Ambulatory", "Cardiology"]);
    }
}
