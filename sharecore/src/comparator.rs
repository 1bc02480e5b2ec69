//! Side-by-side project comparison.
//!
//! A pure computation over [`ProjectSnapshot`]s: no store access, no
//! clock. Each metric is min-max normalized across the compared set,
//! so a score only has meaning within one comparison. When every
//! project has the same value for a metric the normalization is
//! degenerate and every project scores 0.5 on it.

use crate::errors::{EngineError, EngineResult};
use crate::query::ProjectSnapshot;
use crate::types::ProjectId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Minimum number of projects in a comparison.
pub const MIN_COMPARED: usize = 2;
/// Maximum number of projects in a comparison.
pub const MAX_COMPARED: usize = 4;

/// The metrics a comparison scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// The funding goal.
    TotalValue,
    /// The fixed per-share price.
    PerSharePrice,
    /// Sold shares as a percentage of the pool.
    FundingProgress,
    /// Absolute shares sold.
    SharesSold,
}

impl Metric {
    /// All metrics, in presentation order.
    pub const ALL: [Self; 4] = [
        Self::TotalValue,
        Self::PerSharePrice,
        Self::FundingProgress,
        Self::SharesSold,
    ];

    #[allow(clippy::cast_precision_loss)]
    fn raw(self, snapshot: &ProjectSnapshot) -> f64 {
        match self {
            Self::TotalValue => snapshot.total_value().to_f64(),
            Self::PerSharePrice => snapshot.per_share_price().to_f64(),
            Self::FundingProgress => snapshot.funding_progress,
            Self::SharesSold => snapshot.shares_sold as f64,
        }
    }
}

/// One project's row in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    /// The compared project.
    pub project_id: ProjectId,
    /// Raw metric values, in [`Metric::ALL`] order.
    pub raw: [f64; 4],
    /// Normalized metric values in [0, 1], in [`Metric::ALL`] order.
    pub normalized: [f64; 4],
    /// Mean of the normalized metrics.
    pub normalized_score: f64,
}

/// The result of comparing a set of projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// One entry per compared project, in input order.
    pub entries: Vec<ComparisonEntry>,
}

/// Compares between two and four distinct project snapshots.
///
/// # Errors
///
/// Returns a validation error when the set is outside `2..=4` projects
/// or contains a duplicate project id.
pub fn compare(snapshots: &[ProjectSnapshot]) -> EngineResult<Comparison> {
    if !(MIN_COMPARED..=MAX_COMPARED).contains(&snapshots.len()) {
        return Err(EngineError::validation(
            "projects",
            format!(
                "comparison requires {MIN_COMPARED} to {MAX_COMPARED} projects, got {}",
                snapshots.len()
            ),
        ));
    }
    let mut seen = HashSet::new();
    for snapshot in snapshots {
        if !seen.insert(snapshot.project.id.clone()) {
            return Err(EngineError::validation(
                "projects",
                format!("duplicate project in comparison: {}", snapshot.project.id),
            ));
        }
    }

    let raw: Vec<[f64; 4]> = snapshots
        .iter()
        .map(|s| Metric::ALL.map(|m| m.raw(s)))
        .collect();

    let mut entries = Vec::with_capacity(snapshots.len());
    for (snapshot, values) in snapshots.iter().zip(&raw) {
        let mut normalized = [0.0; 4];
        for (i, value) in values.iter().enumerate() {
            let min = raw.iter().map(|r| r[i]).fold(f64::INFINITY, f64::min);
            let max = raw.iter().map(|r| r[i]).fold(f64::NEG_INFINITY, f64::max);
            normalized[i] = if (max - min).abs() < f64::EPSILON {
                0.5
            } else {
                (value - min) / (max - min)
            };
        }
        let normalized_score = normalized.iter().sum::<f64>() / normalized.len() as f64;
        entries.push(ComparisonEntry {
            project_id: snapshot.project.id.clone(),
            raw: *values,
            normalized,
            normalized_score,
        });
    }

    Ok(Comparison { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Category, NewProject, Project};
    use crate::types::{Money, ProjectId, ShareCount, Timestamp, UserId};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn snapshot(id: &str, total_value: u64, total_shares: u64, sold: u64) -> ProjectSnapshot {
        let project = Project::create(
            ProjectId::try_new(id).unwrap(),
            UserId::try_new("dev-1").unwrap(),
            NewProject {
                title: format!("Project {id}"),
                description: "A sufficiently long description for submission guard purposes."
                    .to_string(),
                short_description: "summary".to_string(),
                category: Category::Technology,
                total_value: Money::new(Decimal::from(total_value)).unwrap(),
                total_shares: ShareCount::try_new(total_shares).unwrap(),
                duration_days: 30,
                images: vec!["https://img.example/a.jpg".to_string()],
                thumbnail_url: None,
                has_3d_model: false,
                model_3d_url: None,
                is_3d_public: false,
                has_restricted_fields: false,
                restricted: None,
            },
            Timestamp::now(),
        )
        .unwrap();
        ProjectSnapshot::compose(&project, sold, 0, None, Timestamp::now())
    }

    #[test]
    fn rejects_single_project() {
        let err = compare(&[snapshot("PRJ-A", 1000, 100, 0)]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation {
                field: "projects",
                ..
            }
        ));
    }

    #[test]
    fn rejects_five_projects() {
        let snapshots: Vec<_> = (0..5)
            .map(|i| snapshot(&format!("PRJ-{i}"), 1000 + i, 100, 0))
            .collect();
        assert!(compare(&snapshots).is_err());
    }

    #[test]
    fn rejects_duplicate_projects() {
        let err = compare(&[
            snapshot("PRJ-A", 1000, 100, 0),
            snapshot("PRJ-A", 2000, 100, 0),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation {
                field: "projects",
                ..
            }
        ));
    }

    #[test]
    fn extremes_normalize_to_zero_and_one() {
        let result = compare(&[
            snapshot("PRJ-A", 1000, 100, 10),
            snapshot("PRJ-B", 3000, 100, 90),
        ])
        .unwrap();
        let total_value = 0;
        assert!((result.entries[0].normalized[total_value] - 0.0).abs() < f64::EPSILON);
        assert!((result.entries[1].normalized[total_value] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn identical_metric_scores_half() {
        let result = compare(&[
            snapshot("PRJ-A", 2000, 100, 50),
            snapshot("PRJ-B", 2000, 200, 50),
        ])
        .unwrap();
        // Same funding goal on both sides, so the metric is degenerate.
        assert!((result.entries[0].normalized[0] - 0.5).abs() < f64::EPSILON);
        assert!((result.entries[1].normalized[0] - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn score_is_mean_of_normalized_metrics() {
        let result = compare(&[
            snapshot("PRJ-A", 1000, 100, 10),
            snapshot("PRJ-B", 3000, 100, 90),
        ])
        .unwrap();
        for entry in &result.entries {
            let mean = entry.normalized.iter().sum::<f64>() / 4.0;
            assert!((entry.normalized_score - mean).abs() < 1e-12);
        }
    }

    proptest! {
        #[test]
        fn normalized_values_stay_in_unit_interval(
            values in proptest::collection::vec((1_u64..1_000_000, 1_u64..10_000), 2..=4),
        ) {
            let snapshots: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, (value, shares))| {
                    let sold = shares / 2;
                    snapshot(&format!("PRJ-{i}"), *value, *shares, sold)
                })
                .collect();
            let result = compare(&snapshots).unwrap();
            for entry in &result.entries {
                for v in entry.normalized {
                    prop_assert!((0.0..=1.0).contains(&v));
                }
                prop_assert!((0.0..=1.0).contains(&entry.normalized_score));
            }
        }

        #[test]
        fn comparison_is_order_independent(
            values in proptest::collection::vec((1_u64..1_000_000, 1_u64..10_000), 2..=4),
        ) {
            let snapshots: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, (value, shares))| {
                    snapshot(&format!("PRJ-{i}"), *value, *shares, shares / 4)
                })
                .collect();
            let forward = compare(&snapshots).unwrap();
            let mut reversed_input = snapshots.clone();
            reversed_input.reverse();
            let backward = compare(&reversed_input).unwrap();

            for entry in &forward.entries {
                let mirrored = backward
                    .entries
                    .iter()
                    .find(|e| e.project_id == entry.project_id)
                    .unwrap();
                prop_assert!((entry.normalized_score - mirrored.normalized_score).abs() < 1e-12);
            }
        }
    }
}
