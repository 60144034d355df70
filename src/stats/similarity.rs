//! Cross-worker grid similarity
//!
//! Every worker that analyzed a NORM parameter contributes its full grid.
//! Once all ranks have reported, each pair of grids sharing a parameter name
//! is compared with the Euclidean norm. A contribution is consumed the first
//! time it leads a comparison, so every unordered pair is reported once and
//! no grid is compared with itself.

use super::{compute_norm, StatsError};
use serde::{Deserialize, Serialize};

/// Full grid of one parameter from one worker
#[derive(Debug, Clone, PartialEq)]
pub struct GridContribution {
    pub parameter_name: String,
    pub origin_rank: u32,
    pub values: Vec<f64>,
}

/// Distance between two workers' grids for one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRecord {
    pub parameter_name: String,
    pub rank_a: u32,
    pub rank_b: u32,
    /// NaN when the grids have different sizes
    pub norm: f64,
}

/// Collects grid contributions during aggregation
#[derive(Debug, Default)]
pub struct SimilarityEngine {
    contributions: Vec<GridContribution>,
}

impl SimilarityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, contribution: GridContribution) {
        self.contributions.push(contribution);
    }

    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    /// Compare all same-named pairs and release the grids
    pub fn compute(self) -> Vec<SimilarityRecord> {
        compute_similarity(&self.contributions)
    }
}

/// Pairwise norms between contributions sharing a parameter name
///
/// Records come out ordered by the position of the leading contribution,
/// then by the position of its partner.
pub fn compute_similarity(contributions: &[GridContribution]) -> Vec<SimilarityRecord> {
    let mut active = vec![true; contributions.len()];
    let mut records = Vec::new();

    for (i, c1) in contributions.iter().enumerate() {
        if !active[i] {
            continue;
        }
        active[i] = false;

        for (j, c2) in contributions.iter().enumerate() {
            if !active[j] || c2.parameter_name != c1.parameter_name {
                continue;
            }

            let norm = match compute_norm(&c1.values, &c2.values) {
                Ok(norm) => norm,
                Err(StatsError::DimensionMismatch { left, right }) => {
                    log::warn!(
                        "Cannot compare {} between rank {} ({} cells) and rank {} ({} cells)",
                        c1.parameter_name,
                        c1.origin_rank,
                        left,
                        c2.origin_rank,
                        right
                    );
                    f64::NAN
                }
                Err(e) => {
                    log::warn!("Similarity for {} failed: {}", c1.parameter_name, e);
                    f64::NAN
                }
            };

            records.push(SimilarityRecord {
                parameter_name: c1.parameter_name.clone(),
                rank_a: c1.origin_rank,
                rank_b: c2.origin_rank,
                norm,
            });
        }
    }

    records
}
