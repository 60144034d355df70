//! JSON run summary
//!
//! Machine-readable counterpart of the CSV reports. Non-finite statistics
//! serialize as `null`.

use super::{RankOutcome, RunReport};
use crate::config::parameter::Statistic;
use crate::plan::Symmetry;
use crate::stats::similarity::SimilarityRecord;
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSummary {
    pub run_name: String,
    pub generated_at: DateTime<Utc>,
    pub symmetry: Symmetry,
    pub runtime_secs: f64,
    pub ranks: Vec<JsonRank>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub similarity: Vec<JsonSimilarity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRank {
    pub rank: u32,
    pub perturbation: f64,
    /// "complete", "fatal" or "desync"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub parameters: Vec<JsonParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonParameter {
    pub name: String,
    pub sum: Option<f64>,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub stddev: Option<f64>,
    pub pearson: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSimilarity {
    pub parameter: String,
    pub rank_a: u32,
    pub rank_b: u32,
    pub norm: Option<f64>,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl From<&SimilarityRecord> for JsonSimilarity {
    fn from(record: &SimilarityRecord) -> Self {
        Self {
            parameter: record.parameter_name.clone(),
            rank_a: record.rank_a,
            rank_b: record.rank_b,
            norm: finite(Some(record.norm)),
        }
    }
}

impl JsonSummary {
    pub fn from_report(report: &RunReport) -> Self {
        let ranks = report
            .ranks
            .iter()
            .map(|rank| {
                let status = match rank.outcome {
                    RankOutcome::Complete(_) => "complete",
                    RankOutcome::Fatal(_) => "fatal",
                    RankOutcome::Desync(_) => "desync",
                };
                let parameters = match &rank.outcome {
                    RankOutcome::Complete(results) => results
                        .iter()
                        .map(|r| JsonParameter {
                            name: r.name.clone(),
                            sum: finite(r.get(Statistic::Sum)),
                            mean: finite(r.get(Statistic::Mean)),
                            variance: finite(r.get(Statistic::Variance)),
                            stddev: finite(r.get(Statistic::StdDev)),
                            pearson: finite(r.get(Statistic::Pearson)),
                        })
                        .collect(),
                    _ => Vec::new(),
                };

                JsonRank {
                    rank: rank.assignment.rank,
                    perturbation: rank.assignment.perturbation,
                    status: status.to_string(),
                    error: rank.outcome.failure().map(str::to_string),
                    parameters,
                }
            })
            .collect();

        Self {
            run_name: report.run_name.clone(),
            generated_at: Utc::now(),
            symmetry: report.symmetry,
            runtime_secs: report.elapsed.as_secs_f64(),
            ranks,
            similarity: report
                .similarity
                .iter()
                .flatten()
                .map(JsonSimilarity::from)
                .collect(),
        }
    }
}

/// Write the JSON summary to `path`
pub fn write_json_summary(path: &Path, report: &RunReport) -> Result<()> {
    let summary = JsonSummary::from_report(report);
    let file = File::create(path)
        .with_context(|| format!("Failed to create JSON output: {}", path.display()))?;
    serde_json::to_writer_pretty(file, &summary).context("Failed to serialize JSON summary")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::sample_report;

    #[test]
    fn test_summary_from_report() {
        let summary = JsonSummary::from_report(&sample_report());

        assert_eq!(summary.run_name, "baseline");
        assert_eq!(summary.ranks.len(), 3);
        assert_eq!(summary.ranks[0].status, "complete");
        assert_eq!(summary.ranks[0].parameters[0].sum, Some(12.0));
        // NaN mean becomes null
        assert_eq!(summary.ranks[1].parameters[0].mean, None);
        assert_eq!(summary.ranks[2].status, "fatal");
        assert_eq!(summary.ranks[2].error.as_deref(), Some("simulator crashed"));
        assert_eq!(summary.similarity.len(), 1);
    }

    #[test]
    fn test_write_json_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        write_json_summary(&path, &sample_report()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["run_name"], "baseline");
        assert_eq!(value["symmetry"], "symmetric");
        assert_eq!(value["ranks"][1]["perturbation"], 1.0);
        assert!(value["ranks"][1]["parameters"][0]["mean"].is_null());
        assert!(value["generated_at"].is_string());
    }
}
