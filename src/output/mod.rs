//! Run reports
//!
//! The coordinator collects one [`RankReport`] per worker rank into a
//! [`RunReport`]; the submodules render it as CSV reports, a JSON summary
//! and a console summary. `vtk` is used on the worker side.

pub mod csv;
pub mod json;
pub mod text;
pub mod vtk;

use crate::config::parameter::Statistic;
use crate::distributed::codec::ParameterResult;
use crate::plan::{Symmetry, WorkAssignment};
use crate::stats::similarity::SimilarityRecord;
use std::time::Duration;

/// What the coordinator got from one rank
#[derive(Debug, Clone, PartialEq)]
pub enum RankOutcome {
    /// Results decoded successfully
    Complete(Vec<ParameterResult>),
    /// Worker sent FATAL_ERROR
    Fatal(String),
    /// Stream was unusable (desync or transport failure)
    Desync(String),
}

impl RankOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, RankOutcome::Complete(_))
    }

    /// Failure description, if the rank did not complete
    pub fn failure(&self) -> Option<&str> {
        match self {
            RankOutcome::Complete(_) => None,
            RankOutcome::Fatal(message) | RankOutcome::Desync(message) => Some(message),
        }
    }
}

/// One row of the results report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub parameter: String,
    /// SUM, MEAN, VARIANCE, STDDEV, PEARSON; `None` is reported as NA
    pub values: [Option<f64>; 5],
}

impl ReportRow {
    fn from_result(result: &ParameterResult) -> Self {
        let mut values = [None; 5];
        for (slot, stat) in values.iter_mut().zip(Statistic::SCALARS) {
            *slot = result.get(stat);
        }
        Self {
            parameter: result.name.clone(),
            values,
        }
    }

    fn missing(parameter: &str) -> Self {
        Self {
            parameter: parameter.to_string(),
            values: [None; 5],
        }
    }
}

/// Outcome of one worker rank
#[derive(Debug, Clone, PartialEq)]
pub struct RankReport {
    pub assignment: WorkAssignment,
    pub outcome: RankOutcome,
}

impl RankReport {
    /// Report rows; a failed rank gets an all-NA row per configured parameter
    pub fn rows(&self, configured: &[String]) -> Vec<ReportRow> {
        match &self.outcome {
            RankOutcome::Complete(results) => results.iter().map(ReportRow::from_result).collect(),
            _ => configured.iter().map(|name| ReportRow::missing(name)).collect(),
        }
    }
}

/// Everything the coordinator learned in one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_name: String,
    pub symmetry: Symmetry,
    /// Configured parameter names, used for the rows of failed ranks
    pub parameter_names: Vec<String>,
    /// In ascending rank order
    pub ranks: Vec<RankReport>,
    /// `None` when no worker contributed a NORM grid
    pub similarity: Option<Vec<SimilarityRecord>>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.ranks.iter().filter(|r| r.outcome.is_complete()).count()
    }

    pub fn failed(&self) -> usize {
        self.ranks.len() - self.completed()
    }
}

/// Render a report value: shortest round-trip form, `NA` when absent or not finite
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => "NA".to_string(),
    }
}

/// Perturbation as a plain percentage, e.g. `100` or `-50`
pub fn percent(perturbation: f64) -> String {
    let p = perturbation * 100.0;
    // -0 prints as "-0"
    if p == 0.0 {
        "0".to_string()
    } else {
        p.to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::parameter::StatsMask;

    /// Two completed ranks and one fatal one, with a similarity section
    pub(crate) fn sample_report() -> RunReport {
        let mut porosity = ParameterResult::new(
            "POROSITY",
            StatsMask::from_stats(&[Statistic::Sum, Statistic::Mean, Statistic::Norm]),
        );
        porosity.set(Statistic::Sum, 12.0).unwrap();
        porosity.set(Statistic::Mean, 4.0).unwrap();
        porosity.set_grid(vec![2.0, 4.0, 6.0]).unwrap();

        let mut second = porosity.clone();
        second.set(Statistic::Sum, 13.5).unwrap();
        second.set(Statistic::Mean, f64::NAN).unwrap();

        RunReport {
            run_name: "baseline".to_string(),
            symmetry: Symmetry::Symmetric,
            parameter_names: vec!["POROSITY".to_string()],
            ranks: vec![
                RankReport {
                    assignment: WorkAssignment { rank: 1, perturbation: 0.0 },
                    outcome: RankOutcome::Complete(vec![porosity]),
                },
                RankReport {
                    assignment: WorkAssignment { rank: 2, perturbation: 1.0 },
                    outcome: RankOutcome::Complete(vec![second]),
                },
                RankReport {
                    assignment: WorkAssignment { rank: 3, perturbation: -1.0 },
                    outcome: RankOutcome::Fatal("simulator crashed".to_string()),
                },
            ],
            similarity: Some(vec![SimilarityRecord {
                parameter_name: "POROSITY".to_string(),
                rank_a: 1,
                rank_b: 2,
                norm: 0.0,
            }]),
            elapsed: Duration::from_millis(420),
        }
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(12.0)), "12");
        assert_eq!(format_value(Some(0.25)), "0.25");
        assert_eq!(format_value(Some(f64::NAN)), "NA");
        assert_eq!(format_value(Some(f64::INFINITY)), "NA");
        assert_eq!(format_value(None), "NA");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0.0), "0");
        assert_eq!(percent(-0.0), "0");
        assert_eq!(percent(1.0), "100");
        assert_eq!(percent(-0.5), "-50");
    }

    #[test]
    fn test_rows_for_failed_rank() {
        let report = sample_report();
        let rows = report.ranks[2].rows(&report.parameter_names);
        assert_eq!(rows, vec![ReportRow::missing("POROSITY")]);

        let rows = report.ranks[0].rows(&report.parameter_names);
        assert_eq!(rows[0].values, [Some(12.0), Some(4.0), None, None, None]);
    }

    #[test]
    fn test_counts() {
        let report = sample_report();
        assert_eq!(report.completed(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.ranks[2].outcome.failure(), Some("simulator crashed"));
    }
}
