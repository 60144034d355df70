//! CSV reports
//!
//! Two files per run:
//!
//! - results report: one block per worker rank, headed by its perturbation
//!   and rank id, then one row per parameter, then a trailing `Runtime:` row
//! - similarity report: rank to perturbation mapping, then one row per
//!   compared grid pair (only written when NORM grids were collected)

use super::{format_value, percent, RunReport};
use crate::config::parameter::Statistic;
use crate::Result;
use anyhow::Context;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

fn quoted(label: &str) -> String {
    if label.contains(' ') || label.contains('.') {
        format!("\"{}\"", label)
    } else {
        label.to_string()
    }
}

/// Render the per-rank results report
pub fn render_results_report(report: &RunReport) -> String {
    let mut out = String::new();

    let header: Vec<String> = Statistic::SCALARS.iter().map(|s| quoted(s.label())).collect();

    for rank in &report.ranks {
        let _ = writeln!(
            out,
            "Varied Run,{},id,{}",
            rank.assignment.percent_label(),
            rank.assignment.rank
        );
        let _ = writeln!(out, "Parameter,{}", header.join(","));

        for row in rank.rows(&report.parameter_names) {
            let values: Vec<String> = row.values.iter().map(|v| format_value(*v)).collect();
            let _ = writeln!(out, "{},{}", row.parameter, values.join(","));
        }

        out.push_str("\n\n");
    }

    let _ = writeln!(out, "Runtime:,{:.2}s", report.elapsed.as_secs_f64());
    out
}

/// Render the similarity report, if any grids were compared
pub fn render_similarity_report(report: &RunReport) -> Option<String> {
    let records = report.similarity.as_ref()?;
    let mut out = String::new();

    out.push_str("Id,\"Perc Change\"\n");
    for rank in &report.ranks {
        let _ = writeln!(out, "{},{}%", rank.assignment.rank, percent(rank.assignment.perturbation));
    }

    out.push_str("\nParameter,Id1,Id2,Norm\n");
    for record in records {
        let _ = writeln!(
            out,
            "{},{},{},{}",
            record.parameter_name,
            record.rank_a,
            record.rank_b,
            format_value(Some(record.norm))
        );
    }

    Some(out)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    fs::write(path, contents).with_context(|| format!("Failed to write report: {}", path.display()))
}

/// Write the results report to `path`
pub fn write_results_report(path: &Path, report: &RunReport) -> Result<()> {
    write_file(path, &render_results_report(report))
}

/// Write the similarity report to `path`; returns false when there is nothing to write
pub fn write_similarity_report(path: &Path, report: &RunReport) -> Result<bool> {
    match render_similarity_report(report) {
        Some(contents) => {
            write_file(path, &contents)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::sample_report;

    #[test]
    fn test_results_report_layout() {
        let text = render_results_report(&sample_report());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Varied Run,+0%,id,1");
        assert_eq!(lines[1], "Parameter,Sum,Mean,Variance,\"Std. Dev.\",Pearson");
        assert_eq!(lines[2], "POROSITY,12,4,NA,NA,NA");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "Varied Run,+100%,id,2");
        assert_eq!(lines[7], "POROSITY,13.5,NA,NA,NA,NA");
        assert_eq!(lines[10], "Varied Run,-100%,id,3");
        assert_eq!(lines[12], "POROSITY,NA,NA,NA,NA,NA");
        assert_eq!(lines.last().copied(), Some("Runtime:,0.42s"));
    }

    #[test]
    fn test_similarity_report_layout() {
        let text = render_similarity_report(&sample_report()).unwrap();
        assert_eq!(
            text,
            "Id,\"Perc Change\"\n1,0%\n2,100%\n3,-100%\n\nParameter,Id1,Id2,Norm\nPOROSITY,1,2,0\n"
        );
    }

    #[test]
    fn test_no_similarity_without_grids() {
        let mut report = sample_report();
        report.similarity = None;
        assert!(render_similarity_report(&report).is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("similarity-baseline.csv");
        assert!(!write_similarity_report(&path, &report).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("out").join("results-baseline.csv");
        let similarity = dir.path().join("out").join("similarity-baseline.csv");
        let report = sample_report();

        write_results_report(&results, &report).unwrap();
        assert!(write_similarity_report(&similarity, &report).unwrap());

        let written = fs::read_to_string(&results).unwrap();
        assert!(written.starts_with("Varied Run,+0%,id,1\n"));
        assert!(fs::read_to_string(&similarity).unwrap().contains("POROSITY,1,2,0"));
    }
}
