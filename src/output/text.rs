//! Human-readable console summary

use super::{format_value, RankOutcome, RunReport};
use crate::config::parameter::Statistic;
use std::fmt::Write as _;

/// Render the run summary shown at the end of a coordinator run
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let rule = "═══════════════════════════════════════════════════════════";

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "                 SENSITIVITY RESULTS: {}", report.run_name);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out);
    let _ = writeln!(out, "Elapsed Time: {:.3}s", report.elapsed.as_secs_f64());
    let _ = writeln!(
        out,
        "Ranks: {} complete, {} failed ({})",
        report.completed(),
        report.failed(),
        report.symmetry
    );

    for rank in &report.ranks {
        let _ = writeln!(out);
        let status = match &rank.outcome {
            RankOutcome::Complete(_) => "ok".to_string(),
            RankOutcome::Fatal(message) => format!("FATAL: {}", message),
            RankOutcome::Desync(message) => format!("DESYNC: {}", message),
        };
        let _ = writeln!(
            out,
            "Rank {} ({}): {}",
            rank.assignment.rank,
            rank.assignment.percent_label(),
            status
        );

        for row in rank.rows(&report.parameter_names) {
            let cells: Vec<String> = Statistic::SCALARS
                .iter()
                .zip(row.values.iter())
                .filter(|(_, v)| v.is_some())
                .map(|(stat, v)| format!("{}={}", stat.label(), format_value(*v)))
                .collect();
            if cells.is_empty() {
                let _ = writeln!(out, "  {}: NA", row.parameter);
            } else {
                let _ = writeln!(out, "  {}: {}", row.parameter, cells.join(", "));
            }
        }
    }

    if let Some(records) = &report.similarity {
        let _ = writeln!(out);
        let _ = writeln!(out, "Similarity ({} pair(s)):", records.len());
        for record in records {
            let _ = writeln!(
                out,
                "  {} rank {} vs {}: {}",
                record.parameter_name,
                record.rank_a,
                record.rank_b,
                format_value(Some(record.norm))
            );
        }
    }

    out
}

/// Print the run summary to stdout
pub fn print_summary(report: &RunReport) {
    print!("{}", render_summary(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::sample_report;

    #[test]
    fn test_render_summary() {
        let text = render_summary(&sample_report());

        assert!(text.contains("SENSITIVITY RESULTS: baseline"));
        assert!(text.contains("Ranks: 2 complete, 1 failed (symmetric)"));
        assert!(text.contains("Rank 1 (+0%): ok"));
        assert!(text.contains("  POROSITY: Sum=12, Mean=4"));
        assert!(text.contains("Rank 3 (-100%): FATAL: simulator crashed"));
        assert!(text.contains("  POROSITY: NA"));
        assert!(text.contains("POROSITY rank 1 vs 2: 0"));
    }
}
