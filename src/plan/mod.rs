//! Work partitioning
//!
//! The coordinator hands every worker rank one perturbation scalar. Rank 1 is
//! always the unperturbed baseline; later ranks walk a ladder whose magnitude
//! is `1 / (rank - 1)`, with the sign chosen by the configured [`Symmetry`].
//!
//! For four processes (coordinator plus ranks 1..=3) in symmetric mode the
//! ladder is `[0.0, 1.0, -1.0]`. The plan is computed once per run and never
//! changes afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sign pattern of the perturbation ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symmetry {
    /// Alternate signs: even ranks positive, odd ranks mirror the previous rank
    Symmetric,
    /// All perturbations positive
    Positive,
    /// All perturbations negative
    Negative,
}

impl Default for Symmetry {
    fn default() -> Self {
        Self::Symmetric
    }
}

impl fmt::Display for Symmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symmetry::Symmetric => write!(f, "symmetric"),
            Symmetry::Positive => write!(f, "positive"),
            Symmetry::Negative => write!(f, "negative"),
        }
    }
}

/// Perturbation handed to one worker rank
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkAssignment {
    /// Worker rank (1..world_size)
    pub rank: u32,
    /// Relative perturbation applied to the simulation input
    pub perturbation: f64,
}

impl WorkAssignment {
    /// Perturbation as a signed percentage label, e.g. `+100%` or `-50%`
    pub fn percent_label(&self) -> String {
        let percent = self.perturbation * 100.0;
        if percent < 0.0 {
            format!("{}%", percent)
        } else {
            format!("+{}%", percent)
        }
    }
}

/// Compute one perturbation per worker rank
///
/// `world_size` counts the coordinator, so the result has `world_size - 1`
/// entries and index `i` holds the value for rank `i + 1`. A world of one
/// process (or none) has no workers and yields an empty plan.
pub fn compute_assignments(world_size: usize, mode: Symmetry) -> Vec<f64> {
    if world_size <= 1 {
        return Vec::new();
    }

    let mut work = vec![0.0f64; world_size - 1];

    for rank in 2..world_size {
        let magnitude = 1.0 / (rank - 1) as f64;
        work[rank - 1] = match mode {
            Symmetry::Positive => magnitude,
            Symmetry::Negative => -magnitude,
            Symmetry::Symmetric => {
                if rank % 2 == 0 {
                    magnitude
                } else {
                    -work[rank - 2]
                }
            }
        };
    }

    work
}

/// Immutable per-run plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkPlan {
    pub symmetry: Symmetry,
    pub assignments: Vec<WorkAssignment>,
}

impl WorkPlan {
    /// Build the plan for `worker_count` workers (world size `worker_count + 1`)
    pub fn new(worker_count: usize, symmetry: Symmetry) -> Self {
        let assignments = compute_assignments(worker_count + 1, symmetry)
            .into_iter()
            .enumerate()
            .map(|(i, perturbation)| WorkAssignment {
                rank: (i + 1) as u32,
                perturbation,
            })
            .collect();

        Self {
            symmetry,
            assignments,
        }
    }

    /// Number of processes including the coordinator
    pub fn world_size(&self) -> usize {
        self.assignments.len() + 1
    }

    pub fn worker_count(&self) -> usize {
        self.assignments.len()
    }

    /// Assignment for a worker rank
    pub fn get(&self, rank: u32) -> Option<&WorkAssignment> {
        if rank == 0 {
            return None;
        }
        self.assignments.get(rank as usize - 1)
    }
}

impl fmt::Display for WorkPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Work plan ({}, {} worker(s)):", self.symmetry, self.worker_count())?;
        for a in &self.assignments {
            writeln!(f, "  rank {:>3}: {}", a.rank, a.percent_label())?;
        }
        Ok(())
    }
}
