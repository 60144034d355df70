//! paramsweep - distributed parameter-sensitivity sweeps
//!
//! A coordinator hands each worker rank one perturbation of a simulation
//! input. Every worker perturbs its copy of the input, runs the simulator,
//! computes statistics over the named output series and reports them back.
//! The coordinator writes a per-rank results report and compares the full
//! output grids of different ranks.
//!
//! # Architecture
//!
//! - **Work plan**: deterministic perturbation ladder per rank
//! - **Result codec**: ordered, bitmask-gated result fields over framed TCP
//! - **Statistics**: sum, mean, variance, standard deviation, Pearson, norm
//! - **Similarity**: pairwise grid norms across ranks
//! - **Simulation driver**: run directories, input rewrite rules, simulator launch

pub mod config;
pub mod distributed;
pub mod output;
pub mod plan;
pub mod simulation;
pub mod source;
pub mod stats;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use plan::{Symmetry, WorkAssignment, WorkPlan};

/// Result type used throughout paramsweep
pub type Result<T> = anyhow::Result<T>;
