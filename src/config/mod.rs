//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//!
//! A run is described by one [`Config`]: the `[main]` block (what to simulate
//! and where), optional `[graph]` export settings, the `[[rules]]` that
//! perturb the simulator input, and the `[[parameters]]` to analyze.

pub mod cli;
pub mod parameter;
pub mod toml;
pub mod validator;

use crate::plan::Symmetry;
use parameter::{ParameterSpec, Statistic, StatsMask};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub main: MainConfig,
    /// Connectivity graph export (worker side)
    #[serde(default)]
    pub graph: Option<GraphConfig>,
    /// Input perturbation rules
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// Parameters to analyze
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// `[main]` block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainConfig {
    /// Run name, used in report file names
    pub run_name: String,
    /// Simulator executable (resolved inside the run directory)
    #[serde(default)]
    pub exe: Option<String>,
    /// Template directory copied for every worker
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Simulator family (informational)
    #[serde(default = "default_simulator")]
    pub simulator: String,
    /// Output files parsed after the simulation finishes
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
    /// Copy, perturb and run the simulator before analysis
    #[serde(default = "default_true")]
    pub run_sim: bool,
    /// Print every parsed key on the worker
    #[serde(default)]
    pub list_keys: bool,
    /// Perturbation ladder shape
    #[serde(default)]
    pub symmetry: Symmetry,
    /// Parent directory of the per-worker run directories
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_simulator() -> String {
    "utchem".to_string()
}

fn default_true() -> bool {
    true
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

/// `[graph]` block: export cells whose value lies in `[lower, upper]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphConfig {
    pub key: String,
    pub lower: f64,
    pub upper: f64,
}

/// One `[[rules]]` entry: rewrite lines `start..=end` of `file`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleConfig {
    /// Input file, relative to the run directory
    pub file: PathBuf,
    /// First line (1-based, inclusive)
    pub start: usize,
    /// Last line (1-based, inclusive)
    pub end: usize,
    /// Only lines with `line % modulo == mval` are touched
    #[serde(default = "default_modulo")]
    pub modulo: usize,
    #[serde(default)]
    pub mval: usize,
    /// scanf-style input format, e.g. `"%f %d"`
    pub format: String,
    /// printf-style output format, e.g. `"%10.4f %5d"`
    pub outformat: String,
    /// Scaling of the perturbation, in percent
    pub transperc: f64,
}

fn default_modulo() -> usize {
    1
}

/// One `[[parameters]]` entry as written in the file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParameterConfig {
    pub name: String,
    #[serde(default)]
    pub sum: bool,
    #[serde(default)]
    pub mean: bool,
    #[serde(default)]
    pub variance: bool,
    #[serde(default)]
    pub stddev: bool,
    /// Correlation partner; setting it requests PEARSON
    #[serde(default)]
    pub pearson: Option<String>,
    #[serde(default)]
    pub norm: bool,
    /// Expand to every parsed key starting with `name`
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub sample_size: usize,
}

impl ParameterConfig {
    /// Statistics requested by this entry
    pub fn mask(&self) -> StatsMask {
        let mut mask = StatsMask::empty();
        let flags = [
            (self.sum, Statistic::Sum),
            (self.mean, Statistic::Mean),
            (self.variance, Statistic::Variance),
            (self.stddev, Statistic::StdDev),
            (self.pearson.is_some(), Statistic::Pearson),
            (self.norm, Statistic::Norm),
        ];
        for (enabled, stat) in flags {
            if enabled {
                mask.insert(stat);
            }
        }
        mask
    }

    pub fn to_spec(&self) -> ParameterSpec {
        ParameterSpec {
            name: self.name.clone(),
            stats_mask: self.mask(),
            correlation_partner: self.pearson.clone(),
            sample_size: self.sample_size,
            expand_prefix: self.all,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving the CSV reports
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// JSON run summary path
    #[serde(default)]
    pub json_output: Option<PathBuf>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            json_output: None,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
    /// Validate and print the plan without contacting workers
    #[serde(default)]
    pub dry_run: bool,
}

impl Config {
    /// Configured parameters as analysis specs, in file order
    pub fn parameter_specs(&self) -> Vec<ParameterSpec> {
        self.parameters.iter().map(ParameterConfig::to_spec).collect()
    }

    /// Results report file name
    pub fn results_path(&self) -> PathBuf {
        self.output.dir.join(format!("results-{}.csv", self.main.run_name))
    }

    /// Similarity report file name
    pub fn similarity_path(&self) -> PathBuf {
        self.output.dir.join(format!("similarity-{}.csv", self.main.run_name))
    }
}

// Display trait implementations

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(f, "  Run: {}", self.main)?;
        writeln!(f, "  Rules: {} rule(s)", self.rules.len())?;
        writeln!(f, "  Parameters: {}", self.parameters.len())?;
        for param in &self.parameters {
            writeln!(f, "    {} [{}]", param.name, param.mask())?;
        }
        if let Some(graph) = &self.graph {
            writeln!(f, "  Graph: {} in [{}, {}]", graph.key, graph.lower, graph.upper)?;
        }
        writeln!(f, "  Output: {}", self.output.dir.display())?;
        Ok(())
    }
}

impl fmt::Display for MainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (simulator={}, symmetry={}, run_sim={})",
            self.run_name, self.simulator, self.symmetry, self.run_sim
        )
    }
}
