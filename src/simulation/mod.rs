//! Simulation driver
//!
//! Prepares a private run directory per worker, perturbs the simulator input
//! according to the configured rules, and runs the simulator inside it.

pub mod rules;

use crate::config::{Config, RuleConfig};
use crate::plan::WorkAssignment;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Run directory name for an assignment, e.g. `Simulation_-1.000000-3`
pub fn run_dir_name(assignment: &WorkAssignment) -> String {
    format!("Simulation_{:.6}-{}", assignment.perturbation, assignment.rank)
}

/// Recursively copy `src` into `dst`, returning the number of files copied
pub fn copy_dir(src: &Path, dst: &Path) -> Result<u64> {
    fs::create_dir_all(dst).with_context(|| format!("Failed to create directory: {}", dst.display()))?;

    let mut copied = 0;
    let entries = fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read directory: {}", src.display()))?;
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copied += copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {} to {}", entry.path().display(), target.display()))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Apply every rule, grouped by target file in configuration order
///
/// The baseline (zero perturbation) leaves the input untouched.
pub fn perturb_inputs(run_dir: &Path, rules: &[RuleConfig], perturbation: f64) -> Result<usize> {
    if perturbation == 0.0 || rules.is_empty() {
        return Ok(0);
    }

    let mut files: Vec<&Path> = Vec::new();
    for rule in rules {
        if !files.contains(&rule.file.as_path()) {
            files.push(rule.file.as_path());
        }
    }

    let mut rewritten = 0;
    for file in files {
        let file_rules: Vec<&RuleConfig> = rules.iter().filter(|r| r.file == file).collect();
        rewritten += rules::apply_rules(&run_dir.join(file), &file_rules, perturbation)?;
    }

    Ok(rewritten)
}

/// Resolve the simulator executable relative to the run directory
fn resolve_exe(run_dir: &Path, exe: &str) -> PathBuf {
    let local = run_dir.join(exe);
    if exe.contains('/') || local.exists() {
        local
    } else {
        PathBuf::from(exe)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if path.exists() {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o555);
        fs::set_permissions(path, perms)
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Run the simulator inside `run_dir`
///
/// A non-zero exit status is logged, not treated as an error: the output
/// files are parsed regardless and their absence fails the run later.
pub fn run_simulator(run_dir: &Path, exe: &str) -> Result<()> {
    let exe_path = resolve_exe(run_dir, exe);
    make_executable(&exe_path)?;

    log::debug!("Running {} in {}", exe_path.display(), run_dir.display());
    let status = Command::new(&exe_path)
        .current_dir(run_dir)
        .status()
        .with_context(|| format!("Failed to launch simulator: {}", exe_path.display()))?;

    if !status.success() {
        log::warn!("Simulator {} exited with {}", exe_path.display(), status);
    }
    Ok(())
}

/// Prepare and run one worker's simulation, returning its run directory
///
/// With `run_sim = false` nothing is copied or executed and the run directory
/// is expected to hold the outputs of an earlier run.
pub fn prepare_run(config: &Config, assignment: &WorkAssignment) -> Result<PathBuf> {
    let run_dir = config.main.work_dir.join(run_dir_name(assignment));

    if !config.main.run_sim {
        return Ok(run_dir);
    }

    let data_dir = config
        .main
        .data_dir
        .as_ref()
        .context("run_sim requires data_dir")?;
    let exe = config.main.exe.as_deref().context("run_sim requires exe")?;

    let copied = copy_dir(data_dir, &run_dir)?;
    println!("✅ Copied {} file(s) into {}", copied, run_dir.display());

    let rewritten = perturb_inputs(&run_dir, &config.rules, assignment.perturbation)?;
    if rewritten > 0 {
        println!("✅ Perturbed {} input line(s) by {}", rewritten, assignment.percent_label());
    }

    run_simulator(&run_dir, exe)?;

    Ok(run_dir)
}

/// Output files of a run, inside its run directory
pub fn output_paths(config: &Config, run_dir: &Path) -> Vec<PathBuf> {
    config.main.outputs.iter().map(|o| run_dir.join(o)).collect()
}
