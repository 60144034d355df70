//! CLI argument parsing using clap

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Standalone mode (default) - coordinator plus local worker processes
    Standalone,
    /// Coordinator mode - drive workers listed in --host-list / --clients-file
    Coordinator,
    /// Worker mode - wait for a coordinator, simulate, analyze, report
    Worker,
}

/// Perturbation ladder shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SymmetryMode {
    Symmetric,
    Positive,
    Negative,
}

/// paramsweep - distributed parameter-sensitivity sweeps
#[derive(Parser, Debug)]
#[command(name = "paramsweep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: standalone, coordinator, or worker
    #[arg(long, value_enum, default_value = "standalone")]
    pub mode: ExecutionMode,

    /// Run configuration file (TOML)
    #[arg(short = 'c', long, env = "PARAMSWEEP_CONFIG")]
    pub config: PathBuf,

    /// Number of local worker processes (standalone mode only)
    #[arg(short = 'w', long, default_value = "2")]
    pub workers: usize,

    /// Comma-separated list of worker addresses for coordinator mode (e.g., "10.0.1.10:9999,10.0.1.11:9999")
    #[arg(long)]
    pub host_list: Option<String>,

    /// File containing list of worker addresses (one per line, for coordinator mode)
    #[arg(long)]
    pub clients_file: Option<PathBuf>,

    /// Port to connect to on worker nodes when an address has none
    #[arg(long, default_value = "9999")]
    pub worker_port: u16,

    /// Port for the worker to listen on (worker mode only)
    #[arg(long, default_value = "9999")]
    pub listen_port: u16,

    /// Exit after serving a single coordinator session (worker mode only)
    #[arg(long)]
    pub once: bool,

    /// Override [main].run_name
    #[arg(long)]
    pub run_name: Option<String>,

    /// Override [main].symmetry
    #[arg(long, value_enum)]
    pub symmetry: Option<SymmetryMode>,

    /// Override [output].dir
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Write a JSON run summary to this path
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Validate configuration and print the work plan without running
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.mode {
            ExecutionMode::Standalone => {
                if self.workers == 0 {
                    anyhow::bail!("--workers must be at least 1");
                }
            }
            ExecutionMode::Coordinator => {
                if self.host_list.is_none() && self.clients_file.is_none() {
                    anyhow::bail!("Coordinator mode requires --host-list or --clients-file");
                }
                if self.host_list.is_some() && self.clients_file.is_some() {
                    anyhow::bail!("--host-list and --clients-file are mutually exclusive");
                }
            }
            ExecutionMode::Worker => {
                if self.listen_port == 0 {
                    anyhow::bail!("--listen-port must be non-zero");
                }
            }
        }

        Ok(())
    }

    /// Worker addresses in rank order (first address is rank 1)
    pub fn node_addresses(&self) -> anyhow::Result<Vec<String>> {
        let addresses: Vec<String> = if let Some(ref host_list) = self.host_list {
            host_list
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(|addr| with_default_port(addr, self.worker_port))
                .collect()
        } else if let Some(ref clients_file) = self.clients_file {
            let content = std::fs::read_to_string(clients_file)
                .with_context(|| format!("Failed to read clients file: {}", clients_file.display()))?;

            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(|addr| with_default_port(addr, self.worker_port))
                .collect()
        } else {
            anyhow::bail!("Coordinator mode requires --host-list or --clients-file");
        };

        if addresses.is_empty() {
            anyhow::bail!("No worker addresses given");
        }

        Ok(addresses)
    }
}

fn with_default_port(addr: &str, port: u16) -> String {
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["paramsweep", "--config", "run.toml"]);
        assert_eq!(cli.mode, ExecutionMode::Standalone);
        assert_eq!(cli.workers, 2);
        assert_eq!(cli.listen_port, 9999);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_coordinator_requires_hosts() {
        let cli = parse(&["paramsweep", "--mode", "coordinator", "--config", "run.toml"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_host_list_default_port() {
        let cli = parse(&[
            "paramsweep",
            "--mode",
            "coordinator",
            "--config",
            "run.toml",
            "--host-list",
            "node1, node2:7000",
            "--worker-port",
            "8000",
        ]);
        assert!(cli.validate().is_ok());
        assert_eq!(
            cli.node_addresses().unwrap(),
            vec!["node1:8000".to_string(), "node2:7000".to_string()]
        );
    }

    #[test]
    fn test_clients_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# workers").unwrap();
        writeln!(file, "10.0.0.1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "10.0.0.2:9000").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = parse(&[
            "paramsweep",
            "--mode",
            "coordinator",
            "--config",
            "run.toml",
            "--clients-file",
            &path,
        ]);
        assert_eq!(
            cli.node_addresses().unwrap(),
            vec!["10.0.0.1:9999".to_string(), "10.0.0.2:9000".to_string()]
        );
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = parse(&["paramsweep", "--config", "run.toml", "--workers", "0"]);
        assert!(cli.validate().is_err());
    }
}
