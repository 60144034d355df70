//! Worker node service
//!
//! The node service:
//! - Listens for a coordinator connection
//! - Receives the rank's work assignment
//! - Prepares and runs the perturbed simulation
//! - Parses the outputs, exports the connectivity graph if configured
//! - Sends the results, or FATAL_ERROR when any of that fails
//!
//! Without `--once` it waits for the next coordinator after each session.

use crate::config::Config;
use crate::output::vtk;
use crate::plan::WorkAssignment;
use crate::simulation;
use crate::source::{GridFileSource, SeriesSource};
use crate::worker::{self, SessionOutcome};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

/// Node service
pub struct NodeService {
    /// Port to listen on
    listen_port: u16,

    /// Host name, used in logs and fatal messages
    node_id: String,

    config: Arc<Config>,

    /// Exit after the first session
    once: bool,
}

impl NodeService {
    pub fn new(listen_port: u16, config: Arc<Config>, once: bool) -> Result<Self> {
        let node_id = get_node_id()?;

        Ok(Self {
            listen_port,
            node_id,
            config,
            once,
        })
    }

    /// Bind the listen port and serve coordinators
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.listen_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind node service to {}", addr))?;

        println!("Node service listening on port {}", self.listen_port);
        println!("Node ID: {}", self.node_id);

        self.serve(listener).await
    }

    /// Accept loop on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            println!("Waiting for coordinator connection...");
            let (mut stream, addr) = listener
                .accept()
                .await
                .context("Failed to accept connection")?;
            println!("Coordinator connected from: {}", addr);

            match self.handle_session(&mut stream).await {
                Ok(SessionOutcome::Reported { rank, parameters }) => {
                    println!("✅ Rank {}: sent {} parameter(s)", rank, parameters);
                }
                Ok(SessionOutcome::Fatal { rank, message }) => {
                    let rank = rank.map_or_else(|| "?".to_string(), |r| r.to_string());
                    eprintln!("Rank {}: reported FATAL_ERROR: {}", rank, message);
                }
                Err(e) => eprintln!("Session failed: {:#}", e),
            }

            if self.once {
                return Ok(());
            }
        }
    }

    /// Serve one coordinator session
    pub async fn handle_session<T>(&self, stream: &mut T) -> Result<SessionOutcome>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let specs = self.config.parameter_specs();
        let config = Arc::clone(&self.config);

        worker::run_session(stream, &specs, &self.node_id, move |assignment| {
            load_run(&config, assignment)
        })
        .await
    }
}

/// Prepare, run and parse one assignment's simulation
pub fn load_run(config: &Config, assignment: &WorkAssignment) -> Result<GridFileSource> {
    let run_dir = simulation::prepare_run(config, assignment)?;

    let outputs = simulation::output_paths(config, &run_dir);
    let source = GridFileSource::open(&outputs)?;
    let keys = source.parsed_keys();
    println!("✅ Parsed {} series from {} file(s)", keys.len(), outputs.len());

    if config.main.list_keys {
        println!("Parsed keys:");
        for key in &keys {
            println!("  {}", key);
        }
    }

    if let Some(ref graph) = config.graph {
        let path = vtk::write_connectivity_graph(&source, graph, assignment.perturbation, &run_dir)?;
        println!("✅ Connectivity graph: {}", path.display());
    }

    Ok(source)
}

/// Host name of this node, or "unknown"
fn get_node_id() -> Result<String> {
    if let Ok(hostname) = hostname::get() {
        if let Ok(hostname_str) = hostname.into_string() {
            return Ok(hostname_str);
        }
    }

    Ok("unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::coordinator::DistributedCoordinator;
    use crate::output::RankOutcome;
    use std::fs;

    const GRID: &str = "\
 NX =   3 NY =   1 NZ =   1
 POROSITY IN LAYER   1
   2.0  4.0  6.0
 PERM IN LAYER   1
   1.0D+00  2.0D+00  4.0D+00
";

    fn config(work_dir: &std::path::Path, extra: &str) -> Config {
        let toml = format!(
            r#"
[main]
run_name = "node"
run_sim = false
outputs = ["OUT.PROF"]
work_dir = "{}"

[[parameters]]
name = "POROSITY"
sum = true
mean = true
pearson = "PERM"

[output]
dir = "{}"
{}
"#,
            work_dir.display(),
            work_dir.display(),
            extra
        );
        crate::config::toml::parse_toml_string(&toml).unwrap()
    }

    #[test]
    fn test_load_run_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("Simulation_0.500000-3");
        fs::create_dir(&run_dir).unwrap();
        fs::write(run_dir.join("OUT.PROF"), GRID).unwrap();

        let config = config(dir.path(), "[graph]\nkey = \"POROSITY\"\nlower = 3.0\nupper = 7.0\n");
        let assignment = WorkAssignment { rank: 3, perturbation: 0.5 };
        let source = load_run(&config, &assignment).unwrap();

        assert_eq!(source.values("PERM"), Some(&[1.0, 2.0, 4.0][..]));
        let vtk = fs::read_to_string(run_dir.join("POROSITY-ConnectivityGraph-0.5.vtk")).unwrap();
        assert!(vtk.contains("POINTS 2 double\n1 0 0\n2 0 0\n"));
        assert!(vtk.contains("LINES 1 3\n2 0 1\n"));
    }

    #[test]
    fn test_load_run_missing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "");
        let assignment = WorkAssignment { rank: 1, perturbation: 0.0 };
        assert!(load_run(&config, &assignment).is_err());
    }

    #[tokio::test]
    async fn test_coordinator_and_node_over_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("Simulation_0.000000-1");
        fs::create_dir(&run_dir).unwrap();
        fs::write(run_dir.join("OUT.PROF"), GRID).unwrap();
        let config = Arc::new(config(dir.path(), ""));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let service = NodeService::new(port, Arc::clone(&config), true).unwrap();
        let node = tokio::spawn(async move { service.serve(listener).await });

        let coordinator =
            DistributedCoordinator::new(config, vec![format!("127.0.0.1:{}", port)]).unwrap();
        let report = coordinator.run().await.unwrap();
        node.await.unwrap().unwrap();

        match &report.ranks[0].outcome {
            RankOutcome::Complete(results) => {
                assert_eq!(results[0].sum, Some(12.0));
                assert_eq!(results[0].mean, Some(4.0));
                let pearson = results[0].pearson.unwrap();
                assert!((pearson - 0.9819805060619657).abs() < 1e-12);
            }
            other => panic!("Expected Complete, got {:?}", other),
        }
        assert!(report.similarity.is_none());

        let csv = fs::read_to_string(dir.path().join("results-node.csv")).unwrap();
        assert!(csv.contains("Varied Run,+0%,id,1\n"));
        assert!(!dir.path().join("similarity-node.csv").exists());
    }

    #[tokio::test]
    async fn test_session_with_missing_outputs_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config(dir.path(), ""));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let service = NodeService::new(port, Arc::clone(&config), true).unwrap();
        let node = tokio::spawn(async move { service.serve(listener).await });

        let coordinator =
            DistributedCoordinator::new(config, vec![format!("127.0.0.1:{}", port)]).unwrap();
        let report = coordinator.run().await.unwrap();
        node.await.unwrap().unwrap();

        assert!(matches!(report.ranks[0].outcome, RankOutcome::Fatal(_)));
        let csv = fs::read_to_string(dir.path().join("results-node.csv")).unwrap();
        assert!(csv.contains("POROSITY,NA,NA,NA,NA,NA\n"));
    }
}
