//! Distributed coordinator
//!
//! The coordinator:
//! - Computes the work plan and sends every rank its assignment
//! - Collects results rank by rank, in ascending order
//! - Compares NORM grids across ranks
//! - Writes the reports
//!
//! Collection is strictly sequential: a slow rank holds up every rank after
//! it. Workers still compute in parallel since every assignment is sent
//! before the first receive.

use crate::config::Config;
use crate::distributed::codec::{decode, ProtocolError, StreamFrames};
use crate::distributed::protocol::{write_envelope, AssignmentMessage, Envelope, PROTOCOL_VERSION};
use crate::output::{self, RankOutcome, RankReport, RunReport};
use crate::plan::WorkPlan;
use crate::stats::similarity::{GridContribution, SimilarityEngine};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::sleep;

const CONNECT_ATTEMPTS: u32 = 20;
const CONNECT_BACKOFF: Duration = Duration::from_millis(250);

/// Coordinator progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Planning,
    Collecting { rank: u32 },
    Similarity,
    Reporting,
    Done,
}

/// Run state machine over already-connected worker streams
///
/// `streams[i]` belongs to rank `i + 1`.
pub struct Coordinator {
    run_name: String,
    plan: WorkPlan,
    parameter_names: Vec<String>,
    state: CoordinatorState,
}

impl Coordinator {
    pub fn new(run_name: impl Into<String>, plan: WorkPlan, parameter_names: Vec<String>) -> Self {
        Self {
            run_name: run_name.into(),
            plan,
            parameter_names,
            state: CoordinatorState::Idle,
        }
    }

    /// Coordinator for `worker_count` workers as configured by `config`
    pub fn from_config(config: &Config, worker_count: usize) -> Self {
        Self::new(
            config.main.run_name.clone(),
            WorkPlan::new(worker_count, config.main.symmetry),
            config.parameters.iter().map(|p| p.name.clone()).collect(),
        )
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn plan(&self) -> &WorkPlan {
        &self.plan
    }

    fn enter(&mut self, next: CoordinatorState) {
        log::debug!("Coordinator state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Send all assignments, collect every rank and compute similarity
    ///
    /// Leaves the coordinator in [`CoordinatorState::Reporting`].
    pub async fn collect<T>(&mut self, streams: &mut [T]) -> Result<RunReport>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if self.state != CoordinatorState::Idle {
            anyhow::bail!("Coordinator already ran (state {:?})", self.state);
        }
        if streams.len() != self.plan.worker_count() {
            anyhow::bail!(
                "Work plan has {} rank(s) but {} worker stream(s) were given",
                self.plan.worker_count(),
                streams.len()
            );
        }

        let start = Instant::now();
        self.enter(CoordinatorState::Planning);

        let assignments = self.plan.assignments.clone();
        let world_size = self.plan.world_size() as u32;
        let mut send_failures: Vec<Option<String>> = vec![None; streams.len()];

        for ((assignment, stream), failure) in assignments.iter().zip(streams.iter_mut()).zip(send_failures.iter_mut()) {
            let message = Envelope::work(AssignmentMessage {
                protocol_version: PROTOCOL_VERSION,
                world_size,
                assignment: *assignment,
            });
            match write_envelope(stream, &message).await {
                Ok(()) => println!(
                    "  ✅ Sent rank {} perturbation {}",
                    assignment.rank,
                    assignment.percent_label()
                ),
                Err(e) => {
                    log::warn!("Rank {}: failed to send assignment: {:#}", assignment.rank, e);
                    *failure = Some(format!("failed to send assignment: {:#}", e));
                }
            }
        }

        let mut engine = SimilarityEngine::new();
        let mut ranks = Vec::with_capacity(assignments.len());

        for ((assignment, stream), failure) in assignments.iter().zip(streams.iter_mut()).zip(send_failures) {
            self.enter(CoordinatorState::Collecting { rank: assignment.rank });
            let outcome = match failure {
                Some(message) => RankOutcome::Desync(message),
                None => collect_rank(stream, assignment.rank, &mut engine).await,
            };
            ranks.push(RankReport {
                assignment: *assignment,
                outcome,
            });
        }

        self.enter(CoordinatorState::Similarity);
        let similarity = if engine.is_empty() {
            None
        } else {
            log::debug!("Comparing {} grid contribution(s)", engine.len());
            Some(engine.compute())
        };

        self.enter(CoordinatorState::Reporting);
        Ok(RunReport {
            run_name: self.run_name.clone(),
            symmetry: self.plan.symmetry,
            parameter_names: self.parameter_names.clone(),
            ranks,
            similarity,
            elapsed: start.elapsed(),
        })
    }

    /// Write the CSV reports, the optional JSON summary and the console summary
    pub fn report(&mut self, report: &RunReport, config: &Config) -> Result<()> {
        if self.state != CoordinatorState::Reporting {
            anyhow::bail!("Nothing to report yet (state {:?})", self.state);
        }

        let results_path = config.results_path();
        output::csv::write_results_report(&results_path, report)?;
        println!("✅ Results report: {}", results_path.display());

        let similarity_path = config.similarity_path();
        if output::csv::write_similarity_report(&similarity_path, report)? {
            println!("✅ Similarity report: {}", similarity_path.display());
        }

        if let Some(ref json_path) = config.output.json_output {
            output::json::write_json_summary(json_path, report)?;
            println!("✅ JSON summary: {}", json_path.display());
        }

        println!();
        output::text::print_summary(report);

        self.enter(CoordinatorState::Done);
        Ok(())
    }
}

/// Receive one rank's results
///
/// NORM grids are moved into the similarity engine; the returned results keep
/// their scalars only.
async fn collect_rank<R>(stream: &mut R, rank: u32, engine: &mut SimilarityEngine) -> RankOutcome
where
    R: AsyncRead + Unpin,
{
    match decode(&mut StreamFrames::new(stream)).await {
        Ok(mut results) => {
            for result in results.iter_mut() {
                let Some(values) = result.grid.take() else {
                    continue;
                };
                if values.is_empty() {
                    log::warn!("Rank {}: empty grid for {}; not compared", rank, result.name);
                    continue;
                }
                engine.add(GridContribution {
                    parameter_name: result.name.clone(),
                    origin_rank: rank,
                    values,
                });
            }
            println!("  ✅ Rank {}: {} parameter(s)", rank, results.len());
            RankOutcome::Complete(results)
        }
        Err(ProtocolError::WorkerFatal(message)) => {
            log::warn!("Rank {} failed: {}; reporting NA", rank, message);
            RankOutcome::Fatal(message)
        }
        Err(e) => {
            log::warn!("Rank {}: {}; reporting NA", rank, e);
            RankOutcome::Desync(e.to_string())
        }
    }
}

async fn connect(addr: &str) -> Result<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                log::debug!("Connect to {} failed (attempt {}): {}", addr, attempt, e);
                attempt += 1;
                sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to connect to {}", addr)),
        }
    }
}

/// Distributed coordinator
///
/// Connects to one worker per node address; the i-th address is rank i + 1.
pub struct DistributedCoordinator {
    config: Arc<Config>,

    /// Worker addresses (host:port), in rank order
    node_addresses: Vec<String>,
}

impl DistributedCoordinator {
    pub fn new(config: Arc<Config>, node_addresses: Vec<String>) -> Result<Self> {
        if node_addresses.is_empty() {
            anyhow::bail!("No workers specified for coordinator mode");
        }

        Ok(Self {
            config,
            node_addresses,
        })
    }

    /// Run one sweep and write its reports
    pub async fn run(self) -> Result<RunReport> {
        println!("Distributed Coordinator");
        println!();

        let mut coordinator = Coordinator::from_config(&self.config, self.node_addresses.len());
        print!("{}", coordinator.plan());
        println!();

        println!("Connecting to {} worker(s)...", self.node_addresses.len());
        let mut connections = Vec::with_capacity(self.node_addresses.len());
        for (i, addr) in self.node_addresses.iter().enumerate() {
            let stream = connect(addr).await?;
            println!("  ✅ Connected to rank {} ({})", i + 1, addr);
            connections.push(stream);
        }

        println!();
        println!("Sending assignments and collecting results...");
        let report = coordinator.collect(&mut connections).await?;

        println!();
        coordinator.report(&report, &self.config)?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parameter::{ParameterSpec, Statistic, StatsMask};
    use crate::distributed::protocol::Field;
    use crate::plan::{Symmetry, WorkAssignment};
    use crate::source::MemorySource;
    use crate::worker::{self, SessionOutcome};
    use tokio::io::DuplexStream;

    fn specs() -> Vec<ParameterSpec> {
        vec![ParameterSpec::new(
            "POROSITY",
            StatsMask::from_stats(&[Statistic::Sum, Statistic::Mean, Statistic::Norm]),
        )]
    }

    fn coordinator(workers: usize) -> Coordinator {
        Coordinator::new(
            "test",
            WorkPlan::new(workers, Symmetry::Symmetric),
            vec!["POROSITY".to_string()],
        )
    }

    /// Worker task answering from a fixed series
    fn spawn_worker(
        mut stream: DuplexStream,
        values: Vec<f64>,
    ) -> tokio::task::JoinHandle<SessionOutcome> {
        tokio::spawn(async move {
            worker::run_session(&mut stream, &specs(), "test-node", move |_: &WorkAssignment| {
                let mut source = MemorySource::new();
                source.insert("POROSITY", values);
                Ok(source)
            })
            .await
            .unwrap()
        })
    }

    #[tokio::test]
    async fn test_collect_two_ranks() {
        let (c1, w1) = tokio::io::duplex(64 * 1024);
        let (c2, w2) = tokio::io::duplex(64 * 1024);
        let h1 = spawn_worker(w1, vec![1.0, 2.0, 3.0]);
        let h2 = spawn_worker(w2, vec![1.0, 2.0, 5.0]);

        let mut coordinator = coordinator(2);
        let mut streams = vec![c1, c2];
        let report = coordinator.collect(&mut streams).await.unwrap();

        assert_eq!(coordinator.state(), CoordinatorState::Reporting);
        assert_eq!(report.ranks.len(), 2);
        assert_eq!(report.ranks[0].assignment.perturbation, 0.0);
        assert_eq!(report.ranks[1].assignment.perturbation, 1.0);

        match &report.ranks[1].outcome {
            RankOutcome::Complete(results) => {
                assert_eq!(results[0].sum, Some(8.0));
                // grids are handed to the similarity engine
                assert_eq!(results[0].grid, None);
            }
            other => panic!("Expected Complete, got {:?}", other),
        }

        let similarity = report.similarity.unwrap();
        assert_eq!(similarity.len(), 1);
        assert_eq!((similarity[0].rank_a, similarity[0].rank_b), (1, 2));
        assert_eq!(similarity[0].norm, 2.0);

        assert!(matches!(h1.await.unwrap(), SessionOutcome::Reported { rank: 1, .. }));
        assert!(matches!(h2.await.unwrap(), SessionOutcome::Reported { rank: 2, .. }));
    }

    #[tokio::test]
    async fn test_fatal_rank_does_not_stop_collection() {
        let (c1, mut w1) = tokio::io::duplex(64 * 1024);
        let (c2, w2) = tokio::io::duplex(64 * 1024);
        let failing = tokio::spawn(async move {
            worker::run_session::<_, MemorySource, _>(&mut w1, &specs(), "bad-node", |_| {
                anyhow::bail!("simulator exited with status 1")
            })
            .await
            .unwrap()
        });
        let h2 = spawn_worker(w2, vec![2.0, 4.0, 6.0]);

        let mut coordinator = coordinator(2);
        let mut streams = vec![c1, c2];
        let report = coordinator.collect(&mut streams).await.unwrap();

        match &report.ranks[0].outcome {
            RankOutcome::Fatal(message) => assert!(message.contains("status 1")),
            other => panic!("Expected Fatal, got {:?}", other),
        }
        assert!(report.ranks[1].outcome.is_complete());
        let rows = report.ranks[0].rows(&report.parameter_names);
        assert_eq!(rows[0].values, [None; 5]);

        // one grid only: nothing to pair it with
        assert_eq!(report.similarity, Some(vec![]));

        failing.await.unwrap();
        h2.await.unwrap();
    }

    #[tokio::test]
    async fn test_desync_rank() {
        let (c1, mut w1) = tokio::io::duplex(64 * 1024);
        let (c2, w2) = tokio::io::duplex(64 * 1024);
        let rogue = tokio::spawn(async move {
            crate::distributed::protocol::read_envelope(&mut w1).await.unwrap();
            // scalar where the parameter count belongs
            write_envelope(&mut w1, &Envelope::result(Field::Scalar(1.0))).await.unwrap();
        });
        let h2 = spawn_worker(w2, vec![2.0, 4.0, 6.0]);

        let mut coordinator = coordinator(2);
        let mut streams = vec![c1, c2];
        let report = coordinator.collect(&mut streams).await.unwrap();

        assert!(matches!(report.ranks[0].outcome, RankOutcome::Desync(_)));
        assert!(report.ranks[1].outcome.is_complete());

        rogue.await.unwrap();
        h2.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_count_mismatch() {
        let (c1, _w1) = tokio::io::duplex(1024);
        let mut coordinator = coordinator(2);
        let mut streams = vec![c1];

        assert!(coordinator.collect(&mut streams).await.is_err());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[tokio::test]
    async fn test_report_writes_files() {
        let (c1, w1) = tokio::io::duplex(64 * 1024);
        let h1 = spawn_worker(w1, vec![2.0, 4.0, 6.0]);

        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
[main]
run_name = "unit"
run_sim = false
outputs = ["OUT"]

[[parameters]]
name = "POROSITY"
sum = true
mean = true

[output]
dir = "{}"
"#,
            dir.path().display()
        );
        let config = crate::config::toml::parse_toml_string(&toml).unwrap();

        let mut coordinator = Coordinator::from_config(&config, 1);
        assert!(coordinator.report(&RunReport {
            run_name: "unit".to_string(),
            symmetry: Symmetry::Symmetric,
            parameter_names: vec![],
            ranks: vec![],
            similarity: None,
            elapsed: Duration::ZERO,
        }, &config).is_err());

        let mut streams = vec![c1];
        let report = coordinator.collect(&mut streams).await.unwrap();
        coordinator.report(&report, &config).unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Done);

        let results = std::fs::read_to_string(dir.path().join("results-unit.csv")).unwrap();
        assert!(results.starts_with("Varied Run,+0%,id,1\n"));
        assert!(results.contains("POROSITY,12,4,NA,NA,NA\n"));
        // the worker sent a NORM grid, so the similarity report exists
        assert!(dir.path().join("similarity-unit.csv").exists());

        h1.await.unwrap();
    }

    #[test]
    fn test_new_requires_nodes() {
        let config = crate::config::toml::parse_toml_string(
            "[main]\nrun_name = \"x\"\nrun_sim = false\noutputs = [\"OUT\"]\n",
        )
        .unwrap();
        assert!(DistributedCoordinator::new(Arc::new(config), vec![]).is_err());
    }
}
