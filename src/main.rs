//! paramsweep CLI entry point

use anyhow::{Context, Result};
use paramsweep::config::cli::{Cli, ExecutionMode};
use paramsweep::config::toml::{merge_cli_with_config, parse_toml_file};
use paramsweep::config::validator::validate_config;
use paramsweep::distributed::{DistributedCoordinator, NodeService};
use paramsweep::{Config, WorkPlan};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    println!("paramsweep v{}", env!("CARGO_PKG_VERSION"));
    println!("Distributed parameter-sensitivity sweeps");
    println!();

    let cli = Cli::parse_args();
    cli.validate()?;
    init_logging(cli.debug);

    let config = load_config(&cli)?;
    if cli.debug {
        eprintln!("DEBUG: Mode: {:?}", cli.mode);
    }

    match cli.mode {
        ExecutionMode::Standalone => run_standalone(cli, config),
        ExecutionMode::Coordinator => run_coordinator(cli, config),
        ExecutionMode::Worker => run_worker(cli, config),
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with --debug
fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = parse_toml_file(&cli.config)?;
    let config = merge_cli_with_config(cli, config)?;

    validate_config(&config).context("Configuration validation failed")?;

    Ok(config)
}

fn print_plan(config: &Config, worker_count: usize) {
    print!("{}", config);
    println!();
    print!("{}", WorkPlan::new(worker_count, config.main.symmetry));
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Run coordinator and workers on this machine
fn run_standalone(cli: Cli, config: Config) -> Result<()> {
    print_plan(&config, cli.workers);

    if config.runtime.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    println!();
    let ports = find_available_ports(cli.workers, cli.debug)?;
    let mut children = Vec::with_capacity(ports.len());
    for &port in &ports {
        match launch_local_worker(port, &cli) {
            Ok(child) => children.push(child),
            Err(e) => {
                cleanup_workers(children, cli.debug);
                return Err(e);
            }
        }
    }

    // Give the workers time to bind
    std::thread::sleep(Duration::from_millis(500));

    let node_addresses: Vec<String> = ports.iter().map(|port| format!("127.0.0.1:{}", port)).collect();
    let result = runtime().and_then(|rt| {
        rt.block_on(async {
            let coordinator = DistributedCoordinator::new(Arc::new(config), node_addresses)
                .context("Failed to create coordinator")?;
            coordinator.run().await
        })
    });

    cleanup_workers(children, cli.debug);

    result.map(|_| ())
}

/// Drive remote workers
fn run_coordinator(cli: Cli, config: Config) -> Result<()> {
    let node_addresses = cli.node_addresses()?;
    print_plan(&config, node_addresses.len());

    if config.runtime.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    println!();
    runtime()?.block_on(async {
        let coordinator = DistributedCoordinator::new(Arc::new(config), node_addresses)
            .context("Failed to create coordinator")?;
        coordinator.run().await
    })?;

    Ok(())
}

/// Serve coordinators as a worker
fn run_worker(cli: Cli, config: Config) -> Result<()> {
    if config.runtime.dry_run {
        print!("{}", config);
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    runtime()?.block_on(async {
        let service = NodeService::new(cli.listen_port, Arc::new(config), cli.once)
            .context("Failed to create node service")?;
        service.run().await
    })
}

/// Reserve `count` distinct free localhost ports in 9999..10100
fn find_available_ports(count: usize, debug: bool) -> Result<Vec<u16>> {
    use std::net::TcpListener;

    // Keep the listeners open until every port is picked
    let mut held = Vec::with_capacity(count);
    for port in 9999..10100u16 {
        if held.len() == count {
            break;
        }
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            if debug {
                eprintln!("DEBUG: Port {} is available", port);
            }
            held.push((port, listener));
        }
    }

    if held.len() < count {
        anyhow::bail!(
            "Only {} of {} ports available in range 9999-10099. Close other paramsweep instances or use fewer --workers.",
            held.len(),
            count
        );
    }

    Ok(held.into_iter().map(|(port, _)| port).collect())
}

/// Launch one `--mode worker --once` child of this executable
fn launch_local_worker(port: u16, cli: &Cli) -> Result<Child> {
    let exe_path = std::env::current_exe().context("Failed to get current executable path")?;

    let mut cmd = Command::new(&exe_path);
    cmd.arg("--mode").arg("worker");
    cmd.arg("--once");
    cmd.arg("--listen-port").arg(port.to_string());
    cmd.arg("--config").arg(&cli.config);

    if cli.debug {
        cmd.arg("--debug");
        let log_path = std::env::temp_dir().join(format!("paramsweep_worker_{}.log", port));
        let log_file = std::fs::File::create(&log_path).context("Failed to create worker log file")?;
        cmd.stdout(Stdio::from(log_file.try_clone()?));
        cmd.stderr(Stdio::from(log_file));
        eprintln!("DEBUG: Worker log: {}", log_path.display());
    } else {
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
    }

    let child = cmd.spawn().context("Failed to spawn worker process")?;

    if cli.debug {
        eprintln!("DEBUG: Worker launched on port {} (PID: {})", port, child.id());
    }

    Ok(child)
}

fn cleanup_workers(children: Vec<Child>, debug: bool) {
    for child in children {
        if let Err(e) = cleanup_worker(child, debug) {
            eprintln!("Warning: Failed to cleanup worker: {}", e);
        }
    }
}

/// Wait briefly for a worker to exit on its own, then kill it
fn cleanup_worker(mut child: Child, debug: bool) -> Result<()> {
    if debug {
        eprintln!("DEBUG: Cleaning up worker (PID: {})...", child.id());
    }

    if let Some(status) = child.try_wait()? {
        if debug {
            eprintln!("DEBUG: Worker already exited with status: {}", status);
        }
        return Ok(());
    }

    // --once workers exit right after sending their results
    std::thread::sleep(Duration::from_millis(1000));

    if let Some(status) = child.try_wait()? {
        if debug {
            eprintln!("DEBUG: Worker exited with status: {}", status);
        }
        return Ok(());
    }

    if debug {
        eprintln!("DEBUG: Worker still running, killing...");
    }
    child.kill()?;
    let status = child.wait()?;
    if debug {
        eprintln!("DEBUG: Worker killed with status: {}", status);
    }

    Ok(())
}
