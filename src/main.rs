//! EcoWatt simulator entry point: CLI wiring and config-driven service construction.

mod cli;

use std::sync::{Arc, PoisonError};

use anyhow::{Context, Result, bail};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ecowatt_sim::config::ServiceConfig;
use ecowatt_sim::io::export::export_csv;
use ecowatt_sim::sim::{Simulator, StartOutcome, StopOutcome, TickOutcome};
use ecowatt_sim::store::{SqliteStore, seed_roster};

use cli::{Cli, Command};

/// `RUST_LOG` wins over the configured filter.
fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ServiceConfig::from_toml_file(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(path) = &cli.database {
        cfg.storage.database_path = path.clone();
    }
    if let Some(path) = &cli.lock_file {
        cfg.storage.lock_path = path.clone();
    }

    let errors = cfg.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        bail!("{} invalid configuration value(s)", errors.len());
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    init_logging(&cfg.logging.filter);

    let simulator = Arc::new(Simulator::from_config(&cfg).with_context(|| {
        format!("opening database {}", cfg.storage.database_path.display())
    })?);

    match cli.command.clone().unwrap_or_default() {
        Command::Run {
            #[cfg(feature = "api")]
            serve,
            #[cfg(feature = "api")]
            port,
        } => {
            #[cfg(feature = "api")]
            if serve {
                spawn_api(Arc::clone(&simulator), port);
            }
            run(&simulator).await
        }
        Command::Tick => {
            refuse_if_running_elsewhere(&simulator)?;
            match simulator.run_tick()? {
                TickOutcome::Idle => println!("no active appliances"),
                TickOutcome::Written(report) => {
                    println!("{} samples at {}: {}", report.written, report.at, report.stats);
                    if let Some(pruned) = report.pruned {
                        println!("pruned {pruned} expired samples");
                    }
                }
            }
            Ok(())
        }
        Command::Stats => {
            let stats = simulator.user_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Prune => {
            refuse_if_running_elsewhere(&simulator)?;
            let removed = simulator.prune_now()?;
            println!("pruned {removed} expired samples");
            Ok(())
        }
        Command::Seed { users } => {
            let mut rng = match cfg.simulation.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let store = lock_store(&simulator);
            let summary = seed_roster(&store, &cfg.profile_table(), users, &mut rng)?;
            println!(
                "created {} appliances for users {:?}",
                summary.appliances, summary.user_ids
            );
            Ok(())
        }
        Command::Export {
            appliance,
            out,
            limit,
        } => {
            let samples = lock_store(&simulator).recent_samples(appliance, limit)?;
            export_csv(&samples, &out)
                .with_context(|| format!("writing CSV to {}", out.display()))?;
            eprintln!("{} samples written to {}", samples.len(), out.display());
            Ok(())
        }
    }
}

/// Manual ticks and prunes would interleave with a loop in another process.
fn refuse_if_running_elsewhere(simulator: &Simulator<SqliteStore>) -> Result<()> {
    if simulator.running_elsewhere() {
        bail!("the simulation loop is running in another process; stop it first");
    }
    Ok(())
}

fn lock_store(simulator: &Simulator<SqliteStore>) -> std::sync::MutexGuard<'_, SqliteStore> {
    simulator
        .store()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

async fn run(simulator: &Simulator<SqliteStore>) -> Result<()> {
    match simulator.start()? {
        StartOutcome::Started | StartOutcome::AlreadyRunning => {}
        StartOutcome::HeldElsewhere { pid } => {
            bail!("simulation is already running in process {pid}")
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;
    info!("shutdown requested");

    if simulator.stop().await == StopOutcome::TimedOut {
        warn!("simulation loop was abandoned at shutdown");
    }
    Ok(())
}

#[cfg(feature = "api")]
fn spawn_api(simulator: Arc<Simulator<SqliteStore>>, port: u16) {
    use std::net::SocketAddr;

    use ecowatt_sim::api::{AppState, serve};

    let state = Arc::new(AppState { simulator });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tokio::spawn(async move {
        if let Err(e) = serve(state, addr).await {
            tracing::error!(error = %e, "API server stopped");
        }
    });
}
