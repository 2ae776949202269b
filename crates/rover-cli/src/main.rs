//! `rover` – gateway binary.
//!
//! 1. Initialises tracing (console or JSON, optional OTLP export).
//! 2. Loads `~/.rover/config.toml`, writing the defaults on first run.
//! 3. Starts the simulated robot and its simulation thread.
//! 4. Serves the watch gateway over WebSocket and the REST surface over HTTP.
//! 5. On **Ctrl-C** stops both servers, forces every watch dormant and joins
//!    the simulation thread.

mod config;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use rover_cockpit::{ApiServer, EventServer};
use rover_hal::Robot;
use rover_hal::sim::Simulation;
use rover_middleware::Gateway;
use rover_types::GatewayError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::Config;

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("rover");

    print_banner();

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            println!("  Using default configuration.");
            Config::default()
        }
    };
    info!(?cfg, "configuration loaded");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(()) => {
            println!("{}", "  ✓ Rover gateway stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "gateway failed");
            println!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Existing config, or the defaults written to disk on first run.
fn load_config() -> Result<Config, GatewayError> {
    if let Some(cfg) = config::load()? {
        return Ok(cfg);
    }
    let mut cfg = Config::default();
    if let Err(e) = config::save(&cfg) {
        warn!(error = %e, "could not write default configuration");
    } else {
        println!(
            "  Wrote default configuration to {}",
            config::config_path().display().to_string().bold()
        );
    }
    config::apply_env_overrides(&mut cfg);
    Ok(cfg)
}

async fn run(cfg: Config) -> Result<(), GatewayError> {
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        on_signal.cancel();
    })
    .map_err(|e| GatewayError::Config(format!("failed to install Ctrl-C handler: {e}")))?;

    let robot = Robot::simulated(cfg.motor_count);
    let simulation = Simulation::spawn(robot.clone(), cfg.sim_period())?;
    let gateway = Arc::new(Gateway::for_robot(&robot, &cfg.grace.periods()));

    let served = serve(&cfg, robot, Arc::clone(&gateway), shutdown.clone()).await;

    shutdown.cancel();
    gateway.shutdown().await;
    tokio::task::spawn_blocking(move || simulation.stop())
        .await
        .map_err(|e| GatewayError::Config(format!("simulation join failed: {e}")))?;
    served
}

async fn serve(
    cfg: &Config,
    robot: Robot,
    gateway: Arc<Gateway>,
    shutdown: CancellationToken,
) -> Result<(), GatewayError> {
    let events = EventServer::bind(cfg.ws_addr(), gateway).await?;
    let api = ApiServer::bind(cfg.http_addr(), robot).await?;

    println!(
        "  Watch gateway on {}   REST API on {}",
        format!("ws://{}", events.local_addr()?).bold().cyan(),
        format!("http://{}/api", api.local_addr()?).bold().cyan(),
    );
    println!("  Press {} to stop.", "Ctrl-C".bold());

    tokio::try_join!(events.serve(shutdown.clone()), api.serve(shutdown))?;
    Ok(())
}

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║            Rover Gateway             ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
}
