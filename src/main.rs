use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use camsync::config::{
    AppConfig, CliOverrides, DeviceOverrides, NotificationOverrides, SoundOverrides,
};
use camsync::core::{MountResolver, Orchestrator, TransferMode};
use camsync::{adapters, context, logging, runtime};
use clap::{Args, Parser, Subcommand};
use nix::unistd::getuid;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "camsync")]
#[command(about = "Copy new camera footage into a date-bucketed archive", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: /etc/camsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the camera and archive every new file once
    Sync(SyncArgs),
    /// List mounted locations and whether they look like the camera
    Devices(DeviceArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
struct SyncArgs {
    /// Archive root
    #[arg(long)]
    destination: Option<PathBuf>,

    /// Delete each source file after a verified copy
    #[arg(long = "move")]
    move_files: bool,

    /// Sound file played when the run succeeds
    #[arg(long)]
    sound: Option<PathBuf>,

    #[arg(long)]
    no_notify: bool,

    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,

    #[arg(long)]
    max_wait_secs: Option<u64>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Device label pattern (regex, case-insensitive); repeatable
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Use the stdin-driven simulated device
    #[arg(long)]
    simulation: bool,
}

#[derive(Args)]
struct DeviceArgs {
    #[arg(long = "label")]
    labels: Vec<String>,

    #[arg(short, long)]
    verbose: bool,
}

impl SyncArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            destination_directory: self.destination.clone(),
            mode: self.move_files.then_some(TransferMode::Move),
            poll_interval_ms: self.poll_interval_ms,
            max_wait_ms: self.max_wait_secs.map(|s| s.saturating_mul(1000)),
            verbose: self.verbose.then_some(true),
            json_logs: self.json.then_some(true),
            simulation: self.simulation.then_some(true),
            device: label_overrides(&self.labels),
            notifications: self
                .no_notify
                .then_some(NotificationOverrides { enabled: false }),
            sound: self.sound.clone().map(|path| SoundOverrides { path }),
            ..Default::default()
        }
    }
}

fn label_overrides(labels: &[String]) -> Option<DeviceOverrides> {
    (!labels.is_empty()).then(|| DeviceOverrides {
        labels: labels.to_vec(),
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let overrides = match &cli.command {
        Commands::Sync(args) => args.overrides(),
        Commands::Devices(args) => CliOverrides {
            verbose: args.verbose.then_some(true),
            device: label_overrides(&args.labels),
            ..Default::default()
        },
        Commands::Config => CliOverrides::default(),
    };

    let config = match AppConfig::new(cli.config.as_deref(), Some(&overrides)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Sync(_) => runtime::block_on(run_sync(config), runtime::SHUTDOWN_GRACE)
            .context("Failed to start async runtime")
            .and_then(|r| r),
        Commands::Devices(_) => run_devices(&config).map(|()| ExitCode::SUCCESS),
        Commands::Config => run_config(&config).map(|()| ExitCode::SUCCESS),
    };

    result.unwrap_or_else(|e| {
        eprintln!("Error: {e:#}");
        ExitCode::FAILURE
    })
}

async fn run_sync(config: AppConfig) -> Result<ExitCode> {
    logging::init(logging::LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
        file: config.log_file.clone(),
    })?;

    let resolver: Arc<dyn MountResolver> = Arc::from(adapters::get_resolver(config.simulation));
    let ctx = context::AppContext::new(config);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match Orchestrator::new(ctx, resolver).run(cancel).await {
        Ok(run) => {
            println!("{}", run.summary_line());
            Ok(ExitCode::from(run.exit_code()))
        }
        Err(e) => {
            error!(error = %e, "Sync failed");
            eprintln!("Error: {e}");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

/// Cancel the run on Ctrl-C or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("Shutdown signal received, finishing current file");
    cancel.cancel();
}

fn run_devices(config: &AppConfig) -> Result<()> {
    logging::init(logging::LogConfig {
        verbose: config.verbose,
        ..Default::default()
    })?;

    let matcher = config
        .device
        .matcher(getuid().as_raw())
        .context("Invalid device label pattern")?;
    let resolver = adapters::get_resolver(config.simulation);
    let candidates = resolver
        .candidates(&config.device)
        .context("Failed to list mounts")?;

    for candidate in &candidates {
        let verdict = if matcher.matches(candidate) {
            "match"
        } else {
            "-"
        };
        println!(
            "{:<6} {} ({}, {})",
            verdict,
            candidate.path.display(),
            candidate.source,
            candidate.fstype
        );
        for (key, value) in &candidate.properties {
            println!("         {key}={value}");
        }
    }

    match resolver.resolve(&config.device)? {
        Some(mount) => println!("\nSelected: {}", mount.path.display()),
        None => println!("\nNo device matches"),
    }
    Ok(())
}

fn run_config(config: &AppConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
