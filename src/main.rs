//! Blockchain event listener entry point.
//!
//! Loads the service configuration, restores persisted listeners, consumes
//! creation requests from the request queue and shuts every listener down
//! cleanly on Ctrl+C or SIGTERM.
//!
//! # Flow
//! 1. Applies CLI options to the environment and sets up logging
//! 2. Loads and validates the service configuration
//! 3. Restores listeners from the checkpoint store
//! 4. Starts the request queue and the optional metrics server
//! 5. Waits for a termination signal, then stops all listeners

use chain_listener::{
	bootstrap::{create_request_queue, initialize_services, load_service_config, wait_for_shutdown_signal, Result},
	utils::{logging::setup_logging, metrics::server::create_metrics_server, parse_string_to_bytes_size},
};

use clap::Parser;
use dotenvy::dotenv_override;
use std::env::{set_var, var};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/listener.json";

#[derive(Parser)]
#[command(
	name = "chain-listener",
	about = "Watches on-chain token events and delivers every match to a downstream callback.",
	version
)]
struct Cli {
	/// Path to the service configuration file
	#[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
	config: PathBuf,

	/// Write logs to file instead of stdout
	#[arg(long)]
	log_file: bool,

	/// Set log level (trace, debug, info, warn, error)
	#[arg(long, value_name = "LEVEL")]
	log_level: Option<String>,

	/// Path to store log files (default: logs/)
	#[arg(long, value_name = "PATH")]
	log_path: Option<String>,

	/// Maximum log file size before rolling (e.g., "1GB", "500MB", "1024KB")
	#[arg(long, value_name = "SIZE", value_parser = parse_string_to_bytes_size)]
	log_max_size: Option<u64>,

	/// Address to start the metrics server on (default: 127.0.0.1:8081)
	#[arg(long, value_name = "HOST:PORT")]
	metrics_address: Option<String>,

	/// Enable metrics server
	#[arg(long)]
	metrics: bool,

	/// Validate the configuration file without starting the service
	#[arg(long)]
	check: bool,
}

impl Cli {
	/// Apply CLI options to environment variables, overriding any existing values
	fn apply_to_env(&self) {
		// .env values override the inherited environment, CLI flags override both
		dotenv_override().ok();

		if self.log_file {
			set_var("LOG_MODE", "file");
		}

		if let Ok(level) = var("RUST_LOG") {
			set_var("LOG_LEVEL", level);
		}

		if let Some(level) = &self.log_level {
			set_var("LOG_LEVEL", level);
			set_var("RUST_LOG", level);
		}

		if let Some(path) = &self.log_path {
			set_var("LOG_DATA_DIR", path);
		}

		if let Some(max_size) = &self.log_max_size {
			set_var("LOG_MAX_SIZE", max_size.to_string());
		}

		if self.metrics {
			set_var("METRICS_ENABLED", "true");
		}

		if let Some(address) = &self.metrics_address {
			set_var("METRICS_ADDRESS", address);
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	cli.apply_to_env();

	setup_logging().unwrap_or_else(|e| {
		eprintln!("Failed to setup logging: {}", e);
	});

	if cli.check {
		return match load_service_config(&cli.config).await {
			Ok(config) => {
				info!(
					"✓ Configuration is valid: {} chain(s), request queue {}",
					config.chains.len(),
					if config.queue.is_some() { "enabled" } else { "disabled" }
				);
				Ok(())
			}
			Err(e) => {
				error!("Configuration is invalid: {}", e);
				Err(e)
			}
		};
	}

	let (config, manager) = initialize_services(&cli.config)
		.await
		.map_err(|e| anyhow::anyhow!("Failed to initialize services: {}", e))?;

	match manager.restore_listeners().await {
		Ok(report) if !report.failed.is_empty() => {
			error!("Failed to restore listeners: {}", report.failed.join(", "));
		}
		Ok(_) => {}
		Err(e) => error!("Listener restore failed: {}", e),
	}

	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	let queue_task = create_request_queue(&config).map(|queue| {
		let manager = manager.clone();
		let shutdown_rx = shutdown_rx.clone();
		tokio::spawn(async move { queue.run(&manager, shutdown_rx).await })
	});
	if queue_task.is_none() {
		info!("No request queue configured, only restored listeners will run");
	}

	let metrics_enabled =
		cli.metrics || var("METRICS_ENABLED").map(|v| v == "true").unwrap_or(false);
	let metrics_address = var("METRICS_ADDRESS").unwrap_or_else(|_| "127.0.0.1:8081".to_string());

	let metrics_server = if metrics_enabled {
		info!("Metrics server enabled, starting on {}", metrics_address);
		match create_metrics_server(metrics_address) {
			Ok(server) => Some(server),
			Err(e) => {
				error!("Failed to create metrics server: {}", e);
				None
			}
		}
	} else {
		info!("Metrics server disabled. Use --metrics flag or METRICS_ENABLED=true to enable");
		None
	};

	info!("Service started. Press Ctrl+C to shutdown");

	match metrics_server {
		Some(server) => {
			let handle = server.handle();
			tokio::select! {
				_ = wait_for_shutdown_signal() => {
					info!("Shutdown signal received, stopping services...");
				}
				result = server => {
					if let Err(e) = result {
						error!("Metrics server error: {}", e);
					}
					info!("Metrics server stopped, shutting down services...");
				}
			}
			handle.stop(true).await;
		}
		None => {
			wait_for_shutdown_signal().await;
			info!("Shutdown signal received, stopping services...");
		}
	}

	shutdown_tx.send_replace(true);
	if let Some(task) = queue_task {
		if let Err(e) = task.await {
			error!("Request queue task failed: {}", e);
		}
	}

	manager.shutdown().await;

	info!("Shutdown complete");
	Ok(())
}
