use algorand_state_sync::config::SyncConfig;
use algorand_state_sync::indexer::AlgorandApiClient;
use algorand_state_sync::utils::format_algos;
use algorand_state_sync::wallet::sync::{SharedDataControllerEvent, SharedDataControllerObserver};
use algorand_state_sync::wallet::{InMemorySession, LocalAccount, SharedDataController};

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "algorand-state-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
	/// JSON configuration file; defaults are used for missing fields
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Account address to keep in sync (repeatable)
	#[arg(short, long = "address", required = true)]
	addresses: Vec<String>,

	/// Preferred currency id, overrides the configuration
	#[arg(long)]
	currency: Option<String>,
}

/// Logs what the controller publishes.
struct LoggingObserver;

impl SharedDataControllerObserver for LoggingObserver {
	fn shared_data_controller_did_publish(&self, event: &SharedDataControllerEvent) {
		match event {
			SharedDataControllerEvent::DidUpdateAccountCollection(handle) => {
				info!(
					"{} is {}: {} ALGO, {} standard assets, {} collectibles",
					handle.address(),
					handle.status().name(),
					format_algos(handle.value.amount),
					handle.value.standard_assets().len(),
					handle.value.collectible_assets().len()
				);
				if let Some(e) = handle.status().error() {
					warn!("{} last refresh failed: {}", handle.address(), e);
				}
			}
			SharedDataControllerEvent::DidUpdateCurrency(currency) => {
				if let Some(currency) = currency.value() {
					info!(
						"1 ALGO = {} {}",
						currency.exchange_price.as_deref().unwrap_or("?"),
						currency.id
					);
				}
				if let Some(error) = currency.error() {
					warn!("Currency refresh failed: {}", error);
				}
			}
			other => info!("Controller event: {}", other.name()),
		}
	}
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let args = Args::parse();

	let mut config = match args.config.as_deref() {
		Some(path) => match SyncConfig::from_file(path) {
			Ok(config) => config,
			Err(e) => {
				error!("Failed to load configuration: {}", e);
				return;
			}
		},
		None => SyncConfig::default(),
	};
	if args.currency.is_some() {
		config.currency_id = args.currency;
	}

	info!("Starting state sync for {} accounts", args.addresses.len());

	let api = match AlgorandApiClient::from_config(&config) {
		Ok(client) => Arc::new(client),
		Err(e) => {
			error!("Failed to create API client: {}", e);
			return;
		}
	};

	let session = Arc::new(InMemorySession::new(
		args.addresses.into_iter().map(LocalAccount::new).collect(),
		config.currency_id.clone(),
	));

	let controller = match SharedDataController::new(api, session, &config) {
		Ok(controller) => controller,
		Err(e) => {
			error!("Failed to create controller: {}", e);
			return;
		}
	};

	let observer = Arc::new(LoggingObserver);
	controller.add(&observer);
	controller.start_polling();

	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("Failed to listen for shutdown signal: {}", e);
	}

	info!("Shutting down");
	controller.stop_polling();
	if let Some(stats) = controller.last_cycle_stats() {
		info!("Last cycle: {}", stats.summary());
	}
}
