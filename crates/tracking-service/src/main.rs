//! Main entry point for the order tracking service.
//!
//! Loads the configuration, assembles the tracking service from the
//! configured storage, notification and delivery implementations, re-arms
//! acknowledgment timers left over from a previous run and serves the HTTP
//! API until interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracking_config::Config;
use tracking_core::{TrackingBuilder, TrackingFactories, TrackingService};

mod apis;
mod server;

use tracking_delivery::implementations::courier::create_delivery as create_courier_delivery;
use tracking_delivery::implementations::internal::create_delivery as create_internal_delivery;
use tracking_notification::implementations::log::create_notifier as create_log_notifier;
use tracking_notification::implementations::webhook::create_notifier as create_webhook_notifier;
use tracking_storage::implementations::file::create_storage as create_file_storage;
use tracking_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the tracking service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", env = "TRACKING_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started tracking service");

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let service = Arc::new(build_service(config.clone())?);
	service.initialize().await?;

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			tokio::select! {
				result = server::start_server(api_config, Arc::clone(&service)) => {
					tracing::info!("API server finished");
					result?;
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Interrupt received");
				}
			}
		},
		None => {
			tracing::info!("API disabled, running timers only");
			tokio::signal::ctrl_c().await?;
		},
	}

	service.shutdown().await?;
	tracing::info!("Stopped tracking service");
	Ok(())
}

/// Builds a factory map keyed by implementation name.
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Wires every known implementation into the builder.
fn build_service(config: Config) -> Result<TrackingService, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		tracking_storage::StorageInterface,
		tracking_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let notification_factories = create_factory_map!(
		tracking_notification::NotificationInterface,
		tracking_notification::NotificationError,
		"log" => create_log_notifier,
		"webhook" => create_webhook_notifier,
	);

	let delivery_factories = create_factory_map!(
		tracking_delivery::DeliveryInterface,
		tracking_delivery::DeliveryError,
		"courier" => create_courier_delivery,
		"internal" => create_internal_delivery,
	);

	let factories = TrackingFactories {
		storage_factories,
		notification_factories,
		delivery_factories,
	};

	Ok(TrackingBuilder::new(config).build(factories)?)
}
