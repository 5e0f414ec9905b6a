//! Configuration module for the order tracking service.
//!
//! Configuration is loaded from TOML. String values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["storage.toml", "delivery.toml"]` to pull in other files
//! - Each top-level section must be unique across all files (no duplicates allowed)

#[cfg(any(test, feature = "testing"))]
pub mod builders;
mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracking_types::DeliveryProvider;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration for a tracking service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub service: ServiceConfig,
	#[serde(default)]
	pub monitor: MonitorConfig,
	pub storage: StorageConfig,
	pub notification: NotificationConfig,
	pub delivery: DeliveryConfig,
	/// HTTP API server. Absent means the service runs headless.
	pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier reported by the health endpoint and in logs.
	pub id: String,
}

/// Store acknowledgment SLA settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
	/// Seconds a store has to acknowledge a new order before it is failed.
	#[serde(default = "default_acknowledgment_timeout_seconds")]
	pub acknowledgment_timeout_seconds: u64,
	/// Re-arm timers for unacknowledged orders found in storage at startup.
	#[serde(default = "default_true")]
	pub recover_on_startup: bool,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			acknowledgment_timeout_seconds: default_acknowledgment_timeout_seconds(),
			recover_on_startup: true,
		}
	}
}

fn default_acknowledgment_timeout_seconds() -> u64 {
	300
}

fn default_true() -> bool {
	true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
	/// Which dispatcher implementation to use as primary.
	pub primary: String,
	/// Map of dispatcher implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Upper bound on notification dispatches running at once.
	#[serde(default = "default_max_concurrent_dispatches")]
	pub max_concurrent_dispatches: usize,
}

fn default_max_concurrent_dispatches() -> usize {
	64
}

/// Courier integrations keyed by provider name (`uber`, `doordash`, `internal`).
///
/// Each table may set `adapter` to pick the implementation; otherwise the
/// `internal` provider uses the `internal` adapter and every other provider
/// uses `courier`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	pub providers: HashMap<String, toml::Value>,
}

impl DeliveryConfig {
	/// Name of the adapter implementation for a configured provider.
	pub fn adapter_for(&self, provider: DeliveryProvider) -> Option<String> {
		let table = self.providers.get(provider.as_str())?;
		let adapter = table
			.get("adapter")
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.unwrap_or_else(|| match provider {
				DeliveryProvider::Internal => "internal".to_string(),
				_ => "courier".to_string(),
			});
		Some(adapter)
	}
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	pub allowed_origins: Vec<String>,
	pub allowed_headers: Vec<String>,
	pub allowed_methods: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable and
/// supports defaults with `${VAR_NAME:-default_value}`. Input is capped at
/// 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures<'_>| {
		let var_name = &caps[1];
		match (std::env::var(var_name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| var_name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(var_name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		let timeout = self.monitor.acknowledgment_timeout_seconds;
		if timeout == 0 || timeout > 86400 {
			return Err(ConfigError::Validation(format!(
				"monitor.acknowledgment_timeout_seconds must be between 1 and 86400, got {}",
				timeout
			)));
		}

		check_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		check_primary(
			"notification",
			&self.notification.primary,
			&self.notification.implementations,
		)?;
		if self.notification.max_concurrent_dispatches == 0 {
			return Err(ConfigError::Validation(
				"notification.max_concurrent_dispatches must be at least 1".into(),
			));
		}

		if self.delivery.providers.is_empty() {
			return Err(ConfigError::Validation(
				"At least one delivery provider must be configured".into(),
			));
		}
		for name in self.delivery.providers.keys() {
			name.parse::<DeliveryProvider>()
				.map_err(|e| ConfigError::Validation(format!("delivery.providers: {}", e)))?;
		}

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("api.port cannot be 0".into()));
			}
		}

		Ok(())
	}
}

fn check_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a TOML string, resolving environment variables and validating the
/// result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
