//! Configuration builder for tests and local development.

use crate::{
	ApiConfig, Config, DeliveryConfig, MonitorConfig, NotificationConfig, ServiceConfig,
	StorageConfig,
};
use std::collections::HashMap;

/// Fluent builder for [`Config`].
///
/// Defaults to in-memory storage, the `log` dispatcher and an `internal`
/// delivery fleet with a single driver.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	acknowledgment_timeout_seconds: u64,
	recover_on_startup: bool,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
	notification_primary: String,
	notification_implementations: HashMap<String, toml::Value>,
	max_concurrent_dispatches: usize,
	delivery_providers: HashMap<String, toml::Value>,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		let empty = || toml::Value::Table(toml::map::Map::new());
		let mut driver = toml::map::Map::new();
		for (key, value) in [
			("driver_id", "driver-1"),
			("name", "Test Driver"),
			("phone", "+15550100"),
		] {
			driver.insert(key.to_string(), toml::Value::String(value.to_string()));
		}
		let mut internal_fleet = toml::map::Map::new();
		internal_fleet.insert(
			"drivers".to_string(),
			toml::Value::Array(vec![toml::Value::Table(driver)]),
		);
		Self {
			service_id: "tracking-test".to_string(),
			acknowledgment_timeout_seconds: 300,
			recover_on_startup: true,
			storage_primary: "memory".to_string(),
			storage_implementations: HashMap::from([("memory".to_string(), empty())]),
			notification_primary: "log".to_string(),
			notification_implementations: HashMap::from([("log".to_string(), empty())]),
			max_concurrent_dispatches: 8,
			delivery_providers: HashMap::from([(
				"internal".to_string(),
				toml::Value::Table(internal_fleet),
			)]),
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	pub fn acknowledgment_timeout_seconds(mut self, seconds: u64) -> Self {
		self.acknowledgment_timeout_seconds = seconds;
		self
	}

	pub fn recover_on_startup(mut self, enabled: bool) -> Self {
		self.recover_on_startup = enabled;
		self
	}

	/// Adds a storage implementation and makes it primary.
	pub fn storage(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		let name = name.into();
		self.storage_implementations.insert(name.clone(), config);
		self.storage_primary = name;
		self
	}

	/// Adds a notification implementation and makes it primary.
	pub fn notification(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		let name = name.into();
		self.notification_implementations.insert(name.clone(), config);
		self.notification_primary = name;
		self
	}

	pub fn max_concurrent_dispatches(mut self, limit: usize) -> Self {
		self.max_concurrent_dispatches = limit;
		self
	}

	pub fn delivery_provider(mut self, provider: impl Into<String>, config: toml::Value) -> Self {
		self.delivery_providers.insert(provider.into(), config);
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			monitor: MonitorConfig {
				acknowledgment_timeout_seconds: self.acknowledgment_timeout_seconds,
				recover_on_startup: self.recover_on_startup,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: self.storage_implementations,
			},
			notification: NotificationConfig {
				primary: self.notification_primary,
				implementations: self.notification_implementations,
				max_concurrent_dispatches: self.max_concurrent_dispatches,
			},
			delivery: DeliveryConfig {
				providers: self.delivery_providers,
			},
			api: self.api,
		}
	}
}
