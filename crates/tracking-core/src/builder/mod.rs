//! Builder for assembling a tracking service from configuration.
//!
//! Storage, notification and delivery implementations are picked by name
//! from factory maps, so the binary decides which implementations exist and
//! the config decides which ones run.

use crate::engine::TrackingService;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracking_config::Config;
use tracking_delivery::{DeliveryError, DeliveryInterface, DeliveryService};
use tracking_notification::{NotificationError, NotificationInterface, NotificationService};
use tracking_storage::{StorageError, StorageInterface, StorageService};
use tracking_types::DeliveryProvider;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct TrackingFactories<SF, NF, DF> {
	pub storage_factories: HashMap<String, SF>,
	pub notification_factories: HashMap<String, NF>,
	pub delivery_factories: HashMap<String, DF>,
}

pub struct TrackingBuilder {
	config: Config,
}

impl TrackingBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build<SF, NF, DF>(
		self,
		factories: TrackingFactories<SF, NF, DF>,
	) -> Result<TrackingService, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		NF: Fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotificationError>,
		DF: Fn(&toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError>,
	{
		// Storage: only the primary backend is used
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			let Some(factory) = factories.storage_factories.get(name) else {
				tracing::warn!(component = "storage", implementation = %name, "Unknown implementation, skipping");
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					let is_primary = &self.config.storage.primary == name;
					tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					storage_impls.insert(name.clone(), implementation);
				},
				Err(e) => {
					tracing::error!(
						component = "storage",
						implementation = %name,
						error = %e,
						"Failed to create storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create storage implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// Notification dispatchers
		let mut notification_impls: HashMap<String, Arc<dyn NotificationInterface>> =
			HashMap::new();
		for (name, config) in &self.config.notification.implementations {
			let Some(factory) = factories.notification_factories.get(name) else {
				tracing::warn!(component = "notification", implementation = %name, "Unknown implementation, skipping");
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					let is_primary = &self.config.notification.primary == name;
					tracing::info!(component = "notification", implementation = %name, enabled = %is_primary, "Loaded");
					notification_impls.insert(name.clone(), Arc::from(implementation));
				},
				Err(e) => {
					tracing::error!(
						component = "notification",
						implementation = %name,
						error = %e,
						"Failed to create notification implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create notification implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		let notifications = NotificationService::new(
			notification_impls,
			self.config.notification.primary.clone(),
		)
		.map_err(|e| BuilderError::MissingComponent(e.to_string()))?;

		// Delivery adapters, one per configured provider
		let mut delivery_impls: HashMap<DeliveryProvider, Arc<dyn DeliveryInterface>> =
			HashMap::new();
		for (key, config) in &self.config.delivery.providers {
			let provider: DeliveryProvider = key
				.parse()
				.map_err(|e: String| BuilderError::Config(e))?;
			let adapter = self
				.config
				.delivery
				.adapter_for(provider)
				.ok_or_else(|| BuilderError::Config(format!("No adapter for provider '{}'", key)))?;
			let factory = factories.delivery_factories.get(&adapter).ok_or_else(|| {
				BuilderError::Config(format!(
					"Unknown delivery adapter '{}' for provider '{}'",
					adapter, key
				))
			})?;
			match factory(config) {
				Ok(implementation) => {
					tracing::info!(component = "delivery", %provider, %adapter, "Loaded");
					delivery_impls.insert(provider, Arc::from(implementation));
				},
				Err(e) => {
					tracing::error!(
						component = "delivery",
						%provider,
						%adapter,
						error = %e,
						"Failed to create delivery adapter"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create delivery adapter for '{}': {}",
						key, e
					)));
				},
			}
		}

		if delivery_impls.is_empty() {
			tracing::warn!("No delivery providers configured; assignments need an explicit driver");
		}

		Ok(TrackingService::new(
			self.config,
			storage,
			Arc::new(DeliveryService::new(delivery_impls)),
			Arc::new(notifications),
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tracking_config::builders::config::ConfigBuilder;
	use tracking_types::OrderTrackingStatus;

	fn factories() -> TrackingFactories<
		tracking_storage::StorageFactory,
		tracking_notification::NotificationFactory,
		tracking_delivery::DeliveryFactory,
	> {
		TrackingFactories {
			storage_factories: tracking_storage::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
			notification_factories: tracking_notification::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
			delivery_factories: tracking_delivery::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_build_from_default_config() {
		let service = TrackingBuilder::new(ConfigBuilder::new().build())
			.build(factories())
			.unwrap();
		service
			.init_tracking(crate::test_support::init_request("O1", "S1"))
			.await
			.unwrap();
		let record = service.get_tracking("O1").await.unwrap();
		assert_eq!(record.current_status, OrderTrackingStatus::Submitted);
	}

	#[test]
	fn test_missing_primary_storage() {
		let mut config = ConfigBuilder::new().build();
		config.storage.primary = "redis".to_string();
		let Err(err) = TrackingBuilder::new(config).build(factories()) else {
			panic!("expected build failure");
		};
		assert!(matches!(err, BuilderError::MissingComponent(_)));
	}

	#[test]
	fn test_unknown_provider_rejected() {
		let config = ConfigBuilder::new()
			.delivery_provider("bicycle", toml::Value::Table(Default::default()))
			.build();
		let Err(err) = TrackingBuilder::new(config).build(factories()) else {
			panic!("expected build failure");
		};
		assert!(matches!(err, BuilderError::Config(_)));
	}
}
