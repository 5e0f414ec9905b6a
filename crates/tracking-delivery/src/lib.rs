//! Delivery provider integration for the order tracking service.
//!
//! Each configured provider (`uber`, `doordash`, `internal`) is backed by an
//! adapter that can find a driver for a ready order, report where that driver
//! is, and receive confirmation once the order has been handed over.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracking_types::{
	ConfigSchema, DeliveryConfirmation, DeliveryProvider, DriverAssignment, DriverRequest,
	GeoLocation, ImplementationRegistry,
};

/// Re-export implementations
pub mod implementations {
	pub mod courier;
	pub mod internal;
}

/// Errors that can occur during delivery provider operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Error that occurs while talking to the provider.
	#[error("Network error: {0}")]
	Network(String),
	/// The provider answered but refused or could not serve the request.
	#[error("Provider rejected request: {0}")]
	Rejected(String),
	/// No adapter is configured for the requested provider.
	#[error("No adapter configured for provider {0}")]
	NoProviderAvailable(DeliveryProvider),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for delivery provider adapters.
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	/// Returns the configuration schema for this adapter.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Asks the provider to dispatch a driver to the store.
	async fn request_driver(
		&self,
		request: &DriverRequest,
	) -> Result<DriverAssignment, DeliveryError>;

	/// Current position of the driver carrying an order.
	async fn driver_location(
		&self,
		order_id: &str,
		driver_id: &str,
	) -> Result<GeoLocation, DeliveryError>;

	/// Tells the provider that the order reached the customer.
	async fn confirm_delivery(
		&self,
		confirmation: &DeliveryConfirmation,
	) -> Result<(), DeliveryError>;
}

/// Type alias for delivery factory functions.
pub type DeliveryFactory = fn(&toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError>;

/// Registry trait for delivery implementations.
pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// Get all registered delivery adapters.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::{courier, internal};

	vec![
		(courier::Registry::NAME, courier::Registry::factory()),
		(internal::Registry::NAME, internal::Registry::factory()),
	]
}

/// Routes delivery calls to the adapter configured for each provider.
pub struct DeliveryService {
	providers: HashMap<DeliveryProvider, Arc<dyn DeliveryInterface>>,
}

impl DeliveryService {
	pub fn new(providers: HashMap<DeliveryProvider, Arc<dyn DeliveryInterface>>) -> Self {
		Self { providers }
	}

	pub fn supports(&self, provider: DeliveryProvider) -> bool {
		self.providers.contains_key(&provider)
	}

	fn adapter(
		&self,
		provider: DeliveryProvider,
	) -> Result<&Arc<dyn DeliveryInterface>, DeliveryError> {
		self.providers
			.get(&provider)
			.ok_or(DeliveryError::NoProviderAvailable(provider))
	}

	pub async fn request_driver(
		&self,
		provider: DeliveryProvider,
		request: &DriverRequest,
	) -> Result<DriverAssignment, DeliveryError> {
		let assignment = self.adapter(provider)?.request_driver(request).await?;
		tracing::debug!(
			order_id = %request.order_id,
			%provider,
			driver_id = %assignment.driver.driver_id,
			"Driver requested"
		);
		Ok(assignment)
	}

	pub async fn driver_location(
		&self,
		provider: DeliveryProvider,
		order_id: &str,
		driver_id: &str,
	) -> Result<GeoLocation, DeliveryError> {
		self.adapter(provider)?
			.driver_location(order_id, driver_id)
			.await
	}

	pub async fn confirm_delivery(
		&self,
		provider: DeliveryProvider,
		confirmation: &DeliveryConfirmation,
	) -> Result<(), DeliveryError> {
		self.adapter(provider)?.confirm_delivery(confirmation).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::internal::InternalFleet;
	use tracking_types::DriverDetails;

	fn fleet() -> Arc<dyn DeliveryInterface> {
		Arc::new(InternalFleet::new(
			vec![DriverDetails {
				driver_id: "d1".into(),
				name: "Sam".into(),
				phone: None,
				vehicle_type: None,
				vehicle_id: None,
				photo_url: None,
				rating: None,
			}],
			None,
			15,
			30,
		))
	}

	#[tokio::test]
	async fn test_routes_to_configured_provider() {
		let service =
			DeliveryService::new(HashMap::from([(DeliveryProvider::Internal, fleet())]));
		assert!(service.supports(DeliveryProvider::Internal));
		assert!(!service.supports(DeliveryProvider::Uber));

		let request = DriverRequest {
			order_id: "O1".into(),
			store_id: "S1".into(),
			customer_id: "C1".into(),
			ready_at: None,
		};
		let assignment = service
			.request_driver(DeliveryProvider::Internal, &request)
			.await
			.unwrap();
		assert_eq!(assignment.driver.driver_id, "d1");

		let err = service
			.request_driver(DeliveryProvider::Uber, &request)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			DeliveryError::NoProviderAvailable(DeliveryProvider::Uber)
		));
	}
}
