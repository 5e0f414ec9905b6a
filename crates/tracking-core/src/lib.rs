//! Order lifecycle coordination for the tracking service.
//!
//! The [`TrackingService`] ties together the transition engine, the store
//! acknowledgment monitor, the delivery coordinator, the store management
//! facade and the notification trigger. Every state change funnels through
//! the engine's conditional update; everything else reads, decides and asks
//! the engine to write.

use thiserror::Error;
use tracking_types::{APIError, OrderTrackingStatus};

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod monitoring;
pub mod recovery;
pub mod state;

pub use builder::{BuilderError, TrackingBuilder, TrackingFactories};
pub use engine::{TrackingService, TransitionEngine};
pub use handlers::{DeliveryCoordinator, NotificationTrigger, StoreManager};
pub use monitoring::AcknowledgmentMonitor;
pub use recovery::{RecoveryReport, RecoveryService};

/// Errors surfaced by tracking operations.
#[derive(Debug, Error)]
pub enum TrackingError {
	#[error("Order not found: {0}")]
	NotFound(String),
	/// The order's observed status does not permit the requested change.
	#[error("Invalid state transition for order {order_id}: {current} -> {target}")]
	InvalidStateTransition {
		order_id: String,
		current: OrderTrackingStatus,
		target: OrderTrackingStatus,
	},
	/// The caller does not own the order.
	#[error("Not authorized: {0}")]
	Authorization(String),
	/// Raised when the SLA timer fails an order; logged as an escalation.
	#[error("Store did not acknowledge order {0} in time")]
	AcknowledgmentTimeout(String),
	#[error("Delivery provider error: {0}")]
	Provider(String),
	#[error("Persistence error: {0}")]
	Persistence(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<TrackingError> for APIError {
	fn from(err: TrackingError) -> Self {
		let message = err.to_string();
		match err {
			TrackingError::NotFound(_) => APIError::NotFound {
				error_type: "ORDER_NOT_FOUND".to_string(),
				message,
			},
			TrackingError::InvalidStateTransition {
				current, target, ..
			} => APIError::BadRequest {
				error_type: "INVALID_STATE_TRANSITION".to_string(),
				message,
				details: Some(serde_json::json!({
					"current_status": current,
					"target_status": target,
				})),
			},
			TrackingError::Validation(_) => APIError::BadRequest {
				error_type: "VALIDATION_ERROR".to_string(),
				message,
				details: None,
			},
			TrackingError::Authorization(_) => APIError::Forbidden {
				error_type: "FORBIDDEN".to_string(),
				message,
			},
			TrackingError::Provider(_) => APIError::BadGateway {
				error_type: "DELIVERY_PROVIDER_ERROR".to_string(),
				message,
			},
			TrackingError::AcknowledgmentTimeout(_) | TrackingError::Persistence(_) => {
				APIError::InternalServerError {
					error_type: "INTERNAL_ERROR".to_string(),
					message,
				}
			},
		}
	}
}

#[cfg(test)]
pub(crate) mod test_support {
	//! Shared fixtures for the crate's tests.

	use crate::{NotificationTrigger, TrackingService};
	use async_trait::async_trait;
	use std::collections::HashMap;
	use std::sync::{Arc, Mutex};
	use tracking_config::builders::config::ConfigBuilder;
	use tracking_delivery::{
		implementations::internal::InternalFleet, DeliveryInterface, DeliveryService,
	};
	use tracking_notification::{NotificationError, NotificationInterface, NotificationService};
	use tracking_storage::{implementations::memory::MemoryStorage, StorageService};
	use tracking_types::{
		ConfigSchema, DeliveryProvider, DispatchReport, DriverDetails, InitTrackingRequest,
		NotificationRequest, ValidationError,
	};

	pub struct AcceptAll;

	impl ConfigSchema for AcceptAll {
		fn validate(&self, _config: &toml::Value) -> Result<(), ValidationError> {
			Ok(())
		}
	}

	/// Records every request and optionally fails.
	#[derive(Default)]
	pub struct RecordingNotifier {
		pub requests: Mutex<Vec<NotificationRequest>>,
		pub fail: bool,
	}

	#[async_trait]
	impl NotificationInterface for RecordingNotifier {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(AcceptAll)
		}

		async fn dispatch(
			&self,
			request: &NotificationRequest,
		) -> Result<DispatchReport, NotificationError> {
			if let Ok(mut requests) = self.requests.lock() {
				requests.push(request.clone());
			}
			if self.fail {
				return Err(NotificationError::Transport("smtp down".into()));
			}
			Ok(DispatchReport::default())
		}
	}

	pub fn driver(id: &str) -> DriverDetails {
		DriverDetails {
			driver_id: id.to_string(),
			name: "Sam".to_string(),
			phone: Some("+15550100".to_string()),
			vehicle_type: None,
			vehicle_id: None,
			photo_url: None,
			rating: None,
		}
	}

	pub fn init_request(order_id: &str, store_id: &str) -> InitTrackingRequest {
		InitTrackingRequest {
			order_id: order_id.to_string(),
			store_id: store_id.to_string(),
			customer_id: "C1".to_string(),
			delivery_provider: DeliveryProvider::Internal,
			customer_details: None,
			metadata: Default::default(),
		}
	}

	pub fn trigger(notifier: Arc<dyn NotificationInterface>) -> Arc<NotificationTrigger> {
		Arc::new(NotificationTrigger::new(
			Arc::new(NotificationService::single("test", notifier)),
			4,
		))
	}

	pub fn storage() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	/// Service over memory storage with the given delivery adapters.
	pub fn service_with(
		notifier: Arc<dyn NotificationInterface>,
		adapters: HashMap<DeliveryProvider, Arc<dyn DeliveryInterface>>,
	) -> TrackingService {
		let config = ConfigBuilder::new().build();
		TrackingService::new(
			config,
			storage(),
			Arc::new(DeliveryService::new(adapters)),
			Arc::new(NotificationService::single("test", notifier)),
		)
	}

	pub fn service() -> TrackingService {
		let fleet: Arc<dyn DeliveryInterface> =
			Arc::new(InternalFleet::new(vec![driver("d1")], Some((1.0, 2.0)), 15, 30));
		service_with(
			Arc::new(RecordingNotifier::default()),
			HashMap::from([(DeliveryProvider::Internal, fleet)]),
		)
	}
}
