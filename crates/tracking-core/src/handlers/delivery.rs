//! Delivery coordinator.
//!
//! Handles the courier leg of an order: driver assignment, driver location
//! updates and delivery completion. State changes go through the engine with
//! the provider pinned in the guard, so one courier cannot move another
//! courier's order.

use crate::engine::transition::single_entry;
use crate::engine::TransitionEngine;
use crate::TrackingError;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;
use tracking_delivery::DeliveryService;
use tracking_types::{
	truncate_id, Actor, DeliveryConfirmation, DeliveryProvider, DriverDetails, DriverRequest,
	GeoLocation, OrderTracking, OrderTrackingStatus, StatusChange, TrackingPatch, UpdateGuard,
};

/// Statuses in which a driver is carrying the order.
const LOCATION_TRACKED: [OrderTrackingStatus; 2] = [
	OrderTrackingStatus::DriverPickupComplete,
	OrderTrackingStatus::InTransit,
];

pub struct DeliveryCoordinator {
	engine: Arc<TransitionEngine>,
	delivery: Arc<DeliveryService>,
}

impl DeliveryCoordinator {
	pub fn new(engine: Arc<TransitionEngine>, delivery: Arc<DeliveryService>) -> Self {
		Self { engine, delivery }
	}

	/// Assigns a driver to a ready order.
	///
	/// Without an explicit driver, the provider's adapter is asked for one.
	/// Caller-supplied estimates take precedence over the adapter's.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), %provider))]
	pub async fn assign_delivery(
		&self,
		order_id: &str,
		provider: DeliveryProvider,
		driver: Option<DriverDetails>,
		estimated_pickup_time: Option<DateTime<Utc>>,
		estimated_delivery_time: Option<DateTime<Utc>>,
	) -> Result<OrderTracking, TrackingError> {
		let (driver, pickup, delivery) = match driver {
			Some(driver) => (driver, estimated_pickup_time, estimated_delivery_time),
			None => {
				// Only bother the courier for an order that can take a driver
				let record = self.engine.get(order_id).await?;
				if record.current_status != OrderTrackingStatus::ReadyForPickup {
					return Err(TrackingError::InvalidStateTransition {
						order_id: record.order_id,
						current: record.current_status,
						target: OrderTrackingStatus::DriverAssigned,
					});
				}
				if record.delivery_provider != provider {
					return Err(TrackingError::Authorization(format!(
						"Order {} is not handled by {}",
						record.order_id, provider
					)));
				}
				let request = DriverRequest {
					order_id: record.order_id.clone(),
					store_id: record.store_id.clone(),
					customer_id: record.customer_id.clone(),
					ready_at: record.last_update().map(|entry| entry.timestamp),
				};
				let assignment = self
					.delivery
					.request_driver(provider, &request)
					.await
					.map_err(|e| TrackingError::Provider(e.to_string()))?;
				(
					assignment.driver,
					estimated_pickup_time.or(assignment.estimated_pickup_time),
					estimated_delivery_time.or(assignment.estimated_delivery_time),
				)
			},
		};

		let metadata = single_entry("driver_id", Value::from(driver.driver_id.clone()));
		self.engine
			.transition_with(
				UpdateGuard::new(order_id)
					.with_status([OrderTrackingStatus::ReadyForPickup])
					.with_provider(provider),
				TrackingPatch {
					status: Some(StatusChange {
						status: OrderTrackingStatus::DriverAssigned,
						actor: Actor::Delivery(provider),
						notes: Some(format!("Driver {} assigned", driver.name)),
						metadata,
					}),
					driver_details: Some(driver),
					estimated_pickup_time: pickup,
					estimated_delivery_time: delivery,
					..Default::default()
				},
			)
			.await
	}

	/// Records the driver's position. Appends no history.
	pub async fn update_driver_location(
		&self,
		order_id: &str,
		provider: DeliveryProvider,
		location: GeoLocation,
	) -> Result<OrderTracking, TrackingError> {
		self.engine
			.amend(
				UpdateGuard::new(order_id)
					.with_status(LOCATION_TRACKED)
					.with_provider(provider),
				TrackingPatch {
					driver_location: Some(location),
					..Default::default()
				},
			)
			.await
	}

	/// Asks the order's provider where its driver is and records the answer.
	pub async fn poll_driver_location(
		&self,
		order_id: &str,
	) -> Result<OrderTracking, TrackingError> {
		let record = self.engine.get(order_id).await?;
		let driver_id = record
			.driver_details
			.as_ref()
			.map(|driver| driver.driver_id.clone())
			.ok_or_else(|| {
				TrackingError::Validation(format!("Order {} has no assigned driver", order_id))
			})?;
		let location = self
			.delivery
			.driver_location(record.delivery_provider, order_id, &driver_id)
			.await
			.map_err(|e| TrackingError::Provider(e.to_string()))?;
		self.update_driver_location(order_id, record.delivery_provider, location)
			.await
	}

	/// Closes the order as delivered and confirms with the provider out of band.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), %provider))]
	pub async fn mark_delivered(
		&self,
		order_id: &str,
		provider: DeliveryProvider,
		proof_of_delivery: Option<Value>,
	) -> Result<OrderTracking, TrackingError> {
		let now = Utc::now();
		let metadata = match &proof_of_delivery {
			Some(proof) => single_entry("proof_of_delivery", proof.clone()),
			None => Map::new(),
		};
		let record = self
			.engine
			.transition_with(
				UpdateGuard::new(order_id)
					.with_status([OrderTrackingStatus::InTransit])
					.with_provider(provider),
				TrackingPatch {
					status: Some(StatusChange {
						status: OrderTrackingStatus::Delivered,
						actor: Actor::Delivery(provider),
						notes: Some("Order delivered".to_string()),
						metadata,
					}),
					actual_delivery_time: Some(now),
					..Default::default()
				},
			)
			.await?;

		self.spawn_completion_hook(&record, proof_of_delivery);
		Ok(record)
	}

	fn spawn_completion_hook(&self, record: &OrderTracking, proof_of_delivery: Option<Value>) {
		let delivery = self.delivery.clone();
		let provider = record.delivery_provider;
		let confirmation = DeliveryConfirmation {
			order_id: record.order_id.clone(),
			driver_id: record.driver_details.as_ref().map(|d| d.driver_id.clone()),
			delivered_at: record.actual_delivery_time.unwrap_or_else(Utc::now),
			proof_of_delivery,
		};

		tokio::spawn(async move {
			if !delivery.supports(provider) {
				tracing::debug!(%provider, "No adapter configured, skipping delivery confirmation");
				return;
			}
			match delivery.confirm_delivery(provider, &confirmation).await {
				Ok(()) => tracing::info!(
					order_id = %truncate_id(&confirmation.order_id),
					%provider,
					"Delivery confirmed with provider"
				),
				Err(e) => tracing::warn!(
					order_id = %truncate_id(&confirmation.order_id),
					%provider,
					error = %e,
					"Delivery confirmation failed"
				),
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use crate::test_support::{
		driver, init_request, service, service_with, AcceptAll, RecordingNotifier,
	};
	use crate::{TrackingError, TrackingService};
	use async_trait::async_trait;
	use chrono::Utc;
	use serde_json::json;
	use std::collections::HashMap;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;
	use tokio::sync::mpsc;
	use tracking_delivery::{DeliveryError, DeliveryInterface};
	use tracking_types::{
		Actor, ConfigSchema, DeliveryConfirmation, DeliveryProvider, DriverAssignment,
		DriverRequest, GeoLocation, OrderTrackingStatus,
	};

	/// Courier double that forwards confirmations to a channel.
	struct ConfirmingCourier {
		confirmations: mpsc::UnboundedSender<DeliveryConfirmation>,
	}

	#[async_trait]
	impl DeliveryInterface for ConfirmingCourier {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(AcceptAll)
		}

		async fn request_driver(
			&self,
			_request: &DriverRequest,
		) -> Result<DriverAssignment, DeliveryError> {
			Err(DeliveryError::Network("courier offline".into()))
		}

		async fn driver_location(
			&self,
			_order_id: &str,
			_driver_id: &str,
		) -> Result<GeoLocation, DeliveryError> {
			Ok(GeoLocation {
				latitude: 10.0,
				longitude: 20.0,
				accuracy: None,
				timestamp: Utc::now(),
			})
		}

		async fn confirm_delivery(
			&self,
			confirmation: &DeliveryConfirmation,
		) -> Result<(), DeliveryError> {
			let _ = self.confirmations.send(confirmation.clone());
			Ok(())
		}
	}

	/// Courier double that counts driver requests.
	#[derive(Default)]
	struct CountingCourier {
		requests: AtomicUsize,
	}

	#[async_trait]
	impl DeliveryInterface for CountingCourier {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(AcceptAll)
		}

		async fn request_driver(
			&self,
			_request: &DriverRequest,
		) -> Result<DriverAssignment, DeliveryError> {
			self.requests.fetch_add(1, Ordering::SeqCst);
			Ok(DriverAssignment {
				driver: driver("u1"),
				estimated_pickup_time: None,
				estimated_delivery_time: None,
			})
		}

		async fn driver_location(
			&self,
			_order_id: &str,
			_driver_id: &str,
		) -> Result<GeoLocation, DeliveryError> {
			Err(DeliveryError::Network("no location".into()))
		}

		async fn confirm_delivery(
			&self,
			_confirmation: &DeliveryConfirmation,
		) -> Result<(), DeliveryError> {
			Ok(())
		}
	}

	async fn advance(service: &TrackingService, order_id: &str, path: &[OrderTrackingStatus]) {
		for status in path {
			service
				.engine()
				.update_status(order_id, *status, Actor::System, None)
				.await
				.unwrap();
		}
	}

	const TO_READY: [OrderTrackingStatus; 3] = [
		OrderTrackingStatus::StoreAcknowledged,
		OrderTrackingStatus::PickingInProgress,
		OrderTrackingStatus::ReadyForPickup,
	];

	const TO_PICKUP: [OrderTrackingStatus; 3] = [
		OrderTrackingStatus::DriverEnRouteToStore,
		OrderTrackingStatus::DriverArrivedAtStore,
		OrderTrackingStatus::DriverPickupComplete,
	];

	#[tokio::test]
	async fn test_assign_requests_driver_from_adapter() {
		let service = service();
		service.init_tracking(init_request("O1", "S1")).await.unwrap();
		advance(&service, "O1", &TO_READY).await;

		let record = service
			.delivery()
			.assign_delivery("O1", DeliveryProvider::Internal, None, None, None)
			.await
			.unwrap();

		assert_eq!(record.current_status, OrderTrackingStatus::DriverAssigned);
		assert_eq!(record.driver_details.as_ref().unwrap().driver_id, "d1");
		assert!(record.estimated_delivery_time.is_some());
		let last = record.status_history.last().unwrap();
		assert_eq!(last.updated_by, "delivery_internal");
		assert_eq!(last.metadata["driver_id"], "d1");
	}

	#[tokio::test]
	async fn test_assign_before_ready_is_rejected() {
		let service = service();
		service.init_tracking(init_request("O1", "S1")).await.unwrap();

		let err = service
			.delivery()
			.assign_delivery("O1", DeliveryProvider::Internal, None, None, None)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			TrackingError::InvalidStateTransition {
				current: OrderTrackingStatus::Submitted,
				..
			}
		));
	}

	#[tokio::test]
	async fn test_foreign_courier_is_not_asked_for_driver() {
		let courier = Arc::new(CountingCourier::default());
		let uber: Arc<dyn DeliveryInterface> = courier.clone();
		let service = service_with(
			Arc::new(RecordingNotifier::default()),
			HashMap::from([(DeliveryProvider::Uber, uber)]),
		);
		service.init_tracking(init_request("O1", "S1")).await.unwrap();
		advance(&service, "O1", &TO_READY).await;

		let err = service
			.delivery()
			.assign_delivery("O1", DeliveryProvider::Uber, None, None, None)
			.await
			.unwrap_err();
		assert!(matches!(err, TrackingError::Authorization(_)));
		assert_eq!(courier.requests.load(Ordering::SeqCst), 0);
		assert_eq!(
			service.get_tracking("O1").await.unwrap().current_status,
			OrderTrackingStatus::ReadyForPickup
		);
	}

	#[tokio::test]
	async fn test_provider_failure_surfaces_as_provider_error() {
		let (tx, _rx) = mpsc::unbounded_channel();
		let courier: Arc<dyn DeliveryInterface> = Arc::new(ConfirmingCourier { confirmations: tx });
		let service = service_with(
			Arc::new(RecordingNotifier::default()),
			HashMap::from([(DeliveryProvider::Internal, courier)]),
		);
		service.init_tracking(init_request("O1", "S1")).await.unwrap();
		advance(&service, "O1", &TO_READY).await;

		let err = service
			.delivery()
			.assign_delivery("O1", DeliveryProvider::Internal, None, None, None)
			.await
			.unwrap_err();
		assert!(matches!(err, TrackingError::Provider(_)));
		assert_eq!(
			service.get_tracking("O1").await.unwrap().current_status,
			OrderTrackingStatus::ReadyForPickup
		);
	}

	#[tokio::test]
	async fn test_location_updates_require_matching_provider_and_status() {
		let service = service();
		service.init_tracking(init_request("O1", "S1")).await.unwrap();
		advance(&service, "O1", &TO_READY).await;
		let location = GeoLocation {
			latitude: 1.5,
			longitude: 2.5,
			accuracy: Some(3.0),
			timestamp: Utc::now(),
		};

		// Not yet picked up
		let err = service
			.delivery()
			.update_driver_location("O1", DeliveryProvider::Internal, location.clone())
			.await
			.unwrap_err();
		let TrackingError::Validation(message) = err else {
			panic!("expected validation error, got {:?}", err);
		};
		assert!(message.contains("ready_for_pickup"));
		assert!(message.contains("driver_pickup_complete, in_transit"));

		service
			.delivery()
			.assign_delivery("O1", DeliveryProvider::Internal, Some(driver("d9")), None, None)
			.await
			.unwrap();
		advance(&service, "O1", &TO_PICKUP).await;
		let before = service.get_tracking("O1").await.unwrap().status_history.len();

		let record = service
			.delivery()
			.update_driver_location("O1", DeliveryProvider::Internal, location.clone())
			.await
			.unwrap();
		assert_eq!(record.driver_location, Some(location.clone()));
		assert_eq!(record.status_history.len(), before);

		let err = service
			.delivery()
			.update_driver_location("O1", DeliveryProvider::Doordash, location)
			.await
			.unwrap_err();
		assert!(matches!(err, TrackingError::Authorization(_)));
	}

	#[tokio::test]
	async fn test_poll_driver_location_uses_adapter() {
		let service = service();
		service.init_tracking(init_request("O1", "S1")).await.unwrap();
		advance(&service, "O1", &TO_READY).await;
		service
			.delivery()
			.assign_delivery("O1", DeliveryProvider::Internal, None, None, None)
			.await
			.unwrap();
		advance(&service, "O1", &TO_PICKUP).await;

		let record = service.delivery().poll_driver_location("O1").await.unwrap();
		let location = record.driver_location.unwrap();
		assert_eq!((location.latitude, location.longitude), (1.0, 2.0));
	}

	#[tokio::test]
	async fn test_mark_delivered_confirms_out_of_band() {
		let (tx, mut rx) = mpsc::unbounded_channel();
		let courier: Arc<dyn DeliveryInterface> = Arc::new(ConfirmingCourier { confirmations: tx });
		let service = service_with(
			Arc::new(RecordingNotifier::default()),
			HashMap::from([(DeliveryProvider::Internal, courier)]),
		);
		service.init_tracking(init_request("O1", "S1")).await.unwrap();
		advance(&service, "O1", &TO_READY).await;
		service
			.delivery()
			.assign_delivery("O1", DeliveryProvider::Internal, Some(driver("d7")), None, None)
			.await
			.unwrap();
		advance(&service, "O1", &TO_PICKUP).await;
		advance(&service, "O1", &[OrderTrackingStatus::InTransit]).await;

		let record = service
			.delivery()
			.mark_delivered("O1", DeliveryProvider::Internal, Some(json!({"photo": "p.jpg"})))
			.await
			.unwrap();
		assert_eq!(record.current_status, OrderTrackingStatus::Delivered);
		assert!(record.actual_delivery_time.is_some());
		assert_eq!(
			record.status_history.last().unwrap().metadata["proof_of_delivery"]["photo"],
			"p.jpg"
		);

		let confirmation = rx.recv().await.unwrap();
		assert_eq!(confirmation.order_id, "O1");
		assert_eq!(confirmation.driver_id.as_deref(), Some("d7"));

		// A repeated completion fails at the guard
		let err = service
			.delivery()
			.mark_delivered("O1", DeliveryProvider::Internal, None)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			TrackingError::InvalidStateTransition {
				current: OrderTrackingStatus::Delivered,
				..
			}
		));
	}
}
