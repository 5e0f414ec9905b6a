//! Tracking service facade.
//!
//! [`TrackingService`] owns the transition engine and wires it to the
//! acknowledgment monitor, the delivery coordinator and the store manager.
//! HTTP handlers and the binary talk to this type only.

pub mod lifecycle;
pub mod transition;

pub use transition::TransitionEngine;

use crate::handlers::{DeliveryCoordinator, NotificationTrigger, StoreManager};
use crate::monitoring::AcknowledgmentMonitor;
use crate::TrackingError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use tracking_config::Config;
use tracking_delivery::DeliveryService;
use tracking_notification::NotificationService;
use tracking_storage::StorageService;
use tracking_types::{
	truncate_id, Actor, InitTrackingRequest, ItemSubstitution, OrderTracking, OrderTrackingStatus,
};

#[derive(Clone)]
pub struct TrackingService {
	pub(crate) config: Config,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) engine: Arc<TransitionEngine>,
	pub(crate) monitor: Arc<AcknowledgmentMonitor>,
	pub(crate) delivery: Arc<DeliveryCoordinator>,
	pub(crate) store: Arc<StoreManager>,
}

impl TrackingService {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		delivery: Arc<DeliveryService>,
		notifications: Arc<NotificationService>,
	) -> Self {
		let trigger = Arc::new(NotificationTrigger::new(
			notifications,
			config.notification.max_concurrent_dispatches,
		));
		let engine = Arc::new(TransitionEngine::new(storage.clone(), trigger));
		let monitor = Arc::new(AcknowledgmentMonitor::new(
			engine.clone(),
			Duration::from_secs(config.monitor.acknowledgment_timeout_seconds),
		));
		let delivery = Arc::new(DeliveryCoordinator::new(engine.clone(), delivery));
		let store = Arc::new(StoreManager::new(
			engine.clone(),
			storage.clone(),
			monitor.clone(),
		));

		Self {
			config,
			storage,
			engine,
			monitor,
			delivery,
			store,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn engine(&self) -> &Arc<TransitionEngine> {
		&self.engine
	}

	pub fn monitor(&self) -> &Arc<AcknowledgmentMonitor> {
		&self.monitor
	}

	pub fn delivery(&self) -> &Arc<DeliveryCoordinator> {
		&self.delivery
	}

	pub fn store(&self) -> &Arc<StoreManager> {
		&self.store
	}

	/// Starts tracking a new order and arms its acknowledgment timer.
	#[instrument(skip_all, fields(order_id = %truncate_id(&request.order_id)))]
	pub async fn init_tracking(
		&self,
		request: InitTrackingRequest,
	) -> Result<OrderTracking, TrackingError> {
		for (field, value) in [
			("order_id", &request.order_id),
			("store_id", &request.store_id),
			("customer_id", &request.customer_id),
		] {
			if value.trim().is_empty() {
				return Err(TrackingError::Validation(format!("{} is required", field)));
			}
		}

		let mut record = OrderTracking::submitted(
			request.order_id,
			request.store_id,
			request.customer_id,
			request.delivery_provider,
			request.metadata,
			Utc::now(),
		);
		record.customer_details = request.customer_details;

		let record = self.engine.init(record).await?;
		self.monitor
			.schedule(&record.order_id, self.monitor.timeout());
		Ok(record)
	}

	pub async fn get_tracking(&self, order_id: &str) -> Result<OrderTracking, TrackingError> {
		self.engine.get(order_id).await
	}

	/// Generic status update from any legal predecessor of `status`.
	///
	/// Leaving the acknowledgment window releases the order's timer.
	pub async fn update_status(
		&self,
		order_id: &str,
		status: OrderTrackingStatus,
		actor: Actor,
		notes: Option<String>,
	) -> Result<OrderTracking, TrackingError> {
		let record = self
			.engine
			.update_status(order_id, status, actor, notes)
			.await?;
		self.release_timer(&record);
		Ok(record)
	}

	/// Store acknowledgment through the tracking API.
	pub async fn store_acknowledge(
		&self,
		order_id: &str,
		store_id: &str,
		estimated_preparation_minutes: u32,
	) -> Result<OrderTracking, TrackingError> {
		self.store
			.accept_order(order_id, store_id, estimated_preparation_minutes)
			.await
	}

	pub async fn update_substitutions(
		&self,
		order_id: &str,
		substitutions: Vec<ItemSubstitution>,
		actor: Actor,
	) -> Result<OrderTracking, TrackingError> {
		let record = self
			.engine
			.update_substitutions(order_id, substitutions, actor)
			.await?;
		self.release_timer(&record);
		Ok(record)
	}

	fn release_timer(&self, record: &OrderTracking) {
		if !OrderTrackingStatus::AWAITING_ACKNOWLEDGMENT.contains(&record.current_status) {
			self.monitor.cancel(&record.order_id);
		}
	}
}
