//! Notification trigger.
//!
//! Fires a customer notification after each committed transition without
//! making the caller wait for it. Dispatch outcomes are logged and dropped;
//! they never feed back into the order's state.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracking_notification::NotificationService;
use tracking_types::{truncate_id, NotificationContext, NotificationRequest, OrderTracking};

/// Metadata key holding the store's display name.
pub const STORE_NAME_KEY: &str = "store_name";
/// Metadata key holding the order total, as a number or decimal string.
pub const ORDER_TOTAL_KEY: &str = "order_total";

pub struct NotificationTrigger {
	notifications: Arc<NotificationService>,
	permits: Arc<Semaphore>,
}

impl NotificationTrigger {
	pub fn new(notifications: Arc<NotificationService>, max_concurrent: usize) -> Self {
		Self {
			notifications,
			permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
		}
	}

	/// Builds the request for the record's current status.
	pub fn request_for(record: &OrderTracking) -> NotificationRequest {
		let driver = record.driver_details.as_ref();
		NotificationRequest {
			notification_id: uuid::Uuid::new_v4().to_string(),
			customer_id: record.customer_id.clone(),
			order_id: record.order_id.clone(),
			status: record.current_status,
			context: NotificationContext {
				store_name: record
					.metadata
					.get(STORE_NAME_KEY)
					.and_then(|v| v.as_str())
					.map(str::to_string),
				order_total: record
					.metadata
					.get(ORDER_TOTAL_KEY)
					.and_then(|v| serde_json::from_value::<Decimal>(v.clone()).ok()),
				eta: record.estimated_delivery_time,
				driver_name: driver.map(|d| d.name.clone()),
				driver_phone: driver.and_then(|d| d.phone.clone()),
			},
		}
	}

	/// Spawns the dispatch and returns immediately.
	///
	/// At most `max_concurrent` dispatches run at once; the rest wait for a
	/// permit inside their own task.
	pub fn notify(&self, record: &OrderTracking) -> JoinHandle<()> {
		let request = Self::request_for(record);
		let notifications = self.notifications.clone();
		let permits = self.permits.clone();

		tokio::spawn(async move {
			let Ok(_permit) = permits.acquire_owned().await else {
				return;
			};
			let started = Utc::now();
			let report = notifications.notify(&request).await;
			tracing::debug!(
				order_id = %truncate_id(&request.order_id),
				status = %request.status,
				sent = report.sent.len(),
				skipped = report.skipped.len(),
				failed = report.failed.len(),
				elapsed_ms = (Utc::now() - started).num_milliseconds(),
				"Notification dispatched"
			);
		})
	}
}
