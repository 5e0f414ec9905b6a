//! Startup recovery of acknowledgment timers.
//!
//! Timers live in memory, so a restart loses them. Recovery scans the stored
//! orders and re-arms a timer for every order still waiting on its store,
//! using the time left from the original deadline. Orders whose deadline has
//! already passed fire immediately.

use crate::monitoring::AcknowledgmentMonitor;
use crate::TrackingError;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::instrument;
use tracking_storage::StorageService;
use tracking_types::{remaining_until, truncate_id, OrderTracking, OrderTrackingStatus, StorageKey};

/// Outcome of a recovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
	/// Orders read from storage.
	pub scanned: usize,
	/// Timers re-armed with time remaining.
	pub rearmed: usize,
	/// Orders already past their deadline, expired right away.
	pub overdue: usize,
}

pub struct RecoveryService {
	storage: Arc<StorageService>,
	monitor: Arc<AcknowledgmentMonitor>,
}

impl RecoveryService {
	pub fn new(storage: Arc<StorageService>, monitor: Arc<AcknowledgmentMonitor>) -> Self {
		Self { storage, monitor }
	}

	#[instrument(skip_all)]
	pub async fn recover(&self) -> Result<RecoveryReport, TrackingError> {
		let orders: Vec<OrderTracking> = self
			.storage
			.retrieve_all(StorageKey::Orders.as_str())
			.await
			.map_err(|e| TrackingError::Persistence(e.to_string()))?;

		let mut report = RecoveryReport {
			scanned: orders.len(),
			..Default::default()
		};
		let timeout = Duration::from_std(self.monitor.timeout())
			.map_err(|e| TrackingError::Validation(e.to_string()))?;
		let now = Utc::now();

		for order in orders
			.iter()
			.filter(|o| OrderTrackingStatus::AWAITING_ACKNOWLEDGMENT.contains(&o.current_status))
		{
			let remaining = remaining_until(order.created_at + timeout, now);
			if remaining.is_zero() {
				report.overdue += 1;
			} else {
				report.rearmed += 1;
			}
			tracing::debug!(
				order_id = %truncate_id(&order.order_id),
				remaining_secs = remaining.as_secs(),
				"Re-arming acknowledgment timer"
			);
			self.monitor.schedule(&order.order_id, remaining);
		}

		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::TransitionEngine;
	use crate::test_support::{storage, trigger, RecordingNotifier};
	use serde_json::Map;
	use tracking_types::{Actor, DeliveryProvider};

	fn order(id: &str, age_secs: i64) -> OrderTracking {
		OrderTracking::submitted(
			id,
			"S1",
			"C1",
			DeliveryProvider::Internal,
			Map::new(),
			Utc::now() - Duration::seconds(age_secs),
		)
	}

	#[tokio::test(start_paused = true)]
	async fn test_recover_rearms_waiting_orders() {
		let storage = storage();
		let engine = Arc::new(TransitionEngine::new(
			storage.clone(),
			trigger(Arc::new(RecordingNotifier::default())),
		));
		let monitor = Arc::new(AcknowledgmentMonitor::new(
			engine.clone(),
			std::time::Duration::from_secs(300),
		));

		engine.init(order("fresh", 10)).await.unwrap();
		engine.init(order("stale", 900)).await.unwrap();
		engine.init(order("done", 10)).await.unwrap();
		engine
			.update_status("done", OrderTrackingStatus::StoreAcknowledged, Actor::System, None)
			.await
			.unwrap();

		let report = RecoveryService::new(storage, monitor.clone())
			.recover()
			.await
			.unwrap();
		assert_eq!(
			report,
			RecoveryReport {
				scanned: 3,
				rearmed: 1,
				overdue: 1,
			}
		);
		assert_eq!(monitor.pending(), 2);

		tokio::time::sleep(std::time::Duration::from_secs(1)).await;
		assert_eq!(
			engine.get("stale").await.unwrap().current_status,
			OrderTrackingStatus::Failed
		);
		assert_eq!(
			engine.get("fresh").await.unwrap().current_status,
			OrderTrackingStatus::Submitted
		);

		tokio::time::sleep(std::time::Duration::from_secs(300)).await;
		assert_eq!(
			engine.get("fresh").await.unwrap().current_status,
			OrderTrackingStatus::Failed
		);
		assert_eq!(
			engine.get("done").await.unwrap().current_status,
			OrderTrackingStatus::StoreAcknowledged
		);
	}
}
