//! Store acknowledgment SLA monitor.
//!
//! Each new order gets a timer. When it fires, the order is failed through
//! the same guarded transition as any other writer, so a timer that fires
//! after the store has already answered changes nothing. Cancellation only
//! releases the task early.

use crate::engine::TransitionEngine;
use crate::TrackingError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracking_types::{truncate_id, Actor, OrderTrackingStatus};

pub const TIMEOUT_NOTE: &str = "Store acknowledgment timeout";

struct Job {
	id: u64,
	token: CancellationToken,
}

pub struct AcknowledgmentMonitor {
	engine: Arc<TransitionEngine>,
	jobs: Arc<DashMap<String, Job>>,
	next_job: AtomicU64,
	timeout: Duration,
}

impl AcknowledgmentMonitor {
	pub fn new(engine: Arc<TransitionEngine>, timeout: Duration) -> Self {
		Self {
			engine,
			jobs: Arc::new(DashMap::new()),
			next_job: AtomicU64::new(0),
			timeout,
		}
	}

	/// Configured acknowledgment SLA.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Number of timers still armed.
	pub fn pending(&self) -> usize {
		self.jobs.len()
	}

	/// Arms a timer that fails the order after `delay` unless the store has
	/// acknowledged it by then. Re-scheduling an order replaces its timer.
	pub fn schedule(&self, order_id: &str, delay: Duration) -> JoinHandle<()> {
		let id = self.next_job.fetch_add(1, Ordering::Relaxed);
		let token = CancellationToken::new();
		if let Some(previous) = self.jobs.insert(
			order_id.to_string(),
			Job {
				id,
				token: token.clone(),
			},
		) {
			previous.token.cancel();
		}

		let engine = self.engine.clone();
		let jobs = self.jobs.clone();
		let order_id = order_id.to_string();
		tracing::debug!(
			order_id = %truncate_id(&order_id),
			delay_secs = delay.as_secs(),
			"Acknowledgment timer armed"
		);

		tokio::spawn(async move {
			tokio::select! {
				_ = token.cancelled() => {
					tracing::debug!(order_id = %truncate_id(&order_id), "Acknowledgment timer cancelled");
				}
				_ = tokio::time::sleep(delay) => {
					expire(&engine, &order_id).await;
				}
			}
			jobs.remove_if(&order_id, |_, job| job.id == id);
		})
	}

	/// Releases the order's timer, if any.
	pub fn cancel(&self, order_id: &str) -> bool {
		match self.jobs.remove(order_id) {
			Some((_, job)) => {
				job.token.cancel();
				true
			},
			None => false,
		}
	}

	pub fn cancel_all(&self) {
		let mut count = 0usize;
		self.jobs.retain(|_, job| {
			job.token.cancel();
			count += 1;
			false
		});
		if count > 0 {
			tracing::info!(count, "Cancelled acknowledgment timers");
		}
	}
}

async fn expire(engine: &TransitionEngine, order_id: &str) {
	match engine
		.transition(
			order_id,
			&OrderTrackingStatus::AWAITING_ACKNOWLEDGMENT,
			OrderTrackingStatus::Failed,
			Actor::System,
			Some(TIMEOUT_NOTE.to_string()),
		)
		.await
	{
		Ok(_) => {
			let escalation = TrackingError::AcknowledgmentTimeout(order_id.to_string());
			tracing::warn!(
				order_id = %truncate_id(order_id),
				error = %escalation,
				"Order failed on acknowledgment timeout"
			);
		},
		Err(TrackingError::InvalidStateTransition { current, .. }) => {
			tracing::debug!(
				order_id = %truncate_id(order_id),
				%current,
				"Order already acknowledged, timeout ignored"
			);
		},
		Err(TrackingError::NotFound(_)) => {
			tracing::debug!(order_id = %truncate_id(order_id), "Order gone, timeout ignored");
		},
		Err(e) => {
			tracing::error!(
				order_id = %truncate_id(order_id),
				error = %e,
				"Failed to apply acknowledgment timeout"
			);
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{storage, trigger, RecordingNotifier};
	use chrono::Utc;
	use serde_json::Map;
	use tracking_types::{DeliveryProvider, OrderTracking};

	async fn monitor() -> AcknowledgmentMonitor {
		let engine = Arc::new(TransitionEngine::new(
			storage(),
			trigger(Arc::new(RecordingNotifier::default())),
		));
		for id in ["O1", "O2"] {
			engine
				.init(OrderTracking::submitted(
					id,
					"S1",
					"C1",
					DeliveryProvider::Internal,
					Map::new(),
					Utc::now(),
				))
				.await
				.unwrap();
		}
		AcknowledgmentMonitor::new(engine, Duration::from_secs(300))
	}

	#[tokio::test(start_paused = true)]
	async fn test_expiry_fails_unacknowledged_order() {
		let monitor = monitor().await;
		monitor.schedule("O2", monitor.timeout()).await.unwrap();

		let record = monitor.engine.get("O2").await.unwrap();
		assert_eq!(record.current_status, OrderTrackingStatus::Failed);
		let last = record.status_history.last().unwrap();
		assert_eq!(last.notes.as_deref(), Some(TIMEOUT_NOTE));
		assert_eq!(last.updated_by, "system");
		assert_eq!(monitor.pending(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_late_fire_after_acknowledgment_is_noop() {
		let monitor = monitor().await;
		let handle = monitor.schedule("O1", Duration::from_secs(300));

		monitor
			.engine
			.transition(
				"O1",
				&OrderTrackingStatus::AWAITING_ACKNOWLEDGMENT,
				OrderTrackingStatus::StoreAcknowledged,
				Actor::Store("S1".into()),
				None,
			)
			.await
			.unwrap();
		handle.await.unwrap();

		let record = monitor.engine.get("O1").await.unwrap();
		assert_eq!(record.current_status, OrderTrackingStatus::StoreAcknowledged);
		assert_eq!(record.status_history.len(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_releases_timer() {
		let monitor = monitor().await;
		let handle = monitor.schedule("O1", Duration::from_secs(300));
		assert_eq!(monitor.pending(), 1);

		assert!(monitor.cancel("O1"));
		assert!(!monitor.cancel("O1"));
		handle.await.unwrap();

		let record = monitor.engine.get("O1").await.unwrap();
		assert_eq!(record.current_status, OrderTrackingStatus::Submitted);
	}

	#[tokio::test(start_paused = true)]
	async fn test_reschedule_replaces_timer() {
		let monitor = monitor().await;
		let first = monitor.schedule("O1", Duration::from_secs(300));
		let second = monitor.schedule("O1", Duration::from_secs(10));
		first.await.unwrap();
		assert_eq!(monitor.pending(), 1);

		second.await.unwrap();
		assert_eq!(monitor.pending(), 0);
		let record = monitor.engine.get("O1").await.unwrap();
		assert_eq!(record.current_status, OrderTrackingStatus::Failed);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_all() {
		let monitor = monitor().await;
		let handles = [
			monitor.schedule("O1", Duration::from_secs(300)),
			monitor.schedule("O2", Duration::from_secs(300)),
		];
		monitor.cancel_all();
		for handle in handles {
			handle.await.unwrap();
		}
		assert_eq!(monitor.pending(), 0);
		assert_eq!(
			monitor.engine.get("O2").await.unwrap().current_status,
			OrderTrackingStatus::Submitted
		);
	}
}
