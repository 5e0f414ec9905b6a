//! Store management facade.
//!
//! Store-side actions on an order. Each one loads the record and checks
//! ownership first so callers get a precise 404 or 403; the engine guard
//! re-checks the store id, so a stale pre-check can only cause a rejected
//! write, never a wrong one. Listing, search and dashboard queries live here
//! as well.

use crate::engine::transition::single_entry;
use crate::engine::TransitionEngine;
use crate::monitoring::AcknowledgmentMonitor;
use crate::TrackingError;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Map;
use std::sync::Arc;
use tracing::instrument;
use tracking_storage::{StorageError, StorageService};
use tracking_types::{
	start_of_day, truncate_id, Actor, DashboardSummary, OrderQuery, OrderTracking,
	OrderTrackingStatus, PageRequest, Paged, RecentSearch, RefundRequest, RefundStatus,
	SearchHistory, SearchHistoryEntry, SearchType, StatusChange, StorageKey, TextSearch,
	TrackingPatch, UpdateGuard,
};

fn persistence(e: StorageError) -> TrackingError {
	TrackingError::Persistence(e.to_string())
}

pub struct StoreManager {
	engine: Arc<TransitionEngine>,
	storage: Arc<StorageService>,
	monitor: Arc<AcknowledgmentMonitor>,
}

impl StoreManager {
	pub fn new(
		engine: Arc<TransitionEngine>,
		storage: Arc<StorageService>,
		monitor: Arc<AcknowledgmentMonitor>,
	) -> Self {
		Self {
			engine,
			storage,
			monitor,
		}
	}

	/// Loads the order and checks that `store_id` owns it.
	async fn owned(&self, order_id: &str, store_id: &str) -> Result<OrderTracking, TrackingError> {
		let record = self.engine.get(order_id).await?;
		if record.store_id != store_id {
			return Err(TrackingError::Authorization(format!(
				"Order {} does not belong to store {}",
				order_id, store_id
			)));
		}
		Ok(record)
	}

	async fn store_transition(
		&self,
		order_id: &str,
		store_id: &str,
		expected: &[OrderTrackingStatus],
		patch: TrackingPatch,
	) -> Result<OrderTracking, TrackingError> {
		self.owned(order_id, store_id).await?;
		self.engine
			.transition_with(
				UpdateGuard::new(order_id)
					.with_status(expected.iter().copied())
					.with_store(store_id),
				patch,
			)
			.await
	}

	fn status(target: OrderTrackingStatus, store_id: &str, notes: String) -> Option<StatusChange> {
		Some(StatusChange {
			status: target,
			actor: Actor::Store(store_id.to_string()),
			notes: Some(notes),
			metadata: Map::new(),
		})
	}

	/// Acknowledges a new order and records the preparation estimate.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), store_id = %store_id))]
	pub async fn accept_order(
		&self,
		order_id: &str,
		store_id: &str,
		estimated_preparation_minutes: u32,
	) -> Result<OrderTracking, TrackingError> {
		if estimated_preparation_minutes == 0 {
			return Err(TrackingError::Validation(
				"Estimated preparation time must be positive".into(),
			));
		}
		let record = self
			.store_transition(
				order_id,
				store_id,
				&OrderTrackingStatus::AWAITING_ACKNOWLEDGMENT,
				TrackingPatch {
					status: Self::status(
						OrderTrackingStatus::StoreAcknowledged,
						store_id,
						format!(
							"Accepted, ready in about {} minutes",
							estimated_preparation_minutes
						),
					),
					store_acknowledgment_time: Some(Utc::now()),
					estimated_preparation_time: Some(estimated_preparation_minutes),
					..Default::default()
				},
			)
			.await?;
		self.monitor.cancel(order_id);
		Ok(record)
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), store_id = %store_id))]
	pub async fn reject_order(
		&self,
		order_id: &str,
		store_id: &str,
		reason: &str,
	) -> Result<OrderTracking, TrackingError> {
		let reason = reason.trim();
		if reason.is_empty() {
			return Err(TrackingError::Validation("A rejection reason is required".into()));
		}
		let record = self
			.store_transition(
				order_id,
				store_id,
				&[
					OrderTrackingStatus::StoreNotified,
					OrderTrackingStatus::Submitted,
				],
				TrackingPatch {
					status: Self::status(
						OrderTrackingStatus::Cancelled,
						store_id,
						format!("Rejected by store: {}", reason),
					),
					..Default::default()
				},
			)
			.await?;
		self.monitor.cancel(order_id);
		Ok(record)
	}

	pub async fn start_order_preparation(
		&self,
		order_id: &str,
		store_id: &str,
	) -> Result<OrderTracking, TrackingError> {
		self.store_transition(
			order_id,
			store_id,
			&[OrderTrackingStatus::StoreAcknowledged],
			TrackingPatch {
				status: Self::status(
					OrderTrackingStatus::PickingInProgress,
					store_id,
					"Order preparation started".to_string(),
				),
				..Default::default()
			},
		)
		.await
	}

	pub async fn mark_order_ready(
		&self,
		order_id: &str,
		store_id: &str,
	) -> Result<OrderTracking, TrackingError> {
		self.store_transition(
			order_id,
			store_id,
			&[
				OrderTrackingStatus::PickingInProgress,
				OrderTrackingStatus::SubstitutionsApproved,
				OrderTrackingStatus::PackingInProgress,
			],
			TrackingPatch {
				status: Self::status(
					OrderTrackingStatus::ReadyForPickup,
					store_id,
					"Order ready for pickup".to_string(),
				),
				..Default::default()
			},
		)
		.await
	}

	/// Attaches a pending refund request. The order's status is unchanged.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), store_id = %store_id))]
	pub async fn request_refund(
		&self,
		order_id: &str,
		store_id: &str,
		reason: &str,
		amount: Decimal,
		items: Vec<String>,
	) -> Result<OrderTracking, TrackingError> {
		if reason.trim().is_empty() {
			return Err(TrackingError::Validation("A refund reason is required".into()));
		}
		if amount <= Decimal::ZERO {
			return Err(TrackingError::Validation("Refund amount must be positive".into()));
		}
		self.owned(order_id, store_id).await?;

		let refund = RefundRequest {
			reason: reason.trim().to_string(),
			amount,
			items,
			requested_at: Utc::now(),
			status: RefundStatus::Pending,
		};
		let value = serde_json::to_value(&refund)
			.map_err(|e| TrackingError::Persistence(e.to_string()))?;
		let record = self
			.engine
			.amend(
				UpdateGuard::new(order_id).with_store(store_id),
				TrackingPatch {
					metadata: single_entry(RefundRequest::METADATA_KEY, value),
					..Default::default()
				},
			)
			.await?;
		tracing::info!(%amount, "Refund requested");
		Ok(record)
	}

	/// Lists the store's orders, newest first.
	pub async fn get_store_orders(
		&self,
		store_id: &str,
		mut query: OrderQuery,
		page: PageRequest,
	) -> Result<Paged<OrderTracking>, TrackingError> {
		query.store_id = Some(store_id.to_string());
		self.storage.find(&query, page).await.map_err(persistence)
	}

	/// Free-text search over the store's orders. The search is recorded in
	/// the store's history.
	pub async fn search_orders(
		&self,
		store_id: &str,
		text: &str,
		search_type: SearchType,
		page: PageRequest,
	) -> Result<Paged<OrderTracking>, TrackingError> {
		let text = text.trim();
		if text.is_empty() {
			return Err(TrackingError::Validation("Search query cannot be empty".into()));
		}

		let entry = SearchHistoryEntry {
			query: text.to_string(),
			search_type,
			timestamp: Utc::now(),
		};
		let recorded = self
			.storage
			.upsert(
				StorageKey::SearchHistory.as_str(),
				store_id,
				|history: &mut SearchHistory| {
					history.store_id = store_id.to_string();
					history.record(entry.clone());
				},
			)
			.await;
		if let Err(e) = recorded {
			tracing::warn!(store_id = %store_id, error = %e, "Failed to record search history");
		}

		let query = OrderQuery {
			search: Some(TextSearch {
				query: text.to_string(),
				search_type,
			}),
			..OrderQuery::for_store(store_id)
		};
		self.storage.find(&query, page).await.map_err(persistence)
	}

	/// The store's recent searches grouped by query text.
	pub async fn recent_searches(
		&self,
		store_id: &str,
		limit: usize,
	) -> Result<Vec<RecentSearch>, TrackingError> {
		match self
			.storage
			.retrieve::<SearchHistory>(StorageKey::SearchHistory.as_str(), store_id)
			.await
		{
			Ok(history) => Ok(history.recent(limit)),
			Err(StorageError::NotFound) => Ok(Vec::new()),
			Err(e) => Err(persistence(e)),
		}
	}

	pub async fn dashboard_summary(&self, store_id: &str) -> Result<DashboardSummary, TrackingError> {
		let status_counts = self
			.storage
			.aggregate_status_counts(&OrderQuery::for_store(store_id))
			.await
			.map_err(persistence)?;
		let today_orders = self
			.storage
			.count(&OrderQuery {
				created_from: Some(start_of_day(Utc::now())),
				..OrderQuery::for_store(store_id)
			})
			.await
			.map_err(persistence)?;

		let attention_needed = OrderTrackingStatus::ATTENTION_NEEDED
			.iter()
			.filter_map(|status| status_counts.get(status))
			.sum();
		Ok(DashboardSummary {
			total_orders: status_counts.values().sum(),
			status_counts,
			today_orders,
			attention_needed,
		})
	}
}
