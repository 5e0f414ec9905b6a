//! The transition engine.
//!
//! The only writer of tracking records. Every write is a single conditional
//! update: the guard is evaluated against the stored record and the patch is
//! applied only if it holds, so concurrent writers can never both win and a
//! stale caller can never regress an order.

use crate::handlers::NotificationTrigger;
use crate::state::{legal_predecessors, narrow_expected};
use crate::TrackingError;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;
use tracking_storage::{StorageError, StorageService, UpdateOutcome};
use tracking_types::{
	truncate_id, Actor, ItemSubstitution, OrderTracking, OrderTrackingStatus, StatusChange,
	TrackingPatch, UpdateGuard,
};

fn persistence(e: StorageError) -> TrackingError {
	TrackingError::Persistence(e.to_string())
}

pub struct TransitionEngine {
	storage: Arc<StorageService>,
	trigger: Arc<NotificationTrigger>,
}

impl TransitionEngine {
	pub fn new(storage: Arc<StorageService>, trigger: Arc<NotificationTrigger>) -> Self {
		Self { storage, trigger }
	}

	pub async fn get(&self, order_id: &str) -> Result<OrderTracking, TrackingError> {
		self.storage
			.find_one(order_id)
			.await
			.map_err(persistence)?
			.ok_or_else(|| TrackingError::NotFound(order_id.to_string()))
	}

	/// Persists a freshly submitted record and notifies the customer.
	#[instrument(skip_all, fields(order_id = %truncate_id(&record.order_id)))]
	pub async fn init(&self, record: OrderTracking) -> Result<OrderTracking, TrackingError> {
		match self.storage.insert_one(&record).await {
			Ok(()) => {},
			Err(StorageError::AlreadyExists(_)) => {
				return Err(TrackingError::Validation(format!(
					"Tracking already initialized for order {}",
					record.order_id
				)));
			},
			Err(e) => return Err(persistence(e)),
		}
		tracing::info!(
			store_id = %record.store_id,
			provider = %record.delivery_provider,
			"Tracking initialized"
		);
		self.trigger.notify(&record);
		Ok(record)
	}

	/// Moves an order from one of `expected` to `target`.
	pub async fn transition(
		&self,
		order_id: &str,
		expected: &[OrderTrackingStatus],
		target: OrderTrackingStatus,
		actor: Actor,
		notes: Option<String>,
	) -> Result<OrderTracking, TrackingError> {
		self.transition_with(
			UpdateGuard::new(order_id).with_status(expected.iter().copied()),
			TrackingPatch {
				status: Some(StatusChange {
					status: target,
					actor,
					notes,
					metadata: Map::new(),
				}),
				..Default::default()
			},
		)
		.await
	}

	/// General form of [`transition`](Self::transition).
	///
	/// `patch.status` names the target. The guard's expected statuses are
	/// narrowed to the target's legal predecessors (all of them when the
	/// guard leaves the status open); store and provider constraints are
	/// enforced as given.
	#[instrument(skip_all, fields(order_id = %truncate_id(&guard.order_id)))]
	pub async fn transition_with(
		&self,
		mut guard: UpdateGuard,
		patch: TrackingPatch,
	) -> Result<OrderTracking, TrackingError> {
		let Some(change) = &patch.status else {
			return Err(TrackingError::Validation(
				"A transition requires a target status".into(),
			));
		};
		let target = change.status;
		let allowed = match &guard.expected_status {
			Some(expected) => narrow_expected(expected, target),
			None => legal_predecessors(target),
		};

		if allowed.is_empty() {
			// Nothing can match; report against what is stored without writing
			let observed = self.get(&guard.order_id).await?;
			return Err(rejection(&guard, &observed, target));
		}
		guard.expected_status = Some(allowed);

		match self
			.storage
			.conditional_update(&guard, &patch)
			.await
			.map_err(persistence)?
		{
			UpdateOutcome::Applied(record) => {
				let previous = record
					.status_history
					.iter()
					.rev()
					.nth(1)
					.map(|entry| entry.status);
				tracing::info!(
					from = ?previous,
					to = %target,
					actor = %change.actor,
					"Order status updated"
				);
				self.trigger.notify(&record);
				Ok(record)
			},
			UpdateOutcome::Rejected(observed) => {
				tracing::debug!(
					current = %observed.current_status,
					to = %target,
					"Transition guard did not hold"
				);
				Err(rejection(&guard, &observed, target))
			},
			UpdateOutcome::Missing => Err(TrackingError::NotFound(guard.order_id)),
		}
	}

	/// Moves an order to `target` from any status that may legally precede it.
	pub async fn update_status(
		&self,
		order_id: &str,
		target: OrderTrackingStatus,
		actor: Actor,
		notes: Option<String>,
	) -> Result<OrderTracking, TrackingError> {
		self.transition(order_id, &legal_predecessors(target), target, actor, notes)
			.await
	}

	/// Flags items for substitution and replaces the substitution list.
	pub async fn update_substitutions(
		&self,
		order_id: &str,
		substitutions: Vec<ItemSubstitution>,
		actor: Actor,
	) -> Result<OrderTracking, TrackingError> {
		if substitutions.is_empty() {
			return Err(TrackingError::Validation(
				"At least one substitution is required".into(),
			));
		}
		let notes = format!("Substitutions needed for {} items", substitutions.len());
		self.transition_with(
			UpdateGuard::new(order_id),
			TrackingPatch {
				status: Some(StatusChange {
					status: OrderTrackingStatus::SubstitutionsNeeded,
					actor,
					notes: Some(notes),
					metadata: Map::new(),
				}),
				substitutions: Some(substitutions),
				..Default::default()
			},
		)
		.await
	}

	/// Guarded field update that changes no status and appends no history.
	#[instrument(skip_all, fields(order_id = %truncate_id(&guard.order_id)))]
	pub async fn amend(
		&self,
		guard: UpdateGuard,
		patch: TrackingPatch,
	) -> Result<OrderTracking, TrackingError> {
		if patch.status.is_some() {
			return Err(TrackingError::Validation(
				"Status changes must go through a transition".into(),
			));
		}
		match self
			.storage
			.conditional_update(&guard, &patch)
			.await
			.map_err(persistence)?
		{
			UpdateOutcome::Applied(record) => Ok(record),
			UpdateOutcome::Rejected(observed) => Err(amend_rejection(&guard, &observed)),
			UpdateOutcome::Missing => Err(TrackingError::NotFound(guard.order_id)),
		}
	}
}

/// Explains why `guard` does not hold for `observed`.
fn rejection(
	guard: &UpdateGuard,
	observed: &OrderTracking,
	target: OrderTrackingStatus,
) -> TrackingError {
	ownership_mismatch(guard, observed).unwrap_or_else(|| TrackingError::InvalidStateTransition {
		order_id: observed.order_id.clone(),
		current: observed.current_status,
		target,
	})
}

/// Same as [`rejection`] for writes that carry no status change.
fn amend_rejection(guard: &UpdateGuard, observed: &OrderTracking) -> TrackingError {
	ownership_mismatch(guard, observed).unwrap_or_else(|| {
		let expected = guard
			.expected_status
			.as_deref()
			.unwrap_or_default()
			.iter()
			.map(|status| status.as_str())
			.collect::<Vec<_>>()
			.join(", ");
		TrackingError::Validation(format!(
			"Order {} is {}, expected one of: {}",
			observed.order_id, observed.current_status, expected
		))
	})
}

fn ownership_mismatch(guard: &UpdateGuard, observed: &OrderTracking) -> Option<TrackingError> {
	if guard
		.store_id
		.as_ref()
		.is_some_and(|store| *store != observed.store_id)
	{
		return Some(TrackingError::Authorization(format!(
			"Order {} does not belong to store {}",
			observed.order_id,
			guard.store_id.as_deref().unwrap_or_default()
		)));
	}
	guard
		.delivery_provider
		.filter(|p| *p != observed.delivery_provider)
		.map(|provider| {
			TrackingError::Authorization(format!(
				"Order {} is not handled by {}",
				observed.order_id, provider
			))
		})
}

/// History metadata with a single entry.
pub(crate) fn single_entry(key: &str, value: Value) -> Map<String, Value> {
	let mut map = Map::new();
	map.insert(key.to_string(), value);
	map
}
