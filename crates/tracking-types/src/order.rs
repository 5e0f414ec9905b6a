//! Order tracking types.
//!
//! This module defines the persisted tracking record for a grocery order,
//! the lifecycle status set, and the typed guard/patch pair that the storage
//! layer uses to apply conditional updates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a tracked order.
///
/// Serialized in snake_case so persisted records and API payloads share
/// one representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTrackingStatus {
	Submitted,
	StoreNotified,
	StoreAcknowledged,
	PickingInProgress,
	SubstitutionsNeeded,
	SubstitutionsApproved,
	PackingInProgress,
	ReadyForPickup,
	DriverAssigned,
	DriverEnRouteToStore,
	DriverArrivedAtStore,
	DriverPickupComplete,
	InTransit,
	Delivered,
	Failed,
	Cancelled,
}

impl OrderTrackingStatus {
	/// Statuses an order may sit in while the store has not yet responded.
	pub const AWAITING_ACKNOWLEDGMENT: [OrderTrackingStatus; 2] = [
		OrderTrackingStatus::Submitted,
		OrderTrackingStatus::StoreNotified,
	];

	/// Statuses that need store attention on the dashboard.
	pub const ATTENTION_NEEDED: [OrderTrackingStatus; 2] = [
		OrderTrackingStatus::StoreNotified,
		OrderTrackingStatus::SubstitutionsNeeded,
	];

	/// Returns every status in lifecycle order.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Submitted,
			Self::StoreNotified,
			Self::StoreAcknowledged,
			Self::PickingInProgress,
			Self::SubstitutionsNeeded,
			Self::SubstitutionsApproved,
			Self::PackingInProgress,
			Self::ReadyForPickup,
			Self::DriverAssigned,
			Self::DriverEnRouteToStore,
			Self::DriverArrivedAtStore,
			Self::DriverPickupComplete,
			Self::InTransit,
			Self::Delivered,
			Self::Failed,
			Self::Cancelled,
		]
		.into_iter()
	}

	/// Terminal statuses accept no further history entries.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Submitted => "submitted",
			Self::StoreNotified => "store_notified",
			Self::StoreAcknowledged => "store_acknowledged",
			Self::PickingInProgress => "picking_in_progress",
			Self::SubstitutionsNeeded => "substitutions_needed",
			Self::SubstitutionsApproved => "substitutions_approved",
			Self::PackingInProgress => "packing_in_progress",
			Self::ReadyForPickup => "ready_for_pickup",
			Self::DriverAssigned => "driver_assigned",
			Self::DriverEnRouteToStore => "driver_en_route_to_store",
			Self::DriverArrivedAtStore => "driver_arrived_at_store",
			Self::DriverPickupComplete => "driver_pickup_complete",
			Self::InTransit => "in_transit",
			Self::Delivered => "delivered",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
		}
	}
}

impl fmt::Display for OrderTrackingStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderTrackingStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let needle = s.trim().to_ascii_lowercase();
		Self::all()
			.find(|status| status.as_str() == needle)
			.ok_or_else(|| format!("Unknown order status: {}", s))
	}
}

/// Courier integration responsible for an order's delivery leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryProvider {
	Uber,
	Doordash,
	Internal,
}

impl DeliveryProvider {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Uber => "uber",
			Self::Doordash => "doordash",
			Self::Internal => "internal",
		}
	}
}

impl fmt::Display for DeliveryProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for DeliveryProvider {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"uber" => Ok(Self::Uber),
			"doordash" => Ok(Self::Doordash),
			"internal" => Ok(Self::Internal),
			other => Err(format!("Unknown delivery provider: {}", other)),
		}
	}
}

/// Who performed a status change.
///
/// Rendered into the history entry's `updated_by` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
	/// Timers, hooks and other internal callers.
	System,
	/// Staff acting for a store, rendered as `store_<id>`.
	Store(String),
	/// A courier integration, rendered as `delivery_<provider>`.
	Delivery(DeliveryProvider),
	/// An authenticated user identifier, rendered verbatim.
	User(String),
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Actor::System => f.write_str("system"),
			Actor::Store(id) => write!(f, "store_{}", id),
			Actor::Delivery(provider) => write!(f, "delivery_{}", provider),
			Actor::User(id) => f.write_str(id),
		}
	}
}

/// Point-in-time courier position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
	pub latitude: f64,
	pub longitude: f64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accuracy: Option<f64>,
	pub timestamp: DateTime<Utc>,
}

/// Courier identity, contact and vehicle information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverDetails {
	pub driver_id: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vehicle_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vehicle_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub photo_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rating: Option<f32>,
}

/// A store-proposed replacement for an out-of-stock item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSubstitution {
	pub original_item_id: String,
	pub original_item_name: String,
	pub substitute_item_id: String,
	pub substitute_item_name: String,
	pub price_difference: Decimal,
	pub reason: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_approved: Option<bool>,
}

/// Customer contact fields used by store-side search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone: Option<String>,
}

/// A single entry in an order's status history. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
	pub status: OrderTrackingStatus,
	pub timestamp: DateTime<Utc>,
	pub updated_by: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

/// Refund request attached to an order's metadata under [`RefundRequest::METADATA_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
	pub reason: String,
	pub amount: Decimal,
	pub items: Vec<String>,
	pub requested_at: DateTime<Utc>,
	pub status: RefundStatus,
}

impl RefundRequest {
	pub const METADATA_KEY: &'static str = "refund_request";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
	Pending,
}

/// The persisted tracking record for a single order.
///
/// `current_status` always mirrors the last entry of `status_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTracking {
	pub order_id: String,
	pub store_id: String,
	pub customer_id: String,
	pub delivery_provider: DeliveryProvider,
	pub current_status: OrderTrackingStatus,
	pub status_history: Vec<StatusUpdate>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub store_acknowledgment_time: Option<DateTime<Utc>>,
	/// Minutes the store expects to spend preparing the order.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub estimated_preparation_time: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub estimated_pickup_time: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub estimated_delivery_time: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub actual_delivery_time: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub driver_details: Option<DriverDetails>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub driver_location: Option<GeoLocation>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_details: Option<CustomerDetails>,
	#[serde(default)]
	pub substitutions: Vec<ItemSubstitution>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

impl OrderTracking {
	/// Creates a freshly submitted record with a single history entry.
	pub fn submitted(
		order_id: impl Into<String>,
		store_id: impl Into<String>,
		customer_id: impl Into<String>,
		delivery_provider: DeliveryProvider,
		metadata: Map<String, Value>,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			order_id: order_id.into(),
			store_id: store_id.into(),
			customer_id: customer_id.into(),
			delivery_provider,
			current_status: OrderTrackingStatus::Submitted,
			status_history: vec![StatusUpdate {
				status: OrderTrackingStatus::Submitted,
				timestamp: now,
				updated_by: Actor::System.to_string(),
				notes: None,
				metadata: metadata.clone(),
			}],
			created_at: now,
			updated_at: now,
			store_acknowledgment_time: None,
			estimated_preparation_time: None,
			estimated_pickup_time: None,
			estimated_delivery_time: None,
			actual_delivery_time: None,
			driver_details: None,
			driver_location: None,
			customer_details: None,
			substitutions: Vec::new(),
			metadata,
		}
	}

	pub fn last_update(&self) -> Option<&StatusUpdate> {
		self.status_history.last()
	}

	pub fn refund_request(&self) -> Option<RefundRequest> {
		self.metadata
			.get(RefundRequest::METADATA_KEY)
			.and_then(|value| serde_json::from_value(value.clone()).ok())
	}
}

/// Match predicate for a conditional update.
///
/// Every populated constraint must hold against the stored record for the
/// update to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateGuard {
	pub order_id: String,
	/// Required current status. `None` accepts any status.
	pub expected_status: Option<Vec<OrderTrackingStatus>>,
	pub store_id: Option<String>,
	pub delivery_provider: Option<DeliveryProvider>,
}

impl UpdateGuard {
	pub fn new(order_id: impl Into<String>) -> Self {
		Self {
			order_id: order_id.into(),
			expected_status: None,
			store_id: None,
			delivery_provider: None,
		}
	}

	pub fn with_status(mut self, statuses: impl IntoIterator<Item = OrderTrackingStatus>) -> Self {
		self.expected_status = Some(statuses.into_iter().collect());
		self
	}

	pub fn with_store(mut self, store_id: impl Into<String>) -> Self {
		self.store_id = Some(store_id.into());
		self
	}

	pub fn with_provider(mut self, provider: DeliveryProvider) -> Self {
		self.delivery_provider = Some(provider);
		self
	}

	/// Evaluates the guard against a stored record.
	pub fn matches(&self, record: &OrderTracking) -> bool {
		record.order_id == self.order_id
			&& self
				.expected_status
				.as_ref()
				.is_none_or(|set| set.contains(&record.current_status))
			&& self
				.store_id
				.as_ref()
				.is_none_or(|store| *store == record.store_id)
			&& self
				.delivery_provider
				.is_none_or(|provider| provider == record.delivery_provider)
	}
}

/// Status change carried by a [`TrackingPatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
	pub status: OrderTrackingStatus,
	pub actor: Actor,
	pub notes: Option<String>,
	pub metadata: Map<String, Value>,
}

/// Typed write payload for a conditional update.
///
/// Field setters overwrite, metadata entries are merged key by key, and a
/// status change appends exactly one history entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingPatch {
	pub status: Option<StatusChange>,
	pub store_acknowledgment_time: Option<DateTime<Utc>>,
	pub estimated_preparation_time: Option<u32>,
	pub estimated_pickup_time: Option<DateTime<Utc>>,
	pub estimated_delivery_time: Option<DateTime<Utc>>,
	pub actual_delivery_time: Option<DateTime<Utc>>,
	pub driver_details: Option<DriverDetails>,
	pub driver_location: Option<GeoLocation>,
	pub substitutions: Option<Vec<ItemSubstitution>>,
	pub metadata: Map<String, Value>,
}

impl TrackingPatch {
	/// Applies the patch in place.
	///
	/// A new history entry is never stamped earlier than the previous one,
	/// so history timestamps stay non-decreasing under clock skew.
	pub fn apply(&self, record: &mut OrderTracking, now: DateTime<Utc>) {
		let stamp = record
			.last_update()
			.map(|last| last.timestamp.max(now))
			.unwrap_or(now);

		if let Some(change) = &self.status {
			record.current_status = change.status;
			record.status_history.push(StatusUpdate {
				status: change.status,
				timestamp: stamp,
				updated_by: change.actor.to_string(),
				notes: change.notes.clone(),
				metadata: change.metadata.clone(),
			});
		}
		if let Some(at) = self.store_acknowledgment_time {
			record.store_acknowledgment_time = Some(at);
		}
		if let Some(minutes) = self.estimated_preparation_time {
			record.estimated_preparation_time = Some(minutes);
		}
		if let Some(at) = self.estimated_pickup_time {
			record.estimated_pickup_time = Some(at);
		}
		if let Some(at) = self.estimated_delivery_time {
			record.estimated_delivery_time = Some(at);
		}
		if let Some(at) = self.actual_delivery_time {
			record.actual_delivery_time = Some(at);
		}
		if let Some(driver) = &self.driver_details {
			record.driver_details = Some(driver.clone());
		}
		if let Some(location) = &self.driver_location {
			record.driver_location = Some(location.clone());
		}
		if let Some(substitutions) = &self.substitutions {
			record.substitutions = substitutions.clone();
		}
		for (key, value) in &self.metadata {
			record.metadata.insert(key.clone(), value.clone());
		}
		record.updated_at = record.updated_at.max(now);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn record(now: DateTime<Utc>) -> OrderTracking {
		OrderTracking::submitted("O1", "S1", "C1", DeliveryProvider::Internal, Map::new(), now)
	}

	#[test]
	fn test_status_round_trips_through_str() {
		for status in OrderTrackingStatus::all() {
			assert_eq!(status.as_str().parse::<OrderTrackingStatus>(), Ok(status));
		}
		assert!("bogus".parse::<OrderTrackingStatus>().is_err());
	}

	#[test]
	fn test_status_serializes_snake_case() {
		let json = serde_json::to_string(&OrderTrackingStatus::DriverEnRouteToStore).unwrap();
		assert_eq!(json, "\"driver_en_route_to_store\"");
	}

	#[test]
	fn test_actor_rendering() {
		assert_eq!(Actor::System.to_string(), "system");
		assert_eq!(Actor::Store("S1".into()).to_string(), "store_S1");
		assert_eq!(
			Actor::Delivery(DeliveryProvider::Doordash).to_string(),
			"delivery_doordash"
		);
		assert_eq!(Actor::User("u-42".into()).to_string(), "u-42");
	}

	#[test]
	fn test_guard_checks_every_constraint() {
		let rec = record(Utc::now());
		assert!(UpdateGuard::new("O1").matches(&rec));
		assert!(UpdateGuard::new("O1")
			.with_status([OrderTrackingStatus::Submitted])
			.with_store("S1")
			.with_provider(DeliveryProvider::Internal)
			.matches(&rec));
		assert!(!UpdateGuard::new("O2").matches(&rec));
		assert!(!UpdateGuard::new("O1")
			.with_status([OrderTrackingStatus::StoreNotified])
			.matches(&rec));
		assert!(!UpdateGuard::new("O1").with_store("S2").matches(&rec));
		assert!(!UpdateGuard::new("O1")
			.with_provider(DeliveryProvider::Uber)
			.matches(&rec));
	}

	#[test]
	fn test_patch_appends_single_entry_with_clamped_timestamp() {
		let created = Utc::now();
		let mut rec = record(created);
		let patch = TrackingPatch {
			status: Some(StatusChange {
				status: OrderTrackingStatus::StoreAcknowledged,
				actor: Actor::Store("S1".into()),
				notes: None,
				metadata: Map::new(),
			}),
			estimated_preparation_time: Some(15),
			..Default::default()
		};

		// Clock stepped backwards
		patch.apply(&mut rec, created - Duration::seconds(30));

		assert_eq!(rec.current_status, OrderTrackingStatus::StoreAcknowledged);
		assert_eq!(rec.status_history.len(), 2);
		assert_eq!(rec.status_history[1].updated_by, "store_S1");
		assert_eq!(rec.status_history[1].timestamp, created);
		assert_eq!(rec.estimated_preparation_time, Some(15));
	}

	#[test]
	fn test_patch_without_status_leaves_history_alone() {
		let mut rec = record(Utc::now());
		let mut metadata = Map::new();
		metadata.insert("note".into(), Value::String("x".into()));
		let patch = TrackingPatch {
			metadata,
			..Default::default()
		};

		patch.apply(&mut rec, Utc::now());

		assert_eq!(rec.status_history.len(), 1);
		assert_eq!(rec.metadata.get("note"), Some(&Value::String("x".into())));
	}
}
