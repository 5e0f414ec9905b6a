//! Delivery provider types.
//!
//! Requests and responses exchanged with courier integrations when an order
//! is handed off for delivery.

use crate::DriverDetails;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request for a courier to collect an order from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRequest {
	pub order_id: String,
	pub store_id: String,
	pub customer_id: String,
	/// When the store expects the order to be ready, if known.
	pub ready_at: Option<DateTime<Utc>>,
}

/// A courier's answer to a [`DriverRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverAssignment {
	pub driver: DriverDetails,
	pub estimated_pickup_time: Option<DateTime<Utc>>,
	pub estimated_delivery_time: Option<DateTime<Utc>>,
}

/// Payload sent to a courier once an order has been handed to the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfirmation {
	pub order_id: String,
	pub driver_id: Option<String>,
	pub delivered_at: DateTime<Utc>,
	pub proof_of_delivery: Option<Value>,
}
