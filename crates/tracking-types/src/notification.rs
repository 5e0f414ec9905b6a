//! Notification dispatch types.
//!
//! The tracking engine builds a [`NotificationRequest`] after every committed
//! transition. Dispatchers answer with a [`DispatchReport`] describing what
//! happened on each channel.

use crate::OrderTrackingStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery channel for a customer notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
	Email,
	Sms,
	Whatsapp,
	Push,
}

impl NotificationChannel {
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Email, Self::Sms, Self::Whatsapp, Self::Push].into_iter()
	}
}

impl fmt::Display for NotificationChannel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Email => "email",
			Self::Sms => "sms",
			Self::Whatsapp => "whatsapp",
			Self::Push => "push",
		};
		f.write_str(name)
	}
}

/// Display values used to render templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationContext {
	pub store_name: Option<String>,
	pub order_total: Option<Decimal>,
	pub eta: Option<DateTime<Utc>>,
	pub driver_name: Option<String>,
	pub driver_phone: Option<String>,
}

/// A single status notification for one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
	pub notification_id: String,
	pub customer_id: String,
	pub order_id: String,
	pub status: OrderTrackingStatus,
	pub context: NotificationContext,
}

/// Rendered title and body for a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
	pub title: String,
	pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFailure {
	pub channel: NotificationChannel,
	pub reason: String,
}

/// Per-channel outcome of a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
	pub sent: Vec<NotificationChannel>,
	pub skipped: Vec<NotificationChannel>,
	pub failed: Vec<ChannelFailure>,
}

impl DispatchReport {
	pub fn has_failures(&self) -> bool {
		!self.failed.is_empty()
	}
}
