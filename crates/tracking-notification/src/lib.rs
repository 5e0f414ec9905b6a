//! Notification dispatch module for the order tracking service.
//!
//! Dispatchers deliver per-status customer messages over one or more
//! channels and report per-channel outcomes. The tracking engine treats
//! dispatch as best effort: a failing dispatcher is logged and never affects
//! the order's state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracking_types::{
	truncate_id, ChannelFailure, ConfigSchema, DispatchReport, Field, FieldType,
	ImplementationRegistry, NotificationChannel, NotificationRequest,
};

/// Re-export implementations
pub mod implementations {
	pub mod log;
	pub mod webhook;
}
pub mod templates;

/// Errors that can occur during notification dispatch.
#[derive(Debug, Error)]
pub enum NotificationError {
	#[error("Transport error: {0}")]
	Transport(String),
	#[error("Internal error: {0}")]
	Internal(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Interface every notification dispatcher implements.
#[async_trait]
pub trait NotificationInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Sends one notification over every channel the dispatcher handles.
	///
	/// Per-channel problems belong in the returned report. `Err` is reserved
	/// for failures that prevented any attempt at all.
	async fn dispatch(
		&self,
		request: &NotificationRequest,
	) -> Result<DispatchReport, NotificationError>;
}

pub type NotificationFactory =
	fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotificationError>;

pub trait NotificationRegistry: ImplementationRegistry<Factory = NotificationFactory> {}

/// Get all registered notification implementations.
pub fn get_all_implementations() -> Vec<(&'static str, NotificationFactory)> {
	use implementations::{log, webhook};

	vec![
		(log::Registry::NAME, log::Registry::factory()),
		(webhook::Registry::NAME, webhook::Registry::factory()),
	]
}

/// Schema field shared by dispatchers: the subset of channels to use.
pub(crate) fn channels_field() -> Field {
	Field::new("channels", FieldType::Array(Box::new(FieldType::String))).with_validator(|v| {
		let items = v.as_array().map(Vec::as_slice).unwrap_or_default();
		for item in items {
			let name = item.as_str().unwrap_or_default();
			if parse_channel(name).is_none() {
				return Err(format!("unknown channel '{}'", name));
			}
		}
		Ok(())
	})
}

fn parse_channel(name: &str) -> Option<NotificationChannel> {
	NotificationChannel::all().find(|c| c.to_string() == name)
}

/// Reads `channels` from an implementation table, defaulting to all channels.
pub(crate) fn configured_channels(config: &toml::Value) -> Vec<NotificationChannel> {
	match config.get("channels").and_then(|v| v.as_array()) {
		Some(items) => items
			.iter()
			.filter_map(|v| v.as_str())
			.filter_map(parse_channel)
			.collect(),
		None => NotificationChannel::all().collect(),
	}
}

/// Service wrapping the configured dispatcher.
///
/// `notify` never returns an error. A dispatcher error is logged and turned
/// into a report in which every channel failed.
pub struct NotificationService {
	implementations: HashMap<String, Arc<dyn NotificationInterface>>,
	primary_implementation: String,
}

impl NotificationService {
	pub fn new(
		implementations: HashMap<String, Arc<dyn NotificationInterface>>,
		primary_implementation: String,
	) -> Result<Self, NotificationError> {
		if !implementations.contains_key(&primary_implementation) {
			return Err(NotificationError::Configuration(format!(
				"Primary implementation '{}' not found in available implementations",
				primary_implementation
			)));
		}

		Ok(Self {
			implementations,
			primary_implementation,
		})
	}

	/// Convenience constructor for a single dispatcher.
	pub fn single(name: impl Into<String>, implementation: Arc<dyn NotificationInterface>) -> Self {
		let name = name.into();
		Self {
			implementations: HashMap::from([(name.clone(), implementation)]),
			primary_implementation: name,
		}
	}

	pub async fn notify(&self, request: &NotificationRequest) -> DispatchReport {
		let Some(implementation) = self.implementations.get(&self.primary_implementation) else {
			tracing::error!(
				implementation = %self.primary_implementation,
				"Primary notification implementation not available"
			);
			return all_failed("dispatcher unavailable");
		};

		match implementation.dispatch(request).await {
			Ok(report) => {
				for failure in &report.failed {
					tracing::warn!(
						order_id = %truncate_id(&request.order_id),
						channel = %failure.channel,
						reason = %failure.reason,
						"Notification channel failed"
					);
				}
				report
			},
			Err(e) => {
				tracing::warn!(
					order_id = %truncate_id(&request.order_id),
					status = %request.status,
					error = %e,
					"Notification dispatch failed"
				);
				all_failed(&e.to_string())
			},
		}
	}
}

fn all_failed(reason: &str) -> DispatchReport {
	DispatchReport {
		failed: NotificationChannel::all()
			.map(|channel| ChannelFailure {
				channel,
				reason: reason.to_string(),
			})
			.collect(),
		..Default::default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tracking_types::{NotificationContext, OrderTrackingStatus, Schema, ValidationError};

	struct Broken;

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, _config: &toml::Value) -> Result<(), ValidationError> {
			Ok(())
		}
	}

	#[async_trait]
	impl NotificationInterface for Broken {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}

		async fn dispatch(
			&self,
			_request: &NotificationRequest,
		) -> Result<DispatchReport, NotificationError> {
			Err(NotificationError::Transport("connection reset".into()))
		}
	}

	fn request() -> NotificationRequest {
		NotificationRequest {
			notification_id: "n1".into(),
			customer_id: "C1".into(),
			order_id: "O1".into(),
			status: OrderTrackingStatus::Delivered,
			context: NotificationContext::default(),
		}
	}

	#[tokio::test]
	async fn test_dispatcher_error_becomes_failed_report() {
		let service = NotificationService::single("broken", Arc::new(Broken));
		let report = service.notify(&request()).await;
		assert!(report.sent.is_empty());
		assert_eq!(report.failed.len(), 4);
		assert!(report.failed[0].reason.contains("connection reset"));
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let result = NotificationService::new(HashMap::new(), "log".into());
		assert!(matches!(result, Err(NotificationError::Configuration(_))));
	}

	#[test]
	fn test_channels_field_validation() {
		let schema = Schema::new(vec![], vec![channels_field()]);
		let ok: toml::Value = toml::from_str("channels = [\"sms\", \"push\"]").unwrap();
		assert!(schema.validate(&ok).is_ok());
		assert_eq!(
			configured_channels(&ok),
			vec![NotificationChannel::Sms, NotificationChannel::Push]
		);

		let bad: toml::Value = toml::from_str("channels = [\"fax\"]").unwrap();
		assert!(schema.validate(&bad).is_err());

		let empty: toml::Value = toml::from_str("").unwrap();
		assert_eq!(configured_channels(&empty).len(), 4);
	}
}
