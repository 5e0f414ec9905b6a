//! Logging dispatcher.
//!
//! Renders every enabled channel and writes it to the log instead of sending
//! it. Intended for development and for deployments where an external
//! process tails the logs.

use crate::{
	channels_field, configured_channels, templates, NotificationError, NotificationFactory,
	NotificationInterface, NotificationRegistry,
};
use async_trait::async_trait;
use tracking_types::{
	truncate_id, ConfigSchema, DispatchReport, ImplementationRegistry, NotificationChannel,
	NotificationRequest, Schema, ValidationError,
};

pub struct LogNotifier {
	channels: Vec<NotificationChannel>,
}

impl LogNotifier {
	pub fn new(channels: Vec<NotificationChannel>) -> Self {
		Self { channels }
	}
}

#[async_trait]
impl NotificationInterface for LogNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogNotifierSchema)
	}

	async fn dispatch(
		&self,
		request: &NotificationRequest,
	) -> Result<DispatchReport, NotificationError> {
		let content = templates::content_for(request.status, &request.context);
		let mut report = DispatchReport::default();
		for channel in NotificationChannel::all() {
			if !self.channels.contains(&channel) {
				report.skipped.push(channel);
				continue;
			}
			tracing::info!(
				order_id = %truncate_id(&request.order_id),
				customer_id = %request.customer_id,
				%channel,
				title = %content.title,
				body = %templates::render(channel, &content, &request.context),
				"Notification"
			);
			report.sent.push(channel);
		}
		Ok(report)
	}
}

pub struct LogNotifierSchema;

impl ConfigSchema for LogNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![channels_field()]).validate(config)
	}
}

/// Configuration parameters:
/// - `channels`: channels to render (default: all)
pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	LogNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::Configuration(e.to_string()))?;
	Ok(Box::new(LogNotifier::new(configured_channels(config))))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl NotificationRegistry for Registry {}
