//! Webhook dispatcher.
//!
//! POSTs the notification, with content pre-rendered for every enabled
//! channel, to an external notification service. That service owns channel
//! preferences, quiet hours and rate limits. It may answer with a JSON
//! [`DispatchReport`]; any other 2xx body counts as every channel sent.

use crate::{
	channels_field, configured_channels, templates, NotificationError, NotificationFactory,
	NotificationInterface, NotificationRegistry,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracking_types::{
	ChannelFailure, ConfigSchema, DispatchReport, Field, FieldType, ImplementationRegistry,
	NotificationChannel, NotificationContent, NotificationRequest, Schema, ValidationError,
};

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
	#[serde(flatten)]
	request: &'a NotificationRequest,
	content: NotificationContent,
	channels: HashMap<NotificationChannel, String>,
}

pub struct WebhookNotifier {
	client: reqwest::Client,
	url: String,
	channels: Vec<NotificationChannel>,
}

impl WebhookNotifier {
	pub fn new(
		url: impl Into<String>,
		timeout: Duration,
		channels: Vec<NotificationChannel>,
	) -> Result<Self, NotificationError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NotificationError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			url: url.into(),
			channels,
		})
	}

	fn failed_report(&self, reason: String) -> DispatchReport {
		DispatchReport {
			failed: self
				.channels
				.iter()
				.map(|&channel| ChannelFailure {
					channel,
					reason: reason.clone(),
				})
				.collect(),
			skipped: self.skipped(),
			..Default::default()
		}
	}

	fn skipped(&self) -> Vec<NotificationChannel> {
		NotificationChannel::all()
			.filter(|c| !self.channels.contains(c))
			.collect()
	}
}

#[async_trait]
impl NotificationInterface for WebhookNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WebhookNotifierSchema)
	}

	async fn dispatch(
		&self,
		request: &NotificationRequest,
	) -> Result<DispatchReport, NotificationError> {
		let content = templates::content_for(request.status, &request.context);
		let payload = WebhookPayload {
			request,
			channels: self
				.channels
				.iter()
				.map(|&c| (c, templates::render(c, &content, &request.context)))
				.collect(),
			content,
		};

		let response = match self.client.post(&self.url).json(&payload).send().await {
			Ok(response) => response,
			Err(e) => return Ok(self.failed_report(e.to_string())),
		};
		let status = response.status();
		if !status.is_success() {
			return Ok(self.failed_report(format!("webhook returned {}", status)));
		}

		let body = response.bytes().await.unwrap_or_default();
		Ok(serde_json::from_slice::<DispatchReport>(&body).unwrap_or_else(|_| {
			DispatchReport {
				sent: self.channels.clone(),
				skipped: self.skipped(),
				failed: Vec::new(),
			}
		}))
	}
}

pub struct WebhookNotifierSchema;

impl ConfigSchema for WebhookNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
						Ok(())
					},
					_ => Err("url must start with http:// or https://".to_string()),
				}
			})],
			vec![
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
				channels_field(),
			],
		)
		.validate(config)
	}
}

/// Configuration parameters:
/// - `url`: endpoint receiving the POST (required)
/// - `timeout_seconds`: request timeout (default: 10)
/// - `channels`: channels to render (default: all)
pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	WebhookNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| NotificationError::Configuration("url is required".into()))?;
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|s| s as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(WebhookNotifier::new(
		url,
		Duration::from_secs(timeout),
		configured_channels(config),
	)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "webhook";
	type Factory = NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl NotificationRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{http::StatusCode, routing::post, Json, Router};
	use serde_json::Value;
	use std::sync::{Arc, Mutex};
	use tracking_types::{NotificationContext, OrderTrackingStatus};

	fn request() -> NotificationRequest {
		NotificationRequest {
			notification_id: "n1".into(),
			customer_id: "C1".into(),
			order_id: "O1".into(),
			status: OrderTrackingStatus::DriverAssigned,
			context: NotificationContext {
				driver_name: Some("Sam".into()),
				..Default::default()
			},
		}
	}

	async fn serve(app: Router) -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}/notify", addr)
	}

	#[tokio::test]
	async fn test_posts_rendered_channels() {
		let received = Arc::new(Mutex::new(None::<Value>));
		let sink = received.clone();
		let app = Router::new().route(
			"/notify",
			post(move |Json(body): Json<Value>| {
				let sink = sink.clone();
				async move {
					*sink.lock().unwrap() = Some(body);
					StatusCode::NO_CONTENT
				}
			}),
		);
		let url = serve(app).await;

		let notifier = WebhookNotifier::new(
			url,
			Duration::from_secs(5),
			vec![NotificationChannel::Sms],
		)
		.unwrap();
		let report = notifier.dispatch(&request()).await.unwrap();

		assert_eq!(report.sent, vec![NotificationChannel::Sms]);
		assert_eq!(report.skipped.len(), 3);
		let body = received.lock().unwrap().clone().unwrap();
		assert_eq!(body["order_id"], "O1");
		assert_eq!(body["content"]["title"], "Driver Assigned");
		assert_eq!(
			body["channels"]["sms"],
			"Driver Assigned: Sam will be delivering your order."
		);
	}

	#[tokio::test]
	async fn test_server_error_marks_channels_failed() {
		let app = Router::new().route("/notify", post(|| async { StatusCode::BAD_GATEWAY }));
		let url = serve(app).await;

		let notifier = WebhookNotifier::new(
			url,
			Duration::from_secs(5),
			vec![NotificationChannel::Email, NotificationChannel::Push],
		)
		.unwrap();
		let report = notifier.dispatch(&request()).await.unwrap();

		assert!(report.sent.is_empty());
		assert_eq!(report.failed.len(), 2);
		assert!(report.failed[0].reason.contains("502"));
	}

	#[test]
	fn test_schema_requires_http_url() {
		let config: toml::Value = toml::from_str("url = \"ftp://example\"").unwrap();
		assert!(create_notifier(&config).is_err());
		let missing: toml::Value = toml::from_str("timeout_seconds = 5").unwrap();
		assert!(create_notifier(&missing).is_err());
	}
}
