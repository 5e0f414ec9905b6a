//! HTTP courier adapter.
//!
//! Speaks a small JSON API that third-party couriers (and the gateways we run
//! in front of them) expose:
//!
//! - `POST {base_url}/deliveries` with a [`DriverRequest`], answered by a
//!   [`DriverAssignment`]
//! - `GET {base_url}/deliveries/{order_id}/drivers/{driver_id}/location`,
//!   answered by a [`GeoLocation`]
//! - `POST {base_url}/deliveries/{order_id}/confirmation` with a
//!   [`DeliveryConfirmation`]

use crate::{DeliveryError, DeliveryFactory, DeliveryInterface, DeliveryRegistry};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracking_types::{
	ConfigSchema, DeliveryConfirmation, DriverAssignment, DriverRequest, Field, FieldType,
	GeoLocation, ImplementationRegistry, Schema, ValidationError,
};

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

pub struct CourierClient {
	client: reqwest::Client,
	base_url: String,
	api_key: Option<String>,
}

impl CourierClient {
	pub fn new(
		base_url: impl Into<String>,
		api_key: Option<String>,
		timeout: Duration,
	) -> Result<Self, DeliveryError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| DeliveryError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			api_key,
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		match &self.api_key {
			Some(key) => request.bearer_auth(key),
			None => request,
		}
	}

	async fn send(
		&self,
		request: reqwest::RequestBuilder,
	) -> Result<reqwest::Response, DeliveryError> {
		let response = self
			.authorize(request)
			.send()
			.await
			.map_err(|e| DeliveryError::Network(e.to_string()))?;
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}
		let body = response.text().await.unwrap_or_default();
		Err(DeliveryError::Rejected(format!("{}: {}", status, body)))
	}

	async fn send_json<T: DeserializeOwned>(
		&self,
		request: reqwest::RequestBuilder,
	) -> Result<T, DeliveryError> {
		self.send(request)
			.await?
			.json::<T>()
			.await
			.map_err(|e| DeliveryError::Rejected(format!("malformed response: {}", e)))
	}
}

#[async_trait]
impl DeliveryInterface for CourierClient {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(CourierClientSchema)
	}

	async fn request_driver(
		&self,
		request: &DriverRequest,
	) -> Result<DriverAssignment, DeliveryError> {
		self.send_json(self.client.post(self.url("/deliveries")).json(request))
			.await
	}

	async fn driver_location(
		&self,
		order_id: &str,
		driver_id: &str,
	) -> Result<GeoLocation, DeliveryError> {
		let path = format!("/deliveries/{}/drivers/{}/location", order_id, driver_id);
		self.send_json(self.client.get(self.url(&path))).await
	}

	async fn confirm_delivery(
		&self,
		confirmation: &DeliveryConfirmation,
	) -> Result<(), DeliveryError> {
		let path = format!("/deliveries/{}/confirmation", confirmation.order_id);
		self.send(self.client.post(self.url(&path)).json(confirmation))
			.await
			.map(|_| ())
	}
}

pub struct CourierClientSchema;

impl ConfigSchema for CourierClientSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("base_url", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
						Ok(())
					},
					_ => Err("base_url must start with http:// or https://".to_string()),
				}
			})],
			vec![
				Field::new("api_key", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(120),
					},
				),
			],
		)
		.validate(config)
	}
}

/// Configuration parameters:
/// - `base_url`: courier API root (required)
/// - `api_key`: sent as a bearer token when set
/// - `timeout_seconds`: per-request timeout (default: 10)
pub fn create_delivery(config: &toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	CourierClientSchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DeliveryError::Configuration("base_url is required".into()))?;
	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.map(str::to_string);
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|s| s as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(CourierClient::new(
		base_url,
		api_key,
		Duration::from_secs(timeout),
	)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "courier";
	type Factory = DeliveryFactory;

	fn factory() -> Self::Factory {
		create_delivery
	}
}

impl DeliveryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{
		extract::Path,
		http::{HeaderMap, StatusCode},
		routing::{get, post},
		Json, Router,
	};
	use chrono::Utc;
	use tracking_types::DriverDetails;

	async fn serve(app: Router) -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}/", addr)
	}

	fn courier_app() -> Router {
		Router::new()
			.route(
				"/deliveries",
				post(|headers: HeaderMap, Json(req): Json<DriverRequest>| async move {
					if headers.get("authorization").and_then(|v| v.to_str().ok())
						!= Some("Bearer secret")
					{
						return Err(StatusCode::UNAUTHORIZED);
					}
					Ok(Json(DriverAssignment {
						driver: DriverDetails {
							driver_id: format!("drv-{}", req.order_id),
							name: "Robin".into(),
							phone: None,
							vehicle_type: Some("bike".into()),
							vehicle_id: None,
							photo_url: None,
							rating: Some(4.9),
						},
						estimated_pickup_time: None,
						estimated_delivery_time: None,
					}))
				}),
			)
			.route(
				"/deliveries/{order_id}/drivers/{driver_id}/location",
				get(|Path((_order, _driver)): Path<(String, String)>| async {
					Json(GeoLocation {
						latitude: 51.5,
						longitude: -0.12,
						accuracy: Some(5.0),
						timestamp: Utc::now(),
					})
				}),
			)
			.route(
				"/deliveries/{order_id}/confirmation",
				post(|| async { StatusCode::CONFLICT }),
			)
	}

	#[tokio::test]
	async fn test_request_driver_and_location() {
		let base_url = serve(courier_app()).await;
		let client =
			CourierClient::new(base_url, Some("secret".into()), Duration::from_secs(5)).unwrap();

		let assignment = client
			.request_driver(&DriverRequest {
				order_id: "O9".into(),
				store_id: "S1".into(),
				customer_id: "C1".into(),
				ready_at: None,
			})
			.await
			.unwrap();
		assert_eq!(assignment.driver.driver_id, "drv-O9");

		let location = client.driver_location("O9", "drv-O9").await.unwrap();
		assert_eq!(location.latitude, 51.5);
	}

	#[tokio::test]
	async fn test_error_status_maps_to_rejected() {
		let base_url = serve(courier_app()).await;
		let client = CourierClient::new(base_url, None, Duration::from_secs(5)).unwrap();

		let err = client
			.request_driver(&DriverRequest {
				order_id: "O9".into(),
				store_id: "S1".into(),
				customer_id: "C1".into(),
				ready_at: None,
			})
			.await
			.unwrap_err();
		assert!(matches!(err, DeliveryError::Rejected(ref m) if m.contains("401")));

		let err = client
			.confirm_delivery(&DeliveryConfirmation {
				order_id: "O9".into(),
				driver_id: None,
				delivered_at: Utc::now(),
				proof_of_delivery: None,
			})
			.await
			.unwrap_err();
		assert!(matches!(err, DeliveryError::Rejected(ref m) if m.contains("409")));
	}

	#[tokio::test]
	async fn test_unreachable_courier_is_network_error() {
		let client =
			CourierClient::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
		let err = client.driver_location("O1", "d1").await.unwrap_err();
		assert!(matches!(err, DeliveryError::Network(_)));
	}

	#[test]
	fn test_schema_requires_base_url() {
		let config: toml::Value = toml::from_str("api_key = \"k\"").unwrap();
		assert!(create_delivery(&config).is_err());
		let config: toml::Value = toml::from_str("base_url = \"https://courier.test\"").unwrap();
		assert!(create_delivery(&config).is_ok());
	}
}
