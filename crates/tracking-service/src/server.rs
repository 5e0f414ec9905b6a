//! HTTP server for the order tracking API.

use crate::apis::{store, tracking};
use axum::{
	extract::{DefaultBodyLimit, State},
	http::{HeaderName, HeaderValue, Method},
	response::Json,
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowOrigin, CorsLayer},
	timeout::TimeoutLayer,
	trace::TraceLayer,
};
use tracking_config::{ApiConfig, CorsConfig};
use tracking_core::TrackingService;
use tracking_types::HealthResponse;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub service: Arc<TrackingService>,
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	service: Arc<TrackingService>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { service }, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Tracking API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Builds the full route table with middleware.
pub fn router(state: AppState, api_config: &ApiConfig) -> Router {
	let tracking_routes = Router::new()
		.route("/", post(tracking::init_tracking))
		.route("/{order_id}", get(tracking::get_tracking))
		.route("/{order_id}/status", post(tracking::update_status))
		.route(
			"/{order_id}/store/acknowledge",
			post(tracking::store_acknowledge),
		)
		.route(
			"/{order_id}/substitutions",
			post(tracking::update_substitutions),
		)
		.route(
			"/{order_id}/delivery/assign",
			post(tracking::assign_delivery),
		)
		.route(
			"/{order_id}/delivery/location",
			post(tracking::update_driver_location),
		)
		.route(
			"/{order_id}/delivery/complete",
			post(tracking::complete_delivery),
		);

	let store_routes = Router::new()
		.route("/", get(store::list_orders))
		.route("/search", get(store::search_orders))
		.route("/search/recent", get(store::recent_searches))
		.route("/dashboard/summary", get(store::dashboard_summary))
		.route("/{order_id}/accept", post(store::accept_order))
		.route("/{order_id}/reject", post(store::reject_order))
		.route("/{order_id}/start-preparation", post(store::start_preparation))
		.route("/{order_id}/ready", post(store::mark_ready))
		.route("/{order_id}/refund", post(store::request_refund));

	Router::new()
		.route("/health", get(health))
		.nest("/api/tracking", tracking_routes)
		.nest("/api/store/orders", store_routes)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(api_config.cors.as_ref()))
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "ok".to_string(),
		service_id: state.service.config().service.id.clone(),
	})
}

/// Permissive CORS unless the config lists what to allow. Entries that do
/// not parse are skipped.
fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let origin = if cors.allowed_origins.iter().any(|o| o == "*") {
		AllowOrigin::any()
	} else {
		AllowOrigin::list(
			cors.allowed_origins
				.iter()
				.filter_map(|o| HeaderValue::from_str(o).ok()),
		)
	};
	let methods: Vec<Method> = cors
		.allowed_methods
		.iter()
		.filter_map(|m| m.parse().ok())
		.collect();
	let headers: Vec<HeaderName> = cors
		.allowed_headers
		.iter()
		.filter_map(|h| h.parse().ok())
		.collect();

	CorsLayer::new()
		.allow_origin(origin)
		.allow_methods(methods)
		.allow_headers(headers)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::apis::STORE_ID_HEADER;
	use axum::{body::Body, http::Request, http::StatusCode};
	use http_body_util::BodyExt;
	use serde_json::{json, Value};
	use tower::ServiceExt;
	use tracking_config::builders::config::ConfigBuilder;

	fn api_config() -> ApiConfig {
		ApiConfig {
			enabled: true,
			host: "127.0.0.1".to_string(),
			port: 3000,
			timeout_seconds: 30,
			max_request_size: 1024 * 1024,
			cors: None,
		}
	}

	fn app() -> Router {
		let service = crate::build_service(ConfigBuilder::new().service_id("tracking-api").build())
			.unwrap();
		router(
			AppState {
				service: Arc::new(service),
			},
			&api_config(),
		)
	}

	async fn send(
		app: &Router,
		method: Method,
		uri: &str,
		store_id: Option<&str>,
		body: Option<Value>,
	) -> (StatusCode, Value) {
		let mut request = Request::builder().method(method).uri(uri);
		if let Some(store_id) = store_id {
			request = request.header(STORE_ID_HEADER, store_id);
		}
		let request = match body {
			Some(body) => request
				.header("content-type", "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
			None => request.body(Body::empty()).unwrap(),
		};

		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = response.into_body().collect().await.unwrap().to_bytes();
		let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
		(status, value)
	}

	async fn create(app: &Router, order_id: &str, store_id: &str) {
		let (status, _) = send(
			app,
			Method::POST,
			"/api/tracking",
			None,
			Some(json!({
				"order_id": order_id,
				"store_id": store_id,
				"customer_id": "C1",
				"delivery_provider": "internal",
				"customer_details": { "name": "Ada Lovelace", "phone": "+15550123" }
			})),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
	}

	#[tokio::test]
	async fn test_health() {
		let app = app();
		let (status, body) = send(&app, Method::GET, "/health", None, None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["service_id"], "tracking-api");
	}

	#[tokio::test]
	async fn test_init_and_get() {
		let app = app();
		create(&app, "O1", "S1").await;

		let (status, body) = send(&app, Method::GET, "/api/tracking/O1", None, None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["current_status"], "submitted");
		assert_eq!(body["status_history"].as_array().unwrap().len(), 1);

		let (status, body) = send(&app, Method::GET, "/api/tracking/nope", None, None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "ORDER_NOT_FOUND");

		let (status, body) = send(
			&app,
			Method::POST,
			"/api/tracking",
			None,
			Some(json!({
				"order_id": "O1",
				"store_id": "S1",
				"customer_id": "C1",
				"delivery_provider": "internal"
			})),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION_ERROR");
	}

	#[tokio::test]
	async fn test_store_accept_guards() {
		let app = app();
		create(&app, "O1", "S1").await;
		let accept = json!({ "estimated_preparation_time": 20 });

		let (status, _) = send(
			&app,
			Method::POST,
			"/api/store/orders/O1/accept",
			Some("S2"),
			Some(accept.clone()),
		)
		.await;
		assert_eq!(status, StatusCode::FORBIDDEN);

		let (status, body) = send(
			&app,
			Method::POST,
			"/api/store/orders/O1/accept",
			Some("S1"),
			Some(json!({ "estimated_preparation_time": 0 })),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION_ERROR");

		let (status, body) = send(
			&app,
			Method::POST,
			"/api/store/orders/O1/accept",
			Some("S1"),
			Some(accept.clone()),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["current_status"], "store_acknowledged");
		assert_eq!(body["estimated_preparation_time"], 20);

		let (status, body) = send(
			&app,
			Method::POST,
			"/api/store/orders/O1/accept",
			Some("S1"),
			Some(accept),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "INVALID_STATE_TRANSITION");
		assert_eq!(body["details"]["current_status"], "store_acknowledged");
	}

	#[tokio::test]
	async fn test_ready_order_gets_fleet_driver() {
		let app = app();
		create(&app, "O1", "S1").await;
		for step in ["accept", "start-preparation", "ready"] {
			let body = (step == "accept").then(|| json!({ "estimated_preparation_time": 10 }));
			let (status, _) = send(
				&app,
				Method::POST,
				&format!("/api/store/orders/O1/{}", step),
				Some("S1"),
				body,
			)
			.await;
			assert_eq!(status, StatusCode::OK, "step {}", step);
		}

		let (status, body) = send(
			&app,
			Method::POST,
			"/api/tracking/O1/delivery/assign",
			None,
			Some(json!({ "provider": "internal" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["current_status"], "driver_assigned");
		assert_eq!(body["driver_details"]["driver_id"], "driver-1");

		let (status, _) = send(
			&app,
			Method::POST,
			"/api/tracking/O1/delivery/assign",
			None,
			Some(json!({ "provider": "uber" })),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_store_listing_and_dashboard() {
		let app = app();
		create(&app, "O1", "S1").await;
		create(&app, "O2", "S1").await;
		create(&app, "X1", "S2").await;

		let (status, body) = send(&app, Method::GET, "/api/store/orders", None, None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "MISSING_STORE_ID");

		let (status, body) =
			send(&app, Method::GET, "/api/store/orders?page_size=1", Some("S1"), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["total"], 2);
		assert_eq!(body["total_pages"], 2);
		assert_eq!(body["items"].as_array().unwrap().len(), 1);

		let (status, body) = send(
			&app,
			Method::GET,
			"/api/store/orders/search?query=ada&search_type=customer_name",
			Some("S1"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["total"], 2);

		let (status, body) = send(
			&app,
			Method::GET,
			"/api/store/orders/search/recent",
			Some("S1"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body[0]["query"], "ada");

		let (status, body) = send(
			&app,
			Method::GET,
			"/api/store/orders/dashboard/summary",
			Some("S1"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["total_orders"], 2);
		assert_eq!(body["status_counts"]["submitted"], 2);
	}
}
