//! Request handlers for the tracking API.
//!
//! Identity comes from headers set by the gateway in front of the service:
//! `x-store-id` names the calling store and `x-actor-id` the acting user.

pub mod store;
pub mod tracking;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracking_core::TrackingError;
use tracking_types::{APIError, Actor};

pub const STORE_ID_HEADER: &str = "x-store-id";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

fn header_value(parts: &Parts, name: &str) -> Option<String> {
	parts
		.headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|v| !v.is_empty())
		.map(str::to_string)
}

/// The store making the request.
pub struct StoreId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for StoreId {
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		header_value(parts, STORE_ID_HEADER)
			.map(StoreId)
			.ok_or_else(|| APIError::BadRequest {
				error_type: "MISSING_STORE_ID".to_string(),
				message: format!("The {} header is required", STORE_ID_HEADER),
				details: None,
			})
	}
}

/// Who is acting. Requests without `x-actor-id` act as the system.
pub struct RequestActor(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for RequestActor {
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		Ok(RequestActor(
			header_value(parts, ACTOR_ID_HEADER).map_or(Actor::System, Actor::User),
		))
	}
}

/// Logs a failed operation and converts it for the response.
pub(crate) fn failed(operation: &'static str, err: TrackingError) -> APIError {
	match &err {
		TrackingError::Persistence(_) | TrackingError::AcknowledgmentTimeout(_) => {
			tracing::error!(operation, error = %err, "Request failed");
		},
		_ => tracing::warn!(operation, error = %err, "Request failed"),
	}
	APIError::from(err)
}
