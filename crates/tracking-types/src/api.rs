//! API types for the order tracking HTTP surface.
//!
//! Request bodies derive [`validator::Validate`] so handlers can reject bad
//! input before anything reaches the engine. [`APIError`] carries the HTTP
//! status mapping and renders as a JSON [`ErrorResponse`].

use crate::{
	CustomerDetails, DeliveryProvider, DriverDetails, GeoLocation, ItemSubstitution,
	OrderTrackingStatus, SearchType,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use validator::Validate;

/// Body of `POST /api/tracking`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InitTrackingRequest {
	#[validate(length(min = 1))]
	pub order_id: String,
	#[validate(length(min = 1))]
	pub store_id: String,
	#[validate(length(min = 1))]
	pub customer_id: String,
	pub delivery_provider: DeliveryProvider,
	#[serde(default)]
	pub customer_details: Option<CustomerDetails>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

/// Body of `POST /api/tracking/{order_id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateStatusRequest {
	pub status: OrderTrackingStatus,
	#[serde(default)]
	pub notes: Option<String>,
}

/// Body of `POST /api/tracking/{order_id}/store/acknowledge`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoreAcknowledgeRequest {
	#[validate(length(min = 1))]
	pub store_id: String,
	#[validate(range(min = 1))]
	pub estimated_preparation_time: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubstitutionsRequest {
	#[validate(length(min = 1))]
	pub substitutions: Vec<ItemSubstitution>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssignDeliveryRequest {
	pub provider: DeliveryProvider,
	/// When omitted the provider adapter picks a driver.
	#[serde(default)]
	pub driver: Option<DriverDetails>,
	#[serde(default)]
	pub estimated_pickup_time: Option<DateTime<Utc>>,
	#[serde(default)]
	pub estimated_delivery_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DriverLocationRequest {
	pub provider: DeliveryProvider,
	#[validate(custom(function = "valid_coordinates"))]
	pub location: GeoLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompleteDeliveryRequest {
	pub provider: DeliveryProvider,
	#[serde(default)]
	pub proof_of_delivery: Option<Value>,
}

/// Body of `POST /api/store/orders/{order_id}/accept`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AcceptOrderRequest {
	#[validate(range(min = 1))]
	pub estimated_preparation_time: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RejectOrderRequest {
	#[validate(length(min = 1))]
	pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RefundOrderRequest {
	#[validate(length(min = 1))]
	pub reason: String,
	#[validate(custom(function = "positive_amount"))]
	pub amount: Decimal,
	#[serde(default)]
	pub items: Vec<String>,
}

fn default_page() -> u32 {
	1
}

fn default_page_size() -> u32 {
	20
}

fn default_recent_limit() -> u32 {
	5
}

/// Query string of `GET /api/store/orders`.
///
/// `status` is a comma-separated list of status names.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct StoreOrdersQuery {
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default)]
	pub start_date: Option<DateTime<Utc>>,
	#[serde(default)]
	pub end_date: Option<DateTime<Utc>>,
	#[serde(default)]
	pub search_query: Option<String>,
	#[serde(default)]
	pub search_type: Option<SearchType>,
	#[serde(default = "default_page")]
	#[validate(range(min = 1))]
	pub page: u32,
	#[serde(default = "default_page_size")]
	#[validate(range(min = 1, max = 100))]
	pub page_size: u32,
}

impl StoreOrdersQuery {
	/// Parses the comma-separated `status` filter.
	pub fn statuses(&self) -> Result<Option<Vec<OrderTrackingStatus>>, String> {
		match self.status.as_deref().map(str::trim) {
			None | Some("") => Ok(None),
			Some(list) => list
				.split(',')
				.filter(|s| !s.trim().is_empty())
				.map(|s| s.parse::<OrderTrackingStatus>())
				.collect::<Result<Vec<_>, _>>()
				.map(Some),
		}
	}
}

/// Query string of `GET /api/store/orders/search`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchOrdersQuery {
	#[validate(length(min = 1))]
	pub query: String,
	#[serde(default)]
	pub search_type: SearchType,
	#[serde(default = "default_page")]
	#[validate(range(min = 1))]
	pub page: u32,
	#[serde(default = "default_page_size")]
	#[validate(range(min = 1, max = 100))]
	pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecentSearchesQuery {
	#[serde(default = "default_recent_limit")]
	#[validate(range(min = 1, max = 20))]
	pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
	pub status: String,
	pub service_id: String,
}

fn positive_amount(amount: &Decimal) -> Result<(), validator::ValidationError> {
	if amount.is_sign_positive() && !amount.is_zero() {
		Ok(())
	} else {
		Err(validator::ValidationError::new("amount_not_positive"))
	}
}

fn valid_coordinates(location: &GeoLocation) -> Result<(), validator::ValidationError> {
	if (-90.0..=90.0).contains(&location.latitude) && (-180.0..=180.0).contains(&location.longitude)
	{
		Ok(())
	} else {
		Err(validator::ValidationError::new("coordinates_out_of_range"))
	}
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Guard failures and malformed input (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<Value>,
	},
	/// Caller does not own the order (403)
	Forbidden { error_type: String, message: String },
	/// Order or store does not exist (404)
	NotFound { error_type: String, message: String },
	/// Courier integration failed (502)
	BadGateway { error_type: String, message: String },
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::BadGateway { .. } => 502,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Converts to the JSON body returned to clients.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details) = match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			} => (error_type, message, details.clone()),
			APIError::Forbidden {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::BadGateway {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message, None),
		};
		ErrorResponse {
			error: error.clone(),
			message: message.clone(),
			details,
			retry_after: None,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Forbidden { message, .. } => write!(f, "Forbidden: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::BadGateway { message, .. } => write!(f, "Bad Gateway: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl From<validator::ValidationErrors> for APIError {
	fn from(errors: validator::ValidationErrors) -> Self {
		APIError::BadRequest {
			error_type: "VALIDATION_ERROR".to_string(),
			message: "Request validation failed".to_string(),
			details: serde_json::to_value(&errors).ok(),
		}
	}
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_refund_amount_must_be_positive() {
		let mut body = RefundOrderRequest {
			reason: "bruised apples".to_string(),
			amount: Decimal::new(450, 2),
			items: vec!["apple".to_string()],
		};
		assert!(body.validate().is_ok());
		body.amount = Decimal::ZERO;
		assert!(body.validate().is_err());
		body.amount = Decimal::new(-1, 0);
		assert!(body.validate().is_err());
	}

	#[test]
	fn test_store_orders_query_defaults_and_bounds() {
		let query: StoreOrdersQuery = serde_json::from_str("{}").unwrap();
		assert_eq!(query.page, 1);
		assert_eq!(query.page_size, 20);
		assert!(query.validate().is_ok());

		let oversized = StoreOrdersQuery {
			page_size: 101,
			..query.clone()
		};
		assert!(oversized.validate().is_err());
		let zero_page = StoreOrdersQuery { page: 0, ..query };
		assert!(zero_page.validate().is_err());
	}

	#[test]
	fn test_status_list_parsing() {
		let query = StoreOrdersQuery {
			status: Some("submitted, store_notified".to_string()),
			..serde_json::from_str("{}").unwrap()
		};
		assert_eq!(
			query.statuses().unwrap(),
			Some(vec![
				OrderTrackingStatus::Submitted,
				OrderTrackingStatus::StoreNotified
			])
		);
		let bad = StoreOrdersQuery {
			status: Some("lost".to_string()),
			..query
		};
		assert!(bad.statuses().is_err());
	}

	#[test]
	fn test_error_status_codes() {
		let err = APIError::Forbidden {
			error_type: "AUTHORIZATION_ERROR".into(),
			message: "nope".into(),
		};
		assert_eq!(err.status_code(), 403);
		assert_eq!(err.to_error_response().error, "AUTHORIZATION_ERROR");
	}
}
