//! Order tracking endpoints under `/api/tracking`.

use super::{failed, RequestActor};
use crate::server::AppState;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::Json,
};
use tracking_types::{
	APIError, AssignDeliveryRequest, CompleteDeliveryRequest, DriverLocationRequest,
	InitTrackingRequest, OrderTracking, StoreAcknowledgeRequest, SubstitutionsRequest,
	UpdateStatusRequest,
};
use validator::Validate;

type TrackingResponse = Result<Json<OrderTracking>, APIError>;

/// POST /api/tracking
pub async fn init_tracking(
	State(state): State<AppState>,
	Json(request): Json<InitTrackingRequest>,
) -> Result<(StatusCode, Json<OrderTracking>), APIError> {
	request.validate()?;
	let record = state
		.service
		.init_tracking(request)
		.await
		.map_err(|e| failed("init_tracking", e))?;
	Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/tracking/{order_id}
pub async fn get_tracking(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> TrackingResponse {
	state
		.service
		.get_tracking(&order_id)
		.await
		.map(Json)
		.map_err(|e| failed("get_tracking", e))
}

/// POST /api/tracking/{order_id}/status
pub async fn update_status(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	RequestActor(actor): RequestActor,
	Json(request): Json<UpdateStatusRequest>,
) -> TrackingResponse {
	request.validate()?;
	state
		.service
		.update_status(&order_id, request.status, actor, request.notes)
		.await
		.map(Json)
		.map_err(|e| failed("update_status", e))
}

/// POST /api/tracking/{order_id}/store/acknowledge
pub async fn store_acknowledge(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	Json(request): Json<StoreAcknowledgeRequest>,
) -> TrackingResponse {
	request.validate()?;
	state
		.service
		.store_acknowledge(&order_id, &request.store_id, request.estimated_preparation_time)
		.await
		.map(Json)
		.map_err(|e| failed("store_acknowledge", e))
}

/// POST /api/tracking/{order_id}/substitutions
pub async fn update_substitutions(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	RequestActor(actor): RequestActor,
	Json(request): Json<SubstitutionsRequest>,
) -> TrackingResponse {
	request.validate()?;
	state
		.service
		.update_substitutions(&order_id, request.substitutions, actor)
		.await
		.map(Json)
		.map_err(|e| failed("update_substitutions", e))
}

/// POST /api/tracking/{order_id}/delivery/assign
pub async fn assign_delivery(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	Json(request): Json<AssignDeliveryRequest>,
) -> TrackingResponse {
	request.validate()?;
	state
		.service
		.delivery()
		.assign_delivery(
			&order_id,
			request.provider,
			request.driver,
			request.estimated_pickup_time,
			request.estimated_delivery_time,
		)
		.await
		.map(Json)
		.map_err(|e| failed("assign_delivery", e))
}

/// POST /api/tracking/{order_id}/delivery/location
pub async fn update_driver_location(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	Json(request): Json<DriverLocationRequest>,
) -> TrackingResponse {
	request.validate()?;
	state
		.service
		.delivery()
		.update_driver_location(&order_id, request.provider, request.location)
		.await
		.map(Json)
		.map_err(|e| failed("update_driver_location", e))
}

/// POST /api/tracking/{order_id}/delivery/complete
pub async fn complete_delivery(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	Json(request): Json<CompleteDeliveryRequest>,
) -> TrackingResponse {
	request.validate()?;
	state
		.service
		.delivery()
		.mark_delivered(&order_id, request.provider, request.proof_of_delivery)
		.await
		.map(Json)
		.map_err(|e| failed("complete_delivery", e))
}
