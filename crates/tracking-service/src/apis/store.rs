//! Store-facing endpoints under `/api/store/orders`.
//!
//! Every route requires `x-store-id`; orders owned by another store answer
//! 403.

use super::{failed, StoreId};
use crate::server::AppState;
use axum::{
	extract::{Path, Query, State},
	response::Json,
};
use tracking_types::{
	APIError, AcceptOrderRequest, DashboardSummary, OrderQuery, OrderTracking, PageRequest, Paged,
	RecentSearch, RecentSearchesQuery, RefundOrderRequest, RejectOrderRequest, SearchOrdersQuery,
	StoreOrdersQuery, TextSearch,
};
use validator::Validate;

type TrackingResponse = Result<Json<OrderTracking>, APIError>;

/// GET /api/store/orders
pub async fn list_orders(
	State(state): State<AppState>,
	StoreId(store_id): StoreId,
	Query(params): Query<StoreOrdersQuery>,
) -> Result<Json<Paged<OrderTracking>>, APIError> {
	params.validate()?;
	let statuses = params.statuses().map_err(|message| APIError::BadRequest {
		error_type: "INVALID_STATUS".to_string(),
		message,
		details: None,
	})?;
	let search = params
		.search_query
		.as_deref()
		.map(str::trim)
		.filter(|q| !q.is_empty())
		.map(|q| TextSearch {
			query: q.to_string(),
			search_type: params.search_type.unwrap_or_default(),
		});
	let query = OrderQuery {
		store_id: None,
		statuses,
		created_from: params.start_date,
		created_to: params.end_date,
		search,
	};

	state
		.service
		.store()
		.get_store_orders(&store_id, query, PageRequest::new(params.page, params.page_size))
		.await
		.map(Json)
		.map_err(|e| failed("list_orders", e))
}

/// GET /api/store/orders/search
pub async fn search_orders(
	State(state): State<AppState>,
	StoreId(store_id): StoreId,
	Query(params): Query<SearchOrdersQuery>,
) -> Result<Json<Paged<OrderTracking>>, APIError> {
	params.validate()?;
	state
		.service
		.store()
		.search_orders(
			&store_id,
			&params.query,
			params.search_type,
			PageRequest::new(params.page, params.page_size),
		)
		.await
		.map(Json)
		.map_err(|e| failed("search_orders", e))
}

/// GET /api/store/orders/search/recent
pub async fn recent_searches(
	State(state): State<AppState>,
	StoreId(store_id): StoreId,
	Query(params): Query<RecentSearchesQuery>,
) -> Result<Json<Vec<RecentSearch>>, APIError> {
	params.validate()?;
	state
		.service
		.store()
		.recent_searches(&store_id, params.limit as usize)
		.await
		.map(Json)
		.map_err(|e| failed("recent_searches", e))
}

/// GET /api/store/orders/dashboard/summary
pub async fn dashboard_summary(
	State(state): State<AppState>,
	StoreId(store_id): StoreId,
) -> Result<Json<DashboardSummary>, APIError> {
	state
		.service
		.store()
		.dashboard_summary(&store_id)
		.await
		.map(Json)
		.map_err(|e| failed("dashboard_summary", e))
}

/// POST /api/store/orders/{order_id}/accept
pub async fn accept_order(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	StoreId(store_id): StoreId,
	Json(request): Json<AcceptOrderRequest>,
) -> TrackingResponse {
	request.validate()?;
	state
		.service
		.store()
		.accept_order(&order_id, &store_id, request.estimated_preparation_time)
		.await
		.map(Json)
		.map_err(|e| failed("accept_order", e))
}

/// POST /api/store/orders/{order_id}/reject
pub async fn reject_order(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	StoreId(store_id): StoreId,
	Json(request): Json<RejectOrderRequest>,
) -> TrackingResponse {
	request.validate()?;
	state
		.service
		.store()
		.reject_order(&order_id, &store_id, &request.reason)
		.await
		.map(Json)
		.map_err(|e| failed("reject_order", e))
}

/// POST /api/store/orders/{order_id}/start-preparation
pub async fn start_preparation(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	StoreId(store_id): StoreId,
) -> TrackingResponse {
	state
		.service
		.store()
		.start_order_preparation(&order_id, &store_id)
		.await
		.map(Json)
		.map_err(|e| failed("start_preparation", e))
}

/// POST /api/store/orders/{order_id}/ready
pub async fn mark_ready(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	StoreId(store_id): StoreId,
) -> TrackingResponse {
	state
		.service
		.store()
		.mark_order_ready(&order_id, &store_id)
		.await
		.map(Json)
		.map_err(|e| failed("mark_ready", e))
}

/// POST /api/store/orders/{order_id}/refund
pub async fn request_refund(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	StoreId(store_id): StoreId,
	Json(request): Json<RefundOrderRequest>,
) -> TrackingResponse {
	request.validate()?;
	state
		.service
		.store()
		.request_refund(
			&order_id,
			&store_id,
			&request.reason,
			request.amount,
			request.items,
		)
		.await
		.map(Json)
		.map_err(|e| failed("request_refund", e))
}
