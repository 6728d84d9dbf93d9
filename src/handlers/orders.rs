use super::common::{map_service_error, success_response};
use crate::{
    errors::ApiError,
    handlers::{ActorContext, AppState},
};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};
use uuid::Uuid;

/// Get an order by id
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with line items", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .transfer
        .get_order(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", id)))?;

    Ok(success_response(order))
}

/// Get an order by its human-readable order number
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-number/{order_number}",
    params(("order_number" = String, Path, description = "Order number, e.g. TRF-20260830-1A2B3C4D")),
    responses(
        (status = 200, description = "Order with line items", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order_by_number(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(order_number): Path<String>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .transfer
        .get_order_by_number(&order_number)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", order_number)))?;

    Ok(success_response(order))
}

/// Router for order endpoints
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_order))
        .route("/by-number/:order_number", get(get_order_by_number))
}
