use super::common::{
    created_response, map_service_error, success_response, validate_input, PaginationMeta,
    PaginationParams,
};
use crate::{
    entities::purchase_request::RequestStatus,
    errors::ApiError,
    handlers::{ActorContext, AppState},
    services::transfer::SubmitRequestCommand,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// Request and response DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitPurchaseRequestBody {
    pub product_id: Uuid,
    /// Requesting client. Defaults to the calling actor; admins may file
    /// on behalf of a client.
    pub client_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Target manufacturer organization. Falls back to the
    /// `x-organization-id` header when omitted.
    pub organization_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RejectPurchaseRequestBody {
    #[validate(length(min = 1, max = 500, message = "Rejection reason is required"))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    /// Raw organization filter. Malformed values trigger the derived
    /// client-scope fallback instead of a 400.
    pub organization_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
}

impl ListRequestsQuery {
    fn pagination(&self) -> PaginationParams {
        let defaults = PaginationParams::default();
        PaginationParams {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

// Handler functions

/// Submit a purchase request
#[utoipa::path(
    post,
    path = "/api/v1/purchase-requests",
    request_body = SubmitPurchaseRequestBody,
    responses(
        (status = 201, description = "Purchase request submitted", body = serde_json::Value),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-requests"
)]
pub async fn submit_purchase_request(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(body): Json<SubmitPurchaseRequestBody>,
) -> Result<Response, ApiError> {
    validate_input(&body)?;

    let organization_id = body
        .organization_id
        .or(actor.organization_id)
        .ok_or_else(|| {
            ApiError::ValidationError(
                "organization_id is required in the body or x-organization-id header".to_string(),
            )
        })?;

    let command = SubmitRequestCommand {
        product_id: body.product_id,
        client_id: body.client_id.unwrap_or(actor.actor_id),
        organization_id,
        quantity: body.quantity,
        unit_price: body.unit_price,
        notes: body.notes,
    };

    let request = state
        .services
        .transfer
        .submit(command)
        .await
        .map_err(map_service_error)?;

    info!(request_id = %request.id, "Purchase request submitted");
    Ok(created_response(request))
}

/// List purchase requests
#[utoipa::path(
    get,
    path = "/api/v1/purchase-requests",
    params(
        ("organization_id" = Option<String>, Query, description = "Filter by manufacturer organization"),
        ("status" = Option<String>, Query, description = "Filter by request status"),
        PaginationParams
    ),
    responses(
        (status = 200, description = "Purchase requests", body = serde_json::Value)
    ),
    tag = "purchase-requests"
)]
pub async fn list_purchase_requests(
    State(state): State<AppState>,
    actor: ActorContext,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Response, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<RequestStatus>()
                .map_err(|_| ApiError::ValidationError(format!("Unknown status: {}", s)))
        })
        .transpose()?;

    let actor_org = actor.organization_id.unwrap_or(Uuid::nil());
    let pagination = query.pagination();
    let page = state
        .services
        .request_queries
        .list_requests(
            query.organization_id.as_deref(),
            status,
            actor_org,
            pagination.page,
            pagination.per_page,
        )
        .await
        .map_err(map_service_error)?;

    let meta = PaginationMeta::new(page.page, page.per_page, page.total);
    Ok(success_response(json!({
        "data": page.requests,
        "pagination": meta,
        "scope": page.scope,
    })))
}

/// Get a purchase request by id
#[utoipa::path(
    get,
    path = "/api/v1/purchase-requests/{id}",
    params(("id" = Uuid, Path, description = "Purchase request id")),
    responses(
        (status = 200, description = "Purchase request", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-requests"
)]
pub async fn get_purchase_request(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let request = state
        .services
        .transfer
        .get_request(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Purchase request {} not found", id)))?;

    Ok(success_response(request))
}

/// Approve a pending purchase request and execute the inventory transfer
#[utoipa::path(
    post,
    path = "/api/v1/purchase-requests/{id}/approve",
    params(("id" = Uuid, Path, description = "Purchase request id")),
    responses(
        (status = 200, description = "Request approved and inventory transferred", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Request is not pending", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient manufacturer stock", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-requests"
)]
pub async fn approve_purchase_request(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let outcome = state
        .services
        .transfer
        .approve(id, actor.actor_id)
        .await
        .map_err(map_service_error)?;

    info!(
        request_id = %id,
        order_id = %outcome.order.id,
        approver = %actor.actor_id,
        "Purchase request approved"
    );
    Ok(success_response(json!({
        "request": outcome.request,
        "order": outcome.order,
        "manufacturer_stock": outcome.manufacturer_product.stock,
        "client_stock": outcome.client_product.current_stock,
    })))
}

/// Reject a pending purchase request
#[utoipa::path(
    post,
    path = "/api/v1/purchase-requests/{id}/reject",
    params(("id" = Uuid, Path, description = "Purchase request id")),
    request_body = RejectPurchaseRequestBody,
    responses(
        (status = 200, description = "Request rejected", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Request is not pending", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-requests"
)]
pub async fn reject_purchase_request(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectPurchaseRequestBody>,
) -> Result<Response, ApiError> {
    validate_input(&body)?;

    let request = state
        .services
        .transfer
        .reject(id, actor.actor_id, body.reason)
        .await
        .map_err(map_service_error)?;

    info!(request_id = %id, rejector = %actor.actor_id, "Purchase request rejected");
    Ok(success_response(request))
}

/// Router for purchase request endpoints
pub fn purchase_request_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(submit_purchase_request).get(list_purchase_requests),
        )
        .route("/:id", get(get_purchase_request))
        .route("/:id/approve", post(approve_purchase_request))
        .route("/:id/reject", post(reject_purchase_request))
}
