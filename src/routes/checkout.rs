use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::checkout::{CheckoutRequest, PlaceResult, PreviewDto},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::{checkout_service, order_service},
    state::AppState,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/preview", post(preview))
        .route("/place", post(place))
}

#[utoipa::path(
    post,
    path = "/api/checkout/preview",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Quote at current prices with warnings", body = ApiResponse<PreviewDto>),
        (status = 400, description = "Invalid input"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn preview(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<PreviewDto>>> {
    let resp = checkout_service::preview(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/checkout/place",
    request_body = CheckoutRequest,
    params(
        ("Idempotency-Key" = String, Header, description = "8-128 visible ASCII characters; reuse it on retry")
    ),
    responses(
        (status = 200, description = "Order committed; shape depends on paymentMethodCode", body = ApiResponse<PlaceResult>),
        (status = 400, description = "Invalid input or missing Idempotency-Key"),
        (status = 409, description = "Unorderable checkout or Idempotency-Key conflict"),
        (status = 504, description = "Outcome unknown; retry with the same key"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn place(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<PlaceResult>>> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    let resp = order_service::place_order(&state, &user, key, payload).await?;
    Ok(Json(resp))
}
