use axum::{
    Json, Router,
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, header},
    routing::get,
};

use crate::{
    dto::payment::PaymentReturnData,
    error::AppResult,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/return", get(payment_return).post(payment_return))
}

/// Gateway return and IPN endpoint. Unauthenticated: trust comes from Core's signature check.
#[utoipa::path(
    post,
    path = "/api/payment/return",
    request_body(content = String, description = "vnp_* parameters, form-encoded or JSON; the query string is read too"),
    responses(
        (status = 200, description = "Verified outcome; success is false unless paid", body = ApiResponse<PaymentReturnData>),
        (status = 400, description = "not_payment_callback or malformed_payment_callback"),
    ),
    tag = "Payment"
)]
pub async fn payment_return(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<PaymentReturnData>>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let params = payment_service::collect_params(query.as_deref(), content_type, &body)?;
    let resp = payment_service::reconcile(&state, params).await?;
    Ok(Json(resp))
}
