use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};

use crate::{
    dto::cart::{AddToCartRequest, CartDto, SetQuantityRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item).patch(set_quantity))
        .route("/items/{cart_item_id}", delete(remove_item))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Current cart, possibly empty", body = ApiResponse<CartDto>),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartDto>>> {
    let resp = cart_service::get_cart(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Line added or incremented", body = ApiResponse<CartDto>),
        (status = 400, description = "Invalid variant or quantity"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartDto>>> {
    let resp = cart_service::add_item(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/cart/items",
    request_body = SetQuantityRequest,
    responses(
        (status = 200, description = "Quantity set; 0 removes the line", body = ApiResponse<CartDto>),
        (status = 400, description = "Invalid variant or quantity"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn set_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SetQuantityRequest>,
) -> AppResult<Json<ApiResponse<CartDto>>> {
    let resp = cart_service::set_quantity(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{cart_item_id}",
    params(
        ("cart_item_id" = i64, Path, description = "Cart item ID")
    ),
    responses(
        (status = 200, description = "Line removed", body = ApiResponse<CartDto>),
        (status = 404, description = "Item is not in the caller's cart"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(cart_item_id): Path<i64>,
) -> AppResult<Json<ApiResponse<CartDto>>> {
    let resp = cart_service::remove_item(&state, &user, cart_item_id).await?;
    Ok(Json(resp))
}
