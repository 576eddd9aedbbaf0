use serde_json::{Value, json};

use crate::{
    audit::{self, AuditAction},
    dto::{
        cart::{AddToCartRequest, CartDto, CartPayload, SetQuantityRequest},
        normalize::normalize_cart,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    state::AppState,
    upstream::CoreLine,
};

pub const MAX_LINE_QTY: i64 = 999;

pub(crate) fn validate_variant_id(variant_id: i64) -> AppResult<()> {
    if variant_id <= 0 {
        return Err(AppError::Validation(
            "variantId must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_qty(qty: i64, allow_zero: bool) -> AppResult<()> {
    let min = if allow_zero { 0 } else { 1 };
    if qty < min || qty > MAX_LINE_QTY {
        return Err(AppError::Validation(format!(
            "qty must be between {min} and {MAX_LINE_QTY}"
        )));
    }
    Ok(())
}

/// The caller's live cart. A user without a cart gets an empty one.
pub async fn load_cart(state: &AppState, user_id: i64) -> AppResult<CartDto> {
    match state.core.get_cart(user_id).await {
        Ok(raw) => Ok(
            match normalize_cart(&raw, user_id, &state.config.asset_base_url)? {
                CartPayload::Cart(cart) => cart,
                CartPayload::Ack => CartDto::empty(user_id),
            },
        ),
        Err(err) if err.is_not_found() => Ok(CartDto::empty(user_id)),
        Err(err) => Err(err.into()),
    }
}

/// Turns a mutation response into a cart, re-fetching when Core only acknowledged.
async fn settle(state: &AppState, user_id: i64, raw: &Value) -> AppResult<CartDto> {
    match normalize_cart(raw, user_id, &state.config.asset_base_url)? {
        CartPayload::Cart(cart) => Ok(cart),
        CartPayload::Ack => load_cart(state, user_id).await,
    }
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let cart = load_cart(state, user.user_id).await?;
    Ok(ApiResponse::success("OK", cart, None))
}

pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartDto>> {
    validate_variant_id(payload.variant_id)?;
    validate_qty(payload.qty, false)?;

    let line = CoreLine {
        variant_id: payload.variant_id,
        qty: payload.qty,
    };
    let raw = state.core.add_cart_item(user.user_id, line).await?;
    let cart = settle(state, user.user_id, &raw).await?;

    audit::record(
        state,
        Some(user.user_id),
        AuditAction::CartUpdate,
        json!({ "variant_id": payload.variant_id, "qty": payload.qty }),
    )
    .await;

    Ok(ApiResponse::success("Added to cart", cart, None))
}

pub async fn set_quantity(
    state: &AppState,
    user: &AuthUser,
    payload: SetQuantityRequest,
) -> AppResult<ApiResponse<CartDto>> {
    validate_variant_id(payload.variant_id)?;
    validate_qty(payload.qty, true)?;

    let line = CoreLine {
        variant_id: payload.variant_id,
        qty: payload.qty,
    };
    let cart = match state.core.set_cart_item_qty(user.user_id, line).await {
        Ok(raw) => settle(state, user.user_id, &raw).await?,
        // Deleting a line that is already gone is a no-op.
        Err(err) if payload.qty == 0 && err.is_not_found() => {
            load_cart(state, user.user_id).await?
        }
        Err(err) => return Err(err.into()),
    };

    audit::record(
        state,
        Some(user.user_id),
        AuditAction::CartUpdate,
        json!({ "variant_id": payload.variant_id, "qty": payload.qty }),
    )
    .await;

    Ok(ApiResponse::success("Cart updated", cart, None))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    cart_item_id: i64,
) -> AppResult<ApiResponse<CartDto>> {
    if cart_item_id <= 0 {
        return Err(AppError::Validation(
            "cartItemId must be a positive integer".to_string(),
        ));
    }

    let current = load_cart(state, user.user_id).await?;
    if !current.contains_item(cart_item_id) {
        return Err(AppError::NotFound("Cart item not found".to_string()));
    }

    let raw = state
        .core
        .remove_cart_item(user.user_id, cart_item_id)
        .await?;
    let cart = settle(state, user.user_id, &raw).await?;

    audit::record(
        state,
        Some(user.user_id),
        AuditAction::CartRemove,
        json!({ "cart_item_id": cart_item_id }),
    )
    .await;

    Ok(ApiResponse::success("Removed from cart", cart, None))
}
