use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::time::{Instant, sleep};

use crate::{
    audit::{self, AuditAction},
    dto::{
        checkout::{
            CheckoutRequest, CheckoutSource, LineInput, PlaceResult,
            ShippingSnapshot, merge_lines,
        },
        normalize::{absolutize, normalize_count, normalize_order, normalize_order_page, normalize_placement},
        orders::{OrderList, OrderSummary},
    },
    error::{AppError, AppResult},
    idempotency::{BeginOutcome, fingerprint},
    middleware::auth::AuthUser,
    models::PaymentMethod,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::checkout_service::{build_preview, validate_request},
    state::AppState,
    upstream::{CoreError, CorePlaceRequest},
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MIN_KEY_LEN: usize = 8;
const MAX_KEY_LEN: usize = 128;

pub fn validate_idempotency_key(raw: Option<&str>) -> AppResult<String> {
    let key = raw
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AppError::Validation("Idempotency-Key header is required".to_string()))?;
    let valid_len = (MIN_KEY_LEN..=MAX_KEY_LEN).contains(&key.len());
    if !valid_len || !key.chars().all(|c| c.is_ascii_graphic()) {
        return Err(AppError::Validation(format!(
            "Idempotency-Key must be {MIN_KEY_LEN}-{MAX_KEY_LEN} visible ASCII characters"
        )));
    }
    Ok(key.to_string())
}

fn required_method(request: &CheckoutRequest) -> AppResult<PaymentMethod> {
    request
        .payment_method_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("paymentMethodCode is required".to_string()))?
        .parse::<PaymentMethod>()
        .map_err(AppError::Validation)
}

fn require_address(request: &CheckoutRequest) -> AppResult<()> {
    if request.address_id.is_none() && request.shipping_snapshot.is_none() {
        return Err(AppError::Validation(
            "addressId or shippingSnapshot is required".to_string(),
        ));
    }
    validate_request(request)
}

/// Canonical form of a placement request; two requests with equal fingerprints are the same
/// logical order.
#[derive(Serialize)]
struct PlacementFingerprint<'a> {
    user_id: i64,
    source: CheckoutSource,
    items: Option<Vec<LineInput>>,
    address_id: Option<i64>,
    shipping_snapshot: Option<&'a ShippingSnapshot>,
    payment_method_code: PaymentMethod,
}

fn placement_fingerprint(
    user_id: i64,
    request: &CheckoutRequest,
    method: PaymentMethod,
) -> AppResult<String> {
    fingerprint(&PlacementFingerprint {
        user_id,
        source: request.source,
        items: request.items.clone().map(merge_lines),
        address_id: request.address_id,
        shipping_snapshot: request.shipping_snapshot.as_ref(),
        payment_method_code: method,
    })
}

pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    idempotency_key: Option<&str>,
    request: CheckoutRequest,
) -> AppResult<ApiResponse<PlaceResult>> {
    let key = validate_idempotency_key(idempotency_key)?;
    let method = required_method(&request)?;
    require_address(&request)?;

    let scope = format!("place:{}", user.user_id);
    let fingerprint = placement_fingerprint(user.user_id, &request, method)?;
    let store = &state.idempotency;
    let lease = state.config.claim_lease();
    let deadline = Instant::now() + state.config.idempotency.in_flight_wait;

    loop {
        match store.begin(&scope, &key, &fingerprint, lease).await? {
            BeginOutcome::Started => break,
            BeginOutcome::Completed(stored) => {
                let result: PlaceResult =
                    serde_json::from_value(stored).map_err(anyhow::Error::from)?;
                tracing::info!(
                    user_id = user.user_id,
                    order_id = result.order_id(),
                    "placement replayed"
                );
                return Ok(ApiResponse::success("Order placed", result, None));
            }
            BeginOutcome::Mismatch => {
                return Err(AppError::conflict(
                    "Idempotency-Key reused with a different request",
                ));
            }
            BeginOutcome::InFlight => {
                if Instant::now() >= deadline {
                    return Err(AppError::conflict(
                        "A request with this Idempotency-Key is still in progress",
                    ));
                }
                sleep(POLL_INTERVAL).await;
            }
        }
    }

    // The claimed commit runs on its own task so a dropped request still settles the key.
    let task = tokio::spawn(commit_and_settle(
        state.clone(),
        *user,
        scope,
        key,
        request,
        method,
    ));
    let result = task.await.map_err(anyhow::Error::from)??;
    Ok(ApiResponse::success("Order placed", result, None))
}

async fn commit_and_settle(
    state: AppState,
    user: AuthUser,
    scope: String,
    key: String,
    request: CheckoutRequest,
    method: PaymentMethod,
) -> AppResult<PlaceResult> {
    let store = &state.idempotency;
    let outcome = commit(&state, &user, &key, &request, method).await;

    let settled = match &outcome {
        Ok(result) => match serde_json::to_value(result) {
            Ok(stored) => {
                store
                    .complete(&scope, &key, &stored, state.config.idempotency.ttl)
                    .await
            }
            Err(err) => Err(AppError::Internal(err.into())),
        },
        Err(_) => store.release(&scope, &key).await,
    };
    if let Err(err) = settled {
        tracing::warn!(error = %err, user_id = user.user_id, "idempotency settle failed");
        if outcome.is_ok()
            && let Err(err) = store.release(&scope, &key).await
        {
            tracing::warn!(error = %err, user_id = user.user_id, "idempotency release failed");
        }
    }
    outcome
}

/// Re-derives the preview, commits through Core and shapes the result by payment method.
async fn commit(
    state: &AppState,
    user: &AuthUser,
    key: &str,
    request: &CheckoutRequest,
    method: PaymentMethod,
) -> AppResult<PlaceResult> {
    let preview = build_preview(state, user.user_id, request).await?;
    if preview.has_any_warning {
        return Err(AppError::Conflict {
            message: "Checkout has unresolved warnings".to_string(),
            details: Some(json!({ "warnings": preview.warnings })),
        });
    }
    if preview.payment.effective != method {
        return Err(AppError::Conflict {
            message: "payment method not available".to_string(),
            details: Some(json!({
                "requested": method,
                "options": preview.payment.options,
            })),
        });
    }

    let core_request = CorePlaceRequest {
        source: request.source,
        items: preview
            .lines
            .iter()
            .map(|line| LineInput {
                variant_id: line.variant_id,
                qty: line.qty_requested,
            })
            .collect(),
        address_id: request.address_id,
        shipping_snapshot: request.shipping_snapshot.clone(),
        payment_method_code: method,
        expected_grand_total: preview.totals.grand_total,
    };

    let raw = state
        .core
        .place_order(user.user_id, key, &core_request)
        .await
        .map_err(|err| match err {
            CoreError::Timeout => AppError::UpstreamUnavailable {
                message: "Order outcome unknown; retry with the same Idempotency-Key".to_string(),
                timed_out: true,
            },
            other => other.into(),
        })?;

    let asset_base = &state.config.asset_base_url;
    let placement = normalize_placement(&raw, asset_base);
    let order_id = placement.order_id.ok_or_else(|| {
        AppError::BadUpstreamResponse("placement response has no order id".to_string())
    })?;

    let result = match method {
        PaymentMethod::Cod => PlaceResult::cod(
            order_id,
            placement
                .message
                .unwrap_or_else(|| "Order placed. Pay on delivery.".to_string()),
        ),
        PaymentMethod::BankTransfer => {
            let mut instructions = placement
                .instructions
                .unwrap_or_default()
                .or_fallback(&state.config.payment.bank_transfer);
            if !instructions.image_url.is_empty() {
                instructions.image_url = absolutize(asset_base, &instructions.image_url);
            }
            PlaceResult::bank_transfer(order_id, instructions)
        }
        PaymentMethod::Vnpay => {
            let payment_url = placement.payment_url.ok_or_else(|| {
                AppError::BadUpstreamResponse(
                    "VNPAY placement response has no payment url".to_string(),
                )
            })?;
            PlaceResult::vnpay(order_id, payment_url)
        }
    };

    tracing::info!(
        user_id = user.user_id,
        order_id,
        method = %method,
        grand_total = preview.totals.grand_total,
        "order placed"
    );
    audit::record(
        state,
        Some(user.user_id),
        AuditAction::OrderPlaced,
        json!({
            "order_id": order_id,
            "payment_method_code": method,
            "grand_total": preview.totals.grand_total,
        }),
    )
    .await;

    Ok(result)
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    order_id: i64,
) -> AppResult<ApiResponse<OrderSummary>> {
    if order_id <= 0 {
        return Err(AppError::Validation(
            "orderId must be a positive integer".to_string(),
        ));
    }
    let raw = state.core.get_order(user.user_id, order_id).await?;
    let order = normalize_order(&raw).ok_or_else(|| {
        AppError::BadUpstreamResponse("order response has no order id".to_string())
    })?;
    Ok(ApiResponse::success("OK", order, None))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, per_page) = pagination.normalize();
    let raw = state.core.list_orders(user.user_id, page, per_page).await?;
    let (items, total) = normalize_order_page(&raw);

    let total = match total {
        Some(total) => total,
        None => {
            let counted = state.core.count_orders(user.user_id).await?;
            normalize_count(&counted).ok_or_else(|| {
                AppError::BadUpstreamResponse("order count response has no total".to_string())
            })?
        }
    };

    Ok(ApiResponse::success(
        "OK",
        OrderList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}
