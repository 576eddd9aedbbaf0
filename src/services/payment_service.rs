use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use url::form_urlencoded;

use crate::{
    audit::{self, AuditAction},
    dto::{
        normalize::normalize_payment_outcome,
        payment::{PaymentOutcome, PaymentReturnData},
    },
    error::{AppError, AppResult},
    idempotency::fingerprint,
    models::PaymentStatus,
    response::ApiResponse,
    state::AppState,
};

pub const PARAM_PREFIX: &str = "vnp_";
const CALLBACK_SCOPE: &str = "payment-callback";
const ORDER_SCOPE: &str = "payment-order";
const REQUIRED_PARAMS: [&str; 2] = ["vnp_TxnRef", "vnp_SecureHash"];

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Provider parameters from the query string and the body. Body values win on collision.
/// Anything without the `vnp_` prefix is dropped.
pub fn collect_params(
    query: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> AppResult<BTreeMap<String, String>> {
    let mut params: BTreeMap<String, String> = BTreeMap::new();

    if let Some(query) = query {
        params.extend(form_urlencoded::parse(query.as_bytes()).into_owned());
    }

    let body_text = std::str::from_utf8(body)
        .map_err(|_| AppError::MalformedPaymentCallback("body is not valid UTF-8".to_string()))?
        .trim();
    if !body_text.is_empty() {
        let is_json = content_type.is_some_and(|ct| ct.contains("json")) || body_text.starts_with('{');
        if is_json {
            let object: Map<String, Value> = serde_json::from_str(body_text).map_err(|_| {
                AppError::MalformedPaymentCallback("body is not a flat JSON object".to_string())
            })?;
            params.extend(
                object
                    .iter()
                    .filter_map(|(key, value)| scalar(value).map(|value| (key.clone(), value))),
            );
        } else {
            params.extend(form_urlencoded::parse(body_text.as_bytes()).into_owned());
        }
    }

    params.retain(|key, _| key.starts_with(PARAM_PREFIX));
    Ok(params)
}

fn ensure_callback(params: &BTreeMap<String, String>) -> AppResult<()> {
    if params.is_empty() {
        return Err(AppError::NotPaymentCallback);
    }
    for name in REQUIRED_PARAMS {
        if !params.get(name).is_some_and(|value| !value.trim().is_empty()) {
            return Err(AppError::MalformedPaymentCallback(format!("{name} is missing")));
        }
    }
    Ok(())
}

fn respond(outcome: PaymentOutcome) -> ApiResponse<PaymentReturnData> {
    let paid = outcome.status == PaymentStatus::Paid;
    let data = PaymentReturnData::from(outcome);
    if paid {
        ApiResponse::success("Payment confirmed", data, None)
    } else {
        ApiResponse::unsuccessful("Payment was not completed", data)
    }
}

fn decode_outcome(stored: Value) -> AppResult<PaymentOutcome> {
    serde_json::from_value(stored).map_err(|err| AppError::Internal(err.into()))
}

/// Verifies a gateway callback through Core and applies the verdict.
///
/// Identical callbacks replay the first verdict without reaching Core again, and an order
/// recorded as paid never regresses.
pub async fn reconcile(
    state: &AppState,
    params: BTreeMap<String, String>,
) -> AppResult<ApiResponse<PaymentReturnData>> {
    ensure_callback(&params)?;

    let store = &state.idempotency;
    let ttl = state.config.idempotency.ttl;
    let callback_key = fingerprint(&params)?;

    if let Some(stored) = store.lookup(CALLBACK_SCOPE, &callback_key).await? {
        let outcome = decode_outcome(stored)?;
        tracing::debug!(order_id = outcome.order_id, "payment callback replayed");
        return Ok(respond(outcome));
    }

    let raw = state.core.verify_payment(&params).await?;
    let txn_ref = params.get("vnp_TxnRef").and_then(|r| r.trim().parse::<i64>().ok());
    let mut outcome = normalize_payment_outcome(&raw, txn_ref)?;

    let order_key = outcome.order_id.to_string();
    if let Some(previous) = store.lookup(ORDER_SCOPE, &order_key).await? {
        let previous = decode_outcome(previous)?;
        if previous.status == PaymentStatus::Paid && outcome.status != PaymentStatus::Paid {
            tracing::warn!(
                order_id = outcome.order_id,
                "ignoring non-paid verdict for an order already paid"
            );
            outcome = previous;
        }
    }

    let stored = serde_json::to_value(&outcome).map_err(anyhow::Error::from)?;
    store.record(ORDER_SCOPE, &order_key, &stored, ttl).await?;
    store.record(CALLBACK_SCOPE, &callback_key, &stored, ttl).await?;

    tracing::info!(
        order_id = outcome.order_id,
        status = %outcome.status,
        "payment reconciled"
    );
    audit::record(
        state,
        None,
        AuditAction::PaymentReconciled,
        json!({
            "order_id": outcome.order_id,
            "payment_status": outcome.status,
            "txn_ref": params.get("vnp_TxnRef"),
        }),
    )
    .await;

    Ok(respond(outcome))
}
