//! Outbound contract with the Core commerce service.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    dto::checkout::{CheckoutSource, LineInput, ShippingSnapshot},
    error::AppError,
    models::PaymentMethod,
};

pub mod client;

pub use client::CoreClient;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Core did not answer in time")]
    Timeout,

    #[error("Core is unreachable: {0}")]
    Unreachable(String),

    #[error("Core rejected the request with status {status}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    #[error("Core returned an unreadable body: {0}")]
    Malformed(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::Rejected { status: 404, .. })
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Timeout => AppError::UpstreamUnavailable {
                message: "Core did not answer in time".into(),
                timed_out: true,
            },
            CoreError::Unreachable(reason) => AppError::UpstreamUnavailable {
                message: reason,
                timed_out: false,
            },
            CoreError::Malformed(reason) => AppError::BadUpstreamResponse(reason),
            CoreError::Rejected {
                status,
                code,
                message,
            } => {
                let message = message.unwrap_or_else(|| format!("Core responded with {status}"));
                match status {
                    401 => AppError::Unauthorized(message),
                    404 => AppError::NotFound(message),
                    502..=504 => AppError::UpstreamUnavailable {
                        message,
                        timed_out: status == 504,
                    },
                    _ => AppError::UpstreamRejected {
                        status: StatusCode::from_u16(status)
                            .unwrap_or(StatusCode::BAD_GATEWAY),
                        code,
                        message,
                    },
                }
            }
        }
    }
}

/// Cart line mutation body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreLine {
    pub variant_id: i64,
    pub qty: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorePreviewRequest {
    pub source: CheckoutSource,
    pub items: Vec<LineInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_snapshot: Option<ShippingSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_code: Option<PaymentMethod>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorePlaceRequest {
    pub source: CheckoutSource,
    pub items: Vec<LineInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_snapshot: Option<ShippingSnapshot>,
    pub payment_method_code: PaymentMethod,
    /// Lets Core refuse the commit if pricing drifted after the local re-quote.
    pub expected_grand_total: i64,
}

/// Core's internal API. Responses are returned raw; callers normalize them.
#[async_trait]
pub trait CoreApi: Send + Sync {
    async fn get_cart(&self, user_id: i64) -> CoreResult<Value>;

    async fn add_cart_item(&self, user_id: i64, line: CoreLine) -> CoreResult<Value>;

    async fn set_cart_item_qty(&self, user_id: i64, line: CoreLine) -> CoreResult<Value>;

    async fn remove_cart_item(&self, user_id: i64, cart_item_id: i64) -> CoreResult<Value>;

    async fn preview_checkout(
        &self,
        user_id: i64,
        request: &CorePreviewRequest,
    ) -> CoreResult<Value>;

    /// Core deduplicates on `(user_id, idempotency_key)`.
    async fn place_order(
        &self,
        user_id: i64,
        idempotency_key: &str,
        request: &CorePlaceRequest,
    ) -> CoreResult<Value>;

    async fn verify_payment(&self, params: &BTreeMap<String, String>) -> CoreResult<Value>;

    async fn list_orders(&self, user_id: i64, page: i64, limit: i64) -> CoreResult<Value>;

    async fn count_orders(&self, user_id: i64) -> CoreResult<Value>;

    async fn get_order(&self, user_id: i64, order_id: i64) -> CoreResult<Value>;
}
