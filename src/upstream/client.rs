use std::{collections::BTreeMap, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::instrument;
use url::Url;

use super::{CoreApi, CoreError, CoreLine, CorePlaceRequest, CorePreviewRequest, CoreResult};
use crate::{config::CoreConfig, dto::normalize::upstream_error};

const INTERNAL_KEY_HEADER: &str = "x-internal-key";
const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// HTTP client for Core's internal API.
///
/// Every call carries the shared `x-internal-key` secret and is bounded by the configured
/// timeout. A timeout surfaces as [`CoreError::Timeout`], never as a rejection.
#[derive(Clone)]
pub struct CoreClient {
    inner: Arc<CoreClientInner>,
}

struct CoreClientInner {
    client: reqwest::Client,
    base_url: String,
    internal_key: SecretString,
}

impl CoreClient {
    pub fn new(config: &CoreConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("CORE_BASE_URL is not a valid URL: {}", config.base_url))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("storefront-bff/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .context("failed to build Core HTTP client")?;

        Ok(Self {
            inner: Arc::new(CoreClientInner {
                client,
                base_url: base.as_str().trim_end_matches('/').to_string(),
                internal_key: config.internal_key.clone(),
            }),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.inner
            .client
            .request(method, format!("{}{}", self.inner.base_url, path))
            .header(INTERNAL_KEY_HEADER, self.inner.internal_key.expose_secret())
    }

    async fn send(&self, request: RequestBuilder) -> CoreResult<Value> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            Ok(Value::Null)
        } else {
            serde_json::from_slice::<Value>(&bytes)
        };

        if status.is_success() {
            return body.map_err(|err| CoreError::Malformed(err.to_string()));
        }

        let (code, message) = body.as_ref().map(upstream_error).unwrap_or_default();
        tracing::debug!(status = %status, code = ?code, "core rejected request");
        Err(CoreError::Rejected {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

fn transport_error(err: reqwest::Error) -> CoreError {
    if err.is_timeout() {
        CoreError::Timeout
    } else {
        CoreError::Unreachable(err.to_string())
    }
}

#[async_trait]
impl CoreApi for CoreClient {
    #[instrument(skip(self))]
    async fn get_cart(&self, user_id: i64) -> CoreResult<Value> {
        self.send(self.request(Method::GET, &format!("/internal/users/{user_id}/cart")))
            .await
    }

    #[instrument(skip(self), fields(variant_id = line.variant_id, qty = line.qty))]
    async fn add_cart_item(&self, user_id: i64, line: CoreLine) -> CoreResult<Value> {
        let path = format!("/internal/users/{user_id}/cart/items");
        self.send(self.request(Method::POST, &path).json(&line)).await
    }

    #[instrument(skip(self), fields(variant_id = line.variant_id, qty = line.qty))]
    async fn set_cart_item_qty(&self, user_id: i64, line: CoreLine) -> CoreResult<Value> {
        let path = format!("/internal/users/{user_id}/cart/items");
        self.send(self.request(Method::PATCH, &path).json(&line)).await
    }

    #[instrument(skip(self))]
    async fn remove_cart_item(&self, user_id: i64, cart_item_id: i64) -> CoreResult<Value> {
        let path = format!("/internal/users/{user_id}/cart/items/{cart_item_id}");
        self.send(self.request(Method::DELETE, &path)).await
    }

    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    async fn preview_checkout(
        &self,
        user_id: i64,
        request: &CorePreviewRequest,
    ) -> CoreResult<Value> {
        let path = format!("/internal/users/{user_id}/checkout/preview");
        self.send(self.request(Method::POST, &path).json(request))
            .await
    }

    #[instrument(skip(self, idempotency_key, request), fields(method = %request.payment_method_code))]
    async fn place_order(
        &self,
        user_id: i64,
        idempotency_key: &str,
        request: &CorePlaceRequest,
    ) -> CoreResult<Value> {
        let path = format!("/internal/users/{user_id}/checkout/place");
        self.send(
            self.request(Method::POST, &path)
                .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
                .json(request),
        )
        .await
    }

    #[instrument(skip(self, params), fields(params = params.len()))]
    async fn verify_payment(&self, params: &BTreeMap<String, String>) -> CoreResult<Value> {
        self.send(
            self.request(Method::POST, "/internal/payments/vnpay/verify")
                .json(&json!({ "params": params })),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_orders(&self, user_id: i64, page: i64, limit: i64) -> CoreResult<Value> {
        let path = format!("/internal/users/{user_id}/orders");
        self.send(
            self.request(Method::GET, &path)
                .query(&[("page", page), ("limit", limit)]),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn count_orders(&self, user_id: i64) -> CoreResult<Value> {
        let path = format!("/internal/users/{user_id}/orders/count");
        self.send(self.request(Method::GET, &path)).await
    }

    #[instrument(skip(self))]
    async fn get_order(&self, user_id: i64, order_id: i64) -> CoreResult<Value> {
        let path = format!("/internal/users/{user_id}/orders/{order_id}");
        self.send(self.request(Method::GET, &path)).await
    }
}
