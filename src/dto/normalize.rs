//! Conversion of Core payloads into the canonical DTOs.
//!
//! Core answers in more than one dialect: camelCase or snake_case keys, records wrapped in
//! `data` (sometimes twice), nested `variant`/`product` objects or flattened fields. Each
//! canonical field is read through an ordered list of candidate keys; dotted keys descend into
//! nested objects. The first candidate that yields a usable value wins.
//!
//! Everything here is pure: no I/O, no logging.

use serde_json::Value;
use thiserror::Error;

use crate::{
    dto::{
        cart::{CartDto, CartItemDto, CartPayload},
        checkout::{PaymentInstructions, ShippingSnapshot},
        orders::OrderSummary,
        payment::PaymentOutcome,
    },
    error::AppError,
    models::{PaymentMethod, PaymentStatus},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("upstream response has no {0}")]
    MissingField(&'static str),
    #[error("upstream {0} is out of range")]
    OutOfRange(&'static str),
}

impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        AppError::BadUpstreamResponse(err.to_string())
    }
}

/// Candidate keys per canonical field, in priority order.
pub mod keys {
    pub const CART: &[&str] = &["cart"];
    pub const CART_ID: &[&str] = &["cartId", "cart_id", "id"];
    pub const CART_ITEMS: &[&str] = &["items", "cartItems", "cart_items", "lines"];

    pub const ITEM_ID: &[&str] = &["cartItemId", "cart_item_id", "itemId", "item_id", "id"];
    pub const VARIANT_ID: &[&str] = &[
        "variantId",
        "variant_id",
        "productVariantId",
        "product_variant_id",
        "variant.id",
    ];
    pub const PRODUCT_ID: &[&str] = &[
        "productId",
        "product_id",
        "product.id",
        "variant.productId",
        "variant.product_id",
        "variant.product.id",
    ];
    pub const QTY: &[&str] = &["qty", "quantity"];
    pub const PRICE_SNAPSHOT: &[&str] = &[
        "unitPriceSnapshot",
        "unit_price_snapshot",
        "priceSnapshot",
        "price_snapshot",
        "unitPrice",
        "unit_price",
    ];
    pub const CURRENT_PRICE: &[&str] = &[
        "currentPrice",
        "current_price",
        "variant.price",
        "variant.currentPrice",
        "variant.current_price",
        "price",
    ];
    pub const PRODUCT_NAME: &[&str] = &[
        "productName",
        "product_name",
        "product.name",
        "variant.product.name",
        "name",
    ];
    pub const VARIANT_NAME: &[&str] = &[
        "variantName",
        "variant_name",
        "variant.name",
        "capacity",
        "variant.capacity",
    ];
    pub const IMAGE: &[&str] = &[
        "imageUrl",
        "image_url",
        "image",
        "thumbnail",
        "variant.imageUrl",
        "variant.image_url",
        "variant.image",
        "product.imageUrl",
        "product.image_url",
        "product.image",
        "variant.product.imageUrl",
        "variant.product.image_url",
        "variant.product.image",
    ];

    pub const QUOTE_LINES: &[&str] = &["lines", "items", "previewLines", "preview_lines"];
    pub const QUOTE_UNIT_PRICE: &[&str] = &[
        "currentPrice",
        "current_price",
        "unitPrice",
        "unit_price",
        "price",
        "variant.price",
    ];
    pub const AVAILABLE: &[&str] = &[
        "available",
        "availableQty",
        "available_qty",
        "stock",
        "stockQty",
        "stock_qty",
        "variant.stock",
        "variant.stockQty",
        "variant.stock_qty",
    ];
    pub const VARIANT_ACTIVE: &[&str] = &[
        "isActive",
        "is_active",
        "active",
        "variant.isActive",
        "variant.is_active",
    ];
    pub const PRODUCT_ACTIVE: &[&str] = &[
        "productActive",
        "product_active",
        "product.isActive",
        "product.is_active",
        "variant.product.isActive",
        "variant.product.is_active",
    ];
    pub const LINE_STATUS: &[&str] = &["status", "variant.status"];
    pub const SHIPPING_FEE: &[&str] = &[
        "shippingFee",
        "shipping_fee",
        "totals.shippingFee",
        "totals.shipping_fee",
        "shipping.fee",
    ];
    pub const DISCOUNT: &[&str] = &[
        "discountTotal",
        "discount_total",
        "discount",
        "totals.discountTotal",
        "totals.discount_total",
    ];
    pub const ADDRESS: &[&str] = &[
        "addressSnapshot",
        "address_snapshot",
        "shippingSnapshot",
        "shipping_snapshot",
        "shippingAddress",
        "shipping_address",
        "address",
    ];
    pub const PAYMENT_OPTIONS: &[&str] = &[
        "paymentOptions",
        "payment_options",
        "paymentMethods",
        "payment_methods",
        "payment.options",
    ];
    pub const OPTION_CODE: &[&str] = &["code", "paymentMethodCode", "payment_method_code", "method"];
    pub const OPTION_ENABLED: &[&str] = &["enabled", "isEnabled", "is_enabled", "active"];

    pub const RECIPIENT: &[&str] = &[
        "recipientName",
        "recipient_name",
        "receiverName",
        "receiver_name",
        "fullName",
        "full_name",
        "name",
    ];
    pub const PHONE: &[&str] = &[
        "phone",
        "phoneNumber",
        "phone_number",
        "receiverPhone",
        "receiver_phone",
    ];
    pub const LINE1: &[&str] = &[
        "addressLine1",
        "address_line1",
        "line1",
        "street",
        "detail",
        "addressDetail",
        "address_detail",
    ];
    pub const LINE2: &[&str] = &["addressLine2", "address_line2", "line2"];
    pub const WARD: &[&str] = &["ward", "wardName", "ward_name"];
    pub const DISTRICT: &[&str] = &["district", "districtName", "district_name"];
    pub const PROVINCE: &[&str] = &["province", "provinceName", "province_name", "city"];

    pub const ORDER_ID: &[&str] = &["orderId", "order_id", "order.id", "order.orderId", "id"];
    pub const PAYMENT_URL: &[&str] = &[
        "paymentUrl",
        "payment_url",
        "redirectUrl",
        "redirect_url",
        "payUrl",
        "pay_url",
        "payment.url",
    ];
    pub const INSTRUCTIONS: &[&str] = &[
        "paymentInstructions",
        "payment_instructions",
        "bankTransfer",
        "bank_transfer",
        "instructions",
    ];
    pub const QR_IMAGE: &[&str] = &[
        "imageUrl",
        "image_url",
        "qrImageUrl",
        "qr_image_url",
        "qrUrl",
        "qr_url",
    ];
    pub const NOTE: &[&str] = &["note", "transferNote", "transfer_note"];
    pub const NOTE_HINT: &[&str] = &["noteHint", "note_hint", "hint"];
    pub const CONTACT_PHONE: &[&str] = &["phone", "contactPhone", "contact_phone"];
    pub const MESSAGE: &[&str] = &["message", "Message", "msg"];

    pub const VERIFIED_STATUS: &[&str] = &[
        "paymentStatus",
        "payment_status",
        "order.paymentStatus",
        "order.payment_status",
        "status",
    ];
    pub const VERIFIED_PAID: &[&str] = &["paid", "isPaid", "is_paid", "isSuccess", "is_success"];
    pub const RESPONSE_CODE: &[&str] = &["vnp_ResponseCode", "responseCode", "response_code"];
    pub const TRANSACTION_STATUS: &[&str] = &[
        "vnp_TransactionStatus",
        "transactionStatus",
        "transaction_status",
    ];

    pub const ERROR_MESSAGE: &[&str] = &["message", "error.message", "error", "detail", "msg"];
    pub const ERROR_CODE: &[&str] = &["code", "errorCode", "error_code", "error.code"];

    pub const ORDER_CODE: &[&str] = &["orderCode", "order_code", "code"];
    pub const ORDER_STATUS: &[&str] = &["orderStatus", "order_status", "status"];
    pub const ORDER_PAYMENT_STATUS: &[&str] = &["paymentStatus", "payment_status"];
    pub const ORDER_PAYMENT_METHOD: &[&str] = &[
        "paymentMethodCode",
        "payment_method_code",
        "paymentMethod",
        "payment_method",
    ];
    pub const GRAND_TOTAL: &[&str] = &[
        "grandTotal",
        "grand_total",
        "totalAmount",
        "total_amount",
        "totals.grandTotal",
        "totals.grand_total",
        "total",
    ];
    pub const CREATED_AT: &[&str] = &["createdAt", "created_at"];
    pub const ORDER_LIST: &[&str] = &["items", "orders", "rows", "list"];
    pub const LIST_TOTAL: &[&str] = &[
        "total",
        "totalCount",
        "total_count",
        "count",
        "meta.total",
        "pagination.total",
    ];
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

/// First candidate key whose value converts successfully.
pub fn pick<'a, T>(
    value: &'a Value,
    candidates: &[&str],
    convert: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    candidates
        .iter()
        .find_map(|key| lookup(value, key).and_then(&convert))
}

pub fn as_i64(value: &Value) -> Option<i64> {
    // `i64::MAX as f64` rounds up to 2^63, hence the strict upper bound.
    let whole = |f: f64| {
        (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64)
            .then_some(f as i64)
    };
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    }
}

pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Descends through `data` wrappers.
pub fn unwrap_envelope(raw: &Value) -> &Value {
    let mut current = raw;
    for _ in 0..3 {
        match current.get("data") {
            Some(inner) if inner.is_object() || inner.is_array() => current = inner,
            _ => break,
        }
    }
    current
}

/// Rewrites a relative asset path against `asset_base`; absolute URLs pass through.
pub fn absolutize(asset_base: &str, path: &str) -> String {
    let path = path.trim();
    let is_absolute = path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("//")
        || path.starts_with("data:");
    if is_absolute || asset_base.is_empty() {
        return path.to_string();
    }
    format!(
        "{}/{}",
        asset_base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn image(value: &Value, candidates: &[&str], asset_base: &str) -> Option<String> {
    pick(value, candidates, as_string).map(|path| absolutize(asset_base, &path))
}

pub fn normalize_cart(
    raw: &Value,
    user_id: i64,
    asset_base: &str,
) -> Result<CartPayload, NormalizeError> {
    let body = unwrap_envelope(raw);
    let cart = pick(body, keys::CART, |v| (v.is_object() || v.is_array()).then_some(v))
        .map(unwrap_envelope)
        .unwrap_or(body);

    if let Some(items) = cart.as_array() {
        let items = normalize_items(items, asset_base)?;
        return Ok(CartPayload::Cart(CartDto::new(None, user_id, items)?));
    }
    if !cart.is_object() {
        return Ok(CartPayload::Ack);
    }

    let items = pick(cart, keys::CART_ITEMS, Value::as_array);
    // An echoed cart line is not a cart.
    let is_line_echo = items.is_none() && pick(cart, keys::VARIANT_ID, as_i64).is_some();
    let cart_id = pick(cart, keys::CART_ID, as_i64);
    if is_line_echo || (items.is_none() && cart_id.is_none()) {
        return Ok(CartPayload::Ack);
    }

    let items = match items {
        Some(items) => normalize_items(items, asset_base)?,
        None => Vec::new(),
    };
    Ok(CartPayload::Cart(CartDto::new(cart_id, user_id, items)?))
}

fn normalize_items(items: &[Value], asset_base: &str) -> Result<Vec<CartItemDto>, NormalizeError> {
    items
        .iter()
        .filter_map(|item| normalize_cart_item(item, asset_base).transpose())
        .collect()
}

/// Lines without an identity, without a variant, or with a non-positive quantity are dropped.
/// A line whose subtotal does not fit an `i64` is an error.
pub fn normalize_cart_item(
    value: &Value,
    asset_base: &str,
) -> Result<Option<CartItemDto>, NormalizeError> {
    let (Some(id), Some(variant_id), Some(qty)) = (
        pick(value, keys::ITEM_ID, as_i64),
        pick(value, keys::VARIANT_ID, as_i64),
        pick(value, keys::QTY, as_i64).filter(|qty| *qty > 0),
    ) else {
        return Ok(None);
    };
    let unit_price_snapshot = pick(value, keys::PRICE_SNAPSHOT, as_i64);
    let current_price = pick(value, keys::CURRENT_PRICE, as_i64);
    let effective_unit_price = unit_price_snapshot.or(current_price).unwrap_or(0);
    let line_subtotal = effective_unit_price
        .checked_mul(qty)
        .ok_or(NormalizeError::OutOfRange("cart line subtotal"))?;

    Ok(Some(CartItemDto {
        id,
        variant_id,
        product_id: pick(value, keys::PRODUCT_ID, as_i64),
        product_name: pick(value, keys::PRODUCT_NAME, as_string),
        variant_name: pick(value, keys::VARIANT_NAME, as_string),
        image_url: image(value, keys::IMAGE, asset_base),
        qty,
        unit_price_snapshot,
        current_price,
        effective_unit_price,
        line_subtotal,
    }))
}

/// Core's pricing of one requested line.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotedLine {
    pub variant_id: i64,
    pub unit_price: Option<i64>,
    pub available: Option<i64>,
    pub active: bool,
    pub product_name: Option<String>,
    pub variant_name: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoreQuote {
    pub lines: Vec<QuotedLine>,
    pub shipping_fee: i64,
    pub discount_total: i64,
    pub address_snapshot: Option<ShippingSnapshot>,
    /// `None` when Core did not say which methods are offered.
    pub payment_options: Option<Vec<PaymentMethod>>,
}

impl CoreQuote {
    pub fn line(&self, variant_id: i64) -> Option<&QuotedLine> {
        self.lines.iter().find(|line| line.variant_id == variant_id)
    }
}

pub fn normalize_quote(raw: &Value, asset_base: &str) -> CoreQuote {
    let body = unwrap_envelope(raw);
    let lines = pick(body, keys::QUOTE_LINES, Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| normalize_quoted_line(line, asset_base))
                .collect()
        })
        .unwrap_or_default();

    CoreQuote {
        lines,
        shipping_fee: pick(body, keys::SHIPPING_FEE, as_i64).unwrap_or(0),
        discount_total: pick(body, keys::DISCOUNT, as_i64).unwrap_or(0),
        address_snapshot: pick(body, keys::ADDRESS, normalize_address),
        payment_options: pick(body, keys::PAYMENT_OPTIONS, normalize_payment_options),
    }
}

fn normalize_quoted_line(value: &Value, asset_base: &str) -> Option<QuotedLine> {
    let variant_id = pick(value, keys::VARIANT_ID, as_i64)?;
    let variant_active = pick(value, keys::VARIANT_ACTIVE, as_bool).unwrap_or(true);
    let product_active = pick(value, keys::PRODUCT_ACTIVE, as_bool).unwrap_or(true);
    let status_active = pick(value, keys::LINE_STATUS, as_string)
        .map(|status| {
            !matches!(
                status.to_ascii_lowercase().as_str(),
                "inactive" | "disabled" | "archived" | "deleted" | "hidden"
            )
        })
        .unwrap_or(true);

    Some(QuotedLine {
        variant_id,
        unit_price: pick(value, keys::QUOTE_UNIT_PRICE, as_i64).filter(|price| *price >= 0),
        available: pick(value, keys::AVAILABLE, as_i64),
        active: variant_active && product_active && status_active,
        product_name: pick(value, keys::PRODUCT_NAME, as_string),
        variant_name: pick(value, keys::VARIANT_NAME, as_string),
        image_url: image(value, keys::IMAGE, asset_base),
    })
}

fn normalize_payment_options(value: &Value) -> Option<Vec<PaymentMethod>> {
    let entries = value.as_array()?;
    let mut methods = Vec::new();
    for entry in entries {
        let method = match entry {
            Value::String(code) => code.parse::<PaymentMethod>().ok(),
            Value::Object(_) => {
                let enabled = pick(entry, keys::OPTION_ENABLED, as_bool).unwrap_or(true);
                pick(entry, keys::OPTION_CODE, as_string)
                    .and_then(|code| code.parse::<PaymentMethod>().ok())
                    .filter(|_| enabled)
            }
            _ => None,
        };
        if let Some(method) = method
            && !methods.contains(&method)
        {
            methods.push(method);
        }
    }
    (!methods.is_empty()).then_some(methods)
}

pub fn normalize_address(value: &Value) -> Option<ShippingSnapshot> {
    if !value.is_object() {
        return None;
    }
    let recipient_name = pick(value, keys::RECIPIENT, as_string);
    let address_line1 = pick(value, keys::LINE1, as_string);
    if recipient_name.is_none() && address_line1.is_none() {
        return None;
    }
    Some(ShippingSnapshot {
        recipient_name: recipient_name.unwrap_or_default(),
        phone: pick(value, keys::PHONE, as_string).unwrap_or_default(),
        address_line1: address_line1.unwrap_or_default(),
        address_line2: pick(value, keys::LINE2, as_string),
        ward: pick(value, keys::WARD, as_string),
        district: pick(value, keys::DISTRICT, as_string),
        province: pick(value, keys::PROVINCE, as_string),
    })
}

/// Fields of a placement response before they are bound to a payment method.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPlacement {
    pub order_id: Option<i64>,
    pub payment_url: Option<String>,
    pub instructions: Option<PaymentInstructions>,
    pub message: Option<String>,
}

pub fn normalize_placement(raw: &Value, asset_base: &str) -> RawPlacement {
    let body = unwrap_envelope(raw);
    RawPlacement {
        order_id: pick(body, keys::ORDER_ID, as_i64),
        payment_url: pick(body, keys::PAYMENT_URL, as_string)
            .or_else(|| pick(raw, keys::PAYMENT_URL, as_string)),
        instructions: pick(body, keys::INSTRUCTIONS, |v| {
            normalize_instructions(v, asset_base)
        }),
        message: pick(body, keys::MESSAGE, as_string).or_else(|| pick(raw, keys::MESSAGE, as_string)),
    }
}

fn normalize_instructions(value: &Value, asset_base: &str) -> Option<PaymentInstructions> {
    if !value.is_object() {
        return None;
    }
    Some(PaymentInstructions {
        image_url: image(value, keys::QR_IMAGE, asset_base).unwrap_or_default(),
        note: pick(value, keys::NOTE, as_string).unwrap_or_default(),
        phone: pick(value, keys::CONTACT_PHONE, as_string).unwrap_or_default(),
        note_hint: pick(value, keys::NOTE_HINT, as_string).unwrap_or_default(),
    })
}

fn verdict(value: &Value) -> Option<PaymentStatus> {
    let parsed_status = |v: &Value| as_string(v).and_then(|s| s.parse::<PaymentStatus>().ok());
    if let Some(status) = pick(value, keys::VERIFIED_STATUS, parsed_status) {
        return Some(match status {
            PaymentStatus::Paid => PaymentStatus::Paid,
            _ => PaymentStatus::Failed,
        });
    }
    if let Some(paid) = pick(value, keys::VERIFIED_PAID, as_bool) {
        return Some(if paid {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Failed
        });
    }
    let code = pick(value, keys::RESPONSE_CODE, as_string)?;
    let transaction_ok = pick(value, keys::TRANSACTION_STATUS, as_string)
        .is_none_or(|status| status == "00");
    Some(if code == "00" && transaction_ok {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Failed
    })
}

/// Collapses Core's verification answer into `paid` or `failed`. Anything that does not
/// positively confirm payment is `failed`.
pub fn normalize_payment_outcome(
    raw: &Value,
    fallback_order_id: Option<i64>,
) -> Result<PaymentOutcome, NormalizeError> {
    let body = unwrap_envelope(raw);
    let order_id = pick(body, keys::ORDER_ID, as_i64)
        .or_else(|| pick(raw, keys::ORDER_ID, as_i64))
        .or(fallback_order_id)
        .ok_or(NormalizeError::MissingField("orderId"))?;
    let status = verdict(body)
        .or_else(|| verdict(raw))
        .unwrap_or(PaymentStatus::Failed);
    let message = pick(body, keys::MESSAGE, as_string).or_else(|| pick(raw, keys::MESSAGE, as_string));

    Ok(PaymentOutcome {
        order_id,
        status,
        message,
    })
}

/// Error `(code, message)` from a non-success Core body.
pub fn upstream_error(raw: &Value) -> (Option<String>, Option<String>) {
    let code = pick(raw, keys::ERROR_CODE, as_string);
    let message = pick(raw, keys::ERROR_MESSAGE, as_string);
    (code, message)
}

pub fn normalize_order(value: &Value) -> Option<OrderSummary> {
    let body = unwrap_envelope(value);
    let order = pick(body, &["order"], |v| v.is_object().then_some(v)).unwrap_or(body);
    Some(OrderSummary {
        order_id: pick(order, keys::ORDER_ID, as_i64)?,
        order_code: pick(order, keys::ORDER_CODE, as_string),
        status: pick(order, keys::ORDER_STATUS, as_string),
        payment_method_code: pick(order, keys::ORDER_PAYMENT_METHOD, |v| {
            as_string(v).and_then(|s| s.parse().ok())
        }),
        payment_status: pick(order, keys::ORDER_PAYMENT_STATUS, |v| {
            as_string(v).and_then(|s| s.parse().ok())
        }),
        grand_total: pick(order, keys::GRAND_TOTAL, as_i64),
        shipping_snapshot: pick(order, keys::ADDRESS, normalize_address),
        created_at: pick(order, keys::CREATED_AT, as_string),
    })
}

/// Orders on one page plus the total, when Core reports it.
pub fn normalize_order_page(raw: &Value) -> (Vec<OrderSummary>, Option<i64>) {
    let body = unwrap_envelope(raw);
    let rows = body
        .as_array()
        .or_else(|| pick(body, keys::ORDER_LIST, Value::as_array));
    let orders = rows
        .map(|rows| rows.iter().filter_map(normalize_order).collect())
        .unwrap_or_default();
    let total = pick(body, keys::LIST_TOTAL, as_i64).or_else(|| pick(raw, keys::LIST_TOTAL, as_i64));
    (orders, total)
}

pub fn normalize_count(raw: &Value) -> Option<i64> {
    as_i64(raw)
        .or_else(|| as_i64(unwrap_envelope(raw)))
        .or_else(|| pick(unwrap_envelope(raw), keys::LIST_TOTAL, as_i64))
        .or_else(|| pick(raw, keys::LIST_TOTAL, as_i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ASSETS: &str = "https://cdn.example.com/";

    fn expect_cart(payload: Result<CartPayload, NormalizeError>) -> CartDto {
        match payload {
            Ok(CartPayload::Cart(cart)) => cart,
            other => panic!("expected a cart, got {other:?}"),
        }
    }

    #[test]
    fn cart_shapes_normalize_to_the_same_dto() {
        let camel = json!({
            "cartId": 7,
            "items": [{
                "cartItemId": 11,
                "variantId": 101,
                "qty": 2,
                "unitPriceSnapshot": 590,
                "currentPrice": 620,
                "productName": "Serum",
                "variantName": "30ml",
                "imageUrl": "/img/serum.png"
            }]
        });
        let snake_enveloped = json!({
            "success": true,
            "data": {
                "cart": {
                    "cart_id": "7",
                    "cart_items": [{
                        "id": 11,
                        "variant_id": 101,
                        "quantity": "2",
                        "price_snapshot": "590.00",
                        "variant": {
                            "price": 620,
                            "name": "30ml",
                            "product": { "name": "Serum", "image": "img/serum.png" }
                        }
                    }]
                }
            }
        });
        let nested_variant = json!({
            "data": {
                "id": 7,
                "lines": [{
                    "item_id": 11,
                    "variant": { "id": 101, "price": 620, "capacity": "30ml" },
                    "product": { "name": "Serum", "imageUrl": "https://cdn.example.com/img/serum.png" },
                    "qty": 2,
                    "unit_price": 590
                }]
            }
        });

        let expected = expect_cart(normalize_cart(&camel, 5, ASSETS));
        assert_eq!(expected.items[0].image_url.as_deref(), Some("https://cdn.example.com/img/serum.png"));
        assert_eq!(expected.items[0].effective_unit_price, 590);
        assert_eq!(expected.subtotal, 1180);
        assert_eq!(expect_cart(normalize_cart(&snake_enveloped, 5, ASSETS)), expected);
        assert_eq!(expect_cart(normalize_cart(&nested_variant, 5, ASSETS)), expected);
    }

    #[test]
    fn cart_derived_fields_ignore_upstream_and_drop_zero_lines() {
        let raw = json!({
            "cartId": 1,
            "itemCount": 99,
            "subtotal": 123456,
            "items": [
                { "id": 1, "variantId": 10, "qty": 3, "currentPrice": 100 },
                { "id": 2, "variantId": 20, "qty": 0, "currentPrice": 500 },
                { "variantId": 30, "qty": 1 }
            ]
        });
        let cart = expect_cart(normalize_cart(&raw, 1, ""));
        assert_eq!(cart.item_count, 1);
        assert_eq!(cart.total_qty, 3);
        assert_eq!(cart.subtotal, 300);
        assert!(cart.line_for_variant(20).is_none());
    }

    #[test]
    fn acknowledgements_and_line_echoes_are_not_carts() {
        assert_eq!(normalize_cart(&json!({ "success": true }), 1, ""), Ok(CartPayload::Ack));
        assert_eq!(normalize_cart(&Value::Null, 1, ""), Ok(CartPayload::Ack));
        let echo = json!({ "data": { "id": 4, "variantId": 101, "qty": 1 } });
        assert_eq!(normalize_cart(&echo, 1, ""), Ok(CartPayload::Ack));
        let bare_list = json!({ "data": [] });
        assert_eq!(
            normalize_cart(&bare_list, 1, ""),
            Ok(CartPayload::Cart(CartDto::empty(1)))
        );
    }

    #[test]
    fn out_of_range_numbers_are_rejected_not_wrapped() {
        assert_eq!(as_i64(&json!("1e19")), None);
        assert_eq!(as_i64(&json!(1e19)), None);
        assert_eq!(as_i64(&json!("-1e19")), None);
        assert_eq!(as_i64(&json!("1e3")), Some(1_000));

        let huge_price = json!({
            "cartId": 1,
            "items": [{ "id": 1, "variantId": 10, "qty": 3, "currentPrice": "1e19" }]
        });
        // The unreadable price falls back to zero rather than saturating.
        assert_eq!(expect_cart(normalize_cart(&huge_price, 1, "")).subtotal, 0);

        let overflowing_line = json!({
            "cartId": 1,
            "items": [{ "id": 1, "variantId": 10, "qty": 3, "currentPrice": i64::MAX / 2 }]
        });
        assert_eq!(
            normalize_cart(&overflowing_line, 1, ""),
            Err(NormalizeError::OutOfRange("cart line subtotal"))
        );

        let overflowing_cart = json!({
            "cartId": 1,
            "items": [
                { "id": 1, "variantId": 10, "qty": 1, "currentPrice": i64::MAX },
                { "id": 2, "variantId": 20, "qty": 1, "currentPrice": 1 }
            ]
        });
        assert_eq!(
            normalize_cart(&overflowing_cart, 1, ""),
            Err(NormalizeError::OutOfRange("cart subtotal"))
        );
    }

    #[test]
    fn quote_reads_activity_stock_and_options() {
        let raw = json!({
            "data": {
                "lines": [
                    { "variantId": 1, "currentPrice": 100, "stock": 5, "isActive": true },
                    { "variant_id": 2, "unit_price": "250", "available_qty": 0, "product": { "is_active": false } },
                    { "variant": { "id": 3, "price": 40, "stock": 2, "status": "disabled" } }
                ],
                "totals": { "shippingFee": 30, "discount_total": 10 },
                "address_snapshot": {
                    "full_name": "Tran Thi B",
                    "phone_number": "0912345678",
                    "line1": "1 Hang Bai",
                    "city": "Ha Noi"
                },
                "paymentOptions": [
                    { "code": "COD", "enabled": true },
                    { "code": "VNPAY", "enabled": false },
                    "bank_transfer"
                ]
            }
        });
        let quote = normalize_quote(&raw, "");
        assert_eq!(quote.lines.len(), 3);
        assert!(quote.line(1).unwrap().active);
        assert!(!quote.line(2).unwrap().active);
        assert_eq!(quote.line(2).unwrap().available, Some(0));
        assert_eq!(quote.line(2).unwrap().unit_price, Some(250));
        assert!(!quote.line(3).unwrap().active);
        assert_eq!(quote.shipping_fee, 30);
        assert_eq!(quote.discount_total, 10);
        assert_eq!(
            quote.payment_options,
            Some(vec![PaymentMethod::Cod, PaymentMethod::BankTransfer])
        );
        let address = quote.address_snapshot.unwrap();
        assert_eq!(address.recipient_name, "Tran Thi B");
        assert_eq!(address.province.as_deref(), Some("Ha Noi"));
    }

    #[test]
    fn placement_shapes() {
        let bank = json!({
            "orderId": "55",
            "paymentInstructions": {
                "qrImageUrl": "/qr/acb.png",
                "note": "ACB 0123",
                "phone": "0900000000",
                "noteHint": "Write your order id"
            }
        });
        let placement = normalize_placement(&bank, ASSETS);
        assert_eq!(placement.order_id, Some(55));
        let instructions = placement.instructions.unwrap();
        assert_eq!(instructions.image_url, "https://cdn.example.com/qr/acb.png");
        assert_eq!(instructions.note_hint, "Write your order id");

        let vnpay = json!({ "data": { "order": { "id": 56 }, "payment_url": "https://sandbox.vnpay/56" } });
        let placement = normalize_placement(&vnpay, ASSETS);
        assert_eq!(placement.order_id, Some(56));
        assert_eq!(placement.payment_url.as_deref(), Some("https://sandbox.vnpay/56"));
    }

    #[test]
    fn payment_outcome_shapes() {
        let explicit = json!({ "success": true, "data": { "orderId": 9, "paymentStatus": "paid" } });
        assert_eq!(
            normalize_payment_outcome(&explicit, None).unwrap().status,
            PaymentStatus::Paid
        );

        let vnp_codes = json!({ "order_id": 9, "vnp_ResponseCode": "00", "vnp_TransactionStatus": "00" });
        assert_eq!(
            normalize_payment_outcome(&vnp_codes, None).unwrap().status,
            PaymentStatus::Paid
        );

        let declined = json!({ "orderId": 9, "vnp_ResponseCode": "24", "message": "Customer cancelled" });
        let outcome = normalize_payment_outcome(&declined, None).unwrap();
        assert_eq!(outcome.status, PaymentStatus::Failed);
        assert_eq!(outcome.message.as_deref(), Some("Customer cancelled"));

        let still_pending = json!({ "data": { "order": { "id": 9, "paymentStatus": "pending" } } });
        assert_eq!(
            normalize_payment_outcome(&still_pending, None).unwrap().status,
            PaymentStatus::Failed
        );

        let no_order = json!({ "paymentStatus": "paid" });
        assert_eq!(
            normalize_payment_outcome(&no_order, None),
            Err(NormalizeError::MissingField("orderId"))
        );
        assert_eq!(normalize_payment_outcome(&no_order, Some(3)).unwrap().order_id, 3);
    }

    #[test]
    fn upstream_error_reads_nested_error_objects() {
        let nested = json!({ "error": { "code": "INSUFFICIENT_STOCK", "message": "Only 1 left" } });
        assert_eq!(
            upstream_error(&nested),
            (Some("INSUFFICIENT_STOCK".into()), Some("Only 1 left".into()))
        );
        let flat = json!({ "error": "Address not found" });
        assert_eq!(upstream_error(&flat), (None, Some("Address not found".into())));
    }

    #[test]
    fn order_page_and_count() {
        let raw = json!({
            "data": {
                "orders": [
                    { "id": 1, "payment_status": "paid", "payment_method": "vnpay", "total_amount": 1770 },
                    { "orderId": 2, "paymentStatus": "unpaid", "paymentMethodCode": "COD" }
                ],
                "meta": { "total": 12 }
            }
        });
        let (orders, total) = normalize_order_page(&raw);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].payment_method_code, Some(PaymentMethod::Vnpay));
        assert_eq!(orders[0].grand_total, Some(1770));
        assert_eq!(total, Some(12));

        assert_eq!(normalize_count(&json!(7)), Some(7));
        assert_eq!(normalize_count(&json!({ "data": { "count": 4 } })), Some(4));
    }

    #[test]
    fn absolutize_keeps_absolute_urls() {
        assert_eq!(absolutize("https://cdn.x/", "/a.png"), "https://cdn.x/a.png");
        assert_eq!(absolutize("https://cdn.x", "a.png"), "https://cdn.x/a.png");
        assert_eq!(absolutize("https://cdn.x", "https://other/a.png"), "https://other/a.png");
        assert_eq!(absolutize("", "/a.png"), "/a.png");
    }
}
