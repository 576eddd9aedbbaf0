use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutSource {
    #[default]
    Cart,
    BuyNow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineInput {
    #[serde(alias = "variant_id")]
    pub variant_id: i64,
    #[serde(alias = "quantity")]
    pub qty: i64,
}

/// Merges duplicate variants and orders lines by variant id.
pub fn merge_lines(lines: impl IntoIterator<Item = LineInput>) -> Vec<LineInput> {
    let mut merged: BTreeMap<i64, i64> = BTreeMap::new();
    for line in lines {
        let qty = merged.entry(line.variant_id).or_insert(0);
        *qty = qty.saturating_add(line.qty);
    }
    merged
        .into_iter()
        .map(|(variant_id, qty)| LineInput { variant_id, qty })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSnapshot {
    #[serde(alias = "recipient_name")]
    pub recipient_name: String,
    pub phone: String,
    #[serde(alias = "address_line1")]
    pub address_line1: String,
    #[serde(default, alias = "address_line2")]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub ward: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
}

impl ShippingSnapshot {
    pub fn validate(&self) -> Result<(), String> {
        if self.recipient_name.trim().is_empty() {
            return Err("shippingSnapshot.recipientName is required".into());
        }
        if self.address_line1.trim().is_empty() {
            return Err("shippingSnapshot.addressLine1 is required".into());
        }
        let phone = self.phone.trim();
        let digits = phone.strip_prefix('+').unwrap_or(phone);
        if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err("shippingSnapshot.phone must be 8-15 digits".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub source: CheckoutSource,
    #[serde(default)]
    pub items: Option<Vec<LineInput>>,
    #[serde(default, alias = "address_id")]
    pub address_id: Option<i64>,
    #[serde(default, alias = "shipping_snapshot")]
    pub shipping_snapshot: Option<ShippingSnapshot>,
    #[serde(default, alias = "payment_method_code")]
    pub payment_method_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Inactive,
    PriceMissing,
    LowStock,
    OutOfStock,
    EmptyCart,
}

impl WarningKind {
    /// Warnings that can never be resolved by adjusting quantities.
    pub fn is_blocking(&self) -> bool {
        matches!(self, WarningKind::Inactive | WarningKind::PriceMissing)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            WarningKind::Inactive => "This item is no longer available for sale",
            WarningKind::PriceMissing => "This item has no current price",
            WarningKind::LowStock => "Only part of the requested quantity is in stock",
            WarningKind::OutOfStock => "This item is out of stock",
            WarningKind::EmptyCart => "There is nothing to check out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviewLine {
    pub variant_id: i64,
    pub product_name: Option<String>,
    pub variant_name: Option<String>,
    pub image_url: Option<String>,
    pub qty_requested: i64,
    pub qty_priced: i64,
    pub unit_price: Option<i64>,
    pub line_subtotal: i64,
    pub warnings: Vec<WarningKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviewWarning {
    pub variant_id: Option<i64>,
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount_total: i64,
    pub grand_total: i64,
}

impl Totals {
    /// Clamps the discount into `[0, subtotal + shipping]` so the grand total never goes
    /// negative; `grand_total == subtotal + shipping_fee - discount_total` always holds.
    /// `None` when the sum does not fit an `i64`.
    pub fn new(subtotal: i64, shipping_fee: i64, discount: i64) -> Option<Self> {
        let shipping_fee = shipping_fee.max(0);
        let gross = subtotal.checked_add(shipping_fee)?;
        let discount_total = discount.clamp(0, gross.max(0));
        Some(Self {
            subtotal,
            shipping_fee,
            discount_total,
            grand_total: gross - discount_total,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSelection {
    pub requested: Option<String>,
    pub effective: PaymentMethod,
    pub options: Vec<PaymentMethod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviewDto {
    pub address_snapshot: Option<ShippingSnapshot>,
    pub lines: Vec<PreviewLine>,
    pub totals: Totals,
    pub warnings: Vec<PreviewWarning>,
    pub has_any_warning: bool,
    pub payment: PaymentSelection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstructions {
    pub image_url: String,
    pub note: String,
    pub phone: String,
    pub note_hint: String,
}

impl PaymentInstructions {
    /// Fills blank fields from `fallback`.
    pub fn or_fallback(mut self, fallback: &PaymentInstructions) -> Self {
        for (field, default) in [
            (&mut self.image_url, &fallback.image_url),
            (&mut self.note, &fallback.note),
            (&mut self.phone, &fallback.phone),
            (&mut self.note_hint, &fallback.note_hint),
        ] {
            if field.trim().is_empty() {
                field.clone_from(default);
            }
        }
        self
    }
}

/// Placement result; the shape depends on the payment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "paymentMethodCode")]
pub enum PlaceResult {
    #[serde(rename = "COD", rename_all = "camelCase")]
    Cod {
        order_id: i64,
        payment_status: PaymentStatus,
        message: String,
    },
    #[serde(rename = "BANK_TRANSFER", rename_all = "camelCase")]
    BankTransfer {
        order_id: i64,
        payment_status: PaymentStatus,
        payment_instructions: PaymentInstructions,
    },
    #[serde(rename = "VNPAY", rename_all = "camelCase")]
    Vnpay {
        order_id: i64,
        payment_status: PaymentStatus,
        payment_url: String,
    },
}

impl PlaceResult {
    pub fn cod(order_id: i64, message: impl Into<String>) -> Self {
        PlaceResult::Cod {
            order_id,
            payment_status: PaymentMethod::Cod.initial_status(),
            message: message.into(),
        }
    }

    pub fn bank_transfer(order_id: i64, payment_instructions: PaymentInstructions) -> Self {
        PlaceResult::BankTransfer {
            order_id,
            payment_status: PaymentMethod::BankTransfer.initial_status(),
            payment_instructions,
        }
    }

    pub fn vnpay(order_id: i64, payment_url: String) -> Self {
        PlaceResult::Vnpay {
            order_id,
            payment_status: PaymentMethod::Vnpay.initial_status(),
            payment_url,
        }
    }

    pub fn order_id(&self) -> i64 {
        match self {
            PlaceResult::Cod { order_id, .. }
            | PlaceResult::BankTransfer { order_id, .. }
            | PlaceResult::Vnpay { order_id, .. } => *order_id,
        }
    }

    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            PlaceResult::Cod { .. } => PaymentMethod::Cod,
            PlaceResult::BankTransfer { .. } => PaymentMethod::BankTransfer,
            PlaceResult::Vnpay { .. } => PaymentMethod::Vnpay,
        }
    }

    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            PlaceResult::Cod { payment_status, .. }
            | PlaceResult::BankTransfer { payment_status, .. }
            | PlaceResult::Vnpay { payment_status, .. } => *payment_status,
        }
    }
}
