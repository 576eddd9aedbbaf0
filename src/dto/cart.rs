use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::normalize::NormalizeError;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    #[serde(alias = "variant_id")]
    pub variant_id: i64,
    #[serde(alias = "quantity")]
    pub qty: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetQuantityRequest {
    #[serde(alias = "variant_id")]
    pub variant_id: i64,
    #[serde(alias = "quantity")]
    pub qty: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemDto {
    pub id: i64,
    pub variant_id: i64,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub variant_name: Option<String>,
    pub image_url: Option<String>,
    pub qty: i64,
    pub unit_price_snapshot: Option<i64>,
    pub current_price: Option<i64>,
    pub effective_unit_price: i64,
    pub line_subtotal: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartDto {
    pub cart_id: Option<i64>,
    pub user_id: i64,
    pub items: Vec<CartItemDto>,
    pub item_count: i64,
    pub total_qty: i64,
    pub subtotal: i64,
}

impl CartDto {
    /// Builds a cart and recomputes the derived totals from its lines.
    pub fn new(
        cart_id: Option<i64>,
        user_id: i64,
        items: Vec<CartItemDto>,
    ) -> Result<Self, NormalizeError> {
        let items: Vec<CartItemDto> = items.into_iter().filter(|item| item.qty > 0).collect();
        let item_count = items.len() as i64;
        let total_qty = items
            .iter()
            .try_fold(0i64, |acc, item| acc.checked_add(item.qty))
            .ok_or(NormalizeError::OutOfRange("cart quantity"))?;
        let subtotal = items
            .iter()
            .try_fold(0i64, |acc, item| acc.checked_add(item.line_subtotal))
            .ok_or(NormalizeError::OutOfRange("cart subtotal"))?;
        Ok(Self {
            cart_id,
            user_id,
            items,
            item_count,
            total_qty,
            subtotal,
        })
    }

    pub fn empty(user_id: i64) -> Self {
        Self {
            cart_id: None,
            user_id,
            items: Vec::new(),
            item_count: 0,
            total_qty: 0,
            subtotal: 0,
        }
    }

    pub fn line_for_variant(&self, variant_id: i64) -> Option<&CartItemDto> {
        self.items.iter().find(|item| item.variant_id == variant_id)
    }

    pub fn contains_item(&self, cart_item_id: i64) -> bool {
        self.items.iter().any(|item| item.id == cart_item_id)
    }
}

/// What a cart call yielded once normalized: the cart itself, or a bare acknowledgement
/// that requires an explicit re-fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum CartPayload {
    Cart(CartDto),
    Ack,
}
