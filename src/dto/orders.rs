use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::checkout::ShippingSnapshot,
    models::{PaymentMethod, PaymentStatus},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: i64,
    pub order_code: Option<String>,
    pub status: Option<String>,
    pub payment_method_code: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub grand_total: Option<i64>,
    pub shipping_snapshot: Option<ShippingSnapshot>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<OrderSummary>,
}
