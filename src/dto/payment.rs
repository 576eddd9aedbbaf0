use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{PaymentMethod, PaymentStatus};

/// Verified result of a gateway callback. `status` is always `Paid` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub order_id: i64,
    pub status: PaymentStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReturnData {
    pub order_id: i64,
    pub payment_method_code: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<PaymentOutcome> for PaymentReturnData {
    fn from(outcome: PaymentOutcome) -> Self {
        Self {
            order_id: outcome.order_id,
            payment_method_code: PaymentMethod::Vnpay,
            payment_status: outcome.status,
            message: outcome.message,
        }
    }
}
