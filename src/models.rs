use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Payment methods offered at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum PaymentMethod {
    #[serde(rename = "COD")]
    Cod,
    #[serde(rename = "BANK_TRANSFER")]
    BankTransfer,
    #[serde(rename = "VNPAY")]
    Vnpay,
}

impl PaymentMethod {
    /// Fallback order when a requested method is not offered.
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Cod,
        PaymentMethod::BankTransfer,
        PaymentMethod::Vnpay,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Vnpay => "VNPAY",
        }
    }

    /// Status an order carries right after placement with this method.
    pub fn initial_status(&self) -> PaymentStatus {
        match self {
            PaymentMethod::Cod => PaymentStatus::Unpaid,
            PaymentMethod::BankTransfer | PaymentMethod::Vnpay => PaymentStatus::Pending,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "COD" | "CASH_ON_DELIVERY" => Ok(PaymentMethod::Cod),
            "BANK_TRANSFER" | "BANK" | "TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "VNPAY" | "VN_PAY" => Ok(PaymentMethod::Vnpay),
            _ => Err(format!("unknown payment method '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "pending" | "processing" | "awaiting_payment" => Ok(PaymentStatus::Pending),
            "paid" | "success" | "succeeded" | "completed" => Ok(PaymentStatus::Paid),
            "failed" | "failure" | "cancelled" | "canceled" => Ok(PaymentStatus::Failed),
            _ => Err(format!("unknown payment status '{s}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_method_parses_loose_codes() {
        assert_eq!("cod".parse::<PaymentMethod>(), Ok(PaymentMethod::Cod));
        assert_eq!("bank-transfer".parse::<PaymentMethod>(), Ok(PaymentMethod::BankTransfer));
        assert_eq!(" VNPay ".parse::<PaymentMethod>(), Ok(PaymentMethod::Vnpay));
        assert!("PAYPAL".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn initial_status_depends_on_method() {
        assert_eq!(PaymentMethod::Cod.initial_status(), PaymentStatus::Unpaid);
        assert_eq!(PaymentMethod::BankTransfer.initial_status(), PaymentStatus::Pending);
        assert_eq!(PaymentMethod::Vnpay.initial_status(), PaymentStatus::Pending);
    }

    #[test]
    fn serde_uses_wire_codes() {
        let json = serde_json::to_string(&PaymentMethod::BankTransfer).unwrap();
        assert_eq!(json, "\"BANK_TRANSFER\"");
        let status: PaymentStatus = serde_json::from_str("\"paid\"").unwrap();
        assert_eq!(status, PaymentStatus::Paid);
    }
}
