use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult, state::AppState};

/// State changes the BFF drives in Core and keeps a local trail of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    CartUpdate,
    CartRemove,
    OrderPlaced,
    PaymentReconciled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CartUpdate => "cart_update",
            AuditAction::CartRemove => "cart_remove",
            AuditAction::OrderPlaced => "order_placed",
            AuditAction::PaymentReconciled => "payment_reconciled",
        }
    }

    pub fn resource(&self) -> &'static str {
        match self {
            AuditAction::CartUpdate | AuditAction::CartRemove => "cart_items",
            AuditAction::OrderPlaced | AuditAction::PaymentReconciled => "orders",
        }
    }
}

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<i64>,
    action: AuditAction,
    metadata: Value,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action.as_str())
    .bind(action.resource())
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Best-effort audit entry; failures are logged and never fail the request.
pub async fn record(state: &AppState, user_id: Option<i64>, action: AuditAction, metadata: Value) {
    let Some(pool) = state.audit.as_ref() else {
        return;
    };
    if let Err(err) = log_audit(pool, user_id, action, metadata).await {
        tracing::warn!(error = %err, action = action.as_str(), "audit log failed");
    }
}
