use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Request carries no payment callback parameters")]
    NotPaymentCallback,

    #[error("Malformed payment callback: {0}")]
    MalformedPaymentCallback(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        details: Option<Value>,
    },

    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String, timed_out: bool },

    #[error("{message}")]
    UpstreamRejected {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("Bad upstream response: {0}")]
    BadUpstreamResponse(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_)
            | AppError::NotPaymentCallback
            | AppError::MalformedPaymentCallback(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamRejected { status, .. } => *status,
            AppError::BadUpstreamResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Validation(_) => "validation_error",
            AppError::NotPaymentCallback => "not_payment_callback",
            AppError::MalformedPaymentCallback(_) => "malformed_payment_callback",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict { .. } => "conflict",
            AppError::UpstreamUnavailable { .. } => "upstream_unavailable",
            AppError::UpstreamRejected { code, .. } => {
                code.as_deref().unwrap_or("upstream_rejected")
            }
            AppError::BadUpstreamResponse(_) => "bad_upstream_response",
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                "internal_error"
            }
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorData {
    pub code: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::DbError(err) => tracing::error!(error = %err, "database error"),
            AppError::OrmError(err) => tracing::error!(error = %err, "orm error"),
            AppError::Internal(err) => tracing::error!(error = %err, "internal error"),
            _ => {}
        }

        let details = match &self {
            AppError::Conflict { details, .. } => details.clone(),
            _ => None,
        };

        let body = ApiResponse {
            success: false,
            message: self.to_string(),
            data: Some(ErrorData {
                code: self.code().to_string(),
                error: self.to_string(),
                details,
            }),
            meta: None,
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
