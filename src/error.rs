//! Error taxonomy shared by every operation, and its HTTP rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum BankError {
    /// Malformed input, rejected before any store access.
    #[error("{0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A unique key is already taken.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// Storage or serialization failure. The detail is logged, never rendered.
    #[error("unexpected server error")]
    Internal(String),
}

impl BankError {
    pub fn kind(&self) -> &'static str {
        match self {
            BankError::Validation(_) => "validation_error",
            BankError::NotFound(_) => "not_found",
            BankError::Conflict(_) => "conflict",
            BankError::Unauthorized(_) => "unauthorized",
            BankError::Forbidden(_) => "forbidden",
            BankError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BankError::Validation(_) => StatusCode::BAD_REQUEST,
            BankError::NotFound(_) => StatusCode::NOT_FOUND,
            BankError::Conflict(_) => StatusCode::CONFLICT,
            BankError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BankError::Forbidden(_) => StatusCode::FORBIDDEN,
            BankError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for BankError {
    fn from(e: serde_json::Error) -> Self {
        BankError::Internal(format!("snapshot serialization: {}", e))
    }
}

impl From<std::io::Error> for BankError {
    fn from(e: std::io::Error) -> Self {
        BankError::Internal(format!("snapshot io: {}", e))
    }
}

impl IntoResponse for BankError {
    fn into_response(self) -> Response {
        if let BankError::Internal(detail) = &self {
            error!(target: "exercise_bank", %detail, "Internal error");
        }

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        }));

        (self.status(), body).into_response()
    }
}

pub type BankResult<T> = Result<T, BankError>;
