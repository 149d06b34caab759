//! JSON response envelope and the error type every handler returns.
//!
//! All JSON responses share one shape:
//!
//! ```json
//! { "code": 0, "message": "success", "data": ... }
//! ```
//!
//! Application errors are reported through `code` with HTTP 200 so clients
//! branch on a single field. The one exception is [`ApiError::Unauthorized`],
//! which also sets HTTP 401 for browser sessions.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::db::DbError;
use crate::storage::StorageError;

/// Result codes carried in the envelope's `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RetCode {
    Success = 0,
    ExceptionError = 100,
    ArgumentError = 101,
    DataError = 102,
    PermissionError = 108,
    AuthenticationError = 109,
    Unauthorized = 401,
}

impl RetCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Success envelope with `data`.
pub fn json_result<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({
        "code": RetCode::Success.as_i32(),
        "message": "success",
        "data": data,
    }))
}

/// Errors surfaced to API clients as envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Referenced data does not exist ("Tenant not found!", "Folder not found!", ...).
    #[error("{0}")]
    Data(String),
    /// Missing or malformed request arguments.
    #[error("{0}")]
    Argument(String),
    /// The caller may not touch this row.
    #[error("{0}")]
    Permission(String),
    /// API token missing or invalid.
    #[error("{0}")]
    Authentication(String),
    /// No valid web session.
    #[error("Unauthorized")]
    Unauthorized,
    /// Anything unexpected.
    #[error("{0}")]
    Server(String),
}

impl ApiError {
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }

    pub fn code(&self) -> RetCode {
        match self {
            Self::Data(_) => RetCode::DataError,
            Self::Argument(_) => RetCode::ArgumentError,
            Self::Permission(_) => RetCode::PermissionError,
            Self::Authentication(_) => RetCode::AuthenticationError,
            Self::Unauthorized => RetCode::Unauthorized,
            Self::Server(_) => RetCode::ExceptionError,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        Self::Server(e.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::Server(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Server(ref msg) => {
                error!("request failed: {msg}");
                StatusCode::OK
            }
            _ => StatusCode::OK,
        };
        let data = match self {
            Self::Data(_) | Self::Server(_) => Value::Null,
            _ => Value::Bool(false),
        };
        let body = json!({
            "code": self.code().as_i32(),
            "message": self.to_string(),
            "data": data,
        });
        (status, Json(body)).into_response()
    }
}

/// Check that every name in `required` is present and non-null in a JSON body.
///
/// The message lists all missing names, e.g.
/// `required argument are missing: app_code,sys_code; `.
pub fn validate_request(body: &Value, required: &[&str]) -> Result<(), ApiError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| body.get(*k).map_or(true, Value::is_null))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::argument(format!(
            "required argument are missing: {}; ",
            missing.join(",")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_data_error_envelope() {
        let resp = ApiError::data("Folder not found!").into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["code"], 102);
        assert_eq!(v["message"], "Folder not found!");
    }

    #[tokio::test]
    async fn test_unauthorized_sets_http_status() {
        let resp = ApiError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["code"], 401);
    }

    #[tokio::test]
    async fn test_server_error_code() {
        let v = body_json(ApiError::Server("boom".into()).into_response()).await;
        assert_eq!(v["code"], 100);
        assert_eq!(v["message"], "boom");
    }

    #[test]
    fn test_validate_request_lists_missing() {
        let body = json!({"question": "q", "sys_code": null});
        let err = validate_request(&body, &["question", "app_code", "sys_code"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "required argument are missing: app_code,sys_code; "
        );
        assert!(validate_request(&body, &["question"]).is_ok());
    }
}
