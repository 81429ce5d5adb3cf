// The uniform JSON envelope. Every API response, success or failure,
// goes out in this shape.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ErrorCode};

pub const API_VERSION: &str = "1.0";

/// Success envelope body: `{"apiVersion": "1.0", "data": ...}`.
pub fn data_body(data: Value) -> Value {
    json!({
        "apiVersion": API_VERSION,
        "data": data,
    })
}

/// Error envelope body: `{"apiVersion": "1.0", "error": {code, message[, errors]}}`.
/// The `errors` detail list is included only when present.
pub fn error_body(code: ErrorCode, message: &str, errors: Option<Value>) -> Value {
    let mut error = json!({
        "code": code.to_value(),
        "message": message,
    });
    if let Some(detail) = errors {
        error["errors"] = detail;
    }
    json!({
        "apiVersion": API_VERSION,
        "error": error,
    })
}

/// Pipes an action result into the envelope: data on success, the error's
/// code/message pair (with its derived status) on failure.
pub fn send(result: Result<Value, ApiError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(data_body(data))).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Wrapper for handlers that produce serializable payloads directly.
#[derive(Debug)]
pub struct ApiData<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for ApiData<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.0) {
            Ok(value) => (StatusCode::OK, Json(data_body(value))).into_response(),
            Err(e) => {
                tracing::error!(target: "app", "failed to serialize response data: {}", e);
                ApiError::internal_server_error("Internal Server Error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_body_shape() {
        let body = data_body(json!({"totalItems": 2, "items": [1, 2]}));
        assert_eq!(body["apiVersion"], "1.0");
        assert_eq!(body["data"]["totalItems"], 2);
        assert!(body.get("error").is_none());
    }

    #[test]
    fn test_error_body_without_detail_omits_errors() {
        let body = error_body(ErrorCode::Domain("D0004"), "Failed to Find", None);
        assert_eq!(body["error"]["code"], "D0004");
        assert_eq!(body["error"]["message"], "Failed to Find");
        assert!(body["error"].get("errors").is_none());
    }

    #[test]
    fn test_error_body_with_detail() {
        let detail = json!([{"reason": "missing", "location": "name"}]);
        let body = error_body(ErrorCode::Http(400), "Bad Request", Some(detail));
        assert_eq!(body["error"]["code"], 400);
        assert_eq!(body["error"]["errors"][0]["reason"], "missing");
    }
}
