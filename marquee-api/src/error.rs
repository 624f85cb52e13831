use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use marquee_core::{BookingError, ErrorClass};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": "unauthorized", "message": msg })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": "forbidden", "message": msg })),
            AppError::Booking(err) => booking_error_response(&err),
        };

        (status, Json(body)).into_response()
    }
}

fn booking_error_response(err: &BookingError) -> (StatusCode, serde_json::Value) {
    let status = match err.class() {
        ErrorClass::Contention => StatusCode::CONFLICT,
        ErrorClass::BusinessRule => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Forbidden => StatusCode::FORBIDDEN,
        ErrorClass::Integrity | ErrorClass::Infrastructure => {
            tracing::error!(code = err.code(), "Internal Server Error: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": err.code(), "message": "Internal Server Error" }),
            );
        }
    };

    let mut body = json!({ "error": err.code(), "message": err.to_string() });
    if !err.conflicts().is_empty() {
        body["seats"] = json!(err.conflicts());
    }
    (status, body)
}
