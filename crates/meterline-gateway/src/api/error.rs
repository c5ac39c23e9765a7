//! HTTP mapping for `MeterError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use meterline_core::error::{ClientCode, MeterError};

/// Handler error: a `MeterError` rendered as `{code, message}`.
#[derive(Debug)]
pub struct ApiError(pub MeterError);

impl From<MeterError> for ApiError {
    fn from(e: MeterError) -> Self {
        ApiError(e)
    }
}

pub fn status_for(code: ClientCode) -> StatusCode {
    match code {
        ClientCode::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
        ClientCode::UnknownEventKind | ClientCode::BadRequest | ClientCode::UnsupportedVersion => {
            StatusCode::BAD_REQUEST
        }
        ClientCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ClientCode::ChannelClosed => StatusCode::GONE,
        ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.client_code();
        let status = status_for(code);
        if status.is_server_error() {
            tracing::error!(error=%self.0, "request failed");
        }
        (
            status,
            Json(json!({ "code": code.as_str(), "message": self.0.to_string() })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
