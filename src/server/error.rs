use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::errors::EngineError;

/// Engine error rendered as `{"error": code, "message": ...}`
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::NotFound { .. } | EngineError::DataUnavailable(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidState(_) => StatusCode::CONFLICT,
            EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Removed { .. } => StatusCode::GONE,
            EngineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::Database(_) | EngineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let mut body = serde_json::json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        });
        if let EngineError::Timeout { completed, .. } = &self.0 {
            body["completed"] = serde_json::json!(completed);
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
