use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        AppError::InvalidTier(_)
        | AppError::InvalidReferral
        | AppError::SignatureInvalid(_)
        | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AppError::NotPurchaser => StatusCode::FORBIDDEN,
        AppError::NotFound => StatusCode::NOT_FOUND,
        AppError::Masked { source, .. } => status_for(source),
    }
}

/// Client-facing message. Server-side details never leave the process.
fn public_message(error: &AppError) -> String {
    match error {
        AppError::Masked { message, .. } => (*message).to_string(),
        AppError::Database(_) => "Database error".to_string(),
        AppError::UpstreamUnavailable(_) => "Payment provider unavailable".to_string(),
        AppError::Internal(_) => "Internal error".to_string(),
        AppError::InvalidInput(msg) => msg.clone(),
        client => client.to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        if self.is_client_error() {
            tracing::warn!(error = %self, "Request rejected");
        } else {
            tracing::error!(error = ?self, "Request failed");
        }

        error_resp(status_for(&self), self.code(), public_message(&self))
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: String) -> Response {
    let body = serde_json::json!({ "code": code.as_str(), "message": message });
    (status, Json(body)).into_response()
}
