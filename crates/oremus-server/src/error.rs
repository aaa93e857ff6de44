use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use oremus_shared::DomainError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    #[error("Blob storage error: {0}")]
    BlobStorage(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ServerError {
    /// Stable machine-readable code carried in the response body.
    fn code(&self) -> &'static str {
        match self {
            ServerError::Domain(e) => e.code(),
            ServerError::BlobTooLarge { .. } => "blob-too-large",
            ServerError::BlobStorage(_) => "internal",
            ServerError::Unauthorized => "unauthorized",
            ServerError::BadRequest(_) => "invalid-parameters",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Domain(e) => {
                let status = match e {
                    DomainError::NotFound => StatusCode::NOT_FOUND,
                    DomainError::OperationNotAllowed(_) | DomainError::GroupBanned => {
                        StatusCode::FORBIDDEN
                    }
                    DomainError::Conflict(_) => StatusCode::CONFLICT,
                    DomainError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
                    DomainError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = match e {
                    // Never leak storage details to clients.
                    DomainError::Internal(_) => "Internal server error".to_string(),
                    other => other.to_string(),
                };
                (status, message)
            }
            ServerError::BlobTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ServerError::BlobStorage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Blob storage error".to_string())
            }
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_expected_statuses() {
        let cases = [
            (DomainError::NotFound, StatusCode::NOT_FOUND),
            (DomainError::not_allowed("nope"), StatusCode::FORBIDDEN),
            (DomainError::GroupBanned, StatusCode::FORBIDDEN),
            (DomainError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                DomainError::InvalidParameters("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (DomainError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                DomainError::Internal("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let response = ServerError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
