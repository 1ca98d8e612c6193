//! Error responses.
//!
//! Every failure is rendered as `{"error": <kind>, "detail": <message>}`.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use keyto_chain::{BlockchainError, ErrorKind};
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::SupplyExceeded | ErrorKind::StaleBlock | ErrorKind::DuplicateNonce => {
                StatusCode::CONFLICT
            }
            ErrorKind::Halted | ErrorKind::MempoolFull | ErrorKind::MiningAborted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::Storage | ErrorKind::ChainLinkMismatch => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<BlockchainError> for ApiError {
    fn from(err: BlockchainError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = %self.kind, detail = %self.detail, "Request failed");
        } else {
            warn!(kind = %self.kind, detail = %self.detail, "Request rejected");
        }

        let body = json!({
            "error": self.kind.as_str(),
            "detail": self.detail,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |kind| ApiError::new(kind, "").status();
        assert_eq!(status(ErrorKind::InvalidSignature), StatusCode::BAD_REQUEST);
        assert_eq!(status(ErrorKind::StaleNonce), StatusCode::BAD_REQUEST);
        assert_eq!(status(ErrorKind::SupplyExceeded), StatusCode::CONFLICT);
        assert_eq!(status(ErrorKind::DuplicateNonce), StatusCode::CONFLICT);
        assert_eq!(status(ErrorKind::Halted), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(ErrorKind::Storage), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
