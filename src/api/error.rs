//! Request-level error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::codec::CodecError;
use crate::device::DeviceStatus;

/// Failure of a single request, rendered as `{error:{code,message,status?}}`
#[derive(Debug, Error)]
pub enum ApiError {
    /// Addressed resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// Request body or parameters are unusable
    #[error("{0}")]
    BadRequest(String),

    /// Device reported a non-OK status
    #[error("{0}")]
    Upstream(DeviceStatus),

    /// Device did not answer in time
    #[error("{0}")]
    Timeout(String),

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status this error maps to
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Upstream(_) => "upstream",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<DeviceStatus> for ApiError {
    fn from(status: DeviceStatus) -> Self {
        if status.is_unknown() {
            Self::NotFound(status.to_string())
        } else {
            Self::Upstream(status)
        }
    }
}

impl From<CodecError> for ApiError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Marshal { .. } => Self::Internal(err.to_string()),
            CodecError::Unmarshal { .. } | CodecError::TypeMismatch { .. } => {
                Self::BadRequest(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            status: Option<&'static str>,
        }

        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
                status: match &self {
                    Self::Upstream(device_status) => Some(device_status.code()),
                    _ => None,
                },
            },
        };

        (status, Json(body)).into_response()
    }
}
