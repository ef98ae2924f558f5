// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON error responses.
//!
//! Every failure leaves the service as `{code, message, request_id}` with a
//! status matching the error category. Database errors are logged in full
//! and answered with a generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{DispatchError, OasisError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                message: message.into(),
                request_id: None,
            },
        }
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.body.request_id = Some(request_id.to_string());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn status_for(err: &OasisError) -> StatusCode {
    match err {
        OasisError::Version(_) => StatusCode::NOT_ACCEPTABLE,
        OasisError::Patch(_)
        | OasisError::InvalidIdentity(_)
        | OasisError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        OasisError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
        OasisError::NotFound { .. } => StatusCode::NOT_FOUND,
        OasisError::Dispatch(e) => match e {
            DispatchError::UnknownNodePool { .. } => StatusCode::BAD_REQUEST,
            DispatchError::RemoteTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::RemoteUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::RemoteApplicationError { .. } | DispatchError::Encoding(_) => {
                StatusCode::BAD_GATEWAY
            }
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<OasisError> for ApiError {
    fn from(err: OasisError) -> Self {
        let status = status_for(&err);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return api_internal("internal error", &err);
        }
        ApiError::new(status, err.error_code(), err.to_string())
    }
}

/// Log the details server-side and answer with a generic 500.
pub fn api_internal(message: &str, err: &impl std::fmt::Display) -> ApiError {
    error!(error = %err, "{}", message);
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
}

pub fn api_bad_request(code: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PatchError, VersionError};

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(OasisError, StatusCode)> = vec![
            (
                PatchError::PatchForbiddenField { field: "id".into() }.into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                VersionError::InvalidVersionFormat("x".into()).into(),
                StatusCode::NOT_ACCEPTABLE,
            ),
            (
                OasisError::NotAuthorized {
                    action: "function:get".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                OasisError::NotFound {
                    kind: "Function",
                    ident: "f".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                DispatchError::RemoteTimeout {
                    method: "function_create".into(),
                    topic: "oasis-agent.np-1".into(),
                    timeout_ms: 10,
                }
                .into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                DispatchError::RemoteUnreachable {
                    topic: "t".into(),
                    reason: "down".into(),
                }
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DispatchError::RemoteApplicationError {
                    kind: "DeployFailed".into(),
                    message: "bad body".into(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{:?}", err);
        }
    }

    #[test]
    fn test_database_errors_are_generic() {
        let err = OasisError::Database {
            operation: "insert".into(),
            details: "disk I/O error at /var/lib/oasis.db".into(),
        };
        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body.code, "INTERNAL_ERROR");
        assert!(!api.body.message.contains("/var/lib"));
    }
}
