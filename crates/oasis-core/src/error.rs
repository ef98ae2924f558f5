// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for oasis-core.
//!
//! Every variant maps to a stable, `SCREAMING_SNAKE_CASE` error code via
//! `error_code()` plus a human-readable `Display`. Nothing below carries
//! backtraces or driver internals across the API boundary.

use thiserror::Error;

use crate::version::ApiVersion;

/// Result type using OasisError
pub type Result<T> = std::result::Result<T, OasisError>;

/// API version negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid API version string '{0}'; expected 'major.minor' or 'latest'")]
    InvalidVersionFormat(String),

    #[error("Unsupported API major version {requested}; this service only speaks {supported}.x")]
    UnsupportedMajorVersion { requested: u32, supported: u32 },

    #[error("API version {requested} is outside the supported range [{min}, {max}]")]
    VersionOutOfRange {
        requested: ApiVersion,
        min: ApiVersion,
        max: ApiVersion,
    },
}

impl VersionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidVersionFormat(_) => "INVALID_VERSION_FORMAT",
            Self::UnsupportedMajorVersion { .. } => "UNSUPPORTED_MAJOR_VERSION",
            Self::VersionOutOfRange { .. } => "VERSION_OUT_OF_RANGE",
        }
    }
}

/// Field mutation and patch validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("Field '{field}' is not declared on this resource")]
    UnknownField { field: String },

    #[error("Patch path '{path}' does not resolve to a declared field")]
    PatchTargetNotFound { path: String },

    #[error("Field '{field}' is read-only and cannot be patched")]
    PatchForbiddenField { field: String },

    #[error("Field '{field}' is mandatory and cannot be removed")]
    PatchViolatesMandatory { field: String },

    #[error("Invalid value for field '{field}': expected {expected}")]
    InvalidFieldValue {
        field: String,
        expected: &'static str,
    },
}

impl PatchError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownField { .. } => "UNKNOWN_FIELD",
            Self::PatchTargetNotFound { .. } => "PATCH_TARGET_NOT_FOUND",
            Self::PatchForbiddenField { .. } => "PATCH_FORBIDDEN_FIELD",
            Self::PatchViolatesMandatory { .. } => "PATCH_VIOLATES_MANDATORY",
            Self::InvalidFieldValue { .. } => "INVALID_FIELD_VALUE",
        }
    }
}

/// Routing and remote invocation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Nodepool '{nodepool_id}' is not registered")]
    UnknownNodePool { nodepool_id: String },

    /// No reply within the deadline. The remote side may still complete the
    /// operation; re-read persisted state before assuming either outcome.
    #[error("Call '{method}' on topic '{topic}' timed out after {timeout_ms}ms")]
    RemoteTimeout {
        method: String,
        topic: String,
        timeout_ms: u64,
    },

    #[error("Topic '{topic}' is unreachable: {reason}")]
    RemoteUnreachable { topic: String, reason: String },

    #[error("Remote {kind}: {message}")]
    RemoteApplicationError { kind: String, message: String },

    #[error("Failed to encode or decode RPC payload: {0}")]
    Encoding(String),
}

impl DispatchError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownNodePool { .. } => "UNKNOWN_NODE_POOL",
            Self::RemoteTimeout { .. } => "REMOTE_TIMEOUT",
            Self::RemoteUnreachable { .. } => "REMOTE_UNREACHABLE",
            Self::RemoteApplicationError { .. } => "REMOTE_APPLICATION_ERROR",
            Self::Encoding(_) => "RPC_ENCODING_ERROR",
        }
    }

    /// The remote-reported error kind, for application errors only.
    pub fn remote_kind(&self) -> Option<&str> {
        match self {
            Self::RemoteApplicationError { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// Umbrella error surfaced to the controller and HTTP layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum OasisError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{kind} '{ident}' could not be found")]
    NotFound { kind: &'static str, ident: String },

    #[error("Expected a UUID, integer id or logical name but received '{0}'")]
    InvalidIdentity(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Policy does not allow {action} to be performed")]
    NotAuthorized { action: String },

    #[error("Database error during '{operation}': {details}")]
    Database { operation: String, details: String },
}

impl OasisError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Version(e) => e.error_code(),
            Self::Patch(e) => e.error_code(),
            Self::Dispatch(e) => e.error_code(),
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidIdentity(_) => "INVALID_IDENTITY",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::Database { .. } => "DATABASE_ERROR",
        }
    }

    pub(crate) fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for OasisError {
    fn from(err: sqlx::Error) -> Self {
        OasisError::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for OasisError {
    fn from(err: serde_json::Error) -> Self {
        OasisError::Database {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
