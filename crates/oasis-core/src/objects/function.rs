// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Function resource.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FieldCodec, FieldKind, FieldValue, versioned_object};
use crate::error::PatchError;

/// Lifecycle status of a function as reported by its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    UpdateInProgress,
    UpdateFailed,
    UpdateComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
}

impl FunctionStatus {
    pub const ALL: &'static [&'static str] = &[
        "CREATE_IN_PROGRESS",
        "CREATE_FAILED",
        "CREATE_COMPLETE",
        "UPDATE_IN_PROGRESS",
        "UPDATE_FAILED",
        "UPDATE_COMPLETE",
        "DELETE_IN_PROGRESS",
        "DELETE_FAILED",
        "DELETE_COMPLETE",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateFailed => "CREATE_FAILED",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::DeleteComplete => "DELETE_COMPLETE",
        }
    }
}

impl fmt::Display for FunctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_FAILED" => Self::CreateFailed,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_FAILED" => Self::UpdateFailed,
            "UPDATE_COMPLETE" => Self::UpdateComplete,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_FAILED" => Self::DeleteFailed,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            _ => return Err(()),
        })
    }
}

impl FieldCodec for FunctionStatus {
    fn encode(&self) -> FieldValue {
        FieldValue::Text(self.as_str().to_string())
    }

    fn decode(field: &str, value: &FieldValue) -> Result<Self, PatchError> {
        value
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PatchError::InvalidFieldValue {
                field: field.to_string(),
                expected: "a function status",
            })
    }
}

versioned_object! {
    /// A deployable function hosted on one nodepool.
    pub struct Function("Function", version = "1.0") {
        id: i64 => FieldKind::Integer,
        uuid: Uuid => FieldKind::Uuid,
        name: String => FieldKind::Text,
        nodepool_id: String => FieldKind::Text,
        project_id: String => FieldKind::Text,
        user_id: String => FieldKind::Text,
        stack_id: String => FieldKind::Text,
        status: FunctionStatus => FieldKind::Enum(FunctionStatus::ALL),
        status_reason: String => FieldKind::Text,
        body: String => FieldKind::Text,
        ca_cert_ref: String => FieldKind::Text,
        oasis_cert_ref: String => FieldKind::Text,
        trust_id: String => FieldKind::Text,
        trustee_username: String => FieldKind::Text,
        trustee_password: String => FieldKind::Text,
        trustee_user_id: String => FieldKind::Text,
        created_at: DateTime<Utc> => FieldKind::Timestamp,
        updated_at: DateTime<Utc> => FieldKind::Timestamp,
    }
    internal = [
        "name",
        "nodepool_id",
        "body",
        "stack_id",
        "ca_cert_ref",
        "oasis_cert_ref",
        "trust_id",
        "trustee_username",
        "trustee_password",
        "trustee_user_id",
    ];
    mandatory = ["stack_id"];
}
