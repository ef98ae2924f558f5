// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NodePoolPolicy resource: autoscaling knobs for one nodepool.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{FieldKind, versioned_object};
use crate::error::OasisError;

versioned_object! {
    pub struct NodePoolPolicy("NodePoolPolicy", version = "1.0") {
        id: i64 => FieldKind::Integer,
        uuid: Uuid => FieldKind::Uuid,
        name: String => FieldKind::Text,
        nodepool_id: String => FieldKind::Text,
        project_id: String => FieldKind::Text,
        user_id: String => FieldKind::Text,
        min_size: i64 => FieldKind::Integer,
        max_size: i64 => FieldKind::Integer,
        scaleup_adjust: i64 => FieldKind::Integer,
        scaleup_cooldown: i64 => FieldKind::Integer,
        scaleup_period: i64 => FieldKind::Integer,
        scaleup_evaluation_periods: i64 => FieldKind::Integer,
        scaleup_threshold: i64 => FieldKind::Integer,
        scaledown_adjust: i64 => FieldKind::Integer,
        scaledown_cooldown: i64 => FieldKind::Integer,
        scaledown_period: i64 => FieldKind::Integer,
        scaledown_evaluation_periods: i64 => FieldKind::Integer,
        scaledown_threshold: i64 => FieldKind::Integer,
        created_at: DateTime<Utc> => FieldKind::Timestamp,
        updated_at: DateTime<Utc> => FieldKind::Timestamp,
    }
    internal = ["nodepool_id"];
    mandatory = ["min_size", "max_size"];
    validate = validate_policy;
}

const NON_NEGATIVE_KNOBS: &[&str] = &[
    "min_size",
    "max_size",
    "scaleup_adjust",
    "scaleup_cooldown",
    "scaleup_period",
    "scaleup_evaluation_periods",
    "scaleup_threshold",
    "scaledown_adjust",
    "scaledown_cooldown",
    "scaledown_period",
    "scaledown_evaluation_periods",
    "scaledown_threshold",
];

fn validate_policy(policy: &NodePoolPolicy) -> Result<(), OasisError> {
    use crate::objects::VersionedObject;

    for knob in NON_NEGATIVE_KNOBS {
        if let Some(value) = policy.get_field(knob).and_then(|v| v.as_int())
            && value < 0
        {
            return Err(OasisError::invalid_parameter(*knob, "must not be negative"));
        }
    }

    if let (Some(min), Some(max)) = (policy.min_size(), policy.max_size())
        && min > max
    {
        return Err(OasisError::invalid_parameter(
            "min_size",
            format!("min_size ({}) must not exceed max_size ({})", min, max),
        ));
    }

    for threshold in ["scaleup_threshold", "scaledown_threshold"] {
        if let Some(value) = policy.get_field(threshold).and_then(|v| v.as_int())
            && value > 100
        {
            return Err(OasisError::invalid_parameter(
                threshold,
                "is a utilisation percentage (0-100)",
            ));
        }
    }

    Ok(())
}
