// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NodePool resource.
//!
//! The pool `name` doubles as the routing identifier: functions and
//! policies reference it as `nodepool_id`, and the agent serving the pool
//! listens on `<agent topic>.<name>`.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{FieldKind, versioned_object};
use crate::error::OasisError;

versioned_object! {
    /// A pool of worker nodes served by one agent.
    pub struct NodePool("NodePool", version = "1.0") {
        id: i64 => FieldKind::Integer,
        uuid: Uuid => FieldKind::Uuid,
        name: String => FieldKind::Text,
        project_id: String => FieldKind::Text,
        user_id: String => FieldKind::Text,
        agent_server: String => FieldKind::Text,
        status: String => FieldKind::Text,
        created_at: DateTime<Utc> => FieldKind::Timestamp,
        updated_at: DateTime<Utc> => FieldKind::Timestamp,
    }
    internal = ["name"];
    mandatory = ["name"];
    validate = validate_nodepool;
}

fn validate_nodepool(pool: &NodePool) -> Result<(), OasisError> {
    if let Some(name) = pool.name()
        && !super::is_logical_name(name)
    {
        return Err(OasisError::invalid_parameter(
            "name",
            "must start with a letter and contain only letters, digits, '_', '.' or '-'",
        ));
    }
    if let Some(server) = pool.agent_server()
        && server.parse::<SocketAddr>().is_err()
    {
        return Err(OasisError::invalid_parameter(
            "agent_server",
            "must be a socket address such as 10.0.0.5:7101",
        ));
    }
    Ok(())
}
