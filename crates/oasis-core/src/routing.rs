// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Nodepool to topic routing.
//!
//! Every nodepool agent listens on `<prefix>.<nodepool_id>`. A pool may also
//! pin a server address, in which case the QUIC transport connects to that
//! agent directly instead of going through the fabric ingress.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::RwLock;

use tracing::info;

use crate::error::{DispatchError, OasisError};
use crate::objects::is_logical_name;

pub const DEFAULT_TOPIC_PREFIX: &str = "oasis-agent";

/// Where one RPC must go. Recomputed for every call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingTarget {
    /// `None` for fixed targets that do not belong to a nodepool.
    pub nodepool_id: Option<String>,
    pub topic: String,
    pub server_address: Option<String>,
}

impl RoutingTarget {
    /// A target addressed by topic and optional server, outside the registry.
    pub fn fixed(topic: impl Into<String>, server_address: Option<String>) -> Self {
        Self {
            nodepool_id: None,
            topic: topic.into(),
            server_address,
        }
    }

    /// Delivery key on the bus: `topic` or `topic.server`.
    pub fn destination(&self) -> String {
        match &self.server_address {
            Some(server) => format!("{}.{}", self.topic, server),
            None => self.topic.clone(),
        }
    }
}

impl fmt::Display for RoutingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination())
    }
}

/// One registry entry, as configured or as derived from a NodePool row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePoolEntry {
    pub nodepool_id: String,
    pub server_address: Option<String>,
}

impl NodePoolEntry {
    pub fn new(nodepool_id: impl Into<String>) -> Self {
        Self {
            nodepool_id: nodepool_id.into(),
            server_address: None,
        }
    }

    pub fn with_server(mut self, server_address: impl Into<String>) -> Self {
        self.server_address = Some(server_address.into());
        self
    }

    /// Parse `np-1,np-2@10.0.0.5:7101`. Blank input yields no entries.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, OasisError> {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                let (id, server) = match item.split_once('@') {
                    Some((id, server)) => (id.trim(), Some(server.trim())),
                    None => (item, None),
                };
                if !is_logical_name(id) {
                    return Err(OasisError::invalid_parameter(
                        "nodepools",
                        format!("'{}' is not a valid nodepool identifier", id),
                    ));
                }
                let mut entry = NodePoolEntry::new(id);
                if let Some(server) = server {
                    server.parse::<SocketAddr>().map_err(|_| {
                        OasisError::invalid_parameter(
                            "nodepools",
                            format!("'{}' is not a socket address", server),
                        )
                    })?;
                    entry = entry.with_server(server);
                }
                Ok(entry)
            })
            .collect()
    }
}

/// Registry of known nodepools and the topic convention that addresses them.
#[derive(Debug)]
pub struct TopicRouter {
    prefix: String,
    registry: RwLock<HashMap<String, Option<String>>>,
}

impl TopicRouter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            registry: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_entries(prefix: impl Into<String>, entries: impl IntoIterator<Item = NodePoolEntry>) -> Self {
        let router = Self::new(prefix);
        for entry in entries {
            router.register(entry);
        }
        router
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn topic_for(&self, nodepool_id: &str) -> String {
        format!("{}.{}", self.prefix, nodepool_id)
    }

    /// Add or replace a registry entry.
    pub fn register(&self, entry: NodePoolEntry) {
        info!(
            nodepool_id = %entry.nodepool_id,
            server = ?entry.server_address,
            "registering nodepool"
        );
        self.registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry.nodepool_id, entry.server_address);
    }

    /// Returns whether the nodepool was registered.
    pub fn unregister(&self, nodepool_id: &str) -> bool {
        let removed = self
            .registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(nodepool_id)
            .is_some();
        if removed {
            info!(%nodepool_id, "unregistered nodepool");
        }
        removed
    }

    pub fn contains(&self, nodepool_id: &str) -> bool {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(nodepool_id)
    }

    pub fn nodepool_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn route(&self, nodepool_id: &str) -> Result<RoutingTarget, DispatchError> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        let server_address = registry
            .get(nodepool_id)
            .ok_or_else(|| DispatchError::UnknownNodePool {
                nodepool_id: nodepool_id.to_string(),
            })?
            .clone();

        Ok(RoutingTarget {
            nodepool_id: Some(nodepool_id.to_string()),
            topic: self.topic_for(nodepool_id),
            server_address,
        })
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX)
    }
}
