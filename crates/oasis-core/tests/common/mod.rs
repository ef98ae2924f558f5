// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures: an in-memory store, a local bus and scripted agents.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use oasis_core::agent_api::AgentApi;
use oasis_core::controller::ResourceController;
use oasis_core::dispatch::RpcDispatcher;
use oasis_core::error::DispatchError;
use oasis_core::persistence::SqliteStore;
use oasis_core::policy::DefaultAuthorizer;
use oasis_core::routing::{NodePoolEntry, TopicRouter};
use oasis_core::transport::{LocalBus, RpcMessage};
use oasis_core::RequestContext;
use serde_json::{Value, json};

pub const TOPIC: &str = "oasis-agent";

pub struct Harness {
    pub bus: LocalBus,
    pub store: Arc<SqliteStore>,
    pub router: Arc<TopicRouter>,
    pub controller: Arc<ResourceController>,
}

pub async fn harness(nodepools: &[&str]) -> Harness {
    harness_with_timeout(nodepools, Duration::from_secs(5)).await
}

pub async fn harness_with_timeout(nodepools: &[&str], timeout: Duration) -> Harness {
    let bus = LocalBus::new();
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let router = Arc::new(TopicRouter::with_entries(
        TOPIC,
        nodepools.iter().map(|id| NodePoolEntry::new(*id)),
    ));
    let dispatcher = RpcDispatcher::new(router.clone(), Arc::new(bus.clone()), timeout);
    let controller = Arc::new(ResourceController::new(
        store.clone(),
        Arc::new(DefaultAuthorizer),
        AgentApi::new(dispatcher),
        100,
    ));
    Harness {
        bus,
        store,
        router,
        controller,
    }
}

/// Messages an agent received, in arrival order.
pub type Inbox = Arc<Mutex<Vec<RpcMessage>>>;

/// Serve `nodepool_id` with an agent that records every message and answers
/// with `reply`.
pub fn agent(bus: &LocalBus, nodepool_id: &str, reply: Result<Value, DispatchError>) -> Inbox {
    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));
    let seen = inbox.clone();
    bus.serve(format!("{}.{}", TOPIC, nodepool_id), move |msg: RpcMessage| {
        seen.lock().unwrap().push(msg);
        let reply = reply.clone();
        async move { reply }
    });
    inbox
}

/// An agent that acknowledges everything.
pub fn healthy_agent(bus: &LocalBus, nodepool_id: &str) -> Inbox {
    agent(bus, nodepool_id, Ok(json!({ "ok": true })))
}

pub fn methods(inbox: &Inbox) -> Vec<String> {
    inbox.lock().unwrap().iter().map(|m| m.method.clone()).collect()
}

pub fn tenant(project: &str) -> RequestContext {
    RequestContext::new(Some(project.to_string()), Some("u1".to_string()), vec![])
}
