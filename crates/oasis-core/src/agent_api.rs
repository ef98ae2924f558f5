// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed client for the methods nodepool agents expose.

use std::time::Duration;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::dispatch::RpcDispatcher;
use crate::error::DispatchError;
use crate::routing::RoutingTarget;
use crate::transport::Kwargs;

pub const FUNCTION_CREATE: &str = "function_create";
pub const FUNCTION_UPDATE: &str = "function_update";
pub const FUNCTION_DELETE: &str = "function_delete";
pub const NODEPOOL_POLICY_UPDATE: &str = "nodepool_policy_update";
pub const PING_LISTENER: &str = "ping_listener";

/// What an agent needs to deploy one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDeployment<'a> {
    pub function_id: Uuid,
    /// URL rule the function is exposed under on the nodepool.
    pub rule: String,
    pub body: &'a str,
    pub methods: Vec<String>,
}

impl FunctionDeployment<'_> {
    fn kwargs(&self) -> Kwargs {
        let mut kwargs = Kwargs::new();
        kwargs.insert("function_id".into(), json!(self.function_id));
        kwargs.insert("rule".into(), json!(self.rule));
        kwargs.insert("body".into(), json!(self.body));
        kwargs.insert("methods".into(), json!(self.methods));
        kwargs
    }
}

#[derive(Clone)]
pub struct AgentApi {
    dispatcher: RpcDispatcher,
}

impl AgentApi {
    pub fn new(dispatcher: RpcDispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &RpcDispatcher {
        &self.dispatcher
    }

    pub async fn function_create(
        &self,
        ctx: &RequestContext,
        nodepool_id: &str,
        deployment: &FunctionDeployment<'_>,
    ) -> Result<Value, DispatchError> {
        self.dispatcher
            .change_target(nodepool_id)?
            .call(FUNCTION_CREATE, ctx, deployment.kwargs())
            .await
    }

    pub async fn function_update(
        &self,
        ctx: &RequestContext,
        nodepool_id: &str,
        deployment: &FunctionDeployment<'_>,
    ) -> Result<Value, DispatchError> {
        self.dispatcher
            .change_target(nodepool_id)?
            .call(FUNCTION_UPDATE, ctx, deployment.kwargs())
            .await
    }

    pub async fn function_delete(
        &self,
        ctx: &RequestContext,
        nodepool_id: &str,
        function_id: &Uuid,
    ) -> Result<Value, DispatchError> {
        let mut kwargs = Kwargs::new();
        kwargs.insert("function_id".into(), json!(function_id));
        self.dispatcher
            .change_target(nodepool_id)?
            .call(FUNCTION_DELETE, ctx, kwargs)
            .await
    }

    /// Push changed autoscaling knobs to the agent. Fire-and-forget.
    pub async fn nodepool_policy_update(
        &self,
        ctx: &RequestContext,
        nodepool_id: &str,
        policy_id: &Uuid,
        changes: serde_json::Map<String, Value>,
    ) -> Result<(), DispatchError> {
        let mut kwargs = Kwargs::new();
        kwargs.insert("nodepool_id".into(), json!(nodepool_id));
        kwargs.insert("policy_id".into(), json!(policy_id));
        kwargs.insert("changes".into(), Value::Object(changes));
        self.dispatcher
            .change_target(nodepool_id)?
            .cast(NODEPOOL_POLICY_UPDATE, ctx, kwargs)
            .await
    }

    /// Liveness check against a fixed listener, outside the nodepool registry.
    pub async fn ping_listener(
        &self,
        ctx: &RequestContext,
        topic: &str,
        server: Option<String>,
        timeout: Duration,
    ) -> Result<Value, DispatchError> {
        self.dispatcher
            .bind(RoutingTarget::fixed(topic, server))
            .with_timeout(timeout)
            .call(PING_LISTENER, ctx, Kwargs::new())
            .await
    }
}
