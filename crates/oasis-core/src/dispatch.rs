// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Topic-routed RPC dispatch.
//!
//! [`RpcDispatcher`] is the shared, target-less factory (the idle state). It
//! hands out [`BoundDispatcher`] values, each bound to one routing target
//! and owned by a single call path. `call` and `retarget` take `&mut self`,
//! so a bound dispatcher can never be retargeted while a call is in flight.
//!
//! No retries happen here: a `call` may not be idempotent.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::routing::{RoutingTarget, TopicRouter};
use crate::transport::{Kwargs, RpcMessage, Transport};

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RpcDispatcher {
    router: Arc<TopicRouter>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl RpcDispatcher {
    pub fn new(router: Arc<TopicRouter>, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            router,
            transport,
            timeout,
        }
    }

    pub fn router(&self) -> &Arc<TopicRouter> {
        &self.router
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `nodepool_id` and bind a fresh dispatcher to it.
    pub fn change_target(&self, nodepool_id: &str) -> Result<BoundDispatcher, DispatchError> {
        let target = self.router.route(nodepool_id)?;
        Ok(self.bind(target))
    }

    /// Bind to an explicit target that bypasses the registry.
    pub fn bind(&self, target: RoutingTarget) -> BoundDispatcher {
        BoundDispatcher {
            router: self.router.clone(),
            transport: self.transport.clone(),
            timeout: self.timeout,
            target,
            state: DispatcherState::TargetBound,
        }
    }

    pub async fn dispatch_call(
        &self,
        nodepool_id: &str,
        method: &str,
        ctx: &RequestContext,
        kwargs: Kwargs,
    ) -> Result<Value, DispatchError> {
        self.change_target(nodepool_id)?
            .call(method, ctx, kwargs)
            .await
    }

    /// Fire-and-forget. Only routing failures are reported.
    pub async fn dispatch_cast(
        &self,
        nodepool_id: &str,
        method: &str,
        ctx: &RequestContext,
        kwargs: Kwargs,
    ) -> Result<(), DispatchError> {
        self.change_target(nodepool_id)?
            .cast(method, ctx, kwargs)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    TargetBound,
    CallInFlight,
}

/// A dispatcher bound to one target, for exclusive use by one call path.
pub struct BoundDispatcher {
    router: Arc<TopicRouter>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    target: RoutingTarget,
    state: DispatcherState,
}

impl BoundDispatcher {
    pub fn target(&self) -> &RoutingTarget {
        &self.target
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retarget(&mut self, nodepool_id: &str) -> Result<(), DispatchError> {
        self.target = self.router.route(nodepool_id)?;
        Ok(())
    }

    /// Invoke `method` and wait up to the timeout for the reply.
    ///
    /// On [`DispatchError::RemoteTimeout`] the remote side may still finish
    /// the work; callers must re-read persisted state.
    #[instrument(skip(self, ctx, kwargs), fields(topic = %self.target, request_id = %ctx.request_id))]
    pub async fn call(
        &mut self,
        method: &str,
        ctx: &RequestContext,
        kwargs: Kwargs,
    ) -> Result<Value, DispatchError> {
        let message = RpcMessage::new(method, ctx.clone(), kwargs);
        let call_id = message.call_id.clone();
        debug!(%call_id, "rpc call");

        self.state = DispatcherState::CallInFlight;
        let outcome = tokio::time::timeout(self.timeout, self.transport.call(&self.target, message)).await;
        self.state = DispatcherState::TargetBound;

        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                warn!(%call_id, error = %e, "rpc call failed");
                Err(e)
            }
            Err(_) => {
                warn!(%call_id, timeout_ms = self.timeout.as_millis() as u64, "rpc call timed out");
                Err(DispatchError::RemoteTimeout {
                    method: method.to_string(),
                    topic: self.target.destination(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Enqueue `method` without waiting. Delivery failures are logged, not
    /// returned.
    #[instrument(skip(self, ctx, kwargs), fields(topic = %self.target, request_id = %ctx.request_id))]
    pub async fn cast(
        &self,
        method: &str,
        ctx: &RequestContext,
        kwargs: Kwargs,
    ) -> Result<(), DispatchError> {
        let message = RpcMessage::new(method, ctx.clone(), kwargs);
        let call_id = message.call_id.clone();
        match self.transport.cast(&self.target, message).await {
            Ok(()) => info!(%call_id, "rpc cast queued"),
            Err(e) => warn!(%call_id, error = %e, "rpc cast was not delivered"),
        }
        Ok(())
    }
}
