// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message transport bindings.
//!
//! A [`Transport`] delivers one [`RpcMessage`] to a [`RoutingTarget`], either
//! waiting for the agent's reply (`call`) or not (`cast`). Reply deadlines
//! are the dispatcher's concern; transports only report delivery failures
//! and remote errors.

pub mod local;
#[cfg(feature = "quic")]
pub mod quic;

pub use self::local::{Delivery, LocalBus};
#[cfg(feature = "quic")]
pub use self::quic::{QuicTransport, serve_agent};

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::routing::RoutingTarget;

/// Keyword arguments of a remote method.
pub type Kwargs = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcMessage {
    pub call_id: String,
    pub method: String,
    pub context: RequestContext,
    pub kwargs: Kwargs,
}

impl RpcMessage {
    pub fn new(method: impl Into<String>, context: RequestContext, kwargs: Kwargs) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            method: method.into(),
            context,
            kwargs,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver and wait for the reply.
    async fn call(&self, target: &RoutingTarget, message: RpcMessage) -> Result<Value, DispatchError>;

    /// Deliver without waiting. `Ok` means handed to the transport, nothing more.
    async fn cast(&self, target: &RoutingTarget, message: RpcMessage) -> Result<(), DispatchError>;
}

/// Normalize an agent handler failure to what the caller sees: every error
/// raised on the remote side arrives as
/// [`DispatchError::RemoteApplicationError`], keeping its kind.
pub fn remote_failure(err: DispatchError) -> DispatchError {
    match err {
        remote @ DispatchError::RemoteApplicationError { .. } => remote,
        other => DispatchError::RemoteApplicationError {
            kind: other.error_code().to_string(),
            message: other.to_string(),
        },
    }
}

/// The receiving end: what an agent does with one message.
#[async_trait]
pub trait AgentHandler: Send + Sync + 'static {
    async fn handle(&self, message: RpcMessage) -> Result<Value, DispatchError>;
}

#[async_trait]
impl<F, Fut> AgentHandler for F
where
    F: Fn(RpcMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
{
    async fn handle(&self, message: RpcMessage) -> Result<Value, DispatchError> {
        (self)(message).await
    }
}
