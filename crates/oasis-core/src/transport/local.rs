// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process bus for embedded single-node runs and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{AgentHandler, RpcMessage, Transport, remote_failure};
use crate::error::DispatchError;
use crate::routing::RoutingTarget;

type ReplySender = oneshot::Sender<Result<Value, DispatchError>>;

/// One message as seen by a subscriber.
#[derive(Debug)]
pub struct Delivery {
    pub message: RpcMessage,
    reply: Option<ReplySender>,
}

impl Delivery {
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Answer a `call`. A no-op for casts or when the caller gave up.
    pub fn reply(self, result: Result<Value, DispatchError>) {
        send_reply(self.reply, result);
    }
}

fn send_reply(reply: Option<ReplySender>, result: Result<Value, DispatchError>) {
    if let Some(tx) = reply {
        let _ = tx.send(result);
    }
}

/// Topic-keyed channels. One subscriber per destination; messages to the
/// same destination are delivered in send order.
#[derive(Clone, Default)]
pub struct LocalBus {
    subscribers: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Delivery>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take over `destination` (a topic, or `topic.server`).
    pub fn subscribe(&self, destination: impl Into<String>) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(destination.into(), tx);
        rx
    }

    pub fn unsubscribe(&self, destination: &str) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(destination);
    }

    /// Subscribe `handler` to `destination` and process messages one at a time.
    pub fn serve<H: AgentHandler>(&self, destination: impl Into<String>, handler: H) -> JoinHandle<()> {
        let destination = destination.into();
        let mut rx = self.subscribe(destination.clone());
        tokio::spawn(async move {
            while let Some(Delivery { message, reply }) = rx.recv().await {
                debug!(%destination, method = %message.method, call_id = %message.call_id, "local delivery");
                let result = handler.handle(message).await.map_err(remote_failure);
                send_reply(reply, result);
            }
            debug!(%destination, "local subscriber stopped");
        })
    }

    fn deliver(&self, target: &RoutingTarget, delivery: Delivery) -> Result<(), DispatchError> {
        let destination = target.destination();
        let sender = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&destination)
            .cloned()
            .ok_or_else(|| DispatchError::RemoteUnreachable {
                topic: destination.clone(),
                reason: "no subscriber".to_string(),
            })?;

        sender.send(delivery).map_err(|_| {
            warn!(%destination, "subscriber went away");
            DispatchError::RemoteUnreachable {
                topic: destination,
                reason: "subscriber went away".to_string(),
            }
        })
    }
}

#[async_trait]
impl Transport for LocalBus {
    async fn call(&self, target: &RoutingTarget, message: RpcMessage) -> Result<Value, DispatchError> {
        let (tx, rx) = oneshot::channel();
        self.deliver(
            target,
            Delivery {
                message,
                reply: Some(tx),
            },
        )?;

        rx.await.map_err(|_| DispatchError::RemoteUnreachable {
            topic: target.destination(),
            reason: "agent dropped the call without replying".to_string(),
        })?
    }

    async fn cast(&self, target: &RoutingTarget, message: RpcMessage) -> Result<(), DispatchError> {
        self.deliver(
            target,
            Delivery {
                message,
                reply: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use serde_json::json;

    fn message(method: &str) -> RpcMessage {
        RpcMessage::new(method, RequestContext::admin(), Default::default())
    }

    #[tokio::test]
    async fn test_call_reaches_the_subscriber() {
        let bus = LocalBus::new();
        let target = RoutingTarget::fixed("oasis-agent.np-1", None);
        bus.serve(target.destination(), |msg: RpcMessage| async move {
            Ok::<_, DispatchError>(json!({ "method": msg.method }))
        });

        let reply = bus.call(&target, message("function_create")).await.unwrap();
        assert_eq!(reply, json!({ "method": "function_create" }));
    }

    #[tokio::test]
    async fn test_missing_subscriber_is_unreachable() {
        let bus = LocalBus::new();
        let target = RoutingTarget::fixed("oasis-agent.np-9", None);
        let err = bus.call(&target, message("x")).await.unwrap_err();
        assert_eq!(err.error_code(), "REMOTE_UNREACHABLE");
        let err = bus.cast(&target, message("x")).await.unwrap_err();
        assert_eq!(err.error_code(), "REMOTE_UNREACHABLE");
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_unreachable() {
        let bus = LocalBus::new();
        let target = RoutingTarget::fixed("t", None);
        let mut rx = bus.subscribe("t");
        tokio::spawn(async move {
            if let Some(delivery) = rx.recv().await {
                drop(delivery);
            }
        });

        let err = bus.call(&target, message("x")).await.unwrap_err();
        assert_eq!(err.error_code(), "REMOTE_UNREACHABLE");
    }

    #[tokio::test]
    async fn test_cast_preserves_order_and_expects_no_reply() {
        let bus = LocalBus::new();
        let target = RoutingTarget::fixed("t", Some("host-1".into()));
        let mut rx = bus.subscribe("t.host-1");

        for method in ["a", "b", "c"] {
            bus.cast(&target, message(method)).await.unwrap();
        }

        for expected in ["a", "b", "c"] {
            let delivery = rx.recv().await.unwrap();
            assert!(!delivery.expects_reply());
            assert_eq!(delivery.message.method, expected);
        }
    }

    #[tokio::test]
    async fn test_remote_errors_are_passed_through() {
        let bus = LocalBus::new();
        let target = RoutingTarget::fixed("t", None);
        bus.serve("t", |_msg: RpcMessage| async move {
            Err::<Value, _>(DispatchError::RemoteApplicationError {
                kind: "VALIDATION_FAILED".into(),
                message: "body is empty".into(),
            })
        });

        let err = bus.call(&target, message("x")).await.unwrap_err();
        assert_eq!(err.remote_kind(), Some("VALIDATION_FAILED"));
    }

    #[tokio::test]
    async fn test_agent_side_dispatch_errors_arrive_as_remote() {
        let bus = LocalBus::new();
        let target = RoutingTarget::fixed("t", None);
        bus.serve("t", |_msg: RpcMessage| async move {
            Err::<Value, _>(DispatchError::UnknownNodePool {
                nodepool_id: "np-downstream".into(),
            })
        });

        let err = bus.call(&target, message("x")).await.unwrap_err();
        assert_eq!(err.error_code(), "REMOTE_APPLICATION_ERROR");
        assert_eq!(err.remote_kind(), Some("UNKNOWN_NODE_POOL"));
    }
}
