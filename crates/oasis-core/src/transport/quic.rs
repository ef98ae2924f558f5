// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC binding of the transport, on top of `oasis-protocol`.
//!
//! Requests go to the target's pinned server address when it has one and to
//! the fabric ingress otherwise. One client (and so one connection) is kept
//! per remote address; each RPC uses its own bidirectional stream.
//!
//! Casts never wait on the network. They are queued per remote address and
//! a background task drains each queue in order, so casts to one address
//! keep their send order.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use oasis_protocol::{
    ClientError, OasisClient, OasisClientConfig, OasisServer, RpcRequest, RpcResponse,
    ServerError, rpc_response::Outcome,
};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument, warn};

use super::{AgentHandler, RpcMessage, Transport, remote_failure};
use crate::error::DispatchError;
use crate::routing::RoutingTarget;

/// Error kind an agent answers with when a request names a topic it does
/// not own.
pub const TOPIC_MISMATCH: &str = "TOPIC_MISMATCH";

struct ClientPool {
    base: OasisClientConfig,
    clients: Mutex<HashMap<SocketAddr, Arc<OasisClient>>>,
}

impl ClientPool {
    async fn client_at(&self, addr: SocketAddr) -> Result<Arc<OasisClient>, ClientError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&addr) {
            return Ok(client.clone());
        }

        let client = Arc::new(OasisClient::new(OasisClientConfig {
            server_addr: addr,
            ..self.base.clone()
        })?);
        clients.insert(addr, client.clone());
        debug!(%addr, "created QUIC client");
        Ok(client)
    }
}

/// A cast waiting for delivery.
struct QueuedCast {
    destination: String,
    request: RpcRequest,
}

pub struct QuicTransport {
    pool: Arc<ClientPool>,
    casts: Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<QueuedCast>>>,
}

impl QuicTransport {
    /// `base.server_addr` is the fabric ingress.
    pub fn new(base: OasisClientConfig) -> Self {
        Self {
            pool: Arc::new(ClientPool {
                base,
                clients: Mutex::new(HashMap::new()),
            }),
            casts: Mutex::new(HashMap::new()),
        }
    }

    pub fn ingress(&self) -> SocketAddr {
        self.pool.base.server_addr
    }

    fn address_for(&self, target: &RoutingTarget) -> Result<SocketAddr, DispatchError> {
        match &target.server_address {
            None => Ok(self.ingress()),
            Some(server) => server.parse().map_err(|_| DispatchError::RemoteUnreachable {
                topic: target.destination(),
                reason: format!("'{}' is not a socket address", server),
            }),
        }
    }

    async fn client_for(&self, target: &RoutingTarget) -> Result<Arc<OasisClient>, DispatchError> {
        let addr = self.address_for(target)?;
        self.pool
            .client_at(addr)
            .await
            .map_err(|e| unreachable(target, e))
    }

    async fn enqueue_cast(&self, addr: SocketAddr, cast: QueuedCast) {
        let mut casts = self.casts.lock().await;
        let cast = match casts.get(&addr) {
            Some(queue) => match queue.send(cast) {
                Ok(()) => return,
                // The drain task is gone; start a new one below.
                Err(mpsc::error::SendError(cast)) => cast,
            },
            None => cast,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain_casts(self.pool.clone(), addr, rx));
        let _ = tx.send(cast);
        casts.insert(addr, tx);
    }

    /// Stop the cast queues and drop every cached connection.
    pub async fn close(&self) {
        self.casts.lock().await.clear();
        let clients: Vec<_> = self
            .pool
            .clients
            .lock()
            .await
            .drain()
            .map(|(_, c)| c)
            .collect();
        for client in clients {
            client.close().await;
        }
    }
}

async fn drain_casts(
    pool: Arc<ClientPool>,
    addr: SocketAddr,
    mut queue: mpsc::UnboundedReceiver<QueuedCast>,
) {
    while let Some(QueuedCast {
        destination,
        request,
    }) = queue.recv().await
    {
        let sent = match pool.client_at(addr).await {
            Ok(client) => client.send_fire_and_forget(&request).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => debug!(%destination, call_id = %request.call_id, "cast delivered"),
            Err(e) => warn!(
                %destination,
                call_id = %request.call_id,
                method = %request.method,
                error = %e,
                "cast was not delivered"
            ),
        }
    }
    debug!(%addr, "cast queue closed");
}

fn unreachable(target: &RoutingTarget, err: ClientError) -> DispatchError {
    DispatchError::RemoteUnreachable {
        topic: target.destination(),
        reason: err.to_string(),
    }
}

fn classify(target: &RoutingTarget, err: ClientError) -> DispatchError {
    match err {
        ClientError::Frame(e) => DispatchError::Encoding(e.to_string()),
        ClientError::ErrorFrame => DispatchError::RemoteApplicationError {
            kind: "AGENT_FAILURE".to_string(),
            message: "agent failed while handling the request".to_string(),
        },
        other => unreachable(target, other),
    }
}

fn encode_request(
    target: &RoutingTarget,
    message: &RpcMessage,
    reply_expected: bool,
) -> Result<RpcRequest, DispatchError> {
    let encode = |e: serde_json::Error| DispatchError::Encoding(e.to_string());
    Ok(RpcRequest {
        call_id: message.call_id.clone(),
        topic: target.topic.clone(),
        server: target.server_address.clone(),
        method: message.method.clone(),
        context: serde_json::to_vec(&message.context).map_err(encode)?,
        kwargs: serde_json::to_vec(&message.kwargs).map_err(encode)?,
        reply_expected,
    })
}

fn decode_request(request: RpcRequest) -> Result<RpcMessage, DispatchError> {
    let decode = |e: serde_json::Error| DispatchError::Encoding(e.to_string());
    Ok(RpcMessage {
        call_id: request.call_id,
        method: request.method,
        context: serde_json::from_slice(&request.context).map_err(decode)?,
        kwargs: serde_json::from_slice(&request.kwargs).map_err(decode)?,
    })
}

#[async_trait]
impl Transport for QuicTransport {
    #[instrument(skip(self, message), fields(method = %message.method, call_id = %message.call_id))]
    async fn call(&self, target: &RoutingTarget, message: RpcMessage) -> Result<Value, DispatchError> {
        let request = encode_request(target, &message, true)?;
        let client = self.client_for(target).await?;

        let response: RpcResponse = client
            .request(&request)
            .await
            .map_err(|e| classify(target, e))?;

        if response.call_id != message.call_id {
            return Err(DispatchError::Encoding(format!(
                "reply for call '{}' received on call '{}'",
                response.call_id, message.call_id
            )));
        }

        match response.outcome {
            Some(Outcome::Payload(bytes)) => {
                serde_json::from_slice(&bytes).map_err(|e| DispatchError::Encoding(e.to_string()))
            }
            Some(Outcome::Error(err)) => Err(DispatchError::RemoteApplicationError {
                kind: err.code,
                message: err.message,
            }),
            None => Err(DispatchError::Encoding("reply carried no outcome".to_string())),
        }
    }

    /// Queue the cast and return. Only encoding and address errors are
    /// reported; delivery failures are logged by the queue's drain task.
    async fn cast(&self, target: &RoutingTarget, message: RpcMessage) -> Result<(), DispatchError> {
        let request = encode_request(target, &message, false)?;
        let addr = self.address_for(target)?;
        self.enqueue_cast(
            addr,
            QueuedCast {
                destination: target.destination(),
                request,
            },
        )
        .await;
        Ok(())
    }
}

async fn handle_rpc<H: AgentHandler>(
    handler: &H,
    topics: &HashSet<String>,
    request: RpcRequest,
) -> Option<RpcResponse> {
    let call_id = request.call_id.clone();
    let reply_expected = request.reply_expected;

    if !topics.contains(&request.topic) {
        warn!(topic = %request.topic, method = %request.method, %call_id, "request for a topic this agent does not serve");
        return reply_expected.then(|| {
            RpcResponse::error(
                call_id,
                TOPIC_MISMATCH,
                format!("topic '{}' is not served here", request.topic),
            )
        });
    }

    let response = match decode_request(request) {
        Err(e) => RpcResponse::error(call_id, e.error_code(), e.to_string()),
        Ok(message) => match handler.handle(message).await.map_err(remote_failure) {
            Ok(value) => match serde_json::to_vec(&value) {
                Ok(bytes) => RpcResponse::payload(call_id, bytes),
                Err(e) => RpcResponse::error(call_id, "RPC_ENCODING_ERROR", e.to_string()),
            },
            Err(DispatchError::RemoteApplicationError { kind, message }) => {
                RpcResponse::error(call_id, kind, message)
            }
            Err(other) => RpcResponse::error(call_id, other.error_code(), other.to_string()),
        },
    };

    if !reply_expected {
        if let Some(Outcome::Error(err)) = &response.outcome {
            warn!(call_id = %response.call_id, code = %err.code, "cast failed on the agent");
        }
        return None;
    }
    Some(response)
}

/// Run the agent side of the QUIC binding until the server closes.
///
/// Only requests addressed to one of `topics` reach `handler`; any other
/// call is answered with a [`TOPIC_MISMATCH`] error and any other cast is
/// dropped.
pub async fn serve_agent<H, T>(server: &OasisServer, topics: T, handler: H) -> Result<(), ServerError>
where
    H: AgentHandler,
    T: IntoIterator,
    T::Item: Into<String>,
{
    let topics: Arc<HashSet<String>> = Arc::new(topics.into_iter().map(Into::into).collect());
    info!(topics = ?topics, "agent serving");
    let handler = Arc::new(handler);

    server
        .run(move |conn| {
            let handler = handler.clone();
            let topics = topics.clone();
            async move {
                conn.run(move |mut stream| {
                    let handler = handler.clone();
                    let topics = topics.clone();
                    async move {
                        let served = stream
                            .handle_request(|req: RpcRequest| async move {
                                Ok::<_, ServerError>(handle_rpc(handler.as_ref(), &topics, req).await)
                            })
                            .await;
                        if let Err(e) = served {
                            debug!("agent stream ended: {}", e);
                        }
                    }
                })
                .await;
            }
        })
        .await
}
