// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Oasis Protocol - QUIC + Protobuf binding for the agent message fabric
//!
//! The control plane hands privileged work to per-nodepool worker agents.
//! This crate is the wire underneath that hand-off:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      oasis-protocol                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelopes: RpcRequest / RpcResponse / RpcError             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Framing: 4-byte length + 2-byte type + protobuf payload    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: QUIC (quinn), one bidirectional stream per call │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request names the destination `topic` (and optionally a fixed
//! `server`), the remote `method`, and carries the caller's security
//! context and keyword arguments as JSON blobs. Fire-and-forget requests
//! set `reply_expected = false`; the receiver must not answer them.
//!
//! # Usage
//!
//! ```ignore
//! use oasis_protocol::{OasisClient, OasisClientConfig, RpcRequest, RpcResponse};
//!
//! let client = OasisClient::new(OasisClientConfig {
//!     server_addr: "127.0.0.1:7100".parse()?,
//!     ..Default::default()
//! })?;
//!
//! let request = RpcRequest {
//!     call_id: "c-1".to_string(),
//!     topic: "oasis-agent.np-1".to_string(),
//!     server: None,
//!     method: "function_create".to_string(),
//!     context: b"{}".to_vec(),
//!     kwargs: br#"{"function_id":"..."}"#.to_vec(),
//!     reply_expected: true,
//! };
//!
//! let response: RpcResponse = client.request(&request).await?;
//! ```

pub mod client;
pub mod frame;
pub mod message;
pub mod server;

pub use client::{ClientError, OasisClient, OasisClientConfig};
pub use frame::{Frame, FrameError, MessageType};
pub use message::{RpcError, RpcRequest, RpcResponse, rpc_response};
pub use server::{ConnectionHandler, OasisServer, OasisServerConfig, ServerError, StreamHandler};
