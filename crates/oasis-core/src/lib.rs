// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Oasis Core - Function-as-a-Service Control Plane
//!
//! This crate owns the resource model for functions, nodepools and nodepool
//! autoscaling policies. It persists them, reconciles client patches against
//! them, and pushes the resulting state to the agent that runs each nodepool.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    REST clients                          │
//! └──────────────────────────────────────────────────────────┘
//!                          │  Oasis-API-Version negotiation
//!                          ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  http  ──►  ResourceController  ──►  ObjectRepository     │
//! │                   │                        │             │
//! │                   │ AgentApi               ▼             │
//! │                   ▼                   Store (SQLite)     │
//! │             RpcDispatcher ── TopicRouter                 │
//! └──────────────────────────────────────────────────────────┘
//!                          │  Transport (LocalBus | QUIC)
//!                          ▼
//! ┌────────────────────┐  ┌────────────────────┐
//! │ oasis-agent.np-1   │  │ oasis-agent.np-2   │   nodepool agents
//! └────────────────────┘  └────────────────────┘
//! ```
//!
//! # Agent methods
//!
//! | Method | Mode | Description |
//! |--------|------|-------------|
//! | `function_create` | call | Deploy a function on its nodepool |
//! | `function_update` | call | Redeploy after a patch |
//! | `function_delete` | call | Remove a function from its nodepool |
//! | `nodepool_policy_update` | cast | Push changed autoscaling knobs |
//! | `ping_listener` | call | Liveness check against a fixed listener |
//!
//! # Feature flags
//!
//! - `quic`: QUIC transport via `oasis-protocol`
//! - `http`: axum REST surface
//! - `server` (default): both, plus the `oasis-api` binary

pub mod agent_api;
pub mod config;
pub mod context;
pub mod controller;
pub mod dispatch;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod objects;
pub mod patch;
pub mod persistence;
pub mod policy;
pub mod routing;
pub mod transport;
pub mod version;

pub use agent_api::AgentApi;
pub use config::Config;
pub use context::RequestContext;
pub use controller::ResourceController;
pub use dispatch::{BoundDispatcher, RpcDispatcher};
pub use error::{DispatchError, OasisError, PatchError, VersionError};
pub use objects::{FieldInput, Function, FunctionStatus, NodePool, NodePoolPolicy, VersionedObject};
pub use persistence::{SqliteStore, Store};
pub use policy::{AllowAll, Authorizer, DefaultAuthorizer};
pub use routing::{NodePoolEntry, RoutingTarget, TopicRouter};
