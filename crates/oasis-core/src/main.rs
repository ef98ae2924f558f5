// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Oasis API server
//!
//! Serves the REST surface and reaches nodepool agents through the QUIC
//! message fabric.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use oasis_core::agent_api::AgentApi;
use oasis_core::config::Config;
use oasis_core::controller::ResourceController;
use oasis_core::dispatch::RpcDispatcher;
use oasis_core::http::{AppState, build_router};
use oasis_core::persistence::SqliteStore;
use oasis_core::policy::DefaultAuthorizer;
use oasis_core::routing::TopicRouter;
use oasis_core::transport::QuicTransport;
use oasis_protocol::OasisClientConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("oasis_core=info".parse()?),
        )
        .init();

    info!("Starting Oasis API");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        api_addr = %config.api_addr,
        bus_addr = %config.bus_addr,
        agent_topic = %config.agent_topic,
        rpc_timeout_ms = config.rpc_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let store = SqliteStore::from_url(&config.database_url).await?;
    info!("Database ready");

    let transport = Arc::new(QuicTransport::new(OasisClientConfig {
        server_addr: config.bus_addr,
        dangerous_skip_cert_verification: config.bus_skip_cert_verification,
        ..Default::default()
    }));

    let router = Arc::new(TopicRouter::with_entries(
        config.agent_topic.clone(),
        config.nodepools.clone(),
    ));
    let dispatcher = RpcDispatcher::new(router, transport.clone(), config.rpc_timeout);

    let controller = Arc::new(ResourceController::new(
        Arc::new(store.clone()),
        Arc::new(DefaultAuthorizer),
        AgentApi::new(dispatcher),
        config.max_limit,
    ));

    let loaded = controller.load_registry().await?;
    info!(
        persisted = loaded,
        nodepools = ?controller.router().nodepool_ids(),
        "Nodepool registry loaded"
    );

    let app = build_router(AppState::new(controller));
    let listener = tokio::net::TcpListener::bind(config.api_addr).await?;
    info!(addr = %config.api_addr, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await?;

    transport.close().await;
    store.pool().close().await;
    info!("Shutdown complete");

    Ok(())
}
