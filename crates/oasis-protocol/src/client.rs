// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC client for delivering calls to the agent fabric.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig, Connection, Endpoint, SendStream, TransportConfig};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::frame::{Frame, FrameError, MessageType, read_frame, write_frame};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("connect error: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream closed: {0}")]
    ClosedStream(#[from] quinn::ClosedStream),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("peer answered with an error frame")]
    ErrorFrame,

    #[error("connection timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Debug, Clone)]
pub struct OasisClientConfig {
    /// Fabric ingress or pinned agent server address
    pub server_addr: SocketAddr,
    /// TLS server name ("localhost" for local agents)
    pub server_name: String,
    /// Accept any server certificate. Local development only.
    pub dangerous_skip_cert_verification: bool,
    /// 0 disables keep-alives
    pub keep_alive_interval_ms: u64,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for OasisClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 7100)),
            server_name: "localhost".to_string(),
            dangerous_skip_cert_verification: false,
            keep_alive_interval_ms: 10_000,
            idle_timeout_ms: 120_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Client for one remote address, holding a lazily (re)established
/// connection. Every request gets its own bidirectional stream.
pub struct OasisClient {
    endpoint: Endpoint,
    connection: Mutex<Option<Connection>>,
    config: OasisClientConfig,
}

impl OasisClient {
    pub fn new(config: OasisClientConfig) -> Result<Self, ClientError> {
        let mut endpoint = Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))?;
        endpoint.set_default_client_config(quic_client_config(&config)?);

        Ok(Self {
            endpoint,
            connection: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &OasisClientConfig {
        &self.config
    }

    /// Return the live connection, dialing a new one if needed.
    ///
    /// The lock is not held across the handshake, so a slow dial does not
    /// stall requests that could reuse an existing connection. Two racing
    /// dials both succeed and the later one is kept.
    #[instrument(skip(self), fields(addr = %self.config.server_addr))]
    pub async fn connect(&self) -> Result<Connection, ClientError> {
        if let Some(conn) = self.live_connection().await {
            return Ok(conn);
        }

        info!("connecting to agent fabric");
        let connecting = self
            .endpoint
            .connect(self.config.server_addr, &self.config.server_name)?;
        let conn = tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            connecting,
        )
        .await
        .map_err(|_| ClientError::Timeout(self.config.connect_timeout_ms))??;

        debug!("connected to agent fabric");
        *self.connection.lock().await = Some(conn.clone());
        Ok(conn)
    }

    async fn live_connection(&self) -> Option<Connection> {
        self.connection
            .lock()
            .await
            .as_ref()
            .filter(|conn| conn.close_reason().is_none())
            .cloned()
    }

    async fn send_request<Req: prost::Message>(
        &self,
        request: &Req,
    ) -> Result<(SendStream, quinn::RecvStream), ClientError> {
        let (mut send, recv) = self.connect().await?.open_bi().await?;
        write_frame(&mut send, &Frame::request(request)?).await?;
        send.finish()?;
        Ok((send, recv))
    }

    /// Send a request and wait for its response frame.
    #[instrument(skip(self, request))]
    pub async fn request<Req: prost::Message, Resp: prost::Message + Default>(
        &self,
        request: &Req,
    ) -> Result<Resp, ClientError> {
        let (_send, mut recv) = self.send_request(request).await?;
        let answer = read_frame(&mut recv).await?;
        match answer.message_type {
            MessageType::Response => Ok(answer.decode()?),
            MessageType::Error => Err(ClientError::ErrorFrame),
            other => Err(FrameError::UnexpectedMessageType(other).into()),
        }
    }

    /// Send a request the peer will not answer.
    #[instrument(skip(self, request))]
    pub async fn send_fire_and_forget<Req: prost::Message>(
        &self,
        request: &Req,
    ) -> Result<(), ClientError> {
        self.send_request(request).await.map(drop)
    }

    pub async fn close(&self) {
        if let Some(conn) = self.connection.lock().await.take() {
            conn.close(0u32.into(), b"client closing");
        }
    }
}

impl Drop for OasisClient {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.connection.try_lock()
            && let Some(conn) = guard.take()
        {
            conn.close(0u32.into(), b"client dropped");
        }
    }
}

fn quic_client_config(config: &OasisClientConfig) -> Result<ClientConfig, ClientError> {
    let crypto = if config.dangerous_skip_cert_verification {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    let mut transport = TransportConfig::default();
    if config.keep_alive_interval_ms > 0 {
        transport.keep_alive_interval(Some(Duration::from_millis(config.keep_alive_interval_ms)));
    }
    let idle: quinn::IdleTimeout = Duration::from_millis(config.idle_timeout_ms)
        .try_into()
        .map_err(|e: quinn::VarIntBoundsExceeded| ClientError::InvalidConfig(e.to_string()))?;
    transport.max_idle_timeout(Some(idle));

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| ClientError::Tls(e.to_string()))?;
    let mut client_config = ClientConfig::new(Arc::new(quic_crypto));
    client_config.transport_config(Arc::new(transport));
    Ok(client_config)
}

/// Accepts every certificate. Local development only.
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
