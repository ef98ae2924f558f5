// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protobuf envelopes carried inside frames.
//!
//! Field tags are part of the wire contract; never renumber them.

/// A single remote invocation addressed to a topic.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcRequest {
    /// Caller-chosen correlation id, echoed back in the response.
    #[prost(string, tag = "1")]
    pub call_id: String,
    /// Destination topic on the fabric.
    #[prost(string, tag = "2")]
    pub topic: String,
    /// Fixed server the call is pinned to, if any.
    #[prost(string, optional, tag = "3")]
    pub server: Option<String>,
    /// Remote method name.
    #[prost(string, tag = "4")]
    pub method: String,
    /// JSON-encoded security context.
    #[prost(bytes = "vec", tag = "5")]
    pub context: Vec<u8>,
    /// JSON-encoded keyword arguments (an object).
    #[prost(bytes = "vec", tag = "6")]
    pub kwargs: Vec<u8>,
    /// False for casts; the receiver sends nothing back.
    #[prost(bool, tag = "7")]
    pub reply_expected: bool,
}

/// Reply to an [`RpcRequest`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcResponse {
    #[prost(string, tag = "1")]
    pub call_id: String,
    #[prost(oneof = "rpc_response::Outcome", tags = "2, 3")]
    pub outcome: Option<rpc_response::Outcome>,
}

/// Application-level failure reported by the remote side.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcError {
    /// Stable error kind, e.g. `VALIDATION_FAILED`.
    #[prost(string, tag = "1")]
    pub code: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

pub mod rpc_response {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Outcome {
        /// JSON-encoded result value.
        #[prost(bytes, tag = "2")]
        Payload(Vec<u8>),
        #[prost(message, tag = "3")]
        Error(super::RpcError),
    }
}

impl RpcResponse {
    /// Successful reply carrying a JSON payload.
    pub fn payload(call_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: Some(rpc_response::Outcome::Payload(payload)),
        }
    }

    /// Failed reply carrying the remote error kind.
    pub fn error(
        call_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: Some(rpc_response::Outcome::Error(RpcError {
                code: code.into(),
                message: message.into(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_request_optional_server_survives_encoding() {
        let request = RpcRequest {
            call_id: "c-1".to_string(),
            topic: "oasis-agent.np-1".to_string(),
            server: Some("10.0.0.5:7101".to_string()),
            method: "ping".to_string(),
            context: b"{}".to_vec(),
            kwargs: b"{}".to_vec(),
            reply_expected: true,
        };

        let decoded = RpcRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.server.as_deref(), Some("10.0.0.5:7101"));

        let unpinned = RpcRequest {
            server: None,
            ..request
        };
        let decoded = RpcRequest::decode(unpinned.encode_to_vec().as_slice()).unwrap();
        assert!(decoded.server.is_none());
    }

    #[test]
    fn test_response_error_constructor() {
        let response = RpcResponse::error("c-9", "VALIDATION_FAILED", "bad body");
        match response.outcome {
            Some(rpc_response::Outcome::Error(err)) => {
                assert_eq!(err.code, "VALIDATION_FAILED");
                assert_eq!(err.message, "bad body");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(response.call_id, "c-9");
    }

    #[test]
    fn test_empty_response_has_no_outcome() {
        let decoded = RpcResponse::decode(&[][..]).unwrap();
        assert!(decoded.outcome.is_none());
        assert!(decoded.call_id.is_empty());
    }
}
