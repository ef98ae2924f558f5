// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stream framing for agent RPCs.
//!
//! One QUIC stream carries one request and at most one answer:
//!
//! ```text
//! +----------------+-------------+------------------------+
//! | length: u32 BE | kind: u16 BE | protobuf payload       |
//! +----------------+-------------+------------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Agent calls carry function bodies, not blobs.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

pub const HEADER_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    Request = 1,
    Response = 2,
    /// Transport-level failure; the payload may be empty.
    Error = 3,
}

impl TryFrom<u16> for MessageType {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, FrameError> {
        [MessageType::Request, MessageType::Response, MessageType::Error]
            .into_iter()
            .find(|kind| *kind as u16 == value)
            .ok_or(FrameError::InvalidMessageType(value))
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("invalid message type: {0}")]
    InvalidMessageType(u16),

    #[error("unexpected message type: {0:?}")]
    UnexpectedMessageType(MessageType),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("connection closed")]
    ConnectionClosed,
}

/// The fixed six bytes in front of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    length: usize,
    message_type: MessageType,
}

impl FrameHeader {
    fn parse(mut raw: &[u8]) -> Result<Self, FrameError> {
        let length = raw.get_u32() as usize;
        let message_type = MessageType::try_from(raw.get_u16())?;
        if length > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(length));
        }
        Ok(Self {
            length,
            message_type,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl Frame {
    pub fn request<M: Message>(msg: &M) -> Result<Self, FrameError> {
        Self::new(MessageType::Request, msg)
    }

    pub fn response<M: Message>(msg: &M) -> Result<Self, FrameError> {
        Self::new(MessageType::Response, msg)
    }

    pub fn empty_error() -> Self {
        Self {
            message_type: MessageType::Error,
            payload: Bytes::new(),
        }
    }

    pub fn new<M: Message>(message_type: MessageType, msg: &M) -> Result<Self, FrameError> {
        let len = msg.encoded_len();
        if len > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(len));
        }
        Ok(Self {
            message_type,
            payload: Bytes::from(msg.encode_to_vec()),
        })
    }

    pub fn decode<M: Message + Default>(&self) -> Result<M, FrameError> {
        Ok(M::decode(self.payload.clone())?)
    }

    /// Header followed by payload, ready for the wire.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.put_u16(self.message_type as u16);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), FrameError> {
    writer.write_all(&frame.encode()).await?;
    Ok(())
}

/// Read one frame. A stream that ends before any header byte is
/// [`FrameError::ConnectionClosed`].
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut raw = [0u8; HEADER_SIZE];
    if let Err(e) = reader.read_exact(&mut raw).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::ConnectionClosed,
            _ => e.into(),
        });
    }
    let header = FrameHeader::parse(&raw)?;

    let mut payload = BytesMut::zeroed(header.length);
    reader.read_exact(&mut payload).await?;

    Ok(Frame {
        message_type: header.message_type,
        payload: payload.freeze(),
    })
}
