//! Request and Response handling.
//!
//! A [`Request`] is an outgoing message; a [`Response`] is any decoded
//! incoming frame together with the time it arrived.

use std::borrow::Cow;

use tether_types::{CorrelationId, MessageType, MessageTypeRegistry};
use tracing::debug;

use crate::errors::FrameError;
use crate::frame::{now_millis, Frame, DIGEST_LEN};

/// A message to be sent over the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    message_type: MessageType,
    content: Vec<u8>,
    correlation_id: CorrelationId,
}

impl Request {
    /// Create a request with a freshly generated correlation ID.
    pub fn new(message_type: MessageType, content: impl Into<Vec<u8>>) -> Self {
        Self {
            message_type,
            content: content.into(),
            correlation_id: CorrelationId::new(),
        }
    }

    /// Use a specific correlation ID instead of the generated one.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Adopt the correlation ID of a received message so that this request
    /// is matched as its reply on the other side.
    pub fn respond(&mut self, response: &Response) {
        self.correlation_id = response.correlation_id;
        debug!(
            correlation_id = %self.correlation_id.short(),
            "Request responded with matching ID"
        );
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Build the frame, stamped with the current time.
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        Frame::new(
            self.message_type.code(),
            self.content.clone(),
            self.correlation_id,
        )
    }

    /// Wire bytes, stamped with the current time.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let bytes = self.to_frame()?.encode();
        debug!(
            message_type = %self.message_type,
            total_size = bytes.len(),
            correlation_id = %self.correlation_id.short(),
            "Compiled request"
        );
        Ok(bytes)
    }

    /// Wire bytes carrying an explicit send timestamp.
    pub fn encode_at(&self, timestamp_ms: u64) -> Result<Vec<u8>, FrameError> {
        Ok(Frame::with_timestamp(
            self.message_type.code(),
            self.content.clone(),
            self.correlation_id,
            timestamp_ms,
        )?
        .encode())
    }
}

/// A received message with all its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    message_type: MessageType,
    content: Vec<u8>,
    /// Send time from the sender's clock (ms since epoch).
    timestamp: u64,
    digest: [u8; DIGEST_LEN],
    /// Arrival time on the local clock (ms since epoch).
    received_at: u64,
    correlation_id: CorrelationId,
}

impl Response {
    /// Attach a verified frame to its registered message type.
    pub fn from_frame(
        frame: Frame,
        registry: &MessageTypeRegistry,
        received_at: u64,
    ) -> Result<Self, FrameError> {
        let message_type = registry.get(frame.type_code())?;
        let (header, content) = frame.into_parts();

        Ok(Self {
            message_type,
            content,
            timestamp: header.timestamp_ms,
            digest: header.digest,
            received_at,
            correlation_id: header.correlation_id,
        })
    }

    /// Decode one whole frame and resolve its type.
    pub fn parse(bytes: &[u8], registry: &MessageTypeRegistry) -> Result<Self, FrameError> {
        // Arrival time is captured before any decoding work.
        let received_at = now_millis();
        let response = Self::from_frame(Frame::decode(bytes)?, registry, received_at)?;
        debug!(
            message_type = %response.message_type,
            size = response.content.len(),
            correlation_id = %response.correlation_id.short(),
            latency_ms = response.latency(),
            "Parsed request"
        );
        Ok(response)
    }

    /// `received_at - timestamp` in milliseconds.
    ///
    /// Compares two clocks unless the frame echoes a timestamp taken on this
    /// side, which is what PONG replies do; for a PONG this is the round trip.
    /// The timestamp comes from the peer, so the result saturates at the
    /// `i64` bounds.
    pub fn latency(&self) -> i64 {
        let latency = i128::from(self.received_at) - i128::from(self.timestamp);
        latency.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Build a reply of the same message type carrying this message's
    /// correlation ID.
    pub fn respond(&self, content: impl Into<Vec<u8>>) -> Request {
        self.respond_with(self.message_type.clone(), content)
    }

    /// Build a reply of another message type carrying this message's
    /// correlation ID.
    pub fn respond_with(&self, message_type: MessageType, content: impl Into<Vec<u8>>) -> Request {
        Request::new(message_type, content).with_correlation_id(self.correlation_id)
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content as UTF-8, lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn received_at(&self) -> u64 {
        self.received_at
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}
