//! Frame layout and the encode/decode pair.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tether_types::CorrelationId;

use crate::errors::FrameError;
use crate::MAX_CONTENT_LEN;

/// Size of the SHA-256 content digest.
pub const DIGEST_LEN: usize = 32;

/// Fixed header size: 2 + 4 + 32 + 8 + 16.
pub const HEADER_LEN: usize = 2 + 4 + DIGEST_LEN + 8 + CorrelationId::LEN;

// Field offsets inside the header.
const TYPE_AT: usize = 0;
const LEN_AT: usize = 2;
const DIGEST_AT: usize = 6;
const TIMESTAMP_AT: usize = DIGEST_AT + DIGEST_LEN;
const CORRELATION_AT: usize = TIMESTAMP_AT + 8;

/// SHA-256 of `content`.
pub fn digest(content: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(content).into()
}

/// Milliseconds since the Unix epoch on the local clock.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn content_length(len: usize) -> Result<u32, FrameError> {
    u32::try_from(len).map_err(|_| FrameError::ContentTooLarge {
        size: len,
        max: MAX_CONTENT_LEN,
    })
}

/// The fixed-size part of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub type_code: u16,
    pub content_length: u32,
    pub digest: [u8; DIGEST_LEN],
    pub timestamp_ms: u64,
    pub correlation_id: CorrelationId,
}

impl FrameHeader {
    /// Serialize in wire order, big-endian.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[TYPE_AT..LEN_AT].copy_from_slice(&self.type_code.to_be_bytes());
        out[LEN_AT..DIGEST_AT].copy_from_slice(&self.content_length.to_be_bytes());
        out[DIGEST_AT..TIMESTAMP_AT].copy_from_slice(&self.digest);
        out[TIMESTAMP_AT..CORRELATION_AT].copy_from_slice(&self.timestamp_ms.to_be_bytes());
        out[CORRELATION_AT..].copy_from_slice(self.correlation_id.as_bytes());
        out
    }

    /// Parse the first `HEADER_LEN` bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let header: &[u8; HEADER_LEN] = bytes
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(FrameError::FrameTooShort { len: bytes.len() })?;

        let mut type_code = [0u8; 2];
        let mut length = [0u8; 4];
        let mut digest = [0u8; DIGEST_LEN];
        let mut timestamp = [0u8; 8];
        let mut correlation = [0u8; CorrelationId::LEN];

        type_code.copy_from_slice(&header[TYPE_AT..LEN_AT]);
        length.copy_from_slice(&header[LEN_AT..DIGEST_AT]);
        digest.copy_from_slice(&header[DIGEST_AT..TIMESTAMP_AT]);
        timestamp.copy_from_slice(&header[TIMESTAMP_AT..CORRELATION_AT]);
        correlation.copy_from_slice(&header[CORRELATION_AT..]);

        Ok(Self {
            type_code: u16::from_be_bytes(type_code),
            content_length: u32::from_be_bytes(length),
            digest,
            timestamp_ms: u64::from_be_bytes(timestamp),
            correlation_id: CorrelationId::from_bytes(correlation),
        })
    }

    pub fn content_len(&self) -> usize {
        self.content_length as usize
    }
}

/// A complete, verified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    content: Vec<u8>,
}

impl Frame {
    /// Build a frame stamped with the current time.
    pub fn new(
        type_code: u16,
        content: Vec<u8>,
        correlation_id: CorrelationId,
    ) -> Result<Self, FrameError> {
        Self::with_timestamp(type_code, content, correlation_id, now_millis())
    }

    /// Build a frame with an explicit send timestamp.
    pub fn with_timestamp(
        type_code: u16,
        content: Vec<u8>,
        correlation_id: CorrelationId,
        timestamp_ms: u64,
    ) -> Result<Self, FrameError> {
        let header = FrameHeader {
            type_code,
            content_length: content_length(content.len())?,
            digest: digest(&content),
            timestamp_ms,
            correlation_id,
        };
        Ok(Self { header, content })
    }

    /// Pair a parsed header with its content, checking length and digest.
    pub fn from_parts(header: FrameHeader, content: Vec<u8>) -> Result<Self, FrameError> {
        if content.len() != header.content_len() {
            return Err(FrameError::LengthMismatch {
                expected: header.content_len(),
                actual: content.len(),
            });
        }
        if digest(&content) != header.digest {
            return Err(FrameError::IntegrityMismatch {
                correlation_id: header.correlation_id,
            });
        }
        Ok(Self { header, content })
    }

    /// Decode one whole frame. `bytes` must hold exactly header + content.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let header = FrameHeader::parse(bytes)?;
        Self::from_parts(header, bytes[HEADER_LEN..].to_vec())
    }

    /// Serialize header followed by content.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.content.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.content);
        out
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn type_code(&self) -> u16 {
        self.header.type_code
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.header.correlation_id
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.header.timestamp_ms
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.header.digest
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_parts(self) -> (FrameHeader, Vec<u8>) {
        (self.header, self.content)
    }
}

/// Encode `content` as a frame of `type_code`, stamped now.
pub fn encode(
    type_code: u16,
    content: &[u8],
    correlation_id: CorrelationId,
) -> Result<Vec<u8>, FrameError> {
    Ok(Frame::new(type_code, content.to_vec(), correlation_id)?.encode())
}

/// Decode and verify one whole frame.
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    Frame::decode(bytes)
}
