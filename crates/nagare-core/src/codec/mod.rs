//! # Frame Wire Shape & Codecs
//!
//! The framing contract transports speak: every frame carries a
//! monotonically-increasing sequence, a millisecond timestamp, and one of
//! four payload variants. Control frames form the bidirectional protocol
//! WebSocket-hosted subscribers use for credit granting, pause/resume,
//! subscribe/unsubscribe, and completion.
//!
//! Serialization is pluggable behind [`FrameCodec`]: the structured
//! binary codec is the default, with JSON as the interoperability
//! fallback.

mod binary;
mod json;

pub use binary::BinaryFrameCodec;
pub use json::JsonFrameCodec;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A transport frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonically-increasing per-connection sequence number.
    pub sequence: u64,
    /// Milliseconds since the Unix epoch at frame creation.
    pub timestamp_ms: u64,
    /// The payload.
    pub payload: Payload,
}

/// Frame payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Opaque bytes.
    Data(Vec<u8>),
    /// Dense `f32` samples.
    Float32(Vec<f32>),
    /// Protocol control message.
    Control(ControlMessage),
    /// Stream-level error.
    Error(ErrorFrame),
}

/// Bidirectional control protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Grants `n` emission credits to the sender's peer.
    Credit(u32),
    /// Acknowledges receipt up to a sequence number.
    Ack(u64),
    /// Requests the peer stop emitting.
    Pause,
    /// Requests the peer resume emitting.
    Resume,
    /// The stream completed normally.
    Complete,
    /// Subscribes to a named stream.
    Subscribe {
        /// Stream to subscribe to.
        stream_id: String,
    },
    /// Unsubscribes from a named stream.
    Unsubscribe {
        /// Stream to unsubscribe from.
        stream_id: String,
    },
}

/// A stream-level error carried in a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Machine-readable error code.
    pub code: u32,
    /// Human-readable message.
    pub message: String,
    /// Whether the subscriber may retry.
    pub recoverable: bool,
}

/// Framing/serialization mismatch at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The frame could not be serialized.
    #[error("frame encode failed: {0}")]
    Encode(String),
    /// The bytes did not decode to a frame.
    #[error("frame decode failed: {0}")]
    Decode(String),
}

/// A pluggable frame serializer/deserializer.
pub trait FrameCodec: Send + Sync {
    /// Serializes a frame to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] when the frame cannot be
    /// serialized.
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, CodecError>;

    /// Deserializes a frame from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] when the bytes are not a valid
    /// frame.
    fn decode(&self, bytes: &[u8]) -> Result<Frame, CodecError>;
}

/// Stamps outbound payloads with sequence numbers and timestamps.
#[derive(Debug, Default)]
pub struct FrameSequencer {
    next: AtomicU64,
}

impl FrameSequencer {
    /// Creates a sequencer starting at sequence 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a payload in the next frame, stamped with the wall clock.
    #[must_use]
    pub fn stamp(&self, payload: Payload) -> Frame {
        self.stamp_at(payload, unix_millis())
    }

    /// Wraps a payload in the next frame with an explicit timestamp.
    #[must_use]
    pub fn stamp_at(&self, payload: Payload, timestamp_ms: u64) -> Frame {
        Frame {
            sequence: self.next.fetch_add(1, Ordering::Relaxed),
            timestamp_ms,
            payload,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencer_is_monotonic() {
        let sequencer = FrameSequencer::new();
        let a = sequencer.stamp(Payload::Control(ControlMessage::Pause));
        let b = sequencer.stamp(Payload::Control(ControlMessage::Resume));
        let c = sequencer.stamp_at(Payload::Data(vec![1]), 42);

        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
        assert_eq!(c.sequence, 2);
        assert_eq!(c.timestamp_ms, 42);
    }

    #[test]
    fn test_codecs_roundtrip_equivalently() {
        let frames = vec![
            Frame {
                sequence: 1,
                timestamp_ms: 1000,
                payload: Payload::Data(vec![0, 1, 2, 255]),
            },
            Frame {
                sequence: 2,
                timestamp_ms: 1001,
                payload: Payload::Float32(vec![1.5, -2.25]),
            },
            Frame {
                sequence: 3,
                timestamp_ms: 1002,
                payload: Payload::Control(ControlMessage::Subscribe {
                    stream_id: "ticks".to_owned(),
                }),
            },
            Frame {
                sequence: 4,
                timestamp_ms: 1003,
                payload: Payload::Error(ErrorFrame {
                    code: 7,
                    message: "overload".to_owned(),
                    recoverable: true,
                }),
            },
        ];

        let binary = BinaryFrameCodec::new();
        let json = JsonFrameCodec::new();
        for frame in &frames {
            let decoded = binary.decode(&binary.encode(frame).unwrap()).unwrap();
            assert_eq!(&decoded, frame);
            let decoded = json.decode(&json.encode(frame).unwrap()).unwrap();
            assert_eq!(&decoded, frame);
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let garbage = [0xde, 0xad, 0xbe, 0xef];
        assert!(BinaryFrameCodec::new().decode(&garbage).is_err());
        assert!(JsonFrameCodec::new().decode(&garbage).is_err());
    }
}
