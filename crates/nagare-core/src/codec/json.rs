//! JSON frame codec.

use super::{CodecError, Frame, FrameCodec};

/// Human-readable fallback codec for transports without binary support.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFrameCodec {
    _private: (),
}

impl JsonFrameCodec {
    /// Creates the codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameCodec for JsonFrameCodec {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(frame).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Frame, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ControlMessage, Payload};
    use super::*;

    #[test]
    fn test_json_is_self_describing() {
        let frame = Frame {
            sequence: 9,
            timestamp_ms: 100,
            payload: Payload::Control(ControlMessage::Credit(4)),
        };
        let encoded = JsonFrameCodec::new().encode(&frame).unwrap();
        let text = String::from_utf8(encoded).unwrap();
        assert!(text.contains("\"sequence\":9"));
        assert!(text.contains("Credit"));
    }
}
