//! Structured binary frame codec.

use super::{CodecError, Frame, FrameCodec};

/// Compact binary codec; the default for transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryFrameCodec {
    _private: (),
}

impl BinaryFrameCodec {
    /// Creates the codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameCodec for BinaryFrameCodec {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(frame).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Frame, CodecError> {
        postcard::from_bytes(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
