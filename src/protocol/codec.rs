//! Opaque codec boundary between the frame protocol and its payload
//! serialization.

use crate::protocol::{FramePayload, SEPARATOR};

/// Error type for payload encoding and decoding.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// Encoding the payload failed.
    #[error("failed to encode frame payload: {0}")]
    Encode(#[source] serde_json::Error),
    /// Decoding the payload failed.
    #[error("failed to decode frame payload: {0}")]
    Decode(#[source] serde_json::Error),
    /// There were no payload bytes to decode.
    #[error("frame payload is empty")]
    Empty,
}

/// Encode/decode pair for frame payloads.
///
/// `decode` must tolerate trailing bytes after the logical end of its own
/// payload: something may write to the same stream after the child's
/// helper has already emitted the frame, and the parser does not trim.
pub trait Codec {
    /// Encode a payload to bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` on serialization failure.
    fn encode(&self, payload: &FramePayload) -> Result<Vec<u8>, CodecError>;

    /// Decode a payload from bytes, ignoring trailing noise.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if no complete payload can be decoded.
    fn decode(&self, bytes: &[u8]) -> Result<FramePayload, CodecError>;
}

/// Default JSON codec.
///
/// Decoding uses a streaming deserializer that stops at the first complete
/// value, which is what makes trailing noise after the payload inert.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, payload: &FramePayload) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(payload).map_err(CodecError::Encode)
    }

    fn decode(&self, bytes: &[u8]) -> Result<FramePayload, CodecError> {
        let mut stream = serde_json::Deserializer::from_slice(bytes).into_iter::<FramePayload>();
        match stream.next() {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(err)) => Err(CodecError::Decode(err)),
            None => Err(CodecError::Empty),
        }
    }
}

/// Build a full result frame: separator followed by the encoded payload.
///
/// This is what a cooperating child writes to its error stream right
/// before exiting.
///
/// # Errors
///
/// Returns `CodecError` if payload encoding fails.
pub fn encode_frame<C: Codec>(payload: &FramePayload, codec: &C) -> Result<Vec<u8>, CodecError> {
    let mut frame = SEPARATOR.to_vec();
    frame.extend(codec.encode(payload)?);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ReturnValue, Telemetry};
    use serde_json::json;

    fn value_payload() -> FramePayload {
        FramePayload {
            return_value: ReturnValue::Value {
                value: json!({"answer": 42}),
            },
            exit_value: None,
            telemetry: Telemetry::new(),
        }
    }

    #[test]
    fn decode_tolerates_trailing_noise() {
        let codec = JsonCodec;
        let mut bytes = codec.encode(&value_payload()).unwrap();
        bytes.extend_from_slice(b"\nwarning: stray diagnostic after the frame");

        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, value_payload());
    }

    #[test]
    fn decode_empty_input_is_an_error() {
        assert!(matches!(JsonCodec.decode(b""), Err(CodecError::Empty)));
        assert!(matches!(JsonCodec.decode(b"   "), Err(CodecError::Empty)));
    }

    #[test]
    fn decode_garbage_is_an_error() {
        assert!(matches!(
            JsonCodec.decode(b"not json at all"),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn frame_starts_with_separator() {
        let frame = encode_frame(&value_payload(), &JsonCodec).unwrap();
        assert!(frame.starts_with(SEPARATOR));
    }
}
