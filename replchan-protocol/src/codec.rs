//! Encoder and decoder for frames.
//!
//! WebSocket messages are already delimited, so one message holds exactly one
//! encoded frame and neither side needs to buffer partial input.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::wire;
use crate::MAX_FRAME_SIZE;
use bytes::Bytes;
use prost::Message;
use serde_json::Value;

/// Encodes frames into their binary form.
pub struct Encoder;

impl Encoder {
    /// Encodes a frame.
    pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
        let command = wire::Command::from(frame);
        let size = command.encoded_len();
        if size > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Bytes::from(command.encode_to_vec()))
    }

    /// Encodes a JSON document such as `{"channel": 3, "exec": {"args": ["ls"]}}`.
    pub fn encode_document(document: &Value) -> Result<Bytes, ProtocolError> {
        let frame = Frame::from_document(document)?;
        Self::encode(&frame)
    }
}

/// Decodes binary frames.
pub struct Decoder;

impl Decoder {
    /// Decodes one frame.
    pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let command = wire::Command::decode(bytes)?;
        Frame::try_from(command)
    }

    /// Decodes one frame into its JSON document form.
    pub fn decode_document(bytes: &[u8]) -> Result<Value, ProtocolError> {
        Self::decode(bytes)?.to_document()
    }
}
