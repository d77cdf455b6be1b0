//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding frames.
///
/// Cloneable so one decoding failure can be handed to several waiters.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("conflicting payloads: {first} and {second}")]
    ConflictingPayload {
        first: &'static str,
        second: &'static str,
    },

    #[error("document carries no payload")]
    MissingPayload,

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("malformed frame: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The frame parsed but a sub-message enum is undeclared.
    #[error("invalid {field} value {value} on channel {channel}")]
    InvalidEnum {
        channel: u32,
        field: &'static str,
        value: i32,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::InvalidDocument(err.to_string())
    }
}

impl ProtocolError {
    /// Returns whether the error was raised while building a frame.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownField(_)
                | ProtocolError::ConflictingPayload { .. }
                | ProtocolError::MissingPayload
                | ProtocolError::InvalidDocument(_)
        )
    }

    /// Channel of the offending frame, when the frame got far enough to tell.
    pub fn channel(&self) -> Option<u32> {
        match self {
            ProtocolError::InvalidEnum { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// Returns whether the error was raised while parsing received bytes.
    pub fn is_decoding(&self) -> bool {
        matches!(
            self,
            ProtocolError::Decode(_) | ProtocolError::InvalidEnum { .. }
        )
    }
}
