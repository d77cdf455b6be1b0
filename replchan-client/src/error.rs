//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] replchan_protocol::ProtocolError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("channel {0} closed")]
    ChannelClosed(u32),

    #[error("request timeout")]
    Timeout,

    #[error("command on channel {channel} failed: {message}")]
    RemoteCommand { channel: u32, message: String },

    #[error("terminal frame on channel {0} carried neither ok nor error")]
    MissingResult(u32),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
}

impl ClientError {
    /// Returns whether the underlying transport is unusable after this error.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::WebSocket(_)
                | ClientError::NotConnected
                | ClientError::ConnectionClosed
        )
    }

    /// Returns whether retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::RemoteCommand { .. } => true,
            ClientError::Timeout => true,
            ClientError::Io(_) | ClientError::WebSocket(_) => true,
            ClientError::ConnectionClosed => true,
            _ => false,
        }
    }
}
