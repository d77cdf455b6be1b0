//! # replchan-protocol
//!
//! Wire protocol for channels multiplexed over a single WebSocket.
//!
//! This crate provides:
//! - The [`Frame`] model with its closed set of payload variants
//! - Protocol Buffers encoding of frames
//! - Mapping between frames and JSON documents
//! - Protocol error types

pub mod codec;
pub mod document;
pub mod error;
pub mod frame;
pub mod message;
mod wire;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::{Frame, Payload};
pub use message::{
    CloseAction, CloseChannel, CloseChannelRes, CloseStatus, Exec, OpenAction, OpenChannel,
    OpenChannelRes, OpenState, State,
};

/// Channel reserved for open/close control traffic.
pub const CONTROL_CHANNEL: u32 = 0;

/// Session id used by single-session clients.
pub const DEFAULT_SESSION: i32 = 0;

/// Maximum encoded frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
