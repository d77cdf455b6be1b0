//! # replchan-client
//!
//! Client library for replchan.
//!
//! This crate provides:
//! - A WebSocket connection with one reader demultiplexing frames per channel
//! - Session client for the channel open/close control protocol
//! - Channel handles with request/response and streamed output collection
//! - HTTP lookup of repl ids and session tokens
//! - Optional TLS configuration

pub mod channel;
pub mod client;
pub mod connection;
pub mod error;
pub mod refs;
pub mod resolver;
pub mod tls;

pub use channel::Channel;
pub use client::Client;
pub use connection::{ws_url, Connection, ConnectionConfig};
pub use error::ClientError;
pub use refs::{RandomRefs, RefGenerator, SequentialRefs};
pub use resolver::{Credentials, Resolver};
pub use tls::TlsClientConfig;
