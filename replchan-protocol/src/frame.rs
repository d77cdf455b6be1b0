//! Frame model.
//!
//! A frame is addressed to one channel and carries at most one payload plus
//! the streaming fields used by command responses:
//!
//! ```text
//! channel | session | ref? | payload? | output? | state? | ok? | error?
//! ```
//!
//! A response to a command is a run of frames on the request's channel. Every
//! frame but the last has no `state` or `state = RUNNING`; the last one (the
//! terminal frame) carries any other state together with `ok` or `error`.

use crate::document::FrameDocument;
use crate::error::ProtocolError;
use crate::message::{CloseChannel, CloseChannelRes, Exec, OpenChannel, OpenChannelRes, State};
use crate::{CONTROL_CHANNEL, DEFAULT_SESSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of payloads a frame can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Exec(Exec),
    Input(String),
    OpenChan(OpenChannel),
    OpenChanRes(OpenChannelRes),
    CloseChan(CloseChannel),
    CloseChanRes(CloseChannelRes),
}

impl Payload {
    /// Document key for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Exec(_) => "exec",
            Payload::Input(_) => "input",
            Payload::OpenChan(_) => "openChan",
            Payload::OpenChanRes(_) => "openChanRes",
            Payload::CloseChan(_) => "closeChan",
            Payload::CloseChanRes(_) => "closeChanRes",
        }
    }

    /// Parses a document holding one payload key, e.g. `{"exec": {"args": ["ls"]}}`.
    ///
    /// Addressing keys (`channel`, `session`, `ref`) are accepted and ignored.
    pub fn from_document(document: &Value) -> Result<Self, ProtocolError> {
        Frame::from_document(document)?
            .payload
            .ok_or(ProtocolError::MissingPayload)
    }
}

impl From<Exec> for Payload {
    fn from(exec: Exec) -> Self {
        Payload::Exec(exec)
    }
}

impl From<OpenChannel> for Payload {
    fn from(open: OpenChannel) -> Self {
        Payload::OpenChan(open)
    }
}

impl From<OpenChannelRes> for Payload {
    fn from(res: OpenChannelRes) -> Self {
        Payload::OpenChanRes(res)
    }
}

impl From<CloseChannel> for Payload {
    fn from(close: CloseChannel) -> Self {
        Payload::CloseChan(close)
    }
}

impl From<CloseChannelRes> for Payload {
    fn from(res: CloseChannelRes) -> Self {
        Payload::CloseChanRes(res)
    }
}

/// One protocol message exchanged over the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FrameDocument", into = "FrameDocument")]
pub struct Frame {
    /// Logical stream this frame belongs to; 0 is the control channel.
    pub channel: u32,
    /// Always 0 for single-session clients.
    pub session: i32,
    /// Correlation id for control requests.
    pub reference: Option<String>,
    pub payload: Option<Payload>,
    /// Incremental output text.
    pub output: Option<String>,
    pub state: Option<State>,
    pub ok: Option<bool>,
    pub error: Option<String>,
}

impl Frame {
    /// Creates a frame for `channel` carrying `payload`.
    pub fn new(channel: u32, payload: impl Into<Payload>) -> Self {
        Self {
            channel,
            session: DEFAULT_SESSION,
            payload: Some(payload.into()),
            ..Self::default()
        }
    }

    /// Creates a frame on the control channel.
    pub fn control(payload: impl Into<Payload>) -> Self {
        Self::new(CONTROL_CHANNEL, payload)
    }

    /// Creates a frame without payload, used for streamed responses.
    pub fn on_channel(channel: u32) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    pub fn with_ref(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    /// Marks the frame as a successful terminal frame.
    pub fn with_ok(mut self) -> Self {
        self.state = Some(State::Stopped);
        self.ok = Some(true);
        self
    }

    /// Marks the frame as a failed terminal frame.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.state = Some(State::Stopped);
        self.ok = Some(false);
        self.error = Some(error.into());
        self
    }

    /// Returns whether this frame ends a response run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, Some(state) if state != State::Running)
    }

    pub fn is_ok(&self) -> bool {
        self.ok == Some(true)
    }

    /// Returns the error carried by the frame, ignoring empty strings.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// Output text, empty when absent.
    pub fn output_text(&self) -> &str {
        self.output.as_deref().unwrap_or("")
    }

    /// Channel id granted by an open response, if this is one with a nonzero id.
    pub fn open_channel_id(&self) -> Option<u32> {
        match &self.payload {
            Some(Payload::OpenChanRes(res)) if res.id != 0 => Some(res.id),
            _ => None,
        }
    }

    /// Channel id confirmed by a close response.
    pub fn close_channel_id(&self) -> Option<u32> {
        match &self.payload {
            Some(Payload::CloseChanRes(res)) => Some(res.id),
            _ => None,
        }
    }

    /// Builds a frame from a JSON document.
    pub fn from_document(document: &Value) -> Result<Self, ProtocolError> {
        crate::document::check_fields(document)?;
        let document = FrameDocument::deserialize(document)?;
        Frame::try_from(document)
    }

    /// Converts the frame to a JSON document.
    pub fn to_document(&self) -> Result<Value, ProtocolError> {
        Ok(serde_json::to_value(FrameDocument::from(self.clone()))?)
    }
}
