//! JSON document form of a frame.
//!
//! Documents use the protocol's field names (`openChan`, `closeChanRes`, ...)
//! and enum names (`TRY_CLOSE`). At most one payload key may be present.

use crate::error::ProtocolError;
use crate::frame::{Frame, Payload};
use crate::message::{CloseChannel, CloseChannelRes, Exec, OpenChannel, OpenChannelRes, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level keys a frame document may contain.
pub const FIELDS: &[&str] = &[
    "channel",
    "session",
    "ref",
    "exec",
    "input",
    "openChan",
    "openChanRes",
    "closeChan",
    "closeChanRes",
    "output",
    "state",
    "ok",
    "error",
];

/// Flat document layout of a [`Frame`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FrameDocument {
    #[serde(default)]
    pub channel: u32,
    #[serde(default)]
    pub session: i32,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<Exec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_chan: Option<OpenChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_chan_res: Option<OpenChannelRes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_chan: Option<CloseChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_chan_res: Option<CloseChannelRes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rejects top-level keys that are not part of the frame layout.
pub(crate) fn check_fields(document: &Value) -> Result<(), ProtocolError> {
    if let Value::Object(map) = document {
        if let Some(key) = map.keys().find(|k| !FIELDS.contains(&k.as_str())) {
            return Err(ProtocolError::UnknownField(key.clone()));
        }
    }
    Ok(())
}

impl TryFrom<FrameDocument> for Frame {
    type Error = ProtocolError;

    fn try_from(doc: FrameDocument) -> Result<Self, Self::Error> {
        let candidates = [
            doc.exec.map(Payload::Exec),
            doc.input.map(Payload::Input),
            doc.open_chan.map(Payload::OpenChan),
            doc.open_chan_res.map(Payload::OpenChanRes),
            doc.close_chan.map(Payload::CloseChan),
            doc.close_chan_res.map(Payload::CloseChanRes),
        ];

        let mut payload: Option<Payload> = None;
        for candidate in candidates.into_iter().flatten() {
            if let Some(first) = &payload {
                return Err(ProtocolError::ConflictingPayload {
                    first: first.kind(),
                    second: candidate.kind(),
                });
            }
            payload = Some(candidate);
        }

        Ok(Frame {
            channel: doc.channel,
            session: doc.session,
            reference: doc.reference,
            payload,
            output: doc.output,
            state: doc.state,
            ok: doc.ok,
            error: doc.error,
        })
    }
}

impl From<Frame> for FrameDocument {
    fn from(frame: Frame) -> Self {
        let mut doc = FrameDocument {
            channel: frame.channel,
            session: frame.session,
            reference: frame.reference,
            output: frame.output,
            state: frame.state,
            ok: frame.ok,
            error: frame.error,
            ..FrameDocument::default()
        };

        match frame.payload {
            Some(Payload::Exec(exec)) => doc.exec = Some(exec),
            Some(Payload::Input(input)) => doc.input = Some(input),
            Some(Payload::OpenChan(open)) => doc.open_chan = Some(open),
            Some(Payload::OpenChanRes(res)) => doc.open_chan_res = Some(res),
            Some(Payload::CloseChan(close)) => doc.close_chan = Some(close),
            Some(Payload::CloseChanRes(res)) => doc.close_chan_res = Some(res),
            None => {}
        }

        doc
    }
}
