//! Protocol Buffers layout of a frame.
//!
//! ```text
//! message Command {
//!   uint32 channel = 1;
//!   int32 session = 2;
//!   oneof body {
//!     OpenChannel openChan = 3;
//!     OpenChannelRes openChanRes = 4;
//!     CloseChannel closeChan = 5;
//!     CloseChannelRes closeChanRes = 6;
//!     string input = 16;
//!     Exec exec = 28;
//!   }
//!   optional string output = 17;
//!   optional string error = 18;
//!   optional bool ok = 20;
//!   optional State state = 22;
//!   optional string ref = 1000;
//! }
//! ```

use crate::error::ProtocolError;
use crate::frame::{Frame, Payload};
use crate::message as msg;
use std::collections::BTreeMap;

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct Command {
    #[prost(uint32, tag = "1")]
    pub channel: u32,
    #[prost(int32, tag = "2")]
    pub session: i32,
    #[prost(oneof = "Body", tags = "3, 4, 5, 6, 16, 28")]
    pub body: Option<Body>,
    #[prost(string, optional, tag = "17")]
    pub output: Option<String>,
    #[prost(string, optional, tag = "18")]
    pub error: Option<String>,
    #[prost(bool, optional, tag = "20")]
    pub ok: Option<bool>,
    #[prost(int32, optional, tag = "22")]
    pub state: Option<i32>,
    #[prost(string, optional, tag = "1000")]
    pub reference: Option<String>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub(crate) enum Body {
    #[prost(message, tag = "3")]
    OpenChan(OpenChannel),
    #[prost(message, tag = "4")]
    OpenChanRes(OpenChannelRes),
    #[prost(message, tag = "5")]
    CloseChan(CloseChannel),
    #[prost(message, tag = "6")]
    CloseChanRes(CloseChannelRes),
    #[prost(string, tag = "16")]
    Input(String),
    #[prost(message, tag = "28")]
    Exec(Exec),
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct Exec {
    #[prost(string, repeated, tag = "1")]
    pub args: Vec<String>,
    #[prost(btree_map = "string, string", tag = "2")]
    pub env: BTreeMap<String, String>,
    #[prost(bool, tag = "3")]
    pub blocking: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct OpenChannel {
    #[prost(string, tag = "1")]
    pub service: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(int32, tag = "3")]
    pub action: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct OpenChannelRes {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(int32, tag = "2")]
    pub state: i32,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct CloseChannel {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(int32, tag = "2")]
    pub action: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct CloseChannelRes {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(int32, tag = "2")]
    pub status: i32,
}

fn enum_value<E>(
    channel: u32,
    field: &'static str,
    value: i32,
    from_wire: fn(i32) -> Option<E>,
) -> Result<E, ProtocolError> {
    from_wire(value).ok_or(ProtocolError::InvalidEnum {
        channel,
        field,
        value,
    })
}

impl From<&Frame> for Command {
    fn from(frame: &Frame) -> Self {
        let body = frame.payload.as_ref().map(|payload| match payload {
            Payload::Exec(exec) => Body::Exec(Exec {
                args: exec.args.clone(),
                env: exec.env.clone(),
                blocking: exec.blocking,
            }),
            Payload::Input(input) => Body::Input(input.clone()),
            Payload::OpenChan(open) => Body::OpenChan(OpenChannel {
                service: open.service.clone(),
                name: open.name.clone(),
                action: open.action.into(),
            }),
            Payload::OpenChanRes(res) => Body::OpenChanRes(OpenChannelRes {
                id: res.id,
                state: res.state.into(),
                error: res.error.clone(),
            }),
            Payload::CloseChan(close) => Body::CloseChan(CloseChannel {
                id: close.id,
                action: close.action.into(),
            }),
            Payload::CloseChanRes(res) => Body::CloseChanRes(CloseChannelRes {
                id: res.id,
                status: res.status.into(),
            }),
        });

        Command {
            channel: frame.channel,
            session: frame.session,
            body,
            output: frame.output.clone(),
            error: frame.error.clone(),
            ok: frame.ok,
            state: frame.state.map(i32::from),
            reference: frame.reference.clone(),
        }
    }
}

impl TryFrom<Command> for Frame {
    type Error = ProtocolError;

    fn try_from(command: Command) -> Result<Self, Self::Error> {
        let channel = command.channel;
        let payload = match command.body {
            None => None,
            Some(Body::Exec(exec)) => Some(Payload::Exec(msg::Exec {
                args: exec.args,
                env: exec.env,
                blocking: exec.blocking,
            })),
            Some(Body::Input(input)) => Some(Payload::Input(input)),
            Some(Body::OpenChan(open)) => Some(Payload::OpenChan(msg::OpenChannel {
                service: open.service,
                name: open.name,
                action: enum_value(channel, "openChan.action", open.action, msg::OpenAction::from_wire)?,
            })),
            Some(Body::OpenChanRes(res)) => Some(Payload::OpenChanRes(msg::OpenChannelRes {
                id: res.id,
                state: enum_value(channel, "openChanRes.state", res.state, msg::OpenState::from_wire)?,
                error: res.error,
            })),
            Some(Body::CloseChan(close)) => Some(Payload::CloseChan(msg::CloseChannel {
                id: close.id,
                action: enum_value(
                    channel,
                    "closeChan.action",
                    close.action,
                    msg::CloseAction::from_wire,
                )?,
            })),
            Some(Body::CloseChanRes(res)) => Some(Payload::CloseChanRes(msg::CloseChannelRes {
                id: res.id,
                status: enum_value(
                    channel,
                    "closeChanRes.status",
                    res.status,
                    msg::CloseStatus::from_wire,
                )?,
            })),
        };

        Ok(Frame {
            channel: command.channel,
            session: command.session,
            reference: command.reference,
            payload,
            output: command.output,
            // Anything but RUNNING ends a response run.
            state: command
                .state
                .map(|s| msg::State::from_wire(s).unwrap_or(msg::State::Stopped)),
            ok: command.ok,
            error: command.error,
        })
    }
}
