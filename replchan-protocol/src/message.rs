//! Payload messages carried inside frames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declares a protocol enum with its wire values.
///
/// Serialized by name in documents (`TRY_CLOSE`), by number on the wire.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value, )+
        }

        impl $name {
            /// Maps a wire value back to the enum, if it is a declared one.
            pub fn from_wire(value: i32) -> Option<Self> {
                match value {
                    $( $value => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> i32 {
                value as i32
            }
        }
    };
}

wire_enum! {
    /// Progress of a command on a channel.
    pub enum State {
        #[default]
        Stopped = 0,
        /// More frames for the same request are coming.
        Running = 1,
    }
}

wire_enum! {
    /// How the remote side should satisfy an open request.
    pub enum OpenAction {
        #[default]
        Create = 0,
        Attach = 1,
        AttachOrCreate = 2,
    }
}

wire_enum! {
    /// Whether an open request created a channel or attached to one.
    pub enum OpenState {
        #[default]
        Created = 0,
        Attached = 1,
    }
}

wire_enum! {
    /// How the remote side should tear a channel down.
    pub enum CloseAction {
        #[default]
        Disconnect = 0,
        TryClose = 1,
        Close = 2,
    }
}

wire_enum! {
    /// Outcome of a close request.
    pub enum CloseStatus {
        #[default]
        Disconnect = 0,
        Close = 1,
        NotFound = 2,
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Generic command: run a process with arguments on the remote host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Exec {
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub blocking: bool,
}

impl Exec {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Splits a command line on whitespace.
    pub fn from_command_line(line: &str) -> Self {
        Self::new(line.split_whitespace())
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }
}

/// Request to open a channel, sent on the control channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenChannel {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub action: OpenAction,
}

impl OpenChannel {
    pub fn create(service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            action: OpenAction::Create,
        }
    }
}

/// Response to [`OpenChannel`]; `id` is the channel assigned by the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenChannelRes {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub state: OpenState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request to close a channel, sent on the control channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseChannel {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub action: CloseAction,
}

impl CloseChannel {
    pub fn try_close(id: u32) -> Self {
        Self {
            id,
            action: CloseAction::TryClose,
        }
    }
}

/// Response to [`CloseChannel`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseChannelRes {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub status: CloseStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(i32::from(OpenAction::Create), 0);
        assert_eq!(i32::from(CloseAction::TryClose), 1);
        assert_eq!(i32::from(State::Running), 1);
        assert_eq!(CloseStatus::from_wire(2), Some(CloseStatus::NotFound));
        assert_eq!(OpenAction::from_wire(7), None);
    }

    #[test]
    fn test_enum_names() {
        let json = serde_json::to_string(&CloseAction::TryClose).unwrap();
        assert_eq!(json, "\"TRY_CLOSE\"");

        let parsed: OpenAction = serde_json::from_str("\"ATTACH_OR_CREATE\"").unwrap();
        assert_eq!(parsed, OpenAction::AttachOrCreate);

        assert!(serde_json::from_str::<State>("\"PAUSED\"").is_err());
    }

    #[test]
    fn test_exec_from_command_line() {
        let exec = Exec::from_command_line("  ls   -la /tmp ");
        assert_eq!(exec.args, vec!["ls", "-la", "/tmp"]);
        assert!(exec.env.is_empty());
        assert!(!exec.blocking);
    }

    #[test]
    fn test_exec_serialization_omits_defaults() {
        let json = serde_json::to_value(Exec::new(["echo", "hi"])).unwrap();
        assert_eq!(json, serde_json::json!({"args": ["echo", "hi"]}));

        let exec = Exec::new(["env"]).with_env("TERM", "dumb").blocking();
        let json = serde_json::to_value(&exec).unwrap();
        assert_eq!(json["env"]["TERM"], "dumb");
        assert_eq!(json["blocking"], true);
    }

    #[test]
    fn test_exec_rejects_unknown_fields() {
        let result = serde_json::from_value::<Exec>(serde_json::json!({"argv": ["ls"]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_open_and_close_constructors() {
        let open = OpenChannel::create("exec", "execer");
        assert_eq!(open.action, OpenAction::Create);
        assert_eq!(open.service, "exec");

        let close = CloseChannel::try_close(3);
        assert_eq!(close.id, 3);
        assert_eq!(close.action, CloseAction::TryClose);
    }
}
