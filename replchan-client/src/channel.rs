//! Channel handles.

use crate::connection::{with_deadline, Connection, Delivery, Inbox};
use crate::error::ClientError;
use replchan_protocol::{Frame, Payload};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// An open channel bound to a remote service.
///
/// Frames addressed to the channel are queued by the connection's read loop
/// and consumed by [`Channel::dispatch`]. Requests on one channel are
/// serialized; different channels run independently.
pub struct Channel {
    id: u32,
    service: String,
    name: String,
    conn: Arc<Connection>,
    inbox: Mutex<Inbox>,
}

impl Channel {
    pub(crate) fn new(
        id: u32,
        service: impl Into<String>,
        name: impl Into<String>,
        conn: Arc<Connection>,
        inbox: Inbox,
    ) -> Self {
        Self {
            id,
            service: service.into(),
            name: name.into(),
            conn,
            inbox: Mutex::new(inbox),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends a payload without waiting for a response.
    pub async fn send(&self, payload: impl Into<Payload>) -> Result<(), ClientError> {
        self.conn.send_frame(&Frame::new(self.id, payload)).await
    }

    /// Sends a payload and collects every frame up to and including the
    /// terminal one.
    ///
    /// Output already queued on the channel, such as a banner sent right after
    /// the open, is part of the result. Queued frames that end with an earlier
    /// terminal frame belong to an abandoned request and are discarded.
    ///
    /// Fails with [`ClientError::RemoteCommand`] if the terminal frame reports
    /// an error, with [`ClientError::MissingResult`] if it reports neither
    /// success nor an error, and with [`ClientError::Protocol`] if a frame for
    /// the channel could not be decoded.
    pub async fn dispatch(&self, payload: impl Into<Payload>) -> Result<Vec<Frame>, ClientError> {
        let request = Frame::new(self.id, payload);

        let mut inbox = self.inbox.lock().await;
        let queued = std::iter::from_fn(|| inbox.try_recv().ok()).collect();
        let (stale, early) = split_stale(queued);
        if stale > 0 {
            tracing::debug!("Channel {}: discarded {} stale item(s)", self.id, stale);
        }

        self.conn.send_frame(&request).await?;
        tracing::debug!("Channel {}: request sent, awaiting result...", self.id);

        let frames = with_deadline(
            self.conn.config().request_timeout,
            self.collect(&mut inbox, early),
        )
        .await?;
        finish(self.id, frames)
    }

    /// Dispatches and returns the concatenated output text.
    pub async fn get_output(&self, payload: impl Into<Payload>) -> Result<String, ClientError> {
        let frames = self.dispatch(payload).await?;
        Ok(concat_output(&frames))
    }

    /// Dispatches and returns each response frame as a JSON document.
    pub async fn get_structured(
        &self,
        payload: impl Into<Payload>,
    ) -> Result<Vec<Value>, ClientError> {
        let frames = self.dispatch(payload).await?;
        frames
            .iter()
            .map(|frame| frame.to_document().map_err(ClientError::from))
            .collect()
    }

    async fn collect(
        &self,
        inbox: &mut Inbox,
        mut frames: Vec<Frame>,
    ) -> Result<Vec<Frame>, ClientError> {
        loop {
            let Some(delivery) = inbox.recv().await else {
                return Err(self.closed_error());
            };
            let frame = delivery?;
            let terminal = frame.is_terminal();
            frames.push(frame);
            if terminal {
                return Ok(frames);
            }
        }
    }

    fn closed_error(&self) -> ClientError {
        if self.conn.is_connected() {
            ClientError::ChannelClosed(self.id)
        } else {
            ClientError::ConnectionClosed
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("name", &self.name)
            .finish()
    }
}

/// Splits what was queued before a request into the stale prefix, which ends
/// with the last terminal frame or error, and the frames after it.
fn split_stale(mut queued: Vec<Delivery>) -> (usize, Vec<Frame>) {
    let cut = queued
        .iter()
        .rposition(|item| item.as_ref().map_or(true, Frame::is_terminal))
        .map_or(0, |last| last + 1);
    let early = queued.split_off(cut);
    (cut, early.into_iter().filter_map(Result::ok).collect())
}

/// Checks the terminal frame of a response.
fn finish(channel: u32, frames: Vec<Frame>) -> Result<Vec<Frame>, ClientError> {
    let Some(terminal) = frames.last() else {
        return Err(ClientError::MissingResult(channel));
    };
    if terminal.is_ok() {
        return Ok(frames);
    }
    match terminal.error_message() {
        Some(message) => Err(ClientError::RemoteCommand {
            channel,
            message: message.to_string(),
        }),
        None => Err(ClientError::MissingResult(channel)),
    }
}

/// Concatenates the output text of `frames` in arrival order.
pub fn concat_output(frames: &[Frame]) -> String {
    frames.iter().map(Frame::output_text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use replchan_protocol::{ProtocolError, State};

    #[test]
    fn test_concat_output() {
        let frames = vec![
            Frame::on_channel(7).with_output("he"),
            Frame::on_channel(7),
            Frame::on_channel(7).with_output("llo").with_ok(),
        ];
        assert_eq!(concat_output(&frames), "hello");
        assert_eq!(concat_output(&[]), "");
    }

    #[test]
    fn test_finish_ok() {
        let frames = vec![
            Frame::on_channel(2).with_output("a").with_state(State::Running),
            Frame::on_channel(2).with_ok(),
        ];
        assert_eq!(finish(2, frames).unwrap().len(), 2);
    }

    #[test]
    fn test_finish_error() {
        let frames = vec![Frame::on_channel(2).with_error("no such file")];
        match finish(2, frames) {
            Err(ClientError::RemoteCommand { channel, message }) => {
                assert_eq!(channel, 2);
                assert_eq!(message, "no such file");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_finish_missing_result() {
        let frames = vec![Frame::on_channel(2).with_state(State::Stopped)];
        assert!(matches!(
            finish(2, frames),
            Err(ClientError::MissingResult(2))
        ));
        assert!(matches!(finish(2, Vec::new()), Err(ClientError::MissingResult(2))));
    }

    #[test]
    fn test_finish_empty_error_is_missing_result() {
        let mut frame = Frame::on_channel(2).with_state(State::Stopped);
        frame.error = Some(String::new());
        assert!(matches!(
            finish(2, vec![frame]),
            Err(ClientError::MissingResult(2))
        ));
    }

    fn running(output: &str) -> Delivery {
        Ok(Frame::on_channel(1)
            .with_output(output)
            .with_state(State::Running))
    }

    #[test]
    fn test_split_stale_keeps_early_output() {
        let (stale, early) = split_stale(vec![running("banner "), running("ready\n")]);
        assert_eq!(stale, 0);
        assert_eq!(concat_output(&early), "banner ready\n");

        assert_eq!(split_stale(Vec::new()), (0, Vec::new()));
    }

    #[test]
    fn test_split_stale_drops_abandoned_response() {
        let queued = vec![
            running("old"),
            Ok(Frame::on_channel(1).with_output("done").with_ok()),
            running("new"),
        ];
        let (stale, early) = split_stale(queued);
        assert_eq!(stale, 2);
        assert_eq!(concat_output(&early), "new");
    }

    #[test]
    fn test_split_stale_drops_queued_errors() {
        let queued = vec![
            running("old"),
            Err(ProtocolError::MissingPayload),
            running("after"),
        ];
        let (stale, early) = split_stale(queued);
        assert_eq!(stale, 2);
        assert_eq!(concat_output(&early), "after");

        let (stale, early) = split_stale(vec![Err(ProtocolError::MissingPayload)]);
        assert_eq!(stale, 1);
        assert!(early.is_empty());
    }
}
