//! High-level client API.

use crate::channel::Channel;
use crate::connection::{drain, with_deadline, Connection, ConnectionConfig, Inbox};
use crate::error::ClientError;
use crate::refs::{RandomRefs, RefGenerator};
use replchan_protocol::{CloseChannel, Frame, OpenChannel, Payload, CONTROL_CHANNEL};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Session client: owns the connection, the control handshakes and the
/// registry of open channels.
pub struct Client {
    conn: Arc<Connection>,
    refs: Arc<dyn RefGenerator>,
    /// Control channel queue; held for the duration of a handshake.
    control: Mutex<Option<Inbox>>,
    /// Open channel ids in opening order.
    channels: parking_lot::Mutex<Vec<u32>>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
            refs: Arc::new(RandomRefs),
            control: Mutex::new(None),
            channels: parking_lot::Mutex::new(Vec::new()),
            reader: parking_lot::Mutex::new(None),
        }
    }

    /// Replaces the generator used for control request refs.
    pub fn with_ref_generator(mut self, refs: Arc<dyn RefGenerator>) -> Self {
        self.refs = refs;
        self
    }

    /// Connects and starts the background read loop.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await?;
        *self.control.lock().await = Some(self.conn.claim_inbox(CONTROL_CHANNEL));

        let conn = self.conn.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = conn.read_loop().await {
                tracing::debug!("Read loop exited: {}", e);
            }
        });
        if let Some(previous) = self.reader.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Ids of the channels opened and not yet closed, in opening order.
    pub fn open_channels(&self) -> Vec<u32> {
        self.channels.lock().clone()
    }

    /// Opens a channel to `service`, labelled `name`.
    ///
    /// Control frames other than a grant with a nonzero id are discarded while
    /// waiting. A control frame that fails to decode fails the open.
    pub async fn open(&self, service: &str, name: &str) -> Result<Channel, ClientError> {
        let reference = self.refs.next_ref();
        let request = Frame::control(OpenChannel::create(service, name)).with_ref(reference.clone());

        let id = {
            let mut control = self.control.lock().await;
            let inbox = control.as_mut().ok_or(ClientError::NotConnected)?;

            tracing::debug!(
                "Opening channel service={} name={} ref={}",
                service,
                name,
                reference
            );
            Self::drop_stale_control(inbox);
            let _pending = self.conn.expect_grant(&reference);
            self.conn.send_frame(&request).await?;

            self.await_control(inbox, &reference, |frame| {
                if let Some(Payload::OpenChanRes(res)) = &frame.payload {
                    if let Some(ref error) = res.error {
                        tracing::warn!("Open request ref={} refused: {}", reference, error);
                    }
                }
                frame.open_channel_id()
            })
            .await?
        };

        let inbox = self.conn.claim_inbox(id);
        self.channels.lock().push(id);
        tracing::debug!("Channel {} open (service={} name={})", id, service, name);

        Ok(Channel::new(id, service, name, self.conn.clone(), inbox))
    }

    /// Closes one channel.
    ///
    /// Fails with [`ClientError::ChannelClosed`] if the id is not open on this
    /// client.
    pub async fn close_channel(&self, id: u32) -> Result<(), ClientError> {
        if !self.channels.lock().contains(&id) {
            return Err(ClientError::ChannelClosed(id));
        }
        self.close_handshake(id).await?;
        self.channels.lock().retain(|&open| open != id);
        Ok(())
    }

    /// Closes every open channel in opening order, then the connection.
    ///
    /// The connection is closed even if a channel handshake fails; the first
    /// error is returned. Closing again is a no-op on the channels and
    /// returns the connection's close result.
    pub async fn close(&self) -> Result<(), ClientError> {
        let ids = std::mem::take(&mut *self.channels.lock());
        tracing::debug!("Closing {} channel(s)...", ids.len());

        let mut result = Ok(());
        for id in ids {
            if let Err(e) = self.close_handshake(id).await {
                tracing::warn!("Failed to close channel {}: {}", id, e);
                result = Err(e);
                break;
            }
        }

        let closed = self.conn.close().await;
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        *self.control.lock().await = None;

        result.and(closed)
    }

    async fn close_handshake(&self, id: u32) -> Result<(), ClientError> {
        let reference = self.refs.next_ref();
        let request = Frame::control(CloseChannel::try_close(id)).with_ref(reference.clone());

        let mut control = self.control.lock().await;
        let inbox = control.as_mut().ok_or(ClientError::NotConnected)?;

        tracing::debug!("Closing channel {} ref={}", id, reference);
        Self::drop_stale_control(inbox);
        self.conn.send_frame(&request).await?;
        self.await_control(inbox, &reference, |frame| {
            frame.close_channel_id().filter(|&closed| closed == id)
        })
        .await?;

        self.conn.release(id);
        tracing::debug!("Channel {} closed", id);
        Ok(())
    }

    /// Discards control items queued while no handshake was waiting. None of
    /// them can answer a request that has not been sent yet.
    fn drop_stale_control(inbox: &mut Inbox) {
        let stale = drain(inbox);
        if stale > 0 {
            tracing::debug!("Discarded {} stale control item(s)", stale);
        }
    }

    /// Reads control frames until `matches` accepts one.
    ///
    /// Frames carrying a different ref belong to another request and are
    /// skipped. A control frame that failed to decode fails the wait.
    async fn await_control<T>(
        &self,
        inbox: &mut Inbox,
        reference: &str,
        matches: impl Fn(&Frame) -> Option<T>,
    ) -> Result<T, ClientError> {
        with_deadline(self.conn.config().request_timeout, async {
            loop {
                let frame = inbox.recv().await.ok_or(ClientError::ConnectionClosed)??;
                if frame
                    .reference
                    .as_deref()
                    .is_some_and(|other| other != reference)
                {
                    tracing::debug!("Skipping control frame for another request");
                    continue;
                }
                match matches(&frame) {
                    Some(value) => return Ok::<T, ClientError>(value),
                    None => tracing::debug!(
                        "Discarding control frame while waiting for ref={}",
                        reference
                    ),
                }
            }
        })
        .await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.abort();
        }
    }
}
