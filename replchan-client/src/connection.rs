//! Connection management.
//!
//! A [`Connection`] owns the WebSocket. Writes go through [`Connection::send_frame`];
//! reads happen only in [`Connection::read_loop`], which routes each decoded
//! frame into the queue of the channel it is addressed to. Channels and the
//! control handshakes read from their own queue, so any number of them can be
//! driven concurrently over one socket.
//!
//! A frame that fails to decode is not dropped: its error is queued in its
//! place, on the frame's channel when that is known and on every queue
//! otherwise.

use crate::error::ClientError;
use crate::tls::{create_connector, TlsClientConfig};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use replchan_protocol::{
    Decoder, Encoder, Frame, ProtocolError, CONTROL_CHANNEL, MAX_FRAME_SIZE,
};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// One item of a delivery queue: a frame, or the error that replaced it.
pub type Delivery = Result<Frame, ProtocolError>;

/// Receiving end of a channel's delivery queue.
pub type Inbox = mpsc::UnboundedReceiver<Delivery>;

/// Minimum accepted frame size limit (1 KiB).
pub const MIN_FRAME_SIZE: usize = 1024;

/// Builds the socket URL for a session token.
pub fn ws_url(host: &str, port: u16, token: &str, secure: bool) -> String {
    format!(
        "ws{}://{}:{}/wsv2/{}",
        if secure { "s" } else { "" },
        host,
        port,
        token
    )
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Bound on open/close handshakes and dispatches. `None` waits until the
    /// matching response arrives.
    pub request_timeout: Option<Duration>,
    /// Largest frame accepted from the socket.
    pub max_frame_size: usize,
    /// TLS configuration for `wss://` URLs (optional).
    pub tls: Option<TlsClientConfig>,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            max_frame_size: MAX_FRAME_SIZE,
            tls: None,
        }
    }

    /// Configuration for the execution host at `host:port` using a session token.
    pub fn for_token(host: &str, port: u16, token: &str, secure: bool) -> Self {
        Self::new(ws_url(host, port, token, secure))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.clamp(MIN_FRAME_SIZE, MAX_FRAME_SIZE);
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = Some(tls_config);
        self
    }

    /// Checks that the URL is a WebSocket URL.
    pub fn validate(&self) -> Result<(), ClientError> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| ClientError::Config(format!("invalid url: {}", e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(ClientError::Config(format!(
                "unsupported url scheme: {}",
                other
            ))),
        }
    }

    /// URL without the path, which carries the session token.
    fn target(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(url) => format!(
                "{}://{}:{}",
                url.scheme(),
                url.host_str().unwrap_or("?"),
                url.port_or_known_default().unwrap_or(0)
            ),
            Err(_) => "<invalid url>".to_string(),
        }
    }
}

/// Runs `fut`, failing with [`ClientError::Timeout`] once `deadline` elapses.
pub(crate) async fn with_deadline<T, F>(deadline: Option<Duration>, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| ClientError::Timeout)?,
        None => fut.await,
    }
}

/// Discards everything queued in `inbox`, returning how many items it held.
pub(crate) fn drain(inbox: &mut Inbox) -> usize {
    let mut count = 0;
    while inbox.try_recv().is_ok() {
        count += 1;
    }
    count
}

struct Queue {
    tx: mpsc::UnboundedSender<Delivery>,
    /// Receiver not yet handed to a channel.
    unclaimed: Option<Inbox>,
}

/// Per-channel delivery queues fed by the read loop.
#[derive(Default)]
struct Router {
    queues: HashMap<u32, Queue>,
    /// Refs of open requests still waiting for their grant.
    pending_opens: HashSet<String>,
}

impl Router {
    /// Creates the queue for `channel` unless it exists.
    fn prepare(&mut self, channel: u32) {
        self.queues.entry(channel).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            Queue {
                tx,
                unclaimed: Some(rx),
            }
        });
    }

    /// Hands out the receiver for `channel`, replacing a queue that was
    /// already claimed.
    fn claim(&mut self, channel: u32) -> Inbox {
        if let Some(rx) = self
            .queues
            .get_mut(&channel)
            .and_then(|queue| queue.unclaimed.take())
        {
            return rx;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if self
            .queues
            .insert(
                channel,
                Queue {
                    tx,
                    unclaimed: None,
                },
            )
            .is_some()
        {
            tracing::warn!("Channel {} claimed twice; previous handle detached", channel);
        }
        rx
    }

    /// Whether a grant carrying `reference` answers one of our open requests.
    /// A grant without a ref is taken as ours while any open is pending.
    fn expects_grant(&self, reference: Option<&str>) -> bool {
        match reference {
            Some(reference) => self.pending_opens.contains(reference),
            None => !self.pending_opens.is_empty(),
        }
    }

    /// Queues `delivery` for `channel`. Returns false if nobody listens on it.
    fn deliver(&mut self, channel: u32, delivery: Delivery) -> bool {
        let Some(queue) = self.queues.get(&channel) else {
            return false;
        };
        if queue.tx.send(delivery).is_err() {
            // Channel handle dropped.
            self.queues.remove(&channel);
            return false;
        }
        true
    }

    /// Queues `err` on every channel.
    fn fail_all(&mut self, err: &ProtocolError) {
        self.queues
            .retain(|_, queue| queue.tx.send(Err(err.clone())).is_ok());
    }

    fn release(&mut self, channel: u32) {
        self.queues.remove(&channel);
    }

    fn clear(&mut self) {
        self.queues.clear();
    }
}

/// A connection to an execution host.
pub struct Connection {
    config: ConnectionConfig,
    /// Write half of the socket.
    sink: Mutex<Option<WsSink>>,
    /// Read half of the socket, owned by whoever runs the read loop.
    source: Mutex<Option<WsSource>>,
    router: parking_lot::Mutex<Router>,
    connected: AtomicBool,
}

/// Registration of an open request's ref; dropped once the request settles.
pub struct PendingGrant<'a> {
    conn: &'a Connection,
    reference: String,
}

impl Drop for PendingGrant<'_> {
    fn drop(&mut self) {
        self.conn
            .router
            .lock()
            .pending_opens
            .remove(&self.reference);
    }
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            sink: Mutex::new(None),
            source: Mutex::new(None),
            router: parking_lot::Mutex::new(Router::default()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Opens the WebSocket.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.config.validate()?;
        tracing::debug!("Connecting to {}...", self.config.target());

        let connector = match self.config.tls {
            Some(ref tls) => Some(create_connector(tls)?),
            None => None,
        };

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_frame_size);
        ws_config.max_frame_size = Some(self.config.max_frame_size);

        let (stream, _) = tokio::time::timeout(
            self.config.connect_timeout,
            connect_async_tls_with_config(self.config.url.as_str(), Some(ws_config), true, connector),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::WebSocket(e)
        })?;

        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);
        *self.source.lock().await = Some(source);

        {
            let mut router = self.router.lock();
            router.clear();
            router.prepare(CONTROL_CHANNEL);
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("Connected to {}", self.config.target());
        Ok(())
    }

    /// Encodes and writes one frame.
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }

        let encoded = Encoder::encode(frame)?;
        tracing::debug!(
            "Sending frame channel={} ({} bytes)",
            frame.channel,
            encoded.len()
        );

        let mut sink_guard = self.sink.lock().await;
        let sink = sink_guard.as_mut().ok_or(ClientError::NotConnected)?;
        sink.send(Message::Binary(encoded.to_vec())).await?;
        Ok(())
    }

    /// Reads and decodes the next frame from the socket.
    ///
    /// Only the read loop calls this once channels are in use; a second reader
    /// would steal frames from it.
    pub async fn recv_frame(&self) -> Result<Frame, ClientError> {
        let mut source_guard = self.source.lock().await;
        let source = source_guard.as_mut().ok_or(ClientError::NotConnected)?;

        loop {
            match source.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Decoder::decode(&data)?),
                Some(Ok(Message::Close(reason))) => {
                    tracing::debug!("Peer closed the connection: {:?}", reason);
                    return Err(ClientError::ConnectionClosed);
                }
                Some(Ok(Message::Text(text))) => {
                    tracing::warn!("Ignoring text message ({} bytes)", text.len());
                }
                // Ping/pong replies are handled by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ClientError::ConnectionClosed),
            }
        }
    }

    /// Reads frames and routes them to channel queues until the socket fails
    /// (run this in a background task).
    ///
    /// On exit every queue is dropped, so all pending waiters observe the
    /// failure.
    pub async fn read_loop(&self) -> Result<(), ClientError> {
        tracing::debug!("read_loop started");

        let err = loop {
            match self.recv_frame().await {
                Ok(frame) => self.route(frame),
                Err(ClientError::Protocol(e)) => self.route_error(e),
                Err(e) => break e,
            }
        };

        tracing::debug!("read_loop stopped: {}", err);
        self.connected.store(false, Ordering::SeqCst);
        self.router.lock().clear();
        Err(err)
    }

    fn route(&self, frame: Frame) {
        let mut router = self.router.lock();

        // Create the queue before our grant is delivered so output sent right
        // after it is not discarded.
        if frame.channel == CONTROL_CHANNEL {
            if let Some(id) = frame.open_channel_id() {
                if router.expects_grant(frame.reference.as_deref()) {
                    router.prepare(id);
                } else {
                    tracing::debug!("read_loop: grant of channel {} is not ours", id);
                }
            }
        }

        let channel = frame.channel;
        if !router.deliver(channel, Ok(frame)) {
            tracing::debug!("read_loop: discarding frame for channel {}", channel);
        }
    }

    fn route_error(&self, err: ProtocolError) {
        tracing::warn!("read_loop: malformed frame: {}", err);
        let mut router = self.router.lock();
        match err.channel() {
            Some(channel) => {
                if !router.deliver(channel, Err(err)) {
                    tracing::debug!("read_loop: discarding error for channel {}", channel);
                }
            }
            None => router.fail_all(&err),
        }
    }

    /// Marks `reference` as an open request awaiting its grant, until the
    /// returned guard is dropped. Only such grants get a queue ahead of
    /// [`Connection::claim_inbox`].
    pub fn expect_grant(&self, reference: &str) -> PendingGrant<'_> {
        self.router
            .lock()
            .pending_opens
            .insert(reference.to_string());
        PendingGrant {
            conn: self,
            reference: reference.to_string(),
        }
    }

    /// Takes the delivery queue for `channel`.
    pub fn claim_inbox(&self, channel: u32) -> Inbox {
        self.router.lock().claim(channel)
    }

    /// Drops the delivery queue for `channel`.
    pub fn release(&self, channel: u32) {
        self.router.lock().release(channel);
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    ///
    /// The write half is dropped even if the close handshake fails.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");

        // Mark as disconnected first to stop any new requests
        self.connected.store(false, Ordering::SeqCst);
        self.router.lock().clear();

        let result = match self.sink.lock().await.take() {
            Some(mut sink) => match sink.close().await {
                Ok(())
                | Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
                Err(e) => Err(ClientError::WebSocket(e)),
            },
            None => Ok(()),
        };

        // A running read loop holds the read half; it ends on the peer's
        // close reply or when its task is aborted.
        if let Ok(mut source) = self.source.try_lock() {
            source.take();
        }

        tracing::debug!("Connection closed");
        result
    }
}
