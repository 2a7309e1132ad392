use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use super::IntentSink;
use crate::protocol::{Intent, WireError, encode_intent};
use crate::telemetry;

pub mod config;
pub use config::{Endpoint, WEBSOCKET_PATH};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },
    #[error("connection already has a message subscriber")]
    AlreadySubscribed,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection is not open (state: {0:?})")]
    NotOpen(ConnectionState),
    #[error("connection task has stopped")]
    ChannelClosed,
    #[error(transparent)]
    Encode(#[from] WireError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Channel lifecycle notifications. Inbound payloads travel separately
/// through the [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Closed { code: Option<u16>, reason: String },
    Errored(String),
}

// Frames held for a subscriber that has not been installed yet.
const BACKLOG_LIMIT: usize = 256;

#[derive(Default)]
struct Inbox {
    subscriber: Option<mpsc::UnboundedSender<String>>,
    backlog: VecDeque<String>,
    closed: bool,
}

struct Shared {
    state: Mutex<ConnectionState>,
    inbox: Mutex<Inbox>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Enter a terminal state and release the subscriber so its stream ends
    /// once buffered payloads are drained.
    fn finish(&self, state: ConnectionState) {
        let mut inbox = self.inbox.lock();
        self.set_state(state);
        inbox.subscriber.take();
        inbox.closed = true;
    }

    fn deliver(&self, payload: String) {
        let mut inbox = self.inbox.lock();
        if let Some(tx) = &inbox.subscriber {
            if tx.send(payload).is_err() {
                trace!(target: "gophertron::connection", "subscriber gone; frame discarded");
            }
            return;
        }
        if inbox.backlog.len() == BACKLOG_LIMIT {
            inbox.backlog.pop_front();
            trace!(target: "gophertron::connection", "backlog full; oldest frame dropped");
        }
        inbox.backlog.push_back(payload);
    }
}

/// The single long-lived channel to the game server.
///
/// The socket is opened in the background; failures surface as
/// [`ConnectionEvent::Errored`] and in the log, never as an error returned
/// from [`Connection::connect`].
pub struct Connection {
    endpoint: Endpoint,
    shared: Arc<Shared>,
    outbound: IntentSender,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    subscribed: AtomicBool,
    task: Option<JoinHandle<()>>,
}

/// Open the game connection for `host:port`. Must run inside a Tokio runtime.
pub fn connect(host: &str, port: u16) -> Connection {
    Connection::connect(Endpoint::new(host, port))
}

impl Connection {
    pub fn connect(endpoint: Endpoint) -> Self {
        let url = endpoint.url();
        info!(target: "gophertron::connection", %url, "connecting");

        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Connecting),
            inbox: Mutex::new(Inbox::default()),
        });
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<ConnectionEvent>();

        let task_shared = shared.clone();
        let task = tokio::spawn(async move {
            run_connection(url, task_shared, outbound_rx, events_tx).await;
        });

        Self {
            endpoint,
            outbound: IntentSender {
                shared: shared.clone(),
                tx: outbound_tx,
            },
            shared,
            events: events_rx,
            subscribed: AtomicBool::new(false),
            task: Some(task),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Cloneable handle for outbound intents.
    pub fn sender(&self) -> IntentSender {
        self.outbound.clone()
    }

    /// Register the one consumer of inbound payloads. Frames received since
    /// open are replayed first.
    pub fn subscribe(&self) -> Result<Subscription, ConnectionError> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadySubscribed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inbox = self.shared.inbox.lock();
        let replayed = inbox.backlog.len();
        for payload in inbox.backlog.drain(..) {
            let _ = tx.send(payload);
        }
        if !inbox.closed {
            inbox.subscriber = Some(tx);
        }
        debug!(target: "gophertron::connection", replayed, "message subscriber installed");
        Ok(Subscription { rx })
    }

    /// Next lifecycle event, or `None` once the connection task has ended and
    /// every event has been drained.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct Subscription {
    rx: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Fire-and-forget writer for move intents.
#[derive(Clone)]
pub struct IntentSender {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<String>,
}

impl IntentSender {
    pub fn send(&self, intent: &Intent) -> Result<(), SendError> {
        let state = self.shared.state();
        if state != ConnectionState::Open {
            debug!(
                target: "gophertron::connection",
                ?state,
                direction = %intent.param,
                "connection not open; intent dropped"
            );
            return Err(SendError::NotOpen(state));
        }
        let text = encode_intent(intent)?;
        self.tx.send(text).map_err(|_| {
            debug!(
                target: "gophertron::connection",
                direction = %intent.param,
                "writer stopped; intent dropped"
            );
            SendError::ChannelClosed
        })?;
        trace!(target: "gophertron::outgoing", direction = %intent.param, "intent queued");
        Ok(())
    }
}

impl IntentSink for IntentSender {
    fn send_intent(&self, intent: &Intent) -> Result<(), SendError> {
        self.send(intent)
    }
}

async fn run_connection(
    url: String,
    shared: Arc<Shared>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            shared.finish(ConnectionState::Errored);
            warn!(target: "gophertron::connection", %url, error = %err, "websocket connect failed");
            let _ = events_tx.send(ConnectionEvent::Errored(err.to_string()));
            return;
        }
    };

    shared.set_state(ConnectionState::Open);
    info!(target: "gophertron::connection", %url, "connected");
    let _ = events_tx.send(ConnectionEvent::Opened);

    handle_websocket(ws_stream, shared, outbound_rx, events_tx).await;
}

async fn handle_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    shared: Arc<Shared>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(err) = ws_sender.send(Message::Text(text)).await {
                debug!(target: "gophertron::connection", error = %err, "websocket write failed");
                break;
            }
        }
    });

    let mut terminal_event = None;
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                telemetry::record_bytes("inbound_frame_bytes", text.len());
                shared.deliver(text);
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    telemetry::record_bytes("inbound_frame_bytes", text.len());
                    shared.deliver(text);
                }
                Err(err) => {
                    debug!(
                        target: "gophertron::connection",
                        bytes = err.as_bytes().len(),
                        "non-utf8 binary frame dropped"
                    );
                }
            },
            Ok(Message::Close(frame)) => {
                let (code, reason) = match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                    None => (None, String::new()),
                };
                terminal_event = Some(ConnectionEvent::Closed { code, reason });
                break;
            }
            Ok(_) => {}
            Err(err) => {
                terminal_event = Some(ConnectionEvent::Errored(err.to_string()));
                break;
            }
        }
    }

    send_task.abort();
    let _ = send_task.await;

    let event = terminal_event.unwrap_or(ConnectionEvent::Closed {
        code: None,
        reason: String::new(),
    });
    match &event {
        ConnectionEvent::Errored(error) => {
            shared.finish(ConnectionState::Errored);
            warn!(target: "gophertron::connection", %error, "connection error");
        }
        ConnectionEvent::Closed { code, reason } => {
            shared.finish(ConnectionState::Closed);
            info!(target: "gophertron::connection", ?code, %reason, "connection closed");
        }
        ConnectionEvent::Opened => {}
    }
    let _ = events_tx.send(event);
}
