//! WebSocket connection and event loop.
//!
//! This module handles the WebSocket connection to the remote browser's
//! DevTools endpoint, including command/response correlation and event
//! routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the browser (command replies, events)
//! - Outgoing commands from the Rust API
//! - Command/reply correlation by numeric id
//! - One-shot event waiters (e.g. waiting for a page load event)

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for establishing the WebSocket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum pending commands before rejecting new ones.
const MAX_PENDING_COMMANDS: usize = 32;

// ============================================================================
// Types
// ============================================================================

/// Outbound WebSocket stream to the remote browser.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map of command ids to reply channels.
type CorrelationMap = FxHashMap<u64, oneshot::Sender<Result<Value>>>;

// ============================================================================
// Wire Types
// ============================================================================

/// An outgoing DevTools command.
#[derive(Debug, Serialize)]
struct CommandCall {
    /// Numeric id used for command/reply correlation.
    id: u64,
    /// Method in `Domain.method` form.
    method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    /// Target session for page-scoped commands.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

/// An incoming DevTools message: a command reply or an event.
///
/// Replies carry `id` plus `result` or `error`; events carry `method` plus
/// `params`. Both may carry a `sessionId`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ProtocolError>,
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
}

/// Error payload of a failed command reply.
#[derive(Debug, Deserialize)]
struct ProtocolError {
    #[serde(default)]
    code: i64,
    message: String,
}

// ============================================================================
// EventWaiter
// ============================================================================

/// A one-shot waiter for a specific event method.
struct EventWaiter {
    /// Waiter id, used to remove a timed-out waiter.
    id: u64,
    /// Event method to match, e.g. `Page.loadEventFired`.
    method: String,
    /// Session filter; `None` matches any session.
    session_id: Option<String>,
    /// Channel receiving the event params.
    tx: oneshot::Sender<Value>,
}

// ============================================================================
// EventWatch
// ============================================================================

/// A registered one-shot event watch returned by [`Connection::watch_event`].
pub struct EventWatch {
    /// Waiter id, used to remove this watch on timeout.
    waiter_id: u64,
    /// Watched event method.
    method: String,
    /// Channel receiving the event params.
    rx: oneshot::Receiver<Value>,
    /// Waiter registry (shared with event loop).
    waiters: Arc<Mutex<Vec<EventWaiter>>>,
}

impl EventWatch {
    /// Waits for the watched event to fire.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if the event does not fire in time
    /// - [`Error::ConnectionClosed`] if the connection closes while waiting
    pub async fn wait(self, wait_timeout: Duration) -> Result<Value> {
        match timeout(wait_timeout, self.rx).await {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.waiters.lock().retain(|w| w.id != self.waiter_id);
                Err(Error::request_timeout(
                    &self.method,
                    wait_timeout.as_millis() as u64,
                ))
            }
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a command and wait for its reply.
    Send {
        call: CommandCall,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(u64),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to a remote browser's DevTools endpoint.
///
/// Handles command/reply correlation and event routing. The connection
/// spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks. All
/// operations are non-blocking.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Registered event waiters (shared with event loop).
    waiters: Arc<Mutex<Vec<EventWaiter>>>,
    /// Monotonic id source for commands and waiters.
    next_id: Arc<AtomicU64>,
    /// Set once the event loop exits or shutdown is requested.
    closed: Arc<AtomicBool>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
            waiters: Arc::clone(&self.waiters),
            next_id: Arc::clone(&self.next_id),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl Connection {
    /// Connects to a DevTools WebSocket URL.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds the connect
    ///   timeout
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| Error::connection_timeout(CONNECT_TIMEOUT.as_millis() as u64))??;

        debug!(%url, "DevTools WebSocket established");

        Ok(Self::new(ws_stream))
    }

    /// Creates a connection from an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    fn new(ws_stream: WsStream) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let waiters: Arc<Mutex<Vec<EventWaiter>>> = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&waiters),
            Arc::clone(&closed),
        ));

        Self {
            command_tx,
            correlation,
            waiters,
            next_id: Arc::new(AtomicU64::new(1)),
            closed,
        }
    }

    /// Returns `true` once the connection is no longer usable.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends a command and waits for its reply with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::RequestTimeout`] if no reply arrives within the timeout
    /// - [`Error::Protocol`] if the browser rejects the command or too many
    ///   commands are pending
    pub async fn send(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value> {
        self.send_with_timeout(method, params, session_id, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a command and waits for its reply with a custom timeout.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
        command_timeout: Duration,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        // Check pending command limit
        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_COMMANDS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_COMMANDS,
                    "Too many pending commands"
                );
                return Err(Error::protocol(format!(
                    "Too many pending commands: {}/{}",
                    correlation.len(),
                    MAX_PENDING_COMMANDS
                )));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let call = CommandCall {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(str::to_string),
        };

        // Create reply channel
        let (response_tx, response_rx) = oneshot::channel();

        // Send command to event loop
        self.command_tx
            .send(ConnectionCommand::Send { call, response_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        // Wait for reply with timeout
        match timeout(command_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up correlation entry
                let _ = self.command_tx.send(ConnectionCommand::RemoveCorrelation(id));

                Err(Error::request_timeout(
                    method,
                    command_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Registers a one-shot watch for an event method.
    ///
    /// Registration is immediate, so a watch taken *before* issuing a
    /// command cannot miss an event that fires while the command's reply is
    /// still in flight.
    ///
    /// # Arguments
    ///
    /// * `method` - Event method to watch, e.g. `Page.loadEventFired`
    /// * `session_id` - Restrict to one session; `None` matches any
    #[must_use]
    pub fn watch_event(&self, method: &str, session_id: Option<&str>) -> EventWatch {
        let (tx, rx) = oneshot::channel();
        let waiter_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        {
            let mut waiters = self.waiters.lock();
            waiters.push(EventWaiter {
                id: waiter_id,
                method: method.to_string(),
                session_id: session_id.map(str::to_string),
                tx,
            });
        }

        EventWatch {
            waiter_id,
            method: method.to_string(),
            rx,
            waiters: Arc::clone(&self.waiters),
        }
    }

    /// Returns the number of pending commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the connection gracefully.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        waiters: Arc<Mutex<Vec<EventWaiter>>>,
        closed: Arc<AtomicBool>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the browser
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, &waiters);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { call, response_tx }) => {
                            Self::handle_send_command(
                                call,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(id)) => {
                            correlation.lock().remove(&id);
                            debug!(id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        closed.store(true, Ordering::SeqCst);

        // Fail all pending commands; dropping waiters closes their channels
        Self::fail_pending_commands(&correlation);
        waiters.lock().clear();

        debug!("Event loop terminated");
    }

    /// Handles an incoming text message from the browser.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        waiters: &Arc<Mutex<Vec<EventWaiter>>>,
    ) {
        let envelope: Envelope = match from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Failed to parse incoming message");
                return;
            }
        };

        // Command reply
        if let Some(id) = envelope.id {
            let tx = correlation.lock().remove(&id);

            if let Some(tx) = tx {
                let result = match envelope.error {
                    Some(err) => Err(Error::protocol(format!(
                        "{} (code {})",
                        err.message, err.code
                    ))),
                    None => Ok(envelope.result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(result);
            } else {
                warn!(id, "Reply for unknown command");
            }

            return;
        }

        // Event
        if let Some(method) = envelope.method {
            let waiter = {
                let mut waiters = waiters.lock();
                let index = waiters.iter().position(|w| {
                    w.method == method
                        && (w.session_id.is_none() || w.session_id == envelope.session_id)
                });
                index.map(|i| waiters.swap_remove(i))
            };

            match waiter {
                Some(waiter) => {
                    let _ = waiter.tx.send(envelope.params.unwrap_or(Value::Null));
                }
                None => {
                    trace!(%method, "Unwatched event");
                }
            }
        }
    }

    /// Handles a send command from the Rust API.
    async fn handle_send_command(
        call: CommandCall,
        response_tx: oneshot::Sender<Result<Value>>,
        ws_write: &mut futures_util::stream::SplitSink<WsStream, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let id = call.id;

        // Serialize command
        let json = match to_string(&call) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(id, response_tx);

        // Send over WebSocket
        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            // Remove correlation and notify caller
            if let Some(tx) = correlation.lock().remove(&id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
        }

        trace!(id, method = %call.method, "Command sent");
    }

    /// Fails all pending commands with [`Error::ConnectionClosed`].
    fn fail_pending_commands(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending commands on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_call_serialization() {
        let call = CommandCall {
            id: 7,
            method: "Page.navigate".to_string(),
            params: Some(serde_json::json!({"url": "https://example.com"})),
            session_id: Some("SID".to_string()),
        };

        let json = to_string(&call).expect("serialize");
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("Page.navigate"));
        assert!(json.contains("\"sessionId\":\"SID\""));
    }

    #[test]
    fn test_command_call_omits_empty_fields() {
        let call = CommandCall {
            id: 1,
            method: "Browser.close".to_string(),
            params: None,
            session_id: None,
        };

        let json = to_string(&call).expect("serialize");
        assert!(!json.contains("params"));
        assert!(!json.contains("sessionId"));
    }

    #[test]
    fn test_envelope_reply_parse() {
        let envelope: Envelope = from_str(
            r#"{"id": 3, "result": {"frameId": "F1"}, "sessionId": "SID"}"#,
        )
        .expect("parse");

        assert_eq!(envelope.id, Some(3));
        assert!(envelope.error.is_none());
        assert_eq!(envelope.session_id.as_deref(), Some("SID"));
    }

    #[test]
    fn test_envelope_error_parse() {
        let envelope: Envelope = from_str(
            r#"{"id": 4, "error": {"code": -32000, "message": "target closed"}}"#,
        )
        .expect("parse");

        let err = envelope.error.expect("error payload");
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "target closed");
    }

    #[test]
    fn test_envelope_event_parse() {
        let envelope: Envelope = from_str(
            r#"{"method": "Page.loadEventFired", "params": {"timestamp": 1.0}}"#,
        )
        .expect("parse");

        assert!(envelope.id.is_none());
        assert_eq!(envelope.method.as_deref(), Some("Page.loadEventFired"));
    }
}
