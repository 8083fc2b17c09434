//! WebSocket relay client.
//!
//! Provides:
//! - Connection lifecycle (connect, close)
//! - Handshake query with identity hints and codec choice
//! - Typed send helpers for every client event
//! - A stream of [`RelayEvent`]s for the application
//!
//! There is no offline queue. Text updates carry the whole buffer, so
//! replaying stale ones after a reconnect would overwrite newer text.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::identity::{Handshake, ParticipantId};
use crate::protocol::{
    decode_event, encode_event, ChatMessage, ClientEvent, CursorUpdate, Encoding, Frame,
    JoinRequest, ProtocolError, RosterEntry, SelectionRange, ServerEvent,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay URL, e.g. `ws://127.0.0.1:8081`
    pub server_url: String,
    /// Stable participant id from the identity layer
    pub user_id: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Codec for outgoing and incoming frames
    pub encoding: Encoding,
    /// Quiet period after which a session drops back to idle
    pub idle_after: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8081".to_string(),
            user_id: None,
            name: None,
            encoding: Encoding::Json,
            idle_after: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn with_identity(mut self, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.name = Some(name.into());
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    fn handshake(&self) -> Handshake {
        Handshake {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            encoding: self.encoding,
        }
    }

    /// Full connect URL including the handshake query.
    pub fn connect_url(&self) -> String {
        let separator = if self.server_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{}", self.server_url, self.handshake().to_query())
    }
}

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the relay client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Connection established
    Connected,
    /// Full roster of the current room
    Roster(Vec<RosterEntry>),
    /// Another participant replaced the document
    TextUpdate(String),
    /// Another participant moved their selection
    CursorUpdate(CursorUpdate),
    /// Chat line from another participant
    ChatUpdate(ChatMessage),
    /// The relay dropped one of our frames
    Rejected(String),
    /// Connection lost or closed
    Disconnected,
}

impl From<ServerEvent> for RelayEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::Users(roster) => RelayEvent::Roster(roster),
            ServerEvent::TextUpdate(text) => RelayEvent::TextUpdate(text),
            ServerEvent::CursorUpdate(update) => RelayEvent::CursorUpdate(update),
            ServerEvent::ChatUpdate(message) => RelayEvent::ChatUpdate(message),
            ServerEvent::Rejected { reason } => RelayEvent::Rejected(reason),
        }
    }
}

/// The relay client.
pub struct RelayClient {
    config: ClientConfig,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Message>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<RelayEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<RelayEvent>,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<RelayEvent>> {
        self.event_rx.take()
    }

    /// Connect to the relay.
    ///
    /// Spawns background tasks for reading and writing WebSocket messages.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = self.config.connect_url();
        let ws_stream = match tokio_tungstenite::connect_async(&url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                log::warn!("Failed to connect to {}: {e}", self.config.server_url);
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::Connect(e.to_string()));
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the socket
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if ws_writer.send(message).await.is_err() || closing {
                    break;
                }
            }
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(RelayEvent::Connected).await;
        log::info!("Connected to {}", self.config.server_url);

        // Reader task: decode frames into events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(message) => {
                        let Some(frame) = Frame::from_message(message) else {
                            continue;
                        };
                        match decode_event::<ServerEvent>(&frame) {
                            Ok(event) => {
                                if event_tx.send(event.into()).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("Dropping undecodable frame from relay: {e}"),
                        }
                    }
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(RelayEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Encode and send one event.
    pub async fn send(&self, event: &ClientEvent) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(ProtocolError::ConnectionClosed);
        }
        let tx = self.outgoing_tx.as_ref().ok_or(ProtocolError::ConnectionClosed)?;
        let frame = encode_event(event, self.config.encoding)?;
        tx.send(frame.into()).await.map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Send the whole document.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::TextUpdate(text.into())).await
    }

    /// Send our current selection.
    pub async fn send_cursor(
        &self,
        user_id: ParticipantId,
        range: SelectionRange,
        color: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let update = CursorUpdate {
            user_id,
            range,
            color: color.into(),
        };
        self.send(&ClientEvent::CursorUpdate(update)).await
    }

    pub async fn send_chat(&self, message: ChatMessage) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::ChatUpdate(message)).await
    }

    /// Ask to (re)join `room`. The relay answers with a roster.
    pub async fn join(&self, room: impl Into<String>) -> Result<(), ProtocolError> {
        let mut request = JoinRequest::room(room);
        request.user_id = self.config.user_id.clone().map(ParticipantId::from);
        request.name = self.config.name.clone();
        self.send(&ClientEvent::Join(request)).await
    }

    /// Send a close frame and stop accepting sends.
    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        let tx = self.outgoing_tx.take().ok_or(ProtocolError::ConnectionClosed)?;
        *self.state.write().await = ConnectionState::Disconnected;
        tx.send(Message::Close(None))
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }
}
