//! WebSocket relay server.
//!
//! Architecture:
//! ```text
//! Client A ──┐  accept_hdr_async        ┌─────────────────────┐
//!            ├── (query: userId, name,  │  ConnectionGateway  │
//! Client B ──┘   encoding)              │  (single task)      │
//!                  │                    └──────────┬──────────┘
//!                  │  GatewayCommand               │ Arc<ServerEvent>
//!                  └──────────────────────────────►│
//!                                                  ▼
//!                                   per-connection outbox ──► encode ──► socket
//! ```
//!
//! Each connection task owns its socket. Inbound frames are decoded and
//! handed to the gateway; outbound events arrive on the connection's
//! outbox and are encoded with the codec chosen at handshake. A frame
//! that fails to decode is dropped and answered with `rejected`, sent
//! only to its sender.

use std::io::ErrorKind;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::broadcast::{outbox, OutboxReceiver};
use crate::color::Palette;
use crate::gateway::{ConnectionGateway, GatewayClosed, GatewayConfig, GatewayHandle, GatewayStats};
use crate::identity::{ConnectionId, Handshake, RoomId};
use crate::protocol::{decode_event, encode_event, ClientEvent, Encoding, Frame, ProtocolError, RosterEntry};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Room new connections land in
    pub default_room: RoomId,
    /// Highlight colors handed to participants
    pub palette: Palette,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8081".to_string(),
            default_room: RoomId::default(),
            palette: Palette::default(),
        }
    }
}

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Gateway(#[from] GatewayClosed),
}

/// The relay server.
///
/// Construction spawns the gateway task, so it must happen inside a Tokio
/// runtime.
pub struct RelayServer {
    config: ServerConfig,
    gateway: GatewayHandle,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let gateway_config = GatewayConfig {
            default_room: config.default_room.clone(),
            palette: config.palette.clone(),
        };
        let (gateway, _task) = ConnectionGateway::new(gateway_config).spawn();
        Self { config, gateway }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind `bind_addr` and serve until the listener fails.
    pub async fn run(self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), RelayError> {
        log::info!("Relay server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::error!("Accept failed: {e}");
                    continue;
                }
            };
            log::debug!("New TCP connection from {addr}");

            let gateway = self.gateway.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, gateway).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection from handshake to close.
    async fn handle_connection(stream: TcpStream, addr: SocketAddr, gateway: GatewayHandle) -> Result<(), RelayError> {
        let mut query = None;
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |request: &Request, response: Response| {
            query = request.uri().query().map(str::to_owned);
            Ok::<_, ErrorResponse>(response)
        })
        .await?;

        let handshake = Handshake::from_query(query.as_deref());
        let connection = ConnectionId::new();
        let encoding = handshake.encoding;
        let (tx, rx) = outbox();
        gateway.connect(connection, handshake.identity(connection), tx)?;
        log::info!("WebSocket connection {connection} established from {addr} ({encoding})");

        let outcome = Self::pump(ws_stream, connection, encoding, &gateway, rx).await;

        // Always leave the roster, even when the socket failed.
        gateway.disconnect(connection)?;
        log::info!("Connection {connection} from {addr} closed");
        outcome
    }

    async fn pump(
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        connection: ConnectionId,
        encoding: Encoding,
        gateway: &GatewayHandle,
        mut outbox_rx: OutboxReceiver,
    ) -> Result<(), RelayError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                                return Self::socket_closed(connection, e);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(message)) => {
                            if let Some(frame) = Frame::from_message(message) {
                                Self::ingest(gateway, connection, &frame)?;
                            }
                        }
                        Some(Err(e)) => return Self::socket_closed(connection, e),
                    }
                }

                event = outbox_rx.recv() => {
                    let Some(event) = event else { break };
                    let frame = encode_event(&*event, encoding)?;
                    if let Err(e) = ws_sender.send(frame.into()).await {
                        return Self::socket_closed(connection, e);
                    }
                }
            }
        }
        Ok(())
    }

    /// A peer that vanished is a normal close; anything else is a failure.
    fn socket_closed(connection: ConnectionId, e: WsError) -> Result<(), RelayError> {
        if peer_gone(&e) {
            log::info!("Connection {connection} dropped by peer: {e}");
            Ok(())
        } else {
            Err(e.into())
        }
    }

    fn ingest(gateway: &GatewayHandle, connection: ConnectionId, frame: &Frame) -> Result<(), GatewayClosed> {
        match decode_event::<ClientEvent>(frame) {
            Ok(event) => gateway.dispatch(connection, event),
            Err(e) => {
                log::warn!("Rejected {}-byte frame from {connection}: {e}", frame.len());
                gateway.reject(connection, e.to_string())
            }
        }
    }

    /// Current roster of `room`.
    pub async fn roster(&self, room: RoomId) -> Result<Vec<RosterEntry>, RelayError> {
        Ok(self.gateway.roster(room).await?)
    }

    pub async fn stats(&self) -> Result<GatewayStats, RelayError> {
        Ok(self.gateway.stats().await?)
    }

    /// Handle to the gateway task, usable after `serve` has taken the server.
    pub fn gateway(&self) -> GatewayHandle {
        self.gateway.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}

/// Whether `e` only means the peer went away without a close frame.
fn peer_gone(e: &WsError) -> bool {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8081");
        assert_eq!(config.default_room.as_str(), "default");
        assert_eq!(config.palette.len(), 10);
    }

    #[tokio::test]
    async fn test_server_custom_config() {
        let config = ServerConfig {
            bind_addr: "0.0.0.0:9000".to_string(),
            ..ServerConfig::default()
        };
        let server = RelayServer::new(config);
        assert_eq!(server.bind_addr(), "0.0.0.0:9000");
    }

    #[tokio::test]
    async fn test_run_reports_busy_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = RelayServer::new(ServerConfig {
            bind_addr: taken.local_addr().unwrap().to_string(),
            ..ServerConfig::default()
        });
        assert!(matches!(server.run().await, Err(RelayError::Io(_))));
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = RelayServer::with_defaults();
        let stats = server.stats().await.unwrap();
        assert_eq!(stats, GatewayStats::default());
        assert!(server.roster(RoomId::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connection_joins_and_leaves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::with_defaults();
        let gateway = server.gateway();
        tokio::spawn(server.serve(listener));

        let url = format!("ws://{addr}/?userId=u1&name=Ada");
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        // The first frame is the roster that includes us.
        let first = ws.next().await.unwrap().unwrap();
        let frame = Frame::from_message(first).unwrap();
        let event: crate::protocol::ServerEvent = decode_event(&frame).unwrap();
        assert_eq!(event.name(), "users");
        assert_eq!(gateway.roster(RoomId::default()).await.unwrap()[0].name, "Ada");

        ws.close(None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(gateway.roster(RoomId::default()).await.unwrap().is_empty());
    }

    #[test]
    fn test_peer_gone_errors() {
        assert!(peer_gone(&WsError::ConnectionClosed));
        assert!(peer_gone(&WsError::AlreadyClosed));
        assert!(peer_gone(&WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake)));
        assert!(peer_gone(&WsError::Io(std::io::Error::from(ErrorKind::ConnectionReset))));
        assert!(peer_gone(&WsError::Io(std::io::Error::from(ErrorKind::BrokenPipe))));

        assert!(!peer_gone(&WsError::Protocol(WsProtocolError::HandshakeIncomplete)));
        assert!(!peer_gone(&WsError::Io(std::io::Error::from(ErrorKind::PermissionDenied))));
    }

    #[tokio::test]
    async fn test_dropped_socket_closes_cleanly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::with_defaults();
        let gateway = server.gateway();
        tokio::spawn(server.serve(listener));

        let url = format!("ws://{addr}/?userId=gone");
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        ws.next().await.unwrap().unwrap();

        // No close frame, just a dead TCP stream.
        drop(ws);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(gateway.roster(RoomId::default()).await.unwrap().is_empty());
        assert_eq!(gateway.stats().await.unwrap().active_connections, 0);
    }
}
