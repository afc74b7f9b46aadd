//! Per-connection WebSocket handling.
//!
//! Each accepted socket gets one task running [`handle_connection`]. The task
//! decodes inbound frames and forwards them to the core loop as
//! [`GatewayEvent`]s; a companion writer task drains the connection's
//! outbound queue into the socket. The connection never touches session
//! state directly, it only knows its [`SessionId`].

use crate::config::ServerConfig;
use crate::registry::{ConnectionHandle, SessionId};
use futures_util::stream::SplitSink;
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Events sent from connection tasks to the core loop
#[derive(Debug)]
pub enum GatewayEvent {
    /// A handshake completed. The core answers with the new session id, or
    /// `None` if the connection is refused.
    Connected {
        connection: ConnectionHandle,
        reply: oneshot::Sender<Option<SessionId>>,
    },
    Move {
        session_id: SessionId,
        direction: String,
    },
    Disconnected {
        session_id: SessionId,
    },
}

/// Per-connection limits taken from the server configuration
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub outbox_capacity: usize,
    pub send_timeout: Duration,
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            outbox_capacity: config.outbox_capacity.max(1),
            send_timeout: config.send_timeout,
        }
    }
}

/// Runs one client connection from handshake to close.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<GatewayEvent>,
    settings: ConnectionSettings,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    info!("Client connected from {}", addr);

    let (mut sink, mut source) = ws.split();
    let (outbox_tx, outbox_rx) = mpsc::channel(settings.outbox_capacity.max(1));
    let (reply_tx, reply_rx) = oneshot::channel();

    let connected = GatewayEvent::Connected {
        connection: ConnectionHandle::new(addr, outbox_tx),
        reply: reply_tx,
    };
    if events.send(connected).is_err() {
        error!("Event loop is gone, dropping connection from {}", addr);
        return;
    }

    let session_id = match reply_rx.await {
        Ok(Some(session_id)) => session_id,
        Ok(None) => {
            refuse(&mut sink, addr, settings.send_timeout).await;
            return;
        }
        Err(_) => return,
    };

    let mut writer = tokio::spawn(write_outbox(
        sink,
        outbox_rx,
        session_id,
        settings.send_timeout,
    ));

    let writer_finished = loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !dispatch_frame(&events, session_id, &text) {
                        break false;
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!("Ignoring binary frame from session {}", session_id);
                }
                Some(Ok(Message::Close(_))) | None => break false,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Read error on session {}: {}", session_id, e);
                    break false;
                }
            },
            _ = &mut writer => break true,
        }
    };

    let _ = events.send(GatewayEvent::Disconnected { session_id });
    info!("Client {} (session {}) disconnected", addr, session_id);

    // Unregistering drops the outbox sender, which lets the writer flush and
    // close the socket on its own.
    if !writer_finished && timeout(settings.send_timeout, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Decodes one text frame and forwards it. Returns false once the event
/// loop has gone away.
fn dispatch_frame(
    events: &mpsc::UnboundedSender<GatewayEvent>,
    session_id: SessionId,
    text: &str,
) -> bool {
    match ClientMessage::decode(text) {
        Ok(ClientMessage::Move { direction }) => events
            .send(GatewayEvent::Move {
                session_id,
                direction,
            })
            .is_ok(),
        Ok(ClientMessage::Idle) => {
            debug!("Session {} sent an empty frame", session_id);
            true
        }
        Err(e) => {
            debug!("Dropping frame from session {}: {}", session_id, e);
            true
        }
    }
}

/// Writes queued snapshots until the queue closes or a write fails.
///
/// Each write is bounded by `send_timeout`. On failure the receiver is
/// dropped, so the next broadcast sees the connection as closed.
async fn write_outbox<S>(
    mut sink: S,
    mut outbox: mpsc::Receiver<String>,
    session_id: SessionId,
    send_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    while let Some(payload) = outbox.recv().await {
        match timeout(send_timeout, sink.send(Message::Text(payload))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Send to session {} failed: {}", session_id, e);
                break;
            }
            Err(_) => {
                warn!(
                    "Send to session {} timed out after {:?}",
                    session_id, send_timeout
                );
                break;
            }
        }
    }

    outbox.close();
    let _ = timeout(send_timeout, sink.close()).await;
}

async fn refuse(sink: &mut WsSink, addr: SocketAddr, send_timeout: Duration) {
    info!("Closing connection from {}: server full", addr);

    let refusal = ServerMessage::Error {
        error: "server full".to_string(),
    };
    match refusal.encode() {
        Ok(payload) => {
            let _ = timeout(send_timeout, sink.send(Message::Text(payload))).await;
        }
        Err(e) => error!("Failed to encode refusal: {}", e),
    }
    let _ = timeout(send_timeout, sink.close()).await;
}
