//! Per-connection protocol state machine.
//!
//! Lifecycle: CONNECTING → CONNECTED → CLOSED (terminal).
//!
//! ```text
//! accept /ws/{session}
//!        │
//!        ▼
//!   register handle ── send `connected` ── send snapshot (if any)
//!        │
//!        ▼
//!   loop: inbound envelope ──► store write ──► broadcast
//!        │
//!        ▼ close / transport failure
//!   unregister handle ── broadcast `user_disconnected`
//! ```
//!
//! Envelopes from one connection are processed strictly in arrival
//! order, so the writes and broadcasts it triggers are ordered relative
//! to each other (FIFO per origin). A malformed or unknown frame is
//! rejected on its own: logged, no state change, no broadcast, and the
//! connection stays open. Every exit path releases the registry slot
//! before the gateway reaches CLOSED.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SyncError;
use crate::protocol::{ClientEnvelope, ServerEvent};
use crate::registry::ParticipantHandle;
use crate::server::ServerStats;
use crate::service::SessionService;

/// One gateway instance per accepted connection.
pub struct Gateway;

impl Gateway {
    /// Drive a connection from handshake to close.
    pub async fn run(
        stream: TcpStream,
        addr: SocketAddr,
        service: Arc<SessionService>,
        stats: Arc<RwLock<ServerStats>>,
        send_buffer: usize,
    ) -> Result<(), SyncError> {
        // CONNECTING: upgrade and take the session id from the path.
        let mut session: Option<String> = None;
        let callback = |req: &Request, resp: Response| match parse_session_path(req.uri().path()) {
            Some(s) => {
                session = Some(s);
                Ok(resp)
            }
            None => {
                let mut resp = ErrorResponse::new(Some("expected path /ws/{session}".to_string()));
                *resp.status_mut() = StatusCode::BAD_REQUEST;
                Err(resp)
            }
        };
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        let session = session.ok_or_else(|| SyncError::Transport("handshake rejected".into()))?;

        log::info!("Participant connected from {addr} to session {session}");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // All outbound frames for this connection flow through one
        // bounded queue into a writer task, so gateway sends and
        // broadcast fan-out share a single ordered path.
        let (tx, mut rx) = mpsc::channel::<Message>(send_buffer);
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = ws_sender.send(frame).await {
                    log::debug!("Writer for {addr} stopped: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        let handle = ParticipantHandle::new(tx.clone());
        let handle_id = handle.id;
        service.registry().register(&session, handle).await;

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // CONNECTED: acknowledge, then replay the current snapshot.
        let connected = Self::connect_participant(&session, &service, &tx).await;
        if let Err(e) = &connected {
            log::error!("Join replay failed for {addr} in {session}: {e}");
        }

        if connected.is_ok() {
            // Envelope loop; every exit falls through to cleanup below.
            while let Some(incoming) = ws_receiver.next().await {
                match incoming {
                    Ok(Message::Text(text)) => {
                        {
                            let mut s = stats.write().await;
                            s.frames_in += 1;
                        }
                        Self::dispatch(&session, &service, text.as_str()).await;
                    }
                    Ok(Message::Ping(data)) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        log::info!("Session {session}: {addr} closed");
                        break;
                    }
                    Ok(Message::Binary(_)) => {
                        // Envelopes are text frames only
                        log::warn!("Session {session}: rejecting binary frame from {addr}");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Transport failure from {addr} in {session}: {e}");
                        break;
                    }
                }
            }
        }

        // CLOSED: release the registry slot first, then tell the rest.
        service.registry().unregister(&session, handle_id).await;
        let remaining = service.registry().count(&session).await;
        let _ = service
            .broadcaster()
            .broadcast(
                &session,
                &ServerEvent::UserDisconnected {
                    active_users: remaining,
                },
                None,
            )
            .await;

        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
        }
        log::info!("Session {session}: {addr} disconnected, {remaining} remaining");

        connected
    }

    /// Send the join acknowledgement and, when a snapshot exists, the
    /// current canvas to the new participant.
    async fn connect_participant(
        session: &str,
        service: &SessionService,
        tx: &mpsc::Sender<Message>,
    ) -> Result<(), SyncError> {
        let ack = ServerEvent::Connected {
            session_id: session.to_string(),
            active_users: service.registry().count(session).await,
        };
        tx.send(Message::text(ack.encode()?))
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let canvas = service.canvas(session)?;
        if !canvas.is_empty() {
            let snapshot = ServerEvent::CanvasState { data: canvas };
            tx.send(Message::text(snapshot.encode()?))
                .await
                .map_err(|e| SyncError::Transport(e.to_string()))?;
        }
        Ok(())
    }

    /// Handle one inbound envelope. Failures are scoped to the envelope:
    /// a rejected frame or failed write never tears down the connection
    /// and never corrupts other participants' state.
    async fn dispatch(session: &str, service: &SessionService, text: &str) {
        let envelope = match ClientEnvelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Session {session}: rejecting frame: {e}");
                return;
            }
        };

        let result = match envelope {
            ClientEnvelope::CanvasUpdate(canvas) => service
                .replace_canvas(session, canvas)
                .await
                .map(|_| ()),
            ClientEnvelope::ChatMessage(message) => service.post_chat(session, message).await,
        };

        if let Err(e) = result {
            log::error!("Session {session}: envelope not applied: {e}");
        }
    }
}

/// Extract the session id from a `/ws/{session}` request path.
fn parse_session_path(path: &str) -> Option<String> {
    let session = path.strip_prefix("/ws/")?.trim_end_matches('/');
    if session.is_empty() || session.contains('/') || session.contains('\0') {
        None
    } else {
        Some(session.to_string())
    }
}
