// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket connection state machine shared by the queue and chatroom.
//!
//! One live connection per logical channel. `Idle -> Connecting -> Open`,
//! back to `Idle` on any close. Duplicate connect calls are absorbed, an
//! explicit teardown wins any race with an in-flight handshake, and
//! reconnection is driven solely by wake signals from the hosting shell,
//! never by timers.

use std::sync::Arc;

use futures_util::{SinkExt as _, StreamExt as _};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RealtimeError;
use crate::token::refresher::TokenRefresher;

/// Logical channels the server exposes over WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Queue,
    Chat { room_id: u64 },
}

impl Channel {
    fn path(&self) -> String {
        match self {
            Self::Queue => "queue/".to_owned(),
            Self::Chat { room_id } => format!("chat/{room_id}/"),
        }
    }
}

/// One entry of the chatroom roster, as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "(u64, String, String)")]
pub struct Member {
    pub user_id: u64,
    pub firstname: String,
    pub lastname: String,
}

impl From<(u64, String, String)> for Member {
    fn from((user_id, firstname, lastname): (u64, String, String)) -> Self {
        Self { user_id, firstname, lastname }
    }
}

/// Events surfaced to the owning screen, in transport delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    Opened,
    /// Queue channel: a match landed; the chatroom is ready.
    RoomAssigned { room_id: u64 },
    /// Chat channel: one message to append to the log.
    ChatText(String),
    /// Chat channel: full roster replacement, never a diff.
    Roster(Vec<Member>),
    Closed,
}

/// External signals that may revive a wanted-but-closed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSignal {
    BecameVisible,
    GainedFocus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Open,
}

struct Inner {
    phase: Phase,
    /// Whether the owning screen still wants a live connection. Cleared only
    /// by explicit teardown.
    wanted: bool,
    /// Bumped per connect attempt; a stale attempt's close must not touch
    /// the state of a newer one.
    attempt: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Cancellation for the current attempt or live connection.
    cancel: Option<CancellationToken>,
}

pub struct RealtimeConnection {
    channel: Channel,
    ws_base: String,
    refresher: Arc<TokenRefresher>,
    events: mpsc::UnboundedSender<RealtimeEvent>,
    inner: Mutex<Inner>,
}

impl RealtimeConnection {
    pub fn new(
        channel: Channel,
        ws_base: &str,
        refresher: Arc<TokenRefresher>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            channel,
            ws_base: ws_base.trim_end_matches('/').to_owned(),
            refresher,
            events,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                wanted: false,
                attempt: 0,
                outbound: None,
                cancel: None,
            }),
        });
        (conn, rx)
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.phase == Phase::Open
    }

    /// Start a connection attempt. A call while already `Connecting` or
    /// `Open` is a no-op; hosting screens may initialize twice in quick
    /// succession and only the first call may act.
    pub async fn connect(self: &Arc<Self>) -> Result<(), RealtimeError> {
        let (cancel, attempt) = {
            let mut inner = self.inner.lock().await;
            inner.wanted = true;
            if inner.phase != Phase::Idle {
                debug!(channel = ?self.channel, phase = ?inner.phase, "connect ignored, attempt already underway");
                return Ok(());
            }
            inner.phase = Phase::Connecting;
            inner.attempt += 1;
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            (cancel, inner.attempt)
        };

        let Some(token) = self.refresher.get_valid_access_token().await else {
            self.abort_attempt(attempt, &cancel).await;
            return Err(RealtimeError::HandshakeFailed);
        };

        let url = format!("{}/{}?token={}", self.ws_base, self.channel.path(), token);
        let stream = match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(channel = ?self.channel, err = %e, "websocket handshake failed");
                self.abort_attempt(attempt, &cancel).await;
                return Err(RealtimeError::HandshakeFailed);
            }
        };

        let outbound_rx = {
            let mut inner = self.inner.lock().await;
            if cancel.is_cancelled() {
                // Teardown arrived while the handshake was in flight. The
                // transport must not be adopted; close it and stay down.
                info!(channel = ?self.channel, "handshake completed after teardown, closing");
                drop(inner);
                let mut stream = stream;
                let _ = stream.close(None).await;
                return Ok(());
            }
            inner.phase = Phase::Open;
            let (tx, rx) = mpsc::unbounded_channel();
            inner.outbound = Some(tx);
            rx
        };

        info!(channel = ?self.channel, "websocket open");
        let _ = self.events.send(RealtimeEvent::Opened);
        let conn = Arc::clone(self);
        tokio::spawn(async move { conn.run_io(stream, outbound_rx, attempt, cancel).await });
        Ok(())
    }

    /// Queue a one-shot text send. Dropped, not queued, unless `Open`.
    pub async fn send_text(&self, text: &str) {
        let inner = self.inner.lock().await;
        if inner.phase != Phase::Open {
            debug!(channel = ?self.channel, "send dropped, connection not open");
            return;
        }
        if let Some(tx) = inner.outbound.as_ref() {
            let _ = tx.send(text.to_owned());
        }
    }

    /// Explicit teardown: cancel any attempt, close any live transport,
    /// reset to `Idle`, and stop wanting the connection. Idempotent.
    pub async fn teardown(&self) {
        let mut inner = self.inner.lock().await;
        inner.wanted = false;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.outbound = None;
        if inner.phase != Phase::Idle {
            info!(channel = ?self.channel, "connection torn down");
            inner.phase = Phase::Idle;
        }
    }

    /// Wake-signal entry point: reconnect iff the connection is still
    /// wanted and currently down. The only retry policy there is.
    pub async fn handle_wake(self: &Arc<Self>, signal: WakeSignal) {
        let should_reconnect = {
            let inner = self.inner.lock().await;
            inner.wanted && inner.phase == Phase::Idle
        };
        if should_reconnect {
            info!(channel = ?self.channel, signal = ?signal, "wake signal, reconnecting");
            let _ = self.connect().await;
        }
    }

    /// Reset a failed attempt to `Idle`, unless teardown already did.
    async fn abort_attempt(&self, attempt: u64, cancel: &CancellationToken) {
        let mut inner = self.inner.lock().await;
        if inner.attempt == attempt && !cancel.is_cancelled() {
            inner.phase = Phase::Idle;
            inner.cancel = None;
        }
    }

    /// Pump the live transport until it closes or teardown cancels it.
    async fn run_io(
        &self,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        mut outbound: mpsc::UnboundedReceiver<String>,
        attempt: u64,
        cancel: CancellationToken,
    ) {
        let (mut sink, mut inbound) = stream.split();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                msg = outbound.recv() => {
                    let Some(text) = msg else { break };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!(channel = ?self.channel, err = %e, "send failed, transport closed");
                        self.mark_closed(attempt, &cancel).await;
                        break;
                    }
                }
                msg = inbound.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_message(text.as_str()),
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(channel = ?self.channel, "transport closed by server");
                            self.mark_closed(attempt, &cancel).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(channel = ?self.channel, err = %e, "transport error");
                            self.mark_closed(attempt, &cancel).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Inbound frames are JSON; unknown shapes are logged and dropped.
    fn handle_message(&self, raw: &str) {
        let data: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(channel = ?self.channel, err = %e, "undecodable frame dropped");
                return;
            }
        };
        match self.channel {
            Channel::Queue => {
                if let Some(room_id) = data.get("room_id").and_then(serde_json::Value::as_u64) {
                    let _ = self.events.send(RealtimeEvent::RoomAssigned { room_id });
                } else {
                    debug!("queue frame without room_id ignored");
                }
            }
            Channel::Chat { .. } => {
                if let Some(text) = data.get("text").and_then(serde_json::Value::as_str) {
                    if !text.is_empty() {
                        let _ = self.events.send(RealtimeEvent::ChatText(text.to_owned()));
                    }
                }
                if let Some(members) = data.get("members") {
                    match serde_json::from_value::<Vec<Member>>(members.clone()) {
                        Ok(roster) => {
                            let _ = self.events.send(RealtimeEvent::Roster(roster));
                        }
                        Err(e) => warn!(err = %e, "undecodable roster dropped"),
                    }
                }
            }
        }
    }

    /// Unplanned close: back to `Idle` and tell the owner, unless teardown
    /// already cancelled this attempt and owns the state.
    async fn mark_closed(&self, attempt: u64, cancel: &CancellationToken) {
        {
            let mut inner = self.inner.lock().await;
            if inner.attempt != attempt || cancel.is_cancelled() {
                return;
            }
            inner.phase = Phase::Idle;
            inner.outbound = None;
            inner.cancel = None;
        }
        let _ = self.events.send(RealtimeEvent::Closed);
    }
}

#[cfg(test)]
#[path = "realtime_tests.rs"]
mod tests;
