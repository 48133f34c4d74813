// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The chatroom screen.
//!
//! Holds the message log (append-only, delivery order), the latest roster,
//! and per-member like flags. Likes flip locally only after the server
//! confirms the REST call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::Api;
use crate::http::HttpClient;
use crate::realtime::{Channel, Member, RealtimeConnection, RealtimeEvent, WakeSignal};
use crate::shell::{Nav, Shell};
use crate::token::refresher::TokenRefresher;
use crate::token::store::TokenStore;

#[derive(Debug, Default)]
struct RoomState {
    messages: Vec<String>,
    members: Vec<Member>,
    likes: HashMap<u64, bool>,
}

/// Point-in-time copy of the room for rendering.
#[derive(Debug, Clone)]
pub struct ChatRoomSnapshot {
    pub room_id: u64,
    pub messages: Vec<String>,
    pub members: Vec<Member>,
    pub likes: HashMap<u64, bool>,
    pub self_user_id: Option<u64>,
}

pub struct ChatRoomScreen {
    room_id: u64,
    store: Arc<TokenStore>,
    http: Arc<HttpClient>,
    shell: Shell,
    conn: Arc<RealtimeConnection>,
    state: Mutex<RoomState>,
}

impl ChatRoomScreen {
    pub fn new(
        room_id: u64,
        store: Arc<TokenStore>,
        http: Arc<HttpClient>,
        shell: Shell,
        refresher: Arc<TokenRefresher>,
        ws_url: &str,
    ) -> (Self, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let (conn, events) = RealtimeConnection::new(Channel::Chat { room_id }, ws_url, refresher);
        let screen = Self {
            room_id,
            store,
            http,
            shell,
            conn,
            state: Mutex::new(RoomState::default()),
        };
        (screen, events)
    }

    pub fn room_id(&self) -> u64 {
        self.room_id
    }

    /// Open the chat connection for this room.
    pub async fn enter(&self) {
        if let Err(e) = self.conn.connect().await {
            warn!(room_id = self.room_id, err = %e, "could not open chatroom");
        }
    }

    /// Apply one event from the chat channel.
    pub fn apply(&self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::ChatText(text) => {
                if let Ok(mut state) = self.state.lock() {
                    state.messages.push(text);
                }
            }
            RealtimeEvent::Roster(members) => {
                debug!(room_id = self.room_id, count = members.len(), "roster replaced");
                if let Ok(mut state) = self.state.lock() {
                    state.members = members;
                }
            }
            RealtimeEvent::Opened => debug!(room_id = self.room_id, "chatroom open"),
            RealtimeEvent::Closed => {
                debug!(room_id = self.room_id, "chatroom closed, awaiting wake signal");
            }
            other => debug!(event = ?other, "unexpected chat event ignored"),
        }
    }

    /// Send one chat message. Whitespace-only input is dropped before it
    /// touches the wire.
    pub async fn send(&self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let frame = serde_json::json!({ "text": trimmed }).to_string();
        self.conn.send_text(&frame).await;
    }

    /// Toggle a like on another member. The local flag flips only once the
    /// server confirms, so a failed call leaves the UI truthful.
    pub async fn toggle_like(&self, user_to: u64) {
        let currently_liked = self
            .state
            .lock()
            .map(|s| s.likes.get(&user_to).copied().unwrap_or(false))
            .unwrap_or(false);

        let api = Api::new(&self.http);
        let result = if currently_liked {
            api.unlike(user_to).await
        } else {
            api.like(user_to).await
        };

        match result {
            Ok(()) => {
                if let Ok(mut state) = self.state.lock() {
                    state.likes.insert(user_to, !currently_liked);
                }
            }
            Err(e) => warn!(user_to, err = %e, "like toggle rejected, keeping local state"),
        }
    }

    /// Quit the room and go back to the queue screen.
    pub async fn leave(&self) {
        info!(room_id = self.room_id, "leaving chatroom");
        self.conn.teardown().await;
        self.shell.navigate(Nav::Queue);
    }

    pub async fn handle_wake(&self, signal: WakeSignal) {
        self.conn.handle_wake(signal).await;
    }

    pub fn snapshot(&self) -> ChatRoomSnapshot {
        let (messages, members, likes) = self
            .state
            .lock()
            .map(|s| (s.messages.clone(), s.members.clone(), s.likes.clone()))
            .unwrap_or_default();
        ChatRoomSnapshot {
            room_id: self.room_id,
            messages,
            members,
            likes,
            self_user_id: self.store.user_id().and_then(|id| id.parse().ok()),
        }
    }
}

#[cfg(test)]
#[path = "room_tests.rs"]
mod tests;
