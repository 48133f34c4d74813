// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The matchmaking queue screen.
//!
//! Arms the queue WebSocket once the preconditions hold, waits for a room
//! assignment, and navigates into the chatroom exactly once per armed
//! session even if the server repeats the assignment frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::Api;
use crate::http::HttpClient;
use crate::realtime::{Channel, RealtimeConnection, RealtimeEvent, WakeSignal};
use crate::session::{AuthSession, Gate};
use crate::shell::{Nav, Shell};
use crate::token::refresher::TokenRefresher;
use crate::token::store::TokenStore;

/// Queuing with a refresh token this close to expiry risks a forced
/// re-login mid-chat, so the user is told to log in again first.
const MIN_QUEUE_REFRESH_SECS: i64 = 3600;

pub struct QueueScreen {
    session: Arc<AuthSession>,
    store: Arc<TokenStore>,
    http: Arc<HttpClient>,
    shell: Shell,
    conn: Arc<RealtimeConnection>,
    /// Set on the first room assignment of an armed session; repeats of the
    /// assignment frame must not navigate twice.
    navigated: AtomicBool,
}

impl QueueScreen {
    pub fn new(
        session: Arc<AuthSession>,
        store: Arc<TokenStore>,
        http: Arc<HttpClient>,
        shell: Shell,
        refresher: Arc<TokenRefresher>,
        ws_url: &str,
    ) -> (Self, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let (conn, events) = RealtimeConnection::new(Channel::Queue, ws_url, refresher);
        let screen = Self {
            session,
            store,
            http,
            shell,
            conn,
            navigated: AtomicBool::new(false),
        };
        (screen, events)
    }

    /// Arm the queue. Preconditions, in order: an authenticated session, a
    /// refresh token with enough life left to survive a chat, and a
    /// completed profile.
    pub async fn join(&self) {
        if self.session.private_gate() != Gate::Allow {
            self.shell.navigate(Nav::Entry);
            return;
        }

        let remaining = self.store.remaining_refresh_lifetime_secs();
        if remaining.is_none_or(|secs| secs < MIN_QUEUE_REFRESH_SECS) {
            info!(?remaining, "refresh token too close to expiry to queue");
            self.shell
                .alert("Your session is about to expire. Please login again before queuing!");
            self.session.logout();
            return;
        }

        match Api::new(&self.http).check_profile_complete().await {
            Ok(false) => {
                self.shell
                    .alert("Please complete your profile before joining the queue.");
                self.shell.navigate(Nav::Profile);
                return;
            }
            Ok(true) => {}
            Err(e) => {
                // Not a blocker: the probe result is advisory, the server
                // enforces its own rules at match time.
                debug!(err = %e, "profile completeness check failed, queuing anyway");
            }
        }

        self.navigated.store(false, Ordering::SeqCst);
        let _ = self.conn.connect().await;
    }

    /// Apply one event from the queue channel.
    pub async fn handle_event(&self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::RoomAssigned { room_id } => {
                if self.navigated.swap(true, Ordering::SeqCst) {
                    debug!(room_id, "duplicate room assignment ignored");
                    return;
                }
                info!(room_id, "matched, entering chatroom");
                self.conn.teardown().await;
                self.shell.navigate(Nav::Chat { room_id });
            }
            RealtimeEvent::Opened => debug!("queue connection open"),
            RealtimeEvent::Closed => debug!("queue connection closed, awaiting wake signal"),
            other => debug!(event = ?other, "unexpected queue event ignored"),
        }
    }

    /// Leave the queue without a match.
    pub async fn cancel(&self) {
        self.conn.teardown().await;
    }

    pub async fn handle_wake(&self, signal: WakeSignal) {
        self.conn.handle_wake(signal).await;
    }

    pub async fn is_queued(&self) -> bool {
        self.conn.is_open().await
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
