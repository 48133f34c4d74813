// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Navigation and alert events emitted by the core for the hosting shell.
//!
//! The core never renders anything. Components that need to send the user
//! somewhere (forced re-login, queue match) or show a one-off message
//! (connectivity failure) emit [`ShellEvent`]s; the front end consumes the
//! receiver returned by [`Shell::new`] and acts on them.

use tokio::sync::mpsc;

/// Navigation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    /// Entry/login view.
    Entry,
    /// Default authenticated landing view (the queue).
    Queue,
    /// Profile editor.
    Profile,
    /// Chatroom for a matched room.
    Chat { room_id: u64 },
}

/// Events the shell renders outside any one screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Navigate(Nav),
    /// User-visible alert text.
    Alert(String),
}

/// Cheap clonable handle for emitting shell events from any component.
#[derive(Clone)]
pub struct Shell {
    tx: mpsc::UnboundedSender<ShellEvent>,
}

impl Shell {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ShellEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send the user to a view. Dropped if the shell receiver is gone.
    pub fn navigate(&self, nav: Nav) {
        let _ = self.tx.send(ShellEvent::Navigate(nav));
    }

    /// Show a one-off user-visible alert.
    pub fn alert(&self, message: impl Into<String>) {
        let _ = self.tx.send(ShellEvent::Alert(message.into()));
    }
}
