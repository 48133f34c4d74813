// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end flows against the in-process mock server.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use lyncup_client::queue::QueueScreen;
use lyncup_client::realtime::RealtimeEvent;
use lyncup_client::room::ChatRoomScreen;
use lyncup_client::shell::{Nav, ShellEvent};
use lyncup_specs::{client_config, ensure_crypto, epoch_secs, make_jwt, start_server};

#[tokio::test]
async fn login_queue_match_chat_and_like() -> anyhow::Result<()> {
    ensure_crypto();
    let (addr, _state) = start_server().await?;
    let dir = tempfile::tempdir()?;
    let (client, mut shell_rx) = lyncup_client::build(client_config(addr, &dir));

    client.session.login("worker@example.com", "pw").await.expect("login");
    assert_eq!(
        shell_rx.recv().await,
        Some(ShellEvent::Navigate(Nav::Queue)),
        "login lands on the queue"
    );

    // Queue up and wait for the match.
    let (queue, mut queue_events) = QueueScreen::new(
        Arc::clone(&client.session),
        Arc::clone(&client.store),
        Arc::clone(&client.http),
        client.shell.clone(),
        Arc::clone(&client.refresher),
        &client.config.ws_url,
    );
    queue.join().await;

    let room_id = loop {
        let event = tokio::time::timeout(Duration::from_secs(5), queue_events.recv())
            .await
            .expect("queue event")
            .expect("queue channel open");
        let assigned = matches!(event, RealtimeEvent::RoomAssigned { room_id } if room_id == 1);
        queue.handle_event(event).await;
        if assigned {
            break 1;
        }
    };
    assert_eq!(
        shell_rx.recv().await,
        Some(ShellEvent::Navigate(Nav::Chat { room_id })),
    );

    // Enter the room, exchange a message, like a member.
    let (room, mut room_events) = ChatRoomScreen::new(
        room_id,
        Arc::clone(&client.store),
        Arc::clone(&client.http),
        client.shell.clone(),
        Arc::clone(&client.refresher),
        &client.config.ws_url,
    );
    room.enter().await;

    let mut got_roster = false;
    let mut got_text = false;
    room.send("  hello room  ").await;
    while !(got_roster && got_text) {
        let event = tokio::time::timeout(Duration::from_secs(5), room_events.recv())
            .await
            .expect("room event")
            .expect("room channel open");
        match &event {
            RealtimeEvent::Roster(members) => {
                assert_eq!(members.len(), 2);
                got_roster = true;
            }
            RealtimeEvent::ChatText(text) => {
                assert_eq!(text, "hello room", "sends are trimmed before the wire");
                got_text = true;
            }
            _ => {}
        }
        room.apply(event);
    }

    let snapshot = room.snapshot();
    assert_eq!(snapshot.messages, ["hello room"]);
    assert_eq!(snapshot.members.len(), 2);

    room.toggle_like(2).await;
    assert_eq!(room.snapshot().likes.get(&2), Some(&true));

    room.leave().await;
    assert_eq!(shell_rx.recv().await, Some(ShellEvent::Navigate(Nav::Queue)));
    Ok(())
}

#[tokio::test]
async fn credentials_survive_a_restart() -> anyhow::Result<()> {
    ensure_crypto();
    let (addr, state) = start_server().await?;
    let dir = tempfile::tempdir()?;

    {
        let (client, _shell_rx) = lyncup_client::build(client_config(addr, &dir));
        client.session.login("worker@example.com", "pw").await.expect("login");
    }

    // A fresh process picks the credential file up and revalidates.
    let (client, _shell_rx) = lyncup_client::build(client_config(addr, &dir));
    client.session.init().await;
    assert!(client.session.auth().get());
    // In-memory freshness does not survive the restart, so the probe went
    // through the refresh path.
    assert!(state.refresh_calls.load(Ordering::Relaxed) >= 1);
    Ok(())
}

#[tokio::test]
async fn revoked_access_token_is_refreshed_transparently() -> anyhow::Result<()> {
    ensure_crypto();
    let (addr, state) = start_server().await?;
    let dir = tempfile::tempdir()?;
    let (client, _shell_rx) = lyncup_client::build(client_config(addr, &dir));

    client.session.login("worker@example.com", "pw").await.expect("login");
    state.invalidate_access_tokens();

    // The next authenticated call bounces, refreshes once, and succeeds.
    let resp = client.http.get("users/checkprofilecomplete/").await.expect("probe");
    assert_eq!(resp.get("profile_complete"), Some(&serde_json::Value::Bool(true)));
    assert_eq!(state.refresh_calls.load(Ordering::Relaxed), 1);
    Ok(())
}

#[tokio::test]
async fn dead_refresh_token_forces_reentry() -> anyhow::Result<()> {
    ensure_crypto();
    let (addr, _state) = start_server().await?;
    let dir = tempfile::tempdir()?;

    // Plant credentials whose refresh token is already expired.
    let creds = serde_json::json!({
        "access_token": make_jwt(serde_json::json!({"user_id": 9, "exp": epoch_secs() - 60})),
        "refresh_token": make_jwt(serde_json::json!({"user_id": 9, "exp": epoch_secs() - 30})),
        "user_id": "9",
    });
    std::fs::write(dir.path().join("credentials.json"), creds.to_string())?;

    let (client, mut shell_rx) = lyncup_client::build(client_config(addr, &dir));
    client.session.init().await;

    assert!(!client.session.auth().get());
    assert_eq!(client.store.access_token(), None, "dead credentials are cleared");
    assert_eq!(shell_rx.recv().await, Some(ShellEvent::Navigate(Nav::Entry)));
    Ok(())
}
