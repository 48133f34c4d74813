// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal front end for the LyncUp client core.
//!
//! Drives the library the way the web shell would: a command loop stands in
//! for button presses, shell events print instead of routing views, and the
//! `wake` command plays the role of a tab regaining visibility.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, error};

use lyncup_client::config::ClientConfig;
use lyncup_client::queue::QueueScreen;
use lyncup_client::realtime::WakeSignal;
use lyncup_client::room::ChatRoomScreen;
use lyncup_client::session::spawn_storage_watcher;
use lyncup_client::shell::{Nav, ShellEvent};

#[derive(Debug, Parser)]
#[command(name = "lyncup", about = "LyncUp remote-worker matchmaking client")]
struct Cli {
    #[command(flatten)]
    client: ClientConfig,

    /// Log filter, e.g. "info" or "lyncup_client=debug".
    #[arg(long, default_value = "info", env = "LYNCUP_LOG")]
    log_level: String,

    /// Log output format: text or json.
    #[arg(long, default_value = "text", env = "LYNCUP_LOG_FORMAT")]
    log_format: String,
}

struct App {
    client: lyncup_client::Client,
    queue: Mutex<Option<Arc<QueueScreen>>>,
    room: Mutex<Option<Arc<ChatRoomScreen>>>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("crypto provider already installed");
    }

    if let Err(e) = run(cli).await {
        error!(err = %e, "fatal");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).init();
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (client, mut shell_rx) = lyncup_client::build(cli.client);
    client.session.init().await;
    let _watcher = spawn_storage_watcher(Arc::clone(&client.session));

    let app = Arc::new(App {
        client,
        queue: Mutex::new(None),
        room: Mutex::new(None),
    });

    // Shell events drive the "routing": entering a chatroom swaps the live
    // screen, everything else just prints.
    {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            while let Some(event) = shell_rx.recv().await {
                match event {
                    ShellEvent::Alert(message) => println!("! {message}"),
                    ShellEvent::Navigate(Nav::Chat { room_id }) => {
                        println!("-> chatroom {room_id}");
                        enter_room(&app, room_id).await;
                    }
                    ShellEvent::Navigate(nav) => println!("-> {nav:?}"),
                }
            }
        });
    }

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else { continue };
        match command {
            "login" => {
                let (Some(email), Some(password)) = (parts.next(), parts.next()) else {
                    println!("usage: login <email> <password>");
                    continue;
                };
                match app.client.session.login(email, password).await {
                    Ok(()) => println!("logged in"),
                    Err(e) => println!("login failed: {}", e.detail().unwrap_or_else(|| e.to_string())),
                }
            }
            "logout" => {
                leave_room(&app).await;
                cancel_queue(&app).await;
                app.client.session.logout();
            }
            "queue" => join_queue(&app).await,
            "cancel" => cancel_queue(&app).await,
            "say" => {
                let text = parts.collect::<Vec<_>>().join(" ");
                let room = app.room.lock().await.clone();
                match room {
                    Some(room) => room.send(&text).await,
                    None => println!("not in a chatroom"),
                }
            }
            "like" => {
                let Some(user_id) = parts.next().and_then(|s| s.parse().ok()) else {
                    println!("usage: like <user_id>");
                    continue;
                };
                let room = app.room.lock().await.clone();
                match room {
                    Some(room) => room.toggle_like(user_id).await,
                    None => println!("not in a chatroom"),
                }
            }
            "members" => {
                let room = app.room.lock().await.clone();
                match room {
                    Some(room) => {
                        let snapshot = room.snapshot();
                        for member in &snapshot.members {
                            let liked = snapshot.likes.get(&member.user_id).copied().unwrap_or(false);
                            let me = snapshot.self_user_id == Some(member.user_id);
                            println!(
                                "{} {} {}{}",
                                member.user_id,
                                member.firstname,
                                member.lastname,
                                if me { " (you)" } else if liked { " [liked]" } else { "" },
                            );
                        }
                    }
                    None => println!("not in a chatroom"),
                }
            }
            "leave" => leave_room(&app).await,
            "wake" => {
                // Stands in for the tab regaining visibility/focus.
                if let Some(queue) = app.queue.lock().await.clone() {
                    queue.handle_wake(WakeSignal::BecameVisible).await;
                }
                if let Some(room) = app.room.lock().await.clone() {
                    room.handle_wake(WakeSignal::BecameVisible).await;
                }
            }
            "whoami" => match app.client.store.user_id() {
                Some(id) => println!("user {id}"),
                None => println!("not logged in"),
            },
            "quit" | "exit" => break,
            "help" => print_help(),
            other => println!("unknown command: {other}"),
        }
    }

    leave_room(&app).await;
    cancel_queue(&app).await;
    Ok(())
}

async fn join_queue(app: &Arc<App>) {
    let screen = {
        let mut queue = app.queue.lock().await;
        if let Some(screen) = queue.as_ref() {
            Arc::clone(screen)
        } else {
            let (screen, mut events) = QueueScreen::new(
                Arc::clone(&app.client.session),
                Arc::clone(&app.client.store),
                Arc::clone(&app.client.http),
                app.client.shell.clone(),
                Arc::clone(&app.client.refresher),
                &app.client.config.ws_url,
            );
            let screen = Arc::new(screen);
            let pump = Arc::clone(&screen);
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    pump.handle_event(event).await;
                }
            });
            *queue = Some(Arc::clone(&screen));
            screen
        }
    };
    screen.join().await;
}

async fn cancel_queue(app: &Arc<App>) {
    if let Some(screen) = app.queue.lock().await.take() {
        screen.cancel().await;
    }
}

async fn enter_room(app: &Arc<App>, room_id: u64) {
    leave_room(app).await;
    let (screen, mut events) = ChatRoomScreen::new(
        room_id,
        Arc::clone(&app.client.store),
        Arc::clone(&app.client.http),
        app.client.shell.clone(),
        Arc::clone(&app.client.refresher),
        &app.client.config.ws_url,
    );
    let screen = Arc::new(screen);
    let pump = Arc::clone(&screen);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let lyncup_client::realtime::RealtimeEvent::ChatText(ref text) = event {
                println!("  {text}");
            }
            pump.apply(event);
        }
    });
    screen.enter().await;
    *app.room.lock().await = Some(screen);
}

async fn leave_room(app: &Arc<App>) {
    if let Some(screen) = app.room.lock().await.take() {
        screen.leave().await;
    }
}

fn print_help() {
    println!("commands: login <email> <pw> | logout | queue | cancel | say <msg> | like <id> | members | leave | wake | whoami | quit");
}
