//! Terminal chat client.
//!
//! Lines typed on stdin are sent to the current room; `/join <room>`
//! switches rooms. Logs go to stderr, conversation output to stdout.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use parley_chat_client::{ChatClient, ChatEvent, NotificationPresenter, Route};
use parley_protocol::ChatMessage;

use crate::config::{CliConfig, Profile};

#[derive(Parser)]
#[command(name = "parley-chat")]
#[command(about = "Terminal client for the Parley chat server", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/parley/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chat server base URL (http, https, ws or wss)
    #[arg(long)]
    server: Option<String>,

    /// Site key sent with the connection
    #[arg(long)]
    site_key: Option<String>,

    /// Access token
    #[arg(long)]
    token: Option<String>,

    /// Room to join after connecting
    #[arg(long)]
    room: Option<String>,

    /// Client preset
    #[arg(long, value_enum)]
    profile: Option<Profile>,
}

/// Prints notifications to stderr.
struct StderrPresenter;

impl NotificationPresenter for StderrPresenter {
    fn present(&self, title: &str, body: &str) {
        eprintln!("[{title}] {body}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_chat_client=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => CliConfig::load_from(path)?,
        None => CliConfig::load()?,
    };
    if let Some(server) = cli.server {
        cfg.server_url = server;
    }
    if let Some(site_key) = cli.site_key {
        cfg.site_key = site_key;
    }
    if let Some(token) = cli.token {
        cfg.access_token = Some(token);
    }
    if let Some(profile) = cli.profile {
        cfg.profile = profile;
    }

    let token = cfg.access_token.clone();
    let client = Arc::new(
        ChatClient::builder(cfg.client_config())
            .token_provider(move || token.clone())
            .presenter(Arc::new(StderrPresenter))
            .build(),
    );

    let mut events = client
        .take_events()
        .await
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;
    let printer = {
        let client = client.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                print_event(&client, event);
            }
        })
    };

    client.reconnect().await?;
    let mut room = cli.room;
    if let Some(room_id) = &room {
        client.join_room(room_id).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/join", room_id) if !room_id.trim().is_empty() => {
                let room_id = room_id.trim().to_string();
                client.router().reset_room(&room_id);
                let sent = client.join_room(&room_id).await;
                room = Some(room_id);
                sent
            }
            ("/dismiss", _) => {
                client.dismiss_notification();
                Ok(())
            }
            ("/rooms", _) => {
                let snapshot = client.router().snapshot();
                let mut rooms: Vec<_> = snapshot.rooms().collect();
                rooms.sort_unstable_by_key(|(id, _)| *id);
                for (room_id, messages) in rooms {
                    println!("  {room_id:<24} {} message(s)", messages.len());
                }
                Ok(())
            }
            _ => client
                .send_talk(ChatMessage::text(line, room.clone()))
                .await
                .map(|_: Route| ()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "send failed");
            eprintln!("! {e}");
        }
    }

    client.close();
    printer.abort();
    Ok(())
}

fn print_event(client: &ChatClient, event: ChatEvent) {
    match event {
        ChatEvent::StateChanged(state) => eprintln!("-- {state:?}"),
        ChatEvent::MessageAppended { room_id } => {
            let messages = client.router().room_messages(&room_id);
            if let Some(msg) = messages.last().filter(|m| !m.user) {
                let who = msg.user_name.as_deref().unwrap_or("them");
                println!("[{room_id}] {} {who}: {}", msg.time, msg.text);
                for file in &msg.files {
                    println!("    attachment: {} <{}>", file.name, file.url);
                }
            }
        }
        ChatEvent::HistoryPrepended { .. } => {}
        ChatEvent::RoomReset { room_id } => eprintln!("-- room {room_id} cleared"),
        ChatEvent::ServerNotify(msg) => {
            if let Some(counts) = &msg.message {
                eprintln!("-- {} unread", counts.total_unread);
            }
        }
        ChatEvent::ServerReply(reply) => eprintln!("-- server: {reply}"),
    }
}
