//! chatwire terminal client.
//!
//! - Config: first argument (default `chatwire.yaml`)
//! - Credential: `CHATWIRE_TOKEN`, re-read before every reconnection attempt
//! - Optional initial room: `CHATWIRE_ROOM`
//!
//! Lines typed on stdin are sent to the active room. Commands:
//! `/join <room>`, `/leave`, `/reconnect`, `/online`, `/logout`.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use chatwire_client::credentials::{CredentialProvider, EnvCredentials};
use chatwire_client::{config, ChatClient, RoomId};
use chatwire_core::MessageKind;

const TOKEN_VAR: &str = "CHATWIRE_TOKEN";

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(code = e.code().as_str(), error = %e, "chatwire-client exited");
        std::process::exit(1);
    }
}

async fn run() -> chatwire_core::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "chatwire.yaml".into());
    let cfg = config::load_from_file(&path)?;

    let credentials = EnvCredentials::new(TOKEN_VAR);
    let token = credentials.credential().await?.ok_or_else(|| {
        chatwire_core::ChatwireError::Credential(format!("{TOKEN_VAR} is not set"))
    })?;

    let client = ChatClient::builder(cfg, credentials).build()?;

    let _states = client.on_connection_state_change(|state| {
        tracing::info!(%state, "connection state");
    });
    for kind in [
        MessageKind::NewMessage,
        MessageKind::UserJoined,
        MessageKind::UserLeft,
        MessageKind::UserTyping,
        MessageKind::MessageRead,
        MessageKind::PresenceUpdate,
        MessageKind::RoomInvited,
        MessageKind::Error,
    ] {
        let label = kind.clone();
        let _ = client.on(kind, move |payload, env| {
            tracing::info!(kind = %label, at = %env.timestamp(), %payload, "event");
        });
    }

    if client.offline_len() > 0 {
        tracing::info!(count = client.offline_len(), "unsent messages from a previous session");
    }
    if let Err(e) = client.connect(token).await {
        tracing::warn!(error = %e, "initial connect failed; retrying in background");
    }

    let mut room: Option<RoomId> = client.active_room();
    if let Some(r) = std::env::var("CHATWIRE_ROOM").ok().and_then(|v| v.parse().ok()) {
        client.join_room(r)?;
        room = Some(r);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                // leave storage as is; the next run picks the queue back up
                tracing::info!("interrupted");
                break;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !handle_line(&client, &mut room, line).await? {
                    break;
                }
            }
        }
    }

    if let Ok(stats) = client.queue_stats().await {
        tracing::info!(pending = stats.pending, offline = stats.offline, "exiting");
    }
    Ok(())
}

/// Returns false once the user logged out.
async fn handle_line(
    client: &ChatClient,
    room: &mut Option<RoomId>,
    line: &str,
) -> chatwire_core::Result<bool> {
    let mut parts = line.splitn(2, ' ');
    match parts.next() {
        Some("/join") => match parts.next().and_then(|r| r.trim().parse().ok()) {
            Some(r) => {
                client.join_room(r)?;
                *room = Some(r);
            }
            None => tracing::warn!("usage: /join <room id>"),
        },
        Some("/leave") => {
            if let Some(r) = room.take() {
                client.leave_room(r)?;
            }
        }
        Some("/reconnect") => {
            if let Err(e) = client.reconnect().await {
                tracing::warn!(error = %e, "reconnect failed");
            }
        }
        Some("/online") => client.notify_online(),
        Some("/logout") => {
            client.disconnect().await;
            return Ok(false);
        }
        _ => match room {
            Some(r) => client.send_message(*r, line, "text")?,
            None => tracing::warn!("no active room; /join <room id> first"),
        },
    }
    Ok(true)
}
