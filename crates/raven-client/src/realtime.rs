use futures_util::{SinkExt, StreamExt};
use raven_types::api::{CHANNEL_DOCTYPE, MESSAGE_DOCTYPE, POLL_DOCTYPE, USER_DOCTYPE};
use raven_types::events::{RealtimeCommand, RealtimeEvent};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::lists::ListKind;
use crate::state::{ClientState, ClientStateInner};

/// Invalidate whatever `event` makes out of date. Stale entries are
/// re-fetched in full by the next reader; only presence is patched in place.
pub fn apply_event(state: &ClientStateInner, event: &RealtimeEvent) {
    trace!("Realtime event {:?}", event);
    match event {
        RealtimeEvent::DocUpdate { doctype, name } => match doctype.as_str() {
            POLL_DOCTYPE => state.polls.invalidate(name),
            CHANNEL_DOCTYPE => state.directory.invalidate_channels(),
            USER_DOCTYPE => state.directory.invalidate_users(),
            MESSAGE_DOCTYPE => {
                invalidate_feeds_holding(state, name);
                invalidate_lists_holding(state, name);
            }
            other => debug!("Ignoring update of {} {}", other, name),
        },
        RealtimeEvent::MessageCreated { channel_id, .. } => {
            state.feeds.invalidate(channel_id);
            // Reply counts and unread badges of threads move with new messages.
            state.lists.invalidate_where(|k| k.kind == ListKind::Threads);
        }
        RealtimeEvent::MessageEdited {
            channel_id,
            message_id,
        }
        | RealtimeEvent::MessageDeleted {
            channel_id,
            message_id,
        }
        | RealtimeEvent::MessageReacted {
            channel_id,
            message_id,
        } => {
            state.feeds.invalidate(channel_id);
            invalidate_lists_holding(state, message_id);
        }
        RealtimeEvent::PresenceUpdate { user_id, presence } => {
            if !state.directory.set_presence(user_id, *presence) {
                trace!("Presence for unknown user {}", user_id);
            }
        }
    }
}

fn invalidate_feeds_holding(state: &ClientStateInner, message_id: &str) {
    for key in state.feeds.keys() {
        if state.feeds.with(&key, |f| f.contains(message_id)) == Some(true) {
            state.feeds.invalidate(&key);
        }
    }
}

fn invalidate_lists_holding(state: &ClientStateInner, message_id: &str) {
    for key in state.lists.keys() {
        let holds = state
            .lists
            .with(&key, |items| items.iter().any(|i| i.message_id() == message_id));
        if holds == Some(true) {
            state.lists.invalidate(&key);
        }
    }
}

/// Connect to the realtime bus, subscribe to `channel_ids` and apply
/// events until the server closes the connection.
pub async fn listen(state: ClientState, url: String, channel_ids: Vec<String>) -> Result<()> {
    let (socket, _) = connect_async(url.as_str()).await?;
    let (mut sender, mut receiver) = socket.split();
    info!("Connected to realtime bus at {}", url);

    let subscribe = RealtimeCommand::Subscribe { channel_ids };
    sender
        .send(Message::Text(serde_json::to_string(&subscribe)?.into()))
        .await?;

    while let Some(frame) = receiver.next().await {
        match frame? {
            Message::Text(text) => match serde_json::from_str::<RealtimeEvent>(text.as_str()) {
                Ok(event) => apply_event(&state, &event),
                Err(e) => warn!(
                    "Bad realtime frame: {} -- raw: {}",
                    e,
                    text.chars().take(200).collect::<String>()
                ),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!("Realtime connection to {} closed", url);
    Ok(())
}
