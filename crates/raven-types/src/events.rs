use serde::{Deserialize, Serialize};

use crate::models::Presence;

/// Events pushed by the real-time bus. The client treats them as
/// invalidation signals, never as data to merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RealtimeEvent {
    /// A document of `doctype` named `name` changed on the server
    DocUpdate { doctype: String, name: String },

    /// A new message was posted in a channel
    MessageCreated { channel_id: String, message_id: String },

    /// A message's content changed
    MessageEdited { channel_id: String, message_id: String },

    /// A message was deleted
    MessageDeleted { channel_id: String, message_id: String },

    /// Reactions on a message changed
    MessageReacted { channel_id: String, message_id: String },

    /// A user came online, went idle or went offline
    PresenceUpdate { user_id: String, presence: Presence },
}

impl RealtimeEvent {
    /// Returns the channel this event is scoped to, if any.
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::MessageCreated { channel_id, .. }
            | Self::MessageEdited { channel_id, .. }
            | Self::MessageDeleted { channel_id, .. }
            | Self::MessageReacted { channel_id, .. } => Some(channel_id),
            // DocUpdate and PresenceUpdate are global
            _ => None,
        }
    }
}

/// Commands sent FROM client TO the real-time bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RealtimeCommand {
    /// Subscribe to channel-scoped events
    Subscribe { channel_ids: Vec<String> },

    /// Subscribe to `DocUpdate` for a single document
    DocSubscribe { doctype: String, name: String },
}
