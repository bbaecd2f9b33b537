use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{Channel, Message, timestamp};

/// Every whitelisted method answers with `{ "message": <payload> }`.
/// Methods returning nothing omit the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub message: Option<T>,
}

/// Error body the backend returns alongside a non-2xx status.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub exc_type: Option<String>,
    #[serde(default)]
    pub exception: Option<String>,
    /// JSON-encoded list of JSON-encoded `{ "message": ... }` objects.
    #[serde(default, rename = "_server_messages")]
    pub server_messages: Option<String>,
}

impl ErrorBody {
    /// Best human-readable message contained in the body.
    pub fn summary(&self) -> Option<String> {
        if let Some(raw) = &self.server_messages {
            let outer: Vec<String> = serde_json::from_str(raw).unwrap_or_default();
            let first = outer.iter().find_map(|m| {
                serde_json::from_str::<serde_json::Value>(m)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|s| s.as_str()).map(str::to_string))
            });
            if first.is_some() {
                return first;
            }
        }
        self.exception.clone().or_else(|| self.exc_type.clone())
    }
}

// -- Method names --

pub mod methods {
    pub const GET_MESSAGES: &str = "raven.api.chat_stream.get_messages";
    pub const SEND_MESSAGE: &str = "raven.api.raven_message.send_message";
    pub const FORWARD_MESSAGE: &str = "raven.api.raven_message.forward_message";
    pub const DELETE_DOC: &str = "frappe.client.delete";
    pub const REACT: &str = "raven.api.reactions.react";
    pub const SAVE_MESSAGE: &str = "raven.api.raven_message.save_message";
    pub const GET_SAVED_MESSAGES: &str = "raven.api.raven_message.get_saved_messages";
    pub const TOGGLE_PIN: &str = "raven.api.raven_channel.toggle_pinned_message";
    pub const GET_PINNED_MESSAGES: &str = "raven.api.raven_channel.get_pinned_messages";
    pub const GET_POLL: &str = "raven.api.raven_poll.get_poll";
    pub const ADD_VOTE: &str = "raven.api.raven_poll.add_vote";
    pub const RETRACT_VOTE: &str = "raven.api.raven_poll.retract_vote";
    pub const CREATE_THREAD: &str = "raven.api.threads.create_thread";
    pub const GET_THREADS: &str = "raven.api.threads.get_all_threads";
    pub const GET_REMINDERS: &str = "raven.api.reminders.get_reminders";
    pub const GET_USERS: &str = "raven.api.raven_users.get_list";
    pub const GET_CHANNELS: &str = "raven.api.raven_channel.get_all_channels";
    pub const GET_CHANNEL_MEMBERS: &str = "raven.api.raven_channel_member.get_channel_members";
}

pub const MESSAGE_DOCTYPE: &str = "Raven Message";
pub const POLL_DOCTYPE: &str = "Raven Poll";
pub const CHANNEL_DOCTYPE: &str = "Raven Channel";
pub const USER_DOCTYPE: &str = "Raven User";

// -- Requests --

#[derive(Debug, Clone, Serialize)]
pub struct GetMessagesRequest {
    pub channel_id: String,
    pub limit: u32,
    /// Cursor: only messages created strictly before this timestamp.
    #[serde(skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub older_than: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct GetMessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub channel_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_message: Option<String>,
    /// 1 when `linked_message` is set.
    pub is_reply: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForwardMessageRequest {
    pub message_receivers: Vec<String>,
    pub forwarded_message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteDocRequest {
    pub doctype: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactRequest {
    pub message_id: String,
    pub reaction: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveMessageRequest {
    pub message_id: String,
    /// "Yes" to save, "No" to unsave.
    pub add: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TogglePinRequest {
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetPollRequest {
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddVoteRequest {
    pub message_id: String,
    pub option_id: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetractVoteRequest {
    pub poll_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateThreadRequest {
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateThreadResponse {
    pub thread_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub only_show_unread: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_ai_thread: bool,
    pub start_after: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetChannelsRequest {
    pub hide_archived: bool,
}

/// Channels come back split into regular and direct-message channels.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetChannelsResponse {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub dm_channels: Vec<Channel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelMembersRequest {
    pub channel_id: String,
}
