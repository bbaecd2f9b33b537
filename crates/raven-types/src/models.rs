use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Timestamp format used by the backend for `creation` and friends.
/// Stored without a timezone, in the site's local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// -- Users & channels --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id (the backend's `name`, usually an email address)
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub user_image: Option<String>,
    #[serde(default, with = "flag")]
    pub is_bot_user: bool,
    #[serde(default)]
    pub presence: Presence,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Active,
    Away,
    #[default]
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    Public,
    Private,
    Open,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub channel_name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(default, with = "flag")]
    pub is_direct_message: bool,
    #[serde(default, with = "flag")]
    pub is_archived: bool,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub last_message_timestamp: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMember {
    /// User id of the member
    pub user_id: String,
    #[serde(default, with = "flag")]
    pub is_admin: bool,
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Text,
    Image,
    File,
    Poll,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub reaction: String,
    #[serde(default)]
    pub users: Vec<String>,
    pub count: u32,
}

/// Summary of the message a reply points at, as embedded by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepliedMessage {
    pub owner: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    pub message_type: MessageType,
    #[serde(with = "timestamp")]
    pub creation: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    pub owner: String,
    #[serde(default, with = "flag")]
    pub is_bot_message: bool,
    #[serde(default)]
    pub bot: Option<String>,
    pub channel_id: String,
    pub message_type: MessageType,
    #[serde(with = "timestamp")]
    pub creation: NaiveDateTime,

    /// HTML body
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
    #[serde(default)]
    pub poll_id: Option<String>,
    #[serde(default)]
    pub link_doctype: Option<String>,
    #[serde(default)]
    pub link_document: Option<String>,

    #[serde(default, with = "flag")]
    pub is_edited: bool,
    #[serde(default, with = "flag")]
    pub is_pinned: bool,
    #[serde(default, with = "flag")]
    pub is_forwarded: bool,
    #[serde(default, with = "flag")]
    pub is_continuation: bool,
    #[serde(default, with = "flag")]
    pub hide_link_preview: bool,
    #[serde(default, with = "flag")]
    pub is_thread: bool,
    #[serde(default, with = "flag")]
    pub is_saved: bool,

    #[serde(default)]
    pub linked_message: Option<String>,
    #[serde(default, with = "embedded_json")]
    pub replied_message_details: Option<RepliedMessage>,
    #[serde(default, rename = "message_reactions", with = "embedded_json")]
    pub reactions: Option<BTreeMap<String, Reaction>>,
}

impl Message {
    /// Calendar day the message was created on.
    pub fn date(&self) -> NaiveDate {
        self.creation.date()
    }

    pub fn is_reply(&self) -> bool {
        self.linked_message.is_some()
    }

    pub fn has_doctype_link(&self) -> bool {
        self.link_doctype.is_some() && self.link_document.is_some()
    }

    /// Toggle `user`'s `emoji` reaction. Returns true if it was added.
    pub fn toggle_reaction(&mut self, emoji: &str, user: &str) -> bool {
        let reactions = self.reactions.get_or_insert_with(BTreeMap::new);
        let entry = reactions.entry(emoji.to_string()).or_insert_with(|| Reaction {
            reaction: emoji.to_string(),
            users: Vec::new(),
            count: 0,
        });

        let added = if let Some(pos) = entry.users.iter().position(|u| u == user) {
            entry.users.remove(pos);
            false
        } else {
            entry.users.push(user.to_string());
            true
        };
        entry.count = entry.users.len() as u32;

        if entry.count == 0 {
            reactions.remove(emoji);
        }
        added
    }
}

/// A thread root: a message plus its participants and reply count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(flatten)]
    pub message: Message,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub name: String,
    pub message_id: String,
    #[serde(with = "timestamp")]
    pub remind_at: NaiveDateTime,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

// -- Polls --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub name: String,
    pub option: String,
    #[serde(default)]
    pub votes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub name: String,
    pub question: String,
    pub options: Vec<PollOption>,
    #[serde(default, with = "flag")]
    pub is_multi_choice: bool,
    #[serde(default, with = "flag")]
    pub is_anonymous: bool,
    #[serde(default, with = "flag")]
    pub is_disabled: bool,
    #[serde(default)]
    pub total_votes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollVote {
    pub option: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollData {
    pub poll: Poll,
    #[serde(default)]
    pub current_user_votes: Vec<PollVote>,
}

impl PollData {
    pub fn has_voted(&self) -> bool {
        !self.current_user_votes.is_empty()
    }

    /// Count the current user's votes for `option_ids`.
    pub fn record_votes(&mut self, option_ids: &[String]) {
        for id in option_ids {
            if let Some(opt) = self.poll.options.iter_mut().find(|o| &o.name == id) {
                opt.votes += 1;
                self.poll.total_votes += 1;
                self.current_user_votes.push(PollVote { option: id.clone() });
            }
        }
    }

    /// Remove the current user's votes from the tallies.
    pub fn retract_votes(&mut self) {
        for vote in self.current_user_votes.drain(..) {
            if let Some(opt) = self.poll.options.iter_mut().find(|o| o.name == vote.option) {
                opt.votes = opt.votes.saturating_sub(1);
                self.poll.total_votes = self.poll.total_votes.saturating_sub(1);
            }
        }
    }
}

// -- serde helpers --

/// The backend sends check fields as 0/1 integers; accept booleans too.
pub mod flag {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match serde_json::Value::deserialize(d)? {
            serde_json::Value::Bool(b) => Ok(b),
            serde_json::Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
            serde_json::Value::Null => Ok(false),
            other => Err(de::Error::custom(format!("invalid check value: {}", other))),
        }
    }
}

pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
    }

    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer, de};

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) if !raw.is_empty() => super::parse(&raw).map(Some).map_err(de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}

/// Some fields are JSON documents stored as strings on the server
/// (`message_reactions`, `replied_message_details`). Accept either form.
pub mod embedded_json {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
    use serde_json::Value;

    pub fn serialize<S: Serializer, T: Serialize>(value: &Option<T>, s: S) -> Result<S::Ok, S::Error> {
        value.serialize(s)
    }

    pub fn deserialize<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => serde_json::from_str(&s).map(Some).map_err(de::Error::custom),
            Some(v) => serde_json::from_value(v).map(Some).map_err(de::Error::custom),
        }
    }
}
