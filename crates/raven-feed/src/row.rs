use chrono::NaiveDate;
use raven_types::models::{Message, MessageType};

/// One renderable unit of a chat feed.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderRow {
    Message(Message),
    DateSeparator(NaiveDate),
    System(Message),
    /// Placeholder shown instead of an empty feed (channel or thread intro)
    Intro { channel_id: String, is_thread: bool },
}

impl RenderRow {
    /// Stable key for list virtualization.
    pub fn key(&self) -> String {
        match self {
            Self::Message(m) | Self::System(m) => m.name.clone(),
            Self::DateSeparator(date) => format!("date-{}", date),
            Self::Intro { channel_id, .. } => format!("intro-{}", channel_id),
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) | Self::System(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_date_separator(&self) -> bool {
        matches!(self, Self::DateSeparator(_))
    }
}

impl From<Message> for RenderRow {
    fn from(message: Message) -> Self {
        match message.message_type {
            MessageType::System => Self::System(message),
            _ => Self::Message(message),
        }
    }
}
