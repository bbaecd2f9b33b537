use raven_types::models::{Message, ThreadMessage};
use serde::{Deserialize, Serialize};

use crate::text::plain_text;

/// Filter applied by the thread, pinned, saved and reminder screens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListFilter {
    pub channel_id: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub ai_only: bool,
}

impl ListFilter {
    pub fn channel(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: Some(channel_id.into()),
            ..Self::default()
        }
    }

    /// Search text, trimmed; `None` when blank.
    pub fn search_text(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn matches_message(&self, message: &Message) -> bool {
        if let Some(channel_id) = &self.channel_id {
            if &message.channel_id != channel_id {
                return false;
            }
        }
        if self.ai_only && !message.is_bot_message {
            return false;
        }
        match self.search_text() {
            Some(needle) => {
                let haystack = message.text.as_deref().map(plain_text).unwrap_or_default();
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
            None => true,
        }
    }

    pub fn matches_thread(&self, thread: &ThreadMessage) -> bool {
        if self.unread_only && thread.unread_count == 0 {
            return false;
        }
        self.matches_message(&thread.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::message;

    #[test]
    fn channel_and_search() {
        let msg = message("a", "2024-01-01 10:00:00");
        assert!(ListFilter::channel("general").matches_message(&msg));
        assert!(!ListFilter::channel("random").matches_message(&msg));

        let search = ListFilter { search: Some("  MESSAGE ".into()), ..Default::default() };
        assert!(search.matches_message(&msg));
        let miss = ListFilter { search: Some("deploy".into()), ..Default::default() };
        assert!(!miss.matches_message(&msg));
    }

    #[test]
    fn unread_and_ai_only() {
        let thread = ThreadMessage {
            message: message("t", "2024-01-01 10:00:00"),
            participants: vec!["ana@example.com".into()],
            reply_count: 3,
            unread_count: 0,
        };
        let unread = ListFilter { unread_only: true, ..Default::default() };
        assert!(!unread.matches_thread(&thread));

        let ai = ListFilter { ai_only: true, ..Default::default() };
        assert!(!ai.matches_thread(&thread));
        assert!(ListFilter::default().matches_thread(&thread));
    }
}
