use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use raven_types::models::{Message, MessageType, PollData};

use crate::row::RenderRow;
use crate::text::{first_url, plain_text};

/// Which renderer a row goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    Text,
    Image,
    File,
    Poll,
    DocTypeLink,
    LinkPreview,
    System,
    DateSeparator,
    Intro,
}

impl RowKind {
    pub fn of(row: &RenderRow) -> Self {
        match row {
            RenderRow::DateSeparator(_) => Self::DateSeparator,
            RenderRow::Intro { .. } => Self::Intro,
            RenderRow::System(_) => Self::System,
            RenderRow::Message(message) => Self::of_message(message),
        }
    }

    fn of_message(message: &Message) -> Self {
        match message.message_type {
            MessageType::Image => Self::Image,
            MessageType::File => Self::File,
            MessageType::Poll => Self::Poll,
            MessageType::System => Self::System,
            MessageType::Text if message.has_doctype_link() => Self::DocTypeLink,
            MessageType::Text if link_preview_url(message).is_some() => Self::LinkPreview,
            MessageType::Text => Self::Text,
        }
    }
}

fn link_preview_url(message: &Message) -> Option<&str> {
    if message.hide_link_preview {
        return None;
    }
    message.text.as_deref().and_then(first_url)
}

/// Key of auxiliary data a row needs besides the message itself.
/// Rows with the same key share one fetch and one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuxKey {
    Poll(String),
}

impl AuxKey {
    pub fn of(row: &RenderRow) -> Option<Self> {
        match row {
            RenderRow::Message(m) if m.message_type == MessageType::Poll => {
                m.poll_id.clone().map(Self::Poll)
            }
            _ => None,
        }
    }
}

impl fmt::Display for AuxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll(id) => write!(f, "poll:{}", id),
        }
    }
}

/// What a poll card shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollView {
    Voting,
    Results,
}

impl PollView {
    /// Results once the user has voted or the poll is closed.
    pub fn of(data: &PollData) -> Self {
        if data.has_voted() || data.poll.is_disabled {
            Self::Results
        } else {
            Self::Voting
        }
    }
}

/// One method per row kind. Renderers read rows; they never modify them.
pub trait RowRenderer {
    type Output;

    fn text(&mut self, message: &Message) -> Self::Output;
    fn image(&mut self, message: &Message) -> Self::Output;
    fn file(&mut self, message: &Message) -> Self::Output;
    fn poll(&mut self, message: &Message) -> Self::Output;
    fn doctype_link(&mut self, message: &Message) -> Self::Output;
    fn link_preview(&mut self, message: &Message, url: &str) -> Self::Output;
    fn system(&mut self, message: &Message) -> Self::Output;
    fn date_separator(&mut self, date: NaiveDate) -> Self::Output;
    fn intro(&mut self, channel_id: &str, is_thread: bool) -> Self::Output;
}

pub fn render_row<R: RowRenderer>(row: &RenderRow, renderer: &mut R) -> R::Output {
    match row {
        RenderRow::DateSeparator(date) => renderer.date_separator(*date),
        RenderRow::Intro { channel_id, is_thread } => renderer.intro(channel_id, *is_thread),
        RenderRow::System(message) => renderer.system(message),
        RenderRow::Message(message) => match RowKind::of_message(message) {
            RowKind::Image => renderer.image(message),
            RowKind::File => renderer.file(message),
            RowKind::Poll => renderer.poll(message),
            RowKind::DocTypeLink => renderer.doctype_link(message),
            RowKind::LinkPreview => match link_preview_url(message) {
                Some(url) => renderer.link_preview(message, url),
                None => renderer.text(message),
            },
            RowKind::System => renderer.system(message),
            RowKind::Text | RowKind::DateSeparator | RowKind::Intro => renderer.text(message),
        },
    }
}

/// Renders rows as terminal text.
pub struct PlainTextRenderer<'a> {
    /// user id -> full name
    pub users: &'a HashMap<String, String>,
    /// poll id -> poll data, filled by whoever fetched the aux data
    pub polls: &'a HashMap<String, PollData>,
}

impl<'a> PlainTextRenderer<'a> {
    pub fn new(users: &'a HashMap<String, String>, polls: &'a HashMap<String, PollData>) -> Self {
        Self { users, polls }
    }

    fn header(&self, message: &Message) -> String {
        let mut out = String::new();
        if !message.is_continuation {
            let author = self.users.get(&message.owner).unwrap_or(&message.owner);
            out.push_str(&format!("{}  {}\n", author, message.creation.format("%H:%M")));
        }
        if message.is_pinned {
            out.push_str("  [pinned]\n");
        }
        if message.is_forwarded {
            out.push_str("  [forwarded]\n");
        }
        if let Some(reply) = &message.replied_message_details {
            let quoted = reply.text.as_deref().map(plain_text).unwrap_or_default();
            let author = self.users.get(&reply.owner).unwrap_or(&reply.owner);
            out.push_str(&format!("  > {}: {}\n", author, quoted));
        }
        out
    }

    fn footer(&self, message: &Message) -> String {
        let mut out = String::new();
        if let Some(reactions) = message.reactions.as_ref().filter(|r| !r.is_empty()) {
            let chips: Vec<String> = reactions
                .values()
                .map(|r| format!("{} {}", r.reaction, r.count))
                .collect();
            out.push_str(&format!("\n  {}", chips.join("  ")));
        }
        if message.is_thread {
            out.push_str("\n  [thread]");
        }
        out
    }

    fn body(&self, message: &Message) -> String {
        let mut text = message.text.as_deref().map(plain_text).unwrap_or_default();
        if message.is_edited {
            text.push_str(" (edited)");
        }
        indent(&text)
    }

    fn wrap(&self, message: &Message, body: String) -> String {
        format!("{}{}{}", self.header(message), body, self.footer(message))
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("  {}", l)).collect::<Vec<_>>().join("\n")
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl RowRenderer for PlainTextRenderer<'_> {
    type Output = String;

    fn text(&mut self, message: &Message) -> String {
        self.wrap(message, self.body(message))
    }

    fn image(&mut self, message: &Message) -> String {
        let file = message.file.as_deref().map(file_name).unwrap_or("image");
        self.wrap(message, format!("  [image: {}]", file))
    }

    fn file(&mut self, message: &Message) -> String {
        let file = message.file.as_deref().map(file_name).unwrap_or("file");
        self.wrap(message, format!("  [file: {}]", file))
    }

    fn poll(&mut self, message: &Message) -> String {
        let data = message.poll_id.as_ref().and_then(|id| self.polls.get(id));
        let Some(data) = data else {
            return self.wrap(message, "  [poll: loading]".to_string());
        };

        let mut out = format!("  Poll: {}", data.poll.question);
        match PollView::of(data) {
            PollView::Voting => {
                let marker = if data.poll.is_multi_choice { "[ ]" } else { "( )" };
                for option in &data.poll.options {
                    out.push_str(&format!("\n    {} {}", marker, option.option));
                }
            }
            PollView::Results => {
                let total = data.poll.total_votes.max(1) as f32;
                for option in &data.poll.options {
                    let mine = data.current_user_votes.iter().any(|v| v.option == option.name);
                    out.push_str(&format!(
                        "\n    {}{} - {} ({:.0}%)",
                        if mine { "* " } else { "" },
                        option.option,
                        option.votes,
                        option.votes as f32 * 100.0 / total
                    ));
                }
                if data.poll.is_disabled {
                    out.push_str("\n    (poll closed)");
                }
            }
        }
        self.wrap(message, out)
    }

    fn doctype_link(&mut self, message: &Message) -> String {
        let mut body = self.body(message);
        if let (Some(doctype), Some(doc)) = (&message.link_doctype, &message.link_document) {
            body.push_str(&format!("\n  [{} {}]", doctype, doc));
        }
        self.wrap(message, body)
    }

    fn link_preview(&mut self, message: &Message, url: &str) -> String {
        let mut body = self.body(message);
        body.push_str(&format!("\n  [preview: {}]", url));
        self.wrap(message, body)
    }

    fn system(&mut self, message: &Message) -> String {
        let text = message.text.as_deref().map(plain_text).unwrap_or_default();
        format!("  -- {} --", text)
    }

    fn date_separator(&mut self, date: NaiveDate) -> String {
        format!("──── {} ────", date.format("%A, %d %B %Y"))
    }

    fn intro(&mut self, channel_id: &str, is_thread: bool) -> String {
        if is_thread {
            "This is the beginning of the thread.".to_string()
        } else {
            format!("This is the very beginning of #{}.", channel_id)
        }
    }
}
