use std::collections::HashMap;

use raven_types::models::{Message, MessageType, PollData};

use crate::row::RenderRow;
use crate::text::{first_url, plain_text};

/// Pixel constants for the initial layout hint. The list widget still
/// measures real rows; these only pre-allocate scroll offsets.
#[derive(Debug, Clone)]
pub struct HeightModel {
    pub date_separator: f32,
    pub system_message: f32,
    pub intro: f32,
    /// Avatar + name line of a message that starts a group
    pub header: f32,
    /// Padding of a continuation message (no header)
    pub continuation: f32,
    pub forwarded: f32,
    pub pinned: f32,
    pub edited: f32,
    pub reply_box: f32,
    /// Poll card without options: question, footer
    pub poll: f32,
    pub poll_option: f32,
    /// Options assumed for a poll whose data is not loaded yet
    pub poll_options_assumed: usize,
    pub file: f32,
    pub image_default: f32,
    pub image_min: f32,
    pub image_max: f32,
    pub image_max_width: f32,
    pub doctype_link: f32,
    pub link_preview: f32,
    pub reactions: f32,
    pub thread_summary: f32,
    pub line_height: f32,
    pub chars_per_line: usize,
}

impl Default for HeightModel {
    fn default() -> Self {
        Self {
            date_separator: 32.0,
            system_message: 28.0,
            intro: 120.0,
            header: 28.0,
            continuation: 4.0,
            forwarded: 18.0,
            pinned: 18.0,
            edited: 0.0,
            reply_box: 56.0,
            poll: 100.0,
            poll_option: 40.0,
            poll_options_assumed: 3,
            file: 64.0,
            image_default: 200.0,
            image_min: 60.0,
            image_max: 360.0,
            image_max_width: 360.0,
            doctype_link: 132.0,
            link_preview: 96.0,
            reactions: 30.0,
            thread_summary: 34.0,
            line_height: 22.0,
            chars_per_line: 60,
        }
    }
}

impl HeightModel {
    /// Adjust `chars_per_line` to a viewport width, assuming ~7px glyphs.
    pub fn for_width(width: f32) -> Self {
        let chars = (width / 7.0).floor();
        Self {
            chars_per_line: if chars.is_finite() && chars >= 10.0 { chars as usize } else { 10 },
            ..Self::default()
        }
    }

    fn text_height(&self, html: &str) -> f32 {
        let text = plain_text(html);
        if text.is_empty() {
            return 0.0;
        }
        let per_line = self.chars_per_line.max(1);
        let lines: usize = text
            .lines()
            .map(|line| line.chars().count().div_ceil(per_line).max(1))
            .sum();
        lines as f32 * self.line_height
    }

    fn image_height(&self, message: &Message) -> f32 {
        match (message.image_width, message.image_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => {
                let scale = (self.image_max_width / w as f32).min(1.0);
                (h as f32 * scale).clamp(self.image_min, self.image_max)
            }
            _ => self.image_default,
        }
    }

    pub fn poll_height(&self, options: Option<usize>) -> f32 {
        let options = options.unwrap_or(self.poll_options_assumed);
        self.poll + self.poll_option * options as f32
    }

    fn message_height(&self, message: &Message, polls: &HashMap<String, PollData>) -> f32 {
        let mut height = if message.is_continuation {
            self.continuation
        } else {
            self.header
        };

        if message.is_forwarded {
            height += self.forwarded;
        }
        if message.is_pinned {
            height += self.pinned;
        }
        if message.is_edited {
            height += self.edited;
        }
        if message.is_reply() {
            height += self.reply_box;
        }

        height += match message.message_type {
            MessageType::Text => {
                let html = message.text.as_deref().unwrap_or("");
                let mut body = self.text_height(html);
                if message.has_doctype_link() {
                    body += self.doctype_link;
                } else if !message.hide_link_preview && first_url(html).is_some() {
                    body += self.link_preview;
                }
                body
            }
            MessageType::Image => self.image_height(message),
            MessageType::File => self.file,
            MessageType::Poll => {
                let options = message
                    .poll_id
                    .as_ref()
                    .and_then(|id| polls.get(id))
                    .map(|data| data.poll.options.len());
                self.poll_height(options)
            }
            MessageType::System => self.system_message,
        };

        if message.reactions.as_ref().is_some_and(|r| !r.is_empty()) {
            height += self.reactions;
        }
        if message.is_thread {
            height += self.thread_summary;
        }

        height
    }
}

/// Initial height hint for a row. Missing rows get 0; the result is never
/// negative or NaN.
pub fn estimate_height(row: Option<&RenderRow>, model: &HeightModel) -> f32 {
    estimate_height_with(row, model, &HashMap::new())
}

/// `estimate_height`, sizing poll cards by the options of loaded polls
/// (poll id -> data).
pub fn estimate_height_with(
    row: Option<&RenderRow>,
    model: &HeightModel,
    polls: &HashMap<String, PollData>,
) -> f32 {
    let Some(row) = row else {
        return 0.0;
    };

    let height = match row {
        RenderRow::DateSeparator(_) => model.date_separator,
        RenderRow::System(_) => model.system_message,
        RenderRow::Intro { .. } => model.intro,
        RenderRow::Message(message) => model.message_height(message, polls),
    };

    if height.is_finite() { height.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{message, message_of};
    use chrono::NaiveDate;

    #[test]
    fn missing_row_is_zero() {
        assert_eq!(estimate_height(None, &HeightModel::default()), 0.0);
    }

    #[test]
    fn fixed_rows() {
        let model = HeightModel::default();
        let date = RenderRow::DateSeparator(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(estimate_height(Some(&date), &model), model.date_separator);
        let system = RenderRow::from(message_of("s", "2024-01-01 10:00:00", MessageType::System));
        assert_eq!(estimate_height(Some(&system), &model), model.system_message);
    }

    #[test]
    fn longer_text_is_taller() {
        let model = HeightModel::default();
        let mut short = message("a", "2024-01-01 10:00:00");
        short.text = Some("<p>hi</p>".into());
        let mut long = short.clone();
        long.text = Some(format!("<p>{}</p>", "word ".repeat(80)));

        let short_h = estimate_height(Some(&RenderRow::Message(short)), &model);
        let long_h = estimate_height(Some(&RenderRow::Message(long)), &model);
        assert_eq!(short_h, model.header + model.line_height);
        assert!(long_h > short_h);
    }

    #[test]
    fn decorations_add_up() {
        let model = HeightModel::default();
        let base = message("a", "2024-01-01 10:00:00");
        let base_h = estimate_height(Some(&RenderRow::Message(base.clone())), &model);

        let mut decorated = base;
        decorated.is_forwarded = true;
        decorated.is_pinned = true;
        decorated.linked_message = Some("m0".into());
        let h = estimate_height(Some(&RenderRow::Message(decorated)), &model);
        assert_eq!(h, base_h + model.forwarded + model.pinned + model.reply_box);
    }

    #[test]
    fn link_preview_respects_hide_flag() {
        let model = HeightModel::default();
        let mut msg = message("a", "2024-01-01 10:00:00");
        msg.text = Some("<p>https://example.com/page</p>".into());
        let shown = estimate_height(Some(&RenderRow::Message(msg.clone())), &model);
        msg.hide_link_preview = true;
        let hidden = estimate_height(Some(&RenderRow::Message(msg)), &model);
        assert_eq!(shown - hidden, model.link_preview);
    }

    #[test]
    fn image_scales_and_clamps() {
        let model = HeightModel::default();
        let mut img = message_of("i", "2024-01-01 10:00:00", MessageType::Image);
        img.image_width = Some(720);
        img.image_height = Some(400);
        let h = estimate_height(Some(&RenderRow::Message(img.clone())), &model);
        assert_eq!(h, model.header + 200.0);

        img.image_height = Some(5000);
        img.image_width = Some(100);
        let tall = estimate_height(Some(&RenderRow::Message(img)), &model);
        assert_eq!(tall, model.header + model.image_max);
    }

    #[test]
    fn poll_grows_with_its_options() {
        let model = HeightModel::default();
        let mut msg = message_of("p", "2024-01-01 10:00:00", MessageType::Poll);
        msg.poll_id = Some("p1".into());
        let row = RenderRow::Message(msg);

        let unknown = estimate_height(Some(&row), &model);
        assert_eq!(unknown, model.header + model.poll + 3.0 * model.poll_option);

        let data: PollData = serde_json::from_value(serde_json::json!({
            "poll": {
                "name": "p1",
                "question": "Lunch?",
                "options": [
                    { "name": "o1", "option": "Pizza" },
                    { "name": "o2", "option": "Salad" },
                    { "name": "o3", "option": "Soup" },
                    { "name": "o4", "option": "Tacos" },
                    { "name": "o5", "option": "Curry" }
                ]
            },
            "current_user_votes": []
        }))
        .unwrap();
        let polls = HashMap::from([("p1".to_string(), data)]);
        let known = estimate_height_with(Some(&row), &model, &polls);
        assert_eq!(known, model.header + model.poll + 5.0 * model.poll_option);
        assert!(known > unknown);
    }

    #[test]
    fn never_negative() {
        let model = HeightModel {
            header: -500.0,
            continuation: f32::NAN,
            ..HeightModel::default()
        };
        let mut msg = message("a", "2024-01-01 10:00:00");
        assert_eq!(estimate_height(Some(&RenderRow::Message(msg.clone())), &model), 0.0);
        msg.is_continuation = true;
        assert_eq!(estimate_height(Some(&RenderRow::Message(msg)), &model), 0.0);
    }

    #[test]
    fn empty_and_odd_messages_do_not_panic() {
        let model = HeightModel { chars_per_line: 0, ..HeightModel::default() };
        let mut msg = message("a", "2024-01-01 10:00:00");
        msg.text = None;
        assert!(estimate_height(Some(&RenderRow::Message(msg)), &model) >= 0.0);
        assert_eq!(HeightModel::for_width(0.0).chars_per_line, 10);
    }
}
