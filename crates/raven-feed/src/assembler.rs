use chrono::{Duration, NaiveDateTime};
use raven_types::models::Message;
use tracing::debug;

use crate::pagination::{PageState, Pager};
use crate::row::RenderRow;

/// Parameters for the next backward page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    /// Exclusive upper bound on `creation`; `None` for the newest page.
    pub older_than: Option<NaiveDateTime>,
    /// Generation of the assembler that issued the request.
    pub generation: u64,
}

/// Collects pages of a channel (or thread) and flattens them into rows.
///
/// Pages are fetched backward from the newest message. Messages are kept
/// sorted oldest first and unique by `name`: a message seen again in a later
/// page replaces the earlier copy, and pages arriving out of order still
/// land in creation order.
///
/// After a full page the cursor overlaps the oldest loaded timestamp by one
/// microsecond, so messages sharing that timestamp but cut off by the page
/// limit come back (as duplicates of the loaded ones, which collapse). An
/// overlapping page that brings nothing new drops back to a strict cursor.
///
/// Replacing an assembler with a fresh one (`supersede`) bumps its
/// generation; pages requested by the replaced one are then dropped.
#[derive(Debug, Clone)]
pub struct FeedAssembler {
    channel_id: String,
    is_thread: bool,
    page_size: u32,
    messages: Vec<Message>,
    pager: Pager,
    generation: u64,
    overlap: bool,
}

impl FeedAssembler {
    pub fn new(channel_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            channel_id: channel_id.into(),
            is_thread: false,
            page_size: page_size.max(1),
            messages: Vec::new(),
            pager: Pager::new(),
            generation: 0,
            overlap: false,
        }
    }

    pub fn for_thread(thread_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            is_thread: true,
            ..Self::new(thread_id, page_size)
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn state(&self) -> PageState {
        self.pager.state()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pager.is_exhausted()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Take the place of `previous`, invalidating its outstanding requests.
    pub fn supersede(mut self, previous: Option<&FeedAssembler>) -> Self {
        self.generation = previous.map_or(0, |p| p.generation + 1);
        self
    }

    /// Start the next backward fetch. Returns `None` once the channel is
    /// exhausted or while a fetch is already in flight.
    pub fn next_request(&mut self) -> Option<PageRequest> {
        if !self.pager.begin() {
            return None;
        }
        Some(PageRequest {
            limit: self.page_size,
            older_than: self.cursor(),
            generation: self.generation,
        })
    }

    /// Merge the answer to `request`. Returns false, merging nothing, when
    /// the request came from a superseded generation.
    pub fn push_response(&mut self, request: &PageRequest, page: Vec<Message>) -> bool {
        if request.generation != self.generation {
            debug!(
                "Feed {}: dropped page of {} from generation {} (now {})",
                self.channel_id,
                page.len(),
                request.generation,
                self.generation
            );
            return false;
        }
        self.push_page(page);
        true
    }

    /// A request failed: allow a retry unless it was superseded.
    pub fn request_failed(&mut self, request: &PageRequest) {
        if request.generation == self.generation {
            self.pager.fail();
        }
    }

    /// Merge a page as returned by the server (any order).
    pub fn push_page(&mut self, page: Vec<Message>) {
        let len = page.len();
        let mut added = 0;
        for message in page {
            if self.merge(message) {
                added += 1;
            }
        }
        self.sort();
        self.pager.complete(len, self.page_size);
        self.overlap = added > 0 && len >= self.page_size as usize;
        debug!(
            "Feed {}: merged page of {} ({} new, {} loaded, {:?})",
            self.channel_id,
            len,
            added,
            self.messages.len(),
            self.pager.state()
        );
    }

    fn cursor(&self) -> Option<NaiveDateTime> {
        let oldest = self.oldest_timestamp()?;
        Some(if self.overlap { oldest + Duration::microseconds(1) } else { oldest })
    }

    /// Drop everything; the next request fetches the newest page again.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.pager.reset();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, name: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn oldest_timestamp(&self) -> Option<NaiveDateTime> {
        self.messages.first().map(|m| m.creation)
    }

    /// Remove a message, returning it so it can be restored.
    pub fn remove(&mut self, name: &str) -> Option<Message> {
        let pos = self.messages.iter().position(|m| m.name == name)?;
        Some(self.messages.remove(pos))
    }

    /// Insert or replace a message, keeping creation order.
    pub fn upsert(&mut self, message: Message) {
        self.merge(message);
        self.sort();
    }

    /// Patch a message in place. Returns false if it is not loaded.
    pub fn update<F>(&mut self, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        match self.messages.iter_mut().find(|m| m.name == name) {
            Some(message) => {
                f(message);
                true
            }
            None => false,
        }
    }

    pub fn rows(&self) -> Vec<RenderRow> {
        if self.messages.is_empty() {
            return vec![RenderRow::Intro {
                channel_id: self.channel_id.clone(),
                is_thread: self.is_thread,
            }];
        }
        interleave_dates(&self.messages)
    }

    /// Returns true if the message was not loaded before.
    fn merge(&mut self, message: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.name == message.name) {
            Some(existing) => {
                *existing = message;
                false
            }
            None => {
                self.messages.push(message);
                true
            }
        }
    }

    fn sort(&mut self) {
        self.messages
            .sort_by(|a, b| a.creation.cmp(&b.creation).then_with(|| a.name.cmp(&b.name)));
    }
}

/// Flatten messages (oldest first) into rows, with one date separator
/// between every pair of adjacent messages on different calendar days.
pub fn interleave_dates(messages: &[Message]) -> Vec<RenderRow> {
    let mut rows = Vec::with_capacity(messages.len() + messages.len() / 8 + 1);
    let mut previous = None;

    for message in messages {
        let date = message.date();
        if previous.is_some_and(|p| p != date) {
            rows.push(RenderRow::DateSeparator(date));
        }
        previous = Some(date);
        rows.push(RenderRow::from(message.clone()));
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{message, message_of};
    use chrono::NaiveDate;
    use raven_types::models::MessageType;

    #[test]
    fn separator_between_days() {
        let mut feed = FeedAssembler::new("general", 50);
        let page = vec![
            message("e", "2024-05-02 10:05:00"),
            message("d", "2024-05-02 09:00:00"),
            message("c", "2024-05-01 17:30:00"),
            message("b", "2024-05-01 12:00:00"),
            message("a", "2024-05-01 08:00:00"),
        ];
        assert!(feed.next_request().is_some());
        feed.push_page(page);

        let rows = feed.rows();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[3], RenderRow::DateSeparator(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()));
        assert_eq!(rows.iter().filter(|r| r.is_date_separator()).count(), 1);
        assert_eq!(rows[2].key(), "c");
        assert_eq!(rows[4].key(), "d");
    }

    #[test]
    fn no_separator_within_a_day() {
        let rows = interleave_dates(&[
            message("a", "2024-05-01 00:00:01"),
            message("b", "2024-05-01 12:00:00"),
            message("c", "2024-05-01 23:59:59"),
        ]);
        assert!(rows.iter().all(|r| !r.is_date_separator()));
    }

    #[test]
    fn one_separator_per_boundary_even_across_gaps() {
        let rows = interleave_dates(&[
            message("a", "2024-05-01 10:00:00"),
            message("b", "2024-05-04 10:00:00"),
            message("c", "2024-05-09 10:00:00"),
        ]);
        let kinds: Vec<bool> = rows.iter().map(|r| r.is_date_separator()).collect();
        assert_eq!(kinds, vec![false, true, false, true, false]);
    }

    #[test]
    fn empty_feed_is_intro() {
        let feed = FeedAssembler::for_thread("t1", 20);
        assert_eq!(
            feed.rows(),
            vec![RenderRow::Intro { channel_id: "t1".into(), is_thread: true }]
        );
    }

    #[test]
    fn system_messages_get_their_own_row() {
        let rows = interleave_dates(&[message_of("s", "2024-05-01 10:00:00", MessageType::System)]);
        assert!(matches!(rows[0], RenderRow::System(_)));
    }

    #[test]
    fn cursor_walks_backward_until_short_page() {
        let mut feed = FeedAssembler::new("general", 2);

        let first = feed.next_request().unwrap();
        assert_eq!(first.older_than, None);
        feed.push_page(vec![
            message("d", "2024-05-02 10:00:00"),
            message("c", "2024-05-02 09:00:00"),
        ]);

        let second = feed.next_request().unwrap();
        assert_eq!(second.older_than, Some(feed.messages()[0].creation + Duration::microseconds(1)));
        feed.push_page(vec![message("b", "2024-05-01 09:00:00")]);

        assert!(feed.is_exhausted());
        assert_eq!(feed.next_request(), None);
    }

    #[test]
    fn superseded_requests_are_dropped() {
        let mut old = FeedAssembler::new("general", 2);
        old.next_request();
        old.push_page(vec![
            message("d", "2024-05-02 10:00:00"),
            message("c", "2024-05-02 09:00:00"),
        ]);
        let older = old.next_request().unwrap();

        let mut fresh = FeedAssembler::new("general", 2);
        fresh.next_request();
        fresh.push_page(vec![
            message("f", "2024-05-02 12:00:00"),
            message("e", "2024-05-02 11:00:00"),
        ]);
        let mut fresh = fresh.supersede(Some(&old));
        assert_eq!(fresh.generation(), 1);

        assert!(!fresh.push_response(&older, vec![message("b", "2024-05-02 08:00:00")]));
        fresh.request_failed(&older);
        let names: Vec<&str> = fresh.messages().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["e", "f"]);
        assert_eq!(fresh.state(), PageState::MoreAvailable);

        let next = fresh.next_request().unwrap();
        assert_eq!(next.older_than, Some(fresh.messages()[0].creation + Duration::microseconds(1)));
        assert!(fresh.push_response(&next, vec![message("d", "2024-05-02 10:00:00")]));
        assert!(fresh.is_exhausted());
    }

    #[test]
    fn messages_sharing_the_boundary_timestamp_are_not_skipped() {
        let at = |ts: &str| NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f").unwrap();
        let mut feed = FeedAssembler::new("general", 2);

        feed.next_request();
        feed.push_page(vec![
            message("d", "2024-05-02 10:00:00"),
            message("c", "2024-05-02 09:00:00"),
        ]);

        // b shares c's timestamp; the overlapping cursor still reaches it.
        let second = feed.next_request().unwrap();
        assert_eq!(second.older_than, Some(at("2024-05-02 09:00:00.000001")));
        feed.push_page(vec![
            message("c", "2024-05-02 09:00:00"),
            message("b", "2024-05-02 09:00:00"),
        ]);
        assert!(feed.contains("b"));

        // The same tied pair again: nothing new, so the cursor turns strict.
        let third = feed.next_request().unwrap();
        feed.push_page(vec![
            message("c", "2024-05-02 09:00:00"),
            message("b", "2024-05-02 09:00:00"),
        ]);
        assert_eq!(third.older_than, Some(at("2024-05-02 09:00:00.000001")));
        let fourth = feed.next_request().unwrap();
        assert_eq!(fourth.older_than, Some(at("2024-05-02 09:00:00")));
        feed.push_page(vec![message("a", "2024-05-02 08:00:00")]);

        let names: Vec<&str> = feed.messages().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert!(feed.is_exhausted());
    }

    #[test]
    fn duplicates_across_pages_collapse() {
        let mut feed = FeedAssembler::new("general", 2);
        feed.next_request();
        feed.push_page(vec![
            message("c", "2024-05-02 10:00:00"),
            message("b", "2024-05-02 09:00:00"),
        ]);
        feed.next_request();
        let mut edited = message("b", "2024-05-02 09:00:00");
        edited.is_edited = true;
        feed.push_page(vec![edited, message("a", "2024-05-02 08:00:00")]);

        let names: Vec<&str> = feed.messages().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(feed.get("b").unwrap().is_edited);
    }

    #[test]
    fn remove_and_upsert_keep_order() {
        let mut feed = FeedAssembler::new("general", 10);
        feed.push_page(vec![
            message("a", "2024-05-02 08:00:00"),
            message("b", "2024-05-02 09:00:00"),
        ]);

        let removed = feed.remove("a").unwrap();
        assert!(!feed.contains("a"));
        feed.upsert(removed);
        assert_eq!(feed.messages()[0].name, "a");
        assert!(feed.update("b", |m| m.is_pinned = true));
        assert!(!feed.update("zzz", |m| m.is_pinned = true));
    }
}
