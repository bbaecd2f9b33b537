use raven_feed::{ListFilter, PageState, Pager, RenderRow};
use raven_types::api::{ListRequest, methods};
use raven_types::models::{Message, Reminder, ThreadMessage};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::state::ClientState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Threads,
    Pinned,
    Saved,
    Reminders,
}

impl ListKind {
    fn method(self) -> &'static str {
        match self {
            Self::Threads => methods::GET_THREADS,
            Self::Pinned => methods::GET_PINNED_MESSAGES,
            Self::Saved => methods::GET_SAVED_MESSAGES,
            Self::Reminders => methods::GET_REMINDERS,
        }
    }

    /// Pinned messages come back in one go.
    fn is_paginated(self) -> bool {
        !matches!(self, Self::Pinned)
    }

    fn title(self) -> &'static str {
        match self {
            Self::Threads => "threads",
            Self::Pinned => "pinned messages",
            Self::Saved => "saved messages",
            Self::Reminders => "reminders",
        }
    }
}

/// Cache key of one list screen: what is listed and how it is filtered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListKey {
    pub kind: ListKind,
    pub filter: ListFilter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Thread(ThreadMessage),
    Message(Message),
    Reminder(Reminder),
}

impl ListItem {
    pub fn key(&self) -> &str {
        match self {
            Self::Thread(t) => &t.message.name,
            Self::Message(m) => &m.name,
            Self::Reminder(r) => &r.name,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Thread(t) => Some(&t.message),
            Self::Message(m) => Some(m),
            Self::Reminder(r) => r.message.as_ref(),
        }
    }

    pub fn message_mut(&mut self) -> Option<&mut Message> {
        match self {
            Self::Thread(t) => Some(&mut t.message),
            Self::Message(m) => Some(m),
            Self::Reminder(r) => r.message.as_mut(),
        }
    }

    /// Id of the message this item is about.
    pub fn message_id(&self) -> &str {
        match self {
            Self::Reminder(r) => &r.message_id,
            _ => self.key(),
        }
    }

    fn matches(&self, filter: &ListFilter) -> bool {
        match self {
            Self::Thread(t) => filter.matches_thread(t),
            Self::Message(m) => filter.matches_message(m),
            Self::Reminder(r) => r.message.as_ref().is_none_or(|m| filter.matches_message(m)),
        }
    }
}

/// A paginated, filtered list screen (threads, pinned, saved, reminders).
/// Items live in the shared cache so mutations elsewhere patch them too.
pub struct ListScreen {
    state: ClientState,
    key: ListKey,
    pager: Pager,
    /// Items fetched so far, before client-side filtering.
    offset: u32,
}

impl ListScreen {
    pub fn new(state: ClientState, kind: ListKind, filter: ListFilter) -> Self {
        Self {
            state,
            key: ListKey { kind, filter },
            pager: Pager::new(),
            offset: 0,
        }
    }

    pub fn key(&self) -> &ListKey {
        &self.key
    }

    pub fn page_state(&self) -> PageState {
        self.pager.state()
    }

    /// True once a mutation or realtime event has marked the list out of date.
    pub fn is_stale(&self) -> bool {
        self.state.lists.is_stale(&self.key)
    }

    pub fn items(&self) -> Vec<ListItem> {
        self.state.lists.get(&self.key).unwrap_or_default()
    }

    /// Rows for the shared list renderer, in list order.
    pub fn rows(&self) -> Vec<RenderRow> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                ListItem::Thread(t) => Some(t.message),
                ListItem::Message(m) => Some(m),
                ListItem::Reminder(r) => r.message,
            })
            .map(RenderRow::from)
            .collect()
    }

    pub fn should_load_more(&self, distance_to_edge: f32, threshold: f32) -> bool {
        self.pager.should_load_more(distance_to_edge, threshold)
    }

    /// Fetch the first page again and replace what is loaded. The old
    /// items stay until the new page arrives and survive a failed refresh.
    pub async fn refresh(&mut self) -> Result<bool> {
        match self.fetch_page(0).await {
            Ok(page) => {
                self.pager.reset();
                self.pager.begin();
                self.offset = 0;
                self.record_page(page.len());

                let mut items = Vec::new();
                merge_page(&mut items, page, &self.key.filter);
                self.state.lists.insert(self.key.clone(), items);
                debug!("Refreshed {} ({:?})", self.key.kind.title(), self.pager.state());
                Ok(true)
            }
            Err(e) => {
                self.state
                    .notifier
                    .error(&format!("Could not refresh {}", self.key.kind.title()), &e);
                Err(e)
            }
        }
    }

    fn record_page(&mut self, raw_len: usize) {
        self.offset += raw_len as u32;
        let counted = if self.key.kind.is_paginated() { raw_len } else { 0 };
        self.pager.complete(counted, self.state.page_size);
    }

    /// Fetch the next page. Returns false without a request once the list
    /// is exhausted or while a fetch is running.
    pub async fn load_more(&mut self) -> Result<bool> {
        if !self.pager.begin() {
            return Ok(false);
        }

        match self.fetch_page(self.offset).await {
            Ok(page) => {
                let raw_len = page.len();
                self.record_page(raw_len);

                let filter = &self.key.filter;
                self.state.lists.upsert_with(self.key.clone(), Vec::new, |items| {
                    merge_page(items, page, filter)
                });
                debug!(
                    "Loaded {} {} ({:?})",
                    raw_len,
                    self.key.kind.title(),
                    self.pager.state()
                );
                Ok(true)
            }
            Err(e) => {
                self.pager.fail();
                self.state
                    .notifier
                    .error(&format!("Could not load {}", self.key.kind.title()), &e);
                Err(e)
            }
        }
    }

    async fn fetch_page(&self, start_after: u32) -> Result<Vec<ListItem>> {
        let filter = &self.key.filter;
        let request = ListRequest {
            channel_id: filter.channel_id.clone(),
            content: filter.search_text().map(str::to_string),
            only_show_unread: filter.unread_only,
            is_ai_thread: filter.ai_only,
            start_after,
            limit: self.state.page_size,
        };
        let rpc = &*self.state.rpc;
        let method = self.key.kind.method();

        let items: Vec<ListItem> = match self.key.kind {
            ListKind::Threads => rpc
                .get::<Vec<ThreadMessage>, _>(method, &request)
                .await?
                .into_iter()
                .map(ListItem::Thread)
                .collect(),
            ListKind::Pinned => {
                if request.channel_id.is_none() {
                    return Err(ClientError::Validation(
                        "Pinned messages are listed per channel".into(),
                    ));
                }
                rpc.get::<Vec<Message>, _>(method, &request)
                    .await?
                    .into_iter()
                    .map(ListItem::Message)
                    .collect()
            }
            ListKind::Saved => rpc
                .get::<Vec<Message>, _>(method, &request)
                .await?
                .into_iter()
                .map(ListItem::Message)
                .collect(),
            ListKind::Reminders => rpc
                .get::<Vec<Reminder>, _>(method, &request)
                .await?
                .into_iter()
                .map(ListItem::Reminder)
                .collect(),
        };
        Ok(items)
    }
}

/// Append the items of `page` that pass `filter`, replacing ones already
/// listed under the same key.
fn merge_page(items: &mut Vec<ListItem>, page: Vec<ListItem>, filter: &ListFilter) {
    for item in page.into_iter().filter(|i| i.matches(filter)) {
        match items.iter_mut().find(|i| i.key() == item.key()) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
    }
}
