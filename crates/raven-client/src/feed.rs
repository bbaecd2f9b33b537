use std::collections::HashMap;

use futures_util::future::join_all;
use raven_feed::{AuxKey, FeedAssembler, HeightModel, PageState, RenderRow, estimate_height_with};
use raven_types::api::{GetMessagesRequest, GetMessagesResponse, methods};
use raven_types::models::{Message, PollData};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::polls::fetch_poll;
use crate::state::ClientState;

/// One open chat view: a channel or a thread.
///
/// The loaded messages live in the shared feed cache under the channel
/// id, so mutations and realtime invalidations reach every view of it.
pub struct ChannelFeed {
    state: ClientState,
    channel_id: String,
    is_thread: bool,
}

impl ChannelFeed {
    pub fn open(state: ClientState, channel_id: impl Into<String>) -> Self {
        let channel_id = channel_id.into();
        state.remember_channel(&channel_id);
        Self {
            state,
            channel_id,
            is_thread: false,
        }
    }

    pub fn open_thread(state: ClientState, thread_id: impl Into<String>) -> Self {
        Self {
            state,
            channel_id: thread_id.into(),
            is_thread: true,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn assembler(&self) -> FeedAssembler {
        if self.is_thread {
            FeedAssembler::for_thread(&self.channel_id, self.state.page_size)
        } else {
            FeedAssembler::new(&self.channel_id, self.state.page_size)
        }
    }

    pub fn page_state(&self) -> PageState {
        self.state
            .feeds
            .with(&self.channel_id, FeedAssembler::state)
            .unwrap_or_default()
    }

    /// True once realtime events have marked the loaded messages out of date.
    pub fn is_stale(&self) -> bool {
        self.state.feeds.is_stale(&self.channel_id)
    }

    pub fn should_load_more(&self, distance_to_edge: f32, threshold: f32) -> bool {
        self.page_state() == PageState::MoreAvailable && distance_to_edge <= threshold
    }

    /// Fetch the next older page. Returns false without a request once the
    /// channel is exhausted or while another page is loading, and when a
    /// refresh replaced the feed before the page arrived.
    pub async fn load_older(&self) -> Result<bool> {
        let next = self
            .state
            .feeds
            .upsert_with(self.channel_id.clone(), || self.assembler(), |f| f.next_request());
        let Some(page) = next else {
            return Ok(false);
        };

        let request = GetMessagesRequest {
            channel_id: self.channel_id.clone(),
            limit: page.limit,
            older_than: page.older_than,
        };
        match self.fetch(&request).await {
            Ok(messages) => Ok(self.state.feeds.upsert_with(
                self.channel_id.clone(),
                || self.assembler(),
                |f| f.push_response(&page, messages),
            )),
            Err(e) => {
                self.state
                    .feeds
                    .update(&self.channel_id, |f| f.request_failed(&page));
                self.state.notifier.error("Could not load messages", &e);
                Err(e)
            }
        }
    }

    /// Re-fetch the newest page and replace what is loaded. The old rows
    /// stay visible until the new page arrives; older pages still in
    /// flight are dropped when they land.
    pub async fn refresh(&self) -> Result<()> {
        let mut fresh = self.assembler();
        let page = fresh.next_request().ok_or_else(|| {
            ClientError::Busy(format!("loading {}", self.channel_id))
        })?;
        let request = GetMessagesRequest {
            channel_id: self.channel_id.clone(),
            limit: page.limit,
            older_than: None,
        };
        match self.fetch(&request).await {
            Ok(messages) => {
                fresh.push_page(messages);
                self.state
                    .feeds
                    .replace_with(self.channel_id.clone(), |old| fresh.supersede(old));
                debug!("Refreshed {}", self.channel_id);
                Ok(())
            }
            Err(e) => {
                self.state.notifier.error("Could not refresh messages", &e);
                Err(e)
            }
        }
    }

    async fn fetch(&self, request: &GetMessagesRequest) -> Result<Vec<Message>> {
        let response: GetMessagesResponse = self.state.rpc.get(methods::GET_MESSAGES, request).await?;
        Ok(response.messages)
    }

    pub fn rows(&self) -> Vec<RenderRow> {
        self.state
            .feeds
            .with(&self.channel_id, FeedAssembler::rows)
            .unwrap_or_else(|| self.assembler().rows())
    }

    /// Initial height for every row, in row order. Polls already loaded
    /// are sized by their option count.
    pub fn height_hints(&self, model: &HeightModel) -> Vec<f32> {
        let polls = self.poll_data();
        self.rows()
            .iter()
            .map(|row| estimate_height_with(Some(row), model, &polls))
            .collect()
    }

    /// Height for the row at `index`; 0 past the end.
    pub fn height_hint(&self, index: usize, model: &HeightModel) -> f32 {
        let rows = self.rows();
        estimate_height_with(rows.get(index), model, &self.poll_data())
    }

    /// Fetch auxiliary data (polls) for the loaded rows, all keys
    /// concurrently and each key once. Returns the keys that failed.
    pub async fn load_aux(&self) -> Vec<(AuxKey, ClientError)> {
        let mut wanted: HashMap<AuxKey, String> = HashMap::new();
        for row in self.rows() {
            if let (Some(key), Some(message)) = (AuxKey::of(&row), row.message()) {
                wanted.entry(key).or_insert_with(|| message.name.clone());
            }
        }

        let fetches = wanted.into_iter().map(move |(key, message_id)| async move {
            let result = match &key {
                AuxKey::Poll(poll_id) => fetch_poll(&self.state, &message_id, poll_id).await.map(drop),
            };
            (key, result)
        });

        join_all(fetches)
            .await
            .into_iter()
            .filter_map(|(key, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!("Could not load {}: {}", key, e);
                    Some((key, e))
                }
            })
            .collect()
    }

    /// Cached poll data for the polls in this feed.
    pub fn poll_data(&self) -> HashMap<String, PollData> {
        self.rows()
            .iter()
            .filter_map(AuxKey::of)
            .filter_map(|key| match key {
                AuxKey::Poll(id) => self.state.polls.get(&id).map(|data| (id, data)),
            })
            .collect()
    }
}
