use std::sync::Arc;

use raven_feed::FeedAssembler;
use raven_store::LocalStore;
use raven_types::models::PollData;
use tracing::warn;

use crate::cache::QueryCache;
use crate::config::ClientConfig;
use crate::directory::Directory;
use crate::error::Result;
use crate::lists::{ListItem, ListKey};
use crate::mutation::InFlight;
use crate::notify::Notifier;
use crate::rpc::{HttpRpc, Rpc};

pub type ClientState = Arc<ClientStateInner>;

/// Everything a screen needs, passed down explicitly instead of looked up
/// from ambient globals.
pub struct ClientStateInner {
    pub rpc: Arc<dyn Rpc>,
    /// Id of the signed-in user
    pub current_user: String,
    pub page_size: u32,
    pub notifier: Notifier,
    /// channel id (or thread id) -> loaded feed
    pub feeds: QueryCache<String, FeedAssembler>,
    /// poll id -> poll with the current user's votes
    pub polls: QueryCache<String, PollData>,
    pub lists: QueryCache<ListKey, Vec<ListItem>>,
    pub directory: Directory,
    pub in_flight: InFlight,
    pub store: Option<LocalStore>,
}

impl ClientStateInner {
    pub fn new(rpc: Arc<dyn Rpc>, current_user: impl Into<String>, page_size: u32) -> Self {
        Self {
            rpc,
            current_user: current_user.into(),
            page_size: page_size.max(1),
            notifier: Notifier::new(),
            feeds: QueryCache::new(),
            polls: QueryCache::new(),
            lists: QueryCache::new(),
            directory: Directory::new(),
            in_flight: InFlight::default(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: LocalStore) -> Self {
        self.store = Some(store);
        self
    }

    /// HTTP client plus the on-disk store named by the config.
    pub fn from_config(config: &ClientConfig) -> Result<ClientState> {
        let store = LocalStore::open(&config.store_path)?;
        let rpc: Arc<dyn Rpc> = Arc::new(HttpRpc::new(config));
        Ok(Arc::new(
            Self::new(rpc, config.user.clone(), config.page_size).with_store(store),
        ))
    }

    /// Channel to reopen on start, if one was remembered.
    pub fn last_channel(&self) -> Option<String> {
        let store = self.store.as_ref()?;
        store.last_channel().unwrap_or_else(|e| {
            warn!("Could not read last channel: {}", e);
            None
        })
    }

    pub fn remember_channel(&self, channel_id: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.set_last_channel(channel_id) {
                warn!("Could not remember channel {}: {}", channel_id, e);
            }
        }
    }

    /// Emoji offered in the quick reaction bar.
    pub fn quick_reactions(&self) -> Vec<String> {
        let defaults = || {
            raven_store::models::DEFAULT_QUICK_REACTIONS
                .iter()
                .map(|e| e.to_string())
                .collect()
        };
        match &self.store {
            Some(store) => store.quick_reactions().unwrap_or_else(|e| {
                warn!("Could not read quick reactions: {}", e);
                defaults()
            }),
            None => defaults(),
        }
    }

    pub fn set_quick_reactions(&self, emojis: &[String]) -> Result<()> {
        if let Some(store) = &self.store {
            store.set_quick_reactions(emojis)?;
        }
        Ok(())
    }
}
