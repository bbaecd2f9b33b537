use std::collections::HashMap;

use raven_types::api::{ChannelMembersRequest, GetChannelsRequest, GetChannelsResponse, methods};
use raven_types::models::{Channel, ChannelMember, Presence, User};
use serde_json::json;
use tracing::debug;

use crate::cache::QueryCache;
use crate::error::{ClientError, Result};
use crate::rpc::Rpc;

/// Users, channels and channel members. Each list is fetched once and
/// shared; realtime updates invalidate or patch it.
#[derive(Default)]
pub struct Directory {
    users: QueryCache<(), HashMap<String, User>>,
    channels: QueryCache<(), Vec<Channel>>,
    members: QueryCache<String, Vec<ChannelMember>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All users, keyed by user id.
    pub async fn users(&self, rpc: &dyn Rpc) -> Result<HashMap<String, User>> {
        self.users
            .get_or_fetch((), move || async move {
                let users: Vec<User> = rpc.get(methods::GET_USERS, &json!({})).await?;
                debug!("Fetched {} users", users.len());
                Ok(users.into_iter().map(|u| (u.name.clone(), u)).collect())
            })
            .await
    }

    pub async fn user(&self, rpc: &dyn Rpc, user_id: &str) -> Result<User> {
        self.users(rpc)
            .await?
            .remove(user_id)
            .ok_or_else(|| ClientError::NotFound(format!("user {}", user_id)))
    }

    /// user id -> full name, for renderers.
    pub async fn display_names(&self, rpc: &dyn Rpc) -> Result<HashMap<String, String>> {
        Ok(self
            .users(rpc)
            .await?
            .into_values()
            .map(|u| (u.name, u.full_name))
            .collect())
    }

    /// Regular channels followed by direct-message channels, archived ones
    /// included.
    pub async fn channels(&self, rpc: &dyn Rpc) -> Result<Vec<Channel>> {
        self.channels
            .get_or_fetch((), move || async move {
                let request = GetChannelsRequest { hide_archived: false };
                let response: GetChannelsResponse = rpc.get(methods::GET_CHANNELS, &request).await?;
                let mut channels = response.channels;
                channels.extend(response.dm_channels);
                debug!("Fetched {} channels", channels.len());
                Ok(channels)
            })
            .await
    }

    pub async fn channel(&self, rpc: &dyn Rpc, channel_id: &str) -> Result<Channel> {
        self.channels(rpc)
            .await?
            .into_iter()
            .find(|c| c.name == channel_id)
            .ok_or_else(|| ClientError::NotFound(format!("channel {}", channel_id)))
    }

    pub async fn members(&self, rpc: &dyn Rpc, channel_id: &str) -> Result<Vec<ChannelMember>> {
        self.members
            .get_or_fetch(channel_id.to_string(), move || async move {
                let request = ChannelMembersRequest {
                    channel_id: channel_id.to_string(),
                };
                rpc.get(methods::GET_CHANNEL_MEMBERS, &request).await
            })
            .await
    }

    /// Patch a user's presence in place. Returns false if users are not
    /// loaded or the user is unknown.
    pub fn set_presence(&self, user_id: &str, presence: Presence) -> bool {
        self.users
            .update(&(), |users| match users.get_mut(user_id) {
                Some(user) => {
                    user.presence = presence;
                    true
                }
                None => false,
            })
            .unwrap_or(false)
    }

    pub fn invalidate_users(&self) {
        self.users.invalidate(&());
    }

    pub fn invalidate_channels(&self) {
        self.channels.invalidate(&());
    }

    pub fn invalidate_members(&self, channel_id: &str) {
        self.members.invalidate(&channel_id.to_string());
    }
}
