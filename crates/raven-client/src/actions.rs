use async_trait::async_trait;
use raven_feed::text::plain_text;
use raven_types::api::{
    CreateThreadRequest, CreateThreadResponse, DeleteDocRequest, ForwardMessageRequest,
    MESSAGE_DOCTYPE, ReactRequest, SaveMessageRequest, SendMessageRequest, TogglePinRequest,
    methods,
};
use raven_types::models::Message;
use serde_json::Value;
use tracing::info;

use crate::error::{ClientError, Result};
use crate::lists::{ListItem, ListKey, ListKind};
use crate::mutation::{self, Action, Command, MutationKey};
use crate::state::ClientStateInner;

/// Copies of one message wherever it is cached, taken before a patch.
pub struct MessageCopies {
    channel_id: String,
    feed: Option<Message>,
    lists: Vec<(ListKey, Vec<ListItem>)>,
}

impl MessageCopies {
    fn take(state: &ClientStateInner, channel_id: &str, message_id: &str) -> Self {
        let feed = state
            .feeds
            .with(&channel_id.to_string(), |f| f.get(message_id).cloned())
            .flatten();
        let lists = state
            .lists
            .entries_where(|_| true)
            .into_iter()
            .filter(|(_, items)| items.iter().any(|i| i.message_id() == message_id))
            .collect();
        Self {
            channel_id: channel_id.to_string(),
            feed,
            lists,
        }
    }

    fn restore(self, state: &ClientStateInner) {
        if let Some(message) = self.feed {
            state.feeds.update(&self.channel_id, |f| f.upsert(message));
        }
        for (key, items) in self.lists {
            state.lists.insert(key, items);
        }
    }
}

/// Apply `f` to every cached copy of a message.
fn patch_everywhere<F>(state: &ClientStateInner, channel_id: &str, message_id: &str, f: F)
where
    F: Fn(&mut Message),
{
    state
        .feeds
        .update(&channel_id.to_string(), |feed| feed.update(message_id, &f));
    state.lists.update_where(
        |_| true,
        |items| {
            for item in items.iter_mut() {
                if item.message_id() == message_id {
                    if let Some(message) = item.message_mut() {
                        f(message);
                    }
                }
            }
        },
    );
}

fn drop_from_lists<P>(state: &ClientStateInner, mut which: P, message_id: &str)
where
    P: FnMut(&ListKey) -> bool,
{
    state
        .lists
        .update_where(&mut which, |items| items.retain(|i| i.message_id() != message_id));
}

// -- Delete --

pub struct DeleteMessage {
    pub channel_id: String,
    pub message_id: String,
}

#[async_trait]
impl Command for DeleteMessage {
    type Snapshot = MessageCopies;
    type Output = ();

    fn key(&self) -> MutationKey {
        MutationKey::new(Action::Delete, &self.message_id)
    }

    fn snapshot(&self, state: &ClientStateInner) -> MessageCopies {
        MessageCopies::take(state, &self.channel_id, &self.message_id)
    }

    fn apply(&self, state: &ClientStateInner) {
        state
            .feeds
            .update(&self.channel_id, |f| f.remove(&self.message_id));
        drop_from_lists(state, |_| true, &self.message_id);
    }

    fn rollback(&self, state: &ClientStateInner, snapshot: MessageCopies) {
        snapshot.restore(state);
    }

    async fn commit(&self, state: &ClientStateInner) -> Result<()> {
        let request = DeleteDocRequest {
            doctype: MESSAGE_DOCTYPE.to_string(),
            name: self.message_id.clone(),
        };
        state.rpc.post::<Value, _>(methods::DELETE_DOC, &request).await?;
        Ok(())
    }

    fn success_notice(&self) -> Option<String> {
        Some("Message deleted".into())
    }

    fn failure_notice(&self) -> String {
        "Could not delete message".into()
    }
}

// -- React --

pub struct ToggleReaction {
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
}

#[async_trait]
impl Command for ToggleReaction {
    type Snapshot = MessageCopies;
    type Output = ();

    fn key(&self) -> MutationKey {
        MutationKey::new(Action::React, format!("{}:{}", self.message_id, self.emoji))
    }

    fn snapshot(&self, state: &ClientStateInner) -> MessageCopies {
        MessageCopies::take(state, &self.channel_id, &self.message_id)
    }

    fn apply(&self, state: &ClientStateInner) {
        let user = state.current_user.as_str();
        patch_everywhere(state, &self.channel_id, &self.message_id, |m| {
            m.toggle_reaction(&self.emoji, user);
        });
    }

    fn rollback(&self, state: &ClientStateInner, snapshot: MessageCopies) {
        snapshot.restore(state);
    }

    async fn commit(&self, state: &ClientStateInner) -> Result<()> {
        let request = ReactRequest {
            message_id: self.message_id.clone(),
            reaction: self.emoji.clone(),
        };
        state.rpc.post::<Value, _>(methods::REACT, &request).await?;
        Ok(())
    }

    fn success_notice(&self) -> Option<String> {
        Some(format!("Reaction {} updated", self.emoji))
    }

    fn failure_notice(&self) -> String {
        "Could not react to message".into()
    }
}

// -- Save --

pub struct ToggleSave {
    pub channel_id: String,
    pub message_id: String,
    /// Target state: true saves, false unsaves.
    pub save: bool,
}

impl ToggleSave {
    pub fn for_message(message: &Message) -> Self {
        Self {
            channel_id: message.channel_id.clone(),
            message_id: message.name.clone(),
            save: !message.is_saved,
        }
    }
}

#[async_trait]
impl Command for ToggleSave {
    type Snapshot = MessageCopies;
    type Output = ();

    fn key(&self) -> MutationKey {
        MutationKey::new(Action::Save, &self.message_id)
    }

    fn snapshot(&self, state: &ClientStateInner) -> MessageCopies {
        MessageCopies::take(state, &self.channel_id, &self.message_id)
    }

    fn apply(&self, state: &ClientStateInner) {
        let save = self.save;
        patch_everywhere(state, &self.channel_id, &self.message_id, |m| m.is_saved = save);
        if !save {
            drop_from_lists(state, |k| k.kind == ListKind::Saved, &self.message_id);
        }
    }

    fn rollback(&self, state: &ClientStateInner, snapshot: MessageCopies) {
        snapshot.restore(state);
    }

    async fn commit(&self, state: &ClientStateInner) -> Result<()> {
        let request = SaveMessageRequest {
            message_id: self.message_id.clone(),
            add: if self.save { "Yes" } else { "No" }.to_string(),
        };
        state.rpc.post::<Value, _>(methods::SAVE_MESSAGE, &request).await?;
        if self.save {
            state.lists.invalidate_where(|k| k.kind == ListKind::Saved);
        }
        Ok(())
    }

    fn success_notice(&self) -> Option<String> {
        Some(if self.save { "Message saved" } else { "Message unsaved" }.into())
    }

    fn failure_notice(&self) -> String {
        format!("Could not {} message", if self.save { "save" } else { "unsave" })
    }
}

// -- Pin --

pub struct TogglePin {
    pub channel_id: String,
    pub message_id: String,
    /// Target state: true pins, false unpins.
    pub pin: bool,
}

impl TogglePin {
    pub fn for_message(message: &Message) -> Self {
        Self {
            channel_id: message.channel_id.clone(),
            message_id: message.name.clone(),
            pin: !message.is_pinned,
        }
    }

    fn is_pinned_list(&self, key: &ListKey) -> bool {
        key.kind == ListKind::Pinned && key.filter.channel_id.as_deref() == Some(&self.channel_id)
    }
}

#[async_trait]
impl Command for TogglePin {
    type Snapshot = MessageCopies;
    type Output = ();

    fn key(&self) -> MutationKey {
        MutationKey::new(Action::Pin, &self.message_id)
    }

    fn snapshot(&self, state: &ClientStateInner) -> MessageCopies {
        MessageCopies::take(state, &self.channel_id, &self.message_id)
    }

    fn apply(&self, state: &ClientStateInner) {
        let pin = self.pin;
        patch_everywhere(state, &self.channel_id, &self.message_id, |m| m.is_pinned = pin);
        if !pin {
            drop_from_lists(state, |k| self.is_pinned_list(k), &self.message_id);
        }
    }

    fn rollback(&self, state: &ClientStateInner, snapshot: MessageCopies) {
        snapshot.restore(state);
    }

    async fn commit(&self, state: &ClientStateInner) -> Result<()> {
        let request = TogglePinRequest {
            channel_id: self.channel_id.clone(),
            message_id: self.message_id.clone(),
        };
        state.rpc.post::<Value, _>(methods::TOGGLE_PIN, &request).await?;
        if self.pin {
            state.lists.invalidate_where(|k| self.is_pinned_list(k));
        }
        Ok(())
    }

    fn success_notice(&self) -> Option<String> {
        Some(if self.pin { "Message pinned" } else { "Message unpinned" }.into())
    }

    fn failure_notice(&self) -> String {
        format!("Could not {} message", if self.pin { "pin" } else { "unpin" })
    }
}

// -- Threads --

pub struct CreateThread {
    pub channel_id: String,
    pub message_id: String,
}

#[async_trait]
impl Command for CreateThread {
    type Snapshot = MessageCopies;
    /// Id of the new thread.
    type Output = String;

    fn key(&self) -> MutationKey {
        MutationKey::new(Action::CreateThread, &self.message_id)
    }

    fn snapshot(&self, state: &ClientStateInner) -> MessageCopies {
        MessageCopies::take(state, &self.channel_id, &self.message_id)
    }

    fn apply(&self, state: &ClientStateInner) {
        patch_everywhere(state, &self.channel_id, &self.message_id, |m| m.is_thread = true);
    }

    fn rollback(&self, state: &ClientStateInner, snapshot: MessageCopies) {
        snapshot.restore(state);
    }

    async fn commit(&self, state: &ClientStateInner) -> Result<String> {
        let request = CreateThreadRequest {
            message_id: self.message_id.clone(),
        };
        let response: CreateThreadResponse =
            state.rpc.post(methods::CREATE_THREAD, &request).await?;
        state.lists.invalidate_where(|k| k.kind == ListKind::Threads);
        Ok(response.thread_id)
    }

    fn success_notice(&self) -> Option<String> {
        Some("Thread created".into())
    }

    fn failure_notice(&self) -> String {
        "Could not create thread".into()
    }
}

// -- Entry points --

pub async fn delete_message(state: &ClientStateInner, message: &Message) -> Result<()> {
    mutation::run(
        state,
        DeleteMessage {
            channel_id: message.channel_id.clone(),
            message_id: message.name.clone(),
        },
    )
    .await
}

pub async fn toggle_reaction(state: &ClientStateInner, message: &Message, emoji: &str) -> Result<()> {
    mutation::run(
        state,
        ToggleReaction {
            channel_id: message.channel_id.clone(),
            message_id: message.name.clone(),
            emoji: emoji.to_string(),
        },
    )
    .await
}

pub async fn toggle_save(state: &ClientStateInner, message: &Message) -> Result<()> {
    mutation::run(state, ToggleSave::for_message(message)).await
}

pub async fn toggle_pin(state: &ClientStateInner, message: &Message) -> Result<()> {
    mutation::run(state, TogglePin::for_message(message)).await
}

pub async fn create_thread(state: &ClientStateInner, message: &Message) -> Result<String> {
    mutation::run(
        state,
        CreateThread {
            channel_id: message.channel_id.clone(),
            message_id: message.name.clone(),
        },
    )
    .await
}

/// Post a message, optionally as a reply. Not optimistic: the message
/// appears in the feed once the server has assigned it a name.
pub async fn send_message(
    state: &ClientStateInner,
    channel_id: &str,
    text: &str,
    reply_to: Option<&Message>,
) -> Result<Message> {
    if plain_text(text).trim().is_empty() {
        return Err(ClientError::Validation("Message is empty".into()));
    }

    let request = SendMessageRequest {
        channel_id: channel_id.to_string(),
        text: text.to_string(),
        linked_message: reply_to.map(|m| m.name.clone()),
        is_reply: reply_to.is_some() as u8,
    };

    match state.rpc.post::<Message, _>(methods::SEND_MESSAGE, &request).await {
        Ok(message) => {
            state
                .feeds
                .update(&channel_id.to_string(), |f| f.upsert(message.clone()));
            info!("Sent {} to {}", message.name, channel_id);
            Ok(message)
        }
        Err(e) => {
            state.notifier.error("Could not send message", &e);
            Err(e)
        }
    }
}

/// Forward a message to other channels or direct-message channels.
pub async fn forward_message(
    state: &ClientStateInner,
    message: &Message,
    receivers: &[String],
) -> Result<()> {
    if receivers.is_empty() {
        return Err(ClientError::Validation("Pick at least one channel".into()));
    }
    let _guard = state
        .in_flight
        .acquire(MutationKey::new(Action::Forward, &message.name))?;

    let request = ForwardMessageRequest {
        message_receivers: receivers.to_vec(),
        forwarded_message: message.name.clone(),
    };
    match state.rpc.post::<Value, _>(methods::FORWARD_MESSAGE, &request).await {
        Ok(_) => {
            for receiver in receivers {
                state.feeds.invalidate(receiver);
            }
            state.notifier.success("Message forwarded");
            Ok(())
        }
        Err(e) => {
            state.notifier.error("Could not forward message", &e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoticeLevel;
    use crate::testing::{ME, ScriptedRpc, message_json, server_error, state_with};
    use raven_feed::{FeedAssembler, ListFilter};
    use serde_json::json;

    fn message(name: &str) -> Message {
        serde_json::from_value(message_json(name, "general", "2024-05-01 10:00:00")).unwrap()
    }

    fn seeded_feed(state: &ClientStateInner, names: &[&str]) {
        let mut feed = FeedAssembler::new("general", 50);
        feed.push_page(names.iter().map(|n| message(n)).collect());
        state.feeds.insert("general".into(), feed);
    }

    fn feed_names(state: &ClientStateInner) -> Vec<String> {
        state
            .feeds
            .with(&"general".to_string(), |f| {
                f.messages().iter().map(|m| m.name.clone()).collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn delete_is_visible_before_the_server_answers() {
        let rpc = ScriptedRpc::new();
        let gate = rpc.hold(methods::DELETE_DOC);
        rpc.respond(methods::DELETE_DOC, Ok(Value::Null));
        let state = state_with(rpc.clone(), 50);
        seeded_feed(&state, &["m1", "m2"]);

        let target = message("m1");
        let delete = delete_message(&state, &target);
        tokio::pin!(delete);

        // Drive the mutation up to the parked request.
        tokio::select! {
            _ = &mut delete => panic!("delete finished before the server answered"),
            _ = tokio::task::yield_now() => {}
        }
        assert_eq!(feed_names(&state), vec!["m2"]);
        assert_eq!(rpc.calls(methods::DELETE_DOC), 1);

        gate.add_permits(1);
        delete.await.unwrap();
        assert_eq!(feed_names(&state), vec!["m2"]);
        assert_eq!(
            rpc.params(methods::DELETE_DOC)[0],
            json!({ "doctype": "Raven Message", "name": "m1" })
        );
    }

    #[tokio::test]
    async fn failed_delete_restores_message_and_notifies_once() {
        let rpc = ScriptedRpc::new();
        rpc.respond(methods::DELETE_DOC, Err(server_error(methods::DELETE_DOC)));
        let state = state_with(rpc, 50);
        seeded_feed(&state, &["m1", "m2"]);
        let mut notices = state.notifier.subscribe();

        let err = delete_message(&state, &message("m1")).await.unwrap_err();
        assert!(matches!(err, ClientError::Remote { status: 500, .. }));
        assert_eq!(feed_names(&state), vec!["m1", "m2"]);

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.text.starts_with("Could not delete message"));
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn second_delete_while_first_is_pending_is_busy() {
        let rpc = ScriptedRpc::new();
        let gate = rpc.hold(methods::DELETE_DOC);
        rpc.respond(methods::DELETE_DOC, Ok(Value::Null));
        let state = state_with(rpc.clone(), 50);
        seeded_feed(&state, &["m1"]);

        let target = message("m1");
        let first = delete_message(&state, &target);
        tokio::pin!(first);
        tokio::select! {
            _ = &mut first => panic!("delete finished early"),
            _ = tokio::task::yield_now() => {}
        }

        let second = delete_message(&state, &target).await;
        assert!(matches!(second, Err(ClientError::Busy(_))));
        assert_eq!(rpc.calls(methods::DELETE_DOC), 1);

        gate.add_permits(1);
        first.await.unwrap();
    }

    #[tokio::test]
    async fn reaction_rolls_back_on_failure() {
        let rpc = ScriptedRpc::new();
        rpc.respond(methods::REACT, Ok(Value::Null));
        rpc.respond(methods::REACT, Err(server_error(methods::REACT)));
        let state = state_with(rpc, 50);
        seeded_feed(&state, &["m1"]);
        let mut notices = state.notifier.subscribe();

        let target = message("m1");
        toggle_reaction(&state, &target, "👍").await.unwrap();
        let confirmed = notices.recv().await.unwrap();
        assert_eq!(confirmed.level, NoticeLevel::Success);
        assert_eq!(confirmed.text, "Reaction 👍 updated");
        let reactions = |state: &ClientStateInner| {
            state
                .feeds
                .with(&"general".to_string(), |f| f.get("m1").unwrap().reactions.clone())
                .flatten()
        };
        let after_first = reactions(&state).unwrap();
        assert_eq!(after_first["👍"].users, vec![ME.to_string()]);

        // Removing it fails, so the reaction comes back.
        assert!(toggle_reaction(&state, &target, "👍").await.is_err());
        assert_eq!(reactions(&state).unwrap(), after_first);
    }

    #[tokio::test]
    async fn unsave_drops_from_saved_list() {
        let rpc = ScriptedRpc::new();
        rpc.respond(methods::SAVE_MESSAGE, Ok(Value::Null));
        let state = state_with(rpc.clone(), 50);

        let mut saved = message("m1");
        saved.is_saved = true;
        let key = ListKey { kind: ListKind::Saved, filter: ListFilter::default() };
        state.lists.insert(key.clone(), vec![ListItem::Message(saved.clone())]);

        toggle_save(&state, &saved).await.unwrap();
        assert!(state.lists.get(&key).unwrap().is_empty());
        assert_eq!(
            rpc.params(methods::SAVE_MESSAGE)[0],
            json!({ "message_id": "m1", "add": "No" })
        );
    }

    #[tokio::test]
    async fn pin_patches_feed_and_invalidates_pinned_list() {
        let rpc = ScriptedRpc::new();
        rpc.respond(methods::TOGGLE_PIN, Ok(Value::Null));
        let state = state_with(rpc, 50);
        seeded_feed(&state, &["m1"]);
        let key = ListKey { kind: ListKind::Pinned, filter: ListFilter::channel("general") };
        state.lists.insert(key.clone(), Vec::new());

        toggle_pin(&state, &message("m1")).await.unwrap();
        let pinned = state
            .feeds
            .with(&"general".to_string(), |f| f.get("m1").unwrap().is_pinned)
            .unwrap();
        assert!(pinned);
        assert!(state.lists.is_stale(&key));
    }

    #[tokio::test]
    async fn create_thread_returns_thread_id() {
        let rpc = ScriptedRpc::new();
        rpc.respond(methods::CREATE_THREAD, Ok(json!({ "thread_id": "m1" })));
        let state = state_with(rpc, 50);
        seeded_feed(&state, &["m1"]);

        let thread_id = create_thread(&state, &message("m1")).await.unwrap();
        assert_eq!(thread_id, "m1");
        assert!(state.feeds.with(&"general".to_string(), |f| f.get("m1").unwrap().is_thread).unwrap());
    }

    #[tokio::test]
    async fn send_rejects_empty_text_and_appends_on_success() {
        let rpc = ScriptedRpc::new();
        rpc.respond(
            methods::SEND_MESSAGE,
            Ok(message_json("m9", "general", "2024-05-02 08:00:00")),
        );
        let state = state_with(rpc.clone(), 50);
        seeded_feed(&state, &["m1"]);

        let empty = send_message(&state, "general", "<p> </p>", None).await;
        assert!(matches!(empty, Err(ClientError::Validation(_))));
        assert_eq!(rpc.calls(methods::SEND_MESSAGE), 0);

        let parent = message("m1");
        send_message(&state, "general", "<p>hi</p>", Some(&parent)).await.unwrap();
        assert_eq!(feed_names(&state), vec!["m1", "m9"]);
        let params = &rpc.params(methods::SEND_MESSAGE)[0];
        assert_eq!(params["linked_message"], json!("m1"));
        assert_eq!(params["is_reply"], json!(1));
    }

    #[tokio::test]
    async fn forward_needs_receivers() {
        let rpc = ScriptedRpc::new();
        rpc.respond(methods::FORWARD_MESSAGE, Ok(Value::Null));
        let state = state_with(rpc.clone(), 50);

        let target = message("m1");
        assert!(matches!(
            forward_message(&state, &target, &[]).await,
            Err(ClientError::Validation(_))
        ));
        forward_message(&state, &target, &["random".to_string()]).await.unwrap();
        assert_eq!(
            rpc.params(methods::FORWARD_MESSAGE)[0]["message_receivers"],
            json!(["random"])
        );
    }
}
