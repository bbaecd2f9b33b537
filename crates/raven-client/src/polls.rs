use async_trait::async_trait;
use raven_feed::PollView;
use raven_types::api::{AddVoteRequest, GetPollRequest, RetractVoteRequest, methods};
use raven_types::models::PollData;
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::mutation::{self, Action, Command, MutationKey};
use crate::state::ClientStateInner;

/// Poll attached to `message_id`, shared by every row showing it.
pub async fn fetch_poll(state: &ClientStateInner, message_id: &str, poll_id: &str) -> Result<PollData> {
    state
        .polls
        .get_or_fetch(poll_id.to_string(), move || async move {
            debug!("Fetching poll {} for {}", poll_id, message_id);
            let request = GetPollRequest {
                message_id: message_id.to_string(),
            };
            state.rpc.get::<PollData, _>(methods::GET_POLL, &request).await
        })
        .await
}

fn check_ballot(data: &PollData, option_ids: &[String]) -> Result<()> {
    if data.poll.is_disabled {
        return Err(ClientError::Validation("This poll is closed".into()));
    }
    if data.has_voted() {
        return Err(ClientError::Validation("You have already voted".into()));
    }
    if option_ids.is_empty() {
        return Err(ClientError::Validation("Pick an option".into()));
    }
    if option_ids.len() > 1 && !data.poll.is_multi_choice {
        return Err(ClientError::Validation("Pick only one option".into()));
    }
    if let Some(unknown) = option_ids
        .iter()
        .find(|id| !data.poll.options.iter().any(|o| &o.name == *id))
    {
        return Err(ClientError::Validation(format!("Unknown option {}", unknown)));
    }
    Ok(())
}

/// Cast the current user's vote. The poll switches to its results view
/// only after the server accepts the vote; a rejected vote leaves the
/// voting view as it was.
pub async fn vote(
    state: &ClientStateInner,
    message_id: &str,
    poll_id: &str,
    option_ids: &[String],
) -> Result<PollView> {
    let data = fetch_poll(state, message_id, poll_id).await?;
    if let Err(e) = check_ballot(&data, option_ids) {
        state.notifier.error("Could not submit vote", &e);
        return Err(e);
    }

    let _guard = state
        .in_flight
        .acquire(MutationKey::new(Action::Vote, message_id))?;

    let request = AddVoteRequest {
        message_id: message_id.to_string(),
        option_id: option_ids.to_vec(),
    };
    match state.rpc.post::<Value, _>(methods::ADD_VOTE, &request).await {
        Ok(_) => {
            let view = state
                .polls
                .update(&poll_id.to_string(), |p| {
                    p.record_votes(option_ids);
                    PollView::of(p)
                })
                .unwrap_or(PollView::Results);
            Ok(view)
        }
        Err(e) => {
            state.notifier.error("Could not submit vote", &e);
            Err(e)
        }
    }
}

pub struct RetractVote {
    pub message_id: String,
    pub poll_id: String,
}

#[async_trait]
impl Command for RetractVote {
    type Snapshot = Option<PollData>;
    type Output = ();

    fn key(&self) -> MutationKey {
        MutationKey::new(Action::RetractVote, &self.message_id)
    }

    fn snapshot(&self, state: &ClientStateInner) -> Option<PollData> {
        state.polls.get(&self.poll_id)
    }

    fn apply(&self, state: &ClientStateInner) {
        state.polls.update(&self.poll_id, PollData::retract_votes);
    }

    fn rollback(&self, state: &ClientStateInner, snapshot: Option<PollData>) {
        state.polls.restore(self.poll_id.clone(), snapshot);
    }

    async fn commit(&self, state: &ClientStateInner) -> Result<()> {
        let request = RetractVoteRequest {
            poll_id: self.poll_id.clone(),
        };
        state.rpc.post::<Value, _>(methods::RETRACT_VOTE, &request).await?;
        Ok(())
    }

    fn success_notice(&self) -> Option<String> {
        Some("Vote retracted".into())
    }

    fn failure_notice(&self) -> String {
        "Could not retract vote".into()
    }
}

pub async fn retract_vote(state: &ClientStateInner, message_id: &str, poll_id: &str) -> Result<()> {
    mutation::run(
        state,
        RetractVote {
            message_id: message_id.to_string(),
            poll_id: poll_id.to_string(),
        },
    )
    .await
}
