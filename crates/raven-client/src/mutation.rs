use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::state::ClientStateInner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Delete,
    React,
    Save,
    Pin,
    Vote,
    RetractVote,
    CreateThread,
    Forward,
}

/// (action, target) pair; at most one mutation per key is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub action: Action,
    pub target: String,
}

impl MutationKey {
    pub fn new(action: Action, target: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
        }
    }
}

impl fmt::Display for MutationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} on {}", self.action, self.target)
    }
}

/// Registry of running mutations.
#[derive(Default)]
pub struct InFlight {
    keys: Mutex<HashSet<MutationKey>>,
}

impl InFlight {
    /// Claim `key`, or fail with `Busy` if the same mutation is running.
    /// The claim is released when the guard drops.
    pub fn acquire(&self, key: MutationKey) -> Result<InFlightGuard<'_>> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return Err(ClientError::Busy(key.to_string()));
        }
        Ok(InFlightGuard { owner: self, key })
    }

    pub fn contains(&self, key: &MutationKey) -> bool {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).contains(key)
    }
}

pub struct InFlightGuard<'a> {
    owner: &'a InFlight,
    key: MutationKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// An optimistic mutation: a synchronous local patch plus the remote call
/// that confirms it.
#[async_trait]
pub trait Command: Send + Sync {
    /// Pre-action state needed to undo `apply`.
    type Snapshot: Send;
    type Output: Send;

    fn key(&self) -> MutationKey;

    fn snapshot(&self, state: &ClientStateInner) -> Self::Snapshot;

    fn apply(&self, state: &ClientStateInner);

    fn rollback(&self, state: &ClientStateInner, snapshot: Self::Snapshot);

    async fn commit(&self, state: &ClientStateInner) -> Result<Self::Output>;

    /// Toast shown when the server confirms. `None` stays silent.
    fn success_notice(&self) -> Option<String>;

    /// Prefix of the error toast shown after a rollback.
    fn failure_notice(&self) -> String;
}

/// snapshot -> apply -> commit, then keep the patch or roll it back.
pub async fn run<C: Command>(state: &ClientStateInner, command: C) -> Result<C::Output> {
    let key = command.key();
    let _guard = state.in_flight.acquire(key.clone())?;

    let snapshot = command.snapshot(state);
    command.apply(state);
    debug!("Applied {} optimistically", key);

    match command.commit(state).await {
        Ok(output) => {
            if let Some(text) = command.success_notice() {
                state.notifier.success(text);
            }
            Ok(output)
        }
        Err(e) => {
            warn!("{} failed, rolling back: {}", key, e);
            command.rollback(state, snapshot);
            state.notifier.error(&command.failure_notice(), &e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_rejects_duplicates_until_released() {
        let in_flight = InFlight::default();
        let key = MutationKey::new(Action::Delete, "m1");

        let guard = in_flight.acquire(key.clone()).unwrap();
        assert!(matches!(in_flight.acquire(key.clone()), Err(ClientError::Busy(_))));
        // Different action on the same message is allowed.
        let other = in_flight.acquire(MutationKey::new(Action::React, "m1")).unwrap();

        drop(guard);
        assert!(!in_flight.contains(&key));
        assert!(in_flight.acquire(key).is_ok());
        drop(other);
    }
}
