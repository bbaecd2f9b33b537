//! Scripted `Rpc` for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::error::{ClientError, Result};
use crate::rpc::{CallKind, Rpc};
use crate::state::{ClientState, ClientStateInner};

pub(crate) const ME: &str = "ana@example.com";

struct Scripted {
    /// Only answer calls whose params have this field set to this value.
    when: Option<(String, Value)>,
    response: Result<Value>,
}

impl Scripted {
    fn matches(&self, params: &Value) -> bool {
        match &self.when {
            Some((field, value)) => params.get(field) == Some(value),
            None => true,
        }
    }
}

/// Answers each method from a queue of canned responses and records every
/// call. `hold` parks calls to a method until the test releases them.
#[derive(Default)]
pub(crate) struct ScriptedRpc {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    log: Mutex<Vec<(String, Value)>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ScriptedRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: &str, response: Result<Value>) {
        self.push(method, Scripted { when: None, response });
    }

    /// Like `respond`, but only for calls with `params[field] == value`.
    pub fn respond_when(&self, method: &str, field: &str, value: Value, response: Result<Value>) {
        self.push(
            method,
            Scripted {
                when: Some((field.to_string(), value)),
                response,
            },
        );
    }

    fn push(&self, method: &str, scripted: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(scripted);
    }

    /// Park calls to `method` until permits are added to the returned gate.
    pub fn hold(&self, method: &str) -> Arc<Semaphore> {
        self.gates
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(0)))
            .clone()
    }

    pub fn calls(&self, method: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|(m, _)| m == method).count()
    }

    pub fn params(&self, method: &str) -> Vec<Value> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl Rpc for ScriptedRpc {
    async fn call(&self, _kind: CallKind, method: &str, params: Value) -> Result<Value> {
        self.log.lock().unwrap().push((method.to_string(), params.clone()));

        let gate = self.gates.lock().unwrap().get(method).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let mut responses = self.responses.lock().unwrap();
        let queue = responses.entry(method.to_string()).or_default();
        match queue.iter().position(|s| s.matches(&params)) {
            Some(pos) => queue.remove(pos).unwrap().response,
            None => Err(ClientError::Remote {
                method: method.to_string(),
                status: 500,
                message: "no scripted response".into(),
            }),
        }
    }
}

pub(crate) fn state_with(rpc: Arc<ScriptedRpc>, page_size: u32) -> ClientState {
    Arc::new(ClientStateInner::new(rpc, ME, page_size))
}

pub(crate) fn message_json(name: &str, channel_id: &str, creation: &str) -> Value {
    json!({
        "name": name,
        "owner": ME,
        "channel_id": channel_id,
        "message_type": "Text",
        "creation": creation,
        "text": format!("<p>message {}</p>", name),
        "is_continuation": 0,
    })
}

pub(crate) fn server_error(method: &str) -> ClientError {
    ClientError::Remote {
        method: method.to_string(),
        status: 500,
        message: "Internal Server Error".into(),
    }
}
