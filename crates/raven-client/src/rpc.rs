use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use raven_types::api::{Envelope, ErrorBody};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Get,
    Post,
}

/// Remote procedure calls against named server methods. Implementations
/// unwrap the `{ "message": ... }` envelope and return the payload.
#[async_trait]
pub trait Rpc: Send + Sync {
    async fn call(&self, kind: CallKind, method: &str, params: Value) -> Result<Value>;
}

impl dyn Rpc + '_ {
    pub async fn get<T, P>(&self, method: &str, params: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params)?;
        let value = self.call(CallKind::Get, method, params).await?;
        decode(method, value)
    }

    pub async fn post<T, P>(&self, method: &str, params: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params)?;
        let value = self.call(CallKind::Post, method, params).await?;
        decode(method, value)
    }
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|source| ClientError::Decode {
        method: method.to_string(),
        source,
    })
}

/// `Rpc` over HTTP: `GET|POST {site}/api/method/<method>`.
pub struct HttpRpc {
    client: Client,
    site_url: String,
    auth: Option<String>,
}

impl HttpRpc {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: Client::new(),
            site_url: config.site_url.clone(),
            auth: config.auth_header(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/api/method/{}", self.site_url, method)
    }
}

#[async_trait]
impl Rpc for HttpRpc {
    async fn call(&self, kind: CallKind, method: &str, params: Value) -> Result<Value> {
        let url = self.url(method);
        debug!("{:?} {}", kind, method);

        let mut request = match kind {
            CallKind::Get => self.client.get(&url).query(&query_pairs(&params)),
            CallKind::Post => self.client.post(&url).json(&params),
        };
        if let Some(auth) = &self.auth {
            request = request.header(header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let error: ErrorBody = serde_json::from_slice(&body).unwrap_or_default();
            let err = classify(method, status, &error);
            warn!("{} -> {}", method, err);
            return Err(err);
        }

        let envelope: Envelope<Value> =
            serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
                method: method.to_string(),
                source,
            })?;
        Ok(envelope.message.unwrap_or(Value::Null))
    }
}

/// GET arguments travel as query parameters: strings as-is, everything
/// else JSON-encoded.
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    match params {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn classify(method: &str, status: StatusCode, body: &ErrorBody) -> ClientError {
    let message = body
        .summary()
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    match (status, body.exc_type.as_deref()) {
        (StatusCode::NOT_FOUND, _) | (_, Some("DoesNotExistError")) => ClientError::NotFound(message),
        (StatusCode::EXPECTATION_FAILED, _) | (_, Some("ValidationError")) => {
            ClientError::Validation(message)
        }
        _ => ClientError::Remote {
            method: method.to_string(),
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_pairs_encode_non_strings() {
        let pairs = query_pairs(&json!({
            "channel_id": "general",
            "limit": 50,
            "older_than": null,
            "only_show_unread": true
        }));
        assert!(pairs.contains(&("channel_id".into(), "general".into())));
        assert!(pairs.contains(&("limit".into(), "50".into())));
        assert!(pairs.contains(&("only_show_unread".into(), "true".into())));
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn classify_by_status_and_exc_type() {
        let empty = ErrorBody::default();
        assert!(classify("m", StatusCode::NOT_FOUND, &empty).is_not_found());

        let validation = ErrorBody {
            exc_type: Some("ValidationError".into()),
            ..Default::default()
        };
        assert!(matches!(
            classify("m", StatusCode::BAD_REQUEST, &validation),
            ClientError::Validation(_)
        ));

        match classify("raven.api.x", StatusCode::INTERNAL_SERVER_ERROR, &empty) {
            ClientError::Remote { status, message, .. } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn http_rpc_builds_method_urls() {
        let config = ClientConfig::from_lookup(|key| match key {
            "RAVEN_SITE_URL" => Some("https://chat.example.com".into()),
            "RAVEN_USER" => Some("ana@example.com".into()),
            _ => None,
        })
        .unwrap();
        let rpc = HttpRpc::new(&config);
        assert_eq!(
            rpc.url("raven.api.raven_poll.get_poll"),
            "https://chat.example.com/api/method/raven.api.raven_poll.get_poll"
        );
    }
}
