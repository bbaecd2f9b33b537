use std::path::PathBuf;

use crate::error::{ClientError, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the site, without a trailing slash
    pub site_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Id of the signed-in user
    pub user: String,
    pub page_size: u32,
    pub realtime_url: Option<String>,
    pub store_path: PathBuf,
}

impl ClientConfig {
    /// Read configuration from the environment, loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let site_url = lookup("RAVEN_SITE_URL")
            .ok_or_else(|| ClientError::Config("RAVEN_SITE_URL is not set".into()))?
            .trim_end_matches('/')
            .to_string();

        let user = lookup("RAVEN_USER")
            .ok_or_else(|| ClientError::Config("RAVEN_USER is not set".into()))?;

        let page_size = match lookup("RAVEN_PAGE_SIZE") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ClientError::Config(format!("RAVEN_PAGE_SIZE is not a number: {}", raw)))?,
            None => DEFAULT_PAGE_SIZE,
        };

        let api_key = lookup("RAVEN_API_KEY");
        let api_secret = lookup("RAVEN_API_SECRET");
        if api_key.is_some() != api_secret.is_some() {
            return Err(ClientError::Config(
                "RAVEN_API_KEY and RAVEN_API_SECRET must be set together".into(),
            ));
        }

        Ok(Self {
            site_url,
            api_key,
            api_secret,
            user,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            realtime_url: lookup("RAVEN_REALTIME_URL"),
            store_path: lookup("RAVEN_STORE_PATH")
                .unwrap_or_else(|| "raven-state.db".into())
                .into(),
        })
    }

    /// `Authorization` header value for token auth.
    pub fn auth_header(&self) -> Option<String> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some(format!("token {}:{}", key, secret)),
            _ => None,
        }
    }
}
