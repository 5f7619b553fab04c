//! # 📡 THE HTTP LOOKUP
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! Somewhere, a people service holds the ages of everyone we care about. It
//! answers `GET /people/{id}` with a little JSON object. Sometimes. Other times
//! it answers 503, or 404, or a stack trace in HTML, or nothing at all. Our job
//! is to ask politely, once, and write down exactly what happened. 🦆
//!
//! Every answer that isn't a 2xx with an integer in the right field becomes a
//! [`LookupError`] for that one id. Nothing here is allowed to take down a worker.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::backends::Lookup;
use crate::common::{ItemId, ItemValue, LookupError};

/// 📡 `[lookup_config.Http]` — where the service lives and how to talk to it.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpLookupConfig {
    /// 🌐 Base URL. The id is appended as the last path segment.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// 🎂 Which JSON field holds the value.
    #[serde(default = "default_value_field")]
    pub value_field: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_value_field() -> String {
    "age".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl HttpLookupConfig {
    /// 🔧 Config with every knob at its default, for callers who only know the URL.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            api_key: None,
            value_field: default_value_field(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// 📡 One reqwest client, shared by every worker. reqwest pools connections
/// internally, so `N` workers means at most `N` requests in flight.
#[derive(Debug)]
pub struct HttpLookup {
    client: reqwest::Client,
    config: HttpLookupConfig,
}

impl HttpLookup {
    pub fn new(config: HttpLookupConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept. Probably a cursed system cert store.")?;
        Ok(Self { client, config })
    }

    fn url_for(&self, id: ItemId) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), id)
    }

    /// 🧻 Dig the value out of a payload: either the configured field of an object,
    /// or the whole body if the service just answers with a bare integer.
    fn extract_value(&self, id: ItemId, payload: &Value) -> Result<ItemValue, LookupError> {
        let candidate = match payload {
            Value::Object(fields) => fields.get(&self.config.value_field),
            bare @ Value::Number(_) => Some(bare),
            _ => None,
        };
        candidate
            .and_then(Value::as_i64)
            .ok_or_else(|| LookupError::Payload {
                id,
                reason: format!(
                    "field '{}' is missing or is not an integer",
                    self.config.value_field
                ),
            })
    }
}

#[async_trait]
impl Lookup for HttpLookup {
    async fn lookup(&self, id: ItemId) -> Result<ItemValue, LookupError> {
        let mut request = self.client.get(self.url_for(id));
        if let Some(ref api_key) = self.config.api_key {
            request = request.header("Authorization", format!("ApiKey {}", api_key));
        } else if let Some(ref username) = self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let transport = |e: reqwest::Error| LookupError::Transport {
            id,
            reason: e.to_string(),
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status {
                id,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        let payload: Value = serde_json::from_slice(&body).map_err(|e| LookupError::Payload {
            id,
            reason: e.to_string(),
        })?;
        let value = self.extract_value(id, &payload)?;
        trace!(id, value, "🎂 lookup answered");
        Ok(value)
    }
}
