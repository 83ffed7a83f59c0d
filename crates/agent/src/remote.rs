use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use shopchat_core::config::ClassifierConfig;
use shopchat_core::errors::ApplicationError;
use shopchat_core::domain::intent::Intent;

/// Payload sent to the remote classifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRequest {
    pub message: String,
    pub history: Vec<String>,
    pub allowed_intents: Vec<String>,
    pub context_state: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RemoteResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub slots: Map<String, Value>,
    #[serde(default, alias = "replyText")]
    pub reply_text: Option<String>,
}

#[derive(Debug, Error)]
pub enum RemoteClassifierError {
    #[error("remote classifier is disabled")]
    Disabled,
    #[error("remote classifier is not configured: {0}")]
    NotConfigured(String),
    #[error("remote classifier transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote classifier responded with status {0}")]
    Status(u16),
    #[error("remote classifier reported failure")]
    NotOk,
}

impl From<RemoteClassifierError> for ApplicationError {
    fn from(error: RemoteClassifierError) -> Self {
        match error {
            RemoteClassifierError::Disabled | RemoteClassifierError::NotConfigured(_) => {
                ApplicationError::Configuration(error.to_string())
            }
            _ => ApplicationError::Integration(error.to_string()),
        }
    }
}

#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn classify(&self, request: &RemoteRequest)
        -> Result<RemoteResponse, RemoteClassifierError>;
}

/// Stand-in used when remote classification is switched off.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledRemoteClassifier;

#[async_trait]
impl RemoteClassifier for DisabledRemoteClassifier {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn classify(&self, _: &RemoteRequest) -> Result<RemoteResponse, RemoteClassifierError> {
        Err(RemoteClassifierError::Disabled)
    }
}

pub struct HttpRemoteClassifier {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpRemoteClassifier {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, RemoteClassifierError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(RemoteClassifierError::NotConfigured("base_url is empty".to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: format!("{base_url}/classify"), api_key })
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self, RemoteClassifierError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| RemoteClassifierError::NotConfigured("base_url is missing".to_string()))?;
        Self::new(base_url, config.api_key.clone(), Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteClassifier for HttpRemoteClassifier {
    async fn classify(
        &self,
        request: &RemoteRequest,
    ) -> Result<RemoteResponse, RemoteClassifierError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(RemoteClassifierError::Status(response.status().as_u16()));
        }

        let payload: RemoteResponse = response.json().await?;
        if !payload.ok {
            return Err(RemoteClassifierError::NotOk);
        }
        Ok(payload)
    }
}

/// Resolves a remote intent name against the catalog. Off-catalog names that
/// mention buying or paying are folded into the closest known intent.
pub fn map_remote_intent(name: &str) -> Intent {
    let name = name.trim().to_ascii_lowercase();
    if let Some(intent) = Intent::from_name(&name) {
        return intent;
    }
    if name.contains("buy") {
        Intent::PurchaseIntent
    } else if name.contains("pay") {
        Intent::PaymentSlipVerify
    } else {
        Intent::Unknown
    }
}
