//! Deployment platform client (Pages deployments API).

use serde::Deserialize;

use crate::config::PagesConfig;
use crate::error::{GateError, Result};

#[derive(Debug, Default, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    messages: Vec<ApiMessage>,
}

impl Envelope {
    fn failure_message(self, status: u16) -> String {
        self.errors
            .into_iter()
            .chain(self.messages)
            .find_map(|m| m.message.filter(|s| !s.is_empty()))
            .unwrap_or_else(|| format!("Pages API error ({status})"))
    }
}

#[derive(Debug, Clone)]
pub struct PagesClient {
    http: reqwest::Client,
    config: PagesConfig,
}

impl PagesClient {
    pub fn new(http: reqwest::Client, config: PagesConfig) -> Self {
        Self { http, config }
    }

    /// The platform's bounded list of recent deployments, newest first.
    ///
    /// Entries are returned as raw JSON; field locations vary by trigger type.
    pub async fn list_deployments(&self, project: &str) -> Result<Vec<serde_json::Value>> {
        let (Some(account), Some(token)) = (&self.config.account_id, &self.config.token) else {
            return Err(GateError::MissingCredentials("CF_ACCOUNT_ID / CF_API_TOKEN"));
        };
        let url = format!(
            "{}/accounts/{account}/pages/projects/{project}/deployments",
            self.config.api_base.trim_end_matches('/')
        );

        let res = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("content-type", "application/json")
            .send()
            .await
            .map_err(|e| GateError::Upstream(format!("Pages request failed: {e}")))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| GateError::Upstream(format!("Pages response unreadable: {e}")))?;
        let envelope: Envelope = serde_json::from_str(&text).unwrap_or_default();

        if !status.is_success() || !envelope.success {
            return Err(GateError::Upstream(
                envelope.failure_message(status.as_u16()),
            ));
        }
        Ok(envelope.result.unwrap_or_default())
    }
}
