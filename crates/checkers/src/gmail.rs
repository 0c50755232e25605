//! Gmail evidence checker: verify that a monitoring alert email was sent.
//!
//! Exchanges an OAuth2 refresh token for a short-lived access token on every
//! call (no token caching), then searches the monitored mailbox for messages
//! from the expected sender. One or more matches counts as "alert sent".

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use labgrade_core::config::GmailConfig;

use crate::outcome::{CheckError, CheckOutcome, CheckResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const MESSAGES_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages";

/// OAuth2 client over the Gmail REST API.
#[derive(Debug)]
pub struct GmailChecker {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    client: reqwest::Client,
}

impl GmailChecker {
    /// Build a checker from configuration.
    pub fn from_config(cfg: &GmailConfig) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            refresh_token: cfg.refresh_token.clone(),
            client,
        })
    }

    /// Whether at least one message from `sender` is present in the
    /// monitored mailbox.
    pub async fn alert_email_sent(&self, sender: &str) -> CheckResult {
        let access_token = self.access_token().await?;

        let response = self
            .client
            .get(MESSAGES_ENDPOINT)
            .bearer_auth(access_token)
            .query(&[("q", search_query(sender)), ("maxResults", "1".to_string())])
            .send()
            .await?;
        let status = response.status();
        debug!(%status, sender, "gmail message search");

        if !status.is_success() {
            return Ok(CheckOutcome::fail(format!(
                "gmail search failed with status {status}"
            )));
        }

        let data: Value = response.json().await?;
        let found = data
            .get("messages")
            .and_then(Value::as_array)
            .map(|m| !m.is_empty())
            .unwrap_or(false);

        if found {
            Ok(CheckOutcome::pass("alert email found"))
        } else {
            Ok(CheckOutcome::fail(format!(
                "no alert email found from {sender}"
            )))
        }
    }

    /// Exchange the refresh token for an access token.
    async fn access_token(&self) -> Result<String, CheckError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CheckError::Auth(format!(
                "token refresh failed with status {status}: {body}"
            )));
        }

        let tokens: Value = response.json().await?;
        tokens
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CheckError::Auth("token response missing access_token".to_string()))
    }
}

/// Gmail search query for messages from a sender.
fn search_query(sender: &str) -> String {
    format!("from:{sender}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_format() {
        assert_eq!(
            search_query("monitoring@example.com"),
            "from:monitoring@example.com"
        );
    }
}
