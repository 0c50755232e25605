//! Grafana evidence checker: instance health, folders, datasources, and
//! alert rules (provisioned, firing, and historical).
//!
//! Grafana is queried through a credentials login (`POST /login`) whose
//! cookie session lives in the checker's own `reqwest` cookie store. The
//! session is created lazily, reused across calls, and invalidated when a
//! request answers 401 so the next call logs in again.
//!
//! Alert rule names are matched after normalization (lowercase, alphanumeric
//! only) because dashboards are hand-authored and students rarely reproduce
//! punctuation exactly.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use labgrade_core::config::GrafanaConfig;

use crate::outcome::{CheckError, CheckOutcome, CheckResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lookback window for alert history checks.
pub const DEFAULT_LOOKBACK_HOURS: u32 = 24;

/// Authenticated client over the Grafana HTTP API.
pub struct GrafanaChecker {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
    /// Whether the cookie store currently holds a live session.
    logged_in: Mutex<bool>,
}

impl GrafanaChecker {
    /// Build a checker from configuration. No login happens here; the
    /// session is created on first use.
    pub fn from_config(cfg: &GrafanaConfig) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            client,
            logged_in: Mutex::new(false),
        })
    }

    /// Whether the instance reports a healthy database.
    pub async fn health(&self) -> CheckResult {
        let data = self.get_json("/api/health", &[]).await?;
        if data.get("database").and_then(Value::as_str) == Some("ok") {
            Ok(CheckOutcome::pass("database ok"))
        } else {
            Ok(CheckOutcome::fail(format!(
                "database status is {:?}",
                data.get("database")
            )))
        }
    }

    /// Whether a dashboard folder exists with the given uid.
    pub async fn folder_exists(&self, uid: &str) -> CheckResult {
        self.ensure_session().await?;
        let url = format!("{}/api/folders/{uid}", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        debug!(%url, %status, "grafana folder lookup");

        match status.as_u16() {
            200 => Ok(CheckOutcome::pass(format!("folder '{uid}' exists"))),
            401 => {
                self.invalidate_session().await;
                Err(CheckError::Auth("grafana session rejected".to_string()))
            }
            404 => Ok(CheckOutcome::fail(format!("folder '{uid}' not found"))),
            code => Err(CheckError::Api {
                status: code,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Whether a datasource exists with the given name.
    pub async fn datasource_exists(&self, name: &str) -> CheckResult {
        let data = self.get_json("/api/datasources", &[]).await?;
        let found = data
            .as_array()
            .map(|sources| {
                sources
                    .iter()
                    .any(|ds| ds.get("name").and_then(Value::as_str) == Some(name))
            })
            .unwrap_or(false);
        if found {
            Ok(CheckOutcome::pass(format!("datasource '{name}' exists")))
        } else {
            Ok(CheckOutcome::fail(format!("datasource '{name}' not found")))
        }
    }

    /// Whether a provisioned alert rule exists with the given (normalized)
    /// name.
    pub async fn alert_rule_exists(&self, rule_name: &str) -> CheckResult {
        let data = self
            .get_json("/api/v1/provisioning/alert-rules", &[])
            .await?;
        Ok(alert_rule_verdict(&data, rule_name))
    }

    /// Whether the named alert is currently active/firing.
    pub async fn alert_firing(&self, rule_name: &str) -> CheckResult {
        let data = self
            .get_json("/api/alertmanager/grafana/api/v2/alerts", &[])
            .await?;
        Ok(alert_firing_verdict(&data, rule_name))
    }

    /// Whether the named alert entered the `Alerting` state within the
    /// lookback window.
    pub async fn alert_fired_recently(&self, rule_name: &str, hours: u32) -> CheckResult {
        let to = Utc::now().timestamp();
        let from = to - i64::from(hours) * 3600;
        let data = self
            .get_json(
                "/api/v1/rules/history",
                &[
                    ("from", from.to_string()),
                    ("to", to.to_string()),
                    ("limit", "5000".to_string()),
                ],
            )
            .await?;
        Ok(alert_history_verdict(&data, rule_name))
    }

    // ── Session handling ────────────────────────────────────────────

    async fn ensure_session(&self) -> Result<(), CheckError> {
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in {
            return Ok(());
        }

        let url = format!("{}/login", self.base_url);
        let body = serde_json::json!({
            "user": self.username,
            "password": self.password,
        });
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() || !text.contains("Logged in") {
            return Err(CheckError::Auth(format!(
                "grafana login failed with status {status}"
            )));
        }

        debug!("grafana login ok");
        *logged_in = true;
        Ok(())
    }

    async fn invalidate_session(&self) {
        *self.logged_in.lock().await = false;
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, CheckError> {
        self.ensure_session().await?;

        let url = format!("{}{path}", self.base_url);
        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status();
        debug!(%url, %status, "grafana request");

        if status.as_u16() == 401 {
            self.invalidate_session().await;
            return Err(CheckError::Auth("grafana session rejected".to_string()));
        }
        if !status.is_success() {
            return Err(CheckError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }
}

// ── Verdict reducers ────────────────────────────────────────────────

/// Lowercase and strip everything but letters and digits.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn alert_rule_verdict(rules: &Value, rule_name: &str) -> CheckOutcome {
    let target = normalize(rule_name);
    let found = rules.as_array().and_then(|rules| {
        rules.iter().find_map(|rule| {
            let title = rule
                .get("title")
                .or_else(|| rule.get("name"))
                .and_then(Value::as_str)?;
            (normalize(title) == target).then(|| title.to_string())
        })
    });

    match found {
        Some(title) => CheckOutcome::pass(format!("alert rule exists: {title}")),
        None => CheckOutcome::fail(format!("alert rule '{rule_name}' not found")),
    }
}

fn alert_firing_verdict(alerts: &Value, rule_name: &str) -> CheckOutcome {
    let target = normalize(rule_name);
    let mut found_state: Option<String> = None;

    for alert in alerts.as_array().map(Vec::as_slice).unwrap_or_default() {
        let state = alert
            .pointer("/status/state")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        // Rule names show up in labels.alertname and annotations.
        let candidates = [
            alert.pointer("/labels/alertname"),
            alert.pointer("/annotations/summary"),
            alert.pointer("/annotations/description"),
        ];
        let matched = candidates
            .iter()
            .flatten()
            .filter_map(|v| v.as_str())
            .any(|c| normalize(c) == target);

        if matched {
            // Alertmanager v2 reports firing alerts as 'active'.
            if state == "active" || state == "firing" {
                return CheckOutcome::pass("alert firing");
            }
            found_state = Some(state.to_string());
        }
    }

    match found_state {
        Some(state) => CheckOutcome::fail(format!("alert found but state is '{state}'")),
        None => CheckOutcome::fail(format!("alert '{rule_name}' not found")),
    }
}

fn alert_history_verdict(data: &Value, rule_name: &str) -> CheckOutcome {
    let target = normalize(rule_name);
    let frame = data
        .pointer("/data/values")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if frame.len() < 2 {
        return CheckOutcome::fail("no alert history data".to_string());
    }

    let lines = frame[1].as_array().map(Vec::as_slice).unwrap_or_default();
    for line in lines {
        let title = line
            .get("ruleTitle")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let alertname = line
            .pointer("/labels/alertname")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let current = line
            .get("current")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if (normalize(title) == target || normalize(alertname) == target) && current == "Alerting"
        {
            return CheckOutcome::pass("alert fired within lookback window");
        }
    }
    CheckOutcome::fail(format!("alert '{rule_name}' not found in history"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_strips_case_and_punctuation() {
        assert_eq!(normalize("High CPU (node-1)!"), "highcpunode1");
        assert_eq!(normalize("high_cpu_node_1"), "highcpunode1");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn alert_rule_matches_normalized_title() {
        let rules = json!([
            {"title": "High CPU Usage"},
            {"name": "Disk Full"}
        ]);
        assert!(alert_rule_verdict(&rules, "high-cpu-usage").ok);
        assert!(alert_rule_verdict(&rules, "disk full").ok);
        assert!(!alert_rule_verdict(&rules, "memory leak").ok);
    }

    #[test]
    fn alert_firing_active_state_passes() {
        let alerts = json!([
            {
                "status": {"state": "active"},
                "labels": {"alertname": "HighCPU"},
                "annotations": {"summary": "CPU over 90%"}
            }
        ]);
        assert!(alert_firing_verdict(&alerts, "high cpu").ok);
    }

    #[test]
    fn alert_firing_suppressed_state_fails_with_state() {
        let alerts = json!([
            {
                "status": {"state": "suppressed"},
                "labels": {"alertname": "HighCPU"}
            }
        ]);
        let verdict = alert_firing_verdict(&alerts, "high cpu");
        assert!(!verdict.ok);
        assert!(verdict.message.contains("suppressed"));
    }

    #[test]
    fn alert_firing_matches_annotation_summary() {
        let alerts = json!([
            {
                "status": {"state": "firing"},
                "labels": {},
                "annotations": {"summary": "disk-full"}
            }
        ]);
        assert!(alert_firing_verdict(&alerts, "Disk Full").ok);
    }

    #[test]
    fn alert_firing_unknown_rule_fails() {
        let alerts = json!([]);
        let verdict = alert_firing_verdict(&alerts, "anything");
        assert!(!verdict.ok);
        assert!(verdict.message.contains("not found"));
    }

    #[test]
    fn history_matches_rule_title_in_alerting_state() {
        let data = json!({
            "data": {
                "values": [
                    [1000, 2000],
                    [
                        {"ruleTitle": "High CPU", "labels": {}, "current": "Normal"},
                        {"ruleTitle": "High CPU", "labels": {}, "current": "Alerting"}
                    ]
                ]
            }
        });
        assert!(alert_history_verdict(&data, "high cpu").ok);
    }

    #[test]
    fn history_matches_alertname_label() {
        let data = json!({
            "data": {
                "values": [
                    [1000],
                    [{"ruleTitle": "", "labels": {"alertname": "DiskFull"}, "current": "Alerting"}]
                ]
            }
        });
        assert!(alert_history_verdict(&data, "disk-full").ok);
    }

    #[test]
    fn history_without_frames_fails() {
        let data = json!({"data": {"values": []}});
        let verdict = alert_history_verdict(&data, "x");
        assert!(!verdict.ok);
        assert!(verdict.message.contains("no alert history"));
    }

    #[test]
    fn history_never_alerting_fails() {
        let data = json!({
            "data": {
                "values": [
                    [1000],
                    [{"ruleTitle": "High CPU", "labels": {}, "current": "Normal"}]
                ]
            }
        });
        assert!(!alert_history_verdict(&data, "high cpu").ok);
    }
}
