//! Scheme and criterion types with serde deserialization.
//!
//! A scheme is the declarative rubric for one lab: an ordered list of
//! criteria, each with a kind tag, a point value, and kind-specific fields.
//! Unknown kind tags deserialize fine and resolve to [`CheckKind::Unsupported`]
//! so a malformed criterion degrades to a failed check instead of aborting
//! the grading call.

use serde::{Deserialize, Serialize};

/// Declarative rubric for one lab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scheme {
    pub lab_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub criteria: Vec<Criterion>,
}

/// One gradable check within a scheme.
///
/// `kind` is kept as the raw tag string; [`Criterion::kind`] resolves it to
/// the [`CheckKind`] sum type. For locally-verified kinds `key` names the
/// entry in the submitted evidence payload; for externally-verified kinds it
/// holds the identifying reference (GitLab `namespace/path`, Grafana folder
/// uid or datasource name, alert sender address).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Criterion {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default)]
    pub score: f64,

    // ── Checker-specific fields ─────────────────────────────────────
    /// Git ref whose latest pipeline is inspected (defaults to `main`).
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Named CI job to inspect (defaults to `build-image`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    /// Pipeline stages counted by `gitlab_pipeline_min_success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<String>>,
    /// Minimum successful job count for `gitlab_pipeline_min_success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<usize>,
    /// Alert rule name for the Grafana alert checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Lookback window for `grafana_alert_history` (defaults to 24).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_hours: Option<u32>,
}

impl Criterion {
    /// Resolve the raw kind tag into the criterion kind sum type.
    pub fn kind(&self) -> CheckKind {
        CheckKind::parse(&self.kind)
    }
}

// ── Criterion kinds ─────────────────────────────────────────────────

/// Enumerated criterion kinds, with an explicit fallback for tags this
/// engine does not know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    // Locally verified against the submitted evidence payload.
    Command,
    FileExists,
    FileContent,
    Service,
    Directory,
    ConfigCheck,
    Package,
    User,
    Group,
    // Verified by the GitLab checker.
    GitlabProject,
    GitlabPipeline,
    GitlabRunner,
    GitlabPipelineMinSuccess,
    // Verified by the Grafana checker.
    GrafanaHealth,
    GrafanaFolder,
    GrafanaDatasource,
    GrafanaAlertRule,
    GrafanaAlertFiring,
    GrafanaAlertHistory,
    // Verified by the Gmail checker.
    EmailAlertSent,
    /// Unknown tag; always fails evaluation with a descriptive message.
    Unsupported(String),
}

impl CheckKind {
    /// Parse a raw kind tag.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "command" => CheckKind::Command,
            "file_exists" => CheckKind::FileExists,
            "file_content" => CheckKind::FileContent,
            "service" => CheckKind::Service,
            "directory" => CheckKind::Directory,
            "config_check" => CheckKind::ConfigCheck,
            "package" => CheckKind::Package,
            "user" => CheckKind::User,
            "group" => CheckKind::Group,
            "gitlab_project" => CheckKind::GitlabProject,
            "gitlab_pipeline" => CheckKind::GitlabPipeline,
            "gitlab_runner" => CheckKind::GitlabRunner,
            "gitlab_pipeline_min_success" => CheckKind::GitlabPipelineMinSuccess,
            "grafana_health" => CheckKind::GrafanaHealth,
            "grafana_folder" => CheckKind::GrafanaFolder,
            "grafana_datasource" => CheckKind::GrafanaDatasource,
            "grafana_alert_rule" => CheckKind::GrafanaAlertRule,
            "grafana_alert_firing" => CheckKind::GrafanaAlertFiring,
            "grafana_alert_history" => CheckKind::GrafanaAlertHistory,
            "email_alert_sent" => CheckKind::EmailAlertSent,
            other => CheckKind::Unsupported(other.to_string()),
        }
    }

    /// Whether this kind is resolved by an external evidence checker
    /// rather than the submitted evidence payload.
    pub fn is_remote(&self) -> bool {
        !matches!(
            self,
            CheckKind::Command
                | CheckKind::FileExists
                | CheckKind::FileContent
                | CheckKind::Service
                | CheckKind::Directory
                | CheckKind::ConfigCheck
                | CheckKind::Package
                | CheckKind::User
                | CheckKind::Group
                | CheckKind::Unsupported(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scheme_json() {
        let scheme: Scheme = serde_json::from_str(
            r#"{
                "lab_id": "lab01",
                "description": "Basic host hardening",
                "criteria": [
                    {"type": "command", "key": "whoami_output", "description": "ran as root", "expected": "root", "score": 20},
                    {"type": "file_exists", "key": "marker", "description": "marker removed", "expected": "deleted", "score": 10},
                    {"type": "gitlab_pipeline", "key": "group/app", "description": "pipeline green", "ref": "main", "job": "build-image", "score": 30}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(scheme.lab_id, "lab01");
        assert_eq!(scheme.criteria.len(), 3);
        assert_eq!(scheme.criteria[0].kind(), CheckKind::Command);
        assert_eq!(scheme.criteria[2].git_ref.as_deref(), Some("main"));
        assert_eq!(scheme.criteria[2].job.as_deref(), Some("build-image"));
    }

    #[test]
    fn unknown_kind_falls_back_to_unsupported() {
        let criterion: Criterion =
            serde_json::from_str(r#"{"type": "bogus", "description": "x"}"#).unwrap();
        assert_eq!(
            criterion.kind(),
            CheckKind::Unsupported("bogus".to_string())
        );
        assert!(!criterion.kind().is_remote());
    }

    #[test]
    fn remote_split() {
        assert!(!CheckKind::parse("command").is_remote());
        assert!(!CheckKind::parse("group").is_remote());
        assert!(CheckKind::parse("gitlab_project").is_remote());
        assert!(CheckKind::parse("grafana_alert_firing").is_remote());
        assert!(CheckKind::parse("email_alert_sent").is_remote());
    }

    #[test]
    fn scheme_round_trips_through_json() {
        let scheme = Scheme {
            lab_id: "lab02".to_string(),
            description: None,
            criteria: vec![Criterion {
                kind: "service".to_string(),
                key: "nginx_state".to_string(),
                description: "nginx running".to_string(),
                expected: Some("active".to_string()),
                contains: None,
                score: 100.0,
                git_ref: None,
                job: None,
                stages: None,
                min_count: None,
                rule: None,
                lookback_hours: None,
            }],
        };

        let json = serde_json::to_string(&scheme).unwrap();
        let back: Scheme = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scheme);
    }
}
