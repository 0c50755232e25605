//! Environment-driven configuration.
//!
//! All settings come from environment variables (optionally via a `.env`
//! file). Checker credential blocks are optional: a missing block disables
//! that checker, it never fails startup.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `<lab_id>.json` scheme files.
    pub scheme_dir: PathBuf,
    /// Directory holding per-lab audit logs (`<lab_id>.log`).
    pub audit_log_dir: PathBuf,
    /// Optional JSON-lines file for grading results.
    pub results_path: Option<PathBuf>,
    pub gitlab: Option<GitLabConfig>,
    pub grafana: Option<GrafanaConfig>,
    pub gmail: Option<GmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    pub base_url: String,
    pub private_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrafanaConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    ///
    /// Checker blocks require every one of their variables; partial blocks
    /// are treated as absent and logged at debug level.
    pub fn from_env() -> Self {
        let gitlab = match (env_opt("GITLAB_URL"), env_opt("GITLAB_PRIVATE_TOKEN")) {
            (Some(base_url), Some(private_token)) => Some(GitLabConfig {
                base_url,
                private_token,
            }),
            _ => {
                tracing::debug!("GitLab checker not configured");
                None
            }
        };

        let grafana = match (
            env_opt("GRAFANA_URL"),
            env_opt("GRAFANA_USER"),
            env_opt("GRAFANA_PASS"),
        ) {
            (Some(base_url), Some(username), Some(password)) => Some(GrafanaConfig {
                base_url,
                username,
                password,
            }),
            _ => {
                tracing::debug!("Grafana checker not configured");
                None
            }
        };

        let gmail = match (
            env_opt("GOOGLE_CLIENT_ID"),
            env_opt("GOOGLE_CLIENT_SECRET"),
            env_opt("GMAIL_MONITOR_REFRESH_TOKEN"),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(GmailConfig {
                client_id,
                client_secret,
                refresh_token,
            }),
            _ => {
                tracing::debug!("Gmail checker not configured");
                None
            }
        };

        Self {
            scheme_dir: PathBuf::from(env_or("LABGRADE_SCHEME_DIR", "schemes")),
            audit_log_dir: PathBuf::from(env_or("LABGRADE_AUDIT_LOG_DIR", "logs/labs")),
            results_path: env_opt("LABGRADE_RESULTS_PATH").map(PathBuf::from),
            gitlab,
            grafana,
            gmail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so concurrent test threads never race on the same
    // environment variables.
    #[test]
    fn gitlab_block_requires_every_variable() {
        env::remove_var("GITLAB_URL");
        env::set_var("GITLAB_PRIVATE_TOKEN", "tok");
        let cfg = Config::from_env();
        assert!(cfg.gitlab.is_none());
        assert_eq!(cfg.scheme_dir, PathBuf::from("schemes"));

        env::set_var("GITLAB_URL", "https://gitlab.example.com");
        let cfg = Config::from_env();
        let gl = cfg.gitlab.expect("gitlab block");
        assert_eq!(gl.base_url, "https://gitlab.example.com");
        assert_eq!(gl.private_token, "tok");

        env::remove_var("GITLAB_URL");
        env::remove_var("GITLAB_PRIVATE_TOKEN");
    }
}
