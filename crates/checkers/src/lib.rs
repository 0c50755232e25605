//! Evidence checkers for externally-verified criteria.
//!
//! This crate provides:
//! - GitLab checks: project existence, pipeline/job status, runner identity,
//!   minimum-success job counts
//! - Grafana checks: health, folders, datasources, alert rules
//!   (provisioned / firing / history)
//! - Gmail check: monitoring alert email was sent
//! - A [`Checkers`] facade that holds whichever checkers are configured
//!
//! Every checker call carries a bounded timeout and reduces the remote
//! response to a [`CheckOutcome`]. Missing credentials disable a checker;
//! calls against a disabled checker answer with a defined "not configured"
//! error rather than a crash.

pub mod gitlab;
pub mod gmail;
pub mod grafana;
pub mod outcome;

pub use gitlab::GitLabChecker;
pub use gmail::GmailChecker;
pub use grafana::GrafanaChecker;
pub use outcome::{CheckError, CheckOutcome, CheckResult};

use labgrade_core::Config;
use tracing::warn;

/// The set of configured evidence checkers.
///
/// Each slot is `None` when its credentials are absent; accessors answer
/// with [`CheckError::NotConfigured`] in that case so the evaluator can
/// degrade the criterion instead of aborting the grading call.
pub struct Checkers {
    gitlab: Option<GitLabChecker>,
    grafana: Option<GrafanaChecker>,
    gmail: Option<GmailChecker>,
}

impl Checkers {
    /// Build checkers for every configured credential block.
    ///
    /// A block whose client fails to construct is logged and skipped.
    pub fn from_config(config: &Config) -> Self {
        let gitlab = config.gitlab.as_ref().and_then(|cfg| {
            GitLabChecker::from_config(cfg)
                .map_err(|e| warn!(error = %e, "failed to build GitLab checker"))
                .ok()
        });
        let grafana = config.grafana.as_ref().and_then(|cfg| {
            GrafanaChecker::from_config(cfg)
                .map_err(|e| warn!(error = %e, "failed to build Grafana checker"))
                .ok()
        });
        let gmail = config.gmail.as_ref().and_then(|cfg| {
            GmailChecker::from_config(cfg)
                .map_err(|e| warn!(error = %e, "failed to build Gmail checker"))
                .ok()
        });

        Self {
            gitlab,
            grafana,
            gmail,
        }
    }

    /// A checker set with every external system disabled.
    pub fn disabled() -> Self {
        Self {
            gitlab: None,
            grafana: None,
            gmail: None,
        }
    }

    pub fn gitlab(&self) -> Result<&GitLabChecker, CheckError> {
        self.gitlab
            .as_ref()
            .ok_or(CheckError::NotConfigured("gitlab"))
    }

    pub fn grafana(&self) -> Result<&GrafanaChecker, CheckError> {
        self.grafana
            .as_ref()
            .ok_or(CheckError::NotConfigured("grafana"))
    }

    pub fn gmail(&self) -> Result<&GmailChecker, CheckError> {
        self.gmail
            .as_ref()
            .ok_or(CheckError::NotConfigured("gmail"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_set_answers_not_configured() {
        let checkers = Checkers::disabled();
        assert!(matches!(
            checkers.gitlab(),
            Err(CheckError::NotConfigured("gitlab"))
        ));
        assert!(matches!(
            checkers.grafana(),
            Err(CheckError::NotConfigured("grafana"))
        ));
        assert!(matches!(
            checkers.gmail(),
            Err(CheckError::NotConfigured("gmail"))
        ));
    }
}
