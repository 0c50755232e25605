//! GitLab evidence checker: project existence, pipeline/job status, runner
//! identity, and minimum-success job counts.
//!
//! All requests carry the `PRIVATE-TOKEN` header and a 10 s client timeout.
//! The direct project lookup endpoint is unreliable on some instances and
//! occasionally answers 500; in that case we fall back to the name-search
//! endpoint and match `path_with_namespace` exactly.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use labgrade_core::config::GitLabConfig;

use crate::outcome::{CheckError, CheckOutcome, CheckResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Job inspected when a criterion names none.
pub const DEFAULT_JOB: &str = "build-image";
/// Minimum successful job count when a criterion names none.
pub const DEFAULT_MIN_COUNT: usize = 3;
/// Stages counted when a criterion names none.
pub const DEFAULT_STAGES: &[&str] = &["staging", "production"];

// ── API payloads ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub runner: Option<Runner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Runner {
    #[serde(default)]
    pub description: Option<String>,
}

// ── Checker ─────────────────────────────────────────────────────────

/// Authenticated client over the GitLab REST API (v4).
#[derive(Debug)]
pub struct GitLabChecker {
    base_url: String,
    client: reqwest::Client,
}

impl GitLabChecker {
    /// Build a checker from configuration.
    pub fn from_config(cfg: &GitLabConfig) -> Result<Self, CheckError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut token = reqwest::header::HeaderValue::from_str(&cfg.private_token)
            .map_err(|_| CheckError::Auth("invalid GitLab private token".to_string()))?;
        token.set_sensitive(true);
        headers.insert("PRIVATE-TOKEN", token);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Whether a project exists at the given namespace path.
    pub async fn project_exists(&self, path: &str) -> CheckResult {
        match self.find_project(path).await? {
            Some(project) => Ok(CheckOutcome::pass(format!(
                "project found: {}",
                project.path_with_namespace
            ))),
            None => Ok(CheckOutcome::fail(format!("project '{path}' not found"))),
        }
    }

    /// Whether the latest pipeline on `git_ref` succeeded.
    ///
    /// When `job` is set, the named job's status decides instead of the
    /// overall pipeline status.
    pub async fn pipeline_success(
        &self,
        path: &str,
        git_ref: &str,
        job: Option<&str>,
    ) -> CheckResult {
        let Some(project) = self.find_project(path).await? else {
            return Ok(CheckOutcome::fail(format!("project '{path}' not found")));
        };
        let Some(pipeline) = self.latest_pipeline(project.id, git_ref).await? else {
            return Ok(CheckOutcome::fail(format!(
                "no pipeline found for ref '{git_ref}'"
            )));
        };

        match job {
            Some(name) => {
                let jobs = self.pipeline_jobs(project.id, pipeline.id).await?;
                Ok(job_verdict(&jobs, name))
            }
            None => {
                if pipeline.status == "success" {
                    Ok(CheckOutcome::pass("pipeline succeeded"))
                } else {
                    Ok(CheckOutcome::fail(format!(
                        "pipeline status is '{}'",
                        pipeline.status
                    )))
                }
            }
        }
    }

    /// Whether the named job in the latest pipeline ran on a runner whose
    /// description contains `expected`.
    pub async fn runner_match(
        &self,
        path: &str,
        git_ref: &str,
        job: &str,
        expected: &str,
    ) -> CheckResult {
        let Some(project) = self.find_project(path).await? else {
            return Ok(CheckOutcome::fail(format!("project '{path}' not found")));
        };
        let Some(pipeline) = self.latest_pipeline(project.id, git_ref).await? else {
            return Ok(CheckOutcome::fail(format!(
                "no pipeline found for ref '{git_ref}'"
            )));
        };
        let jobs = self.pipeline_jobs(project.id, pipeline.id).await?;
        Ok(runner_verdict(&jobs, job, expected))
    }

    /// Whether at least `min_count` jobs in the given stages succeeded in
    /// the latest pipeline on `git_ref`.
    pub async fn min_success(
        &self,
        path: &str,
        git_ref: &str,
        stages: &[String],
        min_count: usize,
    ) -> CheckResult {
        let Some(project) = self.find_project(path).await? else {
            return Ok(CheckOutcome::fail(format!("project '{path}' not found")));
        };
        let Some(pipeline) = self.latest_pipeline(project.id, git_ref).await? else {
            return Ok(CheckOutcome::fail(format!(
                "no pipeline found for ref '{git_ref}'"
            )));
        };
        let jobs = self.pipeline_jobs(project.id, pipeline.id).await?;
        Ok(min_success_verdict(&jobs, stages, min_count))
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Look up a project by namespace path, with a name-search fallback when
    /// the direct endpoint answers 500.
    async fn find_project(&self, path: &str) -> Result<Option<Project>, CheckError> {
        let url = format!("{}/api/v4/projects/{}", self.base_url, encode_path(path));
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        debug!(%url, %status, "gitlab project lookup");

        match status.as_u16() {
            200 => Ok(Some(response.json().await?)),
            404 => Ok(None),
            500 => self.search_project(path).await,
            code => Err(CheckError::Api {
                status: code,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn search_project(&self, path: &str) -> Result<Option<Project>, CheckError> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let url = format!("{}/api/v4/projects", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("search", name)])
            .send()
            .await?;
        let status = response.status();
        debug!(%url, %status, search = %name, "gitlab project search fallback");

        if !status.is_success() {
            return Err(CheckError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let projects: Vec<Project> = response.json().await?;
        Ok(projects.into_iter().find(|p| p.path_with_namespace == path))
    }

    async fn latest_pipeline(
        &self,
        project_id: u64,
        git_ref: &str,
    ) -> Result<Option<Pipeline>, CheckError> {
        let url = format!("{}/api/v4/projects/{project_id}/pipelines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("ref", git_ref), ("per_page", "1")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let mut pipelines: Vec<Pipeline> = response.json().await?;
        Ok(if pipelines.is_empty() {
            None
        } else {
            Some(pipelines.remove(0))
        })
    }

    async fn pipeline_jobs(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<Vec<Job>, CheckError> {
        let url = format!(
            "{}/api/v4/projects/{project_id}/pipelines/{pipeline_id}/jobs",
            self.base_url
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
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

/// Percent-encode a namespace path for use as a single URL segment.
///
/// Uses path-segment encoding (space becomes `%20`, never `+`).
fn encode_path(path: &str) -> String {
    let mut url = url::Url::parse("https://gitlab.invalid").expect("static base url");
    url.path_segments_mut()
        .expect("https urls have path segments")
        .push(path);
    url.path().trim_start_matches('/').to_string()
}

/// Verdict for a single named job in a job list.
fn job_verdict(jobs: &[Job], name: &str) -> CheckOutcome {
    match jobs.iter().find(|j| j.name == name) {
        Some(job) if job.status == "success" => {
            CheckOutcome::pass(format!("job '{name}' succeeded"))
        }
        Some(job) => CheckOutcome::fail(format!("job '{name}' status is '{}'", job.status)),
        None => CheckOutcome::fail(format!("job '{name}' not found in latest pipeline")),
    }
}

/// Verdict for runner identity: the named job must have run on a runner
/// whose description contains `expected`.
fn runner_verdict(jobs: &[Job], name: &str, expected: &str) -> CheckOutcome {
    let Some(job) = jobs.iter().find(|j| j.name == name) else {
        return CheckOutcome::fail(format!("job '{name}' not found in latest pipeline"));
    };
    let description = job
        .runner
        .as_ref()
        .and_then(|r| r.description.as_deref())
        .unwrap_or("");
    if description.contains(expected) {
        CheckOutcome::pass(format!("job '{name}' ran on runner '{description}'"))
    } else {
        CheckOutcome::fail(format!(
            "job '{name}' ran on runner '{description}', expected '{expected}'"
        ))
    }
}

/// Verdict for the minimum-success count across the given stages.
fn min_success_verdict(jobs: &[Job], stages: &[String], min_count: usize) -> CheckOutcome {
    let succeeded = jobs
        .iter()
        .filter(|j| j.status == "success" && stages.iter().any(|s| *s == j.stage))
        .count();
    if succeeded >= min_count {
        CheckOutcome::pass(format!(
            "{succeeded} successful jobs in stages {stages:?}"
        ))
    } else {
        CheckOutcome::fail(format!(
            "only {succeeded} successful jobs in stages {stages:?}, need {min_count}"
        ))
    }
}
