//! CI provider build and artifact listing client.
//!
//! Talks to a CircleCI-style v1.1 REST API: a project build list, a
//! per-build artifact list, and raw artifact downloads, authenticated with a
//! `Circle-Token` header.

use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::{debug, info};

use nbforge_shared::{NbforgeError, Result};

/// Author-commit timestamp format in build summaries.
pub const AUTHOR_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Authentication header carrying the provider token.
const TOKEN_HEADER: &str = "Circle-Token";

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("nbforge/", env!("CARGO_PKG_VERSION"));

/// One entry of the project build list.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSummary {
    pub author_date: String,
    pub vcs_type: String,
    pub username: String,
    pub reponame: String,
    pub build_num: u64,
}

/// One entry of a build's artifact list.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactRef {
    pub url: String,
}

/// HTTP client for the CI provider API.
pub struct CiClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl CiClient {
    /// Create a client for the given API base URL and bearer token.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| NbforgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    /// The project build-list endpoint for a GitHub-hosted repository.
    pub fn project_url(&self, org: &str, repo_name: &str) -> String {
        format!("{}/project/github/{org}/{repo_name}", self.base_url)
    }

    /// List recent builds for a project, newest first.
    pub async fn list_builds(&self, org: &str, repo_name: &str) -> Result<Vec<BuildSummary>> {
        let url = self.project_url(org, repo_name);
        debug!(%url, "listing project builds");

        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| NbforgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NbforgeError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| NbforgeError::parse(format!("{url}: invalid build list: {e}")))
    }

    /// List the artifacts of one build.
    pub async fn list_artifacts(&self, build: &BuildSummary) -> Result<Vec<ArtifactRef>> {
        let url = format!(
            "{}/project/{}/{}/{}/{}/artifacts",
            self.base_url, build.vcs_type, build.username, build.reponame, build.build_num
        );
        debug!(%url, "listing build artifacts");

        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| NbforgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NbforgeError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| NbforgeError::parse(format!("{url}: invalid artifact list: {e}")))
    }

    /// Download one artifact file to `dest`.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!(%url, dest = %dest.display(), "storing artifact file");

        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| NbforgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NbforgeError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NbforgeError::Network(format!("{url}: body read failed: {e}")))?;

        std::fs::write(dest, &body).map_err(|e| NbforgeError::io(dest, e))?;
        Ok(())
    }
}

/// Select the most recent cohort of builds sharing the newest author-commit
/// timestamp. Ties are broken by inclusion: every build matching the latest
/// timestamp is kept, and selection stops at the first older one.
pub fn latest_build_cohort(builds: &[BuildSummary]) -> Result<Vec<BuildSummary>> {
    let mut cohort = Vec::new();
    let mut latest: Option<NaiveDateTime> = None;

    for build in builds {
        let date = NaiveDateTime::parse_from_str(&build.author_date, AUTHOR_DATE_FORMAT)
            .map_err(|e| {
                NbforgeError::parse(format!("bad author_date {:?}: {e}", build.author_date))
            })?;

        match latest {
            None => {
                latest = Some(date);
                cohort.push(build.clone());
            }
            Some(newest) if newest == date => cohort.push(build.clone()),
            Some(_) => break,
        }
    }

    Ok(cohort)
}

/// Artifact URLs of one build, with index pages dropped — or `None` when the
/// remaining count is odd, meaning the HTML/metadata pairs are incomplete and
/// the whole build must be excluded.
pub fn complete_build_urls(artifacts: &[ArtifactRef]) -> Option<Vec<String>> {
    let urls: Vec<String> = artifacts
        .iter()
        .map(|a| a.url.clone())
        .filter(|url| !url.ends_with("index.html"))
        .collect();

    if urls.len() % 2 == 0 { Some(urls) } else { None }
}
