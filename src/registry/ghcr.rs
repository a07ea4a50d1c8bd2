use crate::error::{PguError, Result};
use crate::registry::{ArtifactRef, TagSource};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, LINK};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// The only registry host whose tags can be listed.
pub const GHCR_HOST: &str = "ghcr.io";

const PAGE_SIZE: &str = "100";
const MAX_PAGES: usize = 50;
const MAX_PAGE_BYTES: usize = 10 * 1024 * 1024;
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Tag listing for container packages hosted on GitHub (`ghcr.io`), backed by
/// the GitHub Packages REST API.
///
/// For an artifact `ghcr.io/<org>/<rest...>/<name>` the package is
/// `<rest...>/<name>` under organisation `<org>`.
pub struct GhcrTagSource {
    client: Client,
    api_url: Url,
    token: Option<String>,
}

impl GhcrTagSource {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self> {
        let api_url = Self::validate_api_url(api_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("pgu/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| PguError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn validate_api_url(api_url: &str) -> Result<Url> {
        let parsed = Url::parse(api_url).map_err(|e| {
            PguError::Configuration(format!("Invalid API URL '{}': {}", api_url, e))
        })?;

        match parsed.scheme() {
            "https" | "http" => {}
            other => {
                return Err(PguError::Configuration(format!(
                    "Unsupported API URL scheme '{}' in '{}'",
                    other, api_url
                )));
            }
        }

        if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
            return Err(PguError::Configuration(format!(
                "API URL '{}' has no host",
                api_url
            )));
        }

        Ok(parsed)
    }

    fn versions_url(&self, artifact: &ArtifactRef) -> Result<Url> {
        let (org, package) = package_coordinates(artifact);

        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| query_error(artifact, "API URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["orgs", org, "packages", "container", package.as_str(), "versions"]);
        url.query_pairs_mut().append_pair("per_page", PAGE_SIZE);
        Ok(url)
    }

    fn fetch_page(&self, artifact: &ArtifactRef, url: &str) -> Result<(Vec<String>, Option<String>)> {
        debug!(%url, "fetching package versions");

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|e| query_error(artifact, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(query_error(artifact, format!("HTTP {} from {}", status, url)));
        }

        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_page_link);

        let body = response
            .text()
            .map_err(|e| query_error(artifact, format!("failed to read response: {}", e)))?;

        if body.len() > MAX_PAGE_BYTES {
            return Err(query_error(artifact, "response exceeded 10MB limit"));
        }

        let tags = parse_version_tags(&body)
            .map_err(|e| query_error(artifact, format!("unexpected response: {}", e)))?;

        Ok((tags, next))
    }
}

impl TagSource for GhcrTagSource {
    fn supports(&self, artifact: &ArtifactRef) -> bool {
        artifact.host == GHCR_HOST
    }

    fn list_tags(&self, artifact: &ArtifactRef) -> Result<Vec<String>> {
        let mut url = Some(self.versions_url(artifact)?.to_string());
        let mut tags = Vec::new();
        let mut pages = 0;

        while let Some(current) = url {
            if pages == MAX_PAGES {
                return Err(query_error(
                    artifact,
                    format!("more than {} result pages", MAX_PAGES),
                ));
            }
            let (page_tags, next) = self.fetch_page(artifact, &current)?;
            tags.extend(page_tags);
            url = next;
            pages += 1;
        }

        debug!(artifact = %artifact, count = tags.len(), "collected tags");
        Ok(tags)
    }
}

fn query_error(artifact: &ArtifactRef, message: impl Into<String>) -> PguError {
    PguError::RegistryQuery {
        artifact: artifact.to_string(),
        message: message.into(),
    }
}

/// `(org, package)` for the Packages API.
fn package_coordinates(artifact: &ArtifactRef) -> (&str, String) {
    match artifact.namespace.split_once('/') {
        Some((org, rest)) => (org, format!("{}/{}", rest, artifact.name)),
        None => (artifact.namespace.as_str(), artifact.name.clone()),
    }
}

/// Extracts the `rel="next"` target of an RFC 8288 `Link` header.
fn next_page_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

fn parse_version_tags(body: &str) -> serde_json::Result<Vec<String>> {
    let versions: Vec<PackageVersion> = serde_json::from_str(body)?;
    Ok(versions
        .into_iter()
        .filter_map(|v| v.metadata)
        .filter_map(|m| m.container)
        .flat_map(|c| c.tags)
        .collect())
}

#[derive(Debug, Deserialize)]
struct PackageVersion {
    #[serde(default)]
    metadata: Option<PackageMetadata>,
}

#[derive(Debug, Deserialize)]
struct PackageMetadata {
    #[serde(default)]
    container: Option<ContainerMetadata>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetadata {
    #[serde(default)]
    tags: Vec<String>,
}
