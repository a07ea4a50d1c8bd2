use crate::error::{PguError, Result};
use crate::plugin::version::TAG_SEPARATOR;
use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "dynamic-plugins.yaml";
pub const DEFAULT_CONFIG_LOCATION: &str = "global.dynamic.plugins";
pub const DEFAULT_TAG_PREFIXES: &str = "next__";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// How update candidates are grouped into pull requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// One pull request per plugin update
    Separate,
    /// A single pull request carrying every update
    Joint,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Separate => f.write_str("separate"),
            Strategy::Joint => f.write_str("joint"),
        }
    }
}

/// What happens when a registry query fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run with the first failure.
    Abort,
    /// Keep going and report failures next to the candidates.
    BestEffort,
}

/// Where patched change units go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PublishMode {
    /// Only report what would change
    None,
    /// Open pull requests through the GitHub REST API
    Github,
    /// Commit each change unit to a local branch
    Git,
}

/// Ordered set of accepted tag prefixes (release channels).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPrefixes(Vec<String>);

impl TagPrefixes {
    /// Newline-separated when the value contains a newline, comma-separated
    /// otherwise. A trailing `__` on an entry is optional.
    pub fn parse(raw: &str) -> Result<Self> {
        let separator = if raw.contains('\n') { '\n' } else { ',' };

        let mut prefixes: Vec<String> = Vec::new();
        for entry in raw.split(separator) {
            let entry = entry.trim();
            let entry = entry.strip_suffix(TAG_SEPARATOR).unwrap_or(entry);
            if entry.is_empty() || prefixes.iter().any(|p| p == entry) {
                continue;
            }
            prefixes.push(entry.to_string());
        }

        if prefixes.is_empty() {
            return Err(PguError::Configuration(format!(
                "no usable tag prefix in '{}'",
                raw.escape_debug()
            )));
        }

        Ok(Self(prefixes))
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.0.iter().any(|p| p == prefix)
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for TagPrefixes {
    fn default() -> Self {
        Self(vec!["next".to_string()])
    }
}

impl fmt::Display for TagPrefixes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Settings for talking to GitHub, both for registry lookups and pull requests.
#[derive(Clone)]
pub struct GithubSettings {
    pub api_url: String,
    pub token: Option<String>,
    pub repository: Option<String>,
    pub base_branch: String,
}

impl fmt::Debug for GithubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubSettings")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("repository", &self.repository)
            .field("base_branch", &self.base_branch)
            .finish()
    }
}

/// Everything one run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub config_file: PathBuf,
    pub config_location: String,
    pub strategy: Strategy,
    pub limit: usize,
    pub tag_prefixes: TagPrefixes,
    pub failure_policy: FailurePolicy,
    pub concurrency: usize,
    pub filter: Option<String>,
    pub github: GithubSettings,
    pub verbose: bool,
}

impl RunConfig {
    /// Splits the dotted config location into mapping keys.
    pub fn location_keys(&self) -> Result<Vec<&str>> {
        let keys: Vec<&str> = self.config_location.split('.').collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(PguError::ConfigLocation(format!(
                "'{}' contains an empty key",
                self.config_location
            )));
        }
        Ok(keys)
    }

    /// `owner/repo` required for GitHub publishing.
    pub fn require_repository(&self) -> Result<&str> {
        let repository = self
            .github
            .repository
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| {
                PguError::Configuration("a target repository (--repo / GITOPS_REPO) is required".into())
            })?;

        match repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(repository)
            }
            _ => Err(PguError::Configuration(format!(
                "repository '{}' must have the form owner/repo",
                repository
            ))),
        }
    }

    pub fn require_token(&self) -> Result<&str> {
        self.github
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                PguError::Configuration("a GitHub token (--github-token / GITHUB_TOKEN) is required".into())
            })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> RunConfig {
    RunConfig {
        config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
        config_location: DEFAULT_CONFIG_LOCATION.to_string(),
        strategy: Strategy::Separate,
        limit: 0,
        tag_prefixes: TagPrefixes::default(),
        failure_policy: FailurePolicy::Abort,
        concurrency: 2,
        filter: None,
        github: GithubSettings {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            repository: None,
            base_branch: "main".to_string(),
        },
        verbose: false,
    }
}
