use crate::agents::partitioner::ChangeUnit;
use crate::config::{RunConfig, Strategy};
use crate::error::{PguError, Result};
use jiff::civil::Date;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Workspace mount used by GitHub Actions container steps.
const RUNNER_WORKSPACE_PREFIX: &str = "/github/workspace/";
const FOOTER: &str = "Generated with plugin-gitops-updater";

/// Branch, title and description for one change unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub branch: String,
    pub title: String,
    pub body: String,
}

impl PullRequestDraft {
    pub fn from_unit(unit: &ChangeUnit, today: Date) -> Self {
        match unit.candidates.as_slice() {
            [single] => {
                let plugin = &single.plugin;
                let branch = safe_branch_name(&format!(
                    "update-{}-{}",
                    plugin.artifact_name,
                    single.new_raw_tag()
                ));
                let title = format!(
                    "chore(deps): update `{}` to `{}`",
                    plugin.artifact_name,
                    single.new_raw_tag()
                );
                let body = format!(
                    "## Plugin Update\n\n\
                     **Plugin**: `{}`\n\
                     **Export**: `{}`\n\
                     **Current Version**: `{}`\n\
                     **New Version**: `{}`\n\n\
                     {}\n",
                    plugin.artifact_name,
                    plugin.export_name,
                    plugin.raw_tag(),
                    single.new_raw_tag(),
                    FOOTER
                );
                Self { branch, title, body }
            }
            candidates => {
                let branch = safe_branch_name(&format!(
                    "update-plugins-batch-{}",
                    today.strftime("%Y-%m-%d")
                ));
                let title = format!("chore(deps): update {} plugins", candidates.len());
                let mut body = format!(
                    "## Batch Plugin Update\n\nThis PR updates {} plugins:\n\n",
                    candidates.len()
                );
                for candidate in candidates {
                    body.push_str(&format!(
                        "- **{}**: `{}` → `{}`\n",
                        candidate.plugin.artifact_name,
                        candidate.plugin.raw_tag(),
                        candidate.new_raw_tag()
                    ));
                }
                body.push_str(&format!("\n{}\n", FOOTER));
                Self { branch, title, body }
            }
        }
    }
}

fn safe_branch_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '/' | '.' => c,
            _ => '-',
        })
        .collect();
    name.trim_matches(|c| c == '/' || c == '.').replace("..", ".")
}

/// Path of the configuration file inside the target repository.
pub fn repository_path(config_file: &Path) -> Result<String> {
    let raw = config_file.to_string_lossy().replace('\\', "/");
    let relative = raw
        .strip_prefix(RUNNER_WORKSPACE_PREFIX)
        .unwrap_or(&raw)
        .trim_start_matches("./");

    if relative.is_empty() || relative.starts_with('/') || relative.split('/').any(|s| s == "..") {
        return Err(PguError::Configuration(format!(
            "'{}' is not a repository-relative path",
            raw
        )));
    }
    Ok(relative.to_string())
}

/// Keeps the trailing-newline convention of the file being replaced.
pub fn match_trailing_newline(original: &str, updated: &str) -> String {
    match (original.ends_with('\n'), updated.ends_with('\n')) {
        (true, false) => format!("{}\n", updated),
        (false, true) => updated.trim_end_matches('\n').to_string(),
        _ => updated.to_string(),
    }
}

/// Delivers a patched change unit somewhere reviewable.
pub trait ChangePublisher {
    /// Returns a pull request URL or branch name.
    fn publish(&self, draft: &PullRequestDraft, file_path: &str, content: &str) -> Result<String>;
}

/// Opens pull requests through the GitHub REST API.
pub struct GithubPublisher {
    client: Client,
    api_url: Url,
    token: String,
    owner: String,
    repo: String,
    base_branch: String,
    strategy: Strategy,
}

impl GithubPublisher {
    pub fn new(config: &RunConfig) -> Result<Self> {
        let repository = config.require_repository()?;
        let token = config.require_token()?.to_string();
        let (owner, repo) = repository
            .split_once('/')
            .ok_or_else(|| PguError::Configuration(format!("invalid repository '{}'", repository)))?;

        let api_url = Url::parse(&config.github.api_url).map_err(|e| {
            PguError::Configuration(format!("Invalid API URL '{}': {}", config.github.api_url, e))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("pgu/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| PguError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url,
            token,
            owner: owner.to_string(),
            repo: repo.to_string(),
            base_branch: config.github.base_branch.clone(),
            strategy: config.strategy,
        })
    }

    fn repo_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| PguError::Configuration("API URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments.iter().flat_map(|s| s.split('/')));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
        let response = request
            .send()
            .map_err(|e| PguError::PullRequest(format!("{}: request failed: {}", action, e)))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(PguError::PullRequest(format!(
                "{}: HTTP {} {}",
                action,
                status,
                detail.trim()
            )));
        }
        response
            .json::<T>()
            .map_err(|e| PguError::PullRequest(format!("{}: unexpected response: {}", action, e)))
    }

    fn branch_sha(&self, branch: &str) -> Result<Option<String>> {
        let url = self.repo_url(&["git", "ref", "heads", branch])?;
        let response = self
            .request(Method::GET, url)
            .send()
            .map_err(|e| PguError::PullRequest(format!("look up branch {}: {}", branch, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PguError::PullRequest(format!(
                "look up branch {}: HTTP {}",
                branch,
                response.status()
            )));
        }
        let reference: GitRef = response
            .json()
            .map_err(|e| PguError::PullRequest(format!("look up branch {}: {}", branch, e)))?;
        Ok(Some(reference.object.sha))
    }

    /// Creates `branch` from the base branch, or reuses it when allowed.
    /// Returns the branch head.
    fn ensure_branch(&self, branch: &str) -> Result<String> {
        let base_sha = self.branch_sha(&self.base_branch)?.ok_or_else(|| {
            PguError::PullRequest(format!("base branch '{}' does not exist", self.base_branch))
        })?;

        if let Some(head_sha) = self.branch_sha(branch)? {
            if self.strategy == Strategy::Separate {
                return Err(PguError::PullRequest(format!("Branch {} already exists", branch)));
            }

            let mut url = self.repo_url(&["pulls"])?;
            url.query_pairs_mut()
                .append_pair("state", "open")
                .append_pair("head", &format!("{}:{}", self.owner, branch))
                .append_pair("base", &self.base_branch);
            let open: Vec<PullRequest> = self.send(self.request(Method::GET, url), "list pull requests")?;
            if let Some(pr) = open.first() {
                return Err(PguError::PullRequest(format!(
                    "Open PR already exists for branch {}: {}",
                    branch, pr.html_url
                )));
            }
            debug!(%branch, "reusing existing branch");
            return Ok(head_sha);
        }

        let url = self.repo_url(&["git", "refs"])?;
        let _: serde_json::Value = self.send(
            self.request(Method::POST, url).json(&json!({
                "ref": format!("refs/heads/{}", branch),
                "sha": base_sha,
            })),
            "create branch",
        )?;
        debug!(%branch, "created branch");
        Ok(base_sha)
    }

    fn read_file(&self, branch: &str, file_path: &str) -> Result<String> {
        let mut url = self.repo_url(&["contents", file_path])?;
        url.query_pairs_mut().append_pair("ref", branch);
        let response = self
            .request(Method::GET, url)
            .header(ACCEPT, "application/vnd.github.raw")
            .send()
            .map_err(|e| PguError::PullRequest(format!("read file: request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PguError::PullRequest(format!(
                "read file {} on {}: HTTP {}",
                file_path, branch, status
            )));
        }
        response
            .text()
            .map_err(|e| PguError::PullRequest(format!("read file: {}", e)))
    }

    /// Commits `content` as `file_path` on top of `head_sha` and moves the
    /// branch to the new commit.
    fn commit_file(
        &self,
        branch: &str,
        head_sha: &str,
        file_path: &str,
        content: &str,
        message: &str,
    ) -> Result<()> {
        let original = self.read_file(branch, file_path)?;
        let content = match_trailing_newline(&original, content);

        let url = self.repo_url(&["git", "commits", head_sha])?;
        let head: GitCommit = self.send(self.request(Method::GET, url), "read head commit")?;

        let url = self.repo_url(&["git", "trees"])?;
        let tree: GitSha = self.send(
            self.request(Method::POST, url).json(&json!({
                "base_tree": head.tree.sha,
                "tree": [{
                    "path": file_path,
                    "mode": "100644",
                    "type": "blob",
                    "content": content,
                }],
            })),
            "create tree",
        )?;

        let url = self.repo_url(&["git", "commits"])?;
        let commit: GitSha = self.send(
            self.request(Method::POST, url).json(&json!({
                "message": message,
                "tree": tree.sha,
                "parents": [head_sha],
            })),
            "create commit",
        )?;

        let url = self.repo_url(&["git", "refs", "heads", branch])?;
        let _: serde_json::Value = self.send(
            self.request(Method::PATCH, url).json(&json!({ "sha": commit.sha })),
            "move branch",
        )?;
        debug!(%branch, file = %file_path, commit = %commit.sha, "committed file");
        Ok(())
    }
}

impl ChangePublisher for GithubPublisher {
    fn publish(&self, draft: &PullRequestDraft, file_path: &str, content: &str) -> Result<String> {
        debug!(repo = %format!("{}/{}", self.owner, self.repo), branch = %draft.branch, "publishing change unit");
        let head_sha = self.ensure_branch(&draft.branch)?;
        self.commit_file(
            &draft.branch,
            &head_sha,
            file_path,
            content,
            &format!("Update {}", file_path),
        )?;

        let url = self.repo_url(&["pulls"])?;
        let pr: PullRequest = self.send(
            self.request(Method::POST, url).json(&json!({
                "title": draft.title,
                "body": draft.body,
                "head": draft.branch,
                "base": self.base_branch,
            })),
            "open pull request",
        )?;
        Ok(pr.html_url)
    }
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    tree: GitSha,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    html_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tag_resolver::UpdateCandidate;
    use crate::config::{TagPrefixes, test_config};
    use crate::plugin::{ParsedLocator, PluginReference, RegistryTag};
    use pretty_assertions::assert_eq;

    fn candidate(name: &str, tag: &str, new_tag: &str) -> UpdateCandidate {
        let locator = format!("oci://ghcr.io/acme/overlays/{name}:{tag}!{name}-dynamic");
        let plugin = match PluginReference::parse(&locator, &TagPrefixes::default()).unwrap() {
            ParsedLocator::Tracked(reference) => reference,
            other => panic!("unexpected {:?}", other),
        };
        UpdateCandidate {
            plugin,
            new_tag: RegistryTag::parse(new_tag).unwrap(),
        }
    }

    fn today() -> Date {
        Date::new(2026, 10, 18).unwrap()
    }

    #[test]
    fn drafts_single_update() {
        let unit = ChangeUnit {
            candidates: vec![candidate("widget", "next__1.0.0", "next__1.1.0")],
        };
        let draft = PullRequestDraft::from_unit(&unit, today());

        assert_eq!(draft.branch, "update-widget-next__1.1.0");
        assert_eq!(draft.title, "chore(deps): update `widget` to `next__1.1.0`");
        assert!(draft.body.contains("**Current Version**: `next__1.0.0`"));
        assert!(draft.body.contains("**New Version**: `next__1.1.0`"));
        assert!(draft.body.contains("**Export**: `widget-dynamic`"));
    }

    #[test]
    fn drafts_batch_update() {
        let unit = ChangeUnit {
            candidates: vec![
                candidate("alpha", "next__1.0.0", "next__1.1.0"),
                candidate("beta", "next__1.42.5__0.1.0", "next__1.42.5__0.2.0"),
            ],
        };
        let draft = PullRequestDraft::from_unit(&unit, today());

        assert_eq!(draft.branch, "update-plugins-batch-2026-10-18");
        assert_eq!(draft.title, "chore(deps): update 2 plugins");
        assert_eq!(
            draft.body,
            "## Batch Plugin Update\n\nThis PR updates 2 plugins:\n\n\
             - **alpha**: `next__1.0.0` → `next__1.1.0`\n\
             - **beta**: `next__1.42.5__0.1.0` → `next__1.42.5__0.2.0`\n\
             \nGenerated with plugin-gitops-updater\n"
        );
    }

    #[test]
    fn sanitises_branch_names() {
        assert_eq!(safe_branch_name("update-a b:c~d"), "update-a-b-c-d");
        assert_eq!(safe_branch_name("update-x-next__1..2"), "update-x-next__1.2");
    }

    #[test]
    fn resolves_repository_paths() {
        assert_eq!(
            repository_path(Path::new("/github/workspace/charts/values.yaml")).unwrap(),
            "charts/values.yaml"
        );
        assert_eq!(
            repository_path(Path::new("./dynamic-plugins.yaml")).unwrap(),
            "dynamic-plugins.yaml"
        );
        assert!(repository_path(Path::new("/etc/dynamic-plugins.yaml")).is_err());
        assert!(repository_path(Path::new("../outside.yaml")).is_err());
    }

    #[test]
    fn keeps_trailing_newline_convention() {
        assert_eq!(match_trailing_newline("a\n", "b"), "b\n");
        assert_eq!(match_trailing_newline("a", "b\n\n"), "b");
        assert_eq!(match_trailing_newline("a\n", "b\n"), "b\n");
        assert_eq!(match_trailing_newline("a", "b"), "b");
    }

    #[test]
    fn publisher_requires_repository_and_token() {
        let mut config = test_config();
        assert!(GithubPublisher::new(&config).is_err());

        config.github.repository = Some("acme/gitops".to_string());
        assert!(GithubPublisher::new(&config).is_err());

        config.github.token = Some("token".to_string());
        let publisher = GithubPublisher::new(&config).unwrap();
        assert_eq!(
            publisher
                .repo_url(&["contents", "charts/values.yaml"])
                .unwrap()
                .as_str(),
            "https://api.github.com/repos/acme/gitops/contents/charts/values.yaml"
        );
    }
}
