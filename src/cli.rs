use crate::config::{
    DEFAULT_API_URL, DEFAULT_CONFIG_FILE, DEFAULT_CONFIG_LOCATION, DEFAULT_TAG_PREFIXES,
    FailurePolicy, GithubSettings, PublishMode, RunConfig, Strategy, TagPrefixes,
};
use crate::error::{PguError, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pgu",
    about = "Plugin GitOps Updater - keeps OCI plugin references in a dynamic plugins file up to date",
    version
)]
pub struct Cli {
    /// Path to the dynamic plugins configuration file
    #[arg(
        short = 'f',
        long,
        env = "DYNAMIC_PLUGINS_CONFIG_YAML_FILE_PATH",
        default_value = DEFAULT_CONFIG_FILE,
        global = true
    )]
    pub config_file: PathBuf,

    /// Dotted key path of the plugin list inside the configuration file
    #[arg(
        long,
        env = "DYNAMIC_PLUGINS_CONFIG_YAML_LOCATION",
        default_value = DEFAULT_CONFIG_LOCATION,
        global = true
    )]
    pub config_location: String,

    /// Accepted tag prefixes, comma- or newline-separated (e.g. "next__,stable__")
    #[arg(
        long,
        env = "GH_PACKAGE_TAG_PREFIXES",
        default_value = DEFAULT_TAG_PREFIXES,
        global = true
    )]
    pub tag_prefixes: String,

    /// How updates are grouped into pull requests
    #[arg(
        long,
        value_enum,
        env = "UPDATE_PR_STRATEGY",
        default_value_t = Strategy::Separate,
        global = true
    )]
    pub strategy: Strategy,

    /// Maximum number of separate pull requests per run (0 = unlimited)
    #[arg(long, env = "PR_CREATION_LIMIT", default_value_t = 0, global = true)]
    pub limit: usize,

    /// Only consider plugins whose artifact name matches this glob
    #[arg(long, value_name = "GLOB", global = true)]
    pub filter: Option<String>,

    /// Keep going when a registry lookup fails and report it at the end
    #[arg(long, env = "PGU_BEST_EFFORT", global = true)]
    pub best_effort: bool,

    /// Number of registry lookups in flight at once
    #[arg(long, env = "PGU_CONCURRENCY", default_value_t = 4, global = true)]
    pub concurrency: usize,

    /// GitHub token used for package lookups and pull requests
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    pub github_token: Option<String>,

    /// Repository receiving the pull requests (owner/repo)
    #[arg(long, env = "GITOPS_REPO", global = true)]
    pub repo: Option<String>,

    /// Base branch for pull requests and local commits
    #[arg(long, env = "GITOPS_BASE_BRANCH", default_value = "main", global = true)]
    pub base_branch: String,

    /// GitHub REST API root
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Enable verbose output for debugging
    #[arg(short, long, env = "VERBOSE", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the plugins that are tracked and the entries that are skipped
    List,

    /// Check the registry for newer plugin versions without changing anything
    Check,

    /// Patch the configuration and publish the updates
    Update {
        /// Where to publish each change unit
        #[arg(long, value_enum, default_value_t = PublishMode::None)]
        publish: PublishMode,
    },
}

impl Cli {
    /// Resolves the parsed arguments into the run's configuration.
    pub fn run_config(&self) -> Result<RunConfig> {
        if self.concurrency == 0 {
            return Err(PguError::Configuration(
                "--concurrency must be at least 1".to_string(),
            ));
        }

        Ok(RunConfig {
            config_file: self.config_file.clone(),
            config_location: self.config_location.trim().to_string(),
            strategy: self.strategy,
            limit: self.limit,
            tag_prefixes: TagPrefixes::parse(&self.tag_prefixes)?,
            failure_policy: if self.best_effort {
                FailurePolicy::BestEffort
            } else {
                FailurePolicy::Abort
            },
            concurrency: self.concurrency,
            filter: self.filter.clone(),
            github: GithubSettings {
                api_url: self.api_url.clone(),
                token: self.github_token.clone(),
                repository: self.repo.clone(),
                base_branch: self.base_branch.clone(),
            },
            verbose: self.verbose,
        })
    }
}
