pub mod config_loader;
pub mod partitioner;
pub mod patch_engine;
pub mod pull_request;
pub mod tag_resolver;
pub mod update_planner;
pub mod version_control;

pub use config_loader::{ConfigLoader, ConfigSnapshot};
pub use partitioner::{ChangeUnit, PlanPartitioner};
pub use patch_engine::{AppliedChange, PatchEngine};
pub use pull_request::{ChangePublisher, GithubPublisher, PullRequestDraft, repository_path};
pub use tag_resolver::UpdateCandidate;
pub use update_planner::{UpdatePlan, UpdatePlanner};
pub use version_control::GitPublisher;
