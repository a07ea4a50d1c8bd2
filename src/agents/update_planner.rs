use crate::agents::tag_resolver::{TagResolver, UpdateCandidate};
use crate::config::FailurePolicy;
use crate::error::{PguError, Result};
use crate::plugin::PluginReference;
use crate::registry::{ArtifactRef, TagSource};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

/// A registry query that failed under the best-effort policy.
#[derive(Debug)]
pub struct QueryFailure {
    pub artifact: ArtifactRef,
    /// Configured plugins that could not be checked.
    pub plugins: Vec<String>,
    pub error: PguError,
}

/// Planner output: candidates in configuration order plus any tolerated failures.
#[derive(Debug, Default)]
pub struct UpdatePlan {
    pub candidates: Vec<UpdateCandidate>,
    pub failures: Vec<QueryFailure>,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// UpdatePlanner asks the registry about every configured plugin and collects
/// the upgrades.
pub struct UpdatePlanner {
    tag_source: Arc<dyn TagSource>,
    concurrency: usize,
    failure_policy: FailurePolicy,
    show_progress: bool,
}

impl UpdatePlanner {
    pub fn new(
        tag_source: Arc<dyn TagSource>,
        concurrency: usize,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            tag_source,
            concurrency: concurrency.max(1),
            failure_policy,
            show_progress: true,
        }
    }

    /// Hides the progress bar, e.g. when debug logs share the terminal.
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Queries each distinct artifact once and resolves every plugin against
    /// its artifact's tags. Output order follows `plugins`, whatever order the
    /// queries finish in.
    ///
    /// Artifacts on a registry the tag source does not serve are skipped
    /// without a query.
    pub fn plan(&self, plugins: &[PluginReference]) -> Result<UpdatePlan> {
        let artifacts: Vec<ArtifactRef> = distinct_artifacts(plugins)
            .into_iter()
            .filter(|artifact| {
                let supported = self.tag_source.supports(artifact);
                if !supported {
                    warn!(artifact = %artifact, "unsupported registry host, skipping");
                }
                supported
            })
            .collect();
        info!(
            plugins = plugins.len(),
            artifacts = artifacts.len(),
            "checking registry for updates"
        );

        let results = self.query_all(&artifacts);

        let mut tags_by_artifact: HashMap<&ArtifactRef, Vec<String>> = HashMap::new();
        let mut failures = Vec::new();
        for (artifact, result) in artifacts.iter().zip(results) {
            match result {
                Some(Ok(tags)) => {
                    tags_by_artifact.insert(artifact, tags);
                }
                Some(Err(error)) => {
                    if self.failure_policy == FailurePolicy::Abort {
                        return Err(error);
                    }
                    warn!(artifact = %artifact, error = %error, "registry query failed, continuing");
                    failures.push(QueryFailure {
                        artifact: artifact.clone(),
                        plugins: plugins
                            .iter()
                            .filter(|p| &p.artifact() == artifact)
                            .map(|p| p.to_string())
                            .collect(),
                        error,
                    });
                }
                // Never started because a sibling failed; only reachable when aborting.
                None => {}
            }
        }

        let mut candidates = Vec::new();
        for plugin in plugins {
            let Some(tags) = tags_by_artifact.get(&plugin.artifact()) else {
                continue;
            };
            if tags.is_empty() {
                warn!(plugin = %plugin.artifact_name, "registry has no tags for this artifact");
                continue;
            }
            if let Some(candidate) = TagResolver::resolve(plugin, tags) {
                info!(
                    plugin = %plugin.artifact_name,
                    current = %plugin.raw_tag(),
                    latest = %candidate.new_raw_tag(),
                    "newer version found"
                );
                candidates.push(candidate);
            }
        }

        Ok(UpdatePlan {
            candidates,
            failures,
        })
    }

    /// Runs the registry queries on a bounded pool of worker threads.
    ///
    /// Slot `i` holds the result for `artifacts[i]`, or `None` if the query
    /// was never started because an earlier one failed under
    /// `FailurePolicy::Abort`. In-flight queries always finish.
    fn query_all(&self, artifacts: &[ArtifactRef]) -> Vec<Option<Result<Vec<String>>>> {
        let pb = self.progress_bar(artifacts.len());
        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..self.concurrency.min(artifacts.len()) {
                let tx = tx.clone();
                let (next, stop, pb) = (&next, &stop, &pb);
                scope.spawn(move || {
                    loop {
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(artifact) = artifacts.get(index) else {
                            break;
                        };

                        pb.set_message(artifact.name.clone());
                        debug!(artifact = %artifact, "querying registry");
                        let result = self.tag_source.list_tags(artifact);
                        if result.is_err() && self.failure_policy == FailurePolicy::Abort {
                            stop.store(true, Ordering::SeqCst);
                        }
                        pb.inc(1);

                        if tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(tx);
        pb.finish_and_clear();

        let mut results: Vec<Option<Result<Vec<String>>>> =
            artifacts.iter().map(|_| None).collect();
        for (index, result) in rx {
            results[index] = Some(result);
        }
        results
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        let pb = ProgressBar::new(len as u64);
        if !self.show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
            return pb;
        }
        if let Ok(style) = ProgressStyle::default_bar().template("  [{bar:40}] {pos}/{len} {msg}") {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb
    }
}

/// Artifacts in order of first appearance.
fn distinct_artifacts(plugins: &[PluginReference]) -> Vec<ArtifactRef> {
    let mut artifacts: Vec<ArtifactRef> = Vec::new();
    for plugin in plugins {
        let artifact = plugin.artifact();
        if !artifacts.contains(&artifact) {
            artifacts.push(artifact);
        }
    }
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagPrefixes;
    use crate::plugin::ParsedLocator;
    use crate::registry::testing::StaticTagSource;

    fn plugin(name: &str, tag: &str) -> PluginReference {
        plugin_on("ghcr.io", name, tag)
    }

    fn plugin_on(host: &str, name: &str, tag: &str) -> PluginReference {
        let locator = format!("oci://{host}/acme/overlays/{name}:{tag}!{name}");
        match PluginReference::parse(&locator, &TagPrefixes::default()).unwrap() {
            ParsedLocator::Tracked(reference) => reference,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn planner(source: StaticTagSource, policy: FailurePolicy) -> (UpdatePlanner, Arc<StaticTagSource>) {
        planner_with(source, policy, 3)
    }

    fn planner_with(
        source: StaticTagSource,
        policy: FailurePolicy,
        concurrency: usize,
    ) -> (UpdatePlanner, Arc<StaticTagSource>) {
        let source = Arc::new(source);
        let planner = UpdatePlanner::new(source.clone(), concurrency, policy).without_progress();
        (planner, source)
    }

    #[test]
    fn plans_single_update() {
        let (planner, _) = planner(
            StaticTagSource::new()
                .with_tags("a", &["next__1.0.0", "next__1.1.0"])
                .with_tags("b", &["next__2.0.0"]),
            FailurePolicy::Abort,
        );
        let plan = planner
            .plan(&[plugin("a", "next__1.0.0"), plugin("b", "next__2.0.0")])
            .unwrap();

        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].plugin.artifact_name, "a");
        assert_eq!(plan.candidates[0].new_raw_tag(), "next__1.1.0");
        assert!(plan.failures.is_empty());
    }

    #[test]
    fn preserves_configuration_order() {
        let names = ["e", "d", "c", "b", "a", "f", "g"];
        let mut source = StaticTagSource::new();
        for name in names {
            source = source.with_tags(name, &["next__1.0.0", "next__3.0.0"]);
        }
        let (planner, _) = planner(source, FailurePolicy::Abort);
        let plugins: Vec<_> = names.iter().map(|n| plugin(n, "next__1.0.0")).collect();

        let plan = planner.plan(&plugins).unwrap();
        let order: Vec<&str> = plan
            .candidates
            .iter()
            .map(|c| c.plugin.artifact_name.as_str())
            .collect();
        assert_eq!(order, names);
    }

    #[test]
    fn queries_each_artifact_once() {
        let (planner, source) = planner(
            StaticTagSource::new().with_tags("a", &["next__1.0.0", "next__1.2.0"]),
            FailurePolicy::Abort,
        );
        let mut second_export = plugin("a", "next__1.0.0");
        second_export.export_name = "a-frontend".to_string();

        let plan = planner
            .plan(&[plugin("a", "next__1.0.0"), second_export])
            .unwrap();
        assert_eq!(source.call_count(), 1);
        assert_eq!(plan.candidates.len(), 2);
    }

    #[test]
    fn registry_failure_aborts_by_default() {
        let (planner, _) = planner(
            StaticTagSource::new()
                .with_tags("a", &["next__1.1.0"])
                .failing("b"),
            FailurePolicy::Abort,
        );
        let err = planner
            .plan(&[plugin("a", "next__1.0.0"), plugin("b", "next__1.0.0")])
            .unwrap_err();
        assert!(matches!(err, PguError::RegistryQuery { .. }));
    }

    #[test]
    fn abort_starts_no_queries_after_a_failure() {
        let (planner, source) = planner_with(
            StaticTagSource::new()
                .failing("a")
                .with_tags("b", &["next__1.1.0"])
                .with_tags("c", &["next__1.1.0"]),
            FailurePolicy::Abort,
            1,
        );
        let err = planner
            .plan(&[
                plugin("a", "next__1.0.0"),
                plugin("b", "next__1.0.0"),
                plugin("c", "next__1.0.0"),
            ])
            .unwrap_err();

        assert!(matches!(err, PguError::RegistryQuery { .. }));
        assert_eq!(source.call_count(), 1);
    }

    #[test]
    fn skips_artifacts_on_unsupported_registries() {
        let (planner, source) = planner(
            StaticTagSource::new().with_tags("dual", &["next__1.0.0", "next__2.0.0"]),
            FailurePolicy::Abort,
        );
        let plan = planner
            .plan(&[
                plugin_on("quay.io", "dual", "next__1.0.0"),
                plugin("dual", "next__1.0.0"),
            ])
            .unwrap();

        assert_eq!(source.call_count(), 1);
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].plugin.registry_host, "ghcr.io");
        assert!(plan.failures.is_empty());
    }

    #[test]
    fn best_effort_reports_failures_with_candidates() {
        let (planner, _) = planner(
            StaticTagSource::new()
                .with_tags("a", &["next__1.1.0"])
                .failing("b"),
            FailurePolicy::BestEffort,
        );
        let plan = planner
            .plan(&[plugin("a", "next__1.0.0"), plugin("b", "next__1.0.0")])
            .unwrap();
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.failures.len(), 1);
        assert_eq!(plan.failures[0].artifact.name, "b");
        assert_eq!(plan.failures[0].plugins, vec!["b:next__1.0.0"]);
    }

    #[test]
    fn empty_configuration_plans_nothing() {
        let (planner, source) = planner(StaticTagSource::new(), FailurePolicy::Abort);
        let plan = planner.plan(&[]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(source.call_count(), 0);
    }
}
