use crate::agents::{
    AppliedChange, ChangePublisher, ChangeUnit, ConfigLoader, ConfigSnapshot, GitPublisher,
    GithubPublisher, PatchEngine, PlanPartitioner, PullRequestDraft, UpdateCandidate, UpdatePlan,
    UpdatePlanner, repository_path,
};
use crate::config::{PublishMode, RunConfig};
use crate::error::{PguError, Result};
use crate::registry::RegistryFactory;
use crate::utils::pattern::PatternMatcher;
use colored::Colorize;
use jiff::Zoned;
use jiff::civil::Date;
use tracing::{error, info, warn};

/// Execute the list workflow - display tracked and skipped plugin entries
pub fn execute_list(config: &RunConfig) -> Result<()> {
    println!("{}", "Listing configured plugins...".cyan().bold());

    let snapshot = load_snapshot(config)?;
    let report = &snapshot.report;

    println!(
        "\n{} ({}) in {}",
        "Tracked plugins".cyan().bold(),
        report.plugins.len(),
        snapshot.path.display()
    );
    if report.plugins.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for plugin in &report.plugins {
        println!(
            "  • {} {} {}",
            plugin.artifact_name.white().bold(),
            plugin.raw_tag().green(),
            format!("!{}", plugin.export_name).dimmed()
        );
        if config.verbose {
            println!("      {}", plugin.locator().dimmed());
        }
    }

    if !report.skipped.is_empty() {
        println!(
            "\n{} ({})",
            "Skipped entries".yellow().bold(),
            report.skipped.len()
        );
        for skipped in &report.skipped {
            println!(
                "  • #{} {} ({})",
                skipped.index,
                skipped.package.as_deref().unwrap_or("<no package>").dimmed(),
                skipped.reason
            );
        }
    }

    Ok(())
}

/// Execute the check workflow (dry-run)
pub fn execute_check(config: &RunConfig) -> Result<()> {
    println!(
        "{}",
        format!(
            "Checking for plugin updates (prefixes: {})...",
            config.tag_prefixes
        )
        .cyan()
        .bold()
    );

    let snapshot = load_snapshot(config)?;
    let plan = plan_updates(config, &snapshot)?;
    print_available_updates(&plan);

    if !plan.failures.is_empty() {
        return Err(PguError::RunFailures(plan.failures.len()));
    }
    Ok(())
}

/// Execute the update workflow: plan, partition, patch and publish
pub fn execute_update(config: &RunConfig, mode: PublishMode) -> Result<()> {
    println!(
        "{}",
        format!("Updating plugins ({} strategy)...", config.strategy)
            .cyan()
            .bold()
    );

    // Fail on publishing misconfiguration before touching the registry.
    let publisher = create_publisher(config, mode)?;
    let file_path = match mode {
        PublishMode::None => config.config_file.to_string_lossy().into_owned(),
        _ => repository_path(&config.config_file)?,
    };

    let snapshot = load_snapshot(config)?;
    let plan = plan_updates(config, &snapshot)?;
    print_available_updates(&plan);

    let query_failures = plan.failures.len();
    let summary = apply_plan(
        config,
        &snapshot.content,
        plan.candidates,
        &file_path,
        publisher.as_deref(),
        Zoned::now().date(),
    );
    print_update_summary(&summary, config);

    let failures = summary.failures() + query_failures;
    if failures > 0 {
        return Err(PguError::RunFailures(failures));
    }
    Ok(())
}

fn create_publisher(config: &RunConfig, mode: PublishMode) -> Result<Option<Box<dyn ChangePublisher>>> {
    match mode {
        PublishMode::None => Ok(None),
        PublishMode::Github => Ok(Some(Box::new(GithubPublisher::new(config)?))),
        PublishMode::Git => {
            let cwd = std::env::current_dir()?;
            Ok(Some(Box::new(GitPublisher::new(
                cwd,
                &config.github.base_branch,
            )?)))
        }
    }
}

fn load_snapshot(config: &RunConfig) -> Result<ConfigSnapshot> {
    let loader = ConfigLoader::new(config.location_keys()?, &config.tag_prefixes);
    let mut snapshot = loader.load(&config.config_file)?;

    if let Some(pattern) = &config.filter {
        let matcher = PatternMatcher::new(pattern)?;
        let before = snapshot.report.plugins.len();
        snapshot
            .report
            .plugins
            .retain(|p| matcher.matches(&p.artifact_name));
        info!(
            filter = %pattern,
            kept = snapshot.report.plugins.len(),
            dropped = before - snapshot.report.plugins.len(),
            "applied plugin filter"
        );
    }

    Ok(snapshot)
}

fn plan_updates(config: &RunConfig, snapshot: &ConfigSnapshot) -> Result<UpdatePlan> {
    let plugins = &snapshot.report.plugins;
    if plugins.is_empty() {
        warn!("no tracked plugins found in configuration");
        return Ok(UpdatePlan::default());
    }

    let mut planner = UpdatePlanner::new(
        RegistryFactory::create_ghcr(config)?,
        config.concurrency,
        config.failure_policy,
    );
    if config.verbose {
        planner = planner.without_progress();
    }
    planner.plan(plugins)
}

/// What happened to one change unit.
#[derive(Debug)]
pub enum UnitOutcome {
    Published(String),
    DryRun,
    Failed(PguError),
}

#[derive(Debug)]
pub struct UnitResult {
    pub draft: Option<PullRequestDraft>,
    pub candidates: Vec<UpdateCandidate>,
    pub applied: Vec<AppliedChange>,
    pub outcome: UnitOutcome,
}

#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub units: Vec<UnitResult>,
    pub deferred: Vec<UpdateCandidate>,
}

impl UpdateSummary {
    pub fn failures(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u.outcome, UnitOutcome::Failed(_)))
            .count()
    }
}

/// Partitions the candidates and patches each unit against the same
/// configuration snapshot. A unit that fails to patch or publish does not
/// stop the others.
pub fn apply_plan(
    config: &RunConfig,
    content: &str,
    candidates: Vec<UpdateCandidate>,
    file_path: &str,
    publisher: Option<&dyn ChangePublisher>,
    today: Date,
) -> UpdateSummary {
    let partition = PlanPartitioner::partition(candidates, config.strategy, config.limit);
    if !partition.deferred.is_empty() {
        warn!(
            limit = config.limit,
            deferred = partition.deferred.len(),
            "reached the PR creation limit; remaining updates wait for the next run"
        );
    }

    let units = partition
        .units
        .into_iter()
        .map(|unit| apply_unit(content, unit, file_path, publisher, today))
        .collect();

    UpdateSummary {
        units,
        deferred: partition.deferred,
    }
}

fn apply_unit(
    content: &str,
    unit: ChangeUnit,
    file_path: &str,
    publisher: Option<&dyn ChangePublisher>,
    today: Date,
) -> UnitResult {
    let patched = match PatchEngine::apply(content, &unit) {
        Ok(patched) => patched,
        Err(e) => {
            error!(error = %e, "could not patch change unit");
            return UnitResult {
                draft: None,
                candidates: unit.candidates,
                applied: Vec::new(),
                outcome: UnitOutcome::Failed(e),
            };
        }
    };

    let draft = PullRequestDraft::from_unit(&unit, today);
    let outcome = match publisher {
        None => UnitOutcome::DryRun,
        Some(publisher) => match publisher.publish(&draft, file_path, &patched.content) {
            Ok(location) => {
                info!(branch = %draft.branch, %location, "published change unit");
                UnitOutcome::Published(location)
            }
            Err(e) => {
                error!(branch = %draft.branch, error = %e, "failed to publish change unit");
                UnitOutcome::Failed(e)
            }
        },
    };

    UnitResult {
        draft: Some(draft),
        candidates: unit.candidates,
        applied: patched.applied,
        outcome,
    }
}

fn print_available_updates(plan: &UpdatePlan) {
    if !plan.failures.is_empty() {
        println!("\n{}", "Registry lookups that failed:".red().bold());
        for failure in &plan.failures {
            println!(
                "  • {} ({}): {}",
                failure.artifact.to_string().white().bold(),
                failure.plugins.join(", ").dimmed(),
                failure.error
            );
        }
    }

    if plan.is_empty() {
        println!("\n{}", "✨ All plugins are up to date!".green().bold());
        return;
    }

    println!("\n{}", "📦 Available Updates:".cyan().bold());
    println!(
        "{}",
        format!("Found {} update(s)", plan.candidates.len()).yellow()
    );
    for candidate in &plan.candidates {
        println!(
            "  • {} {} → {}",
            candidate.plugin.artifact_name.white().bold(),
            candidate.plugin.raw_tag().red(),
            candidate.new_raw_tag().green().bold()
        );
    }
}

fn print_update_summary(summary: &UpdateSummary, config: &RunConfig) {
    if summary.units.is_empty() {
        println!("\n{}", "No updates were applied".yellow());
        return;
    }

    println!("\n{}", "Change units:".cyan().bold());
    for unit in &summary.units {
        let title = unit
            .draft
            .as_ref()
            .map(|d| d.title.clone())
            .unwrap_or_else(|| format!("{} update(s)", unit.candidates.len()));

        match &unit.outcome {
            UnitOutcome::Published(location) => {
                println!("  {} {} {}", "✓".green(), title.white().bold(), location.cyan());
            }
            UnitOutcome::DryRun => {
                let branch = unit.draft.as_ref().map(|d| d.branch.as_str()).unwrap_or("");
                println!(
                    "  {} {} {}",
                    "○".dimmed(),
                    title.white().bold(),
                    format!("(dry run, branch {})", branch).dimmed()
                );
                if config.verbose {
                    if let Some(draft) = &unit.draft {
                        for line in draft.body.lines() {
                            println!("      {}", line.dimmed());
                        }
                    }
                }
            }
            UnitOutcome::Failed(e) => {
                println!("  {} {} {}", "✗".red(), title.white().bold(), e.to_string().red());
            }
        }
        for change in &unit.applied {
            println!(
                "      {} {} → {}",
                change.artifact,
                change.old_tag.dimmed(),
                change.new_tag.green()
            );
        }
    }

    if !summary.deferred.is_empty() {
        println!(
            "\n{}",
            format!(
                "{} update(s) left for the next run (limit {}):",
                summary.deferred.len(),
                config.limit
            )
            .yellow()
        );
        for candidate in &summary.deferred {
            println!("  • {}", candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Strategy, TagPrefixes, test_config};
    use crate::plugin::{ParsedLocator, PluginReference, RegistryTag};
    use std::cell::RefCell;

    const CONFIG: &str = "global:\n  dynamic:\n    plugins:\n      - package: oci://ghcr.io/acme/overlays/a:next__1.0.0!a\n      - package: oci://ghcr.io/acme/overlays/b:next__1.0.0!b\n      - package: oci://ghcr.io/acme/overlays/c:next__1.0.0!c\n";

    #[derive(Default)]
    struct RecordingPublisher {
        published: RefCell<Vec<(String, String)>>,
        reject_branch: Option<String>,
    }

    impl ChangePublisher for RecordingPublisher {
        fn publish(&self, draft: &PullRequestDraft, _file_path: &str, content: &str) -> Result<String> {
            if self.reject_branch.as_deref() == Some(draft.branch.as_str()) {
                return Err(PguError::PullRequest(format!("Branch {} already exists", draft.branch)));
            }
            self.published
                .borrow_mut()
                .push((draft.branch.clone(), content.to_string()));
            Ok(format!("https://github.com/acme/gitops/pull/{}", self.published.borrow().len()))
        }
    }

    fn candidate(name: &str) -> UpdateCandidate {
        let locator = format!("oci://ghcr.io/acme/overlays/{name}:next__1.0.0!{name}");
        let plugin = match PluginReference::parse(&locator, &TagPrefixes::default()).unwrap() {
            ParsedLocator::Tracked(reference) => reference,
            other => panic!("unexpected {:?}", other),
        };
        UpdateCandidate {
            plugin,
            new_tag: RegistryTag::parse("next__1.1.0").unwrap(),
        }
    }

    fn today() -> Date {
        Date::new(2026, 10, 18).unwrap()
    }

    #[test]
    fn separate_units_patch_from_same_snapshot() {
        let publisher = RecordingPublisher::default();
        let summary = apply_plan(
            &test_config(),
            CONFIG,
            vec![candidate("a"), candidate("b")],
            "dynamic-plugins.yaml",
            Some(&publisher as &dyn ChangePublisher),
            today(),
        );

        assert_eq!(summary.failures(), 0);
        let published = publisher.published.borrow();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "update-a-next__1.1.0");
        assert!(published[0].1.contains("a:next__1.1.0!a"));
        assert!(published[0].1.contains("b:next__1.0.0!b"));
        assert!(published[1].1.contains("a:next__1.0.0!a"));
        assert!(published[1].1.contains("b:next__1.1.0!b"));
    }

    #[test]
    fn limit_defers_remaining_candidates() {
        let mut config = test_config();
        config.limit = 1;
        let summary = apply_plan(
            &config,
            CONFIG,
            vec![candidate("a"), candidate("b"), candidate("c")],
            "dynamic-plugins.yaml",
            None,
            today(),
        );

        assert_eq!(summary.units.len(), 1);
        assert!(matches!(summary.units[0].outcome, UnitOutcome::DryRun));
        assert_eq!(summary.deferred.len(), 2);
    }

    #[test]
    fn joint_unit_carries_every_update() {
        let mut config = test_config();
        config.strategy = Strategy::Joint;
        config.limit = 1;
        let publisher = RecordingPublisher::default();
        let summary = apply_plan(
            &config,
            CONFIG,
            vec![candidate("a"), candidate("b"), candidate("c")],
            "dynamic-plugins.yaml",
            Some(&publisher as &dyn ChangePublisher),
            today(),
        );

        assert_eq!(summary.units.len(), 1);
        assert_eq!(summary.units[0].applied.len(), 3);
        let published = publisher.published.borrow();
        assert_eq!(published[0].0, "update-plugins-batch-2026-10-18");
        assert!(!published[0].1.contains("next__1.0.0"));
    }

    #[test]
    fn failing_unit_does_not_stop_others() {
        let publisher = RecordingPublisher {
            reject_branch: Some("update-a-next__1.1.0".to_string()),
            ..Default::default()
        };
        let summary = apply_plan(
            &test_config(),
            CONFIG,
            vec![candidate("a"), candidate("missing"), candidate("c")],
            "dynamic-plugins.yaml",
            Some(&publisher as &dyn ChangePublisher),
            today(),
        );

        assert_eq!(summary.failures(), 2);
        assert!(matches!(
            summary.units[0].outcome,
            UnitOutcome::Failed(PguError::PullRequest(_))
        ));
        assert!(matches!(
            summary.units[1].outcome,
            UnitOutcome::Failed(PguError::NotFound { .. })
        ));
        assert!(matches!(summary.units[2].outcome, UnitOutcome::Published(_)));
    }
}
