use crate::agents::partitioner::ChangeUnit;
use crate::error::{PguError, Result};
use tracing::debug;

/// One tag swap performed by the patch engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub artifact: String,
    pub old_tag: String,
    pub new_tag: String,
}

#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub content: String,
    pub applied: Vec<AppliedChange>,
}

/// Rewrites configuration text by exact substring replacement, so comments,
/// quoting, indentation and key order survive untouched.
pub struct PatchEngine;

impl PatchEngine {
    pub fn apply(content: &str, unit: &ChangeUnit) -> Result<PatchOutcome> {
        let mut content = content.to_string();
        let mut applied = Vec::with_capacity(unit.len());

        for candidate in &unit.candidates {
            let old_locator = candidate.plugin.raw_locator.as_str();
            let offset = Self::locate_unique(&content, old_locator)?;
            let new_locator = candidate.new_locator();

            content.replace_range(offset..offset + old_locator.len(), &new_locator);
            debug!(from = %old_locator, to = %new_locator, "patched locator");

            applied.push(AppliedChange {
                artifact: candidate.plugin.artifact_name.clone(),
                old_tag: candidate.plugin.raw_tag().to_string(),
                new_tag: candidate.new_raw_tag().to_string(),
            });
        }

        Ok(PatchOutcome { content, applied })
    }

    /// A match counts only when the next character cannot continue a
    /// locator, so `!e` does not match inside `!e-backend`.
    fn locate_unique(content: &str, locator: &str) -> Result<usize> {
        let mut matches = content
            .match_indices(locator)
            .map(|(offset, _)| offset)
            .filter(|offset| ends_locator(content[offset + locator.len()..].chars().next()));
        let first = matches.next().ok_or_else(|| PguError::NotFound {
            locator: locator.to_string(),
        })?;

        let extra = matches.count();
        if extra > 0 {
            return Err(PguError::AmbiguousMatch {
                locator: locator.to_string(),
                occurrences: extra + 1,
            });
        }
        Ok(first)
    }
}

fn ends_locator(next: Option<char>) -> bool {
    match next {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '"' | '\'' | ',' | ']' | '}'),
    }
}
