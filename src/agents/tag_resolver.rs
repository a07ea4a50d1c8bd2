use crate::plugin::{PluginReference, RegistryTag};
use std::fmt;
use tracing::debug;

/// One detected upgrade for a configured plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCandidate {
    pub plugin: PluginReference,
    pub new_tag: RegistryTag,
}

impl UpdateCandidate {
    pub fn new_raw_tag(&self) -> &str {
        &self.new_tag.raw
    }

    /// The plugin's locator rewritten to point at the new tag.
    pub fn new_locator(&self) -> String {
        self.plugin.locator_with_tag(&self.new_tag.raw)
    }
}

impl fmt::Display for UpdateCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.plugin.artifact_name,
            self.plugin.raw_tag(),
            self.new_tag.raw
        )
    }
}

/// Picks the best registry tag for a plugin.
pub struct TagResolver;

impl TagResolver {
    /// Newest tag in the plugin's prefix family, if it is an upgrade.
    ///
    /// Tags that do not parse are ignored. Equal versions spelled differently
    /// resolve to the lexicographically last raw tag.
    pub fn resolve(plugin: &PluginReference, tags: &[String]) -> Option<UpdateCandidate> {
        let best = tags
            .iter()
            .filter_map(|raw| match RegistryTag::parse(raw) {
                Ok(tag) => Some(tag),
                Err(e) => {
                    debug!(tag = %raw, error = %e, "ignoring unparseable registry tag");
                    None
                }
            })
            .filter(|tag| tag.prefix == plugin.tag_prefix())
            .max_by(|a, b| a.version.cmp(&b.version).then_with(|| a.raw.cmp(&b.raw)))?;

        if !best.version.is_newer_than(plugin.current_version()) {
            debug!(
                plugin = %plugin.artifact_name,
                current = %plugin.raw_tag(),
                latest = %best.raw,
                "plugin is up to date"
            );
            return None;
        }

        Some(UpdateCandidate {
            plugin: plugin.clone(),
            new_tag: best,
        })
    }
}
