use crate::config::TagPrefixes;
use crate::error::{PguError, Result};
use crate::plugin::reference::OCI_SCHEME;
use crate::plugin::{ParsedLocator, PluginReference};
use crate::registry::GHCR_HOST;
use serde_yaml::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Why a plugin entry is not tracked in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingPackage,
    Disabled,
    NotOci,
    UntrackedPrefix(String),
    UnsupportedRegistry(String),
    Malformed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingPackage => f.write_str("no package field"),
            SkipReason::Disabled => f.write_str("disabled"),
            SkipReason::NotOci => f.write_str("not an OCI package"),
            SkipReason::UntrackedPrefix(prefix) => write!(f, "untracked tag prefix '{}'", prefix),
            SkipReason::UnsupportedRegistry(host) => {
                write!(f, "registry '{}' is not supported (only {})", host, GHCR_HOST)
            }
            SkipReason::Malformed(reason) => write!(f, "malformed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Position of the entry in the plugin list.
    pub index: usize,
    pub package: Option<String>,
    pub reason: SkipReason,
}

/// Plugins to track, in file order, plus everything that was left out.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub plugins: Vec<PluginReference>,
    pub skipped: Vec<SkippedEntry>,
}

/// Snapshot of the configuration file taken at the start of a run.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub path: PathBuf,
    pub content: String,
    pub report: LoadReport,
}

/// ConfigLoader reads the plugin list out of the dynamic plugins file.
pub struct ConfigLoader<'a> {
    location: Vec<&'a str>,
    prefixes: &'a TagPrefixes,
}

impl<'a> ConfigLoader<'a> {
    pub fn new(location: Vec<&'a str>, prefixes: &'a TagPrefixes) -> Self {
        Self { location, prefixes }
    }

    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<ConfigSnapshot> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading plugins configuration");

        let content = fs::read_to_string(path).map_err(|e| {
            PguError::ConfigParsing(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let report = self.parse(&content)?;

        Ok(ConfigSnapshot {
            path: path.to_path_buf(),
            content,
            report,
        })
    }

    pub fn parse(&self, content: &str) -> Result<LoadReport> {
        let document: Value = serde_yaml::from_str(content)
            .map_err(|e| PguError::ConfigParsing(format!("Invalid YAML: {}", e)))?;

        let entries = self.plugin_entries(&document)?;
        let mut report = LoadReport::default();

        for (index, entry) in entries.iter().enumerate() {
            match self.classify(entry) {
                Ok(plugin) => report.plugins.push(plugin),
                Err((package, reason)) => {
                    match &reason {
                        SkipReason::Malformed(_) => {
                            warn!(index, package = ?package, %reason, "skipping plugin entry")
                        }
                        _ => info!(index, package = ?package, %reason, "skipping plugin entry"),
                    }
                    report.skipped.push(SkippedEntry {
                        index,
                        package,
                        reason,
                    });
                }
            }
        }

        info!(
            tracked = report.plugins.len(),
            skipped = report.skipped.len(),
            "loaded plugins configuration"
        );
        Ok(report)
    }

    /// Walks the dotted location down to the plugin list.
    fn plugin_entries<'v>(&self, document: &'v Value) -> Result<&'v [Value]> {
        let mut current = document;
        for (depth, key) in self.location.iter().enumerate() {
            let mapping = current.as_mapping().ok_or_else(|| {
                let parent = match depth {
                    0 => "document root".to_string(),
                    _ => format!("'{}'", self.location[..depth].join(".")),
                };
                PguError::ConfigLocation(format!("{} is not a mapping", parent))
            })?;
            current = mapping.get(*key).ok_or_else(|| {
                PguError::ConfigLocation(format!(
                    "key '{}' not found",
                    self.location[..=depth].join(".")
                ))
            })?;
        }

        Ok(current.as_sequence().map(Vec::as_slice).unwrap_or(&[]))
    }

    fn classify(&self, entry: &Value) -> std::result::Result<PluginReference, (Option<String>, SkipReason)> {
        let Some(package) = entry.get("package").and_then(Value::as_str) else {
            return Err((None, SkipReason::MissingPackage));
        };
        let package = package.to_string();

        if !package.starts_with(OCI_SCHEME) {
            return Err((Some(package), SkipReason::NotOci));
        }

        if entry.get("disabled").and_then(Value::as_bool).unwrap_or(false) {
            return Err((Some(package), SkipReason::Disabled));
        }

        match PluginReference::parse(&package, self.prefixes) {
            Ok(ParsedLocator::Tracked(plugin)) if plugin.registry_host != GHCR_HOST => Err((
                Some(package),
                SkipReason::UnsupportedRegistry(plugin.registry_host),
            )),
            Ok(ParsedLocator::Tracked(plugin)) => Ok(plugin),
            Ok(ParsedLocator::Untracked { prefix }) => {
                Err((Some(package), SkipReason::UntrackedPrefix(prefix)))
            }
            Err(e) => Err((Some(package), SkipReason::Malformed(e.to_string()))),
        }
    }
}
