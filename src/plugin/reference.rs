use crate::config::TagPrefixes;
use crate::error::{PguError, Result};
use crate::plugin::version::{RegistryTag, TagVersion};
use crate::registry::ArtifactRef;
use std::fmt;

pub const OCI_SCHEME: &str = "oci://";

/// One tracked plugin, parsed from
/// `oci://<host>/<namespace>/<name>:<prefix>__<primary>[__<secondary>]!<export>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginReference {
    pub registry_host: String,
    pub namespace_path: String,
    pub artifact_name: String,
    pub export_name: String,
    pub tag: RegistryTag,
    pub raw_locator: String,
}

/// Parser result for a well-formed locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLocator {
    Tracked(PluginReference),
    /// The tag's prefix is not in the accepted set.
    Untracked { prefix: String },
}

impl PluginReference {
    pub fn parse(locator: &str, accepted: &TagPrefixes) -> Result<ParsedLocator> {
        let rest = locator
            .strip_prefix(OCI_SCHEME)
            .ok_or_else(|| PguError::malformed_reference(locator, "missing oci:// scheme"))?;

        let (image_ref, export_name) = rest
            .split_once('!')
            .ok_or_else(|| PguError::malformed_reference(locator, "missing '!' before export name"))?;
        if export_name.is_empty() {
            return Err(PguError::malformed_reference(locator, "empty export name"));
        }

        let (host, path) = image_ref
            .split_once('/')
            .ok_or_else(|| PguError::malformed_reference(locator, "missing artifact path"))?;
        if host.is_empty() {
            return Err(PguError::malformed_reference(locator, "empty registry host"));
        }

        let (namespace_path, name_and_tag) = path.rsplit_once('/').ok_or_else(|| {
            PguError::malformed_reference(locator, "missing namespace path before artifact name")
        })?;
        if namespace_path.is_empty() || namespace_path.split('/').any(str::is_empty) {
            return Err(PguError::malformed_reference(locator, "empty namespace path segment"));
        }

        let (artifact_name, raw_tag) = name_and_tag
            .rsplit_once(':')
            .ok_or_else(|| PguError::malformed_reference(locator, "missing ':' before tag"))?;
        if artifact_name.is_empty() {
            return Err(PguError::malformed_reference(locator, "empty artifact name"));
        }

        let tag = RegistryTag::parse(raw_tag)?;
        if !accepted.contains(&tag.prefix) {
            return Ok(ParsedLocator::Untracked { prefix: tag.prefix });
        }

        Ok(ParsedLocator::Tracked(PluginReference {
            registry_host: host.to_string(),
            namespace_path: namespace_path.to_string(),
            artifact_name: artifact_name.to_string(),
            export_name: export_name.to_string(),
            tag,
            raw_locator: locator.to_string(),
        }))
    }

    pub fn tag_prefix(&self) -> &str {
        &self.tag.prefix
    }

    pub fn raw_tag(&self) -> &str {
        &self.tag.raw
    }

    pub fn current_version(&self) -> &TagVersion {
        &self.tag.version
    }

    pub fn artifact(&self) -> ArtifactRef {
        ArtifactRef::new(&self.registry_host, &self.namespace_path, &self.artifact_name)
    }

    /// The locator with its tag swapped for `tag`; everything else verbatim.
    pub fn locator_with_tag(&self, tag: &str) -> String {
        format!(
            "{}{}/{}/{}:{}!{}",
            OCI_SCHEME,
            self.registry_host,
            self.namespace_path,
            self.artifact_name,
            tag,
            self.export_name
        )
    }

    /// Rebuilds the locator from the parsed fields.
    pub fn locator(&self) -> String {
        self.locator_with_tag(&self.tag.render())
    }
}

impl fmt::Display for PluginReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.artifact_name, self.tag.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATOR: &str = "oci://ghcr.io/redhat-developer/rhdh-plugin-export-overlays/backstage-plugin-mcp-actions-backend:next__0.1.2!backstage-plugin-mcp-actions-backend";

    fn prefixes() -> TagPrefixes {
        TagPrefixes::parse("next__,stable__").unwrap()
    }

    fn tracked(locator: &str) -> PluginReference {
        match PluginReference::parse(locator, &prefixes()).unwrap() {
            ParsedLocator::Tracked(reference) => reference,
            other => panic!("expected tracked reference, got {:?}", other),
        }
    }

    #[test]
    fn parses_full_locator() {
        let reference = tracked(LOCATOR);
        assert_eq!(reference.registry_host, "ghcr.io");
        assert_eq!(
            reference.namespace_path,
            "redhat-developer/rhdh-plugin-export-overlays"
        );
        assert_eq!(reference.artifact_name, "backstage-plugin-mcp-actions-backend");
        assert_eq!(reference.export_name, "backstage-plugin-mcp-actions-backend");
        assert_eq!(reference.tag_prefix(), "next");
        assert_eq!(reference.raw_tag(), "next__0.1.2");
        assert_eq!(reference.current_version().primary.to_string(), "0.1.2");
        assert!(reference.current_version().secondary.is_none());
        assert_eq!(reference.raw_locator, LOCATOR);
    }

    #[test]
    fn parses_dual_version_tag() {
        let reference = tracked("oci://quay.io/org/team/plugin:stable__1.42.5__0.1.0!plugin-dynamic");
        assert_eq!(reference.tag_prefix(), "stable");
        assert_eq!(reference.current_version().primary.to_string(), "1.42.5");
        assert_eq!(
            reference.current_version().secondary.as_ref().unwrap().to_string(),
            "0.1.0"
        );
    }

    #[test]
    fn locator_round_trip() {
        for locator in [
            LOCATOR,
            "oci://h/p/n:next__1__2!e",
            "oci://localhost:5000/a/b/c/name:stable__1.0__0.0.1!export!with!bangs",
            "oci://h/p/n:next__01.2!e",
        ] {
            assert_eq!(tracked(locator).locator(), locator);
        }
    }

    #[test]
    fn locator_with_tag_only_changes_tag() {
        let reference = tracked(LOCATOR);
        assert_eq!(
            reference.locator_with_tag("next__0.2.0"),
            LOCATOR.replace("next__0.1.2", "next__0.2.0")
        );
    }

    #[test]
    fn untracked_prefix_is_not_an_error() {
        let parsed = PluginReference::parse("oci://h/p/n:previous__1.0.0!e", &prefixes()).unwrap();
        assert_eq!(
            parsed,
            ParsedLocator::Untracked {
                prefix: "previous".to_string()
            }
        );
    }

    #[test]
    fn rejects_malformed_references() {
        for locator in [
            "ghcr.io/org/name:next__1.0.0!e",
            "oci://ghcr.io/org/name:next__1.0.0",
            "oci://ghcr.io/org/name!e",
            "oci:///org/name:next__1.0.0!e",
            "oci://ghcr.io/name:next__1.0.0!e",
            "oci://ghcr.io//name:next__1.0.0!e",
            "oci://ghcr.io/org/:next__1.0.0!e",
            "oci://ghcr.io/org/name:next__1.0.0!",
        ] {
            let err = PluginReference::parse(locator, &prefixes()).unwrap_err();
            assert!(
                matches!(err, PguError::MalformedReference { .. }),
                "{locator}: {err}"
            );
        }
    }

    #[test]
    fn rejects_malformed_tags() {
        for locator in [
            "oci://h/p/n:latest!e",
            "oci://h/p/n:next__1.0__2.0__3.0!e",
            "oci://h/p/n:next__1.0-rc1!e",
        ] {
            let err = PluginReference::parse(locator, &prefixes()).unwrap_err();
            assert!(matches!(err, PguError::MalformedTag { .. }), "{locator}: {err}");
        }
    }

    #[test]
    fn artifact_identity() {
        let artifact = tracked(LOCATOR).artifact();
        assert_eq!(
            artifact.to_string(),
            "ghcr.io/redhat-developer/rhdh-plugin-export-overlays/backstage-plugin-mcp-actions-backend"
        );
    }
}
