use crate::config::RunConfig;
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

pub mod ghcr;
pub use ghcr::{GHCR_HOST, GhcrTagSource};

/// Identity of one artifact in a container registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    pub host: String,
    pub namespace: String,
    pub name: String,
}

impl ArtifactRef {
    pub fn new(host: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.namespace, self.name)
    }
}

/// Lists every published tag of an artifact.
pub trait TagSource: Send + Sync {
    /// Whether this source can list tags for the artifact's registry host.
    fn supports(&self, artifact: &ArtifactRef) -> bool;

    fn list_tags(&self, artifact: &ArtifactRef) -> Result<Vec<String>>;
}

pub struct RegistryFactory;

impl RegistryFactory {
    pub fn create_ghcr(config: &RunConfig) -> Result<Arc<dyn TagSource>> {
        let client = GhcrTagSource::new(&config.github.api_url, config.github.token.clone())?;
        Ok(Arc::new(client))
    }
}
