use thiserror::Error;

#[derive(Error, Debug)]
pub enum PguError {
    #[error("Malformed plugin reference '{locator}': {reason}")]
    MalformedReference { locator: String, reason: String },

    #[error("Malformed tag '{tag}': {reason}")]
    MalformedTag { tag: String, reason: String },

    #[error("Registry query for '{artifact}' failed: {message}")]
    RegistryQuery { artifact: String, message: String },

    #[error("Locator '{locator}' occurs {occurrences} times in the configuration; refusing to guess")]
    AmbiguousMatch { locator: String, occurrences: usize },

    #[error("Locator '{locator}' no longer occurs in the configuration")]
    NotFound { locator: String },

    #[error("Invalid config location: {0}")]
    ConfigLocation(String),

    #[error("Configuration file parsing failed: {0}")]
    ConfigParsing(String),

    #[error("Invalid run configuration: {0}")]
    Configuration(String),

    #[error("Pull request operation failed: {0}")]
    PullRequest(String),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Project validation failed: {0}")]
    ProjectValidation(String),

    #[error("Run finished with {0} failure(s); see the report above")]
    RunFailures(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PguError {
    pub fn malformed_reference(locator: &str, reason: impl Into<String>) -> Self {
        Self::MalformedReference {
            locator: locator.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed_tag(tag: &str, reason: impl Into<String>) -> Self {
        Self::MalformedTag {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PguError>;
