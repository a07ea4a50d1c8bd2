use crate::error::{PguError, Result};
use std::cmp::Ordering;
use std::fmt;

/// Tag segments are joined with a double underscore: `next__1.42.5__0.1.0`.
pub const TAG_SEPARATOR: &str = "__";

/// Dot-separated numeric version such as `1.42.5`.
///
/// Equality and ordering look only at the numeric components, with missing
/// trailing components treated as zero, so `1.2` == `1.2.0`. The original
/// text is kept for rendering.
#[derive(Debug, Clone)]
pub struct Version {
    pub original: String,
    pub components: Vec<u64>,
}

impl Version {
    pub fn parse(version: &str) -> Result<Self> {
        if version.is_empty() {
            return Err(PguError::malformed_tag(version, "empty version"));
        }

        let mut components = Vec::new();
        for part in version.split('.') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(PguError::malformed_tag(
                    version,
                    format!("version component '{}' is not a non-negative integer", part),
                ));
            }
            let number = part.parse::<u64>().map_err(|e| {
                PguError::malformed_tag(version, format!("component '{}': {}", part, e))
            })?;
            components.push(number);
        }

        Ok(Version {
            original: version.to_string(),
            components,
        })
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Version part of a tag: a primary version and, for dual-version tags, a
/// secondary one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagVersion {
    pub primary: Version,
    pub secondary: Option<Version>,
}

impl TagVersion {
    /// Upgrade test. Primary-major; the secondary version only decides when
    /// the primaries are equal and both sides carry one.
    pub fn is_newer_than(&self, other: &TagVersion) -> bool {
        match self.primary.cmp(&other.primary) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match (&self.secondary, &other.secondary) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
        }
    }
}

impl PartialOrd for TagVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order used to pick the greatest registry tag. A tag without a
/// secondary version sorts before a dual tag with the same primary.
impl Ord for TagVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.primary
            .cmp(&other.primary)
            .then_with(|| match (&self.secondary, &other.secondary) {
                (Some(a), Some(b)) => a.cmp(b),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    }
}

impl fmt::Display for TagVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.secondary {
            Some(secondary) => write!(f, "{}{}{}", self.primary, TAG_SEPARATOR, secondary),
            None => write!(f, "{}", self.primary),
        }
    }
}

/// A tag decomposed into its release-channel prefix and version part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryTag {
    pub raw: String,
    pub prefix: String,
    pub version: TagVersion,
}

impl RegistryTag {
    pub fn parse(tag: &str) -> Result<Self> {
        let segments: Vec<&str> = tag.split(TAG_SEPARATOR).collect();
        let (prefix, primary, secondary) = match segments.as_slice() {
            [prefix, primary] => (*prefix, *primary, None),
            [prefix, primary, secondary] => (*prefix, *primary, Some(*secondary)),
            [_] => {
                return Err(PguError::malformed_tag(
                    tag,
                    format!("missing '{}' separator", TAG_SEPARATOR),
                ));
            }
            _ => {
                return Err(PguError::malformed_tag(
                    tag,
                    format!("expected 2 or 3 '{}'-separated segments", TAG_SEPARATOR),
                ));
            }
        };

        if prefix.is_empty() {
            return Err(PguError::malformed_tag(tag, "empty tag prefix"));
        }

        let primary = Version::parse(primary).map_err(|e| retag(e, tag))?;
        let secondary = secondary
            .map(Version::parse)
            .transpose()
            .map_err(|e| retag(e, tag))?;

        Ok(RegistryTag {
            raw: tag.to_string(),
            prefix: prefix.to_string(),
            version: TagVersion { primary, secondary },
        })
    }

    /// Rebuilds the tag text from its parts; equals `raw` for parsed tags.
    pub fn render(&self) -> String {
        format!("{}{}{}", self.prefix, TAG_SEPARATOR, self.version)
    }
}

// Report the whole tag rather than the version fragment that failed.
fn retag(error: PguError, tag: &str) -> PguError {
    match error {
        PguError::MalformedTag { reason, .. } => PguError::malformed_tag(tag, reason),
        other => other,
    }
}
