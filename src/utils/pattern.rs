use crate::error::{PguError, Result};
use regex::Regex;

/// Case-insensitive glob (`*`, `?`) matcher for plugin names. A pattern
/// without wildcards matches as a substring.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(PguError::Configuration(
                "Filter pattern cannot be empty".to_string(),
            ));
        }

        let adjusted = if trimmed.contains(['*', '?']) {
            trimmed.to_string()
        } else {
            format!("*{}*", trimmed)
        };

        let mut source = String::from("(?i)^");
        for ch in adjusted.chars() {
            match ch {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| {
            PguError::Configuration(format!("Invalid filter pattern '{}': {}", pattern, e))
        })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_word_matches_substring() {
        let matcher = PatternMatcher::new("mcp").unwrap();
        assert!(matcher.matches("backstage-plugin-mcp-actions-backend"));
        assert!(matcher.matches("MCP-tool"));
        assert!(!matcher.matches("techdocs"));
    }

    #[test]
    fn wildcards_are_anchored() {
        let matcher = PatternMatcher::new("backstage-*-backend").unwrap();
        assert!(matcher.matches("backstage-plugin-mcp-actions-backend"));
        assert!(!matcher.matches("backstage-plugin-mcp-actions-backend-dynamic"));

        let single = PatternMatcher::new("plugin-?").unwrap();
        assert!(single.matches("plugin-a"));
        assert!(!single.matches("plugin-ab"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let matcher = PatternMatcher::new("a.b").unwrap();
        assert!(matcher.matches("xa.by"));
        assert!(!matcher.matches("axb"));
    }

    #[test]
    fn rejects_empty_pattern() {
        assert!(PatternMatcher::new("  ").is_err());
    }
}
