//! Key Pattern Module
//!
//! Glob matching for `keys(pattern)`: `*` matches any run of characters,
//! `?` matches exactly one, everything else is literal. The whole key must
//! match. Line terminators are ordinary characters to both wildcards.

use regex::Regex;

use crate::error::{CacheError, Result};

// == Glob Pattern ==
/// Compiled glob shared by every strategy.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Regex,
}

impl GlobPattern {
    /// Compiles a glob into an anchored regular expression.
    pub fn new(pattern: &str) -> Result<Self> {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push_str("(?s)^");
        let mut literal = String::new();

        for ch in pattern.chars() {
            match ch {
                '*' | '?' => {
                    source.push_str(&regex::escape(&literal));
                    literal.clear();
                    source.push_str(if ch == '*' { ".*" } else { "." });
                }
                other => literal.push(other),
            }
        }
        source.push_str(&regex::escape(&literal));
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| CacheError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        Ok(Self { regex })
    }

    /// Returns true if the whole key matches.
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

/// Filters and sorts keys by an optional glob.
pub fn filter_keys(mut keys: Vec<String>, pattern: Option<&str>) -> Result<Vec<String>> {
    if let Some(pattern) = pattern {
        let glob = GlobPattern::new(pattern)?;
        keys.retain(|key| glob.matches(key));
    }
    keys.sort();
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_any_run() {
        let glob = GlobPattern::new("user:*").unwrap();
        assert!(glob.matches("user:1"));
        assert!(glob.matches("user:"));
        assert!(glob.matches("user:1:profile"));
        assert!(!glob.matches("other:user:1"));
    }

    #[test]
    fn test_question_mark_matches_single_char() {
        let glob = GlobPattern::new("item?").unwrap();
        assert!(glob.matches("item1"));
        assert!(!glob.matches("item"));
        assert!(!glob.matches("item12"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let glob = GlobPattern::new("a.b+(c)[d]$").unwrap();
        assert!(glob.matches("a.b+(c)[d]$"));
        assert!(!glob.matches("axb+(c)[d]$"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let glob = GlobPattern::new("User:*").unwrap();
        assert!(!glob.matches("user:1"));
    }

    #[test]
    fn test_wildcards_span_newlines() {
        let glob = GlobPattern::new("a*b").unwrap();
        assert!(glob.matches("a\nb"));
        assert!(glob.matches("a\r\n\nb"));

        let glob = GlobPattern::new("line?end").unwrap();
        assert!(glob.matches("line\nend"));
    }

    #[test]
    fn test_filter_keys_sorts() {
        let keys = vec!["b".to_string(), "user:2".to_string(), "user:1".to_string()];
        assert_eq!(
            filter_keys(keys.clone(), Some("user:*")).unwrap(),
            vec!["user:1".to_string(), "user:2".to_string()]
        );
        assert_eq!(filter_keys(keys, None).unwrap().len(), 3);
    }
}
