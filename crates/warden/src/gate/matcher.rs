//! Action matcher: is this action gated at all?

use std::collections::HashSet;

/// Whitelist of gated action patterns.
///
/// Patterns are exact names, a prefix ending in `*`, or a lone `*`. Lookup
/// prefers an exact name, then the longest prefix, then `*`. Anything else is
/// not gated.
#[derive(Debug, Default, Clone)]
pub struct ActionMatcher {
    exact: HashSet<String>,
    /// (prefix, pattern), longest prefix first
    prefixes: Vec<(String, String)>,
    catch_all: bool,
}

impl ActionMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_suffix('*') {
                Some("") => matcher.catch_all = true,
                Some(prefix) => matcher
                    .prefixes
                    .push((prefix.to_string(), pattern.to_string())),
                None => {
                    matcher.exact.insert(pattern.to_string());
                }
            }
        }
        matcher
            .prefixes
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        matcher
    }

    /// The pattern an action matched, if any
    pub fn find(&self, action: &str) -> Option<&str> {
        if let Some(name) = self.exact.get(action) {
            return Some(name.as_str());
        }
        if let Some((_, pattern)) = self
            .prefixes
            .iter()
            .find(|(prefix, _)| action.starts_with(prefix.as_str()))
        {
            return Some(pattern.as_str());
        }
        self.catch_all.then_some("*")
    }

    pub fn matches(&self, action: &str) -> bool {
        self.find(action).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty() && !self.catch_all
    }
}
