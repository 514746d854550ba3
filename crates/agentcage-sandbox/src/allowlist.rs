//! Allow-list matcher (§4.B): case-insensitive domain match with `*.`
//! suffix wildcard.

use std::collections::BTreeSet;

/// A set of lowercase domain patterns. A pattern is either an exact domain
/// or `*.suffix`, meaning "any host ending in `.suffix` or equal to
/// `suffix`".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkAllowlist {
    patterns: BTreeSet<String>,
}

impl NetworkAllowlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an allowlist from an iterator of pattern strings.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for p in patterns {
            set.insert(p.into().to_lowercase());
        }
        Self { patterns: set }
    }

    pub fn add(&mut self, pattern: impl Into<String>) {
        self.patterns.insert(pattern.into().to_lowercase());
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Union with another allowlist (set-theoretic).
    pub fn union(&self, other: &Self) -> Self {
        Self {
            patterns: self.patterns.union(&other.patterns).cloned().collect(),
        }
    }

    /// True iff `host` matches some stored pattern.
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.patterns.iter().any(|p| pattern_matches(p, &host))
    }

    /// A small convenience preset covering common local development hosts.
    pub fn common_dev_hosts() -> Self {
        Self::from_patterns(["localhost", "127.0.0.1", "*.localhost"])
    }

    /// A small convenience preset covering common hosted AI API providers.
    pub fn common_ai_api_hosts() -> Self {
        Self::from_patterns([
            "api.openai.com",
            "api.anthropic.com",
            "*.googleapis.com",
            "generativelanguage.googleapis.com",
        ])
    }
}

/// `pattern` and `host` are both already lowercased.
fn pattern_matches(pattern: &str, host: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        // suffix keeps the leading dot, e.g. pattern "*.x.y" -> suffix ".x.y"
        let apex = &suffix[1..]; // drop the leading dot -> "x.y"
        host.ends_with(suffix) || host == apex
    } else {
        host == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_case_insensitive() {
        let list = NetworkAllowlist::from_patterns(["Example.com"]);
        assert!(list.matches("example.com"));
        assert!(list.matches("EXAMPLE.COM"));
        assert!(!list.matches("other.com"));
    }

    #[test]
    fn wildcard_matches_subdomain_and_apex_not_cousin() {
        let list = NetworkAllowlist::from_patterns(["*.x.y"]);
        assert!(list.matches("a.x.y"));
        assert!(list.matches("x.y"));
        assert!(!list.matches("x.y.z"));
        assert!(!list.matches("ax.y"));
    }

    #[test]
    fn union_is_set_theoretic() {
        let a = NetworkAllowlist::from_patterns(["a.com"]);
        let b = NetworkAllowlist::from_patterns(["b.com"]);
        let u = a.union(&b);
        assert!(u.matches("a.com"));
        assert!(u.matches("b.com"));
        assert!(!u.matches("c.com"));
    }

    #[test]
    fn no_wildcard_requires_exact_equality() {
        let list = NetworkAllowlist::from_patterns(["example.com"]);
        assert!(!list.matches("sub.example.com"));
    }
}
