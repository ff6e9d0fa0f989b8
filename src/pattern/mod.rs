//! Wildcard pattern compilation and matching for principal identifiers and
//! action names (§4.2).
//!
//! Principal patterns support `*`, `prefix-*`, `*-suffix`, `prefix-*-suffix`,
//! `*@domain`, `group:<literal>`, or a plain literal. Action patterns are
//! deliberately simpler: `*` or an exact literal, no inner wildcards.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;

pub const DEFAULT_PATTERN_CACHE_SIZE: usize = 1000;

/// Compiles and caches principal-pattern matchers. Action patterns need no
/// compilation (exact-or-`*`) and are matched directly.
pub struct PatternMatcher {
    cache: Mutex<LruCache<String, Arc<Regex>>>,
}

impl PatternMatcher {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn matches_principal(&self, pattern: &str, identifier: &str) -> bool {
        if identifier.is_empty() {
            return false;
        }
        if pattern == "*" {
            return true;
        }
        if !pattern.contains('*') {
            return pattern == identifier;
        }
        self.compiled(pattern).is_match(identifier)
    }

    fn compiled(&self, pattern: &str) -> Arc<Regex> {
        let mut cache = self.cache.lock();
        if let Some(regex) = cache.get(pattern) {
            return regex.clone();
        }
        let regex = Arc::new(compile_wildcard(pattern));
        cache.put(pattern.to_string(), regex.clone());
        regex
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CACHE_SIZE)
    }
}

/// Action patterns are `*` (matches any action) or an exact literal -- no
/// compilation or caching needed, unlike principal patterns (§4.2).
pub fn matches_action(pattern: &str, action: &str) -> bool {
    pattern == "*" || pattern == action
}

/// Translates a wildcard pattern into an anchored regex: collapses runs of
/// `*`, escapes every other regex metacharacter, then maps `*` to `.*`.
fn compile_wildcard(pattern: &str) -> Regex {
    let collapsed = collapse_stars(pattern);
    let mut regex_src = String::from("^");
    for ch in collapsed.chars() {
        if ch == '*' {
            regex_src.push_str(".*");
        } else {
            regex_src.push_str(&regex::escape(&ch.to_string()));
        }
    }
    regex_src.push('$');
    Regex::new(&regex_src).expect("wildcard pattern always compiles to a valid regex")
}

fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut prev_star = false;
    for ch in pattern.chars() {
        if ch == '*' {
            if prev_star {
                continue;
            }
            prev_star = true;
        } else {
            prev_star = false;
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_wildcard_matches_any_nonempty_id() {
        let matcher = PatternMatcher::default();
        assert!(matcher.matches_principal("*", "user:alice"));
        assert!(!matcher.matches_principal("*", ""));
    }

    #[test]
    fn prefix_wildcard() {
        let matcher = PatternMatcher::default();
        assert!(matcher.matches_principal("admin-*", "admin-full"));
        assert!(!matcher.matches_principal("admin-*", "user-full"));
    }

    #[test]
    fn suffix_wildcard() {
        let matcher = PatternMatcher::default();
        assert!(matcher.matches_principal("*-viewer", "doc-viewer"));
        assert!(!matcher.matches_principal("*-viewer", "doc-editor"));
    }

    #[test]
    fn prefix_and_suffix_wildcard() {
        let matcher = PatternMatcher::default();
        assert!(matcher.matches_principal("admin-*-eu", "admin-full-eu"));
        assert!(!matcher.matches_principal("admin-*-eu", "admin-full-us"));
    }

    #[test]
    fn domain_wildcard() {
        let matcher = PatternMatcher::default();
        assert!(matcher.matches_principal("*@acme.com", "alice@acme.com"));
        assert!(!matcher.matches_principal("*@acme.com", "alice@other.com"));
    }

    #[test]
    fn group_literal() {
        let matcher = PatternMatcher::default();
        assert!(matcher.matches_principal("group:engineering", "group:engineering"));
        assert!(!matcher.matches_principal("group:engineering", "group:sales"));
    }

    #[test]
    fn exact_literal() {
        let matcher = PatternMatcher::default();
        assert!(matcher.matches_principal("user:alice", "user:alice"));
    }

    #[test]
    fn consecutive_stars_collapse() {
        let matcher = PatternMatcher::default();
        assert!(matcher.matches_principal("admin-**-eu", "admin-full-eu"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        let matcher = PatternMatcher::default();
        assert!(matcher.matches_principal("user.name+1", "user.name+1"));
        assert!(!matcher.matches_principal("user.name+1", "userXname+1"));
    }

    #[test]
    fn action_pattern_wildcard_and_exact() {
        assert!(matches_action("*", "read"));
        assert!(matches_action("read", "read"));
        assert!(!matches_action("read", "write"));
    }

    #[test]
    fn pattern_cache_is_bounded() {
        let matcher = PatternMatcher::new(2);
        matcher.matches_principal("a-*", "a-1");
        matcher.matches_principal("b-*", "b-1");
        matcher.matches_principal("c-*", "c-1");
        assert!(matcher.cache_len() <= 2);
    }
}
