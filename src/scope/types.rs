//! Scope type: a dot-separated hierarchical identifier with `*`/`**` wildcard
//! pattern matching (§4.3).

use std::fmt;
use std::str::FromStr;

pub type ScopeResult<T> = Result<T, ScopeError>;

/// The reserved sentinel that terminates every scope inheritance chain. No
/// legal scope string may equal it.
pub const GLOBAL: &str = "GLOBAL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    EmptyScope,
    EmptySegment,
    InvalidSegment(String),
    TooDeep { depth: usize, max: usize },
    ReservedName(String),
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyScope => write!(f, "scope cannot be empty"),
            Self::EmptySegment => write!(f, "scope segment cannot be empty"),
            Self::InvalidSegment(s) => write!(
                f,
                "invalid scope segment '{s}': must match [A-Za-z0-9_-]+, or be '*'/'**' in a pattern"
            ),
            Self::TooDeep { depth, max } => {
                write!(f, "scope depth {depth} exceeds maximum of {max}")
            }
            Self::ReservedName(s) => write!(f, "'{s}' is a reserved scope name"),
        }
    }
}

impl std::error::Error for ScopeError {}

fn is_valid_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// A dot-separated hierarchical scope, e.g. `acme.corp.engineering.team1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    raw: String,
    segments: Vec<String>,
}

impl Scope {
    /// Parses a concrete scope (no wildcards), validating against `max_depth`.
    pub fn new(s: &str, max_depth: usize) -> ScopeResult<Self> {
        Self::parse(s, max_depth, false)
    }

    /// Parses a scope pattern, where `*` and `**` segments are permitted.
    pub fn new_pattern(s: &str, max_depth: usize) -> ScopeResult<Self> {
        Self::parse(s, max_depth, true)
    }

    fn parse(s: &str, max_depth: usize, allow_wildcards: bool) -> ScopeResult<Self> {
        if s.is_empty() {
            return Err(ScopeError::EmptyScope);
        }
        if s == GLOBAL {
            return Err(ScopeError::ReservedName(s.to_string()));
        }
        let segments: Vec<String> = s.split('.').map(|seg| seg.to_string()).collect();
        if segments.len() > max_depth {
            return Err(ScopeError::TooDeep {
                depth: segments.len(),
                max: max_depth,
            });
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(ScopeError::EmptySegment);
            }
            if allow_wildcards && (segment == "*" || segment == "**") {
                continue;
            }
            if !segment.chars().all(is_valid_segment_char) {
                return Err(ScopeError::InvalidSegment(segment.clone()));
            }
        }
        Ok(Self {
            raw: s.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn has_wildcards(&self) -> bool {
        self.segments.iter().any(|s| s == "*" || s == "**")
    }

    /// Returns the parent scope (one segment shorter), if any.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        let parent_segments = self.segments[..self.segments.len() - 1].to_vec();
        let raw = parent_segments.join(".");
        Some(Self {
            raw,
            segments: parent_segments,
        })
    }

    pub fn is_parent_of(&self, other: &Scope) -> bool {
        if self.segments.len() >= other.segments.len() {
            return false;
        }
        self.segments.iter().zip(other.segments.iter()).all(|(a, b)| a == b)
    }

    pub fn is_child_of(&self, other: &Scope) -> bool {
        other.is_parent_of(self)
    }

    /// `buildScopeChain`: the ordered, most-specific-first list of this scope
    /// and all of its ancestors, e.g. `a.b.c` -> `["a.b.c", "a.b", "a"]`.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = Vec::with_capacity(self.segments.len());
        for end in (1..=self.segments.len()).rev() {
            chain.push(self.segments[..end].join("."));
        }
        chain
    }

    /// Recursive segment-matching: `*` consumes exactly one segment, `**`
    /// consumes zero or more (trying every possible consumption), and may
    /// appear at any position in the pattern.
    pub fn matches_pattern(&self, pattern: &Scope) -> bool {
        matches_segments(pattern.segments(), self.segments())
    }
}

fn matches_segments(pattern: &[String], scope: &[String]) -> bool {
    match pattern.split_first() {
        None => scope.is_empty(),
        Some((head, rest)) => {
            if head == "**" {
                (0..=scope.len()).any(|consume| matches_segments(rest, &scope[consume..]))
            } else if head == "*" {
                !scope.is_empty() && matches_segments(rest, &scope[1..])
            } else {
                !scope.is_empty() && scope[0] == *head && matches_segments(rest, &scope[1..])
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Parses with the default max depth of 10, for call sites without an
/// `EngineConfig` in scope (e.g. tests).
impl FromStr for Scope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s, super::resolver::DEFAULT_MAX_SCOPE_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_scope() {
        let scope = Scope::new("acme.corp.eng", 10).unwrap();
        assert_eq!(scope.segments().len(), 3);
        assert_eq!(scope.depth(), 3);
    }

    #[test]
    fn rejects_empty_scope() {
        assert_eq!(Scope::new("", 10).unwrap_err(), ScopeError::EmptyScope);
    }

    #[test]
    fn rejects_empty_segment() {
        assert_eq!(Scope::new("acme..eng", 10).unwrap_err(), ScopeError::EmptySegment);
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(matches!(
            Scope::new("acme.eng!", 10),
            Err(ScopeError::InvalidSegment(_))
        ));
    }

    #[test]
    fn rejects_wildcards_in_concrete_scope() {
        assert!(Scope::new("acme.*", 10).is_err());
        assert!(Scope::new_pattern("acme.*", 10).is_ok());
    }

    #[test]
    fn max_depth_boundary() {
        assert!(Scope::new("a.b.c.d.e.f.g.h.i.j", 10).is_ok());
        assert!(Scope::new("a.b.c.d.e.f.g.h.i.j.k", 10).is_err());
    }

    #[test]
    fn rejects_reserved_global_name() {
        assert!(Scope::new("GLOBAL", 10).is_err());
    }

    #[test]
    fn chain_is_most_specific_first() {
        let scope = Scope::new("a.b.c", 10).unwrap();
        assert_eq!(scope.chain(), vec!["a.b.c".to_string(), "a.b".to_string(), "a".to_string()]);
    }

    #[test]
    fn parent_and_child_relationships() {
        let parent = Scope::new("acme", 10).unwrap();
        let child = Scope::new("acme.eng", 10).unwrap();
        assert!(parent.is_parent_of(&child));
        assert!(child.is_child_of(&parent));
        assert!(!child.is_parent_of(&parent));
    }

    #[test]
    fn single_wildcard_matches_exactly_one_segment() {
        let scope = Scope::new("acme.eng", 10).unwrap();
        let pattern = Scope::new_pattern("acme.*", 10).unwrap();
        assert!(scope.matches_pattern(&pattern));
        let pattern2 = Scope::new_pattern("*.eng", 10).unwrap();
        assert!(scope.matches_pattern(&pattern2));
    }

    #[test]
    fn double_wildcard_matches_trailing_segments() {
        let scope = Scope::new("acme.eng.team1", 10).unwrap();
        let pattern = Scope::new_pattern("acme.**", 10).unwrap();
        assert!(scope.matches_pattern(&pattern));
    }

    #[test]
    fn double_wildcard_can_appear_mid_pattern() {
        let scope = Scope::new("acme.eng.team1.sub", 10).unwrap();
        let pattern = Scope::new_pattern("acme.**.sub", 10).unwrap();
        assert!(scope.matches_pattern(&pattern));
        let non_matching = Scope::new("acme.other", 10).unwrap();
        assert!(!non_matching.matches_pattern(&pattern));
    }

    #[test]
    fn double_wildcard_can_match_zero_segments() {
        let scope = Scope::new("acme.sub", 10).unwrap();
        let pattern = Scope::new_pattern("acme.**.sub", 10).unwrap();
        assert!(scope.matches_pattern(&pattern));
    }
}
