//! Scope chain computation, effective-scope intersection, and the bounded
//! TTL+LRU cache backing both (§4.3, §5).

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::scope::types::{Scope, ScopeResult, GLOBAL};

pub const DEFAULT_MAX_SCOPE_DEPTH: usize = 10;
pub const DEFAULT_CHAIN_CACHE_SIZE: usize = 1000;
pub const DEFAULT_CHAIN_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct ChainEntry {
    chain: Vec<String>,
    created_at: Instant,
}

/// Resolves scope inheritance chains and effective scopes, backed by a
/// bounded, TTL'd, LRU cache of chain computations.
pub struct ScopeResolver {
    max_depth: usize,
    ttl: Duration,
    cache: Mutex<LruCache<String, ChainEntry>>,
    stats: Mutex<CacheStats>,
}

impl ScopeResolver {
    pub fn new(max_depth: usize) -> Self {
        Self::with_cache_config(max_depth, DEFAULT_CHAIN_CACHE_SIZE, DEFAULT_CHAIN_CACHE_TTL)
    }

    pub fn with_cache_config(max_depth: usize, cache_size: usize, ttl: Duration) -> Self {
        Self {
            max_depth,
            ttl,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(cache_size.max(1)).unwrap())),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn parse(&self, s: &str) -> ScopeResult<Scope> {
        Scope::new(s, self.max_depth)
    }

    pub fn parse_pattern(&self, s: &str) -> ScopeResult<Scope> {
        Scope::new_pattern(s, self.max_depth)
    }

    /// `buildScopeChain` plus the trailing `GLOBAL` sentinel, cached by the raw
    /// scope string.
    pub fn build_chain(&self, scope: &str) -> ScopeResult<Vec<String>> {
        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(scope) {
                if entry.created_at.elapsed() < self.ttl || self.ttl.is_zero() {
                    self.stats.lock().hits += 1;
                    return Ok(entry.chain.clone());
                }
                cache.pop(scope);
            }
        }
        self.stats.lock().misses += 1;
        let parsed = self.parse(scope)?;
        let mut chain = parsed.chain();
        chain.push(GLOBAL.to_string());

        let mut cache = self.cache.lock();
        if cache.len() >= cache.cap().get() && !cache.contains(scope) {
            self.stats.lock().evictions += 1;
        }
        cache.put(
            scope.to_string(),
            ChainEntry {
                chain: chain.clone(),
                created_at: Instant::now(),
            },
        );
        Ok(chain)
    }

    /// Effective scope of a request: if either side is absent, use the other;
    /// if both present and one is a prefix of the other, use the more
    /// specific; otherwise, use their common ancestor.
    pub fn effective_scope(
        &self,
        principal_scope: Option<&str>,
        resource_scope: Option<&str>,
    ) -> ScopeResult<Option<String>> {
        match (principal_scope, resource_scope) {
            (None, None) => Ok(None),
            (Some(s), None) | (None, Some(s)) => Ok(Some(s.to_string())),
            (Some(p), Some(r)) if p == r => Ok(Some(p.to_string())),
            (Some(p), Some(r)) => {
                let p_scope = self.parse(p)?;
                let r_scope = self.parse(r)?;
                if p_scope.is_parent_of(&r_scope) {
                    return Ok(Some(r.to_string()));
                }
                if r_scope.is_parent_of(&p_scope) {
                    return Ok(Some(p.to_string()));
                }
                let common = common_ancestor(p_scope.segments(), r_scope.segments());
                Ok(if common.is_empty() {
                    None
                } else {
                    Some(common.join("."))
                })
            }
        }
    }

    /// `findMatchingPolicy`: walks `[...buildScopeChain(effectiveScope), GLOBAL]`
    /// and returns the first scope for which `has_entry` reports a match.
    pub fn find_matching_scope(
        &self,
        effective_scope: Option<&str>,
        mut has_entry: impl FnMut(&str) -> bool,
    ) -> ScopeResult<Option<String>> {
        let chain = match effective_scope {
            Some(scope) => self.build_chain(scope)?,
            None => vec![GLOBAL.to_string()],
        };
        Ok(chain.into_iter().find(|candidate| has_entry(candidate)))
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for ScopeResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCOPE_DEPTH)
    }
}

fn common_ancestor<'a>(a: &'a [String], b: &'a [String]) -> Vec<String> {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.clone())
        .collect()
}
