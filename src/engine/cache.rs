//! Evaluation cache (§4.8): bounded LRU with lazy TTL eviction and
//! single-flight coalescing of concurrent identical requests, keyed by a
//! BLAKE3 fingerprint over the request plus the active bundle generation.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;

use crate::error::Result;
use crate::types::{CheckResponse, Principal, Resource, Value};

pub type Fingerprint = [u8; 32];

/// Computes the fingerprint of §4.8: principal id/roles/attributes, resource
/// kind/id/attributes, sorted actions, auxData, and the bundle generation
/// id, all canonically serialised so the hash is deterministic regardless of
/// map iteration order.
pub fn fingerprint(
    principal: &Principal,
    resource: &Resource,
    actions: &[String],
    aux_data: Option<&BTreeMap<String, Value>>,
    generation: u64,
) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(principal.id.as_bytes());
    for role in &principal.roles {
        hasher.update(role.as_bytes());
    }
    hash_attributes(&mut hasher, &principal.attributes);
    hasher.update(resource.kind.as_bytes());
    hasher.update(resource.id.as_bytes());
    hash_attributes(&mut hasher, &resource.attributes);
    let mut sorted_actions: Vec<&str> = actions.iter().map(String::as_str).collect();
    sorted_actions.sort_unstable();
    for action in sorted_actions {
        hasher.update(action.as_bytes());
    }
    if let Some(aux) = aux_data {
        hash_attributes(&mut hasher, aux);
    }
    hasher.update(&generation.to_le_bytes());
    *hasher.finalize().as_bytes()
}

fn hash_attributes(hasher: &mut blake3::Hasher, attributes: &BTreeMap<String, Value>) {
    // `BTreeMap` iterates in key order already, and `Value`'s serde
    // representation is itself canonical (`Map` is a `BTreeMap`), so a plain
    // JSON dump is a stable byte sequence.
    if let Ok(bytes) = serde_json::to_vec(attributes) {
        hasher.update(&bytes);
    }
}

struct CachedEntry {
    response: CheckResponse,
    inserted_at: Instant,
}

#[derive(Default)]
struct Latch {
    result: Mutex<Option<CheckResponse>>,
    condvar: Condvar,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Bounded LRU cache of `CheckResponse`s with lazy TTL expiry and
/// single-flight coalescing per fingerprint.
pub struct EvaluationCache {
    entries: Mutex<LruCache<Fingerprint, CachedEntry>>,
    in_flight: DashMap<Fingerprint, Arc<Latch>>,
    ttl: Duration,
    counters: CacheCounters,
}

impl EvaluationCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
            in_flight: DashMap::new(),
            ttl,
            counters: CacheCounters::default(),
        }
    }

    /// Returns the cached response for `key` if present and unexpired,
    /// marking it as a cache hit (`meta.cache_hit = true`). On miss, runs
    /// `compute` -- coalescing concurrent callers sharing the same `key` so
    /// only one actually executes it -- and caches a successful result.
    pub fn get_or_compute(
        &self,
        key: Fingerprint,
        compute: impl FnOnce() -> Result<CheckResponse>,
    ) -> Result<CheckResponse> {
        if let Some(mut response) = self.probe(key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            response.meta.cache_hit = true;
            return Ok(response);
        }

        // Claim the single-flight slot, or discover someone else already has.
        let (latch, is_leader) = match self.in_flight.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => (entry.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let latch = Arc::new(Latch::default());
                entry.insert(latch.clone());
                (latch, true)
            }
        };

        if !is_leader {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            let mut guard = latch.result.lock().unwrap();
            while guard.is_none() {
                guard = latch.condvar.wait(guard).unwrap();
            }
            let mut response = guard.clone().expect("latch signalled with a result");
            response.meta.cache_hit = true;
            return Ok(response);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let outcome = compute();
        self.in_flight.remove(&key);

        match &outcome {
            Ok(response) => {
                let mut guard = latch.result.lock().unwrap();
                *guard = Some(response.clone());
                latch.condvar.notify_all();
                self.insert(key, response.clone());
            }
            Err(_) => {
                // Leave no entry. A waiter that arrived before this failure
                // is still blocked on the condvar; wake it so it falls
                // through and recomputes independently rather than hanging.
                latch.condvar.notify_all();
            }
        }
        outcome
    }

    fn probe(&self, key: Fingerprint) -> Option<CheckResponse> {
        let mut entries = self.entries.lock().unwrap();
        let expired = entries.peek(&key).map(|e| self.is_expired(e)).unwrap_or(false);
        if expired {
            entries.pop(&key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        entries.get(&key).map(|e| e.response.clone())
    }

    fn is_expired(&self, entry: &CachedEntry) -> bool {
        !self.ttl.is_zero() && entry.inserted_at.elapsed() >= self.ttl
    }

    fn insert(&self, key: Fingerprint, response: CheckResponse) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= entries.cap().get() && !entries.contains(&key) {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        entries.put(key, CachedEntry { response, inserted_at: Instant::now() });
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.in_flight.clear();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}
