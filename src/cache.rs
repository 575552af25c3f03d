//! Process-local response cache with TTL buckets, LRU eviction and
//! tag-based invalidation.
//!
//! Values are cached as `serde_json::Value` so any handler payload can be
//! stored. Empty arrays are never cached: a cold read that found nothing
//! must be allowed to retry upstream discovery on the next call.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// TTL class buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    /// Rapidly changing data (intraday, latest bar): 30s.
    Fast,
    /// Default: 60s.
    Normal,
    /// Slow-moving data (fundamentals, catalog groups): 300s.
    Slow,
    /// Job/scheduler status: 10s.
    Status,
}

impl CacheTtl {
    pub fn duration(&self) -> Duration {
        match self {
            CacheTtl::Fast => Duration::from_secs(30),
            CacheTtl::Normal => Duration::from_secs(60),
            CacheTtl::Slow => Duration::from_secs(300),
            CacheTtl::Status => Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

struct Entry {
    value: Value,
    expires_at: Instant,
    tags: HashSet<String>,
    last_access: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    access_counter: u64,
    hits: u64,
    misses: u64,
    sets: u64,
    evictions: u64,
}

/// Concurrency-safe key→JSON cache shared through the app context.
pub struct Cache {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl Cache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                access_counter: 0,
                hits: 0,
                misses: 0,
                sets: 0,
                evictions: 0,
            }),
            max_size,
        }
    }

    /// Look a key up. With `bypass` set the entry is dropped and a miss is
    /// reported, so the caller re-reads and re-populates.
    pub fn get(&self, key: &str, bypass: bool) -> Option<Value> {
        let mut inner = self.inner.lock();
        if bypass {
            inner.entries.remove(key);
            inner.misses += 1;
            return None;
        }
        inner.access_counter += 1;
        let counter = inner.access_counter;
        match inner.entries.get_mut(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.last_access = counter;
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            Some(_) => {
                inner.entries.remove(key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a value under a TTL bucket with optional tags. Empty arrays are
    /// rejected so the next reader retries the underlying query.
    pub fn set(&self, key: &str, value: Value, ttl: CacheTtl, tags: &[String]) {
        if matches!(&value, Value::Array(items) if items.is_empty()) {
            return;
        }
        let mut inner = self.inner.lock();
        inner.access_counter += 1;
        let counter = inner.access_counter;

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_size {
            // Evict the least-recently used entry.
            if let Some(lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&lru_key);
                inner.evictions += 1;
            }
        }

        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl.duration(),
                tags: tags.iter().cloned().collect(),
                last_access: counter,
            },
        );
        inner.sets += 1;
    }

    /// Remove every entry carrying `tag`; returns how many were dropped.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.tags.contains(tag))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            inner.entries.remove(key);
        }
        keys.len()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.entries.len();
        inner.entries.clear();
        n
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            entries: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            sets: inner.sets,
            evictions: inner.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
        }
    }
}

/// Tag helper: `ticker:487240`.
pub fn ticker_tag(ticker: &str) -> String {
    format!("ticker:{ticker}")
}

/// Tag helper: `kind:prices`.
pub fn kind_tag(kind: &str) -> String {
    format!("kind:{kind}")
}
