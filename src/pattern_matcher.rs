//! Compiles subscription patterns to regular expressions and caches them
//!
//! A pattern is a `.`-separated sequence of literal segments with `*` as a
//! wildcard matching any sequence of characters. Compilation is ReDoS-safe:
//! every character outside `*` is treated as a literal (escaped before
//! insertion into the regex), so user-supplied patterns cannot construct a
//! pathological expression, and the compiled form is always anchored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use crate::domain_types::{MessagePattern, PatternCacheSize};
use crate::error::PatternError;

/// Matching a single pattern against a single type should never take
/// longer than this; exceeding it only logs a warning, it's not a hard
/// failure.
const MATCH_WARN_THRESHOLD_MS: u128 = 5;

/// A pattern longer than this is rejected even though [`MessagePattern`]'s
/// own constructor already enforces the same cap — `matches` re-checks it so
/// the cap holds for any caller that builds a pattern some other way.
const MAX_PATTERN_CHARS: usize = 1000;

/// A point-in-time snapshot of the compiled-pattern cache's hit rate and
/// occupancy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Compiled patterns currently cached
    pub size: usize,
    /// Configured cache capacity
    pub max_size: usize,
    /// Lookups served from the cache without recompiling
    pub hits: u64,
    /// Lookups that required compiling the pattern
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache, `0.0` if none have happened yet.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.hits as f64 / total as f64;
            rate
        }
    }
}

/// Compiles wildcard patterns into anchored regexes and caches the
/// compiled form behind an LRU eviction policy.
#[derive(Debug)]
pub struct PatternMatcher {
    cache: Mutex<LruCache<MessagePattern, Regex>>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PatternMatcher {
    /// Creates a matcher with the given compiled-pattern cache capacity.
    ///
    /// # Panics
    /// Never panics; the fallback capacity of 1 is a non-zero literal.
    #[must_use]
    pub fn new(cache_size: PatternCacheSize) -> Self {
        let capacity = std::num::NonZeroUsize::new(cache_size.as_usize())
            .unwrap_or(std::num::NonZeroUsize::new(1).expect("1 is nonzero"));
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            max_size: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Compiles (or fetches from cache) the regex for `pattern`, then tests
    /// it against `message_type`.
    ///
    /// # Errors
    /// Returns [`PatternError::PatternTooLong`] if the pattern exceeds 1000
    /// characters (enforced already by [`MessagePattern`]'s constructor, but
    /// re-checked here defensively) or [`PatternError::InvalidPattern`] if
    /// the compiled regex is rejected by the `regex` crate.
    #[instrument(skip(self), level = "trace")]
    pub async fn matches(
        &self,
        pattern: &MessagePattern,
        message_type: &str,
    ) -> Result<bool, PatternError> {
        let start = Instant::now();

        let len = pattern.as_ref().chars().count();
        if len > MAX_PATTERN_CHARS {
            return Err(PatternError::PatternTooLong { len });
        }

        let regex = self.compile(pattern).await?;
        let result = regex.is_match(message_type);

        let elapsed = start.elapsed().as_millis();
        if elapsed > MATCH_WARN_THRESHOLD_MS {
            warn!(pattern = %pattern, elapsed_ms = elapsed, "pattern match exceeded budget");
        }

        Ok(result)
    }

    /// Compiles `pattern` if not already cached, inserting it into the LRU
    /// cache and evicting the least-recently-used entry if at capacity.
    ///
    /// # Errors
    /// Returns [`PatternError::InvalidPattern`] if the pattern cannot be
    /// compiled to a regular expression.
    pub async fn compile(&self, pattern: &MessagePattern) -> Result<Regex, PatternError> {
        let mut cache = self.cache.lock().await;
        if let Some(regex) = cache.get(pattern) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(regex.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let regex = Self::compile_uncached(pattern)?;
        cache.put(pattern.clone(), regex.clone());
        Ok(regex)
    }

    /// Escapes every literal segment and rewrites `*` to `.*`, anchoring the
    /// whole expression to forbid partial matches.
    fn compile_uncached(pattern: &MessagePattern) -> Result<Regex, PatternError> {
        let raw = pattern.as_ref();
        let mut anchored = String::with_capacity(raw.len() * 2 + 2);
        anchored.push('^');
        for ch in raw.chars() {
            if ch == '*' {
                anchored.push_str(".*");
            } else {
                anchored.push_str(&regex::escape(&ch.to_string()));
            }
        }
        anchored.push('$');

        Regex::new(&anchored).map_err(|e| PatternError::InvalidPattern {
            reason: e.to_string(),
        })
    }

    /// Number of compiled patterns currently cached.
    pub async fn cache_size(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// A snapshot of the cache's size, capacity, and lifetime hit/miss
    /// counters.
    pub async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.lock().await.len(),
            max_size: self.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Evicts every cached compiled pattern. Leaves the hit/miss counters
    /// untouched — they describe lifetime activity, not current occupancy.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}

/// Shared handle to a [`PatternMatcher`], passed to every component that
/// needs to test subscription patterns.
pub type SharedPatternMatcher = Arc<PatternMatcher>;
