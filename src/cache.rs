//! Content-addressed caching of generation results
//!
//! Repeated widget re-renders trigger identical generation calls; caching the
//! result keyed by the exact input tuple avoids redundant multi-second model
//! invocations. The cache is a convenience, not a correctness guarantee: the
//! backend's stochastic sampling could legitimately produce different pixels
//! for identical input across invocations if caching were disabled.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Default maximum number of cached results
///
/// Each entry holds one full decoded working-size image, so the bound keeps
/// a long-lived process from accumulating unbounded pixel data.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Result cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCacheStats {
    /// Number of cached results
    pub entries: usize,
    /// Number of cache hits since creation
    pub hits: u64,
    /// Number of cache misses since creation
    pub misses: u64,
}

/// In-memory cache of generated images keyed by request content digest
///
/// The key is the SHA-256 digest computed by
/// [`GenerationRequest::content_digest`](crate::GenerationRequest::content_digest),
/// covering prompt, image bytes, mask bytes and numeric parameters. The cache
/// holds at most `capacity` entries; when full, the oldest insertion is
/// evicted.
#[derive(Debug)]
pub struct ResultCache {
    entries: HashMap<String, DynamicImage>,
    insertion_order: VecDeque<String>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl ResultCache {
    /// Create an empty cache with the default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache bounded to `capacity` entries (at least 1)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a cached image by content digest
    pub fn get(&mut self, digest: &str) -> Option<DynamicImage> {
        match self.entries.get(digest) {
            Some(image) => {
                self.hits += 1;
                debug!(digest = %digest, "Result cache hit");
                Some(image.clone())
            },
            None => {
                self.misses += 1;
                debug!(digest = %digest, "Result cache miss");
                None
            },
        }
    }

    /// Store a generated image under its content digest
    ///
    /// When the cache is full, the oldest insertion is evicted first.
    /// Re-inserting an existing digest replaces the image without evicting.
    pub fn insert(&mut self, digest: String, image: DynamicImage) {
        if self.entries.insert(digest.clone(), image).is_some() {
            return;
        }
        self.insertion_order.push_back(digest);
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.insertion_order.pop_front() else {
                break;
            };
            debug!(digest = %oldest, "Evicting oldest cached result");
            self.entries.remove(&oldest);
        }
    }

    /// Whether a digest is present without touching the statistics
    #[must_use]
    pub fn contains(&self, digest: &str) -> bool {
        self.entries.contains_key(digest)
    }

    /// Drop all cached results, keeping the statistics
    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    /// Current cache statistics
    #[must_use]
    pub fn stats(&self) -> ResultCacheStats {
        ResultCacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}
