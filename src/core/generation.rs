//! Generation-stamped caches.
//!
//! Every owner of mutable state carries a monotonically increasing
//! generation. Derived values remember the generation (and input key) they
//! were computed under and are recomputed lazily on mismatch.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    pub const INITIAL: Generation = Generation(0);

    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic counter owned by a mutable component
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Generation,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Generation {
        self.current
    }

    pub fn bump(&mut self) -> Generation {
        self.current = self.current.next();
        self.current
    }
}

/// A single cached value keyed by generation plus an input key
#[derive(Debug, Clone)]
pub struct GenerationCache<K, T> {
    entry: Option<(Generation, K, T)>,
    recomputes: u64,
}

impl<K, T> Default for GenerationCache<K, T> {
    fn default() -> Self {
        Self {
            entry: None,
            recomputes: 0,
        }
    }
}

impl<K: PartialEq, T> GenerationCache<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_current(&self, generation: Generation, key: &K) -> bool {
        matches!(&self.entry, Some((g, k, _)) if *g == generation && k == key)
    }

    /// Cached value if it was computed under `generation` and `key`
    pub fn get(&self, generation: Generation, key: &K) -> Option<&T> {
        match &self.entry {
            Some((g, k, value)) if *g == generation && k == key => Some(value),
            _ => None,
        }
    }

    pub fn get_or_compute<F>(&mut self, generation: Generation, key: K, compute: F) -> &T
    where
        F: FnOnce(&K) -> T,
    {
        if !self.is_current(generation, &key) {
            self.entry = None;
        }
        let recomputes = &mut self.recomputes;
        let (_, _, value) = self.entry.get_or_insert_with(|| {
            *recomputes += 1;
            let value = compute(&key);
            (generation, key, value)
        });
        value
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Number of times the value has been (re)computed
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }
}
