// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Bounded in-memory front cache shielding the persistent store from
//! repeated decode cost within one session.
//!
//! Recency-based eviction at a fixed maximum entry count, hit/miss/eviction
//! counters for observability, and a coalescing `get_or_load` that runs the
//! loader at most once per vault id under concurrent misses. The cache is
//! scoped per process run and never persisted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::notification::RemovalCause;
use moka::sync::Cache;
use parking_lot::Mutex;

use histovault_core::{Result, Vault};

/// Default maximum number of decoded vaults kept in memory.
pub const DEFAULT_MAX_ENTRIES: u64 = 4096;

/// Cumulative front cache statistics; all counters begin at zero and never
/// decrease over the lifetime of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: u64,
}

impl FrontCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }
}

/// Bounded mapping from vault id to decoded vault.
pub struct FrontCache {
    cache: Cache<String, Arc<Vault>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl FrontCache {
    pub fn new(max_entries: u64) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let listener_evictions = Arc::clone(&evictions);
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Size {
                    listener_evictions.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();
        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions,
        }
    }

    /// Cached vault for `vault_id`, counting the hit or miss.
    pub fn get(&self, vault_id: &str) -> Option<Arc<Vault>> {
        let value = self.cache.get(vault_id);
        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    pub fn insert(&self, vault: Vault) {
        self.cache
            .insert(vault.vault_name.clone(), Arc::new(vault));
    }

    /// Cached vault, or the loader's result.
    ///
    /// Concurrent misses for the same id coalesce: the loader executes at
    /// most once per id per miss. A loader returning `Ok(None)` is not
    /// cached, a loader error is returned without caching anything.
    pub fn get_or_load<F>(&self, vault_id: &str, loader: F) -> Result<Option<Arc<Vault>>>
    where
        F: FnOnce() -> Result<Option<Vault>>,
    {
        let error_slot = Mutex::new(None);
        let loader_ran = Mutex::new(false);

        let value = self.cache.optionally_get_with_by_ref(vault_id, || {
            *loader_ran.lock() = true;
            match loader() {
                Ok(Some(vault)) => Some(Arc::new(vault)),
                Ok(None) => None,
                Err(e) => {
                    *error_slot.lock() = Some(e);
                    None
                }
            }
        });

        if let Some(error) = error_slot.into_inner() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Err(error);
        }
        // Served without running our loader means another caller populated
        // the entry, or it was already resident: a hit either way.
        let ran = *loader_ran.lock();
        match (&value, ran) {
            (Some(_), false) => self.hits.fetch_add(1, Ordering::Relaxed),
            _ => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        Ok(value)
    }

    pub fn stats(&self) -> FrontCacheStats {
        self.cache.run_pending_tasks();
        FrontCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.cache.entry_count(),
        }
    }
}

impl std::fmt::Debug for FrontCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontCache")
            .field("stats", &self.stats())
            .finish()
    }
}
