//! In-memory cache of available chart updates
//!
//! Entries are replaced wholesale by discovery, shrunk by pruning and removed
//! on deletion. A single mutex guards the whole map. Catalogs are small and
//! discovery is infrequent; if profiling ever shows contention this is the
//! place to move to a sharded map.
//!
//! Discovery runs outside the lock, so two concurrent discoveries for the
//! same chart race to publish. Each discovery takes a generation from
//! [`UpdateCache::begin_update`] before touching the network, and
//! [`UpdateCache::publish`] refuses results older than the stored one.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use semver::Version;
use tracing::debug;

use crate::chart::catalog::ChartUpdates;
use crate::chart::reference::normalize_identity;
use crate::chart::semver::parse_tolerant;

/// Monotonic sequence number ordering discovery runs by start time
pub type Generation = u64;

#[derive(Debug, Clone)]
struct CachedUpdates {
    generation: Generation,
    updates: ChartUpdates,
    checked_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CachedUpdates>,
    /// Last generation handed out, shared by all charts
    issued: Generation,
    /// Generations at or below this value started before the chart was deleted.
    /// Cleared once a newer run publishes, whose generation then rejects stale runs.
    retired: HashMap<String, Generation>,
}

/// Per-chart cache of available updates, shared by discovery and its callers
#[derive(Debug, Default)]
pub struct UpdateCache {
    state: Mutex<CacheState>,
}

impl UpdateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the state lock, recovering from a poisoned lock.
    ///
    /// Every critical section leaves the map consistent, so a panic in
    /// another holder never leaves partial state behind.
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the cached updates for a chart.
    ///
    /// Returns an empty catalog for a chart that was never discovered.
    pub fn get(&self, identity: &str) -> ChartUpdates {
        let state = self.lock_state();
        state
            .entries
            .get(normalize_identity(identity))
            .map(|entry| entry.updates.clone())
            .unwrap_or_default()
    }

    /// Whether discovery has published a catalog for this chart
    pub fn contains(&self, identity: &str) -> bool {
        self.lock_state()
            .entries
            .contains_key(normalize_identity(identity))
    }

    /// When the cached catalog for a chart was published
    pub fn last_checked(&self, identity: &str) -> Option<DateTime<Utc>> {
        self.lock_state()
            .entries
            .get(normalize_identity(identity))
            .map(|entry| entry.checked_at)
    }

    /// Reserve the generation for a discovery run that is about to start
    pub fn begin_update(&self, identity: &str) -> Generation {
        let mut state = self.lock_state();
        state.issued += 1;
        debug!(
            "Starting update of {} at generation {}",
            normalize_identity(identity),
            state.issued
        );
        state.issued
    }

    /// Replace the catalog for a chart with the result of a discovery run.
    ///
    /// The catalog is stored only if no run that started later has already
    /// published, and the chart was not deleted after this run started.
    /// Returns whether the catalog was stored.
    pub fn publish(&self, identity: &str, generation: Generation, updates: ChartUpdates) -> bool {
        let key = normalize_identity(identity);
        let mut state = self.lock_state();

        if state.retired.get(key).is_some_and(|&floor| generation <= floor) {
            debug!(
                "Dropping updates for {} from generation {}: chart was deleted",
                key, generation
            );
            return false;
        }

        if let Some(current) = state.entries.get(key)
            && current.generation > generation
        {
            debug!(
                "Dropping updates for {} from generation {}: generation {} already published",
                key, generation, current.generation
            );
            return false;
        }

        debug!(
            "Caching {} updates for {} (generation {})",
            updates.len(),
            key,
            generation
        );
        state.retired.remove(key);
        state.entries.insert(
            key.to_string(),
            CachedUpdates {
                generation,
                updates,
                checked_at: Utc::now(),
            },
        );
        true
    }

    /// Unconditionally replace the catalog for a chart
    pub fn set(&self, identity: &str, updates: ChartUpdates) {
        let generation = self.begin_update(identity);
        self.publish(identity, generation, updates);
    }

    /// Remove `tag` and every update at or below its version.
    ///
    /// If `tag` is not a version, only the update with exactly that tag is
    /// removed. Charts without cached updates are left alone.
    pub fn prune(&self, identity: &str, tag: &str) {
        let key = normalize_identity(identity);
        let consumed: Option<Version> = parse_tolerant(tag);

        let mut state = self.lock_state();
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };

        let before = entry.updates.len();
        match &consumed {
            Some(version) => entry.updates.retain_newer_than(version),
            // Cached tags always parse, so this only matches odd registries
            None => entry.updates.remove_tag(tag),
        }
        debug!(
            "Pruned {} updates for {} at {}",
            before - entry.updates.len(),
            key,
            tag
        );
    }

    /// Forget the cached updates for a chart, e.g. after it is uninstalled.
    ///
    /// Discovery runs that started before the deletion will not repopulate it.
    pub fn delete(&self, identity: &str) {
        let key = normalize_identity(identity);
        let mut state = self.lock_state();

        state.entries.remove(key);
        // No floor needed until some run has started
        if state.issued > 0 {
            let floor = state.issued;
            state.retired.insert(key.to_string(), floor);
        }
        debug!("Deleted cached updates for {}", key);
    }
}
