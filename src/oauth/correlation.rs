//! State correlation cache
//!
//! Maps a state parameter to the query parameters the user arrived with
//! before being sent to the provider. Entries expire a fixed time after they
//! are stored, whether or not anyone reads them, and are removed when the
//! matching callback consumes them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use super::query::QueryParams;
use crate::clock::{Clock, system_clock};

/// Default lifetime of an unconsumed snapshot (5 minutes)
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(300);

/// A stored snapshot with its insertion time
struct Snapshot {
    params: QueryParams,
    stored_at: Instant,
}

/// Process-wide cache of login-time query parameters keyed by state
pub struct CorrelationCache {
    entries: DashMap<String, Snapshot>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CorrelationCache {
    /// Create a cache with the given entry lifetime and clock
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    fn is_expired(&self, snapshot: &Snapshot) -> bool {
        self.clock.now().duration_since(snapshot.stored_at) >= self.ttl
    }

    /// Store the snapshot for `state`
    pub fn put(&self, state: &str, params: QueryParams) {
        debug!(state = %state, keys = params.len(), "Caching pre-login query parameters");
        self.entries.insert(
            state.to_string(),
            Snapshot {
                params,
                stored_at: self.clock.now(),
            },
        );
    }

    /// Read the snapshot for `state` without consuming it.
    ///
    /// Expired entries are evicted and reported as absent.
    #[must_use]
    pub fn get(&self, state: &str) -> Option<QueryParams> {
        let entry = self.entries.get(state)?;
        if self.is_expired(&entry) {
            drop(entry);
            self.entries.remove(state);
            debug!(state = %state, "Query snapshot expired");
            return None;
        }
        Some(entry.params.clone())
    }

    /// Consume the snapshot for `state`; a second call returns `None`
    #[must_use]
    pub fn take(&self, state: &str) -> Option<QueryParams> {
        let (_, snapshot) = self.entries.remove(state)?;
        if self.is_expired(&snapshot) {
            debug!(state = %state, "Query snapshot expired before callback");
            None
        } else {
            Some(snapshot.params)
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        let now = self.clock.now();
        self.entries
            .retain(|_, snapshot| now.duration_since(snapshot.stored_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored (possibly expired) entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CorrelationCache {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL, system_clock())
    }
}
