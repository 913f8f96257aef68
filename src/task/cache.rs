//! Short-lived cache of the agents present under the comm root.
//!
//! The cache is an explicit value owned by whoever builds the store; there
//! is no process-wide instance. Tests can shrink the TTL to zero or call
//! [`AgentCache::clear`] between cases.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::Result;

/// Default time-to-live for a cached agent list.
pub const DEFAULT_AGENT_CACHE_TTL_SECS: u64 = 60;

#[derive(Debug)]
struct Entry {
    loaded_at: Instant,
    agents: Vec<String>,
}

/// TTL cache over a single agent listing.
#[derive(Debug)]
pub struct AgentCache {
    ttl: Duration,
    entry: Mutex<Option<Entry>>,
}

impl Default for AgentCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_AGENT_CACHE_TTL_SECS))
    }
}

impl AgentCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached agents if still fresh, otherwise the result of `load`.
    ///
    /// Loader errors are returned as-is and leave the cache empty.
    pub fn get_or_load<F>(&self, load: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Result<Vec<String>>,
    {
        let mut entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = entry.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.agents.clone());
            }
        }

        *entry = None;
        let agents = load()?;
        debug!(count = agents.len(), "Agent cache refreshed");
        *entry = Some(Entry {
            loaded_at: Instant::now(),
            agents: agents.clone(),
        });
        Ok(agents)
    }

    /// Whether `agent` is known, consulting the cache first.
    pub fn contains<F>(&self, agent: &str, load: F) -> Result<bool>
    where
        F: FnOnce() -> Result<Vec<String>>,
    {
        Ok(self.get_or_load(load)?.iter().any(|a| a == agent))
    }

    /// Whether a fresh entry is held.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        let entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        entry
            .as_ref()
            .is_some_and(|cached| cached.loaded_at.elapsed() < self.ttl)
    }

    /// Drop any cached listing.
    pub fn clear(&self) {
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_cache_serves_fresh_entries() {
        let cache = AgentCache::new(Duration::from_secs(60));
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok(vec!["backend".to_string()])
        };

        assert_eq!(cache.get_or_load(load).unwrap(), vec!["backend"]);
        assert_eq!(cache.get_or_load(load).unwrap(), vec!["backend"]);
        assert_eq!(loads.get(), 1);
        assert!(cache.is_fresh());
    }

    #[test]
    fn test_zero_ttl_always_reloads() {
        let cache = AgentCache::new(Duration::ZERO);
        let loads = Cell::new(0);
        for _ in 0..3 {
            cache
                .get_or_load(|| {
                    loads.set(loads.get() + 1);
                    Ok(Vec::new())
                })
                .unwrap();
        }
        assert_eq!(loads.get(), 3);
        assert!(!cache.is_fresh());
    }

    #[test]
    fn test_clear_forces_reload() {
        let cache = AgentCache::default();
        cache.get_or_load(|| Ok(vec!["a".to_string()])).unwrap();
        cache.clear();
        assert!(!cache.is_fresh());
        let agents = cache.get_or_load(|| Ok(vec!["b".to_string()])).unwrap();
        assert_eq!(agents, vec!["b"]);
    }

    #[test]
    fn test_loader_error_is_not_cached() {
        let cache = AgentCache::default();
        let err = cache.get_or_load(|| Err(crate::error::TaskboardError::config("boom")));
        assert!(err.is_err());
        assert!(!cache.is_fresh());
        assert!(cache.contains("x", || Ok(vec!["x".to_string()])).unwrap());
    }
}
