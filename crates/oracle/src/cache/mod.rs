//! Per-provider venue metadata cache.
//!
//! Venue glue parses the opaque ticker metadata (pool ids, contract
//! addresses, decimals) the first time a ticker is seen and reads the
//! parsed value from here afterwards. Entries are never evicted: ticker sets
//! are static configuration.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};

use crate::models::ProviderTicker;

/// Read-mostly map from ticker to parsed venue metadata.
///
/// Lookups take the shared lock; a miss is filled under the exclusive lock.
/// A cached entry is never overwritten, so concurrent fills of the same
/// ticker all observe the first stored value.
pub struct MetadataCache<M> {
    entries: RwLock<HashMap<ProviderTicker, Arc<M>>>,
}

impl<M> MetadataCache<M> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Acquire the shared lock, recovering from poison if necessary.
    ///
    /// Entries are immutable once inserted, so a writer that panicked
    /// cannot have left a half-written value behind.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ProviderTicker, Arc<M>>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("Metadata cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ProviderTicker, Arc<M>>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("Metadata cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn get(&self, ticker: &ProviderTicker) -> Option<Arc<M>> {
        self.read().get(ticker).cloned()
    }

    /// Return the cached metadata for `ticker`, parsing it with `parse` on a
    /// miss.
    ///
    /// A failed parse caches nothing and is returned to the caller; the next
    /// call for the same ticker parses again.
    pub fn get_or_try_insert_with<E, F>(
        &self,
        ticker: &ProviderTicker,
        parse: F,
    ) -> Result<Arc<M>, E>
    where
        F: FnOnce() -> Result<M, E>,
    {
        if let Some(metadata) = self.get(ticker) {
            return Ok(metadata);
        }

        // Parse outside the lock; another task may win the race to insert.
        let parsed = Arc::new(parse()?);

        let mut entries = self.write();
        let stored = entries
            .entry(ticker.clone())
            .or_insert_with(|| {
                debug!("Cached metadata for ticker '{}'", ticker);
                parsed
            })
            .clone();
        Ok(stored)
    }

    pub fn contains(&self, ticker: &ProviderTicker) -> bool {
        self.read().contains_key(ticker)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl<M> Default for MetadataCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_miss_then_hit() {
        let cache: MetadataCache<u32> = MetadataCache::new();
        let ticker = ProviderTicker::new("WETH/USDC", r#"{"decimals": 18}"#);
        let parses = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with(&ticker, || {
                    parses.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(18)
                })
                .unwrap();
            assert_eq!(*value, 18);
        }

        assert_eq!(parses.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_parse_not_cached() {
        let cache: MetadataCache<u32> = MetadataCache::new();
        let ticker = ProviderTicker::new("BAD", "{not json");

        let result = cache.get_or_try_insert_with(&ticker, || Err("invalid metadata"));
        assert_eq!(result.unwrap_err(), "invalid metadata");
        assert!(!cache.contains(&ticker));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_existing_entry_never_overwritten() {
        let cache: MetadataCache<&'static str> = MetadataCache::new();
        let ticker = ProviderTicker::symbol("SOL/USDC");

        cache
            .get_or_try_insert_with(&ticker, || Ok::<_, ()>("first"))
            .unwrap();
        let second = cache
            .get_or_try_insert_with(&ticker, || Ok::<_, ()>("second"))
            .unwrap();
        assert_eq!(*second, "first");
    }

    #[test]
    fn test_concurrent_fills_agree() {
        let cache: Arc<MetadataCache<usize>> = Arc::new(MetadataCache::new());
        let ticker = ProviderTicker::symbol("BTC/USD");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let ticker = ticker.clone();
                std::thread::spawn(move || {
                    *cache
                        .get_or_try_insert_with(&ticker, || Ok::<_, ()>(i))
                        .unwrap()
                })
            })
            .collect();

        let values: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(values.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.len(), 1);
    }
}
