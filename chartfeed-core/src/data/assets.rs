//! Tradable-symbol reference cache.
//!
//! The symbol list is static for the life of a session, so it is fetched once
//! and shared. Concurrent callers of `get` wait on the same fetch; a failed
//! fetch is not cached and the next `get` tries again.

use super::provider::{AssetSource, DataError};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub struct SymbolCache {
    source: Arc<dyn AssetSource>,
    entry: Mutex<Option<Arc<Vec<String>>>>,
}

impl SymbolCache {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source,
            entry: Mutex::new(None),
        }
    }

    /// The cached list, fetching it on first use.
    pub fn get(&self) -> Result<Arc<Vec<String>>, DataError> {
        // Held across the fetch so concurrent callers share one request.
        let mut entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(symbols) = entry.as_ref() {
            debug!(count = symbols.len(), "symbol list served from cache");
            return Ok(Arc::clone(symbols));
        }

        let symbols = Arc::new(self.source.fetch_symbols()?);
        info!(count = symbols.len(), "symbol list fetched");
        *entry = Some(Arc::clone(&symbols));
        Ok(symbols)
    }

    /// Drop the cached list; the next `get` refetches.
    pub fn invalidate(&self) {
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_cached(&self) -> bool {
        self.entry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}
