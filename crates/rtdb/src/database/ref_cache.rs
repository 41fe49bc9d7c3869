//! RefCache: hands out one shared instance per logical path.
//!
//! Listener bookkeeping is keyed by path, so callers holding separate
//! `reference()` results for the same location must end up with the same
//! object; the cache guarantees `Arc` identity for equal keys.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

pub struct RefCache<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> RefCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached instance for `key`, creating it with `make` on a miss.
    ///
    /// `make` runs under the cache lock and must not re-enter the cache.
    pub fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> T) -> Arc<T> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            return Arc::clone(existing);
        }
        let created = Arc::new(make());
        entries.insert(key.to_string(), Arc::clone(&created));
        created
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.entries.lock().get(key).cloned()
    }

    /// Forget `key`. Holders of the released instance keep it alive.
    pub fn release(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<T> Default for RefCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
