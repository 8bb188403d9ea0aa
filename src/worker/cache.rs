// Local parameter cache
//
// Worker-side staging area: pulled parameters and accumulated gradients for
// every key the worker knows. One reader/writer lock guards the shape of
// both maps; gradient scalars additionally sit behind a per-entry mutex so
// training threads can accumulate under the shared (read) lock.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

/// Per-key gradient accumulator. Contributions are summed within a
/// minibatch and averaged at the moment of serialization.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalGrad {
    pub sum: f32,
    pub count: u32,
}

impl LocalGrad {
    pub fn accumulate(&mut self, grad: f32) {
        self.sum += grad;
        self.count += 1;
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }

    /// `sum / count`, or `None` when nothing was accumulated. A zero-count
    /// gradient must never be sent.
    pub fn average(&self) -> Option<f32> {
        (self.count > 0).then(|| self.sum / self.count as f32)
    }
}

#[derive(Default)]
struct CacheInner {
    params: HashMap<u64, f32>,
    grads: HashMap<u64, Mutex<LocalGrad>>,
}

#[derive(Default)]
pub struct LocalParamCache {
    inner: RwLock<CacheInner>,
}

/// Shared snapshot of the cache for the training hot path: the map shape is
/// stable while this view exists, so parameter reads and gradient
/// accumulation cost one read-lock acquisition per view.
pub struct CacheView<'a> {
    inner: &'a CacheInner,
}

impl LocalParamCache {
    pub fn new() -> LocalParamCache {
        LocalParamCache::default()
    }

    /// Preallocate zero entries for a key set, so hot-path reads never miss.
    pub fn init_keys(&self, keys: impl IntoIterator<Item = u64>) {
        let mut inner = self.inner.write();
        for key in keys {
            inner.params.entry(key).or_insert(0.0);
            inner
                .grads
                .entry(key)
                .or_insert_with(|| Mutex::new(LocalGrad::default()));
        }
    }

    /// Install pulled values, zeroing each paired gradient, under a single
    /// write-lock acquisition per pull response.
    pub fn install(&self, pairs: impl IntoIterator<Item = (u64, f32)>) {
        let mut inner = self.inner.write();
        for (key, value) in pairs {
            inner.params.insert(key, value);
            inner
                .grads
                .entry(key)
                .or_insert_with(|| Mutex::new(LocalGrad::default()))
                .lock()
                .reset();
        }
    }

    /// Run `f` against a shared snapshot of the cache.
    pub fn with_view<R>(&self, f: impl FnOnce(&CacheView) -> R) -> R {
        let inner = self.inner.read();
        f(&CacheView { inner: &*inner })
    }

    /// Point read, for assertions and cold paths.
    pub fn param(&self, key: u64) -> f32 {
        self.inner.read().params.get(&key).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.inner.read().params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().params.is_empty()
    }
}

impl CacheView<'_> {
    pub fn param(&self, key: u64) -> f32 {
        self.inner.params.get(&key).copied().unwrap_or(0.0)
    }

    /// Add one gradient contribution. The key must have been initialized.
    pub fn accumulate(&self, key: u64, grad: f32) {
        match self.inner.grads.get(&key) {
            Some(cell) => cell.lock().accumulate(grad),
            None => panic!("gradient for uninitialized key {}", key),
        }
    }

    /// Drain one key's accumulator for a push: returns the averaged
    /// gradient and resets the entry, or `None` when nothing accumulated.
    pub fn drain(&self, key: u64) -> Option<f32> {
        let cell = self.inner.grads.get(&key)?;
        let mut grad = cell.lock();
        let average = grad.average();
        grad.reset();
        average
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_keys_zeroes_both_maps() {
        let cache = LocalParamCache::new();
        cache.init_keys([1, 2, 3]);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.param(2), 0.0);
        cache.with_view(|view| assert_eq!(view.drain(2), None));
    }

    #[test]
    fn test_install_resets_grads() {
        let cache = LocalParamCache::new();
        cache.init_keys([7]);
        cache.with_view(|view| view.accumulate(7, 5.0));

        cache.install([(7, 1.25)]);
        assert_eq!(cache.param(7), 1.25);
        cache.with_view(|view| assert_eq!(view.drain(7), None));
    }

    #[test]
    fn test_averaging() {
        let cache = LocalParamCache::new();
        cache.init_keys([1]);
        cache.with_view(|view| {
            view.accumulate(1, 2.0);
            view.accumulate(1, 4.0);
            view.accumulate(1, 6.0);
        });

        cache.with_view(|view| {
            assert_eq!(view.drain(1), Some(4.0));
            // Drained entries reset immediately.
            assert_eq!(view.drain(1), None);
        });
    }

    #[test]
    fn test_zero_sum_nonzero_count_still_drains() {
        let cache = LocalParamCache::new();
        cache.init_keys([1]);
        cache.with_view(|view| {
            view.accumulate(1, 1.0);
            view.accumulate(1, -1.0);
        });
        // Count is 2, so an (averaged) zero gradient is a real contribution.
        cache.with_view(|view| assert_eq!(view.drain(1), Some(0.0)));
    }

    #[test]
    fn test_concurrent_accumulation() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(LocalParamCache::new());
        cache.init_keys([42]);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..100 {
                        cache.with_view(|view| view.accumulate(42, 1.0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        cache.with_view(|view| assert_eq!(view.drain(42), Some(1.0)));
    }
}
