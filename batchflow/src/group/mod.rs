//! Lazily constructed objects keyed by name.
//!
//! A [`Group`] builds each object on first access with a shared constructor
//! and hands out the same instance afterwards.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

type Constructor<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// A keyed cache of lazily built objects.
pub struct Group<T> {
    new_fn: RwLock<Constructor<T>>,
    objects: DashMap<String, Arc<T>>,
}

impl<T> Group<T> {
    /// Creates a group building objects with `new_fn`.
    #[must_use]
    pub fn new<F>(new_fn: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            new_fn: RwLock::new(Arc::new(new_fn)),
            objects: DashMap::new(),
        }
    }

    /// Returns the object for `key`, building it on first access.
    ///
    /// The constructor runs outside the map lock and may call back into the
    /// group. When two callers build the same key at once, the first insert
    /// wins and the other object is discarded.
    pub fn get(&self, key: &str) -> Arc<T> {
        if let Some(object) = self.objects.get(key) {
            return object.value().clone();
        }
        // Held across build and insert so `reset` cannot interleave.
        let new_fn = self.new_fn.read_recursive();
        let built = Arc::new(new_fn());
        self.objects
            .entry(key.to_string())
            .or_insert(built)
            .value()
            .clone()
    }

    /// Replaces the constructor and drops every cached object.
    pub fn reset<F>(&self, new_fn: F)
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let mut current = self.new_fn.write();
        *current = Arc::new(new_fn);
        self.objects.clear();
    }

    /// Drops every cached object, keeping the constructor.
    pub fn clear(&self) {
        let _guard = self.new_fn.write();
        self.objects.clear();
    }

    /// Returns the number of cached objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if no object has been built.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<T> fmt::Debug for Group<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("objects", &self.objects.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::OnceLock;

    #[derive(Debug, Default)]
    struct Counter {
        value: AtomicUsize,
    }

    impl Counter {
        fn incr(&self) -> usize {
            self.value.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    #[test]
    fn test_get_builds_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let group = Group::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Counter::default()
        });

        group.get("pass").incr();
        assert_eq!(group.get("pass").incr(), 2);
        assert_eq!(built.load(Ordering::SeqCst), 1);

        group.get("other");
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_reset_swaps_constructor() {
        let group = Group::new(|| 1_u32);
        assert_eq!(*group.get("a"), 1);

        group.reset(|| 2_u32);
        assert!(group.is_empty());
        assert_eq!(*group.get("a"), 2);
    }

    #[test]
    fn test_clear_keeps_constructor() {
        let group = Group::new(Counter::default);
        group.get("a").incr();
        group.clear();

        assert!(group.is_empty());
        assert_eq!(group.get("a").incr(), 1);
    }

    #[test]
    fn test_constructor_may_reenter_group() {
        let slot: Arc<OnceLock<Arc<Group<usize>>>> = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let inner_slot = slot.clone();
        let inner_calls = calls.clone();
        let group = Arc::new(Group::new(move || {
            let n = inner_calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                if let Some(group) = inner_slot.get() {
                    group.get("k");
                    group.get("other");
                }
            }
            n
        }));
        assert!(slot.set(group.clone()).is_ok());

        // The nested build of "k" is inserted first and wins.
        assert_eq!(*group.get("k"), 1);
        assert_eq!(*group.get("other"), 2);
        assert_eq!(*group.get("k"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_concurrent_get_shares_instance() {
        let group = Arc::new(Group::new(Counter::default));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let group = group.clone();
                std::thread::spawn(move || {
                    group.get("shared").incr();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(group.get("shared").value.load(Ordering::SeqCst), 8);
    }
}
