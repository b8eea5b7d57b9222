//! Content-keyed caches of shared driver objects.
//!
//! Entries are handed out as [`Rc`] handles. The cache keeps one reference
//! itself, so an entry's driver object dies when the last *caller* handle is
//! released, and releasing consumes the handle so it cannot happen twice.

use std::hash::Hash;
use std::rc::Rc;

use gl::types::GLuint;
use gpu_core::Result;
use rustc_hash::FxHashMap;

/// A driver object shared by every holder of an equal key.
#[derive(Debug)]
pub struct CachedObject<K> {
    key: K,
    name: GLuint,
}

impl<K> CachedObject<K> {
    /// Driver name of the object.
    pub fn name(&self) -> GLuint {
        self.name
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

pub type SharedObject<K> = Rc<CachedObject<K>>;

#[derive(Debug)]
pub struct ObjectCache<K> {
    entries: FxHashMap<K, SharedObject<K>>,
    hits: u64,
    misses: u64,
}

impl<K> Default for ObjectCache<K> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<K: Hash + Eq + Clone> ObjectCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new handle to the entry for `key`, running `create` to make
    /// the driver object on a miss. A failed `create` inserts nothing.
    pub fn acquire(
        &mut self,
        key: &K,
        create: impl FnOnce() -> Result<GLuint>,
    ) -> Result<SharedObject<K>> {
        if let Some(entry) = self.entries.get(key) {
            self.hits += 1;
            return Ok(Rc::clone(entry));
        }

        self.misses += 1;
        let name = create()?;
        let entry = Rc::new(CachedObject {
            key: key.clone(),
            name,
        });
        self.entries.insert(key.clone(), Rc::clone(&entry));
        Ok(entry)
    }

    /// Give back a handle. Returns the driver name when this was the last
    /// outstanding handle; the caller must then delete the driver object.
    pub fn release(&mut self, handle: SharedObject<K>) -> Option<GLuint> {
        let entry = self.entries.get(handle.key())?;
        debug_assert!(
            Rc::ptr_eq(entry, &handle),
            "handle released into a cache that does not own it"
        );

        // Our reference plus the one being released.
        if Rc::strong_count(entry) > 2 {
            return None;
        }
        let entry = self.entries.remove(handle.key())?;
        Some(entry.name)
    }

    /// Number of outstanding caller handles for `key`.
    pub fn ref_count(&self, key: &K) -> usize {
        self.entries
            .get(key)
            .map_or(0, |entry| Rc::strong_count(entry) - 1)
    }

    pub fn get(&self, key: &K) -> Option<GLuint> {
        self.entries.get(key).map(|entry| entry.name)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Empty the cache, returning every driver name with the number of
    /// caller handles still alive for it.
    pub fn drain(&mut self) -> Vec<(GLuint, usize)> {
        self.entries
            .drain()
            .map(|(_, entry)| (entry.name, Rc::strong_count(&entry) - 1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_core::DeviceError;

    #[test]
    fn acquire_shares_one_object_per_key() {
        let mut cache = ObjectCache::<u32>::new();
        let mut created = 0;

        let a = cache
            .acquire(&7, || {
                created += 1;
                Ok(100)
            })
            .unwrap();
        let b = cache.acquire(&7, || unreachable!()).unwrap();

        assert_eq!(created, 1);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.ref_count(&7), 2);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn last_release_returns_the_name_once() {
        let mut cache = ObjectCache::<u32>::new();
        let a = cache.acquire(&1, || Ok(42)).unwrap();
        let b = cache.acquire(&1, || Ok(43)).unwrap();

        assert_eq!(cache.release(a), None);
        assert_eq!(cache.ref_count(&1), 1);
        assert_eq!(cache.release(b), Some(42));
        assert!(cache.is_empty());
        assert_eq!(cache.ref_count(&1), 0);
    }

    #[test]
    fn failed_create_leaves_no_entry() {
        let mut cache = ObjectCache::<u32>::new();
        let err = cache
            .acquire(&3, || Err(DeviceError::ProgramLink("boom".into())))
            .unwrap_err();
        assert!(matches!(err, DeviceError::ProgramLink(_)));
        assert!(!cache.contains(&3));

        // A retry is attempted independently.
        let handle = cache.acquire(&3, || Ok(9)).unwrap();
        assert_eq!(handle.name(), 9);
    }

    #[test]
    fn drain_reports_leaked_handles() {
        let mut cache = ObjectCache::<u32>::new();
        let _kept = cache.acquire(&5, || Ok(50)).unwrap();
        let released = cache.acquire(&6, || Ok(60)).unwrap();
        drop(released);

        let mut drained = cache.drain();
        drained.sort();
        assert_eq!(drained, vec![(50, 1), (60, 0)]);
        assert!(cache.is_empty());
    }
}
