//! Bounded cache keeping the most recently used entries.

/// Least-recently-used cache with a fixed capacity.
///
/// Entries are ordered by use, most recent last. A hit moves the entry to
/// the back; inserting past capacity drops the front. Among entries that
/// were never touched again, the one inserted first is dropped first.
pub struct LruCache<K, V> {
    capacity: usize,
    entries: Vec<(K, V)>,
}

impl<K: Copy + Eq, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache needs room for at least one entry");
        LruCache {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `key`, marking the entry as most recently used.
    pub fn get(&mut self, key: K) -> Option<&V> {
        let idx = self.entries.iter().position(|(k, _)| *k == key)?;
        let entry = self.entries.remove(idx);
        self.entries.push(entry);
        self.entries.last().map(|(_, v)| v)
    }

    /// Inserts `key`, evicting the least recently used entry when full.
    ///
    /// An existing entry under the same key is replaced.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(idx) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(idx);
        } else if self.entries.len() == self.capacity {
            self.entries.remove(0);
        }
        self.entries.push((key, value));
    }

    /// Returns the cached value, calling `make` on a miss.
    ///
    /// The value is only stored when `make` succeeds, so a failed load
    /// leaves the cache untouched. Hits count as use, like [`get`](Self::get).
    pub fn get_or_insert_with<E, F>(&mut self, key: K, make: F) -> Result<&V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(idx) => {
                let entry = self.entries.remove(idx);
                self.entries.push(entry);
            }
            None => {
                let value = make()?;
                if self.entries.len() == self.capacity {
                    self.entries.remove(0);
                }
                self.entries.push((key, value));
            }
        }
        Ok(&self.entries[self.entries.len() - 1].1)
    }
}
