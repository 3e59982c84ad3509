//! Thread-safe, insertion-ordered, string-keyed hash map.
//!
//! [`ConcurrentMap`] is the storage backbone of the crate: a metric keeps its
//! samples in one, a collector keeps its metrics in one and a registry keeps
//! its collectors in one. It is a plain chained hash table guarded by a single
//! readers-writer lock, with two properties the exposition format relies on:
//!
//! 1. **Insertion order**: besides the bucket chains the map keeps the list of
//!    keys in the order they were first inserted. [`keys`](ConcurrentMap::keys)
//!    and [`values`](ConcurrentMap::values) walk that list, so rendering is
//!    deterministic.
//! 2. **Atomic lookup-or-create**: [`get_or_insert_with`](ConcurrentMap::get_or_insert_with)
//!    runs the lookup and the insertion in one exclusive critical section, so
//!    two threads touching the same label set for the first time end up
//!    sharing one sample.
//!
//! # Layout
//!
//! ```text
//!   chains (capacity = 32, doubles when len > capacity / 2)
//!   ┌────┬────┬────┬────┬─────┬────┐
//!   │ 0  │ 1  │ 2  │ 3  │ ... │ 31 │
//!   └─┬──┴────┴─┬──┴────┴─────┴────┘
//!     ▼         ▼
//!   [k7,v]    [k1,v] → [k4,v]
//!
//!   order: [k1, k4, k7, ...]   (first-insertion order)
//! ```
//!
//! # Releasing values
//!
//! Values leave the map on overwrite, [`delete`](ConcurrentMap::delete) and
//! [`clear`](ConcurrentMap::clear). Each evicted value is handed, by value, to
//! the map's release hook (see [`set_release_fn`](ConcurrentMap::set_release_fn)).
//! The default hook simply drops it. Hooks always run after the lock has been
//! released, so a hook may touch the map again.
//!
//! # Example
//!
//! ```rust
//! use metrica::map::ConcurrentMap;
//!
//! let map = ConcurrentMap::new();
//! map.set("b", 2);
//! map.set("a", 1);
//! map.set("b", 3);
//!
//! assert_eq!(map.get("b"), Some(3));
//! assert_eq!(map.keys(), vec!["b".to_string(), "a".to_string()]);
//! ```

use std::fmt::{self, Debug};
use std::mem;

use parking_lot::RwLock;

use crate::error::{MetricError, Result};

/// Number of chains a new map starts with.
pub const INITIAL_CAPACITY: usize = 32;

/// Hook invoked with every value evicted from a map.
pub type ReleaseFn<V> = Box<dyn Fn(V) + Send + Sync>;

struct Node<V> {
    key: String,
    value: V,
}

/// The unguarded table. All invariants are maintained here; the lock lives in
/// [`ConcurrentMap`].
struct Table<V> {
    chains: Vec<Vec<Node<V>>>,
    order: Vec<String>,
}

/// Maps `key` to a chain index with Horner's method, using a coefficient that
/// changes on every byte to spread similar keys across chains.
fn chain_index(key: &str, capacity: usize) -> usize {
    const B: usize = 27183;
    let mut a: usize = 31415;
    let mut index: usize = 0;
    for byte in key.bytes() {
        index = a.wrapping_mul(index).wrapping_add(byte as usize) % capacity;
        a = a.wrapping_mul(B) % (capacity - 1);
    }
    index
}

fn empty_chains<V>(capacity: usize) -> Vec<Vec<Node<V>>> {
    let mut chains = Vec::with_capacity(capacity);
    chains.resize_with(capacity, Vec::new);
    chains
}

impl<V> Table<V> {
    fn with_capacity(capacity: usize) -> Self {
        Table {
            chains: empty_chains(capacity),
            order: Vec::new(),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.chains.len()
    }

    #[inline]
    fn len(&self) -> usize {
        self.order.len()
    }

    fn find(&self, key: &str) -> Option<&V> {
        let chain = &self.chains[chain_index(key, self.capacity())];
        chain.iter().find(|node| node.key == key).map(|node| &node.value)
    }

    /// Doubles the capacity when the load factor exceeds one half.
    ///
    /// The replacement chains are fully allocated before any node moves, and
    /// moving nodes cannot fail, so the table is never observed half-rehashed.
    /// The order list is untouched: keys do not change, only their chains do.
    fn ensure_space(&mut self) {
        if self.len() <= self.capacity() / 2 {
            return;
        }
        let old_capacity = self.capacity();
        let new_capacity = old_capacity * 2;
        let mut chains = empty_chains(new_capacity);
        for chain in mem::take(&mut self.chains) {
            for node in chain {
                chains[chain_index(&node.key, new_capacity)].push(node);
            }
        }
        self.chains = chains;
        tracing::debug!(old_capacity, new_capacity, len = self.len(), "map resized");
    }

    /// Inserts or replaces, returning the previous value for `key`.
    fn insert(&mut self, key: &str, value: V) -> Option<V> {
        self.ensure_space();
        let index = chain_index(key, self.capacity());
        let chain = &mut self.chains[index];
        if let Some(node) = chain.iter_mut().find(|node| node.key == key) {
            return Some(mem::replace(&mut node.value, value));
        }
        chain.push(Node {
            key: key.to_owned(),
            value,
        });
        self.order.push(key.to_owned());
        None
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        let index = chain_index(key, self.capacity());
        let chain = &mut self.chains[index];
        let position = chain.iter().position(|node| node.key == key)?;
        let node = chain.swap_remove(position);
        if let Some(position) = self.order.iter().position(|k| k == key) {
            self.order.remove(position);
        }
        Some(node.value)
    }

    fn drain(&mut self) -> Vec<V> {
        let capacity = self.capacity();
        let mut chains = mem::replace(&mut self.chains, empty_chains(capacity));
        let order = mem::take(&mut self.order);
        // Release in insertion order; each key only searches its own chain.
        let mut values = Vec::with_capacity(order.len());
        for key in &order {
            let chain = &mut chains[chain_index(key, capacity)];
            if let Some(position) = chain.iter().position(|node| &node.key == key) {
                values.push(chain.swap_remove(position).value);
            }
        }
        values
    }
}

/// A string-keyed hash map safe to share between threads.
///
/// Reads ([`get`](Self::get), [`keys`](Self::keys), [`values`](Self::values))
/// take the shared lock; every mutation takes the exclusive lock. Values are
/// returned by clone, so `V` is usually an [`Arc`](std::sync::Arc).
pub struct ConcurrentMap<V> {
    table: RwLock<Table<V>>,
    release: ReleaseFn<V>,
}

impl<V> ConcurrentMap<V> {
    /// Creates an empty map with [`INITIAL_CAPACITY`] chains.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates an empty map with at least `capacity` chains.
    ///
    /// The capacity is rounded up to a power of two and never goes below
    /// [`INITIAL_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(INITIAL_CAPACITY).next_power_of_two();
        ConcurrentMap {
            table: RwLock::new(Table::with_capacity(capacity)),
            release: Box::new(|value: V| drop(value)),
        }
    }

    /// Installs the hook that receives every value evicted from the map.
    pub fn set_release_fn(&mut self, release: impl Fn(V) + Send + Sync + 'static) {
        self.release = Box::new(release);
    }

    /// Builder form of [`set_release_fn`](Self::set_release_fn).
    pub fn with_release_fn(mut self, release: impl Fn(V) + Send + Sync + 'static) -> Self {
        self.set_release_fn(release);
        self
    }

    /// Inserts `value` under `key`.
    ///
    /// An existing entry keeps its position in the insertion order; its old
    /// value is passed to the release hook.
    pub fn set(&self, key: &str, value: V) {
        let previous = self.table.write().insert(key, value);
        if let Some(previous) = previous {
            (self.release)(previous);
        }
    }

    /// Inserts `value` only if `key` is absent.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::AlreadyRegistered`] (kind `"key"`) when the key
    /// exists; the existing value is left untouched and `value` is returned to
    /// the release hook.
    pub fn insert_new(&self, key: &str, value: V) -> Result<()> {
        let mut table = self.table.write();
        if table.find(key).is_some() {
            drop(table);
            (self.release)(value);
            return Err(MetricError::AlreadyRegistered {
                kind: "key",
                name: key.to_owned(),
            });
        }
        table.insert(key, value);
        Ok(())
    }

    /// Removes `key`, passing its value to the release hook. Absent keys are a
    /// no-op.
    pub fn delete(&self, key: &str) {
        let removed = self.table.write().remove(key);
        if let Some(value) = removed {
            (self.release)(value);
        }
    }

    /// Removes `key` and returns its value instead of releasing it.
    pub fn take(&self, key: &str) -> Option<V> {
        self.table.write().remove(key)
    }

    /// Removes every entry, releasing values in insertion order.
    pub fn clear(&self) {
        let values = self.table.write().drain();
        for value in values {
            (self.release)(value);
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current number of chains.
    pub fn capacity(&self) -> usize {
        self.table.read().capacity()
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.table.read().find(key).is_some()
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.table.read().order.clone()
    }
}

impl<V: Clone> ConcurrentMap<V> {
    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.table.read().find(key).cloned()
    }

    /// Returns the value under `key`, creating it with `make` if absent.
    ///
    /// Lookup and insertion happen under one exclusive lock, so concurrent
    /// callers racing on the same absent key create exactly one value. If
    /// `make` fails nothing is inserted and the error is returned.
    pub fn get_or_insert_with<F>(&self, key: &str, make: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let mut table = self.table.write();
        if let Some(value) = table.find(key) {
            return Ok(value.clone());
        }
        let value = make()?;
        table.insert(key, value.clone());
        Ok(value)
    }

    /// Values in first-insertion order.
    pub fn values(&self) -> Vec<V> {
        let table = self.table.read();
        table
            .order
            .iter()
            .filter_map(|key| table.find(key).cloned())
            .collect()
    }

    /// `(key, value)` pairs in first-insertion order.
    pub fn entries(&self) -> Vec<(String, V)> {
        let table = self.table.read();
        table
            .order
            .iter()
            .filter_map(|key| table.find(key).map(|value| (key.clone(), value.clone())))
            .collect()
    }
}

impl<V> Default for ConcurrentMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Debug for ConcurrentMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        f.debug_struct("ConcurrentMap")
            .field("len", &table.len())
            .field("capacity", &table.capacity())
            .field("keys", &table.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new() {
        let map: ConcurrentMap<u32> = ConcurrentMap::new();
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert_eq!(map.capacity(), INITIAL_CAPACITY);
    }

    #[test]
    fn test_set_get() {
        let map = ConcurrentMap::new();
        map.set("foo", "bar".to_string());
        assert_eq!(map.get("foo"), Some("bar".to_string()));
        assert_eq!(map.get("missing"), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let map = ConcurrentMap::new();
        map.set("a", 1);
        map.set("b", 2);
        map.set("a", 10);
        assert_eq!(map.len(), 2);
        assert_eq!(map.keys(), vec!["a", "b"]);
        assert_eq!(map.values(), vec![10, 2]);
    }

    #[test]
    fn test_delete() {
        let map = ConcurrentMap::new();
        map.set("a", 1);
        map.set("b", 2);
        map.set("c", 3);
        map.delete("b");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("b"), None);
        assert_eq!(map.keys(), vec!["a", "c"]);

        // absent key is a no-op
        map.delete("b");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_resize_keeps_entries_and_order() {
        let map = ConcurrentMap::new();
        for i in 0..18 {
            map.set(&format!("key_{i}"), i);
        }
        assert_eq!(map.capacity(), 64);
        for i in 0..18 {
            assert_eq!(map.get(&format!("key_{i}")), Some(i));
        }
        let expected: Vec<String> = (0..18).map(|i| format!("key_{i}")).collect();
        assert_eq!(map.keys(), expected);
    }

    #[test]
    fn test_large_map() {
        let map = ConcurrentMap::new();
        for i in 0..1000 {
            map.set(&i.to_string(), i);
        }
        assert_eq!(map.len(), 1000);
        assert!(map.capacity() >= 2000);
        assert!(map.capacity().is_power_of_two());
        for i in 0..1000 {
            assert_eq!(map.get(&i.to_string()), Some(i));
        }
    }

    #[test]
    fn test_clear_large_map_in_insertion_order() {
        let released = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&released);
        let map = ConcurrentMap::new().with_release_fn(move |v: usize| sink.lock().push(v));
        for i in 0..50_000 {
            map.set(&format!("series_{i}"), i);
        }

        let started = std::time::Instant::now();
        map.clear();
        let elapsed = started.elapsed();

        assert!(map.is_empty());
        assert_eq!(*released.lock(), (0..50_000).collect::<Vec<_>>());
        assert!(elapsed < std::time::Duration::from_secs(2), "clear took {elapsed:?}");
    }

    #[test]
    fn test_with_capacity_rounds_up() {
        let map: ConcurrentMap<u8> = ConcurrentMap::with_capacity(100);
        assert_eq!(map.capacity(), 128);
        let map: ConcurrentMap<u8> = ConcurrentMap::with_capacity(1);
        assert_eq!(map.capacity(), INITIAL_CAPACITY);
    }

    #[test]
    fn test_release_fn_on_overwrite_delete_clear() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let map = ConcurrentMap::new().with_release_fn(move |v: usize| {
            counter.fetch_add(v, Ordering::SeqCst);
        });

        map.set("a", 1);
        map.set("a", 2); // releases 1
        assert_eq!(released.load(Ordering::SeqCst), 1);

        map.set("b", 10);
        map.delete("b"); // releases 10
        assert_eq!(released.load(Ordering::SeqCst), 11);

        map.set("c", 100);
        map.clear(); // releases 2 and 100
        assert_eq!(released.load(Ordering::SeqCst), 113);
        assert!(map.is_empty());
    }

    #[test]
    fn test_release_fn_may_reenter_map() {
        let map = Arc::new(ConcurrentMap::<u32>::new());
        let inner = Arc::clone(&map);
        let mut outer = ConcurrentMap::new();
        outer.set_release_fn(move |v: u32| inner.set("released", v));

        outer.set("x", 7);
        outer.delete("x");
        assert_eq!(map.get("released"), Some(7));
    }

    #[test]
    fn test_insert_new() {
        let map = ConcurrentMap::new();
        map.insert_new("a", 1).unwrap();
        let err = map.insert_new("a", 2).unwrap_err();
        assert!(err.is_already_registered());
        assert_eq!(map.get("a"), Some(1));
    }

    #[test]
    fn test_take() {
        let map = ConcurrentMap::new();
        map.set("a", 1);
        assert_eq!(map.take("a"), Some(1));
        assert_eq!(map.take("a"), None);
        assert!(map.keys().is_empty());
    }

    #[test]
    fn test_get_or_insert_with() {
        let map = ConcurrentMap::new();
        let v = map.get_or_insert_with("a", || Ok(1)).unwrap();
        assert_eq!(v, 1);
        let v = map.get_or_insert_with("a", || Ok(2)).unwrap();
        assert_eq!(v, 1);

        let err = map
            .get_or_insert_with("b", || Err(MetricError::invalid("nope")))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(!map.contains_key("b"));
    }

    #[test]
    fn test_get_or_insert_with_creates_once() {
        let map = Arc::new(ConcurrentMap::new());
        let created = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..8 {
            let map = Arc::clone(&map);
            let created = Arc::clone(&created);
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    map.get_or_insert_with(&format!("k{i}"), || {
                        created.fetch_add(1, Ordering::SeqCst);
                        Ok(Arc::new(i))
                    })
                    .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(created.load(Ordering::SeqCst), 50);
        assert_eq!(map.len(), 50);
    }

    #[test]
    fn test_concurrent_set_get() {
        let map = Arc::new(ConcurrentMap::new());
        let mut handles = vec![];

        for t in 0..4 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for i in 0..250 {
                    let key = format!("t{t}_{i}");
                    map.set(&key, i);
                    assert_eq!(map.get(&key), Some(i));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len(), 1000);
    }

    #[test]
    fn test_entries_and_debug() {
        let map = ConcurrentMap::new();
        map.set("x", 1);
        map.set("y", 2);
        assert_eq!(
            map.entries(),
            vec![("x".to_string(), 1), ("y".to_string(), 2)]
        );
        let debug = format!("{:?}", map);
        assert!(debug.contains("len: 2"));
        assert!(debug.contains("capacity: 32"));
    }

    #[test]
    fn test_chain_index_in_range() {
        for capacity in [32, 64, 128, 1024] {
            for key in ["", "a", "process_max_fds", "test_counter{label=\"foo\"}"] {
                assert!(chain_index(key, capacity) < capacity);
            }
        }
    }

    mod prop {
        use super::super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 64, failure_persistence: None, .. ProptestConfig::default() })]
            #[test]
            fn prop_last_set_wins(ops in proptest::collection::vec(("[a-z]{1,6}", any::<u32>()), 1..200)) {
                let map = ConcurrentMap::new();
                let mut model = HashMap::new();
                let mut order: Vec<String> = Vec::new();
                for (key, value) in &ops {
                    map.set(key, *value);
                    if model.insert(key.clone(), *value).is_none() {
                        order.push(key.clone());
                    }
                }
                prop_assert_eq!(map.len(), model.len());
                for (key, value) in &model {
                    prop_assert_eq!(map.get(key), Some(*value));
                }
                prop_assert_eq!(map.keys(), order);
            }
        }
    }
}
