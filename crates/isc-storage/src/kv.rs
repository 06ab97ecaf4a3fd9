//! Key/value access traits and mutation sets

use std::collections::{BTreeMap, BTreeSet};

/// Read access to a key/value state.
///
/// Reads are infallible: everything the VM reads lives in memory.
pub trait KvReader {
    /// Value at `key`
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Whether `key` is set
    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Visit every entry whose key starts with `prefix`, in key order,
    /// until `f` returns false. Returns false if iteration was stopped.
    fn iterate(&self, prefix: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool;

    /// Visit keys only
    fn iterate_keys(&self, prefix: &[u8], f: &mut dyn FnMut(&[u8]) -> bool) -> bool {
        self.iterate(prefix, &mut |k, _| f(k))
    }
}

/// Write access to a key/value state
pub trait KvWriter: KvReader {
    /// Set `key` to `value`
    fn set(&mut self, key: &[u8], value: Vec<u8>);

    /// Delete `key`
    fn del(&mut self, key: &[u8]);
}

impl<T: KvReader + ?Sized> KvReader for &T {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn iterate(&self, prefix: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
        (**self).iterate(prefix, f)
    }
}

impl<T: KvReader + ?Sized> KvReader for &mut T {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn iterate(&self, prefix: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
        (**self).iterate(prefix, f)
    }
}

impl<T: KvWriter + ?Sized> KvWriter for &mut T {
    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        (**self).set(key, value)
    }

    fn del(&mut self, key: &[u8]) {
        (**self).del(key)
    }
}

/// Uncommitted changes: a set of writes and a set of deletions.
///
/// A key is never in both sets at once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mutations {
    /// Keys written
    pub sets: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Keys deleted
    pub dels: BTreeSet<Vec<u8>>,
}

impl Mutations {
    /// Empty set of changes
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write
    pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.dels.remove(key);
        self.sets.insert(key.to_vec(), value);
    }

    /// Record a deletion
    pub fn del(&mut self, key: &[u8]) {
        self.sets.remove(key);
        self.dels.insert(key.to_vec());
    }

    /// Fold later changes on top of these
    pub fn merge(&mut self, later: Mutations) {
        for key in later.dels {
            self.sets.remove(&key);
            self.dels.insert(key);
        }
        for (key, value) in later.sets {
            self.dels.remove(&key);
            self.sets.insert(key, value);
        }
    }

    /// Replay onto a writer
    pub fn apply_to(&self, w: &mut dyn KvWriter) {
        for key in &self.dels {
            w.del(key);
        }
        for (key, value) in &self.sets {
            w.set(key, value.clone());
        }
    }

    /// Number of touched keys
    pub fn len(&self) -> usize {
        self.sets.len() + self.dels.len()
    }

    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.dels.is_empty()
    }

    /// Drop all changes
    pub fn clear(&mut self) {
        self.sets.clear();
        self.dels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_del() {
        let mut m = Mutations::new();
        m.set(b"k", vec![1]);
        m.del(b"k");
        assert!(m.sets.is_empty());
        assert!(m.dels.contains(&b"k".to_vec()));
        m.set(b"k", vec![2]);
        assert!(m.dels.is_empty());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_merge_later_wins() {
        let mut a = Mutations::new();
        a.set(b"x", vec![1]);
        a.set(b"y", vec![1]);

        let mut b = Mutations::new();
        b.del(b"x");
        b.set(b"y", vec![2]);
        b.set(b"z", vec![3]);

        a.merge(b);
        assert!(a.dels.contains(&b"x".to_vec()));
        assert_eq!(a.sets.get(&b"y".to_vec()), Some(&vec![2]));
        assert_eq!(a.sets.get(&b"z".to_vec()), Some(&vec![3]));
        assert_eq!(a.len(), 3);
    }
}
