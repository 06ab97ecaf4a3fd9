//! Copy-on-write state snapshots

use crate::kv::{KvReader, KvWriter, Mutations};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable-by-default chain state.
///
/// Cloning is O(1): the map is shared until one of the clones is written,
/// at which point that clone takes a private copy.
#[derive(Clone, Debug, Default)]
pub struct StateSnapshot {
    data: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl StateSnapshot {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a set of changes
    pub fn apply(&mut self, mutations: &Mutations) {
        if mutations.is_empty() {
            return;
        }
        let data = Arc::make_mut(&mut self.data);
        for key in &mutations.dels {
            data.remove(key);
        }
        for (key, value) in &mutations.sets {
            data.insert(key.clone(), value.clone());
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the state holds no keys
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.data.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Whether two snapshots share storage
    pub fn shares_storage_with(&self, other: &StateSnapshot) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl FromIterator<(Vec<u8>, Vec<u8>)> for StateSnapshot {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>>(iter: I) -> Self {
        Self {
            data: Arc::new(iter.into_iter().collect()),
        }
    }
}

impl PartialEq for StateSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.shares_storage_with(other) || self.data == other.data
    }
}

impl Eq for StateSnapshot {}

impl KvReader for StateSnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn has(&self, key: &[u8]) -> bool {
        self.data.contains_key(key)
    }

    fn iterate(&self, prefix: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
        for (k, v) in self.data.range(prefix.to_vec()..) {
            if !k.starts_with(prefix) {
                break;
            }
            if !f(k, v) {
                return false;
            }
        }
        true
    }
}

impl KvWriter for StateSnapshot {
    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        Arc::make_mut(&mut self.data).insert(key.to_vec(), value);
    }

    fn del(&mut self, key: &[u8]) {
        if self.data.contains_key(key) {
            Arc::make_mut(&mut self.data).remove(key);
        }
    }
}
