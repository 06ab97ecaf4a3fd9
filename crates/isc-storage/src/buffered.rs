//! Snapshot plus uncommitted changes

use crate::kv::{KvReader, KvWriter, Mutations};
use crate::snapshot::StateSnapshot;
use std::collections::BTreeMap;

/// Reads fall through to `base` unless shadowed by a pending change;
/// writes only touch the pending [`Mutations`].
///
/// Rolling back is restoring an earlier copy of the mutations.
#[derive(Clone, Debug)]
pub struct BufferedKv<R: KvReader = StateSnapshot> {
    base: R,
    mutations: Mutations,
}

impl<R: KvReader> BufferedKv<R> {
    /// Buffer on top of `base`
    pub fn new(base: R) -> Self {
        Self {
            base,
            mutations: Mutations::new(),
        }
    }

    /// Underlying state
    pub fn base(&self) -> &R {
        &self.base
    }

    /// Pending changes
    pub fn mutations(&self) -> &Mutations {
        &self.mutations
    }

    /// Take the pending changes, leaving none
    pub fn take_mutations(&mut self) -> Mutations {
        std::mem::take(&mut self.mutations)
    }

    /// Replace the pending changes, typically with an earlier checkpoint
    pub fn restore(&mut self, mutations: Mutations) {
        self.mutations = mutations;
    }

    /// Split into base and pending changes
    pub fn into_parts(self) -> (R, Mutations) {
        (self.base, self.mutations)
    }
}

impl BufferedKv<StateSnapshot> {
    /// Fold the pending changes into the base snapshot
    pub fn commit(&mut self) -> Mutations {
        let mutations = self.take_mutations();
        self.base.apply(&mutations);
        mutations
    }
}

impl<R: KvReader> KvReader for BufferedKv<R> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if self.mutations.dels.contains(key) {
            return None;
        }
        if let Some(value) = self.mutations.sets.get(key) {
            return Some(value.clone());
        }
        self.base.get(key)
    }

    fn iterate(&self, prefix: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
        let dels = &self.mutations.dels;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        self.base.iterate(prefix, &mut |k, v| {
            if !dels.contains(k) {
                merged.insert(k.to_vec(), v.to_vec());
            }
            true
        });
        for (k, v) in self.mutations.sets.range(prefix.to_vec()..) {
            if !k.starts_with(prefix) {
                break;
            }
            merged.insert(k.clone(), v.clone());
        }
        for (k, v) in &merged {
            if !f(k, v) {
                return false;
            }
        }
        true
    }
}

impl<R: KvReader> KvWriter for BufferedKv<R> {
    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.mutations.set(key, value);
    }

    fn del(&mut self, key: &[u8]) {
        self.mutations.del(key);
    }
}
