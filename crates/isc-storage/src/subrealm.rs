//! Prefix-partitioned views of a state

use crate::kv::{KvReader, KvWriter};

fn prefixed(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + key.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(key);
    out
}

fn iterate_stripped<K: KvReader + ?Sized>(
    kv: &K,
    prefix: &[u8],
    sub: &[u8],
    f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
) -> bool {
    let full = prefixed(prefix, sub);
    kv.iterate(&full, &mut |k, v| f(&k[prefix.len()..], v))
}

/// Writable view of the keys under a prefix; keys are seen without it.
///
/// Each contract gets one, prefixed with its hname, so contracts cannot
/// touch each other's state.
pub struct SubRealm<'a> {
    kv: &'a mut dyn KvWriter,
    prefix: Vec<u8>,
}

impl<'a> SubRealm<'a> {
    /// View of `kv` under `prefix`
    pub fn new(kv: &'a mut dyn KvWriter, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    /// The prefix
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }
}

impl KvReader for SubRealm<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.kv.get(&prefixed(&self.prefix, key))
    }

    fn iterate(&self, prefix: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
        iterate_stripped(&*self.kv, &self.prefix, prefix, f)
    }
}

impl KvWriter for SubRealm<'_> {
    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        let key = prefixed(&self.prefix, key);
        self.kv.set(&key, value);
    }

    fn del(&mut self, key: &[u8]) {
        let key = prefixed(&self.prefix, key);
        self.kv.del(&key);
    }
}

/// Read-only counterpart of [`SubRealm`]
pub struct SubRealmReader<'a> {
    kv: &'a dyn KvReader,
    prefix: Vec<u8>,
}

impl<'a> SubRealmReader<'a> {
    /// View of `kv` under `prefix`
    pub fn new(kv: &'a dyn KvReader, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }
}

impl KvReader for SubRealmReader<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.kv.get(&prefixed(&self.prefix, key))
    }

    fn iterate(&self, prefix: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
        iterate_stripped(self.kv, &self.prefix, prefix, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateSnapshot;

    #[test]
    fn test_partitions_do_not_overlap() {
        let mut state = StateSnapshot::new();
        SubRealm::new(&mut state, b"A".to_vec()).set(b"k", vec![1]);
        SubRealm::new(&mut state, b"B".to_vec()).set(b"k", vec![2]);

        assert_eq!(state.get(b"Ak"), Some(vec![1]));
        assert_eq!(state.get(b"Bk"), Some(vec![2]));
        assert_eq!(SubRealmReader::new(&state, b"A".to_vec()).get(b"k"), Some(vec![1]));
    }

    #[test]
    fn test_iteration_strips_prefix() {
        let mut state = StateSnapshot::new();
        {
            let mut realm = SubRealm::new(&mut state, b"C".to_vec());
            realm.set(b"x1", vec![]);
            realm.set(b"x2", vec![]);
            realm.set(b"y", vec![]);
        }
        state.set(b"Dx3", vec![]);

        let reader = SubRealmReader::new(&state, b"C".to_vec());
        let mut keys = Vec::new();
        reader.iterate_keys(b"x", &mut |k| {
            keys.push(k.to_vec());
            true
        });
        assert_eq!(keys, vec![b"x1".to_vec(), b"x2".to_vec()]);
    }

    #[test]
    fn test_del() {
        let mut state = StateSnapshot::new();
        let mut realm = SubRealm::new(&mut state, b"E".to_vec());
        realm.set(b"k", vec![1]);
        realm.del(b"k");
        assert!(!realm.has(b"k"));
    }
}
