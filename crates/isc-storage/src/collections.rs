//! Counted maps stored under a name prefix.
//!
//! A map called `name` keeps its element count at key `name` and each
//! element at `name ‖ '.' ‖ key`.

use crate::kv::{KvReader, KvWriter};

const ELEM_SEP: u8 = b'.';

fn elem_key(name: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1 + key.len());
    out.extend_from_slice(name);
    out.push(ELEM_SEP);
    out.extend_from_slice(key);
    out
}

fn elem_prefix(name: &[u8]) -> Vec<u8> {
    elem_key(name, &[])
}

fn read_len<K: KvReader + ?Sized>(kv: &K, name: &[u8]) -> u32 {
    kv.get(name)
        .and_then(|b| <[u8; 4]>::try_from(b.as_slice()).ok())
        .map(u32::from_be_bytes)
        .unwrap_or(0)
}

fn iterate_elems<K: KvReader + ?Sized>(
    kv: &K,
    name: &[u8],
    f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
) -> bool {
    let prefix = elem_prefix(name);
    kv.iterate(&prefix, &mut |k, v| f(&k[prefix.len()..], v))
}

/// Read-only map
pub struct MapReader<'a> {
    kv: &'a dyn KvReader,
    name: Vec<u8>,
}

impl<'a> MapReader<'a> {
    /// Map `name` in `kv`
    pub fn new(kv: &'a dyn KvReader, name: impl Into<Vec<u8>>) -> Self {
        Self {
            kv,
            name: name.into(),
        }
    }

    /// Element at `key`
    pub fn get_at(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.kv.get(&elem_key(&self.name, key))
    }

    /// Whether `key` is present
    pub fn has_at(&self, key: &[u8]) -> bool {
        self.kv.has(&elem_key(&self.name, key))
    }

    /// Number of elements
    pub fn len(&self) -> u32 {
        read_len(self.kv, &self.name)
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit elements in key order until `f` returns false
    pub fn iterate(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
        iterate_elems(self.kv, &self.name, f)
    }

    /// All keys in order
    pub fn keys(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        self.iterate(&mut |k, _| {
            keys.push(k.to_vec());
            true
        });
        keys
    }
}

/// Writable map
pub struct Map<'a> {
    kv: &'a mut dyn KvWriter,
    name: Vec<u8>,
}

impl<'a> Map<'a> {
    /// Map `name` in `kv`
    pub fn new(kv: &'a mut dyn KvWriter, name: impl Into<Vec<u8>>) -> Self {
        Self {
            kv,
            name: name.into(),
        }
    }

    /// Element at `key`
    pub fn get_at(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.kv.get(&elem_key(&self.name, key))
    }

    /// Whether `key` is present
    pub fn has_at(&self, key: &[u8]) -> bool {
        self.kv.has(&elem_key(&self.name, key))
    }

    /// Number of elements
    pub fn len(&self) -> u32 {
        read_len(&*self.kv, &self.name)
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set `key` to `value`
    pub fn set_at(&mut self, key: &[u8], value: Vec<u8>) {
        let k = elem_key(&self.name, key);
        if !self.kv.has(&k) {
            self.write_len(self.len() + 1);
        }
        self.kv.set(&k, value);
    }

    /// Remove `key`
    pub fn del_at(&mut self, key: &[u8]) {
        let k = elem_key(&self.name, key);
        if self.kv.has(&k) {
            self.kv.del(&k);
            self.write_len(self.len().saturating_sub(1));
        }
    }

    /// Visit elements in key order until `f` returns false
    pub fn iterate(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
        iterate_elems(&*self.kv, &self.name, f)
    }

    fn write_len(&mut self, len: u32) {
        if len == 0 {
            self.kv.del(&self.name);
        } else {
            self.kv.set(&self.name, len.to_be_bytes().to_vec());
        }
    }
}
