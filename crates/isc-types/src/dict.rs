//! Parameter / result dictionary

use crate::codec::{self, CodecError, Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::collections::BTreeMap;

/// Ordered key/value dictionary used for call parameters and results.
///
/// Values are raw bytes; the typed accessors decode them with [`codec`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dict(BTreeMap<String, Vec<u8>>);

impl Dict {
    /// Empty dictionary
    pub const fn new() -> Self {
        Dict(BTreeMap::new())
    }

    /// Set a raw value
    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.0.insert(key.into(), value);
    }

    /// Builder: set a raw value
    pub fn with(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.set(key, value);
        self
    }

    /// Set an encoded value
    pub fn set_value<T: Encodable>(&mut self, key: impl Into<String>, value: &T) {
        self.set(key, codec::encode(value));
    }

    /// Builder: set an encoded value
    pub fn with_value<T: Encodable>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.set_value(key, value);
        self
    }

    /// Raw value
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Decoded value, `None` if absent
    pub fn get_value<T: Decodable>(&self, key: &str) -> Result<Option<T>, CodecError> {
        self.get(key).map(|b| codec::decode::<T>(b)).transpose()
    }

    /// Decoded value, error if absent
    pub fn require<T: Decodable>(&self, key: &str) -> Result<T, CodecError> {
        self.get_value(key)?
            .ok_or_else(|| CodecError::MissingParam(key.to_string()))
    }

    /// Decoded value, or `default` if absent
    pub fn get_or<T: Decodable>(&self, key: &str, default: T) -> Result<T, CodecError> {
        Ok(self.get_value(key)?.unwrap_or(default))
    }

    /// Whether `key` is present
    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.0.remove(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl FromIterator<(String, Vec<u8>)> for Dict {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Dict(iter.into_iter().collect())
    }
}

impl Encodable for Dict {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(self.0.len());
        for (k, v) in &self.0 {
            s.begin_list(2);
            s.append(k);
            s.append(v);
        }
    }
}

impl Decodable for Dict {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let mut dict = Dict::new();
        for item in rlp.iter() {
            let key: String = item.val_at(0)?;
            let value: Vec<u8> = item.val_at(1)?;
            dict.set(key, value);
        }
        Ok(dict)
    }
}
