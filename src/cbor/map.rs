// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::encoder::{write_head, MT_MAP};
use super::errors::Error;
use super::value::CborValue;
use std::cmp::Ordering;
use std::sync::atomic::{self, AtomicBool};

/// Sort rule for map keys, applied to the encoded key bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapOrdering {
    /// RFC 7049 canonical CBOR: shorter encodings first, then bytewise.
    LengthFirst,
    /// RFC 8949 core deterministic encoding: plain bytewise comparison.
    #[default]
    Bytewise,
}

impl MapOrdering {
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            MapOrdering::LengthFirst => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            MapOrdering::Bytewise => a.cmp(b),
        }
    }
}

struct MapEntry {
    encoded_key: Vec<u8>,
    key: CborValue,
    value: CborValue,
    read: AtomicBool,
}

impl MapEntry {
    fn mark_read(&self) {
        self.read.store(true, atomic::Ordering::Relaxed);
    }

    fn is_read(&self) -> bool {
        self.read.load(atomic::Ordering::Relaxed)
    }
}

// read tracking belongs to an instance: a clone starts out unread
impl Clone for MapEntry {
    fn clone(&self) -> Self {
        Self {
            encoded_key: self.encoded_key.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
            read: AtomicBool::new(false),
        }
    }
}

/// A CBOR map whose entries are always kept in canonical key order.
///
/// Lookups through [`CborMap::get`] mark the entry as read, which lets a
/// consumer call [`CborMap::check_for_unread`] once it has processed every
/// field it understands, rejecting maps that carry anything else.
#[derive(Clone, Default)]
pub struct CborMap {
    ordering: MapOrdering,
    entries: Vec<MapEntry>,
}

impl CborMap {
    /// Returns a new empty map using RFC 8949 bytewise key ordering
    pub fn new() -> Self {
        Self::with_ordering(MapOrdering::default())
    }

    pub fn with_ordering(ordering: MapOrdering) -> Self {
        Self {
            ordering,
            entries: Vec::new(),
        }
    }

    pub fn ordering(&self) -> MapOrdering {
        self.ordering
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, encoded_key: &[u8]) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| self.ordering.compare(&e.encoded_key, encoded_key))
    }

    // keys are compared in the encoding this map would give them
    fn encode_key(&self, key: CborValue) -> (CborValue, Vec<u8>) {
        let key = key.into_ordering(self.ordering);
        let encoded_key = key.encode();
        (key, encoded_key)
    }

    fn find(&self, key: CborValue) -> Option<&MapEntry> {
        let (_, encoded_key) = self.encode_key(key);
        self.position(&encoded_key).ok().map(|i| &self.entries[i])
    }

    /// Insert a new entry; inserting a key that is already present fails.
    ///
    /// Maps inside the key or value take on the ordering of this map, so a
    /// document is encoded with a single ordering throughout.
    pub fn set<K, V>(&mut self, key: K, value: V) -> Result<&mut Self, Error>
    where
        K: Into<CborValue>,
        V: Into<CborValue>,
    {
        let (key, encoded_key) = self.encode_key(key.into());

        match self.position(&encoded_key) {
            Ok(_) => Err(Error::DuplicateKey(key.to_diagnostic())),
            Err(i) => {
                self.entries.insert(
                    i,
                    MapEntry {
                        encoded_key,
                        key,
                        value: value.into().into_ordering(self.ordering),
                        read: AtomicBool::new(false),
                    },
                );
                Ok(self)
            }
        }
    }

    /// Rebuild this map, and every map nested in it, under `ordering`.
    /// Read flags are carried over.
    pub fn into_ordering(self, ordering: MapOrdering) -> CborMap {
        if self.ordering == ordering {
            return self;
        }

        let mut out = CborMap::with_ordering(ordering);
        for e in self.entries {
            let (key, encoded_key) = out.encode_key(e.key);
            let i = out.position(&encoded_key).unwrap_or_else(|i| i);
            out.entries.insert(
                i,
                MapEntry {
                    encoded_key,
                    key,
                    value: e.value.into_ordering(ordering),
                    read: e.read,
                },
            );
        }
        out
    }

    /// Append an entry whose key is known to sort after every existing key.
    /// Used by the decoder once ordering has been validated.
    pub(crate) fn push_ordered(&mut self, encoded_key: Vec<u8>, key: CborValue, value: CborValue) {
        self.entries.push(MapEntry {
            encoded_key,
            key,
            value,
            read: AtomicBool::new(false),
        });
    }

    pub(crate) fn last_encoded_key(&self) -> Option<&[u8]> {
        self.entries.last().map(|e| e.encoded_key.as_slice())
    }

    /// Look up a value and mark it as read
    pub fn get<K: Into<CborValue>>(&self, key: K) -> Result<&CborValue, Error> {
        let key = key.into();
        match self.find(key.clone()) {
            Some(e) => {
                e.mark_read();
                Ok(&e.value)
            }
            None => Err(Error::NoSuchKey(key.to_diagnostic())),
        }
    }

    pub fn get_mut<K: Into<CborValue>>(&mut self, key: K) -> Result<&mut CborValue, Error> {
        let (key, encoded_key) = self.encode_key(key.into());
        match self.position(&encoded_key) {
            Ok(i) => {
                let e = &mut self.entries[i];
                e.mark_read();
                Ok(&mut e.value)
            }
            Err(_) => Err(Error::NoSuchKey(key.to_diagnostic())),
        }
    }

    /// Presence test; does not count as reading the entry
    pub fn contains_key<K: Into<CborValue>>(&self, key: K) -> bool {
        self.find(key.into()).is_some()
    }

    pub fn remove<K: Into<CborValue>>(&mut self, key: K) -> Result<CborValue, Error> {
        let (key, encoded_key) = self.encode_key(key.into());
        match self.position(&encoded_key) {
            Ok(i) => Ok(self.entries.remove(i).value),
            Err(_) => Err(Error::NoSuchKey(key.to_diagnostic())),
        }
    }

    /// Remove an entry that must hold a byte string and return its content
    pub fn take_byte_string<K: Into<CborValue>>(&mut self, key: K) -> Result<Vec<u8>, Error> {
        let key = key.into();
        let bytes = self.get(&key)?.as_bytes()?.to_vec();
        self.remove(key)?;
        Ok(bytes)
    }

    /// Fails if any entry has not been looked up since the map was built
    pub fn check_for_unread(&self) -> Result<(), Error> {
        match self.entries.iter().find(|e| !e.is_read()) {
            Some(e) => {
                tracing::debug!(key = %e.key, "map entry was never read");
                Err(Error::UnreadData(format!(
                    "map key {} was never read",
                    e.key.to_diagnostic()
                )))
            }
            None => Ok(()),
        }
    }

    /// Iterate entries in canonical order without marking them read
    pub fn iter(&self) -> impl Iterator<Item = (&CborValue, &CborValue)> {
        self.entries.iter().map(|e| (&e.key, &e.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &CborValue> {
        self.entries.iter().map(|e| &e.key)
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        write_head(MT_MAP, self.entries.len() as u64, out);
        for e in self.entries.iter() {
            out.extend_from_slice(&e.encoded_key);
            e.value.encode_into(out);
        }
    }
}

impl PartialEq for CborMap {
    fn eq(&self, other: &Self) -> bool {
        self.ordering == other.ordering
            && self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| a.encoded_key == b.encoded_key && a.value == b.value)
    }
}

impl Eq for CborMap {}

impl std::fmt::Debug for CborMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
