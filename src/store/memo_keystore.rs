// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::keyentry::KeyEntry;
use super::IKeyStore;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory key store, indexed by key id.
#[derive(Debug)]
pub struct MemoKeyStore {
    k: RwLock<HashMap<String, KeyEntry>>,
}

impl Default for MemoKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoKeyStore {
    /// Returns a new empty MemoKeyStore
    pub fn new() -> Self {
        Self {
            k: Default::default(),
        }
    }

    /// Add to an existing (and possibly empty) MemoKeyStore the keys loaded
    /// from the given JSON document.  A key id may only be used once.  The
    /// store is left as it was unless every entry loads.
    pub fn load_json(&self, j: &str) -> Result<(), Error> {
        let entries: Vec<KeyEntry> =
            serde_json::from_str(j).map_err(|e| Error::Syntax(e.to_string()))?;

        let mut k = self
            .k
            .write()
            .map_err(|e| Error::Sema(format!("key store lock: {e}")))?;

        let mut staged = HashMap::with_capacity(entries.len());
        for mut entry in entries {
            entry.parse_key()?;
            if k.contains_key(&entry.key_id) || staged.contains_key(&entry.key_id) {
                return Err(Error::Sema(format!("duplicate key id {}", entry.key_id)));
            }
            staged.insert(entry.key_id.clone(), entry);
        }

        for key_id in staged.keys() {
            tracing::debug!(%key_id, "loaded key");
        }
        k.extend(staged);

        Ok(())
    }
}

impl IKeyStore for MemoKeyStore {
    fn lookup(&self, key_id: &str) -> Option<KeyEntry> {
        self.k.read().ok()?.get(key_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_JSON_KEYS: &str = include_str!("../../testdata/keys.json");

    #[test]
    fn load_json_and_lookup_ok() {
        let s: MemoKeyStore = Default::default();

        s.load_json(TEST_JSON_KEYS).unwrap();

        let sym = s.lookup("sym-128").unwrap();
        assert_eq!(sym.secret(), Some([0x5c; 16].as_slice()));

        let sym = s.lookup("sym-256").unwrap();
        assert_eq!(sym.secret().map(|s| s.len()), Some(32));

        let p256 = s.lookup("p256").unwrap();
        assert!(p256.private_key().is_some());
        assert!(p256.public_key().unwrap().is_some());

        let ed = s.lookup("ed25519-pub").unwrap();
        assert!(ed.private_key().is_none());
        assert!(ed.public_key().unwrap().is_some());

        assert!(s.lookup("nope").is_none());
    }

    #[test]
    fn duplicate_key_id() {
        let s: MemoKeyStore = Default::default();
        s.load_json(TEST_JSON_KEYS).unwrap();

        assert!(matches!(
            s.load_json(r#"[ { "key-id": "sym-128", "secret": "AA" } ]"#),
            Err(Error::Sema(_))
        ));
    }

    #[test]
    fn failed_load_changes_nothing() {
        let s: MemoKeyStore = Default::default();
        s.load_json(TEST_JSON_KEYS).unwrap();

        for batch in [
            r#"[ { "key-id": "a", "secret": "AA" },
                 { "key-id": "sym-128", "secret": "AA" },
                 { "key-id": "b", "secret": "AA" } ]"#,
            r#"[ { "key-id": "a", "secret": "AA" },
                 { "key-id": "a", "secret": "AQ" } ]"#,
            r#"[ { "key-id": "a", "secret": "AA" },
                 { "key-id": "b", "private-key": "not PEM" } ]"#,
        ] {
            assert!(s.load_json(batch).is_err());
            assert!(s.lookup("a").is_none());
            assert!(s.lookup("b").is_none());
            assert_eq!(s.lookup("sym-128").unwrap().secret(), Some([0x5c; 16].as_slice()));
        }

        s.load_json(r#"[ { "key-id": "a", "secret": "AA" } ]"#).unwrap();
        assert_eq!(s.lookup("a").unwrap().secret(), Some([0u8].as_slice()));
    }

    #[test]
    fn syntax_error() {
        let s: MemoKeyStore = Default::default();
        assert!(matches!(s.load_json("{"), Err(Error::Syntax(_))));
    }
}
