// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::keyentry::KeyEntry;

/// Interface to the store where named keys are stashed.
pub trait IKeyStore {
    /// Lookup a key from the store given its key id
    fn lookup(&self, key_id: &str) -> Option<KeyEntry>;
}
