// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Named key material loaded from JSON.

pub use self::errors::Error;
pub use self::ikeystore::IKeyStore;
pub use self::keyentry::{KeyEntry, KeyMaterial};
pub use self::memo_keystore::MemoKeyStore;

mod errors;
mod ikeystore;
mod keyentry;
mod memo_keystore;
