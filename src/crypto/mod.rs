// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Algorithm registries and the OpenSSL-backed primitives used by the
//! envelope layer.

mod algorithms;
mod encryption;
mod errors;
mod signature;

pub use algorithms::{
    AsymSignatureAlgorithm, ContentEncryptionAlgorithm, HmacAlgorithm, KeyAlgorithm,
    KeyEncryptionAlgorithm, KeyType,
};
pub use encryption::{
    aes_key_unwrap, aes_key_wrap, content_decrypt, content_encrypt, generate_ephemeral, hmac,
    hmac_verify, key_agreement, random_bytes, rsa_decrypt_key, rsa_encrypt_key,
};
pub use errors::Error;
pub use signature::{to_concatenated, to_der, SignatureWrapper};
