// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::constants::*;
use super::crypto_utils::{get_custom_data, get_key_id, unwrap_container};
use super::errors::Error;
use super::policy::{Collector, Policy, PolicyHandler};
use super::public_key::decode_public_key;
use crate::cbor::{CborMap, CborValue};
use crate::crypto::{self, ContentEncryptionAlgorithm, KeyEncryptionAlgorithm};
use openssl::pkey::{PKey, Private, Public};

/// Strategy for obtaining the content encryption key of an envelope
pub trait KeyRecovery: Send + Sync {
    /// Whether the key material lives in a key encryption sub-map (label 8)
    /// rather than in the envelope itself
    fn key_encryption(&self) -> bool {
        true
    }

    fn recover_key(
        &self,
        key_object: &CborMap,
        content_algorithm: ContentEncryptionAlgorithm,
        key_id: Option<&CborValue>,
    ) -> Result<Vec<u8>, Error>;
}

type SymKeyLocator =
    dyn Fn(Option<&CborValue>, ContentEncryptionAlgorithm) -> Result<Vec<u8>, Error> + Send + Sync;

/// Content key shared in advance by sender and recipient
pub struct SymKeyRecovery {
    locator: Box<SymKeyLocator>,
}

impl SymKeyRecovery {
    pub fn new<F>(locator: F) -> Self
    where
        F: Fn(Option<&CborValue>, ContentEncryptionAlgorithm) -> Result<Vec<u8>, Error>
            + Send
            + Sync
            + 'static,
    {
        Self {
            locator: Box::new(locator),
        }
    }

    /// Always use `key`, whatever key id the envelope declares
    pub fn new_fixed(key: Vec<u8>) -> Self {
        Self::new(move |_, _| Ok(key.clone()))
    }
}

impl KeyRecovery for SymKeyRecovery {
    fn key_encryption(&self) -> bool {
        false
    }

    fn recover_key(
        &self,
        _key_object: &CborMap,
        content_algorithm: ContentEncryptionAlgorithm,
        key_id: Option<&CborValue>,
    ) -> Result<Vec<u8>, Error> {
        (self.locator)(key_id, content_algorithm)
    }
}

type AsymKeyLocator = dyn Fn(
        Option<&PKey<Public>>,
        Option<&CborValue>,
        KeyEncryptionAlgorithm,
        ContentEncryptionAlgorithm,
    ) -> Result<PKey<Private>, Error>
    + Send
    + Sync;

/// Content key protected by RSA-OAEP or derived through ECDH-ES, with or
/// without AES key wrap.  The locator maps the optional embedded public key
/// and key id to the recipient's private key.
pub struct AsymKeyRecovery {
    locator: Box<AsymKeyLocator>,
}

impl AsymKeyRecovery {
    pub fn new<F>(locator: F) -> Self
    where
        F: Fn(
                Option<&PKey<Public>>,
                Option<&CborValue>,
                KeyEncryptionAlgorithm,
                ContentEncryptionAlgorithm,
            ) -> Result<PKey<Private>, Error>
            + Send
            + Sync
            + 'static,
    {
        Self {
            locator: Box::new(locator),
        }
    }

    pub fn new_fixed(private_key: PKey<Private>) -> Self {
        Self::new(move |_, _, _, _| Ok(private_key.clone()))
    }
}

impl KeyRecovery for AsymKeyRecovery {
    fn recover_key(
        &self,
        key_object: &CborMap,
        content_algorithm: ContentEncryptionAlgorithm,
        key_id: Option<&CborValue>,
    ) -> Result<Vec<u8>, Error> {
        let algorithm =
            KeyEncryptionAlgorithm::from_id(key_object.get(ALGORITHM_LABEL)?.as_int()?)?;

        let public_key = if key_object.contains_key(PUBLIC_KEY_LABEL) {
            Some(decode_public_key(
                key_object.get(PUBLIC_KEY_LABEL)?.as_map()?,
            )?)
        } else {
            None
        };

        let private_key = (self.locator)(
            public_key.as_ref(),
            key_id,
            algorithm,
            content_algorithm,
        )?;

        if algorithm.is_rsa() {
            let encrypted_key = key_object.get(CIPHER_TEXT_LABEL)?.as_bytes()?;
            return Ok(crypto::rsa_decrypt_key(
                algorithm,
                &private_key,
                encrypted_key,
            )?);
        }

        let ephemeral = decode_public_key(key_object.get(EPHEMERAL_KEY_LABEL)?.as_map()?)?;
        let shared =
            crypto::key_agreement(algorithm, content_algorithm, &private_key, &ephemeral)?;

        if algorithm.key_wrap_len().is_none() {
            return Ok(shared);
        }

        let wrapped_key = key_object.get(CIPHER_TEXT_LABEL)?.as_bytes()?;
        Ok(crypto::aes_key_unwrap(&shared, wrapped_key)?)
    }
}

/// Decrypts envelopes.  A configured decrypter holds no per-call state and
/// can be shared between threads.
pub struct Decrypter<R> {
    recovery: R,
    tag_policy: PolicyHandler,
    custom_data_policy: PolicyHandler,
}

impl<R: KeyRecovery> Decrypter<R> {
    pub fn new(recovery: R) -> Self {
        Self {
            recovery,
            tag_policy: PolicyHandler::forbidden("tag"),
            custom_data_policy: PolicyHandler::forbidden("custom data"),
        }
    }

    pub fn with_tag_policy(mut self, policy: Policy, collector: impl Collector + 'static) -> Self {
        self.tag_policy.set(policy, collector);
        self
    }

    pub fn with_custom_data_policy(
        mut self,
        policy: Policy,
        collector: impl Collector + 'static,
    ) -> Self {
        self.custom_data_policy.set(policy, collector);
        self
    }

    /// Decrypt `envelope` and return the plain text.  The caller's value is
    /// not modified.
    pub fn decrypt(&self, envelope: &CborValue) -> Result<Vec<u8>, Error> {
        let mut working = envelope.clone();
        let container = unwrap_container(&mut working, &self.tag_policy)?;

        let algorithm =
            ContentEncryptionAlgorithm::from_id(container.get(ALGORITHM_LABEL)?.as_int()?)?;

        let key = if self.recovery.key_encryption() {
            let key_object = container.get(KEY_ENCRYPTION_LABEL)?.as_map()?;
            let key_id = get_key_id(key_object)?;
            get_custom_data(container, &self.custom_data_policy)?;
            let key = self
                .recovery
                .recover_key(key_object, algorithm, key_id.as_ref())?;
            key_object.check_for_unread()?;
            key
        } else {
            let key_id = get_key_id(container)?;
            get_custom_data(container, &self.custom_data_policy)?;
            self.recovery
                .recover_key(container, algorithm, key_id.as_ref())?
        };

        let iv = container.take_byte_string(IV_LABEL)?;
        let tag = container.take_byte_string(TAG_LABEL)?;
        let cipher_text = container.take_byte_string(CIPHER_TEXT_LABEL)?;

        container.check_for_unread()?;

        let auth_data = working.encode();

        tracing::debug!(
            algorithm = algorithm.name(),
            auth_data = auth_data.len(),
            "decrypting envelope"
        );

        Ok(crypto::content_decrypt(
            algorithm,
            &key,
            &iv,
            &cipher_text,
            &auth_data,
            &tag,
        )?)
    }
}
