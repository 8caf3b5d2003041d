// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::constants::*;
use super::crypto_utils::{container_mut, get_custom_data, get_key_id, unwrap_container};
use super::errors::Error;
use super::policy::{Collector, Policy, PolicyHandler};
use super::public_key::decode_public_key;
use crate::cbor::{CborMap, CborValue};
use crate::crypto::{self, AsymSignatureAlgorithm, HmacAlgorithm, SignatureWrapper};
use openssl::pkey::{PKey, Public};

/// Signature check behind [`Validator`].  Must read every signature object
/// entry it relies on so that the unread check sees them as consumed.
pub trait SignatureVerification: Send + Sync {
    fn verify(
        &self,
        algorithm: i64,
        signature_object: &CborMap,
        key_id: Option<&CborValue>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error>;
}

type HmacKeyLocator =
    dyn Fn(Option<&CborValue>, HmacAlgorithm) -> Result<Vec<u8>, Error> + Send + Sync;

pub struct HmacVerifier {
    locator: Box<HmacKeyLocator>,
}

impl HmacVerifier {
    pub fn new<F>(locator: F) -> Self
    where
        F: Fn(Option<&CborValue>, HmacAlgorithm) -> Result<Vec<u8>, Error> + Send + Sync + 'static,
    {
        Self {
            locator: Box::new(locator),
        }
    }

    pub fn new_fixed(key: Vec<u8>) -> Self {
        Self::new(move |_, _| Ok(key.clone()))
    }
}

impl SignatureVerification for HmacVerifier {
    fn verify(
        &self,
        algorithm: i64,
        _signature_object: &CborMap,
        key_id: Option<&CborValue>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        let algorithm = HmacAlgorithm::from_id(algorithm)?;
        let key = (self.locator)(key_id, algorithm)?;

        if crypto::hmac_verify(algorithm, &key, data, signature)? {
            Ok(())
        } else {
            Err(Error::AuthenticationFailure)
        }
    }
}

type PublicKeyLocator = dyn Fn(
        Option<&PKey<Public>>,
        Option<&CborValue>,
        AsymSignatureAlgorithm,
    ) -> Result<PKey<Public>, Error>
    + Send
    + Sync;

pub struct AsymVerifier {
    locator: Box<PublicKeyLocator>,
}

impl AsymVerifier {
    /// `locator` receives the embedded public key (label 4) if there is one
    pub fn new<F>(locator: F) -> Self
    where
        F: Fn(
                Option<&PKey<Public>>,
                Option<&CborValue>,
                AsymSignatureAlgorithm,
            ) -> Result<PKey<Public>, Error>
            + Send
            + Sync
            + 'static,
    {
        Self {
            locator: Box::new(locator),
        }
    }

    /// Verify with `public_key`; an embedded public key must be the same key
    pub fn new_fixed(public_key: PKey<Public>) -> Self {
        Self::new(move |embedded, _, _| match embedded {
            Some(k) if !k.public_eq(&public_key) => Err(Error::KeyLocator(
                "embedded public key does not match".to_string(),
            )),
            _ => Ok(public_key.clone()),
        })
    }
}

impl SignatureVerification for AsymVerifier {
    fn verify(
        &self,
        algorithm: i64,
        signature_object: &CborMap,
        key_id: Option<&CborValue>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        let algorithm = AsymSignatureAlgorithm::from_id(algorithm)?;

        let embedded = if signature_object.contains_key(PUBLIC_KEY_LABEL) {
            Some(decode_public_key(
                signature_object.get(PUBLIC_KEY_LABEL)?.as_map()?,
            )?)
        } else {
            None
        };

        let public_key = (self.locator)(embedded.as_ref(), key_id, algorithm)?;

        let mut wrapper = SignatureWrapper::new(algorithm, &public_key)?;
        wrapper.update(data);
        match wrapper.verify(signature) {
            Ok(true) => Ok(()),
            Ok(false) | Err(crypto::Error::SignatureFormat(_)) => Err(Error::AuthenticationFailure),
            Err(e) => Err(e.into()),
        }
    }
}

/// Checks signatures produced by [`super::Signer`]
pub struct Validator<V> {
    verifier: V,
    tag_policy: PolicyHandler,
    custom_data_policy: PolicyHandler,
}

impl<V: SignatureVerification> Validator<V> {
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
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

    /// Validate the signature object found under `label`.  The caller's
    /// value is not modified.
    pub fn validate(&self, label: impl Into<CborValue>, object: &CborValue) -> Result<(), Error> {
        let label = label.into();
        let mut working = object.clone();

        let (algorithm, key_id, signature) = {
            let container = unwrap_container(&mut working, &self.tag_policy)?;
            let signature_object = container.get_mut(&label)?.as_map_mut()?;

            let algorithm = signature_object.get(ALGORITHM_LABEL)?.as_int()?;
            get_custom_data(signature_object, &self.custom_data_policy)?;
            let key_id = get_key_id(signature_object)?;
            let signature = signature_object.take_byte_string(SIGNATURE_LABEL)?;
            (algorithm, key_id, signature)
        };

        let data = working.encode();

        let signature_object = container_mut(&mut working)?.get(&label)?.as_map()?;
        self.verifier
            .verify(algorithm, signature_object, key_id.as_ref(), &data, &signature)?;
        signature_object.check_for_unread()?;

        tracing::debug!(algorithm, label = %label, "signature valid");

        Ok(())
    }
}
