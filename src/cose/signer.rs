// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::constants::*;
use super::crypto_utils::container_mut;
use super::errors::Error;
use super::public_key::encode_public_key;
use crate::cbor::{CborMap, CborValue};
use crate::crypto::{self, AsymSignatureAlgorithm, HmacAlgorithm, SignatureWrapper};
use openssl::pkey::{PKey, Private};

/// Key holder for [`Signer`]
pub trait SignatureProvider: Send + Sync {
    fn algorithm_id(&self) -> i64;

    /// Add provider specific entries, such as a public key, to the
    /// signature object before it is signed
    fn annotate(&self, _signature_object: &mut CborMap) -> Result<(), Error> {
        Ok(())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, Error>;
}

pub struct HmacSigner {
    algorithm: HmacAlgorithm,
    key: Vec<u8>,
}

impl HmacSigner {
    pub fn new(algorithm: HmacAlgorithm, key: Vec<u8>) -> Self {
        Self { algorithm, key }
    }
}

impl SignatureProvider for HmacSigner {
    fn algorithm_id(&self) -> i64 {
        self.algorithm.id()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(crypto::hmac(self.algorithm, &self.key, data)?)
    }
}

pub struct AsymSigner {
    algorithm: AsymSignatureAlgorithm,
    private_key: PKey<Private>,
    include_public_key: bool,
}

impl AsymSigner {
    /// Fails when `private_key` cannot be used with `algorithm`
    pub fn new(
        algorithm: AsymSignatureAlgorithm,
        private_key: PKey<Private>,
    ) -> Result<Self, Error> {
        SignatureWrapper::new(algorithm, &private_key)?;
        Ok(Self {
            algorithm,
            private_key,
            include_public_key: false,
        })
    }

    pub fn with_public_key(mut self, include: bool) -> Self {
        self.include_public_key = include;
        self
    }
}

impl SignatureProvider for AsymSigner {
    fn algorithm_id(&self) -> i64 {
        self.algorithm.id()
    }

    fn annotate(&self, signature_object: &mut CborMap) -> Result<(), Error> {
        if self.include_public_key {
            let ordering = signature_object.ordering();
            signature_object.set(
                PUBLIC_KEY_LABEL,
                encode_public_key(&self.private_key, ordering)?,
            )?;
        }
        Ok(())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut wrapper = SignatureWrapper::new(self.algorithm, &self.private_key)?;
        wrapper.update(data);
        Ok(wrapper.sign()?)
    }
}

/// Embeds a signature object in a map.  The signed data is the encoding of
/// the complete, possibly tagged, value with the signature object present
/// but lacking its signature entry.
pub struct Signer<S> {
    provider: S,
    key_id: Option<CborValue>,
    custom_data: Option<CborValue>,
}

impl<S: SignatureProvider> Signer<S> {
    pub fn new(provider: S) -> Self {
        Self {
            provider,
            key_id: None,
            custom_data: None,
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<CborValue>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_custom_data(mut self, custom_data: impl Into<CborValue>) -> Self {
        self.custom_data = Some(custom_data.into());
        self
    }

    /// Sign `object`, a map or a tagged map, placing the signature object
    /// under `label`.  The signature object uses the ordering of the map it
    /// is placed in.
    pub fn sign(
        &self,
        label: impl Into<CborValue>,
        mut object: CborValue,
    ) -> Result<CborValue, Error> {
        let label = label.into();
        let container = container_mut(&mut object)?;

        let mut signature_object = CborMap::with_ordering(container.ordering());
        signature_object.set(ALGORITHM_LABEL, self.provider.algorithm_id())?;
        if let Some(custom_data) = &self.custom_data {
            signature_object.set(CUSTOM_DATA_LABEL, custom_data)?;
        }
        if let Some(key_id) = &self.key_id {
            signature_object.set(KEY_ID_LABEL, key_id)?;
        }
        self.provider.annotate(&mut signature_object)?;
        container.set(&label, signature_object)?;

        let signature = self.provider.sign(&object.encode())?;
        tracing::debug!(
            algorithm = self.provider.algorithm_id(),
            label = %label,
            "signed object"
        );

        container_mut(&mut object)?
            .get_mut(&label)?
            .as_map_mut()?
            .set(SIGNATURE_LABEL, signature)?;

        Ok(object)
    }
}
