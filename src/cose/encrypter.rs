// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::constants::*;
use super::crypto_utils::{container_mut, wrap_container};
use super::errors::Error;
use super::policy::ContainerTag;
use super::public_key::encode_public_key;
use crate::cbor::{CborMap, CborValue, MapOrdering};
use crate::crypto::{self, ContentEncryptionAlgorithm, KeyAlgorithm, KeyEncryptionAlgorithm};
use openssl::pkey::{PKey, Public};

/// Sender side counterpart of [`super::KeyRecovery`]
pub trait KeyEncapsulation: Send + Sync {
    fn key_encryption(&self) -> bool {
        true
    }

    /// Produce the content encryption key and record whatever the recipient
    /// needs to recover it in `key_object`
    fn encapsulate(
        &self,
        content_algorithm: ContentEncryptionAlgorithm,
        key_object: &mut CborMap,
    ) -> Result<Vec<u8>, Error>;
}

pub struct SymKeyEncapsulation {
    key: Vec<u8>,
}

impl SymKeyEncapsulation {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }
}

impl KeyEncapsulation for SymKeyEncapsulation {
    fn key_encryption(&self) -> bool {
        false
    }

    fn encapsulate(
        &self,
        content_algorithm: ContentEncryptionAlgorithm,
        _key_object: &mut CborMap,
    ) -> Result<Vec<u8>, Error> {
        if self.key.len() != content_algorithm.key_len() {
            return Err(Error::Crypto(crypto::Error::GeneralSecurity(format!(
                "{} needs a {} byte key, got {}",
                content_algorithm.name(),
                content_algorithm.key_len(),
                self.key.len()
            ))));
        }
        Ok(self.key.clone())
    }
}

pub struct AsymKeyEncapsulation {
    algorithm: KeyEncryptionAlgorithm,
    public_key: PKey<Public>,
    include_public_key: bool,
}

impl AsymKeyEncapsulation {
    pub fn new(algorithm: KeyEncryptionAlgorithm, public_key: PKey<Public>) -> Result<Self, Error> {
        let key_algorithm = KeyAlgorithm::of(&public_key)?;
        let usable = match key_algorithm {
            KeyAlgorithm::Rsa => algorithm.is_rsa(),
            KeyAlgorithm::Ed25519 | KeyAlgorithm::Ed448 => false,
            _ => !algorithm.is_rsa(),
        };
        if !usable {
            return Err(crypto::Error::AlgorithmKeyMismatch(format!(
                "{key_algorithm:?} key is incompatible with {}",
                algorithm.name()
            ))
            .into());
        }

        Ok(Self {
            algorithm,
            public_key,
            include_public_key: false,
        })
    }

    /// Embed the recipient's public key (label 4) in the key object
    pub fn with_public_key(mut self, include: bool) -> Self {
        self.include_public_key = include;
        self
    }
}

impl KeyEncapsulation for AsymKeyEncapsulation {
    fn encapsulate(
        &self,
        content_algorithm: ContentEncryptionAlgorithm,
        key_object: &mut CborMap,
    ) -> Result<Vec<u8>, Error> {
        let ordering = key_object.ordering();

        key_object.set(ALGORITHM_LABEL, self.algorithm.id())?;
        if self.include_public_key {
            key_object.set(
                PUBLIC_KEY_LABEL,
                encode_public_key(&self.public_key, ordering)?,
            )?;
        }

        if self.algorithm.is_rsa() {
            let key = crypto::random_bytes(content_algorithm.key_len())?;
            let encrypted_key = crypto::rsa_encrypt_key(self.algorithm, &self.public_key, &key)?;
            key_object.set(CIPHER_TEXT_LABEL, encrypted_key)?;
            return Ok(key);
        }

        let ephemeral = crypto::generate_ephemeral(&self.public_key)?;
        let shared =
            crypto::key_agreement(self.algorithm, content_algorithm, &ephemeral, &self.public_key)?;
        key_object.set(EPHEMERAL_KEY_LABEL, encode_public_key(&ephemeral, ordering)?)?;

        if self.algorithm.key_wrap_len().is_none() {
            return Ok(shared);
        }

        let key = crypto::random_bytes(content_algorithm.key_len())?;
        key_object.set(CIPHER_TEXT_LABEL, crypto::aes_key_wrap(&shared, &key)?)?;
        Ok(key)
    }
}

/// Produces envelopes; the structural mirror of [`super::Decrypter`]
pub struct Encrypter<E> {
    algorithm: ContentEncryptionAlgorithm,
    encapsulation: E,
    key_id: Option<CborValue>,
    tag: Option<ContainerTag>,
    custom_data: Option<CborValue>,
    ordering: MapOrdering,
}

impl<E: KeyEncapsulation> Encrypter<E> {
    pub fn new(algorithm: ContentEncryptionAlgorithm, encapsulation: E) -> Self {
        Self {
            algorithm,
            encapsulation,
            key_id: None,
            tag: None,
            custom_data: None,
            ordering: MapOrdering::default(),
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<CborValue>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_tag(mut self, tag: ContainerTag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_custom_data(mut self, custom_data: impl Into<CborValue>) -> Self {
        self.custom_data = Some(custom_data.into());
        self
    }

    pub fn with_ordering(mut self, ordering: MapOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn encrypt(&self, plain_text: &[u8]) -> Result<CborValue, Error> {
        let mut container = CborMap::with_ordering(self.ordering);
        container.set(ALGORITHM_LABEL, self.algorithm.id())?;
        if let Some(custom_data) = &self.custom_data {
            container.set(CUSTOM_DATA_LABEL, custom_data)?;
        }

        let key = if self.encapsulation.key_encryption() {
            let mut key_object = CborMap::with_ordering(self.ordering);
            if let Some(key_id) = &self.key_id {
                key_object.set(KEY_ID_LABEL, key_id)?;
            }
            let key = self.encapsulation.encapsulate(self.algorithm, &mut key_object)?;
            container.set(KEY_ENCRYPTION_LABEL, key_object)?;
            key
        } else {
            if let Some(key_id) = &self.key_id {
                container.set(KEY_ID_LABEL, key_id)?;
            }
            self.encapsulation.encapsulate(self.algorithm, &mut container)?
        };

        let mut envelope = wrap_container(container, self.tag.as_ref())?;
        let auth_data = envelope.encode();

        let iv = crypto::random_bytes(self.algorithm.iv_len())?;
        let (cipher_text, tag) =
            crypto::content_encrypt(self.algorithm, &key, &iv, plain_text, &auth_data)?;

        tracing::debug!(
            algorithm = self.algorithm.name(),
            plain_text = plain_text.len(),
            "encrypted envelope"
        );

        container_mut(&mut envelope)?
            .set(TAG_LABEL, tag)?
            .set(IV_LABEL, iv)?
            .set(CIPHER_TEXT_LABEL, cipher_text)?;

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::decrypter::{AsymKeyRecovery, Decrypter, SymKeyRecovery};
    use crate::cose::policy::{AcceptAll, Policy};
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;
    use openssl::pkey::Private;
    use openssl::rsa::Rsa;

    const KEY: [u8; 16] = [0x5c; 16];

    fn sym_encrypter() -> Encrypter<SymKeyEncapsulation> {
        Encrypter::new(
            ContentEncryptionAlgorithm::A128Gcm,
            SymKeyEncapsulation::new(KEY.to_vec()),
        )
    }

    fn sym_decrypter() -> Decrypter<SymKeyRecovery> {
        Decrypter::new(SymKeyRecovery::new_fixed(KEY.to_vec()))
    }

    fn public_of(key: &PKey<Private>) -> PKey<Public> {
        PKey::public_key_from_der(&key.public_key_to_der().unwrap()).unwrap()
    }

    fn container(envelope: &mut CborValue) -> &mut CborMap {
        container_mut(envelope).unwrap()
    }

    #[test]
    fn end_to_end() {
        let envelope = sym_encrypter().encrypt(&[1, 2, 3]).unwrap();

        assert_eq!(sym_decrypter().decrypt(&envelope).unwrap(), [1, 2, 3]);

        let other = Decrypter::new(SymKeyRecovery::new_fixed(vec![0x5d; 16]));
        assert_eq!(other.decrypt(&envelope), Err(Error::AuthenticationFailure));
    }

    #[test]
    fn caller_value_untouched() {
        let envelope = sym_encrypter().encrypt(b"hello").unwrap();
        let before = envelope.encode();

        sym_decrypter().decrypt(&envelope).unwrap();
        assert_eq!(envelope.encode(), before);

        // a second decryption of the same value must see fresh read state
        assert_eq!(sym_decrypter().decrypt(&envelope).unwrap(), b"hello");
    }

    #[test]
    fn wire_round_trip() {
        for algorithm in [
            ContentEncryptionAlgorithm::A128Gcm,
            ContentEncryptionAlgorithm::A192Gcm,
            ContentEncryptionAlgorithm::A256Gcm,
            ContentEncryptionAlgorithm::A128CbcHs256,
            ContentEncryptionAlgorithm::A256CbcHs512,
        ] {
            let key = crypto::random_bytes(algorithm.key_len()).unwrap();
            let encrypter =
                Encrypter::new(algorithm, SymKeyEncapsulation::new(key.clone())).with_key_id("k1");
            let bytes = encrypter.encrypt(b"the data").unwrap().encode();

            let decrypter = Decrypter::new(SymKeyRecovery::new(move |key_id, _| {
                match key_id.and_then(|k| k.as_text().ok()) {
                    Some("k1") => Ok(key.clone()),
                    _ => Err(Error::KeyLocator("unknown key".to_string())),
                }
            }));
            let envelope = CborValue::decode(&bytes).unwrap();
            assert_eq!(decrypter.decrypt(&envelope).unwrap(), b"the data");
        }
    }

    #[test]
    fn tamper_detection() {
        let envelope = sym_encrypter().encrypt(&[1, 2, 3]).unwrap();

        for label in [CIPHER_TEXT_LABEL, IV_LABEL, TAG_LABEL] {
            let mut tampered = envelope.clone();
            let c = container(&mut tampered);
            let mut bytes = c.take_byte_string(label).unwrap();
            bytes[0] ^= 0x01;
            c.set(label, bytes).unwrap();

            assert_eq!(
                sym_decrypter().decrypt(&tampered),
                Err(Error::AuthenticationFailure)
            );
        }

        // both take a 32 byte key
        let key = vec![0x33u8; 32];
        let envelope = Encrypter::new(
            ContentEncryptionAlgorithm::A256Gcm,
            SymKeyEncapsulation::new(key.clone()),
        )
        .encrypt(&[1, 2, 3])
        .unwrap();
        let mut tampered = envelope.clone();
        let c = container(&mut tampered);
        c.remove(ALGORITHM_LABEL).unwrap();
        c.set(ALGORITHM_LABEL, ContentEncryptionAlgorithm::A128CbcHs256.id())
            .unwrap();
        assert_eq!(
            Decrypter::new(SymKeyRecovery::new_fixed(key)).decrypt(&tampered),
            Err(Error::AuthenticationFailure)
        );
    }

    fn replace(envelope: &CborValue, label: i64, value: &str) -> CborValue {
        let mut tampered = envelope.clone();
        let c = container(&mut tampered);
        c.remove(label).unwrap();
        c.set(label, value).unwrap();
        tampered
    }

    #[test]
    fn authenticated_fields() {
        let envelope = sym_encrypter()
            .with_key_id("k1")
            .with_custom_data("x")
            .encrypt(&[1, 2, 3])
            .unwrap();
        let decrypter = sym_decrypter().with_custom_data_policy(Policy::Mandatory, AcceptAll);
        assert_eq!(decrypter.decrypt(&envelope).unwrap(), [1, 2, 3]);

        // the locator ignores the key id, only the authenticated data changes
        assert_eq!(
            decrypter.decrypt(&replace(&envelope, KEY_ID_LABEL, "k2")),
            Err(Error::AuthenticationFailure)
        );
        assert_eq!(
            decrypter.decrypt(&replace(&envelope, CUSTOM_DATA_LABEL, "y")),
            Err(Error::AuthenticationFailure)
        );
    }

    #[test]
    fn ephemeral_key_tampering() {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let private_key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        let other = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        for algorithm in [KeyEncryptionAlgorithm::EcdhEs, KeyEncryptionAlgorithm::EcdhEsA128Kw] {
            let encapsulation =
                AsymKeyEncapsulation::new(algorithm, public_of(&private_key)).unwrap();
            let envelope = Encrypter::new(ContentEncryptionAlgorithm::A128Gcm, encapsulation)
                .encrypt(b"agreed")
                .unwrap();

            let mut tampered = envelope.clone();
            let key_object = container(&mut tampered)
                .get_mut(KEY_ENCRYPTION_LABEL)
                .unwrap()
                .as_map_mut()
                .unwrap();
            key_object.remove(EPHEMERAL_KEY_LABEL).unwrap();
            key_object
                .set(
                    EPHEMERAL_KEY_LABEL,
                    encode_public_key(&other, MapOrdering::Bytewise).unwrap(),
                )
                .unwrap();

            let decrypter = Decrypter::new(AsymKeyRecovery::new_fixed(private_key.clone()));
            assert_eq!(decrypter.decrypt(&envelope).unwrap(), b"agreed");
            assert_eq!(
                decrypter.decrypt(&tampered),
                Err(Error::AuthenticationFailure)
            );
        }
    }

    #[test]
    fn unread_field_rejected() {
        let mut envelope = sym_encrypter().encrypt(&[1, 2, 3]).unwrap();
        container(&mut envelope).set(99, "surprise").unwrap();

        assert!(matches!(
            sym_decrypter().decrypt(&envelope),
            Err(Error::MalformedStructure(_))
        ));
    }

    #[test]
    fn unknown_algorithm() {
        let mut envelope = sym_encrypter().encrypt(&[1, 2, 3]).unwrap();
        let c = container(&mut envelope);
        c.remove(ALGORITHM_LABEL).unwrap();
        c.set(ALGORITHM_LABEL, 4711).unwrap();

        assert!(matches!(
            sym_decrypter().decrypt(&envelope),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn tag_and_custom_data_policies() {
        let encrypter = sym_encrypter()
            .with_tag(ContainerTag::TypedObject("https://example.com/t".to_string()))
            .with_custom_data(vec![CborValue::from(1), CborValue::from("x")]);
        let envelope = encrypter.encrypt(b"p").unwrap();

        // defaults forbid both
        assert!(matches!(
            sym_decrypter().decrypt(&envelope),
            Err(Error::PolicyViolation(_))
        ));
        assert!(matches!(
            sym_decrypter()
                .with_tag_policy(Policy::Optional, AcceptAll)
                .decrypt(&envelope),
            Err(Error::PolicyViolation(_))
        ));

        let decrypter = sym_decrypter()
            .with_tag_policy(Policy::Mandatory, |tag: &CborValue| -> Result<(), Error> {
                match tag.as_tag()?.1.as_array()?.first().map(|t| t.as_text()) {
                    Some(Ok("https://example.com/t")) => Ok(()),
                    _ => Err(Error::PolicyViolation("unexpected type".to_string())),
                }
            })
            .with_custom_data_policy(Policy::Optional, AcceptAll);
        assert_eq!(decrypter.decrypt(&envelope).unwrap(), b"p");

        // mandatory tag, untagged envelope
        let plain = sym_encrypter().encrypt(b"p").unwrap();
        assert!(matches!(
            decrypter.decrypt(&plain),
            Err(Error::PolicyViolation(_))
        ));

        // the tag is authenticated
        let mut retagged = envelope.clone();
        if let CborValue::Tag(t) = &mut retagged {
            if let CborValue::Array(items) = t.item_mut() {
                items[0] = CborValue::from("https://example.com/u");
            }
        }
        let lenient = sym_decrypter()
            .with_tag_policy(Policy::Mandatory, AcceptAll)
            .with_custom_data_policy(Policy::Mandatory, AcceptAll);
        assert_eq!(
            lenient.decrypt(&retagged),
            Err(Error::AuthenticationFailure)
        );
    }

    #[test]
    fn rsa_oaep() {
        let private_key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        for algorithm in [
            KeyEncryptionAlgorithm::RsaOaep,
            KeyEncryptionAlgorithm::RsaOaep256,
        ] {
            let encapsulation = AsymKeyEncapsulation::new(algorithm, public_of(&private_key))
                .unwrap()
                .with_public_key(true);
            let envelope =
                Encrypter::new(ContentEncryptionAlgorithm::A256Gcm, encapsulation)
                    .with_key_id(7)
                    .encrypt(b"secret")
                    .unwrap();

            let expected = private_key.clone();
            let decrypter = Decrypter::new(AsymKeyRecovery::new(
                move |public_key, key_id, _, _| {
                    assert!(public_key.unwrap().public_eq(&expected));
                    assert_eq!(key_id, Some(&CborValue::from(7)));
                    Ok(expected.clone())
                },
            ));
            assert_eq!(decrypter.decrypt(&envelope).unwrap(), b"secret");
        }
    }

    #[test]
    fn ecdh() {
        let keys = [
            PKey::from_ec_key(
                EcKey::generate(&EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap())
                    .unwrap(),
            )
            .unwrap(),
            PKey::from_ec_key(
                EcKey::generate(&EcGroup::from_curve_name(Nid::SECP521R1).unwrap()).unwrap(),
            )
            .unwrap(),
            PKey::generate_x25519().unwrap(),
        ];

        for private_key in keys {
            for algorithm in [
                KeyEncryptionAlgorithm::EcdhEs,
                KeyEncryptionAlgorithm::EcdhEsA128Kw,
                KeyEncryptionAlgorithm::EcdhEsA256Kw,
            ] {
                let encapsulation =
                    AsymKeyEncapsulation::new(algorithm, public_of(&private_key)).unwrap();
                let envelope =
                    Encrypter::new(ContentEncryptionAlgorithm::A128CbcHs256, encapsulation)
                        .with_ordering(MapOrdering::LengthFirst)
                        .encrypt(b"agreed")
                        .unwrap();

                let decrypter =
                    Decrypter::new(AsymKeyRecovery::new_fixed(private_key.clone()));
                assert_eq!(decrypter.decrypt(&envelope).unwrap(), b"agreed");

                let stranger = Decrypter::new(AsymKeyRecovery::new_fixed(
                    PKey::generate_x25519().unwrap(),
                ));
                assert!(stranger.decrypt(&envelope).is_err());
            }
        }
    }

    #[test]
    fn incompatible_key() {
        let ed = PKey::generate_ed25519().unwrap();
        assert!(AsymKeyEncapsulation::new(KeyEncryptionAlgorithm::EcdhEs, public_of(&ed)).is_err());

        let rsa = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        assert!(
            AsymKeyEncapsulation::new(KeyEncryptionAlgorithm::EcdhEs, public_of(&rsa)).is_err()
        );
    }

    #[test]
    fn sym_key_length_checked() {
        let encrypter = Encrypter::new(
            ContentEncryptionAlgorithm::A256Gcm,
            SymKeyEncapsulation::new(KEY.to_vec()),
        );
        assert_eq!(
            encrypter.encrypt(b"x"),
            Err(Error::Crypto(crypto::Error::GeneralSecurity(
                "A256GCM needs a 32 byte key, got 16".to_string()
            )))
        );
    }
}
