// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasParams, Id, PKeyRef};

/// Symmetric content encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncryptionAlgorithm {
    A128Gcm,
    A192Gcm,
    A256Gcm,
    A128CbcHs256,
    A256CbcHs512,
}

impl ContentEncryptionAlgorithm {
    pub const ALL: [Self; 5] = [
        Self::A128Gcm,
        Self::A192Gcm,
        Self::A256Gcm,
        Self::A128CbcHs256,
        Self::A256CbcHs512,
    ];

    /// Lookup by JOSE name, e.g. from a command line
    pub fn from_name(name: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))
    }

    pub fn from_id(id: i64) -> Result<Self, Error> {
        match id {
            1 => Ok(Self::A128Gcm),
            2 => Ok(Self::A192Gcm),
            3 => Ok(Self::A256Gcm),
            200 => Ok(Self::A128CbcHs256),
            201 => Ok(Self::A256CbcHs512),
            _ => Err(Error::UnknownAlgorithm(format!(
                "content encryption algorithm {id}"
            ))),
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::A128Gcm => 1,
            Self::A192Gcm => 2,
            Self::A256Gcm => 3,
            Self::A128CbcHs256 => 200,
            Self::A256CbcHs512 => 201,
        }
    }

    /// JOSE name, also used as the Concat KDF algorithm identifier
    pub fn name(&self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A256CbcHs512 => "A256CBC-HS512",
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm | Self::A128CbcHs256 => 32,
            Self::A256CbcHs512 => 64,
        }
    }

    pub fn iv_len(&self) -> usize {
        if self.is_gcm() {
            12
        } else {
            16
        }
    }

    pub fn tag_len(&self) -> usize {
        match self {
            Self::A256CbcHs512 => 32,
            _ => 16,
        }
    }

    pub fn is_gcm(&self) -> bool {
        matches!(self, Self::A128Gcm | Self::A192Gcm | Self::A256Gcm)
    }
}

/// Algorithms used to transport or derive the content encryption key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEncryptionAlgorithm {
    EcdhEs,
    EcdhEsA128Kw,
    EcdhEsA192Kw,
    EcdhEsA256Kw,
    RsaOaep,
    RsaOaep256,
}

impl KeyEncryptionAlgorithm {
    pub const ALL: [Self; 6] = [
        Self::EcdhEs,
        Self::EcdhEsA128Kw,
        Self::EcdhEsA192Kw,
        Self::EcdhEsA256Kw,
        Self::RsaOaep,
        Self::RsaOaep256,
    ];

    /// Lookup by JOSE name, e.g. from a command line
    pub fn from_name(name: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))
    }

    pub fn from_id(id: i64) -> Result<Self, Error> {
        match id {
            -25 => Ok(Self::EcdhEs),
            -29 => Ok(Self::EcdhEsA128Kw),
            -30 => Ok(Self::EcdhEsA192Kw),
            -31 => Ok(Self::EcdhEsA256Kw),
            -40 => Ok(Self::RsaOaep),
            -41 => Ok(Self::RsaOaep256),
            _ => Err(Error::UnknownAlgorithm(format!(
                "key encryption algorithm {id}"
            ))),
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::EcdhEs => -25,
            Self::EcdhEsA128Kw => -29,
            Self::EcdhEsA192Kw => -30,
            Self::EcdhEsA256Kw => -31,
            Self::RsaOaep => -40,
            Self::RsaOaep256 => -41,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::EcdhEs => "ECDH-ES",
            Self::EcdhEsA128Kw => "ECDH-ES+A128KW",
            Self::EcdhEsA192Kw => "ECDH-ES+A192KW",
            Self::EcdhEsA256Kw => "ECDH-ES+A256KW",
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
        }
    }

    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RsaOaep | Self::RsaOaep256)
    }

    /// AES key wrap key length, for the ECDH-ES+AxxxKW family
    pub fn key_wrap_len(&self) -> Option<usize> {
        match self {
            Self::EcdhEsA128Kw => Some(16),
            Self::EcdhEsA192Kw => Some(24),
            Self::EcdhEsA256Kw => Some(32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HmacAlgorithm {
    Hs256,
    Hs384,
    Hs512,
}

impl HmacAlgorithm {
    pub const ALL: [Self; 3] = [Self::Hs256, Self::Hs384, Self::Hs512];

    /// Lookup by JOSE name, e.g. from a command line
    pub fn from_name(name: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))
    }

    pub fn from_id(id: i64) -> Result<Self, Error> {
        match id {
            5 => Ok(Self::Hs256),
            6 => Ok(Self::Hs384),
            7 => Ok(Self::Hs512),
            _ => Err(Error::UnknownAlgorithm(format!("HMAC algorithm {id}"))),
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Hs256 => 5,
            Self::Hs384 => 6,
            Self::Hs512 => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
        }
    }

    pub fn digest(&self) -> MessageDigest {
        match self {
            Self::Hs256 => MessageDigest::sha256(),
            Self::Hs384 => MessageDigest::sha384(),
            Self::Hs512 => MessageDigest::sha512(),
        }
    }
}

/// Broad key families; signature algorithms are bound to exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Rsa,
    Ec,
    Edwards,
    Montgomery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsymSignatureAlgorithm {
    Es256,
    Es384,
    Es512,
    EdDsa,
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
}

impl AsymSignatureAlgorithm {
    pub const ALL: [Self; 10] = [
        Self::Es256,
        Self::Es384,
        Self::Es512,
        Self::EdDsa,
        Self::Rs256,
        Self::Rs384,
        Self::Rs512,
        Self::Ps256,
        Self::Ps384,
        Self::Ps512,
    ];

    /// Lookup by JOSE name, e.g. from a command line
    pub fn from_name(name: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))
    }

    pub fn from_id(id: i64) -> Result<Self, Error> {
        match id {
            -7 => Ok(Self::Es256),
            -35 => Ok(Self::Es384),
            -36 => Ok(Self::Es512),
            -8 => Ok(Self::EdDsa),
            -257 => Ok(Self::Rs256),
            -258 => Ok(Self::Rs384),
            -259 => Ok(Self::Rs512),
            -37 => Ok(Self::Ps256),
            -38 => Ok(Self::Ps384),
            -39 => Ok(Self::Ps512),
            _ => Err(Error::UnknownAlgorithm(format!("signature algorithm {id}"))),
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::Es384 => -35,
            Self::Es512 => -36,
            Self::EdDsa => -8,
            Self::Rs256 => -257,
            Self::Rs384 => -258,
            Self::Rs512 => -259,
            Self::Ps256 => -37,
            Self::Ps384 => -38,
            Self::Ps512 => -39,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
            Self::EdDsa => "EdDSA",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Ps256 => "PS256",
            Self::Ps384 => "PS384",
            Self::Ps512 => "PS512",
        }
    }

    /// `None` for EdDSA, which hashes internally
    pub fn digest(&self) -> Option<MessageDigest> {
        match self {
            Self::Es256 | Self::Rs256 | Self::Ps256 => Some(MessageDigest::sha256()),
            Self::Es384 | Self::Rs384 | Self::Ps384 => Some(MessageDigest::sha384()),
            Self::Es512 | Self::Rs512 | Self::Ps512 => Some(MessageDigest::sha512()),
            Self::EdDsa => None,
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Es256 | Self::Es384 | Self::Es512 => KeyType::Ec,
            Self::EdDsa => KeyType::Edwards,
            _ => KeyType::Rsa,
        }
    }

    pub fn is_pss(&self) -> bool {
        matches!(self, Self::Ps256 | Self::Ps384 | Self::Ps512)
    }
}

/// Concrete key algorithm of a native key: RSA or a named curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Rsa,
    P256,
    P384,
    P521,
    X25519,
    X448,
    Ed25519,
    Ed448,
}

impl KeyAlgorithm {
    pub fn of<T: HasParams>(key: &PKeyRef<T>) -> Result<Self, Error> {
        match key.id() {
            Id::RSA => Ok(Self::Rsa),
            Id::EC => {
                let nid = key.ec_key()?.group().curve_name();
                match nid {
                    Some(Nid::X9_62_PRIME256V1) => Ok(Self::P256),
                    Some(Nid::SECP384R1) => Ok(Self::P384),
                    Some(Nid::SECP521R1) => Ok(Self::P521),
                    _ => Err(Error::GeneralSecurity(format!(
                        "unsupported EC curve {nid:?}"
                    ))),
                }
            }
            Id::X25519 => Ok(Self::X25519),
            Id::X448 => Ok(Self::X448),
            Id::ED25519 => Ok(Self::Ed25519),
            Id::ED448 => Ok(Self::Ed448),
            id => Err(Error::GeneralSecurity(format!("unsupported key type {id:?}"))),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa => KeyType::Rsa,
            Self::P256 | Self::P384 | Self::P521 => KeyType::Ec,
            Self::Ed25519 | Self::Ed448 => KeyType::Edwards,
            Self::X25519 | Self::X448 => KeyType::Montgomery,
        }
    }

    /// OpenSSL curve name, for the Weierstrass curves only
    pub fn nid(&self) -> Option<Nid> {
        match self {
            Self::P256 => Some(Nid::X9_62_PRIME256V1),
            Self::P384 => Some(Nid::SECP384R1),
            Self::P521 => Some(Nid::SECP521R1),
            _ => None,
        }
    }

    /// Byte length of a coordinate, scalar, or raw public point
    pub fn field_len(&self) -> Option<usize> {
        match self {
            Self::Rsa => None,
            Self::P256 | Self::X25519 | Self::Ed25519 => Some(32),
            Self::P384 => Some(48),
            Self::P521 => Some(66),
            Self::X448 => Some(56),
            Self::Ed448 => Some(57),
        }
    }

    pub fn pkey_id(&self) -> Id {
        match self {
            Self::Rsa => Id::RSA,
            Self::P256 | Self::P384 | Self::P521 => Id::EC,
            Self::X25519 => Id::X25519,
            Self::X448 => Id::X448,
            Self::Ed25519 => Id::ED25519,
            Self::Ed448 => Id::ED448,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::pkey::PKey;

    #[test]
    fn id_round_trip() {
        for id in [1, 2, 3, 200, 201] {
            assert_eq!(ContentEncryptionAlgorithm::from_id(id).unwrap().id(), id);
        }
        for id in [-25, -29, -30, -31, -40, -41] {
            assert_eq!(KeyEncryptionAlgorithm::from_id(id).unwrap().id(), id);
        }
        for id in [-7, -8, -35, -36, -37, -38, -39, -257, -258, -259] {
            assert_eq!(AsymSignatureAlgorithm::from_id(id).unwrap().id(), id);
        }
        for id in [5, 6, 7] {
            assert_eq!(HmacAlgorithm::from_id(id).unwrap().id(), id);
        }
    }

    #[test]
    fn names() {
        assert_eq!(
            ContentEncryptionAlgorithm::from_name("a128cbc-hs256").unwrap(),
            ContentEncryptionAlgorithm::A128CbcHs256
        );
        assert_eq!(
            KeyEncryptionAlgorithm::from_name("ECDH-ES+A256KW").unwrap(),
            KeyEncryptionAlgorithm::EcdhEsA256Kw
        );
        assert_eq!(
            AsymSignatureAlgorithm::from_name("EdDSA").unwrap(),
            AsymSignatureAlgorithm::EdDsa
        );
        assert!(HmacAlgorithm::from_name("HS1").is_err());
    }

    #[test]
    fn unknown_ids() {
        assert!(matches!(
            ContentEncryptionAlgorithm::from_id(4),
            Err(Error::UnknownAlgorithm(_))
        ));
        assert!(matches!(
            AsymSignatureAlgorithm::from_id(-6),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn key_algorithm_of_native_keys() {
        let group = EcGroup::from_curve_name(Nid::SECP384R1).unwrap();
        let ec = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        assert_eq!(KeyAlgorithm::of(&ec).unwrap(), KeyAlgorithm::P384);

        let ed = PKey::generate_ed25519().unwrap();
        assert_eq!(KeyAlgorithm::of(&ed).unwrap(), KeyAlgorithm::Ed25519);
        assert_eq!(KeyAlgorithm::Ed25519.key_type(), KeyType::Edwards);

        let x = PKey::generate_x25519().unwrap();
        assert_eq!(KeyAlgorithm::of(&x).unwrap().key_type(), KeyType::Montgomery);
    }
}
