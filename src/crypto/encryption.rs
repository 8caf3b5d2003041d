// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::algorithms::{
    ContentEncryptionAlgorithm, HmacAlgorithm, KeyAlgorithm, KeyEncryptionAlgorithm,
};
use super::errors::Error;
use openssl::aes::{self, AesKey};
use openssl::derive::Deriver;
use openssl::ec::{EcGroup, EcKey};
use openssl::encrypt::{Decrypter, Encrypter};
use openssl::hash::{hash, MessageDigest};
use openssl::memcmp;
use openssl::pkey::{HasParams, HasPrivate, HasPublic, PKey, PKeyRef, Private};
use openssl::rsa::Padding;
use openssl::sign::Signer;
use openssl::symm::{self, Cipher};

pub fn random_bytes(len: usize) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; len];
    openssl::rand::rand_bytes(&mut buf)?;
    Ok(buf)
}

fn check_len(what: &str, actual: usize, expected: usize) -> Result<(), Error> {
    if actual != expected {
        return Err(Error::GeneralSecurity(format!(
            "{what} must be {expected} bytes, got {actual}"
        )));
    }
    Ok(())
}

fn gcm_cipher(alg: ContentEncryptionAlgorithm) -> Cipher {
    match alg.key_len() {
        16 => Cipher::aes_128_gcm(),
        24 => Cipher::aes_192_gcm(),
        _ => Cipher::aes_256_gcm(),
    }
}

/// CBC cipher and HMAC digest for the AES-CBC-HMAC-SHA2 composites
fn cbc_parameters(alg: ContentEncryptionAlgorithm) -> (Cipher, MessageDigest) {
    match alg {
        ContentEncryptionAlgorithm::A256CbcHs512 => {
            (Cipher::aes_256_cbc(), MessageDigest::sha512())
        }
        _ => (Cipher::aes_128_cbc(), MessageDigest::sha256()),
    }
}

fn hmac_raw(md: MessageDigest, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, Error> {
    let pkey = PKey::hmac(key)?;
    let mut signer = Signer::new(md, &pkey)?;
    for part in parts {
        signer.update(part)?;
    }
    Ok(signer.sign_to_vec()?)
}

fn cbc_tag(
    alg: ContentEncryptionAlgorithm,
    mac_key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, Error> {
    let (_, md) = cbc_parameters(alg);
    let al = ((aad.len() as u64) * 8).to_be_bytes();
    let mut tag = hmac_raw(md, mac_key, &[aad, iv, ciphertext, &al])?;
    tag.truncate(alg.tag_len());
    Ok(tag)
}

/// Authenticated encryption; returns `(ciphertext, tag)`
pub fn content_encrypt(
    alg: ContentEncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    check_len("content encryption key", key.len(), alg.key_len())?;
    check_len("IV", iv.len(), alg.iv_len())?;

    if alg.is_gcm() {
        let mut tag = vec![0u8; alg.tag_len()];
        let ciphertext =
            symm::encrypt_aead(gcm_cipher(alg), key, Some(iv), aad, plaintext, &mut tag)?;
        return Ok((ciphertext, tag));
    }

    let (mac_key, enc_key) = key.split_at(key.len() / 2);
    let (cipher, _) = cbc_parameters(alg);
    let ciphertext = symm::encrypt(cipher, enc_key, Some(iv), plaintext)?;
    let tag = cbc_tag(alg, mac_key, iv, &ciphertext, aad)?;

    Ok((ciphertext, tag))
}

/// Inverse of [`content_encrypt`].  Any integrity failure, including one
/// caused by a wrong key, is reported as [`Error::AuthenticationFailure`].
/// A key whose length does not suit `alg` is a caller error and fails with
/// [`Error::GeneralSecurity`] before anything is decrypted.
pub fn content_decrypt(
    alg: ContentEncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, Error> {
    check_len("content encryption key", key.len(), alg.key_len())?;

    if iv.len() != alg.iv_len() || tag.len() != alg.tag_len() {
        return Err(Error::AuthenticationFailure);
    }

    if alg.is_gcm() {
        return symm::decrypt_aead(gcm_cipher(alg), key, Some(iv), aad, ciphertext, tag)
            .map_err(|_| Error::AuthenticationFailure);
    }

    let (mac_key, enc_key) = key.split_at(key.len() / 2);
    let expected = cbc_tag(alg, mac_key, iv, ciphertext, aad)?;
    if !memcmp::eq(&expected, tag) {
        return Err(Error::AuthenticationFailure);
    }

    let (cipher, _) = cbc_parameters(alg);
    symm::decrypt(cipher, enc_key, Some(iv), ciphertext).map_err(|_| Error::AuthenticationFailure)
}

/// RFC 3394 AES key wrap
pub fn aes_key_wrap(kek: &[u8], key: &[u8]) -> Result<Vec<u8>, Error> {
    let kek = AesKey::new_encrypt(kek)
        .map_err(|_| Error::GeneralSecurity("invalid key wrap key".to_string()))?;
    let mut out = vec![0u8; key.len() + 8];
    let len = aes::wrap_key(&kek, None, &mut out, key)
        .map_err(|_| Error::GeneralSecurity("key wrap failed".to_string()))?;
    out.truncate(len);
    Ok(out)
}

pub fn aes_key_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, Error> {
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(Error::AuthenticationFailure);
    }
    let kek = AesKey::new_decrypt(kek)
        .map_err(|_| Error::GeneralSecurity("invalid key wrap key".to_string()))?;
    let mut out = vec![0u8; wrapped.len() - 8];
    let len = aes::unwrap_key(&kek, None, &mut out, wrapped)
        .map_err(|_| Error::AuthenticationFailure)?;
    out.truncate(len);
    Ok(out)
}

/// JOSE Concat KDF (NIST SP 800-56A) over SHA-256
pub(crate) fn concat_kdf(
    z: &[u8],
    algorithm_id: &str,
    party_u: &[u8],
    party_v: &[u8],
    key_len: usize,
) -> Result<Vec<u8>, Error> {
    let mut other_info = Vec::new();
    for field in [algorithm_id.as_bytes(), party_u, party_v] {
        other_info.extend_from_slice(&(field.len() as u32).to_be_bytes());
        other_info.extend_from_slice(field);
    }
    other_info.extend_from_slice(&((key_len * 8) as u32).to_be_bytes());

    let mut derived = Vec::with_capacity(key_len + 32);
    let mut counter = 1u32;
    while derived.len() < key_len {
        let mut input = counter.to_be_bytes().to_vec();
        input.extend_from_slice(z);
        input.extend_from_slice(&other_info);
        derived.extend_from_slice(&hash(MessageDigest::sha256(), &input)?);
        counter += 1;
    }
    derived.truncate(key_len);

    Ok(derived)
}

/// Derive the ECDH-ES output key: the content key itself, or the AES key
/// wrap key for the `+AxxxKW` variants.
pub fn key_agreement<T, U>(
    algorithm: KeyEncryptionAlgorithm,
    content: ContentEncryptionAlgorithm,
    private_key: &PKeyRef<T>,
    peer_key: &PKeyRef<U>,
) -> Result<Vec<u8>, Error>
where
    T: HasPrivate,
    U: HasPublic,
{
    if algorithm.is_rsa() {
        return Err(Error::GeneralSecurity(format!(
            "{} is not a key agreement algorithm",
            algorithm.name()
        )));
    }

    let mut deriver = Deriver::new(private_key)?;
    deriver.set_peer(peer_key)?;
    let z = deriver.derive_to_vec()?;

    match algorithm.key_wrap_len() {
        Some(len) => concat_kdf(&z, algorithm.name(), &[], &[], len),
        None => concat_kdf(&z, content.name(), &[], &[], content.key_len()),
    }
}

/// Fresh key pair on the same curve as `peer`, for ECDH-ES senders
pub fn generate_ephemeral<T: HasParams>(peer: &PKeyRef<T>) -> Result<PKey<Private>, Error> {
    let key_algorithm = KeyAlgorithm::of(peer)?;
    match key_algorithm {
        KeyAlgorithm::X25519 => Ok(PKey::generate_x25519()?),
        KeyAlgorithm::X448 => Ok(PKey::generate_x448()?),
        other => match other.nid() {
            Some(nid) => {
                let group = EcGroup::from_curve_name(nid)?;
                Ok(PKey::from_ec_key(EcKey::generate(&group)?)?)
            }
            None => Err(Error::GeneralSecurity(format!(
                "{other:?} keys cannot be used for key agreement"
            ))),
        },
    }
}

fn oaep_digest(algorithm: KeyEncryptionAlgorithm) -> Result<Option<MessageDigest>, Error> {
    match algorithm {
        KeyEncryptionAlgorithm::RsaOaep => Ok(None),
        KeyEncryptionAlgorithm::RsaOaep256 => Ok(Some(MessageDigest::sha256())),
        other => Err(Error::GeneralSecurity(format!(
            "{} is not an RSA algorithm",
            other.name()
        ))),
    }
}

pub fn rsa_encrypt_key<T: HasPublic>(
    algorithm: KeyEncryptionAlgorithm,
    public_key: &PKeyRef<T>,
    key: &[u8],
) -> Result<Vec<u8>, Error> {
    let md = oaep_digest(algorithm)?;

    let mut encrypter = Encrypter::new(public_key)?;
    encrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
    if let Some(md) = md {
        encrypter.set_rsa_oaep_md(md)?;
        encrypter.set_rsa_mgf1_md(md)?;
    }

    let mut out = vec![0u8; encrypter.encrypt_len(key)?];
    let len = encrypter.encrypt(key, &mut out)?;
    out.truncate(len);
    Ok(out)
}

pub fn rsa_decrypt_key<T: HasPrivate>(
    algorithm: KeyEncryptionAlgorithm,
    private_key: &PKeyRef<T>,
    encrypted_key: &[u8],
) -> Result<Vec<u8>, Error> {
    let md = oaep_digest(algorithm)?;

    let mut decrypter = Decrypter::new(private_key)?;
    decrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
    if let Some(md) = md {
        decrypter.set_rsa_oaep_md(md)?;
        decrypter.set_rsa_mgf1_md(md)?;
    }

    let mut out = vec![0u8; decrypter.decrypt_len(encrypted_key)?];
    let len = decrypter
        .decrypt(encrypted_key, &mut out)
        .map_err(|_| Error::AuthenticationFailure)?;
    out.truncate(len);
    Ok(out)
}

pub fn hmac(algorithm: HmacAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    hmac_raw(algorithm.digest(), key, &[data])
}

/// Constant-time comparison against a freshly computed MAC
pub fn hmac_verify(
    algorithm: HmacAlgorithm,
    key: &[u8],
    data: &[u8],
    mac: &[u8],
) -> Result<bool, Error> {
    let expected = hmac(algorithm, key, data)?;
    Ok(expected.len() == mac.len() && memcmp::eq(&expected, mac))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use openssl::nid::Nid;
    use openssl::rsa::Rsa;

    const KERCKHOFFS: &[u8] = b"A cipher system must not be required to be secret, and it \
        must be able to fall into the hands of the enemy without inconvenience";

    #[test]
    fn cbc_hmac_known_answer() {
        let key: Vec<u8> = (0u8..32).collect();
        let iv = hex!("1af38c2dc2b96ffdd86694092341bc04");
        let aad = b"The second principle of Auguste Kerckhoffs";

        let (ciphertext, tag) = content_encrypt(
            ContentEncryptionAlgorithm::A128CbcHs256,
            &key,
            &iv,
            KERCKHOFFS,
            aad,
        )
        .unwrap();

        assert_eq!(
            ciphertext,
            hex!(
                "c80edfa32ddf39d5ef00c0b468834279a2e46a1b8049f792f76bfe54b903a9c9
                 a94ac9b47ad2655c5f10f9aef71427e2fc6f9b3f399a221489f16362c7032336
                 09d45ac69864e3321cf82935ac4096c86e133314c54019e8ca7980dfa4b9cf1b
                 384c486f3a54c51078158ee5d79de59fbd34d848b3d69550a67646344427ade5
                 4b8851ffb598f7f80074b9473c82e2db"
            )
        );
        assert_eq!(tag, hex!("652c3fa36b0a7c5b3219fab3a30bc1c4"));

        let plaintext = content_decrypt(
            ContentEncryptionAlgorithm::A128CbcHs256,
            &key,
            &iv,
            &ciphertext,
            aad,
            &tag,
        )
        .unwrap();
        assert_eq!(plaintext, KERCKHOFFS);
    }

    #[test]
    fn content_round_trip_and_tamper() {
        for alg in [
            ContentEncryptionAlgorithm::A128Gcm,
            ContentEncryptionAlgorithm::A192Gcm,
            ContentEncryptionAlgorithm::A256Gcm,
            ContentEncryptionAlgorithm::A128CbcHs256,
            ContentEncryptionAlgorithm::A256CbcHs512,
        ] {
            let key = random_bytes(alg.key_len()).unwrap();
            let iv = random_bytes(alg.iv_len()).unwrap();
            let (ciphertext, tag) = content_encrypt(alg, &key, &iv, b"secret", b"aad").unwrap();

            assert_eq!(
                content_decrypt(alg, &key, &iv, &ciphertext, b"aad", &tag).unwrap(),
                b"secret"
            );

            assert_eq!(
                content_decrypt(alg, &key, &iv, &ciphertext, b"aaD", &tag),
                Err(Error::AuthenticationFailure)
            );

            let mut bad_tag = tag.clone();
            bad_tag[0] ^= 1;
            assert_eq!(
                content_decrypt(alg, &key, &iv, &ciphertext, b"aad", &bad_tag),
                Err(Error::AuthenticationFailure)
            );

            let other_key = random_bytes(alg.key_len()).unwrap();
            assert_eq!(
                content_decrypt(alg, &other_key, &iv, &ciphertext, b"aad", &tag),
                Err(Error::AuthenticationFailure)
            );
        }
    }

    #[test]
    fn wrong_key_length() {
        assert!(matches!(
            content_encrypt(ContentEncryptionAlgorithm::A256Gcm, &[0; 16], &[0; 12], b"", b""),
            Err(Error::GeneralSecurity(_))
        ));
    }

    #[test]
    fn key_wrap_known_answer() {
        let kek = hex!("000102030405060708090a0b0c0d0e0f");
        let key = hex!("00112233445566778899aabbccddeeff");
        let wrapped = aes_key_wrap(&kek, &key).unwrap();

        assert_eq!(
            wrapped,
            hex!("1fa68b0a8112b447aef34bd8fb5a7b829d3e862371d2cfe5")
        );
        assert_eq!(aes_key_unwrap(&kek, &wrapped).unwrap(), key);

        let mut tampered = wrapped.clone();
        tampered[3] ^= 0x80;
        assert_eq!(
            aes_key_unwrap(&kek, &tampered),
            Err(Error::AuthenticationFailure)
        );
    }

    #[test]
    fn concat_kdf_known_answer() {
        let z = hex!("9e56d91d817135d372834283bf84269cfb316ea3da806a48f6daa7798cfe90c4");

        assert_eq!(
            concat_kdf(&z, "A128GCM", b"Alice", b"Bob", 16).unwrap(),
            hex!("56aa8deaf8236d205c2228cd71a7101a")
        );
    }

    #[test]
    fn key_agreement_is_symmetric() {
        let group = EcGroup::from_curve_name(Nid::SECP384R1).unwrap();
        let recipient = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        for static_key in [recipient, PKey::generate_x25519().unwrap()] {
            let ephemeral = generate_ephemeral(&static_key).unwrap();

            for alg in [
                KeyEncryptionAlgorithm::EcdhEs,
                KeyEncryptionAlgorithm::EcdhEsA192Kw,
            ] {
                let sender = key_agreement(
                    alg,
                    ContentEncryptionAlgorithm::A256CbcHs512,
                    &ephemeral,
                    &static_key,
                )
                .unwrap();
                let receiver = key_agreement(
                    alg,
                    ContentEncryptionAlgorithm::A256CbcHs512,
                    &static_key,
                    &ephemeral,
                )
                .unwrap();

                assert_eq!(sender, receiver);
                assert_eq!(sender.len(), alg.key_wrap_len().unwrap_or(64));
            }
        }
    }

    #[test]
    fn rsa_oaep_round_trip() {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        for alg in [KeyEncryptionAlgorithm::RsaOaep, KeyEncryptionAlgorithm::RsaOaep256] {
            let encrypted = rsa_encrypt_key(alg, &key, &[7; 32]).unwrap();
            assert_eq!(encrypted.len(), 256);
            assert_eq!(rsa_decrypt_key(alg, &key, &encrypted).unwrap(), [7; 32]);
        }

        let encrypted = rsa_encrypt_key(KeyEncryptionAlgorithm::RsaOaep, &key, &[7; 32]).unwrap();
        assert_eq!(
            rsa_decrypt_key(KeyEncryptionAlgorithm::RsaOaep256, &key, &encrypted),
            Err(Error::AuthenticationFailure)
        );
    }

    #[test]
    fn wrong_key_length_is_not_an_integrity_failure() {
        let alg = ContentEncryptionAlgorithm::A256Gcm;
        let iv = [0u8; 12];
        let tag = [0u8; 16];
        assert_eq!(
            content_decrypt(alg, &[0u8; 16], &iv, b"", b"", &tag),
            Err(Error::GeneralSecurity(
                "content encryption key must be 32 bytes, got 16".to_string()
            ))
        );
    }

    #[test]
    fn hmac_known_answer() {
        // RFC 4231 test case 2
        let mac = hmac(HmacAlgorithm::Hs256, b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            mac,
            hex!("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
        let data = b"what do ya want for nothing?";
        assert!(hmac_verify(HmacAlgorithm::Hs256, b"Jefe", data, &mac).unwrap());
        assert!(!hmac_verify(HmacAlgorithm::Hs256, b"Jefe", data, &mac[..31]).unwrap());
    }
}
