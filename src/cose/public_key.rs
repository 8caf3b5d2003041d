// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::constants::*;
use super::errors::Error;
use crate::cbor::{CborMap, CborValue, MapOrdering};
use crate::crypto::{self, KeyAlgorithm, KeyType};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::pkey::{HasPublic, PKey, PKeyRef, Public};
use openssl::rsa::Rsa;

fn security(msg: String) -> Error {
    crypto::Error::GeneralSecurity(msg).into()
}

fn cose_curve(alg: KeyAlgorithm) -> Option<i64> {
    match alg {
        KeyAlgorithm::P256 => Some(COSE_CRV_P256),
        KeyAlgorithm::P384 => Some(COSE_CRV_P384),
        KeyAlgorithm::P521 => Some(COSE_CRV_P521),
        KeyAlgorithm::X25519 => Some(COSE_CRV_X25519),
        KeyAlgorithm::X448 => Some(COSE_CRV_X448),
        KeyAlgorithm::Ed25519 => Some(COSE_CRV_ED25519),
        KeyAlgorithm::Ed448 => Some(COSE_CRV_ED448),
        KeyAlgorithm::Rsa => None,
    }
}

fn key_algorithm(crv: &CborValue) -> Result<KeyAlgorithm, Error> {
    let crv = crv.as_int()?;
    match crv {
        COSE_CRV_P256 => Ok(KeyAlgorithm::P256),
        COSE_CRV_P384 => Ok(KeyAlgorithm::P384),
        COSE_CRV_P521 => Ok(KeyAlgorithm::P521),
        COSE_CRV_X25519 => Ok(KeyAlgorithm::X25519),
        COSE_CRV_X448 => Ok(KeyAlgorithm::X448),
        COSE_CRV_ED25519 => Ok(KeyAlgorithm::Ed25519),
        COSE_CRV_ED448 => Ok(KeyAlgorithm::Ed448),
        _ => Err(security(format!("no such key/curve algorithm: {crv}"))),
    }
}

fn crypto_binary(value: &CborValue) -> Result<BigNum, Error> {
    let bytes = value.as_bytes()?;
    match bytes.first() {
        None | Some(0) => Err(security(
            "RSA key parameter contains leading zeroes".to_string(),
        )),
        _ => Ok(BigNum::from_slice(bytes).map_err(crypto::Error::from)?),
    }
}

fn curve_point(value: &CborValue, alg: KeyAlgorithm) -> Result<BigNum, Error> {
    let bytes = value.as_bytes()?;
    if Some(bytes.len()) != alg.field_len() {
        return Err(security(
            "public EC key parameter is not normalized".to_string(),
        ));
    }
    Ok(BigNum::from_slice(bytes).map_err(crypto::Error::from)?)
}

/// Encode a public key as a COSE key map.  Private keys are accepted; only
/// their public part is emitted.
pub fn encode_public_key<T: HasPublic>(
    key: &PKeyRef<T>,
    ordering: MapOrdering,
) -> Result<CborMap, Error> {
    let alg = KeyAlgorithm::of(key)?;
    let mut map = CborMap::with_ordering(ordering);

    match alg.key_type() {
        KeyType::Rsa => {
            let rsa = key.rsa().map_err(crypto::Error::from)?;
            map.set(COSE_KTY_LABEL, COSE_RSA_KTY)?
                .set(COSE_RSA_N_LABEL, rsa.n().to_vec())?
                .set(COSE_RSA_E_LABEL, rsa.e().to_vec())?;
        }
        KeyType::Ec => {
            let ec = key.ec_key().map_err(crypto::Error::from)?;
            let field_len = alg.field_len().unwrap_or_default() as i32;
            let (x, y) = affine_coordinates(&ec)?;

            map.set(COSE_KTY_LABEL, COSE_EC2_KTY)?
                .set(COSE_EC2_CRV_LABEL, cose_curve(alg).unwrap_or_default())?
                .set(
                    COSE_EC2_X_LABEL,
                    x.to_vec_padded(field_len).map_err(crypto::Error::from)?,
                )?
                .set(
                    COSE_EC2_Y_LABEL,
                    y.to_vec_padded(field_len).map_err(crypto::Error::from)?,
                )?;
        }
        KeyType::Edwards | KeyType::Montgomery => {
            let raw = key.raw_public_key().map_err(crypto::Error::from)?;
            map.set(COSE_KTY_LABEL, COSE_OKP_KTY)?
                .set(COSE_OKP_CRV_LABEL, cose_curve(alg).unwrap_or_default())?
                .set(COSE_OKP_X_LABEL, raw)?;
        }
    }

    Ok(map)
}

fn affine_coordinates<T: HasPublic>(ec: &EcKey<T>) -> Result<(BigNum, BigNum), Error> {
    let mut ctx = BigNumContext::new().map_err(crypto::Error::from)?;
    let mut x = BigNum::new().map_err(crypto::Error::from)?;
    let mut y = BigNum::new().map_err(crypto::Error::from)?;
    ec.public_key()
        .affine_coordinates(ec.group(), &mut x, &mut y, &mut ctx)
        .map_err(crypto::Error::from)?;
    Ok((x, y))
}

/// Decode a COSE key map.  Every entry of the map must be consumed.
pub fn decode_public_key(map: &CborMap) -> Result<PKey<Public>, Error> {
    let kty = map.get(COSE_KTY_LABEL)?.as_int()?;

    let key = match kty {
        COSE_RSA_KTY => {
            let n = crypto_binary(map.get(COSE_RSA_N_LABEL)?)?;
            let e = crypto_binary(map.get(COSE_RSA_E_LABEL)?)?;
            Rsa::from_public_components(n, e)
                .and_then(PKey::from_rsa)
                .map_err(crypto::Error::from)?
        }
        COSE_EC2_KTY => {
            let alg = key_algorithm(map.get(COSE_EC2_CRV_LABEL)?)?;
            let nid = alg
                .nid()
                .ok_or_else(|| security(format!("{alg:?} is not a valid EC curve")))?;
            let x = curve_point(map.get(COSE_EC2_X_LABEL)?, alg)?;
            let y = curve_point(map.get(COSE_EC2_Y_LABEL)?, alg)?;

            EcGroup::from_curve_name(nid)
                .and_then(|group| EcKey::from_public_key_affine_coordinates(&group, &x, &y))
                .and_then(PKey::from_ec_key)
                .map_err(|_| security(format!("invalid {alg:?} public key")))?
        }
        COSE_OKP_KTY => {
            let alg = key_algorithm(map.get(COSE_OKP_CRV_LABEL)?)?;
            if !matches!(alg.key_type(), KeyType::Edwards | KeyType::Montgomery) {
                return Err(security(format!("{alg:?} is not a valid OKP curve")));
            }
            let x = map.get(COSE_OKP_X_LABEL)?.as_bytes()?;
            if Some(x.len()) != alg.field_len() {
                return Err(security(format!("bad {alg:?} public key length")));
            }
            PKey::public_key_from_raw_bytes(x, alg.pkey_id()).map_err(crypto::Error::from)?
        }
        _ => return Err(security(format!("unrecognized key type: {kty}"))),
    };

    map.check_for_unread()?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::nid::Nid;
    use openssl::pkey::Private;

    fn ec_key(nid: Nid) -> PKey<Private> {
        let group = EcGroup::from_curve_name(nid).unwrap();
        PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
    }

    fn round_trip(key: &PKey<Private>) -> CborMap {
        let encoded = encode_public_key(key, MapOrdering::Bytewise).unwrap();

        // go through the wire to start with fresh read tracking
        let bytes = CborValue::Map(encoded.clone()).encode();
        let wire = CborValue::decode(&bytes).unwrap();
        let decoded = decode_public_key(wire.as_map().unwrap()).unwrap();

        assert!(decoded.public_eq(key));
        encoded
    }

    #[test]
    fn rsa_2048() {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let m = round_trip(&key);

        assert_eq!(m.get(COSE_KTY_LABEL).unwrap(), &CborValue::from(COSE_RSA_KTY));
        assert_eq!(m.get(COSE_RSA_N_LABEL).unwrap().as_bytes().unwrap().len(), 256);
        assert_eq!(
            m.get(COSE_RSA_E_LABEL).unwrap().as_bytes().unwrap(),
            [0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn ec_curves() {
        for (nid, width) in [
            (Nid::X9_62_PRIME256V1, 32),
            (Nid::SECP384R1, 48),
            (Nid::SECP521R1, 66),
        ] {
            // repeat so that short coordinates get exercised now and then
            for _ in 0..8 {
                let m = round_trip(&ec_key(nid));
                assert_eq!(m.get(COSE_EC2_X_LABEL).unwrap().as_bytes().unwrap().len(), width);
                assert_eq!(m.get(COSE_EC2_Y_LABEL).unwrap().as_bytes().unwrap().len(), width);
            }
        }
    }

    #[test]
    fn okp_curves() {
        for key in [
            PKey::generate_ed25519().unwrap(),
            PKey::generate_x25519().unwrap(),
            PKey::generate_ed448().unwrap(),
            PKey::generate_x448().unwrap(),
        ] {
            let m = round_trip(&key);
            assert_eq!(m.get(COSE_KTY_LABEL).unwrap(), &CborValue::from(COSE_OKP_KTY));
        }
    }

    fn assert_security_error(r: Result<PKey<Public>, Error>, msg: &str) {
        match r {
            Err(Error::Crypto(crypto::Error::GeneralSecurity(m))) => assert_eq!(m, msg),
            Err(e) => panic!("unexpected error {e:?}"),
            Ok(_) => panic!("decoding succeeded"),
        }
    }

    #[test]
    fn rsa_leading_zero_rejected() {
        let mut m = CborMap::new();
        m.set(COSE_KTY_LABEL, COSE_RSA_KTY)
            .unwrap()
            .set(COSE_RSA_N_LABEL, vec![0u8, 0xc1, 0x02])
            .unwrap()
            .set(COSE_RSA_E_LABEL, vec![1u8, 0, 1])
            .unwrap();

        assert_security_error(
            decode_public_key(&m),
            "RSA key parameter contains leading zeroes",
        );
    }

    #[test]
    fn ec_not_normalized() {
        let key = ec_key(Nid::X9_62_PRIME256V1);
        let mut m = encode_public_key(&key, MapOrdering::Bytewise).unwrap();

        let x = m.take_byte_string(COSE_EC2_X_LABEL).unwrap();
        m.set(COSE_EC2_X_LABEL, x[1..].to_vec()).unwrap();
        assert_security_error(
            decode_public_key(&m),
            "public EC key parameter is not normalized",
        );
    }

    #[test]
    fn bad_curves() {
        let mut m = CborMap::new();
        m.set(COSE_KTY_LABEL, COSE_EC2_KTY)
            .unwrap()
            .set(COSE_EC2_CRV_LABEL, 99)
            .unwrap();
        assert_security_error(decode_public_key(&m), "no such key/curve algorithm: 99");

        let mut m = CborMap::new();
        m.set(COSE_KTY_LABEL, COSE_EC2_KTY)
            .unwrap()
            .set(COSE_EC2_CRV_LABEL, COSE_CRV_ED25519)
            .unwrap();
        assert_security_error(decode_public_key(&m), "Ed25519 is not a valid EC curve");

        let mut m = CborMap::new();
        m.set(COSE_KTY_LABEL, COSE_OKP_KTY)
            .unwrap()
            .set(COSE_OKP_CRV_LABEL, COSE_CRV_P256)
            .unwrap();
        assert_security_error(decode_public_key(&m), "P256 is not a valid OKP curve");
    }

    #[test]
    fn unexpected_entry_rejected() {
        let key = PKey::generate_ed25519().unwrap();
        let mut m = encode_public_key(&key, MapOrdering::Bytewise).unwrap();
        m.set("extra", true).unwrap();

        assert!(matches!(
            decode_public_key(&m),
            Err(Error::MalformedStructure(_))
        ));
    }
}
