// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::algorithms::{AsymSignatureAlgorithm, KeyAlgorithm, KeyType};
use super::errors::Error;
use openssl::pkey::{HasPrivate, HasPublic, PKeyRef};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Signer, Verifier};

const ASN1_SEQUENCE: u8 = 0x30;
const ASN1_INTEGER: u8 = 0x02;

fn format_error(msg: &str) -> Error {
    Error::SignatureFormat(msg.to_string())
}

fn read_length(der: &[u8], pos: &mut usize) -> Result<usize, Error> {
    let first = *der.get(*pos).ok_or_else(|| format_error("truncated length"))?;
    *pos += 1;

    // long form: 0x81 or 0x82 followed by that many length bytes
    let (width, min) = match first {
        0..=0x7f => return Ok(first as usize),
        0x81 => (1, 0x80),
        0x82 => (2, 0x100),
        _ => return Err(format_error("unsupported length form")),
    };

    let bytes = der
        .get(*pos..*pos + width)
        .ok_or_else(|| format_error("truncated length"))?;
    *pos += width;

    let len = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    if len < min {
        return Err(format_error("non-minimal length"));
    }
    Ok(len)
}

fn push_length(len: usize, out: &mut Vec<u8>) -> Result<(), Error> {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(0x81);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        return Err(Error::SignatureFormat(format!("DER length {len} too large")));
    }
    Ok(())
}

fn signature_len(field_len: usize) -> Result<usize, Error> {
    field_len
        .checked_mul(2)
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::SignatureFormat(format!("invalid field length {field_len}")))
}

/// Strips the sign byte from a DER INTEGER, refusing any padding it does not
/// need.
fn unsigned_magnitude(value: &[u8]) -> Result<&[u8], Error> {
    match value {
        [] => Err(format_error("empty INTEGER")),
        [first, ..] if first & 0x80 != 0 => Err(format_error("negative INTEGER")),
        [0] => Ok(&value[1..]),
        [0, next, ..] if next & 0x80 != 0 => Ok(&value[1..]),
        [0, ..] => Err(format_error("superfluous leading zero in INTEGER")),
        _ => Ok(value),
    }
}

/// Convert an ASN.1 DER `SEQUENCE { r INTEGER, s INTEGER }` into the
/// fixed-width `r || s` form used by COSE and JOSE.
pub fn to_concatenated(der: &[u8], field_len: usize) -> Result<Vec<u8>, Error> {
    if der.first() != Some(&ASN1_SEQUENCE) {
        return Err(format_error("not a SEQUENCE"));
    }

    let mut pos = 1;
    let len = read_length(der, &mut pos)?;
    if len != der.len() - pos {
        return Err(format_error("SEQUENCE length mismatch"));
    }

    let mut out = vec![0u8; signature_len(field_len)?];

    for offset in [0, field_len] {
        if der.get(pos) != Some(&ASN1_INTEGER) {
            return Err(format_error("not an INTEGER"));
        }
        pos += 1;

        let len = read_length(der, &mut pos)?;
        let value = der
            .get(pos..pos + len)
            .ok_or_else(|| format_error("INTEGER length mismatch"))?;
        pos += len;

        let magnitude = unsigned_magnitude(value)?;
        if magnitude.len() > field_len {
            return Err(format_error("INTEGER wider than the curve field"));
        }

        let end = offset + field_len;
        out[end - magnitude.len()..end].copy_from_slice(magnitude);
    }

    if pos != der.len() {
        return Err(format_error("unexpected data after INTEGERs"));
    }

    Ok(out)
}

/// Inverse of [`to_concatenated`], producing minimal DER
pub fn to_der(concatenated: &[u8], field_len: usize) -> Result<Vec<u8>, Error> {
    let expected = signature_len(field_len)?;
    if concatenated.len() != expected {
        return Err(Error::SignatureFormat(format!(
            "expecting {expected} signature bytes, got {}",
            concatenated.len()
        )));
    }

    let mut body = Vec::with_capacity(concatenated.len() + 6);

    for half in concatenated.chunks(field_len) {
        let first = half
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(field_len - 1);
        let digits = &half[first..];
        let pad = digits[0] & 0x80 != 0;

        body.push(ASN1_INTEGER);
        push_length(digits.len() + pad as usize, &mut body)?;
        if pad {
            body.push(0);
        }
        body.extend_from_slice(digits);
    }

    let mut der = Vec::with_capacity(body.len() + 4);
    der.push(ASN1_SEQUENCE);
    push_length(body.len(), &mut der)?;
    der.extend_from_slice(&body);

    Ok(der)
}

/// One signing or verification operation over an accumulated message.
///
/// The key is borrowed, so a single key can serve any number of concurrent
/// wrappers.  EC signatures are exchanged in concatenated form unless
/// [`SignatureWrapper::ecdsa_der_encoding`] is set.
pub struct SignatureWrapper<'k, T> {
    algorithm: AsymSignatureAlgorithm,
    key: &'k PKeyRef<T>,
    ec_field_len: Option<usize>,
    ecdsa_der_encoding: bool,
    data: Vec<u8>,
}

impl<'k, T> SignatureWrapper<'k, T> {
    pub fn ecdsa_der_encoding(mut self, flag: bool) -> Self {
        self.ecdsa_der_encoding = flag;
        self
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.data.extend_from_slice(data);
        self
    }

    fn ec_conversion(&self) -> Option<usize> {
        if self.ecdsa_der_encoding {
            None
        } else {
            self.ec_field_len
        }
    }
}

impl<'k, T: HasPublic> SignatureWrapper<'k, T> {
    pub fn new(algorithm: AsymSignatureAlgorithm, key: &'k PKeyRef<T>) -> Result<Self, Error> {
        let key_algorithm = KeyAlgorithm::of(key)?;

        if key_algorithm.key_type() != algorithm.key_type() {
            return Err(Error::AlgorithmKeyMismatch(format!(
                "{key_algorithm:?} key is incompatible with {}",
                algorithm.name()
            )));
        }

        let ec_field_len = match key_algorithm.key_type() {
            KeyType::Ec => key_algorithm.field_len(),
            _ => None,
        };

        Ok(Self {
            algorithm,
            key,
            ec_field_len,
            ecdsa_der_encoding: false,
            data: Vec::new(),
        })
    }

    pub fn verify(&self, signature: &[u8]) -> Result<bool, Error> {
        let mut verifier = match self.algorithm.digest() {
            Some(md) => Verifier::new(md, self.key)?,
            None => Verifier::new_without_digest(self.key)?,
        };

        if let (true, Some(md)) = (self.algorithm.is_pss(), self.algorithm.digest()) {
            verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
            verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
            verifier.set_rsa_mgf1_md(md)?;
        }

        let signature = match self.ec_conversion() {
            Some(n) => to_der(signature, n)?,
            None => signature.to_vec(),
        };

        let valid = verifier.verify_oneshot(&signature, &self.data)?;
        tracing::debug!(algorithm = self.algorithm.name(), valid, "signature verified");
        Ok(valid)
    }
}

impl<'k, T: HasPrivate> SignatureWrapper<'k, T> {
    pub fn sign(&self) -> Result<Vec<u8>, Error> {
        let mut signer = match self.algorithm.digest() {
            Some(md) => Signer::new(md, self.key)?,
            None => Signer::new_without_digest(self.key)?,
        };

        if let (true, Some(md)) = (self.algorithm.is_pss(), self.algorithm.digest()) {
            signer.set_rsa_padding(Padding::PKCS1_PSS)?;
            signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
            signer.set_rsa_mgf1_md(md)?;
        }

        let signature = signer.sign_oneshot_to_vec(&self.data)?;

        match self.ec_conversion() {
            Some(n) => to_concatenated(&signature, n),
            None => Ok(signature),
        }
    }
}
