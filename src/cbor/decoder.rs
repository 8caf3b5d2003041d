// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::encoder::{
    encode_float, f16_to_f64, MT_ARRAY, MT_BYTE_STRING, MT_MAP, MT_NEGATIVE, MT_SIMPLE, MT_TAG,
    MT_TEXT_STRING, MT_UNSIGNED, TAG_NEGATIVE_BIGNUM, TAG_POSITIVE_BIGNUM,
};
use super::errors::Error;
use super::map::{CborMap, MapOrdering};
use super::value::CborValue;
use num_bigint::{BigInt, BigUint};
use std::cmp::Ordering;

const MAX_DEPTH: usize = 256;

/// Knobs controlling how strictly input is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject anything that is not the unique deterministic encoding
    pub deterministic: bool,
    /// Key order expected on the wire, and carried by decoded maps
    pub ordering: MapOrdering,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            deterministic: true,
            ordering: MapOrdering::default(),
        }
    }
}

impl DecodeOptions {
    /// Accept any well-formed definite-length input; maps are re-sorted
    pub fn lenient() -> Self {
        Self {
            deterministic: false,
            ..Default::default()
        }
    }

    pub fn with_ordering(mut self, ordering: MapOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }
}

pub struct Decoder {
    options: DecodeOptions,
}

impl Decoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    /// Decode exactly one item; `buf` must not contain anything after it
    pub fn decode(&self, buf: &[u8]) -> Result<CborValue, Error> {
        tracing::trace!(len = buf.len(), options = ?self.options, "decoding CBOR");

        let mut cursor = Cursor {
            buf,
            pos: 0,
            options: self.options,
        };

        let result = cursor.read_item(0).and_then(|v| {
            if cursor.pos != buf.len() {
                return Err(Error::MalformedEncoding(format!(
                    "{} bytes of unexpected data after item",
                    buf.len() - cursor.pos
                )));
            }
            Ok(v)
        });

        if let Err(e) = &result {
            tracing::debug!(offset = cursor.pos, error = %e, "CBOR decoding failed");
        }

        result
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    options: DecodeOptions,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                Error::MalformedEncoding(format!(
                    "truncated input: need {n} bytes at offset {}",
                    self.pos
                ))
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_uint(&mut self, n: usize) -> Result<u64, Error> {
        Ok(self
            .take(n)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    /// Returns (major type, additional info, argument)
    fn read_head(&mut self) -> Result<(u8, u8, u64), Error> {
        let initial = self.take(1)?[0];
        let major = initial & 0xe0;
        let info = initial & 0x1f;

        let arg = match info {
            0..=23 => info as u64,
            24 => self.read_uint(1)?,
            25 => self.read_uint(2)?,
            26 => self.read_uint(4)?,
            27 => self.read_uint(8)?,
            31 => {
                return Err(Error::UnsupportedFeature(
                    "indefinite length items".to_string(),
                ))
            }
            _ => {
                return Err(Error::MalformedEncoding(format!(
                    "reserved additional information value {info}"
                )))
            }
        };

        // floating point arguments are checked separately
        if self.options.deterministic && major != MT_SIMPLE && info >= 24 {
            let shortest = match arg {
                0..=23 => 0,
                24..=0xff => 24,
                0x100..=0xffff => 25,
                0x1_0000..=0xffff_ffff => 26,
                _ => 27,
            };
            if info != shortest {
                return Err(Error::MalformedEncoding(format!(
                    "non-deterministic length encoding of {arg}"
                )));
            }
        }

        Ok((major, info, arg))
    }

    fn read_length(&mut self, arg: u64) -> Result<usize, Error> {
        usize::try_from(arg)
            .map_err(|_| Error::MalformedEncoding(format!("length {arg} out of range")))
    }

    fn read_item(&mut self, depth: usize) -> Result<CborValue, Error> {
        if depth > MAX_DEPTH {
            return Err(Error::MalformedEncoding(format!(
                "nesting deeper than {MAX_DEPTH} levels"
            )));
        }

        let start = self.pos;
        let (major, info, arg) = self.read_head()?;

        match major {
            MT_UNSIGNED => Ok(CborValue::from(arg)),
            MT_NEGATIVE => Ok(if arg <= i64::MAX as u64 {
                CborValue::Integer(-1 - arg as i64)
            } else {
                CborValue::BigInteger(-BigInt::from(arg) - 1)
            }),
            MT_BYTE_STRING => {
                let len = self.read_length(arg)?;
                Ok(CborValue::ByteString(self.take(len)?.to_vec()))
            }
            MT_TEXT_STRING => {
                let len = self.read_length(arg)?;
                let raw = self.take(len)?.to_vec();
                String::from_utf8(raw)
                    .map(CborValue::TextString)
                    .map_err(|e| Error::MalformedEncoding(format!("invalid UTF-8: {e}")))
            }
            MT_ARRAY => {
                let len = self.read_length(arg)?;
                let mut items = Vec::with_capacity(len.min(self.buf.len() - self.pos));
                for _ in 0..len {
                    items.push(self.read_item(depth + 1)?);
                }
                Ok(CborValue::Array(items))
            }
            MT_MAP => {
                let len = self.read_length(arg)?;
                self.read_map(len, depth).map(CborValue::Map)
            }
            MT_TAG => {
                let inner = self.read_item(depth + 1)?;
                if arg == TAG_POSITIVE_BIGNUM || arg == TAG_NEGATIVE_BIGNUM {
                    self.read_bignum(arg, inner)
                } else {
                    CborValue::tag(arg, inner)
                }
            }
            _ => self.read_simple(start, info, arg),
        }
    }

    fn read_map(&mut self, len: usize, depth: usize) -> Result<CborMap, Error> {
        let mut map = CborMap::with_ordering(self.options.ordering);

        for _ in 0..len {
            let key = self.read_item(depth + 1)?;
            let value = self.read_item(depth + 1)?;

            if !self.options.deterministic {
                map.set(key, value)?;
                continue;
            }

            let encoded_key = key.encode();
            match map
                .last_encoded_key()
                .map(|last| self.options.ordering.compare(last, &encoded_key))
            {
                Some(Ordering::Equal) => {
                    return Err(Error::DuplicateKey(key.to_diagnostic()));
                }
                Some(Ordering::Greater) => {
                    return Err(Error::NonCanonicalOrdering(format!(
                        "map key {} out of {:?} order",
                        key.to_diagnostic(),
                        self.options.ordering
                    )));
                }
                _ => map.push_ordered(encoded_key, key, value),
            }
        }

        Ok(map)
    }

    fn read_bignum(&self, tag: u64, inner: CborValue) -> Result<CborValue, Error> {
        let bytes = match inner {
            CborValue::ByteString(b) => b,
            other => {
                return Err(Error::MalformedEncoding(format!(
                    "bignum tag {tag} wraps {} instead of byte string",
                    other.type_name()
                )))
            }
        };

        let magnitude = BigUint::from_bytes_be(&bytes);

        if self.options.deterministic {
            if bytes.first() == Some(&0) {
                return Err(Error::MalformedEncoding(
                    "bignum with leading zero bytes".to_string(),
                ));
            }
            if magnitude.bits() <= 64 {
                return Err(Error::MalformedEncoding(
                    "bignum fits in a 64-bit integer".to_string(),
                ));
            }
        }

        let magnitude = BigInt::from(magnitude);
        Ok(CborValue::big_integer(if tag == TAG_POSITIVE_BIGNUM {
            magnitude
        } else {
            -magnitude - 1
        }))
    }

    fn read_simple(&mut self, start: usize, info: u8, arg: u64) -> Result<CborValue, Error> {
        let value = match info {
            20 => return Ok(CborValue::Boolean(false)),
            21 => return Ok(CborValue::Boolean(true)),
            22 => return Ok(CborValue::Null),
            25 => f16_to_f64(arg as u16),
            26 => f32::from_bits(arg as u32) as f64,
            27 => f64::from_bits(arg),
            _ => {
                return Err(Error::UnsupportedFeature(format!(
                    "simple value {}",
                    if info == 24 { arg } else { info as u64 }
                )))
            }
        };

        if self.options.deterministic {
            let mut canonical = Vec::with_capacity(9);
            encode_float(value, &mut canonical);
            if canonical != self.buf[start..self.pos] {
                return Err(Error::MalformedEncoding(format!(
                    "float {value:?} not in shortest form"
                )));
            }
        }

        Ok(CborValue::Float(value))
    }
}
