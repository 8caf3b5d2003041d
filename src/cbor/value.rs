// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::decoder::{DecodeOptions, Decoder};
use super::encoder::{TAG_NEGATIVE_BIGNUM, TAG_POSITIVE_BIGNUM};
use super::errors::Error;
use super::map::{CborMap, MapOrdering};
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

/// A single CBOR data item.
///
/// Integers that fit in an `i64` are always held as [`CborValue::Integer`];
/// anything larger or smaller lives in [`CborValue::BigInteger`].  Use
/// [`CborValue::big_integer`] to get the normalised variant from an
/// arbitrary-precision value.
#[derive(Clone)]
pub enum CborValue {
    Integer(i64),
    BigInteger(BigInt),
    Float(f64),
    ByteString(Vec<u8>),
    TextString(String),
    Boolean(bool),
    Null,
    Array(Vec<CborValue>),
    Map(CborMap),
    Tag(Tagged),
}

/// A tag number and the item it wraps.
///
/// Only [`CborValue::tag`] builds one.  Tags 2 and 3 are the bignum encoding
/// of integers and never appear here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tagged {
    number: u64,
    item: Box<CborValue>,
}

impl Tagged {
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn item(&self) -> &CborValue {
        &self.item
    }

    pub fn item_mut(&mut self) -> &mut CborValue {
        &mut self.item
    }

    pub fn into_item(self) -> CborValue {
        *self.item
    }
}

impl CborValue {
    /// Wrap an arbitrary-precision integer, collapsing it to
    /// [`CborValue::Integer`] when it fits.
    pub fn big_integer(value: BigInt) -> Self {
        match value.to_i64() {
            Some(i) => CborValue::Integer(i),
            None => CborValue::BigInteger(value),
        }
    }

    /// Wrap `item` in a tag.  A bignum tag over a byte string yields the
    /// integer it denotes; a bignum tag over anything else is refused.
    pub fn tag(number: u64, item: CborValue) -> Result<Self, Error> {
        match (number, item) {
            (TAG_POSITIVE_BIGNUM, CborValue::ByteString(b)) => Ok(CborValue::big_integer(
                BigInt::from_bytes_be(Sign::Plus, &b),
            )),
            (TAG_NEGATIVE_BIGNUM, CborValue::ByteString(b)) => Ok(CborValue::big_integer(
                -BigInt::from_bytes_be(Sign::Plus, &b) - 1,
            )),
            (TAG_POSITIVE_BIGNUM | TAG_NEGATIVE_BIGNUM, other) => Err(Error::TypeMismatch(
                format!("bignum tag {number} wraps {}", other.type_name()),
            )),
            (number, item) => Ok(CborValue::Tag(Tagged {
                number,
                item: Box::new(item),
            })),
        }
    }

    /// Re-sort every map inside this item to `ordering`
    pub fn into_ordering(self, ordering: MapOrdering) -> Self {
        match self {
            CborValue::Map(m) => CborValue::Map(m.into_ordering(ordering)),
            CborValue::Array(a) => CborValue::Array(
                a.into_iter().map(|v| v.into_ordering(ordering)).collect(),
            ),
            CborValue::Tag(t) => CborValue::Tag(Tagged {
                number: t.number,
                item: Box::new(t.item.into_ordering(ordering)),
            }),
            other => other,
        }
    }

    /// Decode a deterministically encoded item using the default map
    /// ordering.  Non-canonical input is rejected.
    pub fn decode(buf: &[u8]) -> Result<CborValue, Error> {
        Decoder::new(DecodeOptions::default()).decode(buf)
    }

    /// Decode with explicit options, e.g. to accept non-canonical input or to
    /// validate against the legacy length-first key ordering.
    pub fn decode_with(buf: &[u8], options: DecodeOptions) -> Result<CborValue, Error> {
        Decoder::new(options).decode(buf)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CborValue::Integer(_) | CborValue::BigInteger(_) => "integer",
            CborValue::Float(_) => "float",
            CborValue::ByteString(_) => "byte string",
            CborValue::TextString(_) => "text string",
            CborValue::Boolean(_) => "boolean",
            CborValue::Null => "null",
            CborValue::Array(_) => "array",
            CborValue::Map(_) => "map",
            CborValue::Tag(_) => "tag",
        }
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::TypeMismatch(format!("expecting {expected}, got {}", self.type_name()))
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        match self {
            CborValue::Integer(i) => Ok(*i),
            other => Err(other.mismatch("integer")),
        }
    }

    pub fn as_big_integer(&self) -> Result<BigInt, Error> {
        match self {
            CborValue::Integer(i) => Ok(BigInt::from(*i)),
            CborValue::BigInteger(b) => Ok(b.clone()),
            other => Err(other.mismatch("integer")),
        }
    }

    pub fn as_float(&self) -> Result<f64, Error> {
        match self {
            CborValue::Float(f) => Ok(*f),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], Error> {
        match self {
            CborValue::ByteString(b) => Ok(b),
            other => Err(other.mismatch("byte string")),
        }
    }

    pub fn as_text(&self) -> Result<&str, Error> {
        match self {
            CborValue::TextString(s) => Ok(s),
            other => Err(other.mismatch("text string")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            CborValue::Boolean(b) => Ok(*b),
            other => Err(other.mismatch("boolean")),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CborValue::Null)
    }

    pub fn as_array(&self) -> Result<&[CborValue], Error> {
        match self {
            CborValue::Array(a) => Ok(a),
            other => Err(other.mismatch("array")),
        }
    }

    pub fn as_map(&self) -> Result<&CborMap, Error> {
        match self {
            CborValue::Map(m) => Ok(m),
            other => Err(other.mismatch("map")),
        }
    }

    pub fn as_map_mut(&mut self) -> Result<&mut CborMap, Error> {
        match self {
            CborValue::Map(m) => Ok(m),
            other => Err(other.mismatch("map")),
        }
    }

    /// Returns the tag number and the wrapped item
    pub fn as_tag(&self) -> Result<(u64, &CborValue), Error> {
        match self {
            CborValue::Tag(t) => Ok((t.number, t.item.as_ref())),
            other => Err(other.mismatch("tag")),
        }
    }
}

impl PartialEq for CborValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CborValue::Integer(a), CborValue::Integer(b)) => a == b,
            (CborValue::BigInteger(a), CborValue::BigInteger(b)) => a == b,
            (CborValue::Integer(a), CborValue::BigInteger(b))
            | (CborValue::BigInteger(b), CborValue::Integer(a)) => BigInt::from(*a) == *b,
            // all NaNs share one encoding, so they compare equal
            (CborValue::Float(a), CborValue::Float(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (CborValue::ByteString(a), CborValue::ByteString(b)) => a == b,
            (CborValue::TextString(a), CborValue::TextString(b)) => a == b,
            (CborValue::Boolean(a), CborValue::Boolean(b)) => a == b,
            (CborValue::Null, CborValue::Null) => true,
            (CborValue::Array(a), CborValue::Array(b)) => a == b,
            (CborValue::Map(a), CborValue::Map(b)) => a == b,
            (CborValue::Tag(a), CborValue::Tag(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CborValue {}

impl std::fmt::Debug for CborValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_diagnostic())
    }
}

impl std::fmt::Display for CborValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_diagnostic())
    }
}

impl From<i64> for CborValue {
    fn from(v: i64) -> Self {
        CborValue::Integer(v)
    }
}

impl From<i32> for CborValue {
    fn from(v: i32) -> Self {
        CborValue::Integer(v.into())
    }
}

impl From<u64> for CborValue {
    fn from(v: u64) -> Self {
        CborValue::big_integer(BigInt::from(v))
    }
}

impl From<BigInt> for CborValue {
    fn from(v: BigInt) -> Self {
        CborValue::big_integer(v)
    }
}

impl From<f64> for CborValue {
    fn from(v: f64) -> Self {
        CborValue::Float(v)
    }
}

impl From<bool> for CborValue {
    fn from(v: bool) -> Self {
        CborValue::Boolean(v)
    }
}

impl From<&str> for CborValue {
    fn from(v: &str) -> Self {
        CborValue::TextString(v.to_string())
    }
}

impl From<String> for CborValue {
    fn from(v: String) -> Self {
        CborValue::TextString(v)
    }
}

impl From<Vec<u8>> for CborValue {
    fn from(v: Vec<u8>) -> Self {
        CborValue::ByteString(v)
    }
}

impl From<&[u8]> for CborValue {
    fn from(v: &[u8]) -> Self {
        CborValue::ByteString(v.to_vec())
    }
}

impl From<Vec<CborValue>> for CborValue {
    fn from(v: Vec<CborValue>) -> Self {
        CborValue::Array(v)
    }
}

impl From<CborMap> for CborValue {
    fn from(v: CborMap) -> Self {
        CborValue::Map(v)
    }
}

impl From<&CborValue> for CborValue {
    fn from(v: &CborValue) -> Self {
        v.clone()
    }
}
