// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Conversions to and from [`ciborium::Value`], so that data produced by
//! serde-based code can be brought into deterministic form.

use super::encoder::{TAG_NEGATIVE_BIGNUM, TAG_POSITIVE_BIGNUM};
use super::errors::Error;
use super::map::CborMap;
use super::value::CborValue;
use ciborium::value::{Integer, Value};
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

impl From<&CborValue> for Value {
    fn from(v: &CborValue) -> Self {
        match v {
            CborValue::Integer(i) => Value::Integer((*i).into()),
            CborValue::BigInteger(b) => match b.to_i128().map(Integer::try_from) {
                Some(Ok(i)) => Value::Integer(i),
                _ => {
                    let (tag, magnitude) = if b.sign() == Sign::Minus {
                        (TAG_NEGATIVE_BIGNUM, -b - 1)
                    } else {
                        (TAG_POSITIVE_BIGNUM, b.clone())
                    };
                    Value::Tag(tag, Box::new(Value::Bytes(magnitude.to_bytes_be().1)))
                }
            },
            CborValue::Float(f) => Value::Float(*f),
            CborValue::ByteString(b) => Value::Bytes(b.clone()),
            CborValue::TextString(s) => Value::Text(s.clone()),
            CborValue::Boolean(b) => Value::Bool(*b),
            CborValue::Null => Value::Null,
            CborValue::Array(a) => Value::Array(a.iter().map(Value::from).collect()),
            CborValue::Map(m) => Value::Map(
                m.iter()
                    .map(|(k, v)| (Value::from(k), Value::from(v)))
                    .collect(),
            ),
            CborValue::Tag(t) => Value::Tag(t.number(), Box::new(Value::from(t.item()))),
        }
    }
}

impl TryFrom<Value> for CborValue {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Integer(i) => Ok(CborValue::big_integer(BigInt::from(i128::from(i)))),
            Value::Bytes(b) => Ok(CborValue::ByteString(b)),
            Value::Float(f) => Ok(CborValue::Float(f)),
            Value::Text(s) => Ok(CborValue::TextString(s)),
            Value::Bool(b) => Ok(CborValue::Boolean(b)),
            Value::Null => Ok(CborValue::Null),
            Value::Tag(t, inner) => CborValue::tag(t, CborValue::try_from(*inner)?),
            Value::Array(a) => a
                .into_iter()
                .map(CborValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(CborValue::Array),
            Value::Map(entries) => {
                let mut m = CborMap::new();
                for (k, v) in entries {
                    m.set(CborValue::try_from(k)?, CborValue::try_from(v)?)?;
                }
                Ok(CborValue::Map(m))
            }
            other => Err(Error::UnsupportedFeature(format!(
                "ciborium value {other:?}"
            ))),
        }
    }
}
