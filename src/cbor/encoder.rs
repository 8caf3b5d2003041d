// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::value::CborValue;
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

pub(crate) const MT_UNSIGNED: u8 = 0x00;
pub(crate) const MT_NEGATIVE: u8 = 0x20;
pub(crate) const MT_BYTE_STRING: u8 = 0x40;
pub(crate) const MT_TEXT_STRING: u8 = 0x60;
pub(crate) const MT_ARRAY: u8 = 0x80;
pub(crate) const MT_MAP: u8 = 0xa0;
pub(crate) const MT_TAG: u8 = 0xc0;
pub(crate) const MT_SIMPLE: u8 = 0xe0;

pub(crate) const SIMPLE_FALSE: u8 = 0xf4;
pub(crate) const SIMPLE_TRUE: u8 = 0xf5;
pub(crate) const SIMPLE_NULL: u8 = 0xf6;
pub(crate) const FLOAT16: u8 = 0xf9;
pub(crate) const FLOAT32: u8 = 0xfa;
pub(crate) const FLOAT64: u8 = 0xfb;

pub(crate) const TAG_POSITIVE_BIGNUM: u64 = 2;
pub(crate) const TAG_NEGATIVE_BIGNUM: u64 = 3;

const CANONICAL_NAN: [u8; 3] = [FLOAT16, 0x7e, 0x00];

impl CborValue {
    /// Return the deterministic encoding of this item
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            CborValue::Integer(i) => encode_integer(*i, out),
            CborValue::BigInteger(b) => encode_big_integer(b, out),
            CborValue::Float(f) => encode_float(*f, out),
            CborValue::ByteString(b) => {
                write_head(MT_BYTE_STRING, b.len() as u64, out);
                out.extend_from_slice(b);
            }
            CborValue::TextString(s) => {
                write_head(MT_TEXT_STRING, s.len() as u64, out);
                out.extend_from_slice(s.as_bytes());
            }
            CborValue::Boolean(b) => out.push(if *b { SIMPLE_TRUE } else { SIMPLE_FALSE }),
            CborValue::Null => out.push(SIMPLE_NULL),
            CborValue::Array(a) => {
                write_head(MT_ARRAY, a.len() as u64, out);
                for item in a.iter() {
                    item.encode_into(out);
                }
            }
            CborValue::Map(m) => m.encode_into(out),
            CborValue::Tag(t) => {
                write_head(MT_TAG, t.number(), out);
                t.item().encode_into(out);
            }
        }
    }
}

/// Writes the initial byte and argument using the shortest form
pub(crate) fn write_head(major: u8, value: u64, out: &mut Vec<u8>) {
    if value < 24 {
        out.push(major | value as u8);
    } else if value <= u8::MAX as u64 {
        out.push(major | 24);
        out.push(value as u8);
    } else if value <= u16::MAX as u64 {
        out.push(major | 25);
        out.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= u32::MAX as u64 {
        out.push(major | 26);
        out.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

fn encode_integer(i: i64, out: &mut Vec<u8>) {
    if i >= 0 {
        write_head(MT_UNSIGNED, i as u64, out);
    } else {
        // -1 - i, computed without overflow for i64::MIN
        write_head(MT_NEGATIVE, !(i as u64), out);
    }
}

fn encode_big_integer(b: &BigInt, out: &mut Vec<u8>) {
    let negative = b.sign() == Sign::Minus;
    // CBOR stores negative n as -1 - n
    let magnitude = if negative { -b - 1 } else { b.clone() };

    if let Some(n) = magnitude.to_u64() {
        write_head(if negative { MT_NEGATIVE } else { MT_UNSIGNED }, n, out);
        return;
    }

    let (_, bytes) = magnitude.to_bytes_be();
    write_head(
        MT_TAG,
        if negative {
            TAG_NEGATIVE_BIGNUM
        } else {
            TAG_POSITIVE_BIGNUM
        },
        out,
    );
    write_head(MT_BYTE_STRING, bytes.len() as u64, out);
    out.extend_from_slice(&bytes);
}

/// Floats use the shortest of half, single and double precision that
/// represents the value exactly.
pub(crate) fn encode_float(f: f64, out: &mut Vec<u8>) {
    if f.is_nan() {
        out.extend_from_slice(&CANONICAL_NAN);
        return;
    }

    let single = f as f32;
    if (single as f64).to_bits() != f.to_bits() {
        out.push(FLOAT64);
        out.extend_from_slice(&f.to_bits().to_be_bytes());
        return;
    }

    match f32_to_f16_exact(single) {
        Some(half) => {
            out.push(FLOAT16);
            out.extend_from_slice(&half.to_be_bytes());
        }
        None => {
            out.push(FLOAT32);
            out.extend_from_slice(&single.to_bits().to_be_bytes());
        }
    }
}

/// Returns the IEEE 754 binary16 bit pattern for `f`, if the conversion is
/// lossless.  NaN is handled by the caller.
fn f32_to_f16_exact(f: f32) -> Option<u16> {
    let bits = f.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        // infinity
        return Some(sign | 0x7c00);
    }

    if exponent == 0 {
        // binary32 subnormals are far below the binary16 range
        return if mantissa == 0 { Some(sign) } else { None };
    }

    let unbiased = exponent - 127;

    if unbiased > 15 {
        return None;
    }

    if unbiased >= -14 {
        if mantissa & 0x1fff != 0 {
            return None;
        }
        return Some(sign | (((unbiased + 15) as u16) << 10) | (mantissa >> 13) as u16);
    }

    if unbiased >= -24 {
        let full = 0x0080_0000 | mantissa;
        let shift = (-(unbiased + 1)) as u32;
        if full & ((1 << shift) - 1) != 0 {
            return None;
        }
        return Some(sign | (full >> shift) as u16);
    }

    None
}

pub(crate) fn f16_to_f64(half: u16) -> f64 {
    let negative = half & 0x8000 != 0;
    let exponent = ((half >> 10) & 0x1f) as i32;
    let mantissa = (half & 0x03ff) as f64;

    let magnitude = match exponent {
        0 => mantissa * 2f64.powi(-24),
        31 => {
            if mantissa == 0.0 {
                f64::INFINITY
            } else {
                f64::NAN
            }
        }
        _ => (1024.0 + mantissa) * 2f64.powi(exponent - 25),
    };

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn enc(v: impl Into<CborValue>) -> Vec<u8> {
        v.into().encode()
    }

    #[test]
    fn integers_use_shortest_head() {
        assert_eq!(enc(0), hex!("00"));
        assert_eq!(enc(23), hex!("17"));
        assert_eq!(enc(24), hex!("1818"));
        assert_eq!(enc(255), hex!("18ff"));
        assert_eq!(enc(256), hex!("190100"));
        assert_eq!(enc(65536), hex!("1a00010000"));
        assert_eq!(enc(4294967296i64), hex!("1b0000000100000000"));
        assert_eq!(enc(-1), hex!("20"));
        assert_eq!(enc(-25), hex!("3818"));
        assert_eq!(enc(i64::MIN), hex!("3b7fffffffffffffff"));
    }

    #[test]
    fn big_integers() {
        assert_eq!(enc(u64::MAX), hex!("1bffffffffffffffff"));

        let below: BigInt = -BigInt::from(u64::MAX) - 1;
        assert_eq!(enc(below.clone()), hex!("3bffffffffffffffff"));

        let over = BigInt::from(u64::MAX) + 1;
        assert_eq!(enc(over), hex!("c249010000000000000000"));

        let under = below - 1;
        assert_eq!(enc(under), hex!("c349010000000000000000"));
    }

    #[test]
    fn floats_use_shortest_exact_form() {
        assert_eq!(enc(0.0), hex!("f90000"));
        assert_eq!(enc(-0.0), hex!("f98000"));
        assert_eq!(enc(1.0), hex!("f93c00"));
        assert_eq!(enc(1.5), hex!("f93e00"));
        assert_eq!(enc(65504.0), hex!("f97bff"));
        assert_eq!(enc(5.960464477539063e-8), hex!("f90001"));
        assert_eq!(enc(100000.0), hex!("fa47c35000"));
        assert_eq!(enc(3.4028234663852886e38), hex!("fa7f7fffff"));
        assert_eq!(enc(1.1), hex!("fb3ff199999999999a"));
        assert_eq!(enc(1.0e300), hex!("fb7e37e43c8800759c"));
        assert_eq!(enc(f64::INFINITY), hex!("f97c00"));
        assert_eq!(enc(f64::NEG_INFINITY), hex!("f9fc00"));
        assert_eq!(enc(f64::NAN), hex!("f97e00"));
    }

    #[test]
    fn half_precision_decoding() {
        assert_eq!(f16_to_f64(0x3c00), 1.0);
        assert_eq!(f16_to_f64(0x0001), 5.960464477539063e-8);
        assert_eq!(f16_to_f64(0x7bff), 65504.0);
        assert_eq!(f16_to_f64(0xfc00), f64::NEG_INFINITY);
        assert!(f16_to_f64(0x7e00).is_nan());
    }

    #[test]
    fn strings_and_containers() {
        assert_eq!(enc(""), hex!("60"));
        assert_eq!(enc("IETF"), hex!("6449455446"));
        assert_eq!(enc(vec![1u8, 2, 3]), hex!("43010203"));
        assert_eq!(
            enc(vec![CborValue::from(1), CborValue::Null, CborValue::from(true)]),
            hex!("8301f6f5")
        );
        assert_eq!(
            CborValue::tag(1, CborValue::from(1363896240)).unwrap().encode(),
            hex!("c11a514b67b0")
        );
    }
}
