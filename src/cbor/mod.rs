// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Deterministic CBOR.
//!
//! [`CborValue`] has exactly one encoding: integer and length heads are
//! minimal, floats use the shortest exact width, and map keys are sorted by
//! their encoded bytes according to a [`MapOrdering`].  The decoder checks all
//! of this unless asked to be lenient through [`DecodeOptions`].

mod decoder;
mod diagnostic;
mod encoder;
mod errors;
mod interop;
mod map;
mod value;

pub use decoder::{DecodeOptions, Decoder};
pub use errors::Error;
pub use map::{CborMap, MapOrdering};
pub use value::{CborValue, Tagged};

#[cfg(test)]
mod proptests {
    use super::*;
    use num_bigint::BigInt;
    use proptest::prelude::*;

    fn arb_leaf() -> impl Strategy<Value = CborValue> {
        prop_oneof![
            any::<i64>().prop_map(CborValue::from),
            any::<i128>().prop_map(|i| CborValue::from(BigInt::from(i))),
            any::<f64>().prop_map(CborValue::from),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(CborValue::from),
            ".{0,8}".prop_map(CborValue::from),
            any::<bool>().prop_map(CborValue::from),
            Just(CborValue::Null),
        ]
    }

    fn build_map(ordering: MapOrdering, entries: Vec<(CborValue, CborValue)>) -> CborMap {
        let mut m = CborMap::with_ordering(ordering);
        for (k, v) in entries {
            // first occurrence wins
            let _ = m.set(k, v);
        }
        m
    }

    fn arb_value() -> impl Strategy<Value = CborValue> {
        arb_leaf().prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(CborValue::from),
                prop::collection::vec((inner.clone(), inner.clone()), 0..8)
                    .prop_map(|e| CborValue::Map(build_map(MapOrdering::Bytewise, e))),
                (0u64..100_000, inner)
                    .prop_filter_map("bignum tag over a non-byte string", |(t, v)| {
                        CborValue::tag(t, v).ok()
                    }),
                (2u64..4, prop::collection::vec(any::<u8>(), 0..12))
                    .prop_map(|(t, b)| CborValue::tag(t, CborValue::from(b)).unwrap()),
            ]
        })
    }

    proptest! {
        #[test]
        fn encode_decode_round_trip(v in arb_value()) {
            let bytes = v.encode();
            prop_assert_eq!(CborValue::decode(&bytes).unwrap(), v);
        }

        #[test]
        fn diagnostic_round_trip(v in arb_value()) {
            prop_assert_eq!(CborValue::from_diagnostic(&v.to_diagnostic()).unwrap(), v);
        }

        #[test]
        fn insertion_order_is_irrelevant(
            entries in prop::collection::vec((arb_leaf(), arb_leaf()), 0..16)
                .prop_shuffle(),
            ordering in prop_oneof![Just(MapOrdering::Bytewise), Just(MapOrdering::LengthFirst)],
        ) {
            let mut unique = build_map(ordering, entries).iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Vec<_>>();
            let forward = CborValue::Map(build_map(ordering, unique.clone()));
            unique.reverse();
            let backward = CborValue::Map(build_map(ordering, unique));

            prop_assert_eq!(forward.encode(), backward.encode());

            let options = DecodeOptions::default().with_ordering(ordering);
            prop_assert_eq!(CborValue::decode_with(&forward.encode(), options).unwrap(), forward);
        }

        #[test]
        fn nested_maps_share_the_outer_ordering(
            entries in prop::collection::vec((arb_value(), arb_value()), 0..6),
            ordering in prop_oneof![Just(MapOrdering::Bytewise), Just(MapOrdering::LengthFirst)],
        ) {
            let v = CborValue::Map(build_map(ordering, entries));
            let options = DecodeOptions::default().with_ordering(ordering);
            prop_assert_eq!(CborValue::decode_with(&v.encode(), options).unwrap(), v);
        }

        #[test]
        fn duplicate_insertion_fails(
            entries in prop::collection::vec((arb_leaf(), arb_leaf()), 1..16),
            pick in any::<prop::sample::Index>(),
        ) {
            let mut m = build_map(MapOrdering::Bytewise, entries);
            let key = pick.get(&m.keys().cloned().collect::<Vec<_>>()).clone();

            prop_assert!(matches!(m.set(key, CborValue::Null), Err(Error::DuplicateKey(_))));
        }
    }
}
