// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

extern crate cborcrypto;

use cborcrypto::cbor::{CborValue, DecodeOptions, MapOrdering};

fn main() {
    let doc = r#"{
        "name": "sensor-7",
        -1: h'cafe',
        100: [1.5, null, 18446744073709551616],
        1: 1010(["https://example.com/t", {2: true}])
    }"#;

    for ordering in [MapOrdering::Bytewise, MapOrdering::LengthFirst] {
        let v = CborValue::from_diagnostic_with(doc, ordering).unwrap();
        let bytes = v.encode();

        println!("{:?}: {}", ordering, hex::encode(&bytes));

        let options = DecodeOptions::default().with_ordering(ordering);
        let decoded = CborValue::decode_with(&bytes, options).unwrap();
        println!("{}", decoded.to_diagnostic());
    }
}
