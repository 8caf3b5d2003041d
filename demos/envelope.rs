// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

extern crate cborcrypto;

use cborcrypto::cbor::{CborMap, CborValue};
use cborcrypto::cose::{
    AsymSigner, AsymVerifier, Decrypter, Encrypter, Signer, SymKeyEncapsulation, SymKeyRecovery,
    Validator,
};
use cborcrypto::crypto::{AsymSignatureAlgorithm, ContentEncryptionAlgorithm};
use cborcrypto::store::{IKeyStore, MemoKeyStore};
use std::fs;

fn main() {
    let ks = MemoKeyStore::new();
    ks.load_json(&fs::read_to_string("testdata/keys.json").unwrap())
        .unwrap();

    encrypt_decrypt(&ks);
    sign_validate(&ks);
}

fn encrypt_decrypt(ks: &MemoKeyStore) {
    let secret = ks.lookup("sym-128").unwrap().secret().unwrap().to_vec();

    let envelope = Encrypter::new(
        ContentEncryptionAlgorithm::A128Gcm,
        SymKeyEncapsulation::new(secret.clone()),
    )
    .with_key_id("sym-128")
    .encrypt(b"attack at dawn")
    .unwrap();

    println!("{}", envelope.to_diagnostic());

    let plain_text = Decrypter::new(SymKeyRecovery::new_fixed(secret))
        .decrypt(&envelope)
        .unwrap();
    println!("{}", String::from_utf8_lossy(&plain_text));
}

fn sign_validate(ks: &MemoKeyStore) {
    let entry = ks.lookup("p256").unwrap();
    let private_key = entry.private_key().unwrap().clone();
    let public_key = entry.public_key().unwrap().unwrap();

    let mut doc = CborMap::new();
    doc.set("statement", "hello").unwrap();

    let signer = AsymSigner::new(AsymSignatureAlgorithm::Es256, private_key).unwrap();
    let signed = Signer::new(signer)
        .with_key_id("p256")
        .sign(0, CborValue::Map(doc))
        .unwrap();

    println!("{}", signed.to_diagnostic());

    Validator::new(AsymVerifier::new_fixed(public_key))
        .validate(0, &signed)
        .unwrap();
    println!("signature ok");
}
