// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Signature and encryption envelopes expressed as deterministic CBOR maps,
//! plus the COSE key format used to carry public keys inside them.
//!
//! Authenticated data is never taken from the wire: it is the canonical
//! encoding of the envelope with the protected output fields removed, which
//! is well defined only because every [`crate::cbor::CborValue`] has exactly
//! one encoding.

pub mod constants;
mod crypto_utils;
mod decrypter;
mod encrypter;
mod errors;
mod policy;
mod public_key;
mod signer;
mod validator;

pub use decrypter::{AsymKeyRecovery, Decrypter, KeyRecovery, SymKeyRecovery};
pub use encrypter::{AsymKeyEncapsulation, Encrypter, KeyEncapsulation, SymKeyEncapsulation};
pub use errors::Error;
pub use policy::{AcceptAll, Collector, ContainerTag, Policy};
pub use public_key::{decode_public_key, encode_public_key};
pub use signer::{AsymSigner, HmacSigner, SignatureProvider, Signer};
pub use validator::{AsymVerifier, HmacVerifier, SignatureVerification, Validator};
