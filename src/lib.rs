// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Deterministic CBOR with signature and encryption envelopes.
//!
//! The crate is layered:
//! * [`cbor`]: a value model whose encoding is unique, a decoder that
//!   enforces it, and a diagnostic notation for humans
//! * [`crypto`]: algorithm registries and OpenSSL-backed primitives,
//!   including conversion between DER and concatenated ECDSA signatures
//! * [`cose`]: COSE keys, and envelopes that sign or encrypt CBOR maps with
//!   the authenticated data recomputed from the canonical encoding
//! * [`store`]: named keys loaded from JSON, for the command line tool
//!
//! The deterministic encoding rules follow §4.2 of [RFC8949], with the
//! length-first map ordering of §3.9 of [RFC7049] selectable per map.
//!
//! [RFC8949]: https://www.rfc-editor.org/rfc/rfc8949
//! [RFC7049]: https://www.rfc-editor.org/rfc/rfc7049

pub mod cbor;
pub mod cose;
pub mod crypto;
pub mod store;
