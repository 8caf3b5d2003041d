// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::{cbor, crypto};

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("CBOR error: {0}")]
    Cbor(String),
    #[error("Malformed structure: {0}")]
    MalformedStructure(String),
    #[error("Policy violation: {0}")]
    PolicyViolation(String),
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),
    /// Deliberately carries no detail
    #[error("Authentication failure")]
    AuthenticationFailure,
    #[error("Crypto error: {0}")]
    Crypto(crypto::Error),
    #[error("Key locator error: {0}")]
    KeyLocator(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Cbor(e)
            | Error::MalformedStructure(e)
            | Error::PolicyViolation(e)
            | Error::UnknownAlgorithm(e)
            | Error::KeyLocator(e) => {
                write!(f, "{}", e)
            }
            Error::Crypto(e) => write!(f, "{:?}", e),
            Error::AuthenticationFailure => write!(f, "authentication failure"),
        }
    }
}

impl From<cbor::Error> for Error {
    fn from(e: cbor::Error) -> Self {
        match e {
            cbor::Error::NoSuchKey(_)
            | cbor::Error::DuplicateKey(_)
            | cbor::Error::UnreadData(_)
            | cbor::Error::TypeMismatch(_) => Error::MalformedStructure(e.to_string()),
            _ => Error::Cbor(e.to_string()),
        }
    }
}

impl From<crypto::Error> for Error {
    fn from(e: crypto::Error) -> Self {
        match e {
            crypto::Error::AuthenticationFailure => Error::AuthenticationFailure,
            crypto::Error::UnknownAlgorithm(s) => Error::UnknownAlgorithm(s),
            e => Error::Crypto(e),
        }
    }
}
