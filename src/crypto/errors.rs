// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Signature format error: {0}")]
    SignatureFormat(String),
    #[error("Algorithm/key mismatch: {0}")]
    AlgorithmKeyMismatch(String),
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),
    /// Deliberately carries no detail
    #[error("Authentication failure")]
    AuthenticationFailure,
    #[error("General security error: {0}")]
    GeneralSecurity(String),
    #[error("Crypto provider error: {0}")]
    Provider(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SignatureFormat(e)
            | Error::AlgorithmKeyMismatch(e)
            | Error::UnknownAlgorithm(e)
            | Error::GeneralSecurity(e)
            | Error::Provider(e) => {
                write!(f, "{}", e)
            }
            Error::AuthenticationFailure => write!(f, "authentication failure"),
        }
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Error::Provider(format!("{e:?}"))
    }
}
