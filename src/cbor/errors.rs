// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),
    #[error("Non-canonical ordering: {0}")]
    NonCanonicalOrdering(String),
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("No such key: {0}")]
    NoSuchKey(String),
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Unread data: {0}")]
    UnreadData(String),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Diagnostic notation error: {0}")]
    Diagnostic(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MalformedEncoding(e)
            | Error::NonCanonicalOrdering(e)
            | Error::UnsupportedFeature(e)
            | Error::NoSuchKey(e)
            | Error::DuplicateKey(e)
            | Error::UnreadData(e)
            | Error::TypeMismatch(e)
            | Error::Diagnostic(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
