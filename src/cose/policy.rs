// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use crate::cbor::CborValue;

/// Whether an optional envelope feature may, must, or must not be present
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    #[default]
    Forbidden,
    Optional,
    Mandatory,
}

/// Receives a tag or custom data item found in an envelope so the caller
/// can vet it.  Returning an error aborts the operation.
pub trait Collector: Send + Sync {
    fn collect(&self, value: &CborValue) -> Result<(), Error>;
}

impl<F> Collector for F
where
    F: Fn(&CborValue) -> Result<(), Error> + Send + Sync,
{
    fn collect(&self, value: &CborValue) -> Result<(), Error> {
        self(value)
    }
}

/// Collector that accepts anything
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl Collector for AcceptAll {
    fn collect(&self, _value: &CborValue) -> Result<(), Error> {
        Ok(())
    }
}

pub(crate) struct PolicyHandler {
    what: &'static str,
    policy: Policy,
    collector: Box<dyn Collector>,
}

impl PolicyHandler {
    pub(crate) fn forbidden(what: &'static str) -> Self {
        Self {
            what,
            policy: Policy::Forbidden,
            collector: Box::new(AcceptAll),
        }
    }

    pub(crate) fn set(&mut self, policy: Policy, collector: impl Collector + 'static) {
        self.policy = policy;
        self.collector = Box::new(collector);
    }

    /// Apply the policy to an item that may or may not be present
    pub(crate) fn check(&self, found: Option<&CborValue>) -> Result<(), Error> {
        match (found, self.policy) {
            (Some(_), Policy::Forbidden) => {
                tracing::warn!(what = self.what, "forbidden element present");
                Err(Error::PolicyViolation(format!("{} not allowed", self.what)))
            }
            (None, Policy::Mandatory) => {
                tracing::warn!(what = self.what, "mandatory element missing");
                Err(Error::PolicyViolation(format!("{} missing", self.what)))
            }
            (Some(v), _) => self.collector.collect(v),
            (None, _) => Ok(()),
        }
    }
}

/// How an envelope is wrapped when it is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerTag {
    /// `tag({...})`
    Plain(u64),
    /// `1010(["type-id", {...}])`
    TypedObject(String),
}
