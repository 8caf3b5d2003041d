// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::constants::{COTX_TAG, CUSTOM_DATA_LABEL, KEY_ID_LABEL};
use super::errors::Error;
use super::policy::{ContainerTag, PolicyHandler};
use crate::cbor::{CborMap, CborValue};

/// Locate the container map inside a plain, tagged, or typed-object value
pub(crate) fn container_mut(value: &mut CborValue) -> Result<&mut CborMap, Error> {
    match value {
        CborValue::Tag(t) => {
            if t.number() == COTX_TAG {
                match t.item_mut() {
                    CborValue::Array(items) => match items.as_mut_slice() {
                        [CborValue::TextString(_), CborValue::Map(m)] => Ok(m),
                        _ => Err(Error::MalformedStructure(
                            "typed object must be [\"type-id\", map]".to_string(),
                        )),
                    },
                    other => Err(Error::MalformedStructure(format!(
                        "typed object wraps {} instead of array",
                        other.type_name()
                    ))),
                }
            } else {
                Ok(t.item_mut().as_map_mut()?)
            }
        }
        other => Ok(other.as_map_mut()?),
    }
}

/// Apply the tag policy and return the container map.  The collector sees
/// the complete tagged item.
pub(crate) fn unwrap_container<'a>(
    value: &'a mut CborValue,
    tag_policy: &PolicyHandler,
) -> Result<&'a mut CborMap, Error> {
    let tagged = matches!(value, CborValue::Tag(_));
    tag_policy.check(if tagged { Some(&*value) } else { None })?;
    container_mut(value)
}

pub(crate) fn wrap_container(
    container: CborMap,
    tag: Option<&ContainerTag>,
) -> Result<CborValue, Error> {
    let wrapped = match tag {
        None => CborValue::Map(container),
        Some(ContainerTag::Plain(t)) => CborValue::tag(*t, CborValue::Map(container))?,
        Some(ContainerTag::TypedObject(type_id)) => CborValue::tag(
            COTX_TAG,
            CborValue::Array(vec![
                CborValue::from(type_id.as_str()),
                CborValue::Map(container),
            ]),
        )?,
    };
    Ok(wrapped)
}

pub(crate) fn get_key_id(map: &CborMap) -> Result<Option<CborValue>, Error> {
    if map.contains_key(KEY_ID_LABEL) {
        return Ok(Some(map.get(KEY_ID_LABEL)?.clone()));
    }
    Ok(None)
}

pub(crate) fn get_custom_data(map: &CborMap, policy: &PolicyHandler) -> Result<(), Error> {
    if map.contains_key(CUSTOM_DATA_LABEL) {
        policy.check(Some(map.get(CUSTOM_DATA_LABEL)?))
    } else {
        policy.check(None)
    }
}
