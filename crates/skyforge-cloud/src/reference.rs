//! Attribute references between resources
//!
//! A resource body may point at a runtime attribute of another resource
//! (an instance's `host`, an address's `address`, a backend's `selfLink`).
//! References are stored inline in the JSON body as
//! `{"$ref": "<type>:<id>", "attr": "<name>"}` and replaced with the real
//! value right before the resource is applied.

use crate::error::{CloudError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

const REF_KEY: &str = "$ref";
const ATTR_KEY: &str = "attr";

/// Runtime attributes reported for one resource
pub type Attributes = HashMap<String, Value>;

/// A reference to one attribute of another resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrRef {
    /// Resource key (`type:id`)
    pub resource: String,
    /// Attribute name
    pub attribute: String,
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// Build a reference value to embed in a resource body
pub fn attr(resource_key: impl Into<String>, attribute: impl Into<String>) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(REF_KEY.to_string(), Value::String(resource_key.into()));
    map.insert(ATTR_KEY.to_string(), Value::String(attribute.into()));
    Value::Object(map)
}

/// Interpret a value as a reference, if it is one
pub fn as_reference(value: &Value) -> Option<AttrRef> {
    let obj = value.as_object()?;
    if obj.len() != 2 {
        return None;
    }
    let resource = obj.get(REF_KEY)?.as_str()?;
    let attribute = obj.get(ATTR_KEY)?.as_str()?;
    Some(AttrRef {
        resource: resource.to_string(),
        attribute: attribute.to_string(),
    })
}

/// Collect every reference contained in a value
pub fn references(value: &Value) -> Vec<AttrRef> {
    let mut found = Vec::new();
    collect(value, &mut found);
    found
}

fn collect(value: &Value, found: &mut Vec<AttrRef>) {
    if let Some(reference) = as_reference(value) {
        found.push(reference);
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect(v, found)),
        _ => {}
    }
}

/// Replace every reference in `value` with the attribute it points at
///
/// Fails when the referenced resource has not reported attributes yet, or
/// when the attribute is missing, null or an empty string.
pub fn resolve(value: &Value, known: &HashMap<String, Attributes>) -> Result<Value> {
    if let Some(reference) = as_reference(value) {
        return lookup(&reference, known);
    }
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| resolve(v, known))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(k.clone(), resolve(v, known)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Like [`resolve`], but returns `None` instead of failing
///
/// Used at plan time, when upstream resources may not exist yet.
pub fn try_resolve(value: &Value, known: &HashMap<String, Attributes>) -> Option<Value> {
    resolve(value, known).ok()
}

fn lookup(reference: &AttrRef, known: &HashMap<String, Attributes>) -> Result<Value> {
    let attributes =
        known
            .get(&reference.resource)
            .ok_or_else(|| CloudError::UnresolvedReference {
                reference: reference.to_string(),
                reason: "resource has not been applied".to_string(),
            })?;

    match attributes.get(&reference.attribute) {
        None | Some(Value::Null) => Err(CloudError::UnresolvedReference {
            reference: reference.to_string(),
            reason: "attribute is not available".to_string(),
        }),
        Some(Value::String(s)) if s.is_empty() => Err(CloudError::UnresolvedReference {
            reference: reference.to_string(),
            reason: "attribute is empty".to_string(),
        }),
        Some(v) => Ok(v.clone()),
    }
}
