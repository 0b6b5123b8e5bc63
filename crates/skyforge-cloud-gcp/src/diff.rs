//! Desired/live comparison
//!
//! Live objects carry many server-populated fields, so a resource is up to
//! date when every field it declares matches the live object.

use crate::api::ResourceKind;
use serde_json::Value;

/// Whether every field of `desired` is present in `live` with the same value
///
/// Declared zero values (`false`, `0`, `""`, empty arrays and objects) match
/// absent live fields, since the APIs omit defaults.
pub fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => d.iter().all(|(k, dv)| match l.get(k) {
            Some(lv) => is_subset(dv, lv),
            None => is_zero(dv),
        }),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| is_subset(dv, lv))
        }
        (Value::Number(d), Value::Number(l)) => d.as_f64() == l.as_f64(),
        // int64 fields come back as strings
        (Value::Number(d), Value::String(l)) => d.to_string() == *l,
        (d, Value::Null) => is_zero(d),
        (d, l) => d == l,
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.values().all(is_zero),
    }
}

/// Top-level fields of `desired` that do not match `live`
pub fn changed_fields(desired: &Value, live: &Value) -> Vec<String> {
    let Some(fields) = desired.as_object() else {
        return Vec::new();
    };
    fields
        .iter()
        .filter(|(k, dv)| match live.get(k.as_str()) {
            Some(lv) => !is_subset(dv, lv),
            None => !is_zero(dv),
        })
        .map(|(k, _)| k.clone())
        .collect()
}

/// Whether the changed fields force delete-and-recreate
pub fn needs_replace(kind: ResourceKind, changed: &[String]) -> bool {
    if changed.is_empty() {
        return false;
    }
    kind.replace_only()
        || changed
            .iter()
            .any(|f| kind.immutable_fields().contains(&f.as_str()))
}

/// Bring a live object into the shape used in desired bodies
pub fn normalize_live(kind: ResourceKind, mut live: Value) -> Value {
    if kind == ResourceKind::ForwardingRule {
        // "443-443" -> "443"
        if let Some(range) = live.get("portRange").and_then(Value::as_str) {
            if let Some((low, high)) = range.split_once('-') {
                if low == high {
                    live["portRange"] = Value::String(low.to_string());
                }
            }
        }
    }
    live
}
