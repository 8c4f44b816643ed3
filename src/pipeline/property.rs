// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by provider adapters: property access into structured
//! values, structured value to key map decoding, and find matching.

use crate::error::{FerryError, Result};
use crate::types::remote::FindSpec;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parse a value as JSON, falling back to YAML.
pub fn parse_structured(raw: &[u8]) -> Result<Value> {
    if let Ok(value) = serde_json::from_slice::<Value>(raw) {
        return Ok(value);
    }
    serde_yaml::from_slice::<Value>(raw)
        .map_err(|e| FerryError::ValidationError(format!("value is neither JSON nor YAML: {}", e)))
}

/// Strings are returned verbatim, everything else as compact JSON.
pub fn value_to_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        other => serde_json::to_vec(other)
            .map_err(|e| FerryError::ValidationError(format!("failed to encode value: {}", e))),
    }
}

/// Look up `property` in a structured value.
///
/// An exact top-level key wins; otherwise the property is read as a dot
/// separated path where `\.` stands for a literal dot. Array elements are
/// addressed by index.
pub fn lookup<'a>(value: &'a Value, property: &str) -> Option<&'a Value> {
    if let Some(found) = value.as_object().and_then(|o| o.get(property)) {
        return Some(found);
    }
    split_path(property)
        .iter()
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn split_path(property: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = property.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                chars.next();
                current.push('.');
            }
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}

/// The bytes of `property` inside `raw`; a missing property is `NotFound`.
pub fn extract_property(raw: &[u8], property: &str) -> Result<Vec<u8>> {
    let value = parse_structured(raw)?;
    let found = lookup(&value, property)
        .ok_or_else(|| FerryError::NotFound(format!("property {:?} not found", property)))?;
    value_to_bytes(found)
}

/// Decode a structured value into a key map, optionally below `property`.
///
/// A missing property yields an empty map.
pub fn extract_map(raw: &[u8], property: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>> {
    let value = parse_structured(raw)?;
    let value = match property.filter(|p| !p.is_empty()) {
        Some(property) => match lookup(&value, property) {
            Some(found) => found.clone(),
            None => return Ok(BTreeMap::new()),
        },
        None => value,
    };
    value_to_map(&value)
}

pub fn value_to_map(value: &Value) -> Result<BTreeMap<String, Vec<u8>>> {
    let object = value.as_object().ok_or_else(|| {
        FerryError::ValidationError("value is not an object and cannot be extracted".to_string())
    })?;
    object
        .iter()
        .map(|(k, v)| Ok((k.clone(), value_to_bytes(v)?)))
        .collect()
}

/// Set `property` of the JSON object in `existing` to `value`, creating the object if needed.
pub fn set_property(existing: Option<&[u8]>, property: &str, value: &[u8]) -> Result<Vec<u8>> {
    let mut object = match existing {
        Some(raw) if !raw.is_empty() => match parse_structured(raw)? {
            Value::Object(map) => map,
            _ => {
                return Err(FerryError::ValidationError(format!(
                    "cannot set property {:?}: existing value is not an object",
                    property
                )))
            }
        },
        _ => Map::new(),
    };
    let text = String::from_utf8(value.to_vec()).map_err(|_| {
        FerryError::ValidationError(format!("value for property {:?} is not valid UTF-8", property))
    })?;
    object.insert(property.to_string(), Value::String(text));
    value_to_bytes(&Value::Object(object))
}

/// Remove `property`; `None` when nothing is left of the object.
pub fn remove_property(existing: &[u8], property: &str) -> Result<Option<Vec<u8>>> {
    match parse_structured(existing)? {
        Value::Object(mut map) => {
            map.remove(property);
            if map.is_empty() {
                Ok(None)
            } else {
                value_to_bytes(&Value::Object(map)).map(Some)
            }
        }
        _ => Ok(None),
    }
}

/// Compiled form of a [`FindSpec`].
#[derive(Debug)]
pub struct FindMatcher {
    name: Option<Regex>,
    tags: BTreeMap<String, String>,
    path: Option<String>,
}

impl FindMatcher {
    pub fn new(find: &FindSpec) -> Result<Self> {
        let name = find
            .name
            .as_ref()
            .map(|n| {
                Regex::new(&n.regexp).map_err(|e| {
                    FerryError::ValidationError(format!("invalid find regexp {:?}: {}", n.regexp, e))
                })
            })
            .transpose()?;

        Ok(FindMatcher {
            name,
            tags: find.tags.clone(),
            path: find.path.clone().filter(|p| !p.is_empty()),
        })
    }

    pub fn matches(&self, name: &str, tags: &BTreeMap<String, String>) -> bool {
        self.path.as_deref().is_none_or(|p| name.starts_with(p))
            && self.name.as_ref().is_none_or(|re| re.is_match(name))
            && self.tags.iter().all(|(k, v)| tags.get(k) == Some(v))
    }
}
