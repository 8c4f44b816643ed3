// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Ordered rewrite rules over a fetched key map.

use crate::error::{FerryError, Result, ResultExt};
use crate::pipeline::property::value_to_bytes;
use crate::pipeline::template;
use crate::types::rewrite::{
    ConflictPolicy, MergeStrategy, Rewrite, RewriteMerge, RewriteOp, RewriteRegexp,
    RewriteTransform,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

type KeyMap = BTreeMap<String, Vec<u8>>;

pub fn apply_rewrites(mut map: KeyMap, rewrites: &[Rewrite]) -> Result<KeyMap> {
    for (i, rewrite) in rewrites.iter().enumerate() {
        map = apply_one(map, rewrite).with_context(|| format!("rewrite[{}]", i))?;
    }
    Ok(map)
}

fn apply_one(map: KeyMap, rewrite: &Rewrite) -> Result<KeyMap> {
    match rewrite.operation()? {
        RewriteOp::Regexp(rule) => rewrite_regexp(map, rule),
        RewriteOp::Merge(rule) => rewrite_merge(map, rule),
        RewriteOp::Transform(rule) => rewrite_transform(map, rule),
    }
}

fn rewrite_regexp(map: KeyMap, rule: &RewriteRegexp) -> Result<KeyMap> {
    let re = Regex::new(&rule.source).map_err(|e| {
        FerryError::ValidationError(format!("invalid regexp {:?}: {}", rule.source, e))
    })?;
    rekey(map, |key| Ok(re.replace_all(key, rule.target.as_str()).into_owned()))
}

fn rewrite_transform(map: KeyMap, rule: &RewriteTransform) -> Result<KeyMap> {
    rekey(map, |key| {
        template::render(&rule.template, &serde_json::json!({ "value": key }))
    })
}

fn rekey(map: KeyMap, f: impl Fn(&str) -> Result<String>) -> Result<KeyMap> {
    let mut out = KeyMap::new();
    for (key, value) in map {
        let new_key = f(&key)?;
        if out.contains_key(&new_key) {
            return Err(FerryError::ConflictError(format!(
                "rewriting {:?} produced duplicate key {:?}",
                key, new_key
            )));
        }
        out.insert(new_key, value);
    }
    Ok(out)
}

/// Keys in merge order: non-priority keys by name, then priority keys from
/// last to first, so the first priority entry is applied last and wins.
fn merge_order<'a>(map: &'a KeyMap, priority: &[String]) -> Vec<&'a String> {
    let mut order: Vec<&String> = map.keys().filter(|k| !priority.contains(k)).collect();
    order.extend(
        priority
            .iter()
            .rev()
            .filter_map(|p| map.get_key_value(p).map(|(k, _)| k)),
    );
    order
}

fn rewrite_merge(map: KeyMap, rule: &RewriteMerge) -> Result<KeyMap> {
    match rule.strategy {
        MergeStrategy::Extract => {
            let merged = merge_objects(&map, rule)?;
            merged
                .iter()
                .map(|(k, v)| Ok((k.clone(), value_to_bytes(v)?)))
                .collect()
        }
        MergeStrategy::Json => {
            let into = required_into(rule)?;
            let merged = merge_objects(&map, rule)?;
            Ok(KeyMap::from([(into, value_to_bytes(&Value::Object(merged))?)]))
        }
        MergeStrategy::Append => {
            let into = required_into(rule)?;
            let mut order: Vec<&String> = rule
                .priority
                .iter()
                .filter_map(|p| map.get_key_value(p).map(|(k, _)| k))
                .collect();
            order.extend(map.keys().filter(|k| !rule.priority.contains(k)));

            let mut items = Vec::new();
            for key in order {
                match serde_json::from_slice::<Value>(&map[key]) {
                    Ok(Value::Array(values)) => items.extend(values),
                    Ok(value) => items.push(value),
                    Err(_) => items.push(Value::String(
                        String::from_utf8_lossy(&map[key]).into_owned(),
                    )),
                }
            }
            Ok(KeyMap::from([(into, value_to_bytes(&Value::Array(items))?)]))
        }
    }
}

fn required_into(rule: &RewriteMerge) -> Result<String> {
    rule.into
        .clone()
        .filter(|i| !i.is_empty())
        .ok_or_else(|| {
            FerryError::ValidationError(format!(
                "merge strategy {:?} requires `into`",
                rule.strategy
            ))
        })
}

fn merge_objects(map: &KeyMap, rule: &RewriteMerge) -> Result<Map<String, Value>> {
    let mut merged = Map::new();
    let mut origin: BTreeMap<String, &String> = BTreeMap::new();

    for key in merge_order(map, &rule.priority) {
        let object = match serde_json::from_slice::<Value>(&map[key]) {
            Ok(Value::Object(object)) => object,
            _ => {
                return Err(FerryError::ValidationError(format!(
                    "value of key {:?} is not a JSON object",
                    key
                )))
            }
        };

        for (field, value) in object {
            if let (Some(existing), Some(previous)) = (merged.get(&field), origin.get(&field)) {
                let prioritized =
                    rule.priority.contains(key) || rule.priority.contains(*previous);
                if existing != &value
                    && !prioritized
                    && rule.conflict_policy == ConflictPolicy::Error
                {
                    return Err(FerryError::ConflictError(format!(
                        "merge conflict on field {:?} between keys {:?} and {:?}",
                        field, previous, key
                    )));
                }
            }
            origin.insert(field.clone(), key);
            merged.insert(field, value);
        }
    }

    Ok(merged)
}
