// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reversible escaping of key names that are not valid secret keys.
//!
//! `Unicode` replaces every character outside `[-._a-zA-Z0-9]` with
//! `_U<hex>_`, using at least four lowercase hex digits. Reverting only
//! touches escapes in exactly that canonical form, so a valid key survives
//! a revert followed by a convert unchanged.

use crate::error::{FerryError, Result};
use crate::types::remote::ConversionStrategy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_U([0-9a-f]{4,6})_").expect("escape pattern is valid")
});

pub fn is_valid_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')
}

pub fn is_valid_secret_key(key: &str) -> bool {
    !key.is_empty() && key != "." && key != ".." && key.len() <= 253 && key.chars().all(is_valid_key_char)
}

pub fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for c in key.chars() {
        if is_valid_key_char(c) {
            escaped.push(c);
        } else {
            escaped.push_str(&format!("_U{:04x}_", c as u32));
        }
    }
    escaped
}

pub fn revert_key(key: &str) -> String {
    ESCAPE
        .replace_all(key, |caps: &Captures| {
            let whole = &caps[0];
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .filter(|c| !is_valid_key_char(*c) && format!("_U{:04x}_", *c as u32) == whole)
                .map(String::from)
                .unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

/// Apply `strategy` to every key; two keys escaping to the same name is a conflict.
pub fn convert_keys(
    map: BTreeMap<String, Vec<u8>>,
    strategy: ConversionStrategy,
) -> Result<BTreeMap<String, Vec<u8>>> {
    match strategy {
        ConversionStrategy::Default => Ok(map),
        ConversionStrategy::Unicode => rekey(map, escape_key),
    }
}

pub fn revert_keys(map: BTreeMap<String, Vec<u8>>) -> Result<BTreeMap<String, Vec<u8>>> {
    rekey(map, revert_key)
}

fn rekey(
    map: BTreeMap<String, Vec<u8>>,
    f: impl Fn(&str) -> String,
) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut out = BTreeMap::new();
    for (key, value) in map {
        let new_key = f(&key);
        if out.contains_key(&new_key) {
            return Err(FerryError::ConflictError(format!(
                "key {:?} converts to {:?}, which is already present",
                key, new_key
            )));
        }
        out.insert(new_key, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(is_valid_secret_key("db.password-1_x"));
        assert!(!is_valid_secret_key(""));
        assert!(!is_valid_secret_key(".."));
        assert!(!is_valid_secret_key("a/b"));
        assert!(!is_valid_secret_key("a b"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_key("some-array[0].entity"), "some-array_U005b_0_U005d_.entity");
        assert_eq!(escape_key("path/to"), "path_U002f_to");
        assert_eq!(escape_key("é"), "_U00e9_");
        assert_eq!(escape_key("🔑"), "_U1f511_");
    }

    #[test]
    fn test_revert() {
        assert_eq!(revert_key("some-array_U005b_0_U005d_.entity"), "some-array[0].entity");
        assert_eq!(revert_key("_U1f511_"), "🔑");
    }

    #[test]
    fn test_revert_leaves_non_canonical_escapes() {
        // 'a' is a valid key character, so it is never escaped
        assert_eq!(revert_key("_U0061_"), "_U0061_");
        // too many digits for the code point
        assert_eq!(revert_key("_U0002f_"), "_U0002f_");
        assert_eq!(revert_key("_U005B_"), "_U005B_");
    }

    #[test]
    fn test_convert_after_revert_is_identity() {
        let keys = [
            "plain",
            "some-array_U005b_0_U005d_.entity",
            "_U0061_",
            "_U0002f_",
            "x_U005b_U005d_",
            "_U005b__U005d_",
            "trailing_U",
            "_U1f511_",
        ];
        for key in keys {
            assert!(is_valid_secret_key(key), "{}", key);
            assert_eq!(escape_key(&revert_key(key)), key, "round trip of {}", key);
        }
    }

    #[test]
    fn test_convert_keys_collision() {
        let map = BTreeMap::from([
            ("a/b".to_string(), b"1".to_vec()),
            ("a_U002f_b".to_string(), b"2".to_vec()),
        ]);
        let err = convert_keys(map, ConversionStrategy::Unicode).unwrap_err();
        assert!(matches!(err, FerryError::ConflictError(_)));
    }

    #[test]
    fn test_default_is_noop() {
        let map = BTreeMap::from([("a/b".to_string(), b"1".to_vec())]);
        assert_eq!(convert_keys(map.clone(), ConversionStrategy::Default).unwrap(), map);
    }
}
