// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pure data transformations between fetched provider values and secret payloads.

pub mod convert;
pub mod decode;
pub mod property;
pub mod render;
pub mod rewrite;
pub mod template;

use crate::error::{FerryError, Result, ResultExt};
use crate::types::remote::{ConversionStrategy, DecodingStrategy};
use crate::types::rewrite::Rewrite;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub type KeyMap = BTreeMap<String, Vec<u8>>;

/// Decode, convert and rewrite the key map produced by one bulk source.
pub fn shape_bulk(
    map: KeyMap,
    decoding: DecodingStrategy,
    conversion: ConversionStrategy,
    rewrites: &[Rewrite],
) -> Result<KeyMap> {
    let map = decode::decode_map(map, decoding).context("decode")?;
    let map = convert::convert_keys(map, conversion).context("convert")?;
    rewrite::apply_rewrites(map, rewrites)
}

pub fn validate_keys(map: &KeyMap) -> Result<()> {
    match map.keys().find(|k| !convert::is_valid_secret_key(k)) {
        Some(key) => Err(FerryError::ValidationError(format!(
            "invalid secret key {:?}: keys may only contain alphanumerics, '-', '_' and '.'",
            key
        ))),
        None => Ok(()),
    }
}

/// Stable digest of a payload, used to skip writes of unchanged secrets and
/// to notice when the written data was changed behind keyferry's back.
pub fn data_hash(data: &KeyMap, type_: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(type_.unwrap_or("Opaque").as_bytes());
    for (key, value) in data {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::rewrite::RewriteRegexp;

    #[test]
    fn test_shape_bulk_runs_stages_in_order() {
        let map = KeyMap::from([("app/token".to_string(), b"c2VjcmV0".to_vec())]);
        let rewrites = vec![Rewrite {
            regexp: Some(RewriteRegexp {
                source: "^app_U002f_".to_string(),
                target: "".to_string(),
            }),
            ..Default::default()
        }];

        let out = shape_bulk(map, DecodingStrategy::Base64, ConversionStrategy::Unicode, &rewrites)
            .unwrap();
        assert_eq!(out, KeyMap::from([("token".to_string(), b"secret".to_vec())]));
    }

    #[test]
    fn test_validate_keys() {
        assert!(validate_keys(&KeyMap::from([("ok.key".to_string(), vec![])])).is_ok());
        let err = validate_keys(&KeyMap::from([("bad/key".to_string(), vec![])])).unwrap_err();
        assert!(err.to_string().starts_with("invalid secret key \"bad/key\""));
    }

    #[test]
    fn test_data_hash_is_sensitive_to_content() {
        let a = KeyMap::from([("k".to_string(), b"v".to_vec())]);
        let b = KeyMap::from([("k".to_string(), b"w".to_vec())]);

        assert_eq!(data_hash(&a, None), data_hash(&a, Some("Opaque")));
        assert_ne!(data_hash(&a, None), data_hash(&b, None));
        assert_ne!(data_hash(&a, None), data_hash(&a, Some("kubernetes.io/tls")));
    }
}
