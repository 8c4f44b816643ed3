// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Byte-level decoding of fetched values.

use crate::error::{FerryError, Result};
use crate::types::remote::DecodingStrategy;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use std::collections::BTreeMap;

pub fn decode_value(value: &[u8], strategy: DecodingStrategy) -> Result<Vec<u8>> {
    match strategy {
        DecodingStrategy::None => Ok(value.to_vec()),
        DecodingStrategy::Base64 => STANDARD
            .decode(trim_ascii(value))
            .or_else(|_| STANDARD_NO_PAD.decode(trim_ascii(value)))
            .map_err(|e| FerryError::ValidationError(format!("failed to decode base64: {}", e))),
        DecodingStrategy::Base64Url => URL_SAFE
            .decode(trim_ascii(value))
            .or_else(|_| URL_SAFE_NO_PAD.decode(trim_ascii(value)))
            .map_err(|e| {
                FerryError::ValidationError(format!("failed to decode base64url: {}", e))
            }),
        DecodingStrategy::Auto => {
            let trimmed = trim_ascii(value);
            let decoded = [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD]
                .iter()
                .find_map(|engine| engine.decode(trimmed).ok());
            Ok(decoded.unwrap_or_else(|| value.to_vec()))
        }
    }
}

/// Decode every value of `map`, naming the failing key in the error.
pub fn decode_map(
    map: BTreeMap<String, Vec<u8>>,
    strategy: DecodingStrategy,
) -> Result<BTreeMap<String, Vec<u8>>> {
    if strategy == DecodingStrategy::None {
        return Ok(map);
    }
    map.into_iter()
        .map(|(key, value)| {
            let decoded = decode_value(&value, strategy)
                .map_err(|e| e.context(format!("decoding key {:?}", key)))?;
            Ok((key, decoded))
        })
        .collect()
}

fn trim_ascii(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(value.len());
    let end = value
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &value[start..end]
}
