// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::defaults::PASSWORD_LENGTH;
use crate::error::{FerryError, Result};
use crate::generator::{parse_spec, Generator, GeneratorOutput};
use async_trait::async_trait;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::Deserialize;
use std::collections::BTreeMap;

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "~!@#$%^&*()_+`-={}|[]\\:\"<>?,./";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSpec {
    #[serde(default = "default_length")]
    pub length: usize,
    /// Number of digits, a quarter of the length when unset
    #[serde(default)]
    pub digits: Option<usize>,
    /// Number of symbols, a quarter of the length when unset
    #[serde(default)]
    pub symbols: Option<usize>,
    #[serde(default)]
    pub symbol_characters: Option<String>,
    #[serde(default)]
    pub no_upper: bool,
    #[serde(default = "default_true")]
    pub allow_repeat: bool,
}

fn default_length() -> usize {
    PASSWORD_LENGTH
}

fn default_true() -> bool {
    true
}

pub struct PasswordGenerator;

#[async_trait]
impl Generator for PasswordGenerator {
    async fn generate(&self, spec: &serde_json::Value, _namespace: &str) -> Result<GeneratorOutput> {
        let spec: PasswordSpec = parse_spec("Password", spec)?;
        let password = generate_password(&spec)?;
        Ok(GeneratorOutput {
            data: BTreeMap::from([("password".to_string(), password.into_bytes())]),
            cleanup: None,
        })
    }
}

pub fn generate_password(spec: &PasswordSpec) -> Result<String> {
    let digits = spec.digits.unwrap_or(spec.length / 4);
    let symbols = spec.symbols.unwrap_or(spec.length / 4);
    if spec.length == 0 {
        return Err(FerryError::GeneratorError("password length must be positive".to_string()));
    }
    if digits + symbols > spec.length {
        return Err(FerryError::GeneratorError(format!(
            "{} digits and {} symbols do not fit in a password of length {}",
            digits, symbols, spec.length
        )));
    }

    let mut letters: Vec<char> = LOWER.chars().collect();
    if !spec.no_upper {
        letters.extend(UPPER.chars());
    }
    let digit_chars: Vec<char> = DIGITS.chars().collect();
    let symbol_chars: Vec<char> = spec
        .symbol_characters
        .as_deref()
        .unwrap_or(SYMBOLS)
        .chars()
        .collect();

    let mut rng = rand::rng();
    let mut password = Vec::with_capacity(spec.length);
    for (pool, count, what) in [
        (&letters, spec.length - digits - symbols, "letters"),
        (&digit_chars, digits, "digits"),
        (&symbol_chars, symbols, "symbols"),
    ] {
        if count == 0 {
            continue;
        }
        if pool.is_empty() || (!spec.allow_repeat && count > pool.len()) {
            return Err(FerryError::GeneratorError(format!(
                "not enough {} available for {} characters without repeats",
                what, count
            )));
        }
        if spec.allow_repeat {
            for _ in 0..count {
                if let Some(c) = pool.choose(&mut rng) {
                    password.push(*c);
                }
            }
        } else {
            password.extend(pool.choose_multiple(&mut rng, count).copied());
        }
    }
    password.shuffle(&mut rng);

    Ok(password.into_iter().collect())
}
