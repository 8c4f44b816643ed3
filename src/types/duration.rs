// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Parsing of refresh intervals such as `1h`, `30m`, `1h30m` or `0`.

use crate::error::{FerryError, Result};
use std::time::Duration;

pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err(invalid(input, "empty duration"));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid(input, "missing unit"))?;
        if digits == 0 {
            return Err(invalid(input, "expected a number"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| invalid(input, "number out of range"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "d" => Duration::from_secs(value * 86400),
            other => return Err(invalid(input, &format!("unknown unit {:?}", other))),
        };
        total += part;
    }

    Ok(total)
}

fn invalid(input: &str, why: &str) -> FerryError {
    FerryError::ValidationError(format!("invalid duration {:?}: {}", input, why))
}
