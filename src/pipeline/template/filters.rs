// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The fixed set of functions callable from templates.

use crate::error::{FerryError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

fn err(msg: impl Into<String>) -> FerryError {
    FerryError::TemplateError(msg.into())
}

fn arity(name: &str, args: &[Value], want: usize) -> Result<()> {
    if args.len() != want {
        return Err(err(format!(
            "wrong number of args for {}: want {} got {}",
            name,
            want,
            args.len()
        )));
    }
    Ok(())
}

fn text(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(err(format!("{}: expected a string argument", name))),
    }
}

/// Parse strings holding JSON objects or arrays so they can be navigated.
pub fn structured(value: Value) -> Value {
    match value {
        Value::String(s) if s.trim_start().starts_with(['{', '[']) => {
            serde_json::from_str(&s).unwrap_or(Value::String(s))
        }
        other => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    out
}

pub fn call(name: &str, args: Vec<Value>) -> Result<Value> {
    let s = |i: usize| text(name, &args[i]);

    let value = match name {
        "upper" => {
            arity(name, &args, 1)?;
            Value::String(s(0)?.to_uppercase())
        }
        "lower" => {
            arity(name, &args, 1)?;
            Value::String(s(0)?.to_lowercase())
        }
        "title" => {
            arity(name, &args, 1)?;
            Value::String(title(&s(0)?))
        }
        "trim" => {
            arity(name, &args, 1)?;
            Value::String(s(0)?.trim().to_string())
        }
        "trimPrefix" => {
            arity(name, &args, 2)?;
            let (prefix, input) = (s(0)?, s(1)?);
            Value::String(input.strip_prefix(&prefix).unwrap_or(&input).to_string())
        }
        "trimSuffix" => {
            arity(name, &args, 2)?;
            let (suffix, input) = (s(0)?, s(1)?);
            Value::String(input.strip_suffix(&suffix).unwrap_or(&input).to_string())
        }
        "replace" => {
            arity(name, &args, 3)?;
            Value::String(s(2)?.replace(&s(0)?, &s(1)?))
        }
        "quote" => {
            arity(name, &args, 1)?;
            Value::String(
                serde_json::to_string(&s(0)?).map_err(|e| err(format!("quote: {}", e)))?,
            )
        }
        "squote" => {
            arity(name, &args, 1)?;
            Value::String(format!("'{}'", s(0)?))
        }
        "default" => {
            arity(name, &args, 2)?;
            if is_empty(&args[1]) {
                args[0].clone()
            } else {
                args[1].clone()
            }
        }
        "b64enc" => {
            arity(name, &args, 1)?;
            Value::String(STANDARD.encode(s(0)?))
        }
        "b64dec" => {
            arity(name, &args, 1)?;
            let decoded = STANDARD
                .decode(s(0)?.trim())
                .map_err(|e| err(format!("b64dec: {}", e)))?;
            Value::String(
                String::from_utf8(decoded)
                    .map_err(|_| err("b64dec: decoded value is not valid UTF-8"))?,
            )
        }
        "toJson" => {
            arity(name, &args, 1)?;
            Value::String(
                serde_json::to_string(&args[0]).map_err(|e| err(format!("toJson: {}", e)))?,
            )
        }
        "fromJson" => {
            arity(name, &args, 1)?;
            serde_json::from_str(&s(0)?).map_err(|e| err(format!("fromJson: {}", e)))?
        }
        "toYaml" => {
            arity(name, &args, 1)?;
            let yaml =
                serde_yaml::to_string(&args[0]).map_err(|e| err(format!("toYaml: {}", e)))?;
            Value::String(yaml.trim_end().to_string())
        }
        "fromYaml" => {
            arity(name, &args, 1)?;
            serde_yaml::from_str(&s(0)?).map_err(|e| err(format!("fromYaml: {}", e)))?
        }
        "get" => {
            arity(name, &args, 2)?;
            let key = s(0)?;
            match structured(args[1].clone()) {
                Value::Object(map) => map.get(&key).cloned().unwrap_or(Value::String(String::new())),
                _ => return Err(err("get: expected an object")),
            }
        }
        "index" => {
            if args.is_empty() {
                return Err(err("wrong number of args for index: want at least 1 got 0"));
            }
            let mut current = args[0].clone();
            for key in &args[1..] {
                current = match (structured(current), key) {
                    (Value::Object(mut map), Value::String(k)) => map
                        .remove(k)
                        .ok_or_else(|| err(format!("map has no entry for key {:?}", k)))?,
                    (Value::Array(items), Value::Number(n)) => n
                        .as_u64()
                        .and_then(|i| items.get(i as usize).cloned())
                        .ok_or_else(|| err(format!("index out of range: {}", n)))?,
                    (other, key) => {
                        return Err(err(format!("can't index item of type {} with {}", kind(&other), key)))
                    }
                };
            }
            current
        }
        "sha256sum" => {
            arity(name, &args, 1)?;
            Value::String(format!("{:x}", Sha256::digest(s(0)?.as_bytes())))
        }
        "now" => {
            arity(name, &args, 0)?;
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        "date" => {
            arity(name, &args, 2)?;
            let layout = s(0)?;
            let items: Vec<Item> = StrftimeItems::new(&layout).collect();
            if items.iter().any(|i| matches!(i, Item::Error)) {
                return Err(err(format!("date: invalid layout {:?}", layout)));
            }
            let when = s(1)?;
            let parsed = DateTime::parse_from_rfc3339(&when)
                .map_err(|e| err(format!("date: cannot parse {:?}: {}", when, e)))?;
            Value::String(parsed.format_with_items(items.iter()).to_string())
        }
        other => return Err(err(format!("function {:?} not defined", other))),
    };

    Ok(value)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_str(name: &str, args: Vec<Value>) -> String {
        match call(name, args).unwrap() {
            Value::String(s) => s,
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call_str("upper", vec![json!("value")]), "VALUE");
        assert_eq!(call_str("lower", vec![json!("VaLuE")]), "value");
        assert_eq!(call_str("title", vec![json!("hello big-world")]), "Hello Big-World");
        assert_eq!(call_str("trim", vec![json!("  x ")]), "x");
        assert_eq!(call_str("trimPrefix", vec![json!("db-"), json!("db-user")]), "user");
        assert_eq!(call_str("trimSuffix", vec![json!(".com"), json!("a.com")]), "a");
        assert_eq!(call_str("replace", vec![json!("-"), json!("_"), json!("a-b-c")]), "a_b_c");
        assert_eq!(call_str("quote", vec![json!("a\"b")]), r#""a\"b""#);
        assert_eq!(call_str("squote", vec![json!("x")]), "'x'");
    }

    #[test]
    fn test_default() {
        assert_eq!(call_str("default", vec![json!("fallback"), json!("")]), "fallback");
        assert_eq!(call_str("default", vec![json!("fallback"), json!("set")]), "set");
    }

    #[test]
    fn test_base64() {
        assert_eq!(call_str("b64enc", vec![json!("hi")]), "aGk=");
        assert_eq!(call_str("b64dec", vec![json!("aGk=")]), "hi");
        // 0xff is not valid UTF-8
        assert!(call("b64dec", vec![json!("/w==")]).is_err());
    }

    #[test]
    fn test_json_and_yaml() {
        assert_eq!(call_str("toJson", vec![json!({"a": 1})]), r#"{"a":1}"#);
        assert_eq!(call("fromJson", vec![json!(r#"{"a":1}"#)]).unwrap(), json!({"a": 1}));
        assert_eq!(call_str("toYaml", vec![json!({"a": "b"})]), "a: b");
        assert_eq!(call("fromYaml", vec![json!("a: b")]).unwrap(), json!({"a": "b"}));
    }

    #[test]
    fn test_get_and_index() {
        assert_eq!(call_str("get", vec![json!("user"), json!(r#"{"user":"bob"}"#)]), "bob");
        assert_eq!(call_str("get", vec![json!("nope"), json!({"user": "bob"})]), "");
        assert_eq!(
            call_str("index", vec![json!({"tls.crt": "pem"}), json!("tls.crt")]),
            "pem"
        );
        assert_eq!(call_str("index", vec![json!(["a", "b"]), json!(1)]), "b");
        assert!(call("index", vec![json!({}), json!("missing")]).is_err());
    }

    #[test]
    fn test_sha256sum() {
        assert_eq!(
            call_str("sha256sum", vec![json!("abc")]),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_date() {
        assert_eq!(
            call_str("date", vec![json!("%Y-%m-%d"), json!("2024-02-29T10:00:00Z")]),
            "2024-02-29"
        );
        assert!(call("date", vec![json!("%Q"), json!("2024-02-29T10:00:00Z")]).is_err());
        assert!(call_str("now", vec![]).ends_with('Z'));
    }

    #[test]
    fn test_unknown_function_and_arity() {
        let err = call("shout", vec![json!("x")]).unwrap_err();
        assert_eq!(err.to_string(), "function \"shout\" not defined");

        let err = call("upper", vec![json!("a"), json!("b")]).unwrap_err();
        assert_eq!(err.to_string(), "wrong number of args for upper: want 1 got 2");
    }
}
