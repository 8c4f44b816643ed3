// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! A small template language: `{{ .key | filter args }}` with a fixed
//! function set (see [`filters`]).

pub mod filters;
pub mod parser;

use crate::error::{FerryError, Result};
use parser::{Command, Node, Pipeline, Term};
use serde_json::Value;
use std::collections::BTreeMap;

/// Values visible to a template through `.key` and `.`.
pub trait Scope {
    fn lookup(&self, key: &str) -> Result<Option<Value>>;
    fn root(&self) -> Result<Value>;
}

impl Scope for Value {
    fn lookup(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.as_object().and_then(|o| o.get(key)).cloned())
    }

    fn root(&self) -> Result<Value> {
        Ok(self.clone())
    }
}

/// Secret data; values must be valid UTF-8 once they are read.
impl Scope for BTreeMap<String, Vec<u8>> {
    fn lookup(&self, key: &str) -> Result<Option<Value>> {
        self.get(key).map(|raw| utf8(key, raw)).transpose()
    }

    fn root(&self) -> Result<Value> {
        self.iter()
            .map(|(k, v)| Ok((k.clone(), utf8(k, v)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(Value::Object)
    }
}

fn utf8(key: &str, raw: &[u8]) -> Result<Value> {
    std::str::from_utf8(raw)
        .map(|s| Value::String(s.to_string()))
        .map_err(|_| {
            FerryError::TemplateError(format!("value of key {:?} is not valid UTF-8", key))
        })
}

pub fn render<S: Scope + ?Sized>(template: &str, scope: &S) -> Result<String> {
    let nodes = parser::parse(template)?;
    let mut out = String::new();
    for node in &nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Action(pipeline) => out.push_str(&to_text(&eval_pipeline(pipeline, scope)?)?),
        }
    }
    Ok(out)
}

fn to_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => serde_json::to_string(other)
            .map_err(|e| FerryError::TemplateError(format!("cannot print value: {}", e))),
    }
}

fn eval_pipeline<S: Scope + ?Sized>(pipeline: &Pipeline, scope: &S) -> Result<Value> {
    pipeline
        .0
        .iter()
        .try_fold(None, |piped, command| eval_command(command, scope, piped).map(Some))
        .map(Option::unwrap_or_default)
}

fn eval_command<S: Scope + ?Sized>(
    command: &Command,
    scope: &S,
    piped: Option<Value>,
) -> Result<Value> {
    match command.0.split_first() {
        Some((Term::Func(name), rest)) => {
            let mut args = rest
                .iter()
                .map(|t| eval_term(t, scope))
                .collect::<Result<Vec<_>>>()?;
            args.extend(piped);
            filters::call(name, args)
        }
        Some((term, [])) if piped.is_none() => eval_term(term, scope),
        Some((term, _)) => Err(FerryError::TemplateError(format!(
            "can't give argument to non-function {}",
            describe(term)
        ))),
        None => Err(FerryError::TemplateError("missing value for command".to_string())),
    }
}

fn eval_term<S: Scope + ?Sized>(term: &Term, scope: &S) -> Result<Value> {
    match term {
        Term::Field(path) => eval_field(path, scope),
        Term::Func(name) => filters::call(name, Vec::new()),
        Term::Str(s) => Ok(Value::String(s.clone())),
        Term::Int(n) => Ok(Value::from(*n)),
        Term::Float(f) => Ok(Value::from(*f)),
        Term::Bool(b) => Ok(Value::Bool(*b)),
        Term::Group(pipeline) => eval_pipeline(pipeline, scope),
    }
}

fn eval_field<S: Scope + ?Sized>(path: &[String], scope: &S) -> Result<Value> {
    let Some((first, rest)) = path.split_first() else {
        return scope.root();
    };
    let mut current = scope.lookup(first)?.ok_or_else(|| missing(first))?;
    for segment in rest {
        current = match filters::structured(current) {
            Value::Object(mut map) => map.remove(segment).ok_or_else(|| missing(segment))?,
            _ => {
                return Err(FerryError::TemplateError(format!(
                    "can't evaluate field {} in non-object value",
                    segment
                )))
            }
        };
    }
    Ok(current)
}

fn missing(key: &str) -> FerryError {
    FerryError::TemplateError(format!("map has no entry for key {:?}", key))
}

fn describe(term: &Term) -> String {
    match term {
        Term::Field(path) if path.is_empty() => ".".to_string(),
        Term::Field(path) => format!(".{}", path.join(".")),
        Term::Str(s) => format!("{:?}", s),
        Term::Int(n) => n.to_string(),
        Term::Float(f) => f.to_string(),
        Term::Bool(b) => b.to_string(),
        Term::Func(name) => name.clone(),
        Term::Group(_) => "(...)".to_string(),
    }
}
