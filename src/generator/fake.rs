// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::Result;
use crate::generator::{parse_spec, Generator, GeneratorOutput};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize, Debug, Default)]
struct FakeSpec {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

/// Returns `spec.data` verbatim.
pub struct FakeGenerator;

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, spec: &serde_json::Value, _namespace: &str) -> Result<GeneratorOutput> {
        let spec: FakeSpec = parse_spec("Fake", spec)?;
        Ok(GeneratorOutput {
            data: spec
                .data
                .into_iter()
                .map(|(k, v)| (k, v.into_bytes()))
                .collect(),
            cleanup: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_data() {
        let output = FakeGenerator
            .generate(&serde_json::json!({"data": {"a": "1", "b": "2"}}), "apps")
            .await
            .unwrap();
        assert_eq!(output.data.len(), 2);
        assert_eq!(output.data["a"], b"1");
    }

    #[tokio::test]
    async fn test_rejects_non_string_values() {
        let result = FakeGenerator
            .generate(&serde_json::json!({"data": {"a": 1}}), "apps")
            .await;
        assert!(result.is_err());
    }
}
