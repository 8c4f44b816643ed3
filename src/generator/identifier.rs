// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::Result;
use crate::generator::{Generator, GeneratorOutput};
use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Generates a random v4 UUID under the `uuid` key.
pub struct UuidGenerator;

#[async_trait]
impl Generator for UuidGenerator {
    async fn generate(&self, _spec: &serde_json::Value, _namespace: &str) -> Result<GeneratorOutput> {
        Ok(GeneratorOutput {
            data: BTreeMap::from([("uuid".to_string(), Uuid::new_v4().to_string().into_bytes())]),
            cleanup: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_call_is_unique() {
        let first = UuidGenerator.generate(&serde_json::Value::Null, "apps").await.unwrap();
        let second = UuidGenerator.generate(&serde_json::Value::Null, "apps").await.unwrap();

        let id = String::from_utf8(first.data["uuid"].clone()).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(first.data["uuid"], second.data["uuid"]);
    }
}
