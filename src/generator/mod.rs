// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! On-demand value producers used in place of a store lookup.

pub mod fake;
pub mod identifier;
pub mod password;

use crate::error::{FerryError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// API group and version of the in-tree generator kinds
pub const GENERATOR_API_VERSION: &str = "generators.keyferry.geeko.me/v1alpha1";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorOutput {
    pub data: BTreeMap<String, Vec<u8>>,
    /// Handle passed back to [`Generator::cleanup`] when the sync fails
    pub cleanup: Option<serde_json::Value>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, spec: &serde_json::Value, namespace: &str) -> Result<GeneratorOutput>;

    async fn cleanup(
        &self,
        _spec: &serde_json::Value,
        _state: &serde_json::Value,
        _namespace: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Cleanup handle of one generator invocation.
#[derive(Debug, Clone)]
pub struct GeneratedState {
    pub kind: String,
    pub spec: serde_json::Value,
    pub state: serde_json::Value,
    pub namespace: String,
}

#[derive(Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("Password", Arc::new(password::PasswordGenerator));
        registry.register("Fake", Arc::new(fake::FakeGenerator));
        registry.register("UUID", Arc::new(identifier::UuidGenerator));
        registry
    }

    pub fn register(&mut self, kind: &str, generator: Arc<dyn Generator>) {
        if self.generators.insert(kind.to_string(), generator).is_some() {
            warn!("Generator {} registered twice, replacing the earlier registration", kind);
        } else {
            info!("Registered generator {}", kind);
        }
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn Generator>> {
        self.generators.get(kind).cloned().ok_or_else(|| {
            FerryError::ValidationError(format!("no generator registered for kind {:?}", kind))
        })
    }

    /// Run the generator for `kind`, returning its data and any cleanup handle.
    pub async fn generate(
        &self,
        kind: &str,
        spec: &serde_json::Value,
        namespace: &str,
    ) -> Result<(BTreeMap<String, Vec<u8>>, Option<GeneratedState>)> {
        let output = self.get(kind)?.generate(spec, namespace).await?;
        let state = output.cleanup.map(|state| GeneratedState {
            kind: kind.to_string(),
            spec: spec.clone(),
            state,
            namespace: namespace.to_string(),
        });
        Ok((output.data, state))
    }

    /// Release everything issued by a failed sync attempt; failures are logged.
    pub async fn cleanup_all(&self, states: Vec<GeneratedState>) {
        for state in states {
            let result = match self.get(&state.kind) {
                Ok(generator) => {
                    generator
                        .cleanup(&state.spec, &state.state, &state.namespace)
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Failed to clean up {} generator output: {}", state.kind, e);
            }
        }
    }
}

pub(crate) fn parse_spec<T: serde::de::DeserializeOwned>(
    kind: &str,
    spec: &serde_json::Value,
) -> Result<T> {
    let spec = if spec.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        spec.clone()
    };
    serde_json::from_value(spec)
        .map_err(|e| FerryError::GeneratorError(format!("invalid {} generator spec: {}", kind, e)))
}
