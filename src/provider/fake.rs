// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-memory provider, configured as `provider: { fake: { data: [...] } }`.
//!
//! Every store gets its own backend, shared by all clients opened for it,
//! so values pushed by one resource are visible to others reading the same
//! store. Entries declared in the store configuration overwrite the backend
//! whenever a client is opened.

use crate::error::{FerryError, Result};
use crate::pipeline::property::{
    extract_map, extract_property, remove_property, set_property, FindMatcher,
};
use crate::provider::registry::Capabilities;
use crate::provider::{ClientContext, Provider, SecretsClient, ValidationResult};
use crate::types::push_secret::{PushRemoteRef, PushSecretData};
use crate::types::remote::{FindSpec, RemoteRef};
use crate::types::store::{store_status_key, StoreKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FakeConfig {
    #[serde(default)]
    data: Vec<FakeData>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FakeData {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    value_map: Option<BTreeMap<String, String>>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

fn parse_config(config: &serde_json::Value) -> Result<FakeConfig> {
    let parsed: FakeConfig = serde_json::from_value(config.clone())
        .map_err(|e| FerryError::ValidationError(format!("invalid fake provider config: {}", e)))?;
    for entry in &parsed.data {
        if entry.value.is_some() == entry.value_map.is_some() {
            return Err(FerryError::ValidationError(format!(
                "fake provider entry {:?} must set exactly one of value or valueMap",
                entry.key
            )));
        }
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FakeEntry {
    value: Option<Vec<u8>>,
    versions: BTreeMap<String, Vec<u8>>,
    tags: BTreeMap<String, String>,
    metadata: Option<serde_json::Value>,
}

/// Values of one fake store.
#[derive(Debug, Default)]
pub struct FakeBackend {
    entries: Mutex<BTreeMap<String, FakeEntry>>,
    writes: AtomicUsize,
}

impl FakeBackend {
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, FakeEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).and_then(|e| e.value.clone())
    }

    /// Number of writes that changed a value.
    #[cfg(test)]
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn apply_config(&self, config: FakeConfig) -> Result<()> {
        let mut entries = self.lock();
        for data in config.data {
            let value = match (data.value, data.value_map) {
                (Some(value), _) => value.into_bytes(),
                (None, Some(map)) => serde_json::to_vec(&map).map_err(|e| {
                    FerryError::ValidationError(format!("invalid valueMap for {:?}: {}", data.key, e))
                })?,
                (None, None) => continue,
            };
            let entry = entries.entry(data.key).or_default();
            match data.version {
                Some(version) => {
                    entry.versions.insert(version, value);
                }
                None => entry.value = Some(value),
            }
            entry.tags = data.tags;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProvider {
    backends: Mutex<HashMap<String, Arc<FakeBackend>>>,
}

impl FakeProvider {
    /// Backend of a store; namespaced stores are keyed by their namespace too.
    fn backend(&self, kind: StoreKind, name: &str, namespace: &str) -> Arc<FakeBackend> {
        let key = match kind {
            StoreKind::SecretStore => format!("{}/{}", namespace, store_status_key(kind, name)),
            StoreKind::ClusterSecretStore => store_status_key(kind, name),
        };
        self.backends
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(key)
            .or_default()
            .clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ReadWrite
    }

    fn validate_store(&self, config: &serde_json::Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    async fn new_client(
        &self,
        config: &serde_json::Value,
        ctx: &ClientContext,
    ) -> Result<Box<dyn SecretsClient>> {
        let config = parse_config(config)?;
        let backend = self.backend(ctx.store_kind, &ctx.store_name, &ctx.namespace);
        backend.apply_config(config)?;
        Ok(Box::new(FakeClient { backend }))
    }
}

pub struct FakeClient {
    backend: Arc<FakeBackend>,
}

impl FakeClient {
    pub fn new(backend: Arc<FakeBackend>) -> Self {
        Self { backend }
    }

    fn raw(&self, remote: &RemoteRef) -> Result<Vec<u8>> {
        let entries = self.backend.lock();
        let entry = entries.get(&remote.key);
        let value = match remote.version.as_deref().filter(|v| !v.is_empty()) {
            Some(version) => entry.and_then(|e| e.versions.get(version).cloned()),
            None => entry.and_then(|e| e.value.clone()),
        };
        value.ok_or_else(|| FerryError::NotFound(format!("secret {:?} not found", remote.key)))
    }
}

#[async_trait]
impl SecretsClient for FakeClient {
    async fn get_secret(&self, remote: &RemoteRef) -> Result<Vec<u8>> {
        let raw = self.raw(remote)?;
        match remote.property.as_deref().filter(|p| !p.is_empty()) {
            Some(property) => extract_property(&raw, property)
                .map_err(|e| e.context(format!("secret {:?}", remote.key))),
            None => Ok(raw),
        }
    }

    async fn get_secret_map(&self, remote: &RemoteRef) -> Result<BTreeMap<String, Vec<u8>>> {
        let raw = self.raw(remote)?;
        extract_map(&raw, remote.property.as_deref())
    }

    async fn get_all_secrets(&self, find: &FindSpec) -> Result<BTreeMap<String, Vec<u8>>> {
        let matcher = FindMatcher::new(find)?;
        Ok(self
            .backend
            .lock()
            .iter()
            .filter(|(name, entry)| matcher.matches(name, &entry.tags))
            .filter_map(|(name, entry)| entry.value.clone().map(|v| (name.clone(), v)))
            .collect())
    }

    async fn push_secret(&self, value: &[u8], data: &PushSecretData) -> Result<()> {
        let remote = &data.matcher.remote_ref;
        let mut entries = self.backend.lock();
        let entry = entries.entry(remote.remote_key.clone()).or_default();

        let new_value = match remote.property.as_deref().filter(|p| !p.is_empty()) {
            Some(property) => set_property(entry.value.as_deref(), property, value)?,
            None => value.to_vec(),
        };
        if entry.value.as_deref() == Some(new_value.as_slice()) && entry.metadata == data.metadata {
            debug!("Remote key {} unchanged, skipping write", remote.remote_key);
            return Ok(());
        }

        entry.value = Some(new_value);
        entry.metadata = data.metadata.clone();
        self.backend.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_secret(&self, remote: &PushRemoteRef) -> Result<()> {
        let mut entries = self.backend.lock();
        let Some(entry) = entries.get_mut(&remote.remote_key) else {
            return Ok(());
        };

        match remote.property.as_deref().filter(|p| !p.is_empty()) {
            Some(property) => {
                let remaining = match entry.value.as_deref() {
                    Some(raw) => remove_property(raw, property)?,
                    None => None,
                };
                match remaining {
                    Some(rest) => entry.value = Some(rest),
                    None => {
                        entries.remove(&remote.remote_key);
                    }
                }
            }
            None => {
                entries.remove(&remote.remote_key);
            }
        }
        Ok(())
    }

    async fn secret_exists(&self, remote: &PushRemoteRef) -> Result<bool> {
        let entries = self.backend.lock();
        let Some(raw) = entries.get(&remote.remote_key).and_then(|e| e.value.as_deref()) else {
            return Ok(false);
        };
        match remote.property.as_deref().filter(|p| !p.is_empty()) {
            Some(property) => Ok(extract_property(raw, property).is_ok()),
            None => Ok(true),
        }
    }

    async fn validate(&self) -> Result<ValidationResult> {
        Ok(ValidationResult::Ready)
    }
}
