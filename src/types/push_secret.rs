// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::defaults::REFRESH_INTERVAL;
use crate::error::{FerryError, Result};
use crate::types::condition::Condition;
use crate::types::duration::parse_duration;
use crate::types::remote::GeneratorRef;
use crate::types::store::StoreRef;
use crate::types::template::Template;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Writes keys of a cluster secret, or generator output, out to external stores.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "keyferry.geeko.me", version = "v1", kind = "PushSecret")]
#[kube(namespaced, shortname = "ps")]
#[kube(status = "PushSecretStatus")]
#[serde(rename_all = "camelCase")]
pub struct PushSecretSpec {
    pub secret_store_refs: Vec<StoreRef>,
    #[serde(default)]
    pub update_policy: UpdatePolicy,
    #[serde(default)]
    pub deletion_policy: PushDeletionPolicy,
    pub selector: PushSecretSelector,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<PushSecretData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Template>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum UpdatePolicy {
    #[default]
    #[serde(alias = "Replace")]
    Always,
    IfNotExists,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum PushDeletionPolicy {
    #[default]
    None,
    Delete,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushSecretSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_ref: Option<GeneratorRef>,
}

impl PushSecretSelector {
    pub fn validate(&self) -> Result<()> {
        match (&self.secret, &self.generator_ref) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(FerryError::ValidationError(
                "selector must set exactly one of secret or generatorRef".to_string(),
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub struct SecretSelector {
    pub name: String,
}

/// One key pushed to every matching store.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushSecretData {
    #[serde(rename = "match")]
    pub matcher: PushSecretMatch,
    /// Provider specific metadata passed through to `push_secret`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub conversion_strategy: PushConversionStrategy,
    /// Only push to stores carrying all of these labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

impl PushSecretData {
    pub fn remote_key(&self) -> &str {
        &self.matcher.remote_ref.remote_key
    }

    /// Source key, `None` when the whole secret is pushed as one JSON object.
    pub fn secret_key(&self) -> Option<&str> {
        self.matcher.secret_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn applies_to(&self, store_labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| store_labels.get(k) == Some(v))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushSecretMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    pub remote_ref: PushRemoteRef,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushRemoteRef {
    pub remote_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

impl PushRemoteRef {
    /// Key of this reference inside a store's entry of [`SyncedPushSecrets`].
    pub fn status_key(&self) -> String {
        match self.property.as_deref().filter(|p| !p.is_empty()) {
            Some(property) => format!("{}/{}", self.remote_key, property),
            None => self.remote_key.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum PushConversionStrategy {
    #[default]
    None,
    ReverseUnicode,
}

/// Store key (see [`crate::types::store::store_status_key`]) to remote key to
/// the entry last pushed there.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(transparent)]
pub struct SyncedPushSecrets(pub BTreeMap<String, BTreeMap<String, PushSecretData>>);

impl SyncedPushSecrets {
    pub fn store(&self, store_key: &str) -> Option<&BTreeMap<String, PushSecretData>> {
        self.0.get(store_key)
    }

    pub fn set_store(&mut self, store_key: String, entries: BTreeMap<String, PushSecretData>) {
        self.0.insert(store_key, entries);
    }

    pub fn record(&mut self, store_key: &str, data: &PushSecretData) {
        self.0
            .entry(store_key.to_string())
            .or_default()
            .insert(data.matcher.remote_ref.status_key(), data.clone());
    }

    /// Entries present here but missing from `newer`, per store.
    pub fn orphans_against(&self, newer: &SyncedPushSecrets) -> Vec<(String, PushSecretData)> {
        let mut orphans = Vec::new();
        for (store_key, entries) in &self.0 {
            let kept = newer.store(store_key);
            for (remote_key, data) in entries {
                if !kept.is_some_and(|k| k.contains_key(remote_key)) {
                    orphans.push((store_key.clone(), data.clone()));
                }
            }
        }
        orphans
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, PushSecretData>)> {
        self.0.iter()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushSecretStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub synced_push_secrets: SyncedPushSecrets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_resource_version: Option<String>,
}

impl PushSecret {
    pub fn refresh_interval(&self) -> Result<Duration> {
        parse_duration(self.spec.refresh_interval.as_deref().unwrap_or(REFRESH_INTERVAL))
    }

    pub fn synced(&self) -> SyncedPushSecrets {
        self.status
            .as_ref()
            .map(|s| s.synced_push_secrets.clone())
            .unwrap_or_default()
    }
}
