// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::defaults::REFRESH_INTERVAL;
use crate::error::{FerryError, Result};
use crate::types::condition::Condition;
use crate::types::duration::parse_duration;
use crate::types::remote::{FindSpec, GeneratorRef, RemoteRef};
use crate::types::rewrite::Rewrite;
use crate::types::store::StoreRef;
use crate::types::template::Template;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Materializes values from external stores into one cluster secret.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "keyferry.geeko.me", version = "v1", kind = "ExternalSecret")]
#[kube(namespaced, shortname = "es")]
#[kube(status = "ExternalSecretStatus")]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretSpec {
    /// Default store for entries without their own `sourceRef`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_store_ref: Option<StoreRef>,
    #[serde(default)]
    pub target: ExternalSecretTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<ExternalSecretData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_from: Vec<ExternalSecretDataFrom>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretTarget {
    /// Name of the target secret, defaults to the ExternalSecret name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub creation_policy: CreationPolicy,
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Template>,
    #[serde(default)]
    pub immutable: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum CreationPolicy {
    /// Create the target and own it
    #[default]
    Owner,
    /// Create the target without an owner reference
    Orphan,
    /// Merge into an existing target, never create it
    Merge,
    /// Do not write the target
    None,
}

/// What happens to the target when every source reports the data gone.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum DeletionPolicy {
    #[default]
    Retain,
    Delete,
    Merge,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum RefreshPolicy {
    #[default]
    Periodic,
    CreatedOnce,
    OnChange,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretData {
    pub secret_key: String,
    pub remote_ref: RemoteRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<SourceRef>,
}

/// Bulk source: `extract` one structured value, `find` many values, or run a generator.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretDataFrom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<RemoteRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find: Option<FindSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<SourceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewrite: Vec<Rewrite>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_ref: Option<StoreRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_ref: Option<GeneratorRef>,
}

impl SourceRef {
    pub fn validate(&self) -> Result<()> {
        if self.store_ref.is_some() && self.generator_ref.is_some() {
            return Err(FerryError::ValidationError(
                "sourceRef must set either storeRef or generatorRef, not both".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_time: Option<String>,
    /// Generation the target was last written from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_resource_version: Option<String>,
    /// Generation of every store used by the last successful sync, by store key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub store_generations: BTreeMap<String, i64>,
    /// `resourceVersion` of the target right after the last successful sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<SecretBinding>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub struct SecretBinding {
    pub name: String,
}

impl ExternalSecret {
    pub fn target_name(&self) -> String {
        self.spec
            .target
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    /// Parsed refresh interval; zero disables periodic refresh.
    pub fn refresh_interval(&self) -> Result<Duration> {
        parse_duration(self.spec.refresh_interval.as_deref().unwrap_or(REFRESH_INTERVAL))
    }

    /// Every store reference the resource may read from, in declaration order.
    pub fn store_refs(&self) -> Vec<&StoreRef> {
        let data_refs = self.spec.data.iter().map(|d| d.source_ref.as_ref());
        let data_from_refs = self.spec.data_from.iter().map(|d| d.source_ref.as_ref());

        self.spec
            .secret_store_ref
            .iter()
            .chain(
                data_refs
                    .chain(data_from_refs)
                    .flatten()
                    .filter_map(|s| s.store_ref.as_ref()),
            )
            .collect()
    }

    pub fn generation_marker(&self) -> String {
        self.metadata.generation.unwrap_or_default().to_string()
    }
}
