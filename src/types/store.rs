// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{FerryError, Result};
use crate::types::condition::Condition;
use kube::{CustomResource, ResourceExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "keyferry.geeko.me", version = "v1", kind = "SecretStore")]
#[kube(namespaced, shortname = "ss")]
#[kube(status = "SecretStoreStatus")]
#[serde(rename_all = "camelCase")]
pub struct SecretStoreSpec {
    /// Controller class this store belongs to; empty means every controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    /// Exactly one entry, keyed by provider kind, holding the provider configuration
    pub provider: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,
    /// Namespace restrictions, only honoured on cluster-scoped stores
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClusterStoreCondition>,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "keyferry.geeko.me", version = "v1", kind = "ClusterSecretStore")]
#[kube(shortname = "css")]
#[kube(status = "SecretStoreStatus")]
pub struct ClusterSecretStoreSpec {
    #[serde(flatten)]
    pub store: SecretStoreSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretStoreStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStoreCondition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace_regexes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<StoreSelector>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, schemars::JsonSchema)]
pub enum StoreKind {
    #[default]
    SecretStore,
    ClusterSecretStore,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::SecretStore => "SecretStore",
            StoreKind::ClusterSecretStore => "ClusterSecretStore",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one store by name, or to a set of stores by label selector.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<StoreSelector>,
}

impl StoreRef {
    pub fn named(kind: StoreKind, name: impl Into<String>) -> Self {
        StoreRef {
            name: Some(name.into()),
            kind,
            label_selector: None,
        }
    }

    /// A reference names a store or selects stores by label, never both.
    pub fn validate(&self) -> Result<()> {
        match (&self.name, &self.label_selector) {
            (Some(name), None) if !name.is_empty() => Ok(()),
            (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(FerryError::ValidationError(format!(
                "{} reference must set either name or labelSelector, not both",
                self.kind
            ))),
            _ => Err(FerryError::ValidationError(format!(
                "{} reference must set a name or a labelSelector",
                self.kind
            ))),
        }
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.label_selector) {
            (Some(name), _) => write!(f, "{} {:?}", self.kind, name),
            (None, Some(selector)) => write!(f, "{} selected by {}", self.kind, selector),
            (None, None) => write!(f, "{} <unnamed>", self.kind),
        }
    }
}

/// Label selector with `matchLabels` and set-based `matchExpressions`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<SelectorRequirement>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl StoreSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let labels_match = self
            .match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v));

        labels_match
            && self.match_expressions.iter().all(|req| {
                let value = labels.get(&req.key);
                match req.operator {
                    SelectorOperator::In => value.is_some_and(|v| req.values.contains(v)),
                    SelectorOperator::NotIn => !value.is_some_and(|v| req.values.contains(v)),
                    SelectorOperator::Exists => value.is_some(),
                    SelectorOperator::DoesNotExist => value.is_none(),
                }
            })
    }
}

impl fmt::Display for StoreSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        for req in &self.match_expressions {
            parts.push(match req.operator {
                SelectorOperator::In => format!("{} in ({})", req.key, req.values.join(",")),
                SelectorOperator::NotIn => format!("{} notin ({})", req.key, req.values.join(",")),
                SelectorOperator::Exists => req.key.clone(),
                SelectorOperator::DoesNotExist => format!("!{}", req.key),
            });
        }
        write!(f, "{{{}}}", parts.join(","))
    }
}

/// Key of a store in status maps: `"<Kind>/<name>"`.
///
/// Every status map keyed by store goes through this function and
/// [`parse_store_status_key`]; never build the string by hand.
pub fn store_status_key(kind: StoreKind, name: &str) -> String {
    format!("{}/{}", kind.as_str(), name)
}

pub fn parse_store_status_key(key: &str) -> Option<(StoreKind, String)> {
    let (kind, name) = key.split_once('/')?;
    let kind = match kind {
        "SecretStore" => StoreKind::SecretStore,
        "ClusterSecretStore" => StoreKind::ClusterSecretStore,
        _ => return None,
    };
    (!name.is_empty()).then(|| (kind, name.to_string()))
}

/// Snapshot of a store taken at the start of a reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedStore {
    pub kind: StoreKind,
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// `metadata.generation` at resolution time; bumps on every spec change
    pub generation: Option<i64>,
    pub spec: SecretStoreSpec,
}

impl ResolvedStore {
    pub fn status_key(&self) -> String {
        store_status_key(self.kind, &self.name)
    }

    /// Stores without a controller class are managed by every controller.
    pub fn is_managed(&self, controller_class: &str) -> bool {
        match self.spec.controller.as_deref() {
            None | Some("") => true,
            Some(class) => class == controller_class,
        }
    }

    /// Whether a resource in `namespace` may use this store.
    ///
    /// Namespaced stores are only usable from their own namespace; cluster
    /// stores honour `spec.conditions`, where any matching condition admits
    /// the namespace. `namespace_labels` is only consulted by selectors.
    pub fn allows_namespace(
        &self,
        namespace: &str,
        namespace_labels: &BTreeMap<String, String>,
    ) -> Result<bool> {
        if self.kind == StoreKind::SecretStore {
            return Ok(self.namespace.as_deref() == Some(namespace));
        }
        if self.spec.conditions.is_empty() {
            return Ok(true);
        }

        for condition in &self.spec.conditions {
            if condition.namespaces.iter().any(|n| n == namespace) {
                return Ok(true);
            }
            for pattern in &condition.namespace_regexes {
                let re = Regex::new(pattern).map_err(|e| {
                    FerryError::ValidationError(format!(
                        "invalid namespace regex {:?} on {}: {}",
                        pattern,
                        self.status_key(),
                        e
                    ))
                })?;
                if re.is_match(namespace) {
                    return Ok(true);
                }
            }
            if condition
                .namespace_selector
                .as_ref()
                .is_some_and(|s| s.matches(namespace_labels))
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Whether evaluating [`Self::allows_namespace`] needs the namespace's labels.
    pub fn needs_namespace_labels(&self) -> bool {
        self.kind == StoreKind::ClusterSecretStore
            && self
                .spec
                .conditions
                .iter()
                .any(|c| c.namespace_selector.is_some())
    }
}

impl From<&SecretStore> for ResolvedStore {
    fn from(store: &SecretStore) -> Self {
        ResolvedStore {
            kind: StoreKind::SecretStore,
            name: store.name_any(),
            namespace: store.namespace(),
            labels: store.labels().clone(),
            generation: store.metadata.generation,
            spec: store.spec.clone(),
        }
    }
}

impl From<&ClusterSecretStore> for ResolvedStore {
    fn from(store: &ClusterSecretStore) -> Self {
        ResolvedStore {
            kind: StoreKind::ClusterSecretStore,
            name: store.name_any(),
            namespace: None,
            labels: store.labels().clone(),
            generation: store.metadata.generation,
            spec: store.spec.store.clone(),
        }
    }
}
