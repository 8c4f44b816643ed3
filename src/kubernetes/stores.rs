// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resolution of store references into store snapshots.

use crate::config::Config;
use crate::error::{FerryError, Result, ResultExt};
use crate::kubernetes::namespaces::namespace_labels;
use crate::types::store::{ClusterSecretStore, ResolvedStore, SecretStore, StoreKind, StoreRef};
use kube::{api::ListParams, Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Resolve `store_ref` as seen from a resource in `namespace`.
///
/// Named references yield exactly one store; selectors yield every matching
/// store ordered by name, possibly none. Stores managed by another controller
/// class are returned as-is so callers can tell "not mine" apart from errors.
#[instrument(skip(client, config, store_ref), fields(store_ref = %store_ref))]
pub async fn resolve_store_ref(
    client: &Client,
    config: &Config,
    namespace: &str,
    store_ref: &StoreRef,
) -> Result<Vec<ResolvedStore>> {
    store_ref.validate()?;
    if store_ref.kind == StoreKind::ClusterSecretStore && !config.enable_cluster_stores {
        return Err(FerryError::ValidationError(
            "ClusterSecretStore references are disabled".to_string(),
        ));
    }

    let mut labels = NamespaceLabels::new(client, namespace);

    if let Some(name) = &store_ref.name {
        let store = get_store(client, namespace, store_ref.kind, name).await?;
        if store.is_managed(&config.controller_class)
            && !store.allows_namespace(namespace, labels.get(&store).await?)?
        {
            return Err(FerryError::ValidationError(format!(
                "{} {:?} may not be used from namespace {:?}",
                store.kind, store.name, namespace
            )));
        }
        return Ok(vec![store]);
    }

    let selector = store_ref.label_selector.as_ref().ok_or_else(|| {
        FerryError::ValidationError(format!("{} reference without name or selector", store_ref.kind))
    })?;

    let mut selected = Vec::new();
    for store in list_stores(client, namespace, store_ref.kind).await? {
        if !selector.matches(&store.labels) {
            continue;
        }
        if store.is_managed(&config.controller_class)
            && !store.allows_namespace(namespace, labels.get(&store).await?)?
        {
            debug!(
                "Skipping {} {}: not usable from namespace {}",
                store.kind, store.name, namespace
            );
            continue;
        }
        selected.push(store);
    }
    selected.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(selected)
}

async fn get_store(
    client: &Client,
    namespace: &str,
    kind: StoreKind,
    name: &str,
) -> Result<ResolvedStore> {
    let store = match kind {
        StoreKind::SecretStore => {
            let api: Api<SecretStore> = Api::namespaced(client.clone(), namespace);
            api.get(name).await.map(|s| ResolvedStore::from(&s))
        }
        StoreKind::ClusterSecretStore => {
            let api: Api<ClusterSecretStore> = Api::all(client.clone());
            api.get(name).await.map(|s| ResolvedStore::from(&s))
        }
    };
    store
        .map_err(FerryError::from)
        .with_context(|| format!("could not get {} {:?}", kind, name))
}

async fn list_stores(client: &Client, namespace: &str, kind: StoreKind) -> Result<Vec<ResolvedStore>> {
    let lp = ListParams::default();
    let stores = match kind {
        StoreKind::SecretStore => {
            let api: Api<SecretStore> = Api::namespaced(client.clone(), namespace);
            api.list(&lp)
                .await
                .map(|list| list.items.iter().map(ResolvedStore::from).collect())
        }
        StoreKind::ClusterSecretStore => {
            let api: Api<ClusterSecretStore> = Api::all(client.clone());
            api.list(&lp)
                .await
                .map(|list| list.items.iter().map(ResolvedStore::from).collect())
        }
    };
    stores
        .map_err(FerryError::from)
        .with_context(|| format!("could not list {}s", kind))
}

/// Namespace labels, fetched at most once and only when a store needs them.
struct NamespaceLabels<'a> {
    client: &'a Client,
    namespace: &'a str,
    labels: Option<BTreeMap<String, String>>,
}

impl<'a> NamespaceLabels<'a> {
    fn new(client: &'a Client, namespace: &'a str) -> Self {
        Self {
            client,
            namespace,
            labels: None,
        }
    }

    async fn get(&mut self, store: &ResolvedStore) -> Result<&BTreeMap<String, String>> {
        if !store.needs_namespace_labels() {
            return Ok(&EMPTY_LABELS);
        }
        if self.labels.is_none() {
            self.labels = Some(namespace_labels(self.client, self.namespace).await?);
        }
        Ok(self.labels.as_ref().unwrap_or(&EMPTY_LABELS))
    }
}

static EMPTY_LABELS: BTreeMap<String, String> = BTreeMap::new();
