// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace lookups

use crate::error::{FerryError, Result, ResultExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::instrument;

/// Labels of a namespace, used by cluster store namespace selectors.
#[instrument(skip(client))]
pub async fn namespace_labels(client: &Client, namespace: &str) -> Result<BTreeMap<String, String>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns = namespaces
        .get(namespace)
        .await
        .map_err(FerryError::from)
        .with_context(|| format!("could not get namespace {:?}", namespace))?;
    Ok(ns.labels().clone())
}
