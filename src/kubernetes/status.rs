// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status subresource writes.

use crate::constants::OPERATOR_NAME;
use crate::error::Result;
use kube::{
    api::{Patch, PatchParams},
    Api, Resource,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Server-side apply `status` onto the status subresource of `name`.
///
/// The keyferry field manager owns the whole status, so map entries that are
/// missing from `status` are removed.
pub async fn apply_status<K, S>(api: &Api<K>, name: &str, status: &S) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    S: Serialize,
{
    let patch = serde_json::json!({
        "apiVersion": K::api_version(&()),
        "kind": K::kind(&()),
        "status": status,
    });

    api.patch_status(
        name,
        &PatchParams::apply(OPERATOR_NAME).force(),
        &Patch::Apply(&patch),
    )
    .await?;

    debug!("Updated status of {} {}", K::kind(&()), name);
    Ok(())
}
