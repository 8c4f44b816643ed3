// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The contract every secret store backend implements.
//!
//! A [`Provider`] turns a store's provider configuration into a
//! [`SecretsClient`] for one reconciliation. Backends live in their own
//! modules and are registered by kind in the [`registry::ProviderRegistry`].

pub mod fake;
pub mod manager;
pub mod registry;

use crate::error::Result;
use crate::types::push_secret::{PushRemoteRef, PushSecretData};
use crate::types::remote::{FindSpec, RemoteRef};
use crate::types::store::StoreKind;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use manager::ClientManager;
pub use registry::{Capabilities, MaintenanceStatus, ProviderRegistry};

/// Result of a provider's self check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Ready,
    Unknown,
    Error(String),
}

/// Client for one store, valid for the duration of one reconciliation.
#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// Raw bytes of one value, narrowed to `property` when set.
    ///
    /// Fails with `NotFound` when the key or property is absent.
    async fn get_secret(&self, remote: &RemoteRef) -> Result<Vec<u8>>;

    /// A structured value decoded into a key map; a missing property is an empty map.
    async fn get_secret_map(&self, remote: &RemoteRef) -> Result<BTreeMap<String, Vec<u8>>>;

    /// Every value matching `find`, keyed by name. No match is not an error.
    async fn get_all_secrets(&self, find: &FindSpec) -> Result<BTreeMap<String, Vec<u8>>>;

    /// Create or update the remote value; writing identical data is a no-op.
    async fn push_secret(&self, value: &[u8], data: &PushSecretData) -> Result<()>;

    /// Delete the remote value; deleting an absent value succeeds.
    async fn delete_secret(&self, remote: &PushRemoteRef) -> Result<()>;

    /// Must not have side effects.
    async fn secret_exists(&self, remote: &PushRemoteRef) -> Result<bool>;

    async fn validate(&self) -> Result<ValidationResult> {
        Ok(ValidationResult::Unknown)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Identity of the store and requester a client is built for.
#[derive(Clone)]
pub struct ClientContext {
    pub client: kube::Client,
    pub store_kind: StoreKind,
    pub store_name: String,
    /// Namespace of the resource the client reads or writes for
    pub namespace: String,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Check the provider configuration without contacting the backend.
    fn validate_store(&self, config: &serde_json::Value) -> Result<()>;

    /// Build a client; may fail fast with `AuthError`.
    async fn new_client(
        &self,
        config: &serde_json::Value,
        ctx: &ClientContext,
    ) -> Result<Box<dyn SecretsClient>>;
}
