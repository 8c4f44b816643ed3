// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-reconciliation cache of store clients.

use crate::error::Result;
use crate::provider::registry::{Access, MaintenanceStatus, ProviderRegistry};
use crate::provider::{ClientContext, SecretsClient};
use crate::types::store::ResolvedStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens at most one client per store during a reconciliation.
///
/// Clients are never shared across reconciliations; call [`ClientManager::close_all`]
/// when the reconciliation ends.
pub struct ClientManager<'a> {
    registry: &'a ProviderRegistry,
    client: kube::Client,
    namespace: String,
    clients: HashMap<String, Arc<dyn SecretsClient>>,
    warned: HashSet<String>,
}

impl<'a> ClientManager<'a> {
    pub fn new(registry: &'a ProviderRegistry, client: kube::Client, namespace: &str) -> Self {
        Self {
            registry,
            client,
            namespace: namespace.to_string(),
            clients: HashMap::new(),
            warned: HashSet::new(),
        }
    }

    pub async fn get(
        &mut self,
        store: &ResolvedStore,
        access: Access,
    ) -> Result<Arc<dyn SecretsClient>> {
        let resolved = self.registry.resolve(&store.spec)?;
        resolved.check_access(access)?;

        let key = store.status_key();
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        if resolved.maintenance == MaintenanceStatus::NotMaintained
            && self.warned.insert(resolved.kind.clone())
        {
            warn!(
                "Store {} uses provider {}, which is no longer maintained",
                key, resolved.kind
            );
        }

        let ctx = ClientContext {
            client: self.client.clone(),
            store_kind: store.kind,
            store_name: store.name.clone(),
            namespace: self.namespace.clone(),
        };
        let client: Arc<dyn SecretsClient> =
            Arc::from(resolved.provider.new_client(&resolved.config, &ctx).await?);
        debug!("Opened {} client for store {}", resolved.kind, key);

        self.clients.insert(key, client.clone());
        Ok(client)
    }

    pub async fn close_all(&mut self) {
        for (key, client) in self.clients.drain() {
            if let Err(e) = client.close().await {
                warn!("Failed to close client for store {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeProvider;
    use crate::test_utils::{fake_store, MockService, RecordingProvider};
    use crate::types::store::StoreKind;
    use std::collections::BTreeMap;

    fn recording_store(name: &str) -> ResolvedStore {
        let mut store = fake_store(StoreKind::SecretStore, name, serde_json::json!({}));
        store.spec.provider = BTreeMap::from([("recording".to_string(), serde_json::json!({}))]);
        store
    }

    #[tokio::test]
    async fn test_clients_are_cached_and_closed_once() {
        let provider = Arc::new(RecordingProvider::default());
        let mut registry = ProviderRegistry::new();
        registry.register("recording", provider.clone(), MaintenanceStatus::Maintained);
        let mut manager = ClientManager::new(&registry, MockService::new().into_client(), "apps");
        let a = recording_store("a");
        let b = recording_store("b");

        manager.get(&a, Access::Read).await.unwrap();
        manager.get(&a, Access::Write).await.unwrap();
        manager.get(&b, Access::Read).await.unwrap();

        manager.close_all().await;
        manager.close_all().await;
        assert_eq!(provider.client("a").closed(), 1);
        assert_eq!(provider.client("b").closed(), 1);
    }

    #[tokio::test]
    async fn test_unknown_provider_fails() {
        let mut registry = ProviderRegistry::new();
        registry.register("other", Arc::new(FakeProvider::default()), MaintenanceStatus::Maintained);
        let mut manager = ClientManager::new(&registry, MockService::new().into_client(), "apps");
        let store = fake_store(StoreKind::SecretStore, "a", serde_json::json!({}));

        assert!(manager.get(&store, Access::Read).await.is_err());
    }
}
