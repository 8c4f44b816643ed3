// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Validates SecretStores and ClusterSecretStores and reports their readiness.

use crate::constants::conditions::{
    REASON_INVALID, REASON_VALIDATED, REASON_VALIDATION_FAILED, REASON_VALIDATION_UNKNOWN,
};
use crate::error::{FerryError, Result};
use crate::kubernetes::apply_status;
use crate::provider::{ClientContext, ValidationResult};
use crate::reconcilers::{object_key, requeue_after, Context};
use crate::types::condition::{upsert_condition, Condition};
use crate::types::store::{ClusterSecretStore, ResolvedStore, SecretStore, SecretStoreStatus};
use chrono::Utc;
use futures::StreamExt;
use kube::runtime::controller::{Action, Config as ControllerConfig};
use kube::runtime::Controller;
use kube_runtime::watcher::Config as WatcherConfig;
use kube::{Api, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct StoreReconciler {
    ctx: Arc<Context>,
}

impl StoreReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let client = self.ctx.client.clone();
        let config = ControllerConfig::default().concurrency(self.ctx.config.worker_concurrency);

        info!("Starting SecretStore reconciler");
        let stores = Controller::new(Api::<SecretStore>::all(client.clone()), WatcherConfig::default())
            .with_config(config.clone())
            .shutdown_on_signal()
            .run(reconcile_store, error_policy, self.ctx.clone())
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled SecretStore: {:?}", o),
                    Err(e) => debug!("SecretStore reconciliation error: {:?}", e),
                }
            });

        if !self.ctx.config.enable_cluster_stores {
            stores.await;
            return Ok(());
        }

        info!("Starting ClusterSecretStore reconciler");
        let cluster_stores =
            Controller::new(Api::<ClusterSecretStore>::all(client), WatcherConfig::default())
                .with_config(config)
                .shutdown_on_signal()
                .run(reconcile_cluster_store, error_policy, self.ctx)
                .for_each(|res| async move {
                    match res {
                        Ok(o) => debug!("Reconciled ClusterSecretStore: {:?}", o),
                        Err(e) => debug!("ClusterSecretStore reconciliation error: {:?}", e),
                    }
                });

        futures::future::join(stores, cluster_stores).await;
        Ok(())
    }
}

#[instrument(skip(store, ctx), fields(store = %object_key(store.as_ref())))]
async fn reconcile_store(store: Arc<SecretStore>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = store.namespace().ok_or_else(|| {
        FerryError::ValidationError("SecretStore must be namespaced".to_string())
    })?;
    let resolved = ResolvedStore::from(store.as_ref());
    if !resolved.is_managed(&ctx.config.controller_class) {
        debug!("SecretStore {} belongs to another controller", object_key(store.as_ref()));
        return Ok(Action::await_change());
    }

    let status = check_store(&ctx, &resolved, store.status.clone()).await;
    let api: Api<SecretStore> = Api::namespaced(ctx.client.clone(), &namespace);
    apply_status(&api, &store.name_any(), &status).await?;
    Ok(requeue_after(ctx.config.store_requeue_interval))
}

#[instrument(skip(store, ctx), fields(store = %store.name_any()))]
async fn reconcile_cluster_store(store: Arc<ClusterSecretStore>, ctx: Arc<Context>) -> Result<Action> {
    let resolved = ResolvedStore::from(store.as_ref());
    if !resolved.is_managed(&ctx.config.controller_class) {
        debug!("ClusterSecretStore {} belongs to another controller", store.name_any());
        return Ok(Action::await_change());
    }

    let status = check_store(&ctx, &resolved, store.status.clone()).await;
    let api: Api<ClusterSecretStore> = Api::all(ctx.client.clone());
    apply_status(&api, &store.name_any(), &status).await?;
    Ok(requeue_after(ctx.config.store_requeue_interval))
}

fn error_policy<K: kube::Resource>(store: Arc<K>, error: &FerryError, ctx: Arc<Context>) -> Action {
    let key = object_key(store.as_ref());
    let delay = ctx.backoff.next_delay(&key);
    warn!("Failed to reconcile store {}: {}, retrying in {}s", key, error, delay.as_secs());
    Action::requeue(delay)
}

/// Validate the provider configuration and backend of `store`.
async fn check_store(
    ctx: &Context,
    store: &ResolvedStore,
    previous: Option<SecretStoreStatus>,
) -> SecretStoreStatus {
    let mut status = previous.unwrap_or_default();
    let key = store.status_key();

    let (condition, capabilities) = match ctx.providers.resolve(&store.spec) {
        Err(e) => (Condition::ready(false, REASON_INVALID, e.to_string()), None),
        Ok(resolved) => {
            let capabilities = resolved.provider.capabilities().to_string();
            let condition = match resolved.provider.validate_store(&resolved.config) {
                Err(e) => Condition::ready(false, REASON_INVALID, e.to_string()),
                Ok(()) => {
                    let client_ctx = ClientContext {
                        client: ctx.client.clone(),
                        store_kind: store.kind,
                        store_name: store.name.clone(),
                        namespace: store.namespace.clone().unwrap_or_default(),
                    };
                    match resolved.provider.new_client(&resolved.config, &client_ctx).await {
                        Err(e) => Condition::ready(
                            false,
                            REASON_VALIDATION_FAILED,
                            format!("could not create client: {}", e),
                        ),
                        Ok(client) => {
                            let result = client.validate().await;
                            if let Err(e) = client.close().await {
                                warn!("Failed to close client for store {}: {}", key, e);
                            }
                            validation_condition(result)
                        }
                    }
                }
            };
            (condition, Some(capabilities))
        }
    };

    if condition.is_true() {
        info!("Store {} is valid", key);
    } else {
        warn!(
            "Store {} is not ready: {}",
            key,
            condition.message.as_deref().unwrap_or_default()
        );
    }
    upsert_condition(&mut status.conditions, condition, Utc::now());
    status.capabilities = capabilities;
    status
}

fn validation_condition(result: Result<ValidationResult>) -> Condition {
    match result {
        Ok(ValidationResult::Ready) => Condition::ready(true, REASON_VALIDATED, "store validated"),
        Ok(ValidationResult::Unknown) => Condition::ready(
            true,
            REASON_VALIDATION_UNKNOWN,
            "store could not be validated, assuming it is usable",
        ),
        Ok(ValidationResult::Error(msg)) => Condition::ready(false, REASON_VALIDATION_FAILED, msg),
        Err(e) => Condition::ready(false, REASON_VALIDATION_FAILED, e.to_string()),
    }
}
