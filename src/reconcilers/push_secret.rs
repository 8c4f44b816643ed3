// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! PushSecret reconciler - writes a cluster secret into external stores.

use crate::constants::conditions::{REASON_ERRORED, REASON_SYNCED};
use crate::constants::finalizers;
use crate::error::{FerryError, Result, ResultExt};
use crate::generator::GeneratedState;
use crate::kubernetes::secrets::{get_secret, resolve_template_sources, secret_data};
use crate::kubernetes::{apply_status, generator_spec, resolve_store_ref};
use crate::pipeline::convert::revert_keys;
use crate::pipeline::render::apply_template;
use crate::pipeline::KeyMap;
use crate::provider::registry::Access;
use crate::provider::{ClientManager, SecretsClient};
use crate::reconcilers::{object_key, requeue_after, with_deadline, Context};
use crate::types::condition::{upsert_condition, Condition};
use crate::types::push_secret::{
    PushConversionStrategy, PushDeletionPolicy, PushSecret, PushSecretData, PushSecretStatus,
    SyncedPushSecrets, UpdatePolicy,
};
use crate::types::store::{parse_store_status_key, ResolvedStore, StoreRef};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::{Action, Config as ControllerConfig};
use kube::runtime::finalizer::{finalizer, Event};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::Controller;
use kube_runtime::watcher::Config as WatcherConfig;
use kube::{Api, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const SYNCED_MESSAGE: &str = "PushSecret synced successfully";
const UNCHANGED_SUFFIX: &str = " Existing secrets in providers unchanged.";

pub struct PushSecretReconciler {
    ctx: Arc<Context>,
}

impl PushSecretReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let client = self.ctx.client.clone();
        let wc = WatcherConfig::default();

        let controller = Controller::new(Api::<PushSecret>::all(client.clone()), wc.clone())
            .with_config(ControllerConfig::default().concurrency(self.ctx.config.worker_concurrency));
        let cache = controller.store();

        info!("Starting PushSecret reconciler");
        controller
            .watches(Api::<Secret>::all(client), wc, move |secret: Secret| {
                selecting(&cache, &secret)
            })
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.ctx)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled PushSecret: {:?}", o),
                    Err(e) => debug!("PushSecret reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

fn selecting(cache: &Store<PushSecret>, secret: &Secret) -> Vec<ObjectRef<PushSecret>> {
    let name = secret.name_any();
    cache
        .state()
        .into_iter()
        .filter(|ps| ps.namespace() == secret.namespace())
        .filter(|ps| ps.spec.selector.secret.as_ref().is_some_and(|s| s.name == name))
        .map(|ps| ObjectRef::from_obj(ps.as_ref()))
        .collect()
}

#[instrument(skip(ps, ctx), fields(push_secret = %object_key(ps.as_ref())))]
async fn reconcile(ps: Arc<PushSecret>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = ps.namespace().ok_or_else(|| {
        FerryError::ValidationError("PushSecret must be namespaced".to_string())
    })?;
    let api: Api<PushSecret> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, finalizers::PUSH_SECRET, ps, |event| async move {
        match event {
            Event::Apply(ps) => apply(&ps, &ctx).await,
            Event::Cleanup(ps) => cleanup(&ps, &ctx).await,
        }
    })
    .await
    .map_err(|e| FerryError::FinalizerError(Box::new(e)))
}

fn error_policy(ps: Arc<PushSecret>, error: &FerryError, ctx: Arc<Context>) -> Action {
    let key = object_key(ps.as_ref());
    let delay = ctx.backoff.next_delay(&key);
    warn!(
        "Failed to reconcile PushSecret {}: {}, retrying in {}s",
        key,
        error,
        delay.as_secs()
    );
    Action::requeue(delay)
}

/// Outcome of pushing to every store; `error` is the first failure in store order.
#[derive(Debug, Default)]
struct PushReport {
    synced: SyncedPushSecrets,
    error: Option<FerryError>,
}

async fn apply(ps: &PushSecret, ctx: &Context) -> Result<Action> {
    let key = object_key(ps);
    let api: Api<PushSecret> = Api::namespaced(ctx.client.clone(), &ps.namespace().unwrap_or_default());

    let report = match sync(ps, ctx).await {
        Ok(Some(report)) => report,
        Ok(None) => {
            debug!("PushSecret {} only targets stores of another controller, skipping", key);
            return Ok(Action::await_change());
        }
        Err(e) => {
            let condition = Condition::ready(false, REASON_ERRORED, e.to_string());
            let status = next_status(ps, condition, ps.synced(), false, Utc::now());
            if let Err(status_err) = apply_status(&api, &ps.name_any(), &status).await {
                warn!("Failed to record error on PushSecret {}: {}", key, status_err);
            }
            return Err(e);
        }
    };

    let PushReport { synced, error } = report;
    if let Some(e) = error {
        let condition = Condition::ready(false, REASON_ERRORED, e.to_string());
        let status = next_status(ps, condition, synced, false, Utc::now());
        apply_status(&api, &ps.name_any(), &status).await?;
        return Err(e);
    }

    let message = match ps.spec.update_policy {
        UpdatePolicy::IfNotExists => format!("{}.{}", SYNCED_MESSAGE, UNCHANGED_SUFFIX),
        UpdatePolicy::Always => SYNCED_MESSAGE.to_string(),
    };
    let condition = Condition::ready(true, REASON_SYNCED, message);
    let status = next_status(ps, condition, synced, true, Utc::now());
    apply_status(&api, &ps.name_any(), &status).await?;

    ctx.backoff.reset(&key);
    info!("Synced PushSecret {}", key);
    Ok(requeue_after(ps.refresh_interval()?))
}

fn next_status(
    ps: &PushSecret,
    condition: Condition,
    synced: SyncedPushSecrets,
    succeeded: bool,
    now: DateTime<Utc>,
) -> PushSecretStatus {
    let mut status = ps.status.clone().unwrap_or_default();
    upsert_condition(&mut status.conditions, condition, now);
    status.synced_push_secrets = synced;
    if succeeded {
        status.refresh_time = Some(now.to_rfc3339_opts(SecondsFormat::Secs, true));
        status.synced_resource_version = Some(ps.metadata.generation.unwrap_or_default().to_string());
    }
    status
}

/// Referenced stores in declaration order, each store once.
async fn resolve_stores(ps: &PushSecret, ctx: &Context, namespace: &str) -> Result<Vec<ResolvedStore>> {
    let mut stores: Vec<ResolvedStore> = Vec::new();
    for store_ref in &ps.spec.secret_store_refs {
        for store in resolve_store_ref(&ctx.client, &ctx.config, namespace, store_ref).await? {
            if !stores.iter().any(|s| s.status_key() == store.status_key()) {
                stores.push(store);
            }
        }
    }
    Ok(stores)
}

/// One attempt under the reconcile deadline; `None` when no store is managed here.
///
/// Clients are closed and, on failure, generated values released even when
/// the deadline cuts the attempt short.
async fn sync(ps: &PushSecret, ctx: &Context) -> Result<Option<PushReport>> {
    let namespace = ps.namespace().unwrap_or_default();
    let mut manager = ClientManager::new(&ctx.providers, ctx.client.clone(), &namespace);
    let mut generated = Vec::new();

    let result = with_deadline(
        ctx.config.reconcile_timeout,
        push_all(ps, ctx, &namespace, &mut manager, &mut generated),
    )
    .await;
    manager.close_all().await;

    let failed = match &result {
        Ok(report) => report.as_ref().is_some_and(|r| r.error.is_some()),
        Err(_) => true,
    };
    if failed && !generated.is_empty() {
        ctx.generators.cleanup_all(generated).await;
    }
    result
}

async fn push_all(
    ps: &PushSecret,
    ctx: &Context,
    namespace: &str,
    manager: &mut ClientManager<'_>,
    generated: &mut Vec<GeneratedState>,
) -> Result<Option<PushReport>> {
    ps.spec.selector.validate()?;

    let stores = resolve_stores(ps, ctx, namespace).await?;
    let (managed, unmanaged): (Vec<&ResolvedStore>, Vec<&ResolvedStore>) = stores
        .iter()
        .partition(|s| s.is_managed(&ctx.config.controller_class));
    if !stores.is_empty() && managed.is_empty() {
        return Ok(None);
    }

    let data = source_data(ps, ctx, namespace, generated).await?;

    let previous = ps.synced();
    let mut report = PushReport::default();
    for store in &unmanaged {
        if let Some(entries) = previous.store(&store.status_key()) {
            report.synced.set_store(store.status_key(), entries.clone());
        }
    }

    let mut targets = Vec::new();
    for store in &managed {
        match manager.get(store, Access::Write).await {
            Ok(client) => targets.push((*store, Ok(client))),
            Err(e) => targets.push((
                *store,
                Err(e.context(format!("could not get secrets client for store {}", store.name))),
            )),
        }
    }

    let pushes = targets.into_iter().map(|(store, client)| {
        let previous = previous.store(&store.status_key());
        let data = &data;
        async move {
            let pushed = match client {
                Ok(client) => push_store(ps, store, client.as_ref(), data).await,
                Err(e) => StorePush {
                    entries: BTreeMap::new(),
                    error: Some(e),
                },
            };
            (store, previous, pushed)
        }
    });
    for (store, previous, pushed) in join_all(pushes).await {
        let mut entries = pushed.entries;
        if let Some(e) = pushed.error {
            // previous entries stay until the store succeeds again
            if let Some(previous) = previous {
                for (key, data) in previous {
                    entries.entry(key.clone()).or_insert_with(|| data.clone());
                }
            }
            warn!("Push to store {} failed: {}", store.status_key(), e);
            report.error.get_or_insert(e);
        }
        if !entries.is_empty() {
            report.synced.set_store(store.status_key(), entries);
        }
    }

    if ps.spec.deletion_policy == PushDeletionPolicy::Delete {
        let orphans = previous.orphans_against(&report.synced);
        delete_orphans(ctx, namespace, &stores, manager, orphans, &mut report).await;
    }
    Ok(Some(report))
}

async fn source_data(
    ps: &PushSecret,
    ctx: &Context,
    namespace: &str,
    generated: &mut Vec<GeneratedState>,
) -> Result<KeyMap> {
    let selector = &ps.spec.selector;
    let data = if let Some(secret) = &selector.secret {
        let source = get_secret(&ctx.client, namespace, &secret.name)
            .await
            .context("could not get source secret")?
            .ok_or_else(|| {
                FerryError::NotFound(format!(
                    "could not get source secret: secret {:?} not found",
                    secret.name
                ))
            })?;
        secret_data(&source)
    } else if let Some(generator_ref) = &selector.generator_ref {
        let spec = generator_spec(&ctx.client, namespace, generator_ref).await?;
        let (data, state) = ctx
            .generators
            .generate(&generator_ref.kind, &spec, namespace)
            .await
            .with_context(|| format!("generator {} {:?}", generator_ref.kind, generator_ref.name))?;
        generated.extend(state);
        data
    } else {
        KeyMap::new()
    };

    match &ps.spec.template {
        Some(template) => {
            let sources = resolve_template_sources(&ctx.client, namespace, template)
                .await
                .context("template")?;
            Ok(apply_template(Some(template), sources, data).context("template")?.data)
        }
        None => Ok(data),
    }
}

struct StorePush {
    entries: BTreeMap<String, PushSecretData>,
    error: Option<FerryError>,
}

/// Push every entry that applies to `store`, stopping at the first failure.
async fn push_store(
    ps: &PushSecret,
    store: &ResolvedStore,
    client: &dyn SecretsClient,
    data: &KeyMap,
) -> StorePush {
    let mut pushed = StorePush {
        entries: BTreeMap::new(),
        error: None,
    };
    for entry in ps.spec.data.iter().filter(|e| e.applies_to(&store.labels)) {
        let result = push_entry(ps.spec.update_policy, store, client, data, entry).await;
        match result {
            Ok(()) => {
                pushed
                    .entries
                    .insert(entry.matcher.remote_ref.status_key(), entry.clone());
            }
            Err(e) => {
                pushed.error = Some(e.context("set secret failed"));
                break;
            }
        }
    }
    pushed
}

async fn push_entry(
    policy: UpdatePolicy,
    store: &ResolvedStore,
    client: &dyn SecretsClient,
    data: &KeyMap,
    entry: &PushSecretData,
) -> Result<()> {
    let value = entry_value(data, entry)?;
    let remote = &entry.matcher.remote_ref;

    if policy == UpdatePolicy::IfNotExists {
        let exists = client
            .secret_exists(remote)
            .await
            .context("could not verify if secret exists in store")?;
        if exists {
            debug!("Remote ref {} exists in store {}, not overwriting", remote.status_key(), store.name);
            return Ok(());
        }
    }

    client.push_secret(&value, entry).await.with_context(|| {
        format!(
            "could not write remote ref {} to target secretstore {}",
            remote.status_key(),
            store.name
        )
    })
}

/// The bytes pushed for `entry`: one key, or the whole secret as a JSON object.
fn entry_value(data: &KeyMap, entry: &PushSecretData) -> Result<Vec<u8>> {
    let reverted;
    let data = match entry.conversion_strategy {
        PushConversionStrategy::ReverseUnicode => {
            reverted = revert_keys(data.clone())?;
            &reverted
        }
        PushConversionStrategy::None => data,
    };

    match entry.secret_key() {
        Some(key) => data
            .get(key)
            .cloned()
            .ok_or_else(|| FerryError::NotFound(format!("secret key {} does not exist", key))),
        None => {
            let object = data
                .iter()
                .map(|(k, v)| {
                    String::from_utf8(v.clone()).map(|v| (k.clone(), v)).map_err(|_| {
                        FerryError::ValidationError(format!(
                            "secret key {} is not valid UTF-8 and cannot be pushed as JSON",
                            k
                        ))
                    })
                })
                .collect::<Result<BTreeMap<String, String>>>()?;
            serde_json::to_vec(&object).map_err(|e| {
                FerryError::ValidationError(format!("could not encode secret as JSON: {}", e))
            })
        }
    }
}

/// Find the store behind a status key, resolving it when it is no longer referenced.
async fn store_for_key(
    ctx: &Context,
    namespace: &str,
    stores: &[ResolvedStore],
    store_key: &str,
) -> Result<Option<ResolvedStore>> {
    if let Some(store) = stores.iter().find(|s| s.status_key() == store_key) {
        return Ok(Some(store.clone()));
    }
    let Some((kind, name)) = parse_store_status_key(store_key) else {
        warn!("Ignoring synced entries of unparseable store key {:?}", store_key);
        return Ok(None);
    };
    match resolve_store_ref(&ctx.client, &ctx.config, namespace, &StoreRef::named(kind, name)).await {
        Ok(found) => Ok(found.into_iter().next()),
        Err(e) if e.is_not_found() => {
            warn!("Store {} no longer exists, forgetting its synced entries", store_key);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn delete_orphans(
    ctx: &Context,
    namespace: &str,
    stores: &[ResolvedStore],
    manager: &mut ClientManager<'_>,
    orphans: Vec<(String, PushSecretData)>,
    report: &mut PushReport,
) {
    for (store_key, data) in orphans {
        let result = delete_remote(ctx, namespace, stores, manager, &store_key, &data).await;
        if let Err(e) = result {
            warn!("Failed to delete {} from store {}: {}", data.remote_key(), store_key, e);
            report.synced.record(&store_key, &data);
            report.error.get_or_insert(e);
        }
    }
}

async fn delete_remote(
    ctx: &Context,
    namespace: &str,
    stores: &[ResolvedStore],
    manager: &mut ClientManager<'_>,
    store_key: &str,
    data: &PushSecretData,
) -> Result<()> {
    let Some(store) = store_for_key(ctx, namespace, stores, store_key).await? else {
        return Ok(());
    };
    let client = manager
        .get(&store, Access::Write)
        .await
        .with_context(|| format!("could not get secrets client for store {}", store.name))?;
    client
        .delete_secret(&data.matcher.remote_ref)
        .await
        .with_context(|| {
            format!(
                "could not delete remote ref {} from store {}",
                data.matcher.remote_ref.status_key(),
                store.name
            )
        })?;
    info!("Deleted remote ref {} from store {}", data.matcher.remote_ref.status_key(), store_key);
    Ok(())
}

async fn cleanup(ps: &PushSecret, ctx: &Context) -> Result<Action> {
    let key = object_key(ps);
    if ps.spec.deletion_policy == PushDeletionPolicy::Delete {
        let namespace = ps.namespace().unwrap_or_default();
        let synced = ps.synced();
        let orphans: Vec<(String, PushSecretData)> = synced
            .iter()
            .flat_map(|(store_key, entries)| {
                entries.values().map(move |data| (store_key.clone(), data.clone()))
            })
            .collect();

        let mut manager = ClientManager::new(&ctx.providers, ctx.client.clone(), &namespace);
        let mut report = PushReport::default();
        delete_orphans(ctx, &namespace, &[], &mut manager, orphans, &mut report).await;
        manager.close_all().await;

        if let Some(e) = report.error {
            return Err(e.context("could not delete pushed secrets"));
        }
    }

    ctx.backoff.reset(&key);
    info!("Cleaned up PushSecret {}", key);
    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::generator::GeneratorRegistry;
    use crate::provider::registry::MaintenanceStatus;
    use crate::provider::ProviderRegistry;
    use crate::test_utils::{secret_json, store_json, store_path, MockService, RecordingProvider};
    use crate::types::store::StoreKind;
    use std::time::Duration;

    const SOURCE_PATH: &str = "/api/v1/namespaces/apps/secrets/source";
    const STATUS_PATH: &str = "/apis/keyferry.geeko.me/v1/namespaces/apps/pushsecrets/push/status";

    fn push_secret(spec: serde_json::Value, status: Option<serde_json::Value>) -> PushSecret {
        let mut object = serde_json::json!({
            "apiVersion": "keyferry.geeko.me/v1",
            "kind": "PushSecret",
            "metadata": {"name": "push", "namespace": "apps", "uid": "ps-uid", "generation": 1},
            "spec": spec,
        });
        if let Some(status) = status {
            object["status"] = status;
        }
        serde_json::from_value(object).unwrap()
    }

    fn spec(stores: &[&str], data: serde_json::Value) -> serde_json::Value {
        let refs: Vec<serde_json::Value> = stores
            .iter()
            .map(|name| serde_json::json!({"name": name}))
            .collect();
        serde_json::json!({
            "secretStoreRefs": refs,
            "selector": {"secret": {"name": "source"}},
            "data": data,
        })
    }

    fn entry(secret_key: &str, remote_key: &str) -> serde_json::Value {
        serde_json::json!({"match": {"secretKey": secret_key, "remoteRef": {"remoteKey": remote_key}}})
    }

    struct Harness {
        mock: MockService,
        provider: Arc<RecordingProvider>,
        ctx: Context,
    }

    /// Stores `(name, controller)` backed by the recording provider.
    fn harness(ps: &PushSecret, stores: &[(&str, &str)]) -> Harness {
        let mut mock = MockService::new()
            .on_get(
                SOURCE_PATH,
                200,
                &secret_json("apps", "source", &[("user", "admin"), ("pass", "s3cr3t")]),
            )
            .on_patch(STATUS_PATH, 200, &serde_json::to_string(ps).unwrap());
        for (name, controller) in stores {
            mock = mock.on_get(
                &store_path(StoreKind::SecretStore, "apps", name),
                200,
                &store_json(
                    StoreKind::SecretStore,
                    "apps",
                    name,
                    controller,
                    serde_json::json!({"recording": {}}),
                ),
            );
        }

        let provider = Arc::new(RecordingProvider::default());
        let mut providers = ProviderRegistry::new();
        providers.register("recording", provider.clone(), MaintenanceStatus::Maintained);
        let ctx = Context::new(
            mock.clone().into_client(),
            Config::default(),
            Arc::new(providers),
            Arc::new(GeneratorRegistry::with_defaults()),
        );
        Harness { mock, provider, ctx }
    }

    fn status_body(mock: &MockService) -> serde_json::Value {
        let writes = mock.requests_with("PATCH", STATUS_PATH);
        assert_eq!(writes.len(), 1);
        writes[0].json()["status"].clone()
    }

    #[tokio::test]
    async fn test_pushes_to_managed_stores_only() {
        let ps = push_secret(spec(&["a", "b", "c"], serde_json::json!([entry("user", "db-user")])), None);
        let h = harness(&ps, &[("a", ""), ("b", "default"), ("c", "other")]);

        let action = apply(&ps, &h.ctx).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(3600)));
        for store in ["a", "b"] {
            assert_eq!(
                h.provider.client(store).pushes(),
                vec![("db-user".to_string(), b"admin".to_vec())]
            );
        }
        assert!(h.provider.client("c").pushes().is_empty());
        assert_eq!(h.provider.client("a").closed(), 1);
        assert_eq!(h.provider.client("b").closed(), 1);
        assert_eq!(h.provider.client("c").closed(), 0);

        let status = status_body(&h.mock);
        assert_eq!(status["conditions"][0]["status"], "True");
        assert_eq!(status["conditions"][0]["message"], "PushSecret synced successfully");
        let synced = status["syncedPushSecrets"].as_object().unwrap();
        assert_eq!(
            synced.keys().collect::<Vec<_>>(),
            vec!["SecretStore/a", "SecretStore/b"]
        );
        assert_eq!(synced["SecretStore/a"]["db-user"]["match"]["secretKey"], "user");
    }

    #[tokio::test]
    async fn test_unmanaged_stores_keep_synced_entries_under_delete_policy() {
        let mut spec = spec(&["a", "b", "c", "d"], serde_json::json!([entry("user", "db-user")]));
        spec["deletionPolicy"] = serde_json::json!("Delete");
        let status = serde_json::json!({
            "conditions": [],
            "syncedPushSecrets": {"SecretStore/c": {
                "db-user": entry("user", "db-user"),
                "legacy": entry("pass", "legacy"),
            }}
        });
        let ps = push_secret(spec, Some(status));
        let h = harness(&ps, &[("a", ""), ("b", "default"), ("c", "other"), ("d", "other")]);

        apply(&ps, &h.ctx).await.unwrap();

        for store in ["a", "b"] {
            assert_eq!(
                h.provider.client(store).pushes(),
                vec![("db-user".to_string(), b"admin".to_vec())]
            );
        }
        for store in ["a", "b", "c", "d"] {
            assert!(h.provider.client(store).deletes().is_empty());
        }
        for store in ["c", "d"] {
            let client = h.provider.client(store);
            assert!(client.pushes().is_empty());
            assert!(client.with(|s| s.exists_checks.is_empty()));
            assert_eq!(client.closed(), 0);
        }

        let status = status_body(&h.mock);
        let synced = status["syncedPushSecrets"].as_object().unwrap();
        assert_eq!(
            synced.keys().collect::<Vec<_>>(),
            vec!["SecretStore/a", "SecretStore/b", "SecretStore/c"]
        );
        let previous = serde_json::to_value(ps.synced().store("SecretStore/c").unwrap()).unwrap();
        assert_eq!(synced["SecretStore/c"], previous);
    }

    #[tokio::test]
    async fn test_timed_out_push_closes_clients() {
        let ps = push_secret(spec(&["a"], serde_json::json!([entry("user", "db-user")])), None);
        let mut h = harness(&ps, &[("a", "")]);
        h.ctx.config.reconcile_timeout = Duration::from_millis(50);
        h.provider
            .client("a")
            .with(|s| s.latency = Some(Duration::from_secs(30)));

        let err = apply(&ps, &h.ctx).await.unwrap_err();

        assert_eq!(err.to_string(), "reconciliation did not finish within 50ms");
        assert_eq!(h.provider.client("a").closed(), 1);
        assert!(h.provider.client("a").pushes().is_empty());
        let status = status_body(&h.mock);
        assert_eq!(status["conditions"][0]["reason"], "Errored");
    }

    #[tokio::test]
    async fn test_all_unmanaged_stores_leave_status_alone() {
        let ps = push_secret(spec(&["c"], serde_json::json!([entry("user", "db-user")])), None);
        let h = harness(&ps, &[("c", "other")]);

        let action = apply(&ps, &h.ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert!(h.mock.requests_with("PATCH", STATUS_PATH).is_empty());
        assert!(h.provider.client("c").pushes().is_empty());
    }

    #[tokio::test]
    async fn test_if_not_exists_keeps_existing_remote_values() {
        let mut spec = spec(
            &["a"],
            serde_json::json!([entry("user", "db-user"), entry("pass", "db-pass")]),
        );
        spec["updatePolicy"] = serde_json::json!("IfNotExists");
        let ps = push_secret(spec, None);
        let h = harness(&ps, &[("a", "")]);
        h.provider
            .client("a")
            .with(|s| s.values.insert("db-user".to_string(), b"old".to_vec()));

        apply(&ps, &h.ctx).await.unwrap();

        assert_eq!(
            h.provider.client("a").pushes(),
            vec![("db-pass".to_string(), b"s3cr3t".to_vec())]
        );
        let status = status_body(&h.mock);
        assert_eq!(
            status["conditions"][0]["message"],
            "PushSecret synced successfully. Existing secrets in providers unchanged."
        );
        let synced = &status["syncedPushSecrets"]["SecretStore/a"];
        assert!(synced.get("db-user").is_some());
        assert!(synced.get("db-pass").is_some());
    }

    #[tokio::test]
    async fn test_failing_existence_check_is_an_error() {
        let mut spec = spec(&["a"], serde_json::json!([entry("user", "db-user")]));
        spec["updatePolicy"] = serde_json::json!("IfNotExists");
        let ps = push_secret(spec, None);
        let h = harness(&ps, &[("a", "")]);
        h.provider
            .client("a")
            .with(|s| s.exists_error = Some("timeout".to_string()));

        let err = apply(&ps, &h.ctx).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "set secret failed: could not verify if secret exists in store: timeout"
        );
        assert!(h.provider.client("a").pushes().is_empty());
    }

    #[tokio::test]
    async fn test_removed_entry_is_deleted_exactly_once() {
        let mut spec = spec(&["a"], serde_json::json!([entry("user", "db-user")]));
        spec["deletionPolicy"] = serde_json::json!("Delete");
        let status = serde_json::json!({
            "conditions": [],
            "syncedPushSecrets": {"SecretStore/a": {
                "db-user": entry("user", "db-user"),
                "old-key": entry("pass", "old-key"),
            }}
        });
        let ps = push_secret(spec, Some(status));
        let h = harness(&ps, &[("a", "")]);

        apply(&ps, &h.ctx).await.unwrap();

        assert_eq!(h.provider.client("a").deletes(), vec!["old-key".to_string()]);
        let status = status_body(&h.mock);
        let synced = status["syncedPushSecrets"]["SecretStore/a"].as_object().unwrap();
        assert_eq!(synced.keys().collect::<Vec<_>>(), vec!["db-user"]);
    }

    #[tokio::test]
    async fn test_failed_delete_stays_in_status() {
        let mut spec = spec(&["a"], serde_json::json!([]));
        spec["deletionPolicy"] = serde_json::json!("Delete");
        let status = serde_json::json!({
            "conditions": [],
            "syncedPushSecrets": {"SecretStore/a": {"old-key": entry("pass", "old-key")}}
        });
        let ps = push_secret(spec, Some(status));
        let h = harness(&ps, &[("a", "")]);
        h.provider
            .client("a")
            .with(|s| s.delete_error = Some("denied".to_string()));

        let err = apply(&ps, &h.ctx).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "could not delete remote ref old-key from store a: denied"
        );
        let status = status_body(&h.mock);
        assert_eq!(status["conditions"][0]["status"], "False");
        assert!(status["syncedPushSecrets"]["SecretStore/a"].get("old-key").is_some());
    }

    #[tokio::test]
    async fn test_failed_store_does_not_block_others() {
        let ps = push_secret(spec(&["a", "b"], serde_json::json!([entry("user", "db-user")])), None);
        let h = harness(&ps, &[("a", ""), ("b", "")]);
        h.provider.fail_client("b", "invalid credentials");

        let err = apply(&ps, &h.ctx).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "could not get secrets client for store b: invalid credentials"
        );
        assert_eq!(h.provider.client("a").pushes().len(), 1);
        let status = status_body(&h.mock);
        assert_eq!(status["conditions"][0]["reason"], "Errored");
        assert_eq!(
            status["conditions"][0]["message"],
            "could not get secrets client for store b: invalid credentials"
        );
        assert!(status["syncedPushSecrets"]["SecretStore/a"].get("db-user").is_some());
        assert!(status["syncedPushSecrets"].get("SecretStore/b").is_none());
    }

    #[tokio::test]
    async fn test_whole_secret_is_pushed_as_json() {
        let ps = push_secret(
            spec(&["a"], serde_json::json!([{"match": {"remoteRef": {"remoteKey": "blob"}}}])),
            None,
        );
        let h = harness(&ps, &[("a", "")]);

        apply(&ps, &h.ctx).await.unwrap();

        assert_eq!(
            h.provider.client("a").pushes(),
            vec![(
                "blob".to_string(),
                br#"{"pass":"s3cr3t","user":"admin"}"#.to_vec()
            )]
        );
    }

    #[tokio::test]
    async fn test_missing_source_key() {
        let ps = push_secret(spec(&["a"], serde_json::json!([entry("nope", "x")])), None);
        let h = harness(&ps, &[("a", "")]);

        let err = apply(&ps, &h.ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "set secret failed: secret key nope does not exist");
    }

    #[tokio::test]
    async fn test_missing_source_secret() {
        let mut spec = spec(&["a"], serde_json::json!([entry("user", "db-user")]));
        spec["selector"] = serde_json::json!({"secret": {"name": "absent"}});
        let ps = push_secret(spec, None);
        let h = harness(&ps, &[("a", "")]);

        let err = apply(&ps, &h.ctx).await.unwrap_err();

        assert!(err.to_string().starts_with("could not get source secret"));
        let status = status_body(&h.mock);
        assert_eq!(status["conditions"][0]["status"], "False");
    }

    #[tokio::test]
    async fn test_cleanup_deletes_every_synced_entry() {
        let mut spec = spec(&["a"], serde_json::json!([]));
        spec["deletionPolicy"] = serde_json::json!("Delete");
        let status = serde_json::json!({
            "conditions": [],
            "syncedPushSecrets": {"SecretStore/a": {
                "one": entry("user", "one"),
                "two": entry("pass", "two"),
            }}
        });
        let ps = push_secret(spec, Some(status));
        let h = harness(&ps, &[("a", "")]);

        let action = cleanup(&ps, &h.ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(
            h.provider.client("a").deletes(),
            vec!["one".to_string(), "two".to_string()]
        );
    }

    #[test]
    fn test_reverse_unicode_lookup() {
        let data = KeyMap::from([("app_U002f_token".to_string(), b"t".to_vec())]);
        let mut push: PushSecretData =
            serde_json::from_value(entry("app/token", "remote")).unwrap();
        assert!(entry_value(&data, &push).is_err());

        push.conversion_strategy = PushConversionStrategy::ReverseUnicode;
        assert_eq!(entry_value(&data, &push).unwrap(), b"t");
    }
}
