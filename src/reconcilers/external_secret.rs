// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ExternalSecret reconciler - materializes store values into a cluster secret.

use crate::constants::conditions::{READY, REASON_DELETED, REASON_ERRORED, REASON_SYNCED};
use crate::constants::{annotations, finalizers, labels};
use crate::error::{FerryError, Result, ResultExt};
use crate::generator::GeneratedState;
use crate::kubernetes::secrets::{apply_secret, delete_secret, get_secret, resolve_template_sources};
use crate::kubernetes::{apply_status, generator_spec, resolve_store_ref};
use crate::pipeline::decode::decode_value;
use crate::pipeline::render::{apply_template, RenderedTemplate};
use crate::pipeline::{data_hash, shape_bulk, validate_keys, KeyMap};
use crate::provider::registry::Access;
use crate::provider::ClientManager;
use crate::reconcilers::{object_key, requeue_after, with_deadline, Context};
use crate::types::condition::{find_condition, upsert_condition, Condition};
use crate::types::external_secret::{
    CreationPolicy, DeletionPolicy, ExternalSecret, ExternalSecretData, ExternalSecretDataFrom,
    ExternalSecretStatus, RefreshPolicy, SecretBinding,
};
use crate::types::remote::{ConversionStrategy, DecodingStrategy, GeneratorRef};
use crate::types::store::{ClusterSecretStore, ResolvedStore, SecretStore, StoreKind, StoreRef};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::runtime::controller::{Action, Config as ControllerConfig};
use kube::runtime::finalizer::{finalizer, Event};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::Controller;
use kube_runtime::watcher::Config as WatcherConfig;
use kube::{Api, Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub struct ExternalSecretReconciler {
    ctx: Arc<Context>,
}

impl ExternalSecretReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let client = self.ctx.client.clone();
        let wc = WatcherConfig::default();

        let controller = Controller::new(Api::<ExternalSecret>::all(client.clone()), wc.clone())
            .with_config(ControllerConfig::default().concurrency(self.ctx.config.worker_concurrency));
        let cache = controller.store();

        let namespaced_cache = cache.clone();
        let mut controller = controller
            .owns(Api::<Secret>::all(client.clone()), wc.clone())
            .watches(
                Api::<SecretStore>::all(client.clone()),
                wc.clone(),
                move |store: SecretStore| {
                    referencing(
                        &namespaced_cache,
                        StoreKind::SecretStore,
                        &store.name_any(),
                        store.namespace().as_deref(),
                    )
                },
            );
        if self.ctx.config.enable_cluster_stores {
            controller = controller.watches(
                Api::<ClusterSecretStore>::all(client),
                wc,
                move |store: ClusterSecretStore| {
                    referencing(&cache, StoreKind::ClusterSecretStore, &store.name_any(), None)
                },
            );
        }

        info!("Starting ExternalSecret reconciler");
        controller
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.ctx)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled ExternalSecret: {:?}", o),
                    Err(e) => debug!("ExternalSecret reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

fn referencing(
    cache: &Store<ExternalSecret>,
    kind: StoreKind,
    name: &str,
    namespace: Option<&str>,
) -> Vec<ObjectRef<ExternalSecret>> {
    cache
        .state()
        .into_iter()
        .filter(|es| references_store(es, kind, name, namespace))
        .map(|es| ObjectRef::from_obj(es.as_ref()))
        .collect()
}

/// Whether a change to the store `kind/name` may affect `es`.
///
/// Selector references match every store of their kind since the store's
/// labels may just have changed.
pub fn references_store(
    es: &ExternalSecret,
    kind: StoreKind,
    name: &str,
    namespace: Option<&str>,
) -> bool {
    if kind == StoreKind::SecretStore && es.namespace().as_deref() != namespace {
        return false;
    }
    es.store_refs().iter().any(|r| {
        r.kind == kind && (r.label_selector.is_some() || r.name.as_deref() == Some(name))
    })
}

#[instrument(skip(es, ctx), fields(external_secret = %object_key(es.as_ref())))]
async fn reconcile(es: Arc<ExternalSecret>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = es.namespace().ok_or_else(|| {
        FerryError::ValidationError("ExternalSecret must be namespaced".to_string())
    })?;
    let api: Api<ExternalSecret> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, finalizers::EXTERNAL_SECRET, es, |event| async move {
        match event {
            Event::Apply(es) => apply(&es, &ctx).await,
            Event::Cleanup(es) => cleanup(&es, &ctx).await,
        }
    })
    .await
    .map_err(|e| FerryError::FinalizerError(Box::new(e)))
}

fn error_policy(es: Arc<ExternalSecret>, error: &FerryError, ctx: Arc<Context>) -> Action {
    let key = object_key(es.as_ref());
    let delay = ctx.backoff.next_delay(&key);
    warn!(
        "Failed to reconcile ExternalSecret {}: {}, retrying in {}s",
        key,
        error,
        delay.as_secs()
    );
    Action::requeue(delay)
}

/// Generation of every store a sync used, keyed by store status key.
pub type StoreGenerations = BTreeMap<String, i64>;

/// What a successful sync saw, recorded in status to detect later changes.
#[derive(Debug, Default, PartialEq)]
struct Observed {
    stores: StoreGenerations,
    /// `resourceVersion` of the target once the sync finished
    target_version: Option<String>,
}

/// Result of a sync attempt that did not fail.
#[derive(Debug, PartialEq)]
enum Outcome {
    /// A referenced store belongs to another controller class
    NotManaged,
    /// Nothing to refresh yet
    Fresh(Action),
    Synced(Observed),
    /// Every source reported its data gone and the target was deleted
    Deleted(Observed),
}

async fn apply(es: &ExternalSecret, ctx: &Context) -> Result<Action> {
    let key = object_key(es);
    let api: Api<ExternalSecret> = Api::namespaced(ctx.client.clone(), &es.namespace().unwrap_or_default());

    let (condition, observed, action) = match sync(es, ctx).await {
        Ok(Outcome::NotManaged) => {
            debug!("ExternalSecret {} uses a store of another controller, skipping", key);
            return Ok(Action::await_change());
        }
        Ok(Outcome::Fresh(action)) => {
            ctx.backoff.reset(&key);
            return Ok(action);
        }
        Ok(Outcome::Synced(observed)) => (
            Condition::ready(true, REASON_SYNCED, "secret synced"),
            observed,
            next_refresh(es)?,
        ),
        Ok(Outcome::Deleted(observed)) => (
            Condition::ready(
                false,
                REASON_DELETED,
                "secret deleted because the data was removed from every source",
            ),
            observed,
            next_refresh(es)?,
        ),
        Err(e) => {
            let condition = Condition::ready(false, REASON_ERRORED, e.to_string());
            let status = next_status(es, condition, None, Utc::now());
            if let Err(status_err) = apply_status(&api, &es.name_any(), &status).await {
                warn!("Failed to record error on ExternalSecret {}: {}", key, status_err);
            }
            return Err(e);
        }
    };

    let status = next_status(es, condition, Some(observed), Utc::now());
    apply_status(&api, &es.name_any(), &status).await?;
    ctx.backoff.reset(&key);
    info!("Synced ExternalSecret {}", key);
    Ok(action)
}

fn next_refresh(es: &ExternalSecret) -> Result<Action> {
    Ok(match es.spec.refresh_policy {
        RefreshPolicy::Periodic => requeue_after(es.refresh_interval()?),
        RefreshPolicy::CreatedOnce | RefreshPolicy::OnChange => Action::await_change(),
    })
}

/// Status after an attempt; only successful attempts move the refresh bookkeeping.
fn next_status(
    es: &ExternalSecret,
    condition: Condition,
    synced: Option<Observed>,
    now: DateTime<Utc>,
) -> ExternalSecretStatus {
    let mut status = es.status.clone().unwrap_or_default();
    upsert_condition(&mut status.conditions, condition, now);
    if let Some(observed) = synced {
        status.refresh_time = Some(now.to_rfc3339_opts(SecondsFormat::Secs, true));
        status.synced_resource_version = Some(es.generation_marker());
        status.store_generations = observed.stores;
        status.target_resource_version = observed.target_version;
        status.binding = Some(SecretBinding {
            name: es.target_name(),
        });
    }
    status
}

#[derive(Debug, PartialEq)]
pub enum Refresh {
    Now,
    Wait(Action),
}

/// Decide whether the target must be refreshed at `now`.
///
/// Besides the refresh policy, a change to any store the last sync used and
/// any write to the target since then force a refresh.
pub fn refresh_decision(
    es: &ExternalSecret,
    live: Option<&Secret>,
    stores: &StoreGenerations,
    now: DateTime<Utc>,
) -> Result<Refresh> {
    let interval = es.refresh_interval()?;
    let Some(status) = &es.status else {
        return Ok(Refresh::Now);
    };

    let ready = find_condition(&status.conditions, READY);
    let deleted = ready.is_some_and(|c| c.reason.as_deref() == Some(REASON_DELETED));
    let settled = ready.is_some_and(|c| c.is_true()) || deleted;
    let writes_target = es.spec.target.creation_policy != CreationPolicy::None;
    let generation_changed =
        status.synced_resource_version.as_deref() != Some(es.generation_marker().as_str());
    let stores_changed = &status.store_generations != stores;
    let target_changed = writes_target
        && status.target_resource_version.is_some()
        && live.and_then(|l| l.metadata.resource_version.as_ref())
            != status.target_resource_version.as_ref();

    if !settled
        || generation_changed
        || stores_changed
        || target_changed
        || (writes_target && live.is_none() && !deleted)
    {
        return Ok(Refresh::Now);
    }

    match es.spec.refresh_policy {
        RefreshPolicy::CreatedOnce | RefreshPolicy::OnChange => {
            Ok(Refresh::Wait(Action::await_change()))
        }
        RefreshPolicy::Periodic if interval.is_zero() => Ok(Refresh::Wait(Action::await_change())),
        RefreshPolicy::Periodic => {
            let last = status
                .refresh_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok());
            let Some(last) = last else {
                return Ok(Refresh::Now);
            };
            let elapsed = now
                .signed_duration_since(last.with_timezone(&Utc))
                .to_std()
                .unwrap_or(Duration::ZERO);
            if elapsed >= interval {
                Ok(Refresh::Now)
            } else {
                Ok(Refresh::Wait(Action::requeue(interval - elapsed)))
            }
        }
    }
}

type ResolvedRefs = Vec<(StoreRef, Vec<ResolvedStore>)>;

async fn resolve_stores(es: &ExternalSecret, ctx: &Context, namespace: &str) -> Result<ResolvedRefs> {
    let mut resolved: ResolvedRefs = Vec::new();
    for store_ref in es.store_refs() {
        if resolved.iter().any(|(r, _)| r == store_ref) {
            continue;
        }
        let stores = resolve_store_ref(&ctx.client, &ctx.config, namespace, store_ref).await?;
        resolved.push((store_ref.clone(), stores));
    }
    Ok(resolved)
}

fn store_generations(resolved: &ResolvedRefs) -> StoreGenerations {
    resolved
        .iter()
        .flat_map(|(_, stores)| stores)
        .map(|s| (s.status_key(), s.generation.unwrap_or_default()))
        .collect()
}

/// One attempt under the reconcile deadline.
///
/// Clients are closed and, on failure, generated values released even when
/// the deadline cuts the attempt short.
async fn sync(es: &ExternalSecret, ctx: &Context) -> Result<Outcome> {
    let namespace = es.namespace().unwrap_or_default();
    let mut manager = ClientManager::new(&ctx.providers, ctx.client.clone(), &namespace);
    let mut generated = Vec::new();

    let result = with_deadline(
        ctx.config.reconcile_timeout,
        attempt(es, ctx, &namespace, &mut manager, &mut generated),
    )
    .await;
    manager.close_all().await;

    if result.is_err() && !generated.is_empty() {
        ctx.generators.cleanup_all(generated).await;
    }
    result
}

async fn attempt(
    es: &ExternalSecret,
    ctx: &Context,
    namespace: &str,
    manager: &mut ClientManager<'_>,
    generated: &mut Vec<GeneratedState>,
) -> Result<Outcome> {
    let resolved = resolve_stores(es, ctx, namespace).await?;
    if let Some(store) = resolved
        .iter()
        .flat_map(|(_, stores)| stores)
        .find(|s| !s.is_managed(&ctx.config.controller_class))
    {
        debug!("Store {} is not managed by this controller", store.status_key());
        return Ok(Outcome::NotManaged);
    }

    let stores = store_generations(&resolved);
    let live = get_secret(&ctx.client, namespace, &es.target_name()).await?;
    if let Refresh::Wait(action) = refresh_decision(es, live.as_ref(), &stores, Utc::now())? {
        return Ok(Outcome::Fresh(action));
    }

    let mut sources = Sources {
        es,
        ctx,
        namespace,
        resolved: &resolved,
        manager,
        generated,
    };
    sync_target(&mut sources, live, stores).await
}

/// Everything a fetch needs during one reconciliation.
struct Sources<'a, 'm> {
    es: &'a ExternalSecret,
    ctx: &'a Context,
    namespace: &'a str,
    resolved: &'a ResolvedRefs,
    manager: &'a mut ClientManager<'m>,
    generated: &'a mut Vec<GeneratedState>,
}

#[derive(Debug, Default)]
struct Fetched {
    data: KeyMap,
    sources: usize,
    missing: usize,
}

async fn sync_target(
    sources: &mut Sources<'_, '_>,
    live: Option<Secret>,
    stores: StoreGenerations,
) -> Result<Outcome> {
    let es = sources.es;
    let ctx = sources.ctx;
    let namespace = sources.namespace;
    let policy = es.spec.target.deletion_policy;

    let fetched = fetch_all(sources).await?;
    validate_keys(&fetched.data)?;

    if fetched.sources > 0 && fetched.missing == fetched.sources {
        match policy {
            DeletionPolicy::Delete => {
                if let Some(live) = &live {
                    if is_managed_secret(live) {
                        delete_secret(&ctx.client, namespace, &live.name_any()).await?;
                    } else {
                        warn!("Not deleting secret {}/{}: not managed by keyferry", namespace, live.name_any());
                    }
                }
                return Ok(Outcome::Deleted(Observed {
                    stores,
                    target_version: None,
                }));
            }
            DeletionPolicy::Merge if live.is_none() => {
                return Ok(Outcome::Synced(Observed {
                    stores,
                    target_version: None,
                }))
            }
            _ => {}
        }
    }

    let template = es.spec.target.template.as_ref();
    let template_sources = match template {
        Some(t) => resolve_template_sources(&ctx.client, namespace, t)
            .await
            .context("template")?,
        None => Vec::new(),
    };
    let rendered = apply_template(template, template_sources, fetched.data).context("template")?;
    validate_keys(&rendered.data)?;

    let target_version = write_target(es, ctx, namespace, live, rendered).await?;
    Ok(Outcome::Synced(Observed {
        stores,
        target_version,
    }))
}

/// Fetch every source in declaration order; later sources override earlier keys.
async fn fetch_all(sources: &mut Sources<'_, '_>) -> Result<Fetched> {
    let es = sources.es;
    let soft_missing = es.spec.target.deletion_policy != DeletionPolicy::Retain;
    let mut fetched = Fetched::default();

    for (i, entry) in es.spec.data_from.iter().enumerate() {
        fetched.sources += 1;
        let result = fetch_data_from(sources, entry)
            .await
            .with_context(|| format!("error processing spec.dataFrom[{}]", i));
        match result {
            Ok(map) => fetched.data.extend(map),
            Err(e) if soft_missing && e.is_not_found() => {
                debug!("{}", e);
                fetched.missing += 1;
            }
            Err(e) => return Err(e),
        }
    }

    for (i, entry) in es.spec.data.iter().enumerate() {
        fetched.sources += 1;
        let result = fetch_data(sources, entry).await.with_context(|| {
            format!("error processing spec.data[{}] (key: {})", i, entry.secret_key)
        });
        match result {
            Ok(value) => {
                fetched.data.insert(entry.secret_key.clone(), value);
            }
            Err(e) if soft_missing && e.is_not_found() => {
                debug!("{}", e);
                fetched.missing += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(fetched)
}

async fn fetch_data_from(sources: &mut Sources<'_, '_>, entry: &ExternalSecretDataFrom) -> Result<KeyMap> {
    if let Some(source_ref) = &entry.source_ref {
        source_ref.validate()?;
        if let Some(generator_ref) = &source_ref.generator_ref {
            let map = generate(sources, generator_ref).await?;
            return shape_bulk(
                map,
                DecodingStrategy::None,
                ConversionStrategy::Default,
                &entry.rewrite,
            );
        }
    }

    let override_ref = entry.source_ref.as_ref().and_then(|s| s.store_ref.as_ref());
    let stores = stores_for(sources.es, sources.resolved, override_ref)?;

    let mut out = KeyMap::new();
    for store in stores {
        let client = sources
            .manager
            .get(store, Access::Read)
            .await
            .with_context(|| format!("store {}", store.status_key()))?;
        let map = match (&entry.extract, &entry.find) {
            (Some(remote), None) => {
                let map = client.get_secret_map(remote).await?;
                shape_bulk(
                    map,
                    remote.decoding_strategy,
                    remote.conversion_strategy,
                    &entry.rewrite,
                )?
            }
            (None, Some(find)) => {
                let map = client.get_all_secrets(find).await?;
                shape_bulk(map, find.decoding_strategy, find.conversion_strategy, &entry.rewrite)?
            }
            _ => {
                return Err(FerryError::ValidationError(
                    "dataFrom entry must set exactly one of extract, find or sourceRef.generatorRef"
                        .to_string(),
                ))
            }
        };
        out.extend(map);
    }
    Ok(out)
}

async fn fetch_data(sources: &mut Sources<'_, '_>, entry: &ExternalSecretData) -> Result<Vec<u8>> {
    let remote = &entry.remote_ref;

    if let Some(source_ref) = &entry.source_ref {
        source_ref.validate()?;
        if let Some(generator_ref) = &source_ref.generator_ref {
            let map = generate(sources, generator_ref).await?;
            let value = map.get(&remote.key).ok_or_else(|| {
                FerryError::NotFound(format!(
                    "generator {} {:?} produced no key {:?}",
                    generator_ref.kind, generator_ref.name, remote.key
                ))
            })?;
            return decode_value(value, remote.decoding_strategy);
        }
    }

    let override_ref = entry.source_ref.as_ref().and_then(|s| s.store_ref.as_ref());
    let stores = stores_for(sources.es, sources.resolved, override_ref)?;

    let mut value = None;
    for store in stores {
        let client = sources
            .manager
            .get(store, Access::Read)
            .await
            .with_context(|| format!("store {}", store.status_key()))?;
        let raw = client.get_secret(remote).await?;
        value = Some(decode_value(&raw, remote.decoding_strategy)?);
    }
    value.ok_or_else(|| FerryError::ValidationError("no store to read from".to_string()))
}

async fn generate(sources: &mut Sources<'_, '_>, generator_ref: &GeneratorRef) -> Result<KeyMap> {
    let spec = generator_spec(&sources.ctx.client, sources.namespace, generator_ref).await?;
    let (map, state) = sources
        .ctx
        .generators
        .generate(&generator_ref.kind, &spec, sources.namespace)
        .await
        .with_context(|| format!("generator {} {:?}", generator_ref.kind, generator_ref.name))?;
    sources.generated.extend(state);
    Ok(map)
}

/// Stores a source reads from: its own reference, or the resource default.
fn stores_for<'r>(
    es: &ExternalSecret,
    resolved: &'r ResolvedRefs,
    override_ref: Option<&StoreRef>,
) -> Result<&'r [ResolvedStore]> {
    let store_ref = override_ref
        .or(es.spec.secret_store_ref.as_ref())
        .ok_or_else(|| {
            FerryError::ValidationError(
                "no store to read from: set spec.secretStoreRef or a sourceRef".to_string(),
            )
        })?;
    let stores = resolved
        .iter()
        .find(|(r, _)| r == store_ref)
        .map(|(_, stores)| stores.as_slice())
        .unwrap_or_default();
    if stores.is_empty() {
        return Err(FerryError::ValidationError(format!("no stores matched {}", store_ref)));
    }
    Ok(stores)
}

async fn write_target(
    es: &ExternalSecret,
    ctx: &Context,
    namespace: &str,
    live: Option<Secret>,
    rendered: RenderedTemplate,
) -> Result<Option<String>> {
    let target_name = es.target_name();
    match es.spec.target.creation_policy {
        CreationPolicy::None => {
            debug!("creationPolicy None, not writing secret {}/{}", namespace, target_name);
            return Ok(None);
        }
        CreationPolicy::Merge if live.is_none() => {
            return Err(FerryError::ValidationError(format!(
                "target secret {:?} does not exist and creationPolicy is Merge",
                target_name
            )));
        }
        CreationPolicy::Owner => {
            if let Some(owner) = live.as_ref().and_then(|l| foreign_controller(l, es)) {
                return Err(FerryError::ValidationError(format!(
                    "target secret {:?} is already owned by {} {:?}",
                    target_name, owner.kind, owner.name
                )));
            }
        }
        _ => {}
    }

    let desired = desired_secret(es, namespace, rendered)?;
    if let Some(live) = &live {
        if is_up_to_date(live, &desired) {
            debug!("Secret {}/{} is up to date", namespace, target_name);
            return Ok(live.resource_version());
        }
        if live.immutable == Some(true) {
            return Err(FerryError::ValidationError(format!(
                "target secret {:?} is immutable and cannot be updated",
                target_name
            )));
        }
    }

    let written = apply_secret(&ctx.client, namespace, &desired).await?;
    Ok(written.resource_version())
}

fn foreign_controller<'a>(
    live: &'a Secret,
    es: &ExternalSecret,
) -> Option<&'a k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference> {
    live.owner_references()
        .iter()
        .find(|o| o.controller == Some(true) && Some(&o.uid) != es.meta().uid.as_ref())
}

fn is_managed_secret(secret: &Secret) -> bool {
    secret
        .labels()
        .get(labels::MANAGED)
        .is_some_and(|v| v == "true")
}

/// The target secret as keyferry wants it to be.
pub fn desired_secret(es: &ExternalSecret, namespace: &str, rendered: RenderedTemplate) -> Result<Secret> {
    let policy = es.spec.target.creation_policy;
    let mut secret_labels = rendered.labels;
    let mut secret_annotations = rendered.annotations;

    let hash = data_hash(&rendered.data, rendered.type_.as_deref());
    secret_annotations.insert(annotations::DATA_HASH.to_string(), hash);

    let owner_references = match policy {
        CreationPolicy::Owner => Some(vec![es.controller_owner_ref(&()).ok_or_else(|| {
            FerryError::ValidationError("ExternalSecret has no uid yet".to_string())
        })?]),
        _ => None,
    };
    if policy != CreationPolicy::Merge {
        secret_labels.insert(labels::MANAGED.to_string(), "true".to_string());
    }

    let type_ = match policy {
        CreationPolicy::Merge => rendered.type_,
        _ => Some(rendered.type_.unwrap_or_else(|| "Opaque".to_string())),
    };

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(es.target_name()),
            namespace: Some(namespace.to_string()),
            labels: (!secret_labels.is_empty()).then_some(secret_labels),
            annotations: Some(secret_annotations),
            owner_references,
            ..Default::default()
        },
        data: Some(
            rendered
                .data
                .into_iter()
                .map(|(k, v)| (k, ByteString(v)))
                .collect(),
        ),
        type_,
        immutable: es.spec.target.immutable.then_some(true),
        ..Default::default()
    })
}

/// Whether `live` already carries everything in `desired`.
pub fn is_up_to_date(live: &Secret, desired: &Secret) -> bool {
    let hash = |s: &Secret| s.annotations().get(annotations::DATA_HASH).cloned();
    if hash(live).is_none() || hash(live) != hash(desired) {
        return false;
    }

    let live_data = live.data.clone().unwrap_or_default();
    let data_matches = desired
        .data
        .iter()
        .flatten()
        .all(|(k, v)| live_data.get(k) == Some(v));
    let type_matches = desired.type_.is_none() || desired.type_ == live.type_;
    let labels_match = desired
        .labels()
        .iter()
        .all(|(k, v)| live.labels().get(k) == Some(v));
    let annotations_match = desired
        .annotations()
        .iter()
        .all(|(k, v)| live.annotations().get(k) == Some(v));
    let owners_match = desired
        .owner_references()
        .iter()
        .all(|o| live.owner_references().iter().any(|l| l.uid == o.uid));

    data_matches && type_matches && labels_match && annotations_match && owners_match
}

async fn cleanup(es: &ExternalSecret, ctx: &Context) -> Result<Action> {
    let namespace = es.namespace().unwrap_or_default();

    if es.spec.target.deletion_policy == DeletionPolicy::Delete {
        let target_name = es.target_name();
        if let Some(live) = get_secret(&ctx.client, &namespace, &target_name).await? {
            if is_managed_secret(&live) {
                delete_secret(&ctx.client, &namespace, &target_name).await?;
            }
        }
    }

    ctx.backoff.reset(&object_key(es));
    info!("Cleaned up ExternalSecret {}", object_key(es));
    Ok(Action::await_change())
}
