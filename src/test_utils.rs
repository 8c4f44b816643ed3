// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses and store backends.

use crate::error::{FerryError, Result};
use crate::provider::registry::Capabilities;
use crate::provider::{ClientContext, Provider, SecretsClient, ValidationResult};
use crate::types::push_secret::{PushRemoteRef, PushSecretData};
use crate::types::remote::{FindSpec, RemoteRef};
use crate::types::store::{ResolvedStore, SecretStoreSpec, StoreKind};
use async_trait::async_trait;
use http::{Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// A request seen by [`MockService`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    /// Add a response for GET requests matching the path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_with(&self, method: &str, path_suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path.ends_with(path_suffix))
            .collect()
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Longest registered prefix wins
        responses
            .iter()
            .filter(|((m, p), _)| m == method && path.starts_with(p.as_str()))
            .max_by_key(|((_, p), _)| p.len())
            .map(|(_, resp)| resp.clone())
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let response = self.find_response(&method, &path);
        let requests = self.requests.clone();

        Box::pin(async move {
            let body = req.into_body().collect().await?.to_bytes();
            requests.lock().unwrap().push(RecordedRequest {
                method,
                path,
                body: String::from_utf8_lossy(&body).into_owned(),
            });

            let (status, body) = response.unwrap_or_else(|| (404, not_found_json("resource", "unknown")));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a mock namespace JSON response
pub fn namespace_json(name: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "uid": "test-uid"
        }
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

/// Secret JSON with string values encoded as base64 data.
pub fn secret_json(namespace: &str, name: &str, data: &[(&str, &str)]) -> String {
    use base64::Engine;
    let data: serde_json::Map<String, serde_json::Value> = data
        .iter()
        .map(|(k, v)| {
            (
                k.to_string(),
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(v)),
            )
        })
        .collect();
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("uid-{}", name),
            "resourceVersion": "1",
        },
        "type": "Opaque",
        "data": data,
    })
    .to_string()
}

/// Store JSON for `kind`; `controller` empty means no controller class.
pub fn store_json(
    kind: StoreKind,
    namespace: &str,
    name: &str,
    controller: &str,
    provider: serde_json::Value,
) -> String {
    let mut metadata =
        serde_json::json!({"name": name, "uid": format!("uid-{}", name), "generation": 1});
    if kind == StoreKind::SecretStore {
        metadata["namespace"] = serde_json::json!(namespace);
    }
    let mut spec = serde_json::json!({"provider": provider});
    if !controller.is_empty() {
        spec["controller"] = serde_json::json!(controller);
    }
    serde_json::json!({
        "apiVersion": "keyferry.geeko.me/v1",
        "kind": kind.as_str(),
        "metadata": metadata,
        "spec": spec,
    })
    .to_string()
}

pub fn store_path(kind: StoreKind, namespace: &str, name: &str) -> String {
    match kind {
        StoreKind::SecretStore => format!(
            "/apis/keyferry.geeko.me/v1/namespaces/{}/secretstores/{}",
            namespace, name
        ),
        StoreKind::ClusterSecretStore => {
            format!("/apis/keyferry.geeko.me/v1/clustersecretstores/{}", name)
        }
    }
}

pub fn fake_store(kind: StoreKind, name: &str, config: serde_json::Value) -> ResolvedStore {
    ResolvedStore {
        kind,
        name: name.to_string(),
        namespace: (kind == StoreKind::SecretStore).then(|| "apps".to_string()),
        labels: BTreeMap::new(),
        generation: Some(1),
        spec: SecretStoreSpec {
            provider: BTreeMap::from([("fake".to_string(), config)]),
            ..Default::default()
        },
    }
}

/// Calls and injected failures of a [`RecordingClient`].
#[derive(Debug, Default)]
pub struct RecordingState {
    pub values: BTreeMap<String, Vec<u8>>,
    pub pushes: Vec<(String, Vec<u8>)>,
    pub deletes: Vec<String>,
    pub exists_checks: Vec<String>,
    pub closed: usize,
    pub push_error: Option<String>,
    pub delete_error: Option<String>,
    pub exists_error: Option<String>,
    /// Delay applied to every read and write
    pub latency: Option<Duration>,
}

/// A store client recording every call, keyed by remote status key.
#[derive(Clone, Default)]
pub struct RecordingClient {
    pub state: Arc<Mutex<RecordingState>>,
}

impl RecordingClient {
    pub fn with<R>(&self, f: impl FnOnce(&mut RecordingState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn pushes(&self) -> Vec<(String, Vec<u8>)> {
        self.with(|s| s.pushes.clone())
    }

    pub fn deletes(&self) -> Vec<String> {
        self.with(|s| s.deletes.clone())
    }

    pub fn closed(&self) -> usize {
        self.with(|s| s.closed)
    }

    async fn delay(&self) {
        if let Some(latency) = self.with(|s| s.latency) {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SecretsClient for RecordingClient {
    async fn get_secret(&self, remote: &RemoteRef) -> Result<Vec<u8>> {
        self.delay().await;
        self.with(|s| s.values.get(&remote.key).cloned())
            .ok_or_else(|| FerryError::NotFound(format!("secret {:?} not found", remote.key)))
    }

    async fn get_secret_map(&self, remote: &RemoteRef) -> Result<BTreeMap<String, Vec<u8>>> {
        let raw = self.get_secret(remote).await?;
        crate::pipeline::property::extract_map(&raw, remote.property.as_deref())
    }

    async fn get_all_secrets(&self, _find: &FindSpec) -> Result<BTreeMap<String, Vec<u8>>> {
        Ok(self.with(|s| s.values.clone()))
    }

    async fn push_secret(&self, value: &[u8], data: &PushSecretData) -> Result<()> {
        self.delay().await;
        let key = data.matcher.remote_ref.status_key();
        self.with(|s| {
            if let Some(msg) = &s.push_error {
                return Err(FerryError::Transient(msg.clone()));
            }
            s.pushes.push((key.clone(), value.to_vec()));
            s.values.insert(key, value.to_vec());
            Ok(())
        })
    }

    async fn delete_secret(&self, remote: &PushRemoteRef) -> Result<()> {
        let key = remote.status_key();
        self.with(|s| {
            if let Some(msg) = &s.delete_error {
                return Err(FerryError::Transient(msg.clone()));
            }
            s.deletes.push(key.clone());
            s.values.remove(&key);
            Ok(())
        })
    }

    async fn secret_exists(&self, remote: &PushRemoteRef) -> Result<bool> {
        let key = remote.status_key();
        self.with(|s| {
            s.exists_checks.push(key.clone());
            match &s.exists_error {
                Some(msg) => Err(FerryError::Transient(msg.clone())),
                None => Ok(s.values.contains_key(&key)),
            }
        })
    }

    async fn validate(&self) -> Result<ValidationResult> {
        Ok(ValidationResult::Ready)
    }

    async fn close(&self) -> Result<()> {
        self.with(|s| s.closed += 1);
        Ok(())
    }
}

/// Provider handing out one [`RecordingClient`] per store name.
#[derive(Default)]
pub struct RecordingProvider {
    clients: Mutex<HashMap<String, RecordingClient>>,
    failing: Mutex<HashMap<String, String>>,
}

impl RecordingProvider {
    pub fn client(&self, store_name: &str) -> RecordingClient {
        self.clients
            .lock()
            .unwrap()
            .entry(store_name.to_string())
            .or_default()
            .clone()
    }

    /// Make `new_client` fail for `store_name`.
    pub fn fail_client(&self, store_name: &str, msg: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(store_name.to_string(), msg.to_string());
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ReadWrite
    }

    fn validate_store(&self, _config: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn new_client(
        &self,
        _config: &serde_json::Value,
        ctx: &ClientContext,
    ) -> Result<Box<dyn SecretsClient>> {
        if let Some(msg) = self.failing.lock().unwrap().get(&ctx.store_name) {
            return Err(FerryError::AuthError(msg.clone()));
        }
        Ok(Box::new(self.client(&ctx.store_name)))
    }
}
