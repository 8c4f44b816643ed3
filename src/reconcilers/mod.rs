// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that react to watch events.

pub mod backoff;
pub mod external_secret;
pub mod push_secret;
pub mod store;

pub use external_secret::ExternalSecretReconciler;
pub use push_secret::PushSecretReconciler;
pub use store::StoreReconciler;

use crate::config::Config;
use crate::error::{FerryError, Result};
use crate::generator::GeneratorRegistry;
use crate::provider::ProviderRegistry;
use backoff::Backoff;
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// State shared by every reconciliation of every kind.
pub struct Context {
    pub client: Client,
    pub config: Config,
    pub providers: Arc<ProviderRegistry>,
    pub generators: Arc<GeneratorRegistry>,
    pub backoff: Backoff,
}

impl Context {
    pub fn new(
        client: Client,
        config: Config,
        providers: Arc<ProviderRegistry>,
        generators: Arc<GeneratorRegistry>,
    ) -> Self {
        let backoff = Backoff::new(config.backoff_base, config.backoff_max);
        Self {
            client,
            config,
            providers,
            generators,
            backoff,
        }
    }
}

/// `namespace/name` of an object, used as backoff and log key.
pub fn object_key<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) => format!("{}/{}", ns, obj.name_any()),
        None => obj.name_any(),
    }
}

/// Requeue after `interval`, or only on change when it is zero.
pub fn requeue_after(interval: Duration) -> Action {
    if interval.is_zero() {
        Action::await_change()
    } else {
        Action::requeue(interval)
    }
}

/// Run one reconciliation attempt under the configured deadline.
pub async fn with_deadline<T>(deadline: Duration, attempt: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(deadline, attempt).await {
        Ok(result) => result,
        Err(_) => Err(FerryError::Transient(format!(
            "reconciliation did not finish within {:?}",
            deadline
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_after_zero_waits_for_change() {
        assert_eq!(requeue_after(Duration::ZERO), Action::await_change());
        assert_eq!(
            requeue_after(Duration::from_secs(60)),
            Action::requeue(Duration::from_secs(60))
        );
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let err = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "reconciliation did not finish within 10ms");
    }
}
