// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::config::Config;
use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::constants::API_GROUP;
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Kinds that must be served before the reconcilers start.
pub fn required_kinds(config: &Config) -> Vec<&'static str> {
    let mut kinds = vec!["SecretStore", "ExternalSecret"];
    if config.enable_cluster_stores {
        kinds.push("ClusterSecretStore");
    }
    if config.enable_push_secrets {
        kinds.push("PushSecret");
    }
    kinds
}

/// Wait for the keyferry CRDs to become available in the cluster.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_crds(client: &Client, config: &Config) -> Result<()> {
    let required = required_kinds(config);
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match missing_kinds(client, &required).await {
            Ok(missing) if missing.is_empty() => {
                info!("CRDs of {}/v1 are available", API_GROUP);
                return Ok(());
            }
            Ok(missing) => {
                info!(
                    "CRDs {} of {}/v1 not yet available, waiting {} seconds...",
                    missing.join(", "),
                    API_GROUP,
                    interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for {} CRDs: {}, retrying in {} seconds...",
                    API_GROUP, e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

async fn missing_kinds(client: &Client, required: &[&'static str]) -> Result<Vec<&'static str>> {
    let discovery = Discovery::new(client.clone())
        .filter(&[API_GROUP])
        .run()
        .await?;

    let served: Vec<String> = discovery
        .groups()
        .filter(|group| group.name() == API_GROUP)
        .flat_map(|group| group.recommended_resources())
        .filter(|(ar, _)| ar.version == "v1")
        .map(|(ar, _)| ar.kind)
        .collect();

    Ok(required
        .iter()
        .copied()
        .filter(|kind| !served.iter().any(|s| s == kind))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_kinds_follow_feature_flags() {
        let mut config = Config::default();
        assert_eq!(
            required_kinds(&config),
            vec!["SecretStore", "ExternalSecret", "ClusterSecretStore", "PushSecret"]
        );

        config.enable_cluster_stores = false;
        config.enable_push_secrets = false;
        assert_eq!(required_kinds(&config), vec!["SecretStore", "ExternalSecret"]);
    }
}
