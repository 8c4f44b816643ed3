// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keyferry::config::Config;
use keyferry::generator::GeneratorRegistry;
use keyferry::kubernetes::wait_for_crds;
use keyferry::provider::ProviderRegistry;
use keyferry::reconcilers::{
    Context, ExternalSecretReconciler, PushSecretReconciler, StoreReconciler,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, honouring RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting keyferry operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: controller_class={}, workers={}, cluster_stores={}, push_secrets={}",
        config.controller_class,
        config.worker_concurrency,
        config.enable_cluster_stores,
        config.enable_push_secrets
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for keyferry CRDs to become available...");
    wait_for_crds(&client, &config).await?;

    let providers = Arc::new(ProviderRegistry::with_defaults());
    info!("Providers available: {}", providers.kinds().join(", "));
    let generators = Arc::new(GeneratorRegistry::with_defaults());

    let enable_push_secrets = config.enable_push_secrets;
    let ctx = Arc::new(Context::new(client, config, providers, generators));

    info!("Starting reconcilers...");
    let external_secrets = ExternalSecretReconciler::new(ctx.clone());
    let stores = StoreReconciler::new(ctx.clone());
    let push_secrets = async {
        if enable_push_secrets {
            PushSecretReconciler::new(ctx.clone()).run().await
        } else {
            info!("PushSecret reconciler disabled");
            Ok(())
        }
    };

    tokio::try_join!(external_secrets.run(), stores.run(), push_secrets)?;

    // Reconcilers only return after a shutdown signal
    warn!("All reconcilers stopped");
    Ok(())
}
