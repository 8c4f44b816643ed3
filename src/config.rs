// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Stores whose `controller` field is set to anything else are left alone
    pub controller_class: String,
    /// Maximum number of resources reconciled concurrently per kind
    pub worker_concurrency: u16,
    /// Deadline for a single reconciliation attempt
    pub reconcile_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// How often stores are revalidated
    pub store_requeue_interval: Duration,
    pub enable_cluster_stores: bool,
    pub enable_push_secrets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            controller_class: "default".to_string(),
            worker_concurrency: 4,
            reconcile_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            store_requeue_interval: Duration::from_secs(300),
            enable_cluster_stores: true,
            enable_push_secrets: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let controller_class =
            env::var("CONTROLLER_CLASS").unwrap_or(defaults.controller_class);
        let worker_concurrency = env_or("WORKER_CONCURRENCY", defaults.worker_concurrency)?;
        let reconcile_timeout = env_secs("RECONCILE_TIMEOUT_SECS", defaults.reconcile_timeout)?;
        let backoff_base = env_secs("BACKOFF_BASE_SECS", defaults.backoff_base)?;
        let backoff_max = env_secs("BACKOFF_MAX_SECS", defaults.backoff_max)?;
        let store_requeue_interval =
            env_secs("REQUEUE_INTERVAL_SECS", defaults.store_requeue_interval)?;
        let enable_cluster_stores =
            env_or("ENABLE_CLUSTER_STORES", defaults.enable_cluster_stores)?;
        let enable_push_secrets = env_or("ENABLE_PUSH_SECRETS", defaults.enable_push_secrets)?;

        anyhow::ensure!(worker_concurrency > 0, "WORKER_CONCURRENCY must be at least 1");
        anyhow::ensure!(
            backoff_base <= backoff_max,
            "BACKOFF_BASE_SECS must not exceed BACKOFF_MAX_SECS"
        );

        Ok(Config {
            controller_class,
            worker_concurrency,
            reconcile_timeout,
            backoff_base,
            backoff_max,
            store_requeue_interval,
            enable_cluster_stores,
            enable_push_secrets,
        })
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value {:?} for {}", raw, name)),
        Err(_) => Ok(default),
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration> {
    env_or(name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_uses_default_when_unset() {
        let value: u16 = env_or("KEYFERRY_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        env::set_var("KEYFERRY_TEST_GARBAGE", "not-a-number");
        let res: Result<u16> = env_or("KEYFERRY_TEST_GARBAGE", 1);
        assert!(res.is_err());
        env::remove_var("KEYFERRY_TEST_GARBAGE");
    }

    #[test]
    fn test_env_secs_parses_seconds() {
        env::set_var("KEYFERRY_TEST_SECS", "45");
        let value = env_secs("KEYFERRY_TEST_SECS", Duration::from_secs(1)).unwrap();
        assert_eq!(value, Duration::from_secs(45));
        env::remove_var("KEYFERRY_TEST_SECS");
    }
}
