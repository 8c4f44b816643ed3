// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{FerryError, Result};
use crate::provider::fake::FakeProvider;
use crate::provider::Provider;
use crate::types::store::SecretStoreSpec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capabilities {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Capabilities {
    pub fn can_read(&self) -> bool {
        matches!(self, Capabilities::ReadOnly | Capabilities::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Capabilities::WriteOnly | Capabilities::ReadWrite)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capabilities::ReadOnly => "ReadOnly",
            Capabilities::WriteOnly => "WriteOnly",
            Capabilities::ReadWrite => "ReadWrite",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceStatus {
    Maintained,
    NotMaintained,
}

/// Direction a client is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A provider looked up for one store.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub kind: String,
    pub provider: Arc<dyn Provider>,
    pub maintenance: MaintenanceStatus,
    pub config: serde_json::Value,
}

impl ResolvedProvider {
    pub fn check_access(&self, access: Access) -> Result<()> {
        let caps = self.provider.capabilities();
        match access {
            Access::Read if !caps.can_read() => Err(FerryError::ValidationError(format!(
                "provider {} is write only and cannot be read from",
                self.kind
            ))),
            Access::Write if !caps.can_write() => Err(FerryError::ValidationError(format!(
                "provider {} is read only and cannot be pushed to",
                self.kind
            ))),
            _ => Ok(()),
        }
    }
}

struct Registration {
    provider: Arc<dyn Provider>,
    maintenance: MaintenanceStatus,
}

/// Provider constructors keyed by the provider kind used in store specs.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Registration>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the in-tree providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "fake",
            Arc::new(FakeProvider::default()),
            MaintenanceStatus::Maintained,
        );
        registry
    }

    pub fn register(
        &mut self,
        kind: &str,
        provider: Arc<dyn Provider>,
        maintenance: MaintenanceStatus,
    ) {
        let previous = self.providers.insert(
            kind.to_string(),
            Registration {
                provider,
                maintenance,
            },
        );
        if previous.is_some() {
            warn!("Provider {} registered twice, replacing the earlier registration", kind);
        } else {
            info!("Registered provider {}", kind);
        }
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Find the provider for the single entry under `spec.provider`.
    pub fn resolve(&self, spec: &SecretStoreSpec) -> Result<ResolvedProvider> {
        let mut entries = spec.provider.iter();
        let (kind, config) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(FerryError::ValidationError(format!(
                    "store must configure exactly one provider, found {}",
                    spec.provider.len()
                )))
            }
        };

        let registration = self.providers.get(kind).ok_or_else(|| {
            FerryError::ValidationError(format!("no provider registered for kind {:?}", kind))
        })?;

        Ok(ResolvedProvider {
            kind: kind.clone(),
            provider: registration.provider.clone(),
            maintenance: registration.maintenance,
            config: config.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec(providers: &[&str]) -> SecretStoreSpec {
        SecretStoreSpec {
            provider: providers
                .iter()
                .map(|p| (p.to_string(), serde_json::json!({})))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_fake() {
        let registry = ProviderRegistry::with_defaults();
        let resolved = registry.resolve(&spec(&["fake"])).unwrap();

        assert_eq!(resolved.kind, "fake");
        assert_eq!(resolved.maintenance, MaintenanceStatus::Maintained);
        assert!(resolved.check_access(Access::Read).is_ok());
        assert!(resolved.check_access(Access::Write).is_ok());
    }

    #[test]
    fn test_resolve_requires_exactly_one_provider() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.resolve(&spec(&[])).is_err());
        assert!(registry.resolve(&spec(&["fake", "vault"])).is_err());
    }

    #[test]
    fn test_resolve_unknown_kind() {
        let registry = ProviderRegistry::with_defaults();
        match registry.resolve(&spec(&["vault"])) {
            Err(err) => assert_eq!(err.to_string(), "no provider registered for kind \"vault\""),
            Ok(resolved) => panic!("resolved unknown kind to {}", resolved.kind),
        }
    }

    #[test]
    fn test_register_twice_replaces() {
        let mut registry = ProviderRegistry::new();
        registry.register("fake", Arc::new(FakeProvider::default()), MaintenanceStatus::Maintained);
        registry.register(
            "fake",
            Arc::new(FakeProvider::default()),
            MaintenanceStatus::NotMaintained,
        );

        assert_eq!(registry.kinds(), vec!["fake"]);
        let resolved = registry.resolve(&spec(&["fake"])).unwrap();
        assert_eq!(resolved.maintenance, MaintenanceStatus::NotMaintained);
    }

    #[test]
    fn test_capabilities() {
        assert!(Capabilities::ReadOnly.can_read());
        assert!(!Capabilities::ReadOnly.can_write());
        assert!(!Capabilities::WriteOnly.can_read());
        assert_eq!(Capabilities::ReadWrite.to_string(), "ReadWrite");
    }
}
