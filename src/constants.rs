// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// API group of every resource served by keyferry
pub const API_GROUP: &str = "keyferry.geeko.me";

/// The operator name used for server-side apply
pub const OPERATOR_NAME: &str = "keyferry";

/// Kubernetes annotation keys written by keyferry
pub mod annotations {
    /// SHA-256 of the data last written to a target secret
    pub const DATA_HASH: &str = "keyferry.geeko.me/data-hash";
    /// Prefix shared by every keyferry annotation
    pub const PREFIX: &str = "keyferry.geeko.me/";
}

/// Kubernetes label keys written by keyferry
pub mod labels {
    /// Set to "true" on target secrets keyferry created
    pub const MANAGED: &str = "keyferry.geeko.me/managed";
}

pub mod finalizers {
    pub const EXTERNAL_SECRET: &str = "keyferry.geeko.me/externalsecret-cleanup";
    pub const PUSH_SECRET: &str = "keyferry.geeko.me/pushsecret-cleanup";
}

/// Condition types and reasons
pub mod conditions {
    pub const READY: &str = "Ready";

    pub const REASON_SYNCED: &str = "Synced";
    pub const REASON_ERRORED: &str = "Errored";
    pub const REASON_DELETED: &str = "Deleted";
    pub const REASON_VALIDATED: &str = "Valid";
    pub const REASON_INVALID: &str = "InvalidProviderConfig";
    pub const REASON_VALIDATION_FAILED: &str = "ValidationFailed";
    pub const REASON_VALIDATION_UNKNOWN: &str = "ValidationUnknown";
}

pub mod defaults {
    pub const REFRESH_INTERVAL: &str = "1h";
    pub const PASSWORD_LENGTH: usize = 24;
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRDs
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
