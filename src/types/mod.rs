// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources and the value types they are built from.

pub mod condition;
pub mod duration;
pub mod external_secret;
pub mod push_secret;
pub mod remote;
pub mod rewrite;
pub mod store;
pub mod template;

pub use condition::Condition;
pub use external_secret::ExternalSecret;
pub use push_secret::PushSecret;
pub use store::{ClusterSecretStore, ResolvedStore, SecretStore, StoreKind, StoreRef};
