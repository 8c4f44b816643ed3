// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, store resolution, secrets and status writes.

pub mod crd;
pub mod generators;
pub mod namespaces;
pub mod secrets;
pub mod status;
pub mod stores;

pub use crd::wait_for_crds;
pub use generators::generator_spec;
pub use namespaces::namespace_labels;
pub use status::apply_status;
pub use stores::resolve_store_ref;
