// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rewrite rules applied to keys fetched by a `dataFrom` entry.

use crate::error::{FerryError, Result};
use serde::{Deserialize, Serialize};

/// One rewrite step. Exactly one of the fields must be set.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub struct Rewrite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<RewriteRegexp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<RewriteMerge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<RewriteTransform>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub struct RewriteRegexp {
    pub source: String,
    pub target: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RewriteMerge {
    /// Key receiving the merged value; required by the `JSON` and `Append` strategies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub into: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priority: Vec<String>,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default)]
    pub strategy: MergeStrategy,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum ConflictPolicy {
    #[default]
    Error,
    Ignore,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum MergeStrategy {
    #[default]
    Extract,
    #[serde(rename = "JSON")]
    Json,
    Append,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub struct RewriteTransform {
    pub template: String,
}

/// Borrowed view of the single operation a [`Rewrite`] carries.
#[derive(Debug, Clone, Copy)]
pub enum RewriteOp<'a> {
    Regexp(&'a RewriteRegexp),
    Merge(&'a RewriteMerge),
    Transform(&'a RewriteTransform),
}

impl Rewrite {
    pub fn operation(&self) -> Result<RewriteOp<'_>> {
        match (&self.regexp, &self.merge, &self.transform) {
            (Some(r), None, None) => Ok(RewriteOp::Regexp(r)),
            (None, Some(m), None) => Ok(RewriteOp::Merge(m)),
            (None, None, Some(t)) => Ok(RewriteOp::Transform(t)),
            (None, None, None) => Err(FerryError::ValidationError(
                "rewrite must set one of regexp, merge or transform".to_string(),
            )),
            _ => Err(FerryError::ValidationError(
                "rewrite must set only one of regexp, merge or transform".to_string(),
            )),
        }
    }
}
