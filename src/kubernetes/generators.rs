// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Generator objects are read as dynamic objects; only their `spec` matters.

use crate::error::{FerryError, Result, ResultExt};
use crate::types::remote::GeneratorRef;
use kube::{
    api::ApiResource,
    core::{DynamicObject, GroupVersionKind},
    Api, Client,
};

/// Split `group/version` (or a bare core `version`) into its parts.
fn parse_api_version(api_version: &str) -> Result<(&str, &str)> {
    match api_version.split_once('/') {
        Some((group, version)) if !group.is_empty() && !version.is_empty() => Ok((group, version)),
        None if !api_version.is_empty() => Ok(("", api_version)),
        _ => Err(FerryError::ValidationError(format!(
            "invalid generator apiVersion {:?}",
            api_version
        ))),
    }
}

/// The `spec` of the generator object `generator_ref` in `namespace`.
pub async fn generator_spec(
    client: &Client,
    namespace: &str,
    generator_ref: &GeneratorRef,
) -> Result<serde_json::Value> {
    let (group, version) = parse_api_version(&generator_ref.api_version)?;
    let gvk = GroupVersionKind::gvk(group, version, &generator_ref.kind);
    let ar = ApiResource::from_gvk(&gvk);
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);

    let object = api
        .get(&generator_ref.name)
        .await
        .map_err(FerryError::from)
        .with_context(|| {
            format!(
                "could not get generator {} {:?}",
                generator_ref.kind, generator_ref.name
            )
        })?;

    Ok(object
        .data
        .get("spec")
        .cloned()
        .unwrap_or(serde_json::Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GENERATOR_API_VERSION;
    use crate::test_utils::MockService;

    #[test]
    fn test_parse_api_version() {
        assert_eq!(
            parse_api_version("generators.keyferry.geeko.me/v1alpha1").unwrap(),
            ("generators.keyferry.geeko.me", "v1alpha1")
        );
        assert_eq!(parse_api_version("v1").unwrap(), ("", "v1"));
        assert!(parse_api_version("").is_err());
        assert!(parse_api_version("group/").is_err());
    }

    #[tokio::test]
    async fn test_generator_spec() {
        let body = serde_json::json!({
            "apiVersion": GENERATOR_API_VERSION,
            "kind": "Password",
            "metadata": {"name": "db-password", "namespace": "apps"},
            "spec": {"length": 32}
        })
        .to_string();
        let client = MockService::new()
            .on_get(
                "/apis/generators.keyferry.geeko.me/v1alpha1/namespaces/apps/passwords/db-password",
                200,
                &body,
            )
            .into_client();
        let generator_ref = GeneratorRef {
            api_version: GENERATOR_API_VERSION.to_string(),
            kind: "Password".to_string(),
            name: "db-password".to_string(),
        };

        let spec = generator_spec(&client, "apps", &generator_ref).await.unwrap();
        assert_eq!(spec, serde_json::json!({"length": 32}));
    }

    #[tokio::test]
    async fn test_missing_generator() {
        let client = MockService::new().into_client();
        let generator_ref = GeneratorRef {
            api_version: GENERATOR_API_VERSION.to_string(),
            kind: "UUID".to_string(),
            name: "id".to_string(),
        };

        let err = generator_spec(&client, "apps", &generator_ref).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("could not get generator UUID \"id\""));
    }
}
