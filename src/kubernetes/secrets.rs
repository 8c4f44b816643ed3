// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Secret and ConfigMap access used by both sync directions.

use crate::constants::OPERATOR_NAME;
use crate::error::{FerryError, Result, ResultExt};
use crate::pipeline::render::{SourceBody, SourceClass, TemplateSource};
use crate::types::template::{Template, TemplateRef, TemplateScope, TemplateTarget};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{
    api::{DeleteParams, Patch, PatchParams},
    Api, Client, ResourceExt,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// The secret, or `None` when it does not exist.
pub async fn get_secret(client: &Client, namespace: &str, name: &str) -> Result<Option<Secret>> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    secrets
        .get_opt(name)
        .await
        .map_err(FerryError::from)
        .with_context(|| format!("could not get secret {}/{}", namespace, name))
}

/// Decoded `data` of a secret, with `stringData` laid over it.
pub fn secret_data(secret: &Secret) -> BTreeMap<String, Vec<u8>> {
    let mut data: BTreeMap<String, Vec<u8>> = secret
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), v.0.clone()))
        .collect();
    for (k, v) in secret.string_data.iter().flatten() {
        data.insert(k.clone(), v.clone().into_bytes());
    }
    data
}

/// Create or update `secret` with server-side apply.
#[instrument(skip(client, secret), fields(secret = %secret.name_any()))]
pub async fn apply_secret(client: &Client, namespace: &str, secret: &Secret) -> Result<Secret> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let name = secret.name_any();
    let applied = secrets
        .patch(&name, &PatchParams::apply(OPERATOR_NAME).force(), &Patch::Apply(secret))
        .await
        .map_err(FerryError::from)
        .with_context(|| format!("could not write secret {}/{}", namespace, name))?;
    info!("Applied secret {}/{}", namespace, name);
    Ok(applied)
}

/// Delete a secret; a secret that is already gone is not an error.
pub async fn delete_secret(client: &Client, namespace: &str, name: &str) -> Result<()> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    match secrets.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!("Deleted secret {}/{}", namespace, name);
            Ok(())
        }
        Err(kube::Error::Api(resp)) if resp.code == 404 => {
            debug!("Secret {}/{} already deleted", namespace, name);
            Ok(())
        }
        Err(e) => Err(FerryError::from(e))
            .with_context(|| format!("could not delete secret {}/{}", namespace, name)),
    }
}

/// Read every `templateFrom` entry of `template` into render sources.
pub async fn resolve_template_sources(
    client: &Client,
    namespace: &str,
    template: &Template,
) -> Result<Vec<TemplateSource>> {
    let mut sources = Vec::new();

    for (i, from) in template.template_from.iter().enumerate() {
        let origin = format!("templateFrom[{}]", i);

        if let Some(cm_ref) = &from.config_map {
            let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
            let cm = configmaps
                .get(&cm_ref.name)
                .await
                .map_err(FerryError::from)
                .with_context(|| format!("{}: could not get configmap {:?}", origin, cm_ref.name))?;
            let values: BTreeMap<String, String> = cm.data.unwrap_or_default();
            sources.extend(
                item_sources(SourceClass::ConfigMap, &origin, cm_ref, &values, from.target)
                    .context(origin.clone())?,
            );
        }

        if let Some(secret_ref) = &from.secret {
            let secret = get_secret(client, namespace, &secret_ref.name)
                .await
                .context(origin.clone())?
                .ok_or_else(|| {
                    FerryError::NotFound(format!("secret {:?} not found", secret_ref.name))
                        .context(origin.clone())
                })?;
            let values = secret_data(&secret)
                .into_iter()
                .map(|(k, v)| {
                    String::from_utf8(v)
                        .map(|text| (k.clone(), text))
                        .map_err(|_| {
                            FerryError::TemplateError(format!(
                                "{}: value of key {:?} in secret {:?} is not valid UTF-8",
                                origin, k, secret_ref.name
                            ))
                        })
                })
                .collect::<Result<BTreeMap<_, _>>>()?;
            sources.extend(
                item_sources(SourceClass::Secret, &origin, secret_ref, &values, from.target)
                    .context(origin.clone())?,
            );
        }

        if let Some(literal) = &from.literal {
            sources.push(TemplateSource {
                class: SourceClass::Literal,
                origin: format!("{}.literal", origin),
                body: SourceBody::KeysAndValues(literal.clone()),
                target: from.target,
            });
        }
    }

    Ok(sources)
}

fn item_sources(
    class: SourceClass,
    origin: &str,
    tpl_ref: &TemplateRef,
    values: &BTreeMap<String, String>,
    target: TemplateTarget,
) -> Result<Vec<TemplateSource>> {
    // Without items every key is a single-value template
    if tpl_ref.items.is_empty() {
        return Ok(vec![TemplateSource {
            class,
            origin: format!("{} {:?}", origin, tpl_ref.name),
            body: SourceBody::Values(values.clone()),
            target,
        }]);
    }

    tpl_ref
        .items
        .iter()
        .map(|item| {
            let text = values.get(&item.key).ok_or_else(|| {
                FerryError::NotFound(format!("key {:?} not found in {:?}", item.key, tpl_ref.name))
            })?;
            let body = match item.template_as {
                TemplateScope::Values => {
                    SourceBody::Values(BTreeMap::from([(item.key.clone(), text.clone())]))
                }
                TemplateScope::KeysAndValues => SourceBody::KeysAndValues(text.clone()),
            };
            Ok(TemplateSource {
                class,
                origin: format!("{} {:?} key {:?}", origin, tpl_ref.name, item.key),
                body,
                target,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{secret_json, MockService};
    use crate::types::template::{TemplateFrom, TemplateRefItem};
    use k8s_openapi::ByteString;

    #[test]
    fn test_secret_data_prefers_string_data() {
        let secret = Secret {
            data: Some(BTreeMap::from([
                ("a".to_string(), ByteString(b"1".to_vec())),
                ("b".to_string(), ByteString(b"2".to_vec())),
            ])),
            string_data: Some(BTreeMap::from([("b".to_string(), "override".to_string())])),
            ..Default::default()
        };

        let data = secret_data(&secret);
        assert_eq!(data["a"], b"1".to_vec());
        assert_eq!(data["b"], b"override".to_vec());
    }

    #[tokio::test]
    async fn test_get_missing_secret_is_none() {
        let client = MockService::new().into_client();
        assert!(get_secret(&client, "apps", "gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_secret_succeeds() {
        let client = MockService::new().into_client();
        delete_secret(&client, "apps", "gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_template_sources() {
        let configmap = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "tpl", "namespace": "apps"},
            "data": {"config.yaml": "user: {{ .user }}", "labels": "team: core"}
        })
        .to_string();
        let mock = MockService::new()
            .on_get("/api/v1/namespaces/apps/configmaps/tpl", 200, &configmap)
            .on_get(
                "/api/v1/namespaces/apps/secrets/tpl-secret",
                200,
                &secret_json("apps", "tpl-secret", &[("dsn", "db://{{ .user }}")]),
            );
        let client = mock.into_client();

        let template = Template {
            template_from: vec![
                TemplateFrom {
                    config_map: Some(TemplateRef {
                        name: "tpl".to_string(),
                        items: vec![
                            TemplateRefItem {
                                key: "config.yaml".to_string(),
                                template_as: TemplateScope::Values,
                            },
                            TemplateRefItem {
                                key: "labels".to_string(),
                                template_as: TemplateScope::KeysAndValues,
                            },
                        ],
                    }),
                    ..Default::default()
                },
                TemplateFrom {
                    secret: Some(TemplateRef {
                        name: "tpl-secret".to_string(),
                        items: vec![],
                    }),
                    ..Default::default()
                },
                TemplateFrom {
                    literal: Some("extra: x".to_string()),
                    target: TemplateTarget::Annotations,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let sources = resolve_template_sources(&client, "apps", &template).await.unwrap();

        assert_eq!(sources.len(), 4);
        assert_eq!(sources[0].class, SourceClass::ConfigMap);
        assert_eq!(
            sources[0].body,
            SourceBody::Values(BTreeMap::from([(
                "config.yaml".to_string(),
                "user: {{ .user }}".to_string()
            )]))
        );
        assert_eq!(sources[1].body, SourceBody::KeysAndValues("team: core".to_string()));
        assert_eq!(sources[2].class, SourceClass::Secret);
        assert_eq!(sources[3].class, SourceClass::Literal);
        assert_eq!(sources[3].target, TemplateTarget::Annotations);
    }

    #[tokio::test]
    async fn test_missing_template_item_is_reported() {
        let configmap = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "tpl", "namespace": "apps"},
            "data": {}
        })
        .to_string();
        let client = MockService::new()
            .on_get("/api/v1/namespaces/apps/configmaps/tpl", 200, &configmap)
            .into_client();
        let template = Template {
            template_from: vec![TemplateFrom {
                config_map: Some(TemplateRef {
                    name: "tpl".to_string(),
                    items: vec![TemplateRefItem {
                        key: "missing".to_string(),
                        template_as: TemplateScope::Values,
                    }],
                }),
                ..Default::default()
            }],
            ..Default::default()
        };

        let err = resolve_template_sources(&client, "apps", &template)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "templateFrom[0]: key \"missing\" not found in \"tpl\""
        );
    }
}
