// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Applies a [`Template`] to fetched data, producing the final secret payload.

use crate::error::{FerryError, Result, ResultExt};
use crate::pipeline::template::render;
use crate::types::template::{Template, TemplateMergePolicy, TemplateTarget};
use std::collections::BTreeMap;

/// Precedence class of a template source; later classes override earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceClass {
    Secret,
    ConfigMap,
    Literal,
    Inline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceBody {
    /// Each entry is one template rendered under its own key
    Values(BTreeMap<String, String>),
    /// A template rendering to a YAML map of keys and values
    KeysAndValues(String),
}

/// A template fragment with its content already read from the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSource {
    pub class: SourceClass,
    pub origin: String,
    pub body: SourceBody,
    pub target: TemplateTarget,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedTemplate {
    pub data: BTreeMap<String, Vec<u8>>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub type_: Option<String>,
}

pub fn apply_template(
    template: Option<&Template>,
    sources: Vec<TemplateSource>,
    fetched: BTreeMap<String, Vec<u8>>,
) -> Result<RenderedTemplate> {
    let Some(template) = template else {
        return Ok(RenderedTemplate {
            data: fetched,
            ..Default::default()
        });
    };

    let mut rendered = RenderedTemplate {
        type_: template.type_.clone(),
        ..Default::default()
    };

    for (key, value) in &template.metadata.labels {
        let text = render(value, &fetched).with_context(|| format!("label {:?}", key))?;
        rendered.labels.insert(key.clone(), text);
    }
    for (key, value) in &template.metadata.annotations {
        let text = render(value, &fetched).with_context(|| format!("annotation {:?}", key))?;
        rendered.annotations.insert(key.clone(), text);
    }

    let mut sources = sources;
    if !template.data.is_empty() {
        sources.push(TemplateSource {
            class: SourceClass::Inline,
            origin: "template.data".to_string(),
            body: SourceBody::Values(template.data.clone()),
            target: TemplateTarget::Data,
        });
    }
    sources.sort_by_key(|s| s.class);

    let mut data = BTreeMap::new();
    for source in &sources {
        let entries = render_source(source, &fetched).with_context(|| source.origin.clone())?;
        match source.target {
            TemplateTarget::Data => data.extend(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_bytes())),
            ),
            TemplateTarget::Labels => rendered.labels.extend(entries),
            TemplateTarget::Annotations => rendered.annotations.extend(entries),
        }
    }

    rendered.data = match template.merge_policy {
        TemplateMergePolicy::Replace => data,
        TemplateMergePolicy::Merge => {
            let mut merged = fetched;
            merged.extend(data);
            merged
        }
    };

    Ok(rendered)
}

fn render_source(
    source: &TemplateSource,
    fetched: &BTreeMap<String, Vec<u8>>,
) -> Result<BTreeMap<String, String>> {
    match &source.body {
        SourceBody::Values(entries) => entries
            .iter()
            .map(|(key, tpl)| {
                let text = render(tpl, fetched).with_context(|| format!("key {:?}", key))?;
                Ok((key.clone(), text))
            })
            .collect(),
        SourceBody::KeysAndValues(tpl) => {
            let text = render(tpl, fetched)?;
            let parsed: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(&text)
                .map_err(|e| {
                    FerryError::TemplateError(format!("rendered text is not a YAML map: {}", e))
                })?;
            parsed
                .into_iter()
                .map(|(k, v)| {
                    let text = match v {
                        serde_yaml::Value::String(s) => s,
                        other => serde_yaml::to_string(&other)
                            .map(|s| s.trim_end().to_string())
                            .map_err(|e| FerryError::TemplateError(e.to_string()))?,
                    };
                    Ok((k, text))
                })
                .collect()
        }
    }
}
