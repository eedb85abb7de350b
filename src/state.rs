//! The per-request state of one managed object.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;
use crate::wait::WaitCondition;

/// The part of `metadata` a caller declares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl From<&ObjectMeta> for Metadata {
    fn from(meta: &ObjectMeta) -> Self {
        Self {
            name: meta.name.clone(),
            namespace: meta.namespace.clone(),
            labels: meta.labels.clone(),
            annotations: meta.annotations.clone(),
        }
    }
}

/// Declared configuration or persisted state of one object, plus provider-only bookkeeping.
///
/// `fields` holds every top-level field besides `apiVersion`, `kind` and `metadata`, usually
/// just `spec`. `id`, `force_conflicts`, `field_manager`, `wait_for` and `yaml` never reach
/// the API server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: Option<String>,
    pub api_version: Option<String>,
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub force_conflicts: Option<bool>,
    pub field_manager: Option<String>,
    #[serde(default)]
    pub wait_for: Vec<WaitCondition>,
    pub yaml: Option<String>,
}

impl ResourceState {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            metadata: Metadata {
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metadata.namespace = Some(namespace.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Replaces `fields` with the serialized form of a typed model of the kind's fields.
    pub fn with_fields<T: Serialize>(mut self, fields: &T) -> Result<Self> {
        let encode_error = |message: String| Error::Encode {
            kind: std::any::type_name::<T>().to_owned(),
            message,
        };
        match serde_json::to_value(fields).map_err(|e| encode_error(e.to_string()))? {
            Value::Object(fields) => {
                self.fields = fields;
                Ok(self)
            }
            other => Err(encode_error(format!("expected an object, found {other}"))),
        }
    }

    /// Reads `fields` back into a typed model.
    pub fn fields_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| Error::Decode {
            kind: std::any::type_name::<T>().to_owned(),
            message: e.to_string(),
        })
    }

    pub fn with_wait_for(mut self, condition: WaitCondition) -> Self {
        self.wait_for.push(condition);
        self
    }

    pub fn try_name(&self) -> Result<&str> {
        self.metadata
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(Error::UnnamedObject)
    }
}

/// Removes null members from objects, recursively.
pub(crate) fn sparse(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key, sparse(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sparse).collect()),
        other => other,
    }
}
