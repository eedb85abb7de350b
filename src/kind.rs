//! Per-kind descriptors driving the generic engine.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;
use crate::identity::composite_id;
use crate::identity::ResourceIdentity;
use crate::identity::Scope;
use crate::schema::FieldTree;
use crate::schema::SchemaViolation;
use crate::state::sparse;
use crate::state::Metadata;
use crate::state::ResourceState;

const ENVELOPE_FIELDS: [&str; 4] = ["apiVersion", "kind", "metadata", "status"];

/// Everything the engine needs to know about one Kubernetes kind.
#[derive(Debug, Clone, PartialEq)]
pub struct KindDescriptor {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub scope: Scope,
    /// Top-level fields besides `apiVersion`, `kind` and `metadata`.
    pub schema: FieldTree,
}

impl KindDescriptor {
    pub fn namespaced(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self::new(group, version, kind, plural, Scope::Namespaced)
    }

    pub fn cluster(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self::new(group, version, kind, plural, Scope::Cluster)
    }

    fn new(group: &str, version: &str, kind: &str, plural: &str, scope: Scope) -> Self {
        Self {
            group: group.to_owned(),
            version: version.to_owned(),
            kind: kind.to_owned(),
            plural: plural.to_owned(),
            scope,
            schema: FieldTree::default(),
        }
    }

    pub fn with_schema(mut self, schema: FieldTree) -> Self {
        self.schema = schema;
        self
    }

    /// Builds the descriptor of one served version of a CRD, reading its OpenAPI schema. A
    /// version without a schema accepts any top-level field besides the envelope.
    pub fn from_crd(crd: &CustomResourceDefinition, version: &str) -> Result<Self> {
        let spec = &crd.spec;
        let scope = match spec.scope.as_str() {
            "Namespaced" => Scope::Namespaced,
            "Cluster" => Scope::Cluster,
            other => return Err(Error::UserInput(format!("Unknown CRD scope {other:?}"))),
        };
        let served = spec
            .versions
            .iter()
            .find(|candidate| candidate.name == version)
            .ok_or_else(|| Error::UserInput(format!("CRD {} does not serve version {version}", spec.names.kind)))?;

        let schema = match served.schema.as_ref().and_then(|schema| schema.open_api_v3_schema.as_ref()) {
            Some(props) => {
                let props = serde_json::to_value(props).map_err(|e| Error::UserInput(e.to_string()))?;
                FieldTree::from_openapi(&props)
                    .map_err(|violation| Error::UserInput(format!("Invalid CRD schema at {violation}")))?
                    .without(&ENVELOPE_FIELDS)
            }
            None => FieldTree::open().without(&ENVELOPE_FIELDS),
        };

        Ok(Self::new(&spec.group, version, &spec.names.kind, &spec.names.plural, scope).with_schema(schema))
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// The provider type name, e.g. `k8s_storage_k8s_io_storage_class_v1`.
    pub fn type_name(&self) -> String {
        let mut name = String::from("k8s_");
        if !self.group.is_empty() {
            name.push_str(&self.group.replace(['.', '-'], "_"));
            name.push('_');
        }
        name.push_str(&snake_case(&self.kind));
        name.push('_');
        name.push_str(&self.version);
        name
    }

    /// Addresses the object named by `metadata`.
    pub fn identity(&self, metadata: &Metadata) -> Result<ResourceIdentity> {
        let name = metadata
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(Error::UnnamedObject)?;

        let namespace = match (self.scope, metadata.namespace.as_deref()) {
            (Scope::Namespaced, Some(namespace)) if !namespace.is_empty() => Some(namespace.to_owned()),
            (Scope::Namespaced, _) => {
                return Err(Error::UserInput(
                    "Expected resource to be namespaced. Can't deploy to an unknown namespace.".to_owned(),
                ))
            }
            (Scope::Cluster, None) => None,
            (Scope::Cluster, Some(_)) => {
                return Err(Error::UserInput(format!(
                    "{} is cluster scoped, metadata.namespace must not be set",
                    self.kind
                )))
            }
        };

        Ok(ResourceIdentity {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
            resource: self.plural.clone(),
            namespace,
            name: name.to_owned(),
        })
    }

    /// Builds the sparse JSON object sent to the API server. Bookkeeping fields are left out.
    pub fn encode(&self, state: &ResourceState) -> Result<Value> {
        let manifest = self.manifest(state)?;
        serde_json::to_value(&manifest).map_err(|e| self.encode_error(e.to_string()))
    }

    /// Applies a server response onto `base`: metadata and fields are replaced by the server's
    /// values, `id` is recomputed and bookkeeping is kept.
    pub fn decode(&self, object: DynamicObject, base: &ResourceState) -> Result<ResourceState> {
        let metadata = Metadata::from(&object.metadata);
        let name = metadata
            .name
            .clone()
            .ok_or_else(|| self.decode_error("object has no metadata.name".to_owned()))?;

        let fields = match object.data {
            Value::Object(data) => self.schema.project(&data).map_err(|violation| self.decode_error(violation.to_string()))?,
            Value::Null => Map::new(),
            other => return Err(self.decode_error(format!("expected an object, found {other}"))),
        };

        let (api_version, kind) = match object.types {
            Some(types) => (types.api_version, types.kind),
            None => (self.api_version(), self.kind.clone()),
        };

        Ok(ResourceState {
            id: Some(composite_id(metadata.namespace.as_deref(), &name)),
            api_version: Some(api_version),
            kind: Some(kind),
            metadata,
            fields,
            ..base.clone()
        })
    }

    pub(crate) fn manifest<'a>(&self, state: &'a ResourceState) -> Result<Manifest<'a>> {
        self.schema
            .check(&state.fields)
            .map_err(|violation: SchemaViolation| Error::InvalidFields {
                kind: self.kind.clone(),
                violation,
            })?;

        let fields = match sparse(Value::Object(state.fields.clone())) {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };

        Ok(Manifest {
            api_version: self.api_version(),
            kind: self.kind.clone(),
            metadata: &state.metadata,
            fields,
        })
    }

    fn encode_error(&self, message: String) -> Error {
        Error::Encode {
            kind: self.kind.clone(),
            message,
        }
    }

    fn decode_error(&self, message: String) -> Error {
        Error::Decode {
            kind: self.kind.clone(),
            message,
        }
    }
}

/// The Kubernetes facing part of a state, in the key order of a hand written manifest.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Manifest<'a> {
    pub api_version: String,
    pub kind: String,
    pub metadata: &'a Metadata,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn snake_case(kind: &str) -> String {
    let chars: Vec<char> = kind.chars().collect();
    let mut snake = String::with_capacity(kind.len() + 4);
    for (index, current) in chars.iter().enumerate() {
        if current.is_uppercase() && index > 0 {
            let previous = chars[index - 1];
            let next_is_lower = chars.get(index + 1).is_some_and(|next| next.is_lowercase());
            if previous.is_lowercase() || previous.is_ascii_digit() || (previous.is_uppercase() && next_is_lower) {
                snake.push('_');
            }
        }
        snake.extend(current.to_lowercase());
    }
    snake
}
