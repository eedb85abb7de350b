//! Declarative field trees describing the top-level fields of a kind.
//!
//! A [`FieldTree`] is what replaces one generated struct per CRD: the engine checks desired
//! documents against it before they are sent and projects server responses onto it so only
//! the fields the kind declares end up in state.
//!
//! Trees are built by hand, derived from a Rust type implementing [`JsonSchema`] with
//! [`FieldTree::of`], or read from a CRD's `openAPIV3Schema` with [`FieldTree::from_openapi`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use schemars::schema::InstanceType;
use schemars::schema::RootSchema;
use schemars::schema::Schema;
use schemars::schema::SchemaObject;
use schemars::schema::SingleOrVec;
use schemars::JsonSchema;
use serde_json::Map;
use serde_json::Value;

const INT_OR_STRING: &str = "x-kubernetes-int-or-string";
const PRESERVE_UNKNOWN_FIELDS: &str = "x-kubernetes-preserve-unknown-fields";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// `intstr.IntOrString`, e.g. ports and percentages.
    IntOrString,
    Object(FieldTree),
    List(Box<FieldType>),
    Map(Box<FieldType>),
    /// Free-form value, kept as is.
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub ty: FieldType,
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTree {
    fields: BTreeMap<String, Field>,
    /// Undeclared fields are accepted as free-form values.
    open: bool,
    /// Fields removed with [`FieldTree::without`]; never accepted, even by an open tree.
    excluded: BTreeSet<String>,
}

/// A document did not match its [`FieldTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for SchemaViolation {}

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree accepting any field, for kinds whose schema is unknown. Declared fields are still
    /// checked.
    pub fn open() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    /// Adds an optional field.
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), Field { ty, required: false });
        self
    }

    /// Adds a required field.
    pub fn required(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), Field { ty, required: true });
        self
    }

    /// Removes the named fields, e.g. `status` from a CRD schema.
    pub fn without(mut self, names: &[&str]) -> Self {
        for name in names {
            self.fields.remove(*name);
            self.excluded.insert((*name).to_owned());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Derives the tree from the JSON schema of `T`, honouring its serde renames.
    pub fn of<T: JsonSchema>() -> Self {
        Self::from_root_schema(&schemars::schema_for!(T))
    }

    pub fn from_root_schema(root: &RootSchema) -> Self {
        let mut converter = Converter {
            definitions: &root.definitions,
            stack: Vec::new(),
        };
        match converter.object_type(&root.schema) {
            FieldType::Object(tree) => tree,
            _ => Self::default(),
        }
    }

    /// Reads an OpenAPI v3 schema as found in a CRD version's `schema.openAPIV3Schema`.
    pub fn from_openapi(schema: &Value) -> Result<Self, SchemaViolation> {
        let schema: SchemaObject = serde_json::from_value(schema.clone()).map_err(|e| SchemaViolation {
            path: "openAPIV3Schema".to_owned(),
            message: e.to_string(),
        })?;
        let definitions = schemars::Map::new();
        let mut converter = Converter {
            definitions: &definitions,
            stack: Vec::new(),
        };
        match converter.object_type(&schema) {
            FieldType::Object(tree) => Ok(tree),
            FieldType::Any if flag(&schema, PRESERVE_UNKNOWN_FIELDS) => Ok(Self::open()),
            _ => Err(SchemaViolation {
                path: "openAPIV3Schema".to_owned(),
                message: "expected an object schema with properties".to_owned(),
            }),
        }
    }

    /// Verifies that `document` only uses declared fields with the declared types and sets
    /// every required field. Null values count as unset.
    pub fn check(&self, document: &Map<String, Value>) -> Result<(), SchemaViolation> {
        self.check_at(document, "")
    }

    /// Keeps only the declared fields of `document`, dropping nulls and anything the tree
    /// does not know about.
    pub fn project(&self, document: &Map<String, Value>) -> Result<Map<String, Value>, SchemaViolation> {
        self.project_at(document, "")
    }

    fn check_at(&self, document: &Map<String, Value>, prefix: &str) -> Result<(), SchemaViolation> {
        for (name, value) in document {
            let path = join(prefix, name);
            let field = match self.fields.get(name) {
                Some(field) => field,
                None if self.accepts_undeclared(name) => continue,
                None => {
                    return Err(SchemaViolation {
                        path,
                        message: "unknown field".to_owned(),
                    })
                }
            };
            if !value.is_null() {
                field.ty.check(value, &path)?;
            }
        }

        for (name, field) in &self.fields {
            let unset = document.get(name).map_or(true, Value::is_null);
            if field.required && unset {
                return Err(SchemaViolation {
                    path: join(prefix, name),
                    message: "required field is not set".to_owned(),
                });
            }
        }

        Ok(())
    }

    fn project_at(&self, document: &Map<String, Value>, prefix: &str) -> Result<Map<String, Value>, SchemaViolation> {
        let mut projected = Map::new();
        for (name, value) in document {
            if value.is_null() {
                continue;
            }
            match self.fields.get(name) {
                Some(field) => {
                    let path = join(prefix, name);
                    projected.insert(name.clone(), field.ty.project(value, &path)?);
                }
                None if self.accepts_undeclared(name) => {
                    projected.insert(name.clone(), value.clone());
                }
                None => {}
            }
        }
        Ok(projected)
    }

    fn accepts_undeclared(&self, name: &str) -> bool {
        self.open && !self.excluded.contains(name)
    }
}

impl FieldType {
    pub fn list(item: FieldType) -> Self {
        FieldType::List(Box::new(item))
    }

    pub fn map(value: FieldType) -> Self {
        FieldType::Map(Box::new(value))
    }

    fn check(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        match (self, value) {
            (FieldType::Object(tree), Value::Object(document)) => tree.check_at(document, path),
            (FieldType::List(item), Value::Array(items)) => items
                .iter()
                .enumerate()
                .try_for_each(|(index, value)| item.check(value, &format!("{path}[{index}]"))),
            (FieldType::Map(item), Value::Object(entries)) => entries
                .iter()
                .filter(|(_, value)| !value.is_null())
                .try_for_each(|(key, value)| item.check(value, &format!("{path}[{key:?}]"))),
            _ if self.accepts_scalar(value) => Ok(()),
            _ => Err(self.mismatch(value, path)),
        }
    }

    fn project(&self, value: &Value, path: &str) -> Result<Value, SchemaViolation> {
        match (self, value) {
            (FieldType::Object(tree), Value::Object(document)) => Ok(Value::Object(tree.project_at(document, path)?)),
            (FieldType::List(item), Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, value)| item.project(value, &format!("{path}[{index}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (FieldType::Map(item), Value::Object(entries)) => entries
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| Ok((key.clone(), item.project(value, &format!("{path}[{key:?}]"))?)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            _ if self.accepts_scalar(value) => Ok(value.clone()),
            _ => Err(self.mismatch(value, path)),
        }
    }

    fn accepts_scalar(&self, value: &Value) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::IntOrString => value.is_string() || value.is_i64() || value.is_u64(),
            FieldType::Object(_) | FieldType::List(_) | FieldType::Map(_) => false,
        }
    }

    fn mismatch(&self, value: &Value, path: &str) -> SchemaViolation {
        SchemaViolation {
            path: path.to_owned(),
            message: format!("expected {}, found {}", self.describe(), describe_value(value)),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::Integer => "an integer",
            FieldType::Number => "a number",
            FieldType::Boolean => "a boolean",
            FieldType::IntOrString => "an integer or a string",
            FieldType::Object(_) => "an object",
            FieldType::List(_) => "a list",
            FieldType::Map(_) => "a map",
            FieldType::Any => "any value",
        }
    }
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Walks JSON schemas into field types, resolving `$ref`s against the root definitions.
struct Converter<'a> {
    definitions: &'a schemars::Map<String, Schema>,
    /// Definitions currently being expanded; a repeated one is a recursive type.
    stack: Vec<String>,
}

impl Converter<'_> {
    fn field_type(&mut self, schema: &Schema) -> FieldType {
        match schema {
            Schema::Bool(_) => FieldType::Any,
            Schema::Object(object) => self.object_type(object),
        }
    }

    fn object_type(&mut self, schema: &SchemaObject) -> FieldType {
        if let Some(reference) = &schema.reference {
            return self.resolve(reference);
        }
        if flag(schema, INT_OR_STRING) {
            return FieldType::IntOrString;
        }

        if let Some(subschemas) = &schema.subschemas {
            let alternatives = subschemas
                .all_of
                .as_ref()
                .filter(|all_of| all_of.len() == 1)
                .or(subschemas.any_of.as_ref())
                .or(subschemas.one_of.as_ref());
            if let Some(alternatives) = alternatives {
                return self.alternatives(alternatives);
            }
        }

        let instance_type = match &schema.instance_type {
            Some(SingleOrVec::Single(instance_type)) => Some(**instance_type),
            Some(SingleOrVec::Vec(instance_types)) => instance_types
                .iter()
                .copied()
                .find(|instance_type| *instance_type != InstanceType::Null),
            None => None,
        };

        match instance_type {
            Some(InstanceType::String) => FieldType::String,
            Some(InstanceType::Integer) => FieldType::Integer,
            Some(InstanceType::Number) => FieldType::Number,
            Some(InstanceType::Boolean) => FieldType::Boolean,
            Some(InstanceType::Array) => {
                let item = match schema.array.as_ref().and_then(|array| array.items.as_ref()) {
                    Some(SingleOrVec::Single(item)) => self.field_type(item),
                    _ => FieldType::Any,
                };
                FieldType::list(item)
            }
            Some(InstanceType::Object) | None => self.properties(schema),
            Some(InstanceType::Null) => FieldType::Any,
        }
    }

    fn properties(&mut self, schema: &SchemaObject) -> FieldType {
        let Some(object) = &schema.object else {
            return FieldType::Any;
        };

        if object.properties.is_empty() {
            return match object.additional_properties.as_deref() {
                Some(Schema::Bool(false)) | None => FieldType::Any,
                Some(additional) => FieldType::map(self.field_type(additional)),
            };
        }
        if flag(schema, PRESERVE_UNKNOWN_FIELDS) {
            return FieldType::Any;
        }

        let fields = object
            .properties
            .iter()
            .map(|(name, property)| {
                let field = Field {
                    ty: self.field_type(property),
                    required: object.required.contains(name),
                };
                (name.clone(), field)
            })
            .collect();
        FieldType::Object(FieldTree { fields, ..Default::default() })
    }

    /// `Option<T>` shows up as `anyOf: [T, null]`, documented references as a single `allOf`.
    fn alternatives(&mut self, alternatives: &[Schema]) -> FieldType {
        let candidates: Vec<FieldType> = alternatives
            .iter()
            .filter(|schema| !is_null(schema))
            .map(|schema| self.field_type(schema))
            .collect();

        match candidates.as_slice() {
            [single] => single.clone(),
            [FieldType::Integer, FieldType::String] | [FieldType::String, FieldType::Integer] => FieldType::IntOrString,
            _ => FieldType::Any,
        }
    }

    fn resolve(&mut self, reference: &str) -> FieldType {
        let name = reference.rsplit('/').next().unwrap_or(reference).to_owned();
        if self.stack.contains(&name) {
            return FieldType::Any;
        }
        let Some(definition) = self.definitions.get(&name) else {
            return FieldType::Any;
        };

        self.stack.push(name);
        let resolved = self.field_type(definition);
        self.stack.pop();
        resolved
    }
}

fn flag(schema: &SchemaObject, extension: &str) -> bool {
    schema.extensions.get(extension).and_then(Value::as_bool).unwrap_or(false)
}

fn is_null(schema: &Schema) -> bool {
    matches!(
        schema,
        Schema::Object(SchemaObject {
            instance_type: Some(SingleOrVec::Single(instance_type)),
            ..
        }) if **instance_type == InstanceType::Null
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct Widget {
        display_name: String,
        replicas: Option<i32>,
        ratio: Option<f64>,
        enabled: Option<bool>,
        labels: Option<BTreeMap<String, String>>,
        ports: Option<Vec<Port>>,
        /// Free form settings
        settings: Option<serde_json::Value>,
        parent: Option<Box<Widget>>,
    }

    #[derive(Serialize, Deserialize, JsonSchema)]
    struct Port {
        name: String,
        number: i32,
    }

    fn document(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_of_derives_fields_from_json_schema() {
        // When: Deriving the tree of a Rust type
        let tree = FieldTree::of::<Widget>();

        // Then: Names follow serde renames and required-ness follows Option
        let display_name = tree.get("displayName").unwrap();
        assert_eq!(display_name.ty, FieldType::String);
        assert!(display_name.required);
        assert_eq!(tree.get("replicas").unwrap().ty, FieldType::Integer);
        assert!(!tree.get("replicas").unwrap().required);
        assert_eq!(tree.get("ratio").unwrap().ty, FieldType::Number);
        assert_eq!(tree.get("enabled").unwrap().ty, FieldType::Boolean);
        assert_eq!(tree.get("labels").unwrap().ty, FieldType::map(FieldType::String));
        assert_eq!(tree.get("settings").unwrap().ty, FieldType::Any);
        assert_eq!(
            tree.get("ports").unwrap().ty,
            FieldType::list(FieldType::Object(
                FieldTree::new()
                    .required("name", FieldType::String)
                    .required("number", FieldType::Integer)
            ))
        );
    }

    #[test]
    fn test_of_stops_at_recursive_types() {
        let tree = FieldTree::of::<Widget>();

        let FieldType::Object(parent) = &tree.get("parent").unwrap().ty else {
            panic!("expected parent to be an object");
        };
        assert_eq!(parent.get("parent").unwrap().ty, FieldType::Any);
        assert_eq!(parent.get("displayName").unwrap().ty, FieldType::String);
    }

    #[test]
    fn test_from_openapi_reads_crd_schema() {
        // Given: A trimmed down CRD schema
        let schema = json!({
            "type": "object",
            "properties": {
                "apiVersion": { "type": "string" },
                "spec": {
                    "type": "object",
                    "required": ["targetPort"],
                    "properties": {
                        "targetPort": { "x-kubernetes-int-or-string": true, "anyOf": [{ "type": "integer" }, { "type": "string" }] },
                        "config": { "type": "object", "x-kubernetes-preserve-unknown-fields": true },
                        "selector": { "type": "object", "additionalProperties": { "type": "string" } },
                        "hosts": { "type": "array", "items": { "type": "string" } }
                    }
                },
                "status": { "type": "object", "properties": { "ready": { "type": "boolean" } } }
            }
        });

        // When: Reading it without the status and envelope fields
        let tree = FieldTree::from_openapi(&schema).unwrap().without(&["apiVersion", "status"]);

        // Then: Kubernetes extensions are understood
        assert_eq!(tree.names().collect::<Vec<_>>(), vec!["spec"]);
        let FieldType::Object(spec) = &tree.get("spec").unwrap().ty else {
            panic!("expected spec to be an object");
        };
        assert_eq!(spec.get("targetPort").unwrap().ty, FieldType::IntOrString);
        assert!(spec.get("targetPort").unwrap().required);
        assert_eq!(spec.get("config").unwrap().ty, FieldType::Any);
        assert_eq!(spec.get("selector").unwrap().ty, FieldType::map(FieldType::String));
        assert_eq!(spec.get("hosts").unwrap().ty, FieldType::list(FieldType::String));
    }

    #[test]
    fn test_from_openapi_rejects_scalar_root() {
        let result = FieldTree::from_openapi(&json!({ "type": "string" }));

        assert!(result.is_err());
    }

    #[test]
    fn test_from_openapi_preserving_unknown_fields_is_open() {
        let schema = json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true });

        let tree = FieldTree::from_openapi(&schema).unwrap();

        assert!(tree.check(&document(json!({ "spec": { "anything": [1, 2] } }))).is_ok());
    }

    #[test]
    fn test_open_tree_accepts_undeclared_fields_but_not_excluded_ones() {
        // Given: An open tree with one declared and one excluded field
        let tree = FieldTree::open()
            .field("replicas", FieldType::Integer)
            .without(&["status"]);

        // When: Checking and projecting documents
        let accepted = tree.check(&document(json!({ "spec": { "size": 1 }, "replicas": 2 })));
        let mistyped = tree.check(&document(json!({ "replicas": "two" })));
        let excluded = tree.check(&document(json!({ "status": {} })));
        let projected = tree
            .project(&document(json!({ "spec": { "size": 1 }, "status": { "ready": true }, "data": null })))
            .unwrap();

        // Then: Undeclared fields pass as is, declared ones are still typed
        assert!(accepted.is_ok());
        assert_eq!(mistyped.unwrap_err().to_string(), "replicas: expected an integer, found a string");
        assert_eq!(excluded.unwrap_err().to_string(), "status: unknown field");
        assert_eq!(Value::Object(projected), json!({ "spec": { "size": 1 } }));
    }

    #[test]
    fn test_check_accepts_sparse_document() {
        let tree = FieldTree::of::<Widget>();

        let result = tree.check(&document(json!({
            "displayName": "blue",
            "replicas": null,
            "labels": { "team": "storage" },
            "ports": [{ "name": "http", "number": 80 }],
            "settings": { "anything": ["goes"] }
        })));

        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_check_reports_unknown_field_with_path() {
        let tree = FieldTree::of::<Widget>();

        let result = tree.check(&document(json!({
            "displayName": "blue",
            "ports": [{ "name": "http", "number": 80, "protocol": "TCP" }]
        })));

        assert_eq!(
            result,
            Err(SchemaViolation {
                path: "ports[0].protocol".to_string(),
                message: "unknown field".to_string(),
            })
        );
    }

    #[test]
    fn test_check_reports_type_mismatch() {
        let tree = FieldTree::of::<Widget>();

        let result = tree.check(&document(json!({ "displayName": "blue", "replicas": "three" })));

        assert_eq!(
            result.unwrap_err().to_string(),
            "replicas: expected an integer, found a string"
        );
    }

    #[test]
    fn test_check_reports_missing_required_field() {
        let tree = FieldTree::of::<Widget>();

        let result = tree.check(&document(json!({ "displayName": null })));

        assert_eq!(
            result.unwrap_err().to_string(),
            "displayName: required field is not set"
        );
    }

    #[test]
    fn test_project_drops_unknown_fields_and_nulls() {
        // Given: A server response with server-only fields
        let tree = FieldTree::new().field(
            "spec",
            FieldType::Object(
                FieldTree::new()
                    .required("replicas", FieldType::Integer)
                    .field("mode", FieldType::String),
            ),
        );
        let response = document(json!({
            "spec": { "replicas": 2, "mode": null, "defaultedByServer": true },
            "status": { "phase": "Ready" }
        }));

        // When: Projecting onto the tree
        let projected = tree.project(&response).unwrap();

        // Then: Only declared, non-null fields survive
        assert_eq!(Value::Object(projected), json!({ "spec": { "replicas": 2 } }));
    }

    #[test]
    fn test_project_fails_on_type_mismatch() {
        let tree = FieldTree::new().field("spec", FieldType::Object(FieldTree::new()));

        let result = tree.project(&document(json!({ "spec": "oops" })));

        assert_eq!(result.unwrap_err().to_string(), "spec: expected an object, found a string");
    }
}
