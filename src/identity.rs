//! Where an object lives in the Kubernetes API and how it is tracked in provider state.

use std::fmt;

use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Whether a kind lives inside a namespace or at cluster level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scope {
    Namespaced,
    Cluster,
}

impl Scope {
    /// The import identifier format accepted for this scope.
    pub fn import_format(self) -> &'static str {
        match self {
            Scope::Namespaced => "<namespace>/<name>",
            Scope::Cluster => "<name>",
        }
    }
}

/// Fully qualified address of one object: group/version/resource plus namespace and name.
///
/// Identities are immutable; renaming an object means deleting and recreating it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceIdentity {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub resource: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceIdentity {
    /// `"{namespace}/{name}"` for namespaced objects, `"{name}"` otherwise.
    pub fn composite_id(&self) -> String {
        composite_id(self.namespace.as_deref(), &self.name)
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(&self.group, &self.version, &self.kind),
            &self.resource,
        )
    }
}

/// Renders the REST path of the object, e.g.
/// `/apis/autoscaling.karmada.io/v1alpha1/namespaces/prod/cronfederatedhpas/nightly`.
impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "/api/{}", self.version)?;
        } else {
            write!(f, "/apis/{}/{}", self.group, self.version)?;
        }
        if let Some(namespace) = &self.namespace {
            write!(f, "/namespaces/{namespace}")?;
        }
        write!(f, "/{}/{}", self.resource, self.name)
    }
}

pub fn composite_id(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name.to_owned(),
    }
}

/// The namespace and name an import identifier points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportId {
    pub namespace: Option<String>,
    pub name: String,
}

impl ImportId {
    /// Parses `"<namespace>/<name>"` for namespaced kinds and `"<name>"` for cluster scoped
    /// kinds. Every segment must be non-empty.
    pub fn parse(raw: &str, scope: Scope) -> Result<Self> {
        let invalid = || Error::ImportFormat {
            id: raw.to_owned(),
            expected: scope.import_format(),
        };

        let segments: Vec<&str> = raw.split('/').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(invalid());
        }

        match (scope, segments.as_slice()) {
            (Scope::Namespaced, [namespace, name]) => Ok(Self {
                namespace: Some((*namespace).to_owned()),
                name: (*name).to_owned(),
            }),
            (Scope::Cluster, [name]) => Ok(Self {
                namespace: None,
                name: (*name).to_owned(),
            }),
            _ => Err(invalid()),
        }
    }

    pub fn composite_id(&self) -> String {
        composite_id(self.namespace.as_deref(), &self.name)
    }
}
