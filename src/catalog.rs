//! The kinds a provider exposes, keyed by their resource type name.
//!
//! A handful of kinds ship built in, each described by a typed model of its top-level fields.
//! The models double as the way callers build states for these kinds:
//!
//! ```
//! use kubeform::catalog::StorageClassFields;
//! use kubeform::state::ResourceState;
//!
//! let fields = StorageClassFields {
//!     provisioner: "pd.csi.storage.gke.io".to_owned(),
//!     reclaim_policy: Some("Retain".to_owned()),
//!     ..Default::default()
//! };
//! let desired = ResourceState::named("fast-ssd").with_fields(&fields).unwrap();
//! assert_eq!(desired.fields["reclaimPolicy"], "Retain");
//! ```
//!
//! Any other kind can be registered from its CRD with [`Catalog::register_crd`].

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::kind::KindDescriptor;
use crate::schema::FieldTree;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassFields {
    pub provisioner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclaim_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_volume_expansion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_binding_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_topologies: Option<Vec<TopologySelectorTerm>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopologySelectorTerm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_label_expressions: Option<Vec<TopologySelectorRequirement>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopologySelectorRequirement {
    pub key: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CsiDriverFields {
    pub spec: CsiDriverSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsiDriverSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_info_on_mount: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_group_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_capacity: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_lifecycle_modes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_requests: Option<Vec<TokenRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_republish: Option<bool>,
    #[serde(rename = "seLinuxMount", skip_serializing_if = "Option::is_none")]
    pub se_linux_mount: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub audience: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CronFederatedHpaFields {
    pub spec: CronFederatedHpaSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CronFederatedHpaSpec {
    pub scale_target_ref: CrossVersionObjectReference,
    pub rules: Vec<CronFederatedHpaRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrossVersionObjectReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub kind: String,
    pub name: String,
}

/// One scheduled scaling step. `schedule` is a cron expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CronFederatedHpaRule {
    pub name: String,
    pub schedule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_min_replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_max_replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful_history_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_history_limit: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterDeploymentFields {
    pub spec: ClusterDeploymentSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeploymentSpec {
    pub cluster_name: String,
    pub base_domain: String,
    /// Cloud specific settings, e.g. `{"aws": {"region": "us-east-1"}}`.
    pub platform: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_secret_ref: Option<LocalObjectReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocalObjectReference {
    pub name: String,
}

pub fn storage_class() -> KindDescriptor {
    KindDescriptor::cluster("storage.k8s.io", "v1", "StorageClass", "storageclasses")
        .with_schema(FieldTree::of::<StorageClassFields>())
}

pub fn csi_driver() -> KindDescriptor {
    KindDescriptor::cluster("storage.k8s.io", "v1", "CSIDriver", "csidrivers")
        .with_schema(FieldTree::of::<CsiDriverFields>())
}

pub fn cron_federated_hpa() -> KindDescriptor {
    KindDescriptor::namespaced("autoscaling.karmada.io", "v1alpha1", "CronFederatedHPA", "cronfederatedhpas")
        .with_schema(FieldTree::of::<CronFederatedHpaFields>())
}

pub fn cluster_deployment() -> KindDescriptor {
    KindDescriptor::namespaced("hive.openshift.io", "v1", "ClusterDeployment", "clusterdeployments")
        .with_schema(FieldTree::of::<ClusterDeploymentFields>())
}

/// Registry of kind descriptors keyed by [`KindDescriptor::type_name`].
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    kinds: BTreeMap<String, Arc<KindDescriptor>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in kinds.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for descriptor in [storage_class(), csi_driver(), cron_federated_hpa(), cluster_deployment()] {
            catalog.register(descriptor);
        }
        catalog
    }

    /// Adds a kind, returning the descriptor it replaced.
    pub fn register(&mut self, descriptor: KindDescriptor) -> Option<Arc<KindDescriptor>> {
        let type_name = descriptor.type_name();
        log::debug!(type_name:% = type_name; "Registering kind");
        self.kinds.insert(type_name, Arc::new(descriptor))
    }

    /// Adds every served version of a CRD and returns the registered type names.
    pub fn register_crd(&mut self, crd: &CustomResourceDefinition) -> Result<Vec<String>> {
        let versions: Vec<String> = crd
            .spec
            .versions
            .iter()
            .filter(|version| version.served)
            .map(|version| version.name.clone())
            .collect();

        let mut registered = Vec::with_capacity(versions.len());
        for version in versions {
            let descriptor = KindDescriptor::from_crd(crd, &version)?;
            registered.push(descriptor.type_name());
            self.register(descriptor);
        }
        Ok(registered)
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<KindDescriptor>> {
        self.kinds.get(type_name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<KindDescriptor>)> {
        self.kinds.iter().map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
