//! `kubeform` is the generic engine behind a declarative infrastructure provider that manages
//! Kubernetes objects, most notably custom resources. Instead of one hand written handler per
//! CRD, a single engine is driven by a [`KindDescriptor`] per kind: its group, version, kind,
//! plural, scope and a [`FieldTree`](schema::FieldTree) of its top-level fields.
//!
//! ## Usage
//!
//! A [`Provider`] holds the configuration, a Kubernetes client and a [`Catalog`] of kinds. Per
//! resource type it hands out a [`Reconciler`] (Create/Read/Update/Delete/Import with
//! server-side apply), a [`DataSource`] (read-only lookup) and a [`ManifestRenderer`] (offline
//! YAML).
//!
//! ```
//! use kubeform::cancel::Cancellation;
//! use kubeform::catalog::CronFederatedHpaFields;
//! use kubeform::catalog::CronFederatedHpaRule;
//! use kubeform::catalog::CronFederatedHpaSpec;
//! use kubeform::catalog::CrossVersionObjectReference;
//! use kubeform::config::ProviderConfig;
//! use kubeform::error::Error;
//! use kubeform::state::ResourceState;
//! use kubeform::Provider;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Offline, nothing is sent to a cluster. Drop `offline` to talk to the cluster of the
//!     // current kubeconfig context.
//!     let provider = Provider::connect(ProviderConfig::offline()).await?;
//!     let type_name = "k8s_autoscaling_karmada_io_cron_federated_hpa_v1alpha1";
//!
//!     // Desired states are built from the typed model of a kind, or field by field.
//!     let fields = CronFederatedHpaFields {
//!         spec: CronFederatedHpaSpec {
//!             scale_target_ref: CrossVersionObjectReference {
//!                 api_version: Some("apps/v1".to_owned()),
//!                 kind: "Deployment".to_owned(),
//!                 name: "web".to_owned(),
//!             },
//!             rules: vec![CronFederatedHpaRule {
//!                 name: "scale-down".to_owned(),
//!                 schedule: "0 22 * * *".to_owned(),
//!                 target_replicas: Some(1),
//!                 ..Default::default()
//!             }],
//!         },
//!     };
//!     let desired = ResourceState::named("nightly").in_namespace("prod").with_fields(&fields)?;
//!
//!     // Rendering and importing never need the cluster.
//!     let rendered = provider.renderer(type_name)?.render(&desired)?;
//!     assert!(rendered.yaml.unwrap().starts_with("apiVersion: autoscaling.karmada.io/v1alpha1"));
//!
//!     let reconciler = provider.reconciler(type_name)?;
//!     let imported = reconciler.import("prod/nightly")?;
//!     assert_eq!(imported.id.as_deref(), Some("prod/nightly"));
//!
//!     // Everything else does.
//!     let created = reconciler.create(&desired, &Cancellation::never()).await;
//!     assert!(matches!(created, Err(Error::OfflineMode { .. })));
//!
//!     Ok(())
//! }
//! ```
//!
//! Each operation takes the caller's state by reference and returns a new one, so a failed
//! call never leaves a half updated state behind. After Create and Update the returned state
//! carries the server's view of the object, defaults included, and an `id` of
//! `<namespace>/<name>` or `<name>` for cluster scoped kinds.
//!
//! ## Kinds
//!
//! [`Catalog::builtin`] knows `StorageClass` and `CSIDriver` (`storage.k8s.io/v1`),
//! `CronFederatedHPA` (`autoscaling.karmada.io/v1alpha1`) and `ClusterDeployment`
//! (`hive.openshift.io/v1`). Other kinds are registered from their CRD:
//!
//! ```
//! use kubeform::Catalog;
//! use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
//!
//! fn register(catalog: &mut Catalog, crd: &CustomResourceDefinition) -> kubeform::error::Result<()> {
//!     for type_name in catalog.register_crd(crd)? {
//!         println!("registered {type_name}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Waiting for objects
//!
//! A state may carry `wait_for` conditions. After a successful apply the object is polled
//! until each JSONPath resolves to the expected value, e.g.
//! `WaitCondition::new("{.status.installed}").equals("true").within(600)`.
//!
//! ## Error Handling
//!
//! All operations return [`error::Result`]. Errors name the verb and REST path of the failed
//! request and keep the `kube` error as source. To show them in the calling framework,
//! convert them into a [`Diagnostic`](diagnostics::Diagnostic):
//!
//! ```
//! use kubeform::client::Verb;
//! use kubeform::diagnostics::Diagnostic;
//! use kubeform::error::Error;
//!
//! let diagnostic = Diagnostic::from(Error::OfflineMode { verb: Verb::Delete });
//! assert_eq!(diagnostic.summary, "Provider is offline");
//! ```
//!
//! Code embedding the engine can return its own errors through `Error::Anyhow`.
//!
//! ## Logging
//!
//! The crate logs through the `log` facade with structured key-values and installs no logger.

pub mod cancel;
pub mod catalog;
pub mod client;
pub mod config;
pub mod data_source;
pub mod diagnostics;
pub mod error;
pub mod identity;
pub mod jsonpath;
pub mod kind;
pub mod manifest;
pub mod provider;
pub mod reconciler;
pub mod schema;
pub mod state;
pub mod wait;

pub use catalog::Catalog;
pub use data_source::DataSource;
pub use kind::KindDescriptor;
pub use manifest::ManifestRenderer;
pub use provider::Provider;
pub use reconciler::ReadOutcome;
pub use reconciler::Reconciler;
