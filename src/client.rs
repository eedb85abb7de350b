//! Schema-agnostic access to the Kubernetes API.
//!
//! Every kind goes through the same three requests: a server-side apply patch, a get and a
//! delete, all keyed by a [`ResourceIdentity`]. The [`DynamicClient`] trait is the seam between
//! the engine and the transport; [`KubeClient`] implements it on top of `kube`'s dynamic
//! [`Api`].

use std::fmt;

use anyhow::Context as _;
use async_trait::async_trait;
use kube::api::DeleteParams;
use kube::api::DynamicObject;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::api::ValidationDirective;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Api;
use kube::Client;
use kube::Config;
use serde::Serialize;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::identity::ResourceIdentity;

/// The HTTP verb of a request against the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Verb {
    Get,
    Patch,
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verb::Get => "GET",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        })
    }
}

/// Server-side apply parameters resolved for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyParams {
    pub field_manager: String,
    pub force: bool,
}

impl ApplyParams {
    fn patch_params(&self) -> PatchParams {
        PatchParams {
            field_manager: Some(self.field_manager.clone()),
            force: self.force,
            field_validation: Some(ValidationDirective::Strict),
            ..Default::default()
        }
    }
}

/// Issues the requests of the reconciliation workflow against unstructured objects.
///
/// Implementations return the raw [`kube::Error`] so callers can tell a missing object
/// apart from any other failure with [`is_not_found`].
#[async_trait]
pub trait DynamicClient: Send + Sync {
    /// Fetches the live object.
    async fn get(&self, identity: &ResourceIdentity) -> kube::Result<DynamicObject>;

    /// Applies `payload` with server-side apply and returns the object as persisted.
    async fn apply(
        &self,
        identity: &ResourceIdentity,
        payload: &Value,
        params: &ApplyParams,
    ) -> kube::Result<DynamicObject>;

    /// Deletes the object.
    async fn delete(&self, identity: &ResourceIdentity) -> kube::Result<()>;
}

/// Returns true when the API server reported that the object does not exist.
pub fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

/// [`DynamicClient`] backed by a `kube` [`Client`].
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the kubeconfig and context named in the provider configuration,
    /// falling back to the inferred in-cluster or local configuration.
    pub async fn connect(config: &ProviderConfig) -> Result<Self> {
        let options = KubeConfigOptions {
            context: config.context.clone(),
            ..Default::default()
        };

        let kube_config = match &config.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .with_context(|| format!("failed to load kubeconfig {}", path.display()))?
            }
            None if config.context.is_some() => Config::from_kubeconfig(&options)
                .await
                .context("failed to load kubeconfig")?,
            None => Config::infer().await.context("failed to infer kubernetes configuration")?,
        };

        let client = Client::try_from(kube_config).context("failed to create kubernetes client")?;
        Ok(Self::new(client))
    }

    fn api(&self, identity: &ResourceIdentity) -> Api<DynamicObject> {
        let resource = identity.api_resource();
        match identity.namespace.as_deref() {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait]
impl DynamicClient for KubeClient {
    async fn get(&self, identity: &ResourceIdentity) -> kube::Result<DynamicObject> {
        self.api(identity).get(&identity.name).await
    }

    async fn apply(
        &self,
        identity: &ResourceIdentity,
        payload: &Value,
        params: &ApplyParams,
    ) -> kube::Result<DynamicObject> {
        self.api(identity)
            .patch(&identity.name, &params.patch_params(), &Patch::Apply(payload))
            .await
    }

    async fn delete(&self, identity: &ResourceIdentity) -> kube::Result<()> {
        self.api(identity)
            .delete(&identity.name, &DeleteParams::default())
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;

    type ApplyHook = Box<dyn Fn(&mut Value) + Send + Sync>;

    /// In-memory API server that records every request it receives.
    #[derive(Clone, Default)]
    pub struct MockClient {
        objects: Arc<Mutex<BTreeMap<String, Value>>>,
        calls: Arc<Mutex<Vec<(Verb, String)>>>,
        applied: Arc<Mutex<Vec<(Value, ApplyParams)>>>,
        failures: Arc<Mutex<HashMap<Verb, (u16, String)>>>,
        apply_hook: Arc<Mutex<Option<ApplyHook>>>,
        blocked: Arc<Mutex<bool>>,
    }

    impl MockClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds an existing object.
        pub fn insert(&self, identity: &ResourceIdentity, object: Value) {
            self.objects.lock().unwrap().insert(identity.to_string(), object);
        }

        /// Replaces a stored object, e.g. to simulate another actor or a controller.
        pub fn update(&self, identity: &ResourceIdentity, mutate: impl FnOnce(&mut Value)) {
            let mut objects = self.objects.lock().unwrap();
            if let Some(object) = objects.get_mut(&identity.to_string()) {
                mutate(object);
            }
        }

        pub fn remove(&self, identity: &ResourceIdentity) {
            self.objects.lock().unwrap().remove(&identity.to_string());
        }

        pub fn object(&self, identity: &ResourceIdentity) -> Option<Value> {
            self.objects.lock().unwrap().get(&identity.to_string()).cloned()
        }

        /// Makes every request with `verb` fail with the given status code.
        pub fn fail(&self, verb: Verb, code: u16, message: &str) {
            self.failures
                .lock()
                .unwrap()
                .insert(verb, (code, message.to_string()));
        }

        /// Runs `hook` over every applied object before it is stored, like a defaulting
        /// webhook would.
        pub fn on_apply(&self, hook: impl Fn(&mut Value) + Send + Sync + 'static) {
            *self.apply_hook.lock().unwrap() = Some(Box::new(hook));
        }

        /// Makes every request hang until it is dropped.
        pub fn block(&self) {
            *self.blocked.lock().unwrap() = true;
        }

        pub fn calls(&self) -> Vec<(Verb, String)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn applied(&self) -> Vec<(Value, ApplyParams)> {
            self.applied.lock().unwrap().clone()
        }

        async fn enter(&self, verb: Verb, identity: &ResourceIdentity) -> kube::Result<()> {
            self.calls.lock().unwrap().push((verb, identity.to_string()));
            let blocked = *self.blocked.lock().unwrap();
            if blocked {
                futures::future::pending::<()>().await;
            }
            match self.failures.lock().unwrap().get(&verb) {
                Some((code, message)) => Err(api_error(*code, message)),
                None => Ok(()),
            }
        }
    }

    pub fn api_error(code: u16, message: &str) -> kube::Error {
        let reason = match code {
            404 => "NotFound",
            409 => "Conflict",
            403 => "Forbidden",
            422 => "Invalid",
            _ => "InternalError",
        };
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    fn to_dynamic(object: Value) -> kube::Result<DynamicObject> {
        serde_json::from_value(object).map_err(kube::Error::SerdeError)
    }

    fn merge(target: &mut Value, patch: &Value) {
        match (target, patch) {
            (Value::Object(target), Value::Object(patch)) => {
                for (key, value) in patch {
                    merge(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
            (target, patch) => *target = patch.clone(),
        }
    }

    #[async_trait]
    impl DynamicClient for MockClient {
        async fn get(&self, identity: &ResourceIdentity) -> kube::Result<DynamicObject> {
            self.enter(Verb::Get, identity).await?;
            let object = self.object(identity);
            match object {
                Some(object) => to_dynamic(object),
                None => Err(api_error(404, &format!("{} not found", identity.name))),
            }
        }

        async fn apply(
            &self,
            identity: &ResourceIdentity,
            payload: &Value,
            params: &ApplyParams,
        ) -> kube::Result<DynamicObject> {
            self.enter(Verb::Patch, identity).await?;
            self.applied
                .lock()
                .unwrap()
                .push((payload.clone(), params.clone()));

            let mut object = self.object(identity).unwrap_or_else(|| {
                serde_json::json!({
                    "metadata": {
                        "uid": format!("uid-{}", identity.name),
                        "managedFields": [{ "manager": params.field_manager, "operation": "Apply" }],
                    }
                })
            });
            merge(&mut object, payload);
            if let Some(hook) = self.apply_hook.lock().unwrap().as_ref() {
                hook(&mut object);
            }
            self.insert(identity, object.clone());
            to_dynamic(object)
        }

        async fn delete(&self, identity: &ResourceIdentity) -> kube::Result<()> {
            self.enter(Verb::Delete, identity).await?;
            match self.objects.lock().unwrap().remove(&identity.to_string()) {
                Some(_) => Ok(()),
                None => Err(api_error(404, &format!("{} not found", identity.name))),
            }
        }
    }

    #[test]
    fn test_verb_display() {
        assert_eq!(Verb::Get.to_string(), "GET");
        assert_eq!(Verb::Patch.to_string(), "PATCH");
        assert_eq!(Verb::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_apply_params_are_strict_server_side_apply() {
        // Given: Resolved apply parameters
        let params = ApplyParams {
            field_manager: "kubeform".to_string(),
            force: true,
        };

        // When: Converting them into kube patch parameters
        let patch_params = params.patch_params();

        // Then: The field manager, force and strict validation are set
        assert_eq!(patch_params.field_manager.as_deref(), Some("kubeform"));
        assert!(patch_params.force);
        assert!(matches!(patch_params.field_validation, Some(ValidationDirective::Strict)));
        assert!(!patch_params.dry_run);
    }

    #[test]
    fn test_is_not_found() {
        assert!(is_not_found(&api_error(404, "gone")));
        assert!(!is_not_found(&api_error(409, "conflict")));
        assert!(!is_not_found(&api_error(403, "forbidden")));
    }
}
