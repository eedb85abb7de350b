//! Wires configuration, client and catalog together and hands out per-kind handlers.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::DynamicObject;
use serde_json::Value;

use crate::catalog::Catalog;
use crate::client::ApplyParams;
use crate::client::DynamicClient;
use crate::client::KubeClient;
use crate::config::ProviderConfig;
use crate::data_source::DataSource;
use crate::error::Error;
use crate::error::Result;
use crate::identity::ResourceIdentity;
use crate::kind::KindDescriptor;
use crate::manifest::ManifestRenderer;
use crate::reconciler::Reconciler;

pub struct Provider {
    config: Arc<ProviderConfig>,
    client: Arc<dyn DynamicClient>,
    catalog: Catalog,
}

impl Provider {
    pub fn new(config: ProviderConfig, client: Arc<dyn DynamicClient>, catalog: Catalog) -> Self {
        Self {
            config: Arc::new(config),
            client,
            catalog,
        }
    }

    /// Builds a provider over the built-in catalog. In offline mode no cluster configuration
    /// is loaded at all.
    pub async fn connect(config: ProviderConfig) -> Result<Self> {
        let client: Arc<dyn DynamicClient> = if config.offline {
            log::info!("Running in offline mode, no requests will be sent to the cluster");
            Arc::new(Disconnected)
        } else {
            Arc::new(KubeClient::connect(&config).await?)
        };
        Ok(Self::new(config, client, Catalog::builtin()))
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn reconciler(&self, type_name: &str) -> Result<Reconciler<dyn DynamicClient>> {
        let descriptor = self.descriptor(type_name)?;
        Ok(Reconciler::new(descriptor, self.config.clone(), self.client.clone()))
    }

    pub fn data_source(&self, type_name: &str) -> Result<DataSource<dyn DynamicClient>> {
        self.reconciler(type_name).map(DataSource::new)
    }

    pub fn renderer(&self, type_name: &str) -> Result<ManifestRenderer> {
        self.descriptor(type_name).map(ManifestRenderer::new)
    }

    fn descriptor(&self, type_name: &str) -> Result<Arc<KindDescriptor>> {
        self.catalog
            .get(type_name)
            .ok_or_else(|| Error::UserInput(format!("Unknown resource type {type_name:?}")))
    }
}

/// Client of an offline provider. Every request is refused before reaching it, so it only
/// answers if that guard is bypassed.
struct Disconnected;

impl Disconnected {
    fn refuse() -> kube::Error {
        kube::Error::Service("provider is running in offline mode".into())
    }
}

#[async_trait]
impl DynamicClient for Disconnected {
    async fn get(&self, _identity: &ResourceIdentity) -> kube::Result<DynamicObject> {
        Err(Self::refuse())
    }

    async fn apply(
        &self,
        _identity: &ResourceIdentity,
        _payload: &Value,
        _params: &ApplyParams,
    ) -> kube::Result<DynamicObject> {
        Err(Self::refuse())
    }

    async fn delete(&self, _identity: &ResourceIdentity) -> kube::Result<()> {
        Err(Self::refuse())
    }
}
