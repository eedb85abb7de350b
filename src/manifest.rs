//! Offline rendering of a declared object as a YAML manifest.

use std::sync::Arc;

use crate::error::Error;
use crate::error::Result;
use crate::kind::KindDescriptor;
use crate::state::ResourceState;

/// Renders states of one kind to YAML without contacting the cluster.
#[derive(Debug, Clone)]
pub struct ManifestRenderer {
    descriptor: Arc<KindDescriptor>,
}

impl ManifestRenderer {
    pub fn new(descriptor: Arc<KindDescriptor>) -> Self {
        Self { descriptor }
    }

    /// Returns `desired` with `yaml`, `api_version` and `kind` filled in. The output is
    /// identical for equal inputs and carries none of the provider bookkeeping. Name and
    /// namespace are checked against the kind's scope like an apply would.
    pub fn render(&self, desired: &ResourceState) -> Result<ResourceState> {
        self.descriptor.identity(&desired.metadata)?;
        let manifest = self.descriptor.manifest(desired)?;
        let yaml = serde_yaml::to_string(&manifest).map_err(|e| Error::Encode {
            kind: self.descriptor.kind.clone(),
            message: e.to_string(),
        })?;

        log::trace!(kind:% = self.descriptor.kind, bytes = yaml.len(); "Rendered manifest");

        Ok(ResourceState {
            api_version: Some(self.descriptor.api_version()),
            kind: Some(self.descriptor.kind.clone()),
            yaml: Some(yaml),
            ..desired.clone()
        })
    }
}
