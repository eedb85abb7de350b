//! Provider-wide configuration shared by every resource instance.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context as _;
use serde::Deserialize;
use serde::Serialize;

use crate::client::ApplyParams;
use crate::client::Verb;
use crate::error::Error;
use crate::error::Result;
use crate::state::ResourceState;

pub const DEFAULT_FIELD_MANAGER: &str = "kubeform";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Disables every request against the API server. Manifest rendering and imports still
    /// work.
    pub offline: bool,
    /// Field manager used for server-side apply unless a resource overrides it.
    pub field_manager: String,
    /// Whether apply conflicts are forced unless a resource overrides it.
    pub force_conflicts: bool,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            offline: false,
            field_manager: DEFAULT_FIELD_MANAGER.to_owned(),
            force_conflicts: false,
            kubeconfig: None,
            context: None,
        }
    }
}

impl ProviderConfig {
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config = serde_yaml::from_str(content).context("failed to parse provider configuration")?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read provider configuration {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Resolves the apply parameters of one resource: its own overrides first, then the
    /// provider defaults.
    pub fn apply_params(&self, state: &ResourceState) -> ApplyParams {
        ApplyParams {
            field_manager: state
                .field_manager
                .clone()
                .filter(|manager| !manager.is_empty())
                .unwrap_or_else(|| self.field_manager.clone()),
            force: state.force_conflicts.unwrap_or(self.force_conflicts),
        }
    }

    pub(crate) fn ensure_online(&self, verb: Verb) -> Result<()> {
        if self.offline {
            return Err(Error::OfflineMode { verb });
        }
        Ok(())
    }
}
