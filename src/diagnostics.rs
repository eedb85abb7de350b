//! Conversion of engine outcomes into the diagnostics shown by the calling framework.

use serde::Serialize;

use crate::error::Error;
use crate::identity::ResourceIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Reported when a managed object was deleted outside of the provider.
    pub fn gone(identity: &ResourceIdentity) -> Self {
        Self::warning(
            "Resource no longer exists",
            format!("{identity} was not found and will be removed from state"),
        )
    }
}

impl From<&Error> for Diagnostic {
    fn from(error: &Error) -> Self {
        let summary = match error {
            Error::Encode { .. } => "Unable to encode resource",
            Error::Decode { .. } => "Unable to decode resource",
            Error::InvalidFields { .. } => "Invalid resource fields",
            Error::Apply { .. } => "Unable to apply resource",
            Error::Get { .. } => "Unable to read resource",
            Error::Delete { .. } => "Unable to delete resource",
            Error::NotFound { .. } => "Resource not found",
            Error::ImportFormat { .. } => "Invalid import identifier",
            Error::OfflineMode { .. } => "Provider is offline",
            Error::WaitTimeout { .. } => "Timed out waiting for resource",
            Error::Cancelled { .. } => "Operation cancelled",
            Error::UserInput(_) | Error::UnnamedObject => "Invalid configuration",
            Error::Anyhow(_) => "Unexpected error",
        };
        Self::error(summary, format!("{error:#}"))
    }
}

impl From<Error> for Diagnostic {
    fn from(error: Error) -> Self {
        Self::from(&error)
    }
}
