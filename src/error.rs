use std::time::Duration;

use thiserror::Error as ThisError;

use crate::client::Verb;
use crate::schema::SchemaViolation;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The desired state could not be turned into a Kubernetes object. For a state built
    /// against its kind's schema this is unreachable.
    #[error("Unable to encode {kind} into a Kubernetes object: {message}. Please report this issue to the provider developers.")]
    Encode { kind: String, message: String },
    #[error("Unable to decode {kind} returned by the Kubernetes API: {message}. Please report this issue to the provider developers.")]
    Decode { kind: String, message: String },
    /// The declared fields do not match the kind's schema.
    #[error("Invalid {kind}: {violation}")]
    InvalidFields {
        kind: String,
        #[source]
        violation: SchemaViolation,
    },

    #[error("PATCH {target} failed: {source}")]
    Apply {
        target: String,
        #[source]
        source: kube::Error,
    },
    #[error("GET {target} failed: {source}")]
    Get {
        target: String,
        #[source]
        source: kube::Error,
    },
    #[error("DELETE {target} failed: {source}")]
    Delete {
        target: String,
        #[source]
        source: kube::Error,
    },
    #[error("GET {target} failed: object does not exist")]
    NotFound { target: String },

    #[error("Unexpected import identifier {id:?}, expected {expected}")]
    ImportFormat { id: String, expected: &'static str },
    #[error("{verb} requests are disabled because the provider is running in offline mode")]
    OfflineMode { verb: Verb },
    #[error("Timed out after {timeout:?} waiting for {jsonpath} on {target}")]
    WaitTimeout {
        target: String,
        jsonpath: String,
        timeout: Duration,
    },
    #[error("{verb} request was cancelled")]
    Cancelled { verb: Verb },

    #[error("{0}")]
    UserInput(String),
    #[error("Unnamed k8s object")]
    UnnamedObject,

    /// Can be used by callers embedding the engine to return their own errors
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Returns the attempted verb for errors tied to a single request.
    pub fn verb(&self) -> Option<Verb> {
        match self {
            Error::Apply { .. } => Some(Verb::Patch),
            Error::Get { .. } | Error::NotFound { .. } => Some(Verb::Get),
            Error::Delete { .. } => Some(Verb::Delete),
            Error::OfflineMode { verb } | Error::Cancelled { verb } => Some(*verb),
            _ => None,
        }
    }
}
