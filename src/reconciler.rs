//! Converges one object of a kind towards its declared state with server-side apply.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::Cancellation;
use crate::client::is_not_found;
use crate::client::DynamicClient;
use crate::client::Verb;
use crate::config::ProviderConfig;
use crate::error::Error;
use crate::error::Result;
use crate::identity::ImportId;
use crate::identity::ResourceIdentity;
use crate::kind::KindDescriptor;
use crate::state::Metadata;
use crate::state::ResourceState;
use crate::wait::Waiter;
use crate::wait::DEFAULT_POLL_INTERVAL;

/// Result of reading a managed object.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The object exists; state refreshed from the server.
    Present(ResourceState),
    /// The object was deleted out of band and should be dropped from tracked state.
    Gone(ResourceIdentity),
}

/// Create/Read/Update/Delete/Import for every object of one kind.
///
/// Each call takes the caller's state by reference and returns a fresh one, so a failed call
/// leaves the caller's state untouched.
pub struct Reconciler<C: ?Sized> {
    descriptor: Arc<KindDescriptor>,
    config: Arc<ProviderConfig>,
    client: Arc<C>,
    poll_interval: Duration,
}

impl<C> Reconciler<C>
where
    C: DynamicClient + ?Sized,
{
    pub fn new(descriptor: Arc<KindDescriptor>, config: Arc<ProviderConfig>, client: Arc<C>) -> Self {
        Self {
            descriptor,
            config,
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how often `wait_for` conditions are polled.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn descriptor(&self) -> &KindDescriptor {
        &self.descriptor
    }

    /// Applies the desired state and returns it as persisted by the server, with `id` derived
    /// from the server's metadata.
    pub async fn create(&self, desired: &ResourceState, cancellation: &Cancellation) -> Result<ResourceState> {
        self.apply(desired, cancellation).await
    }

    /// Refreshes state from the server. A missing object is not an error.
    pub async fn read(&self, current: &ResourceState, cancellation: &Cancellation) -> Result<ReadOutcome> {
        self.config.ensure_online(Verb::Get)?;
        let identity = self.descriptor.identity(&current.metadata)?;

        log::debug!(resource:% = identity; "Reading object");
        match cancellation.run(Verb::Get, self.client.get(&identity)).await? {
            Ok(object) => Ok(ReadOutcome::Present(self.descriptor.decode(object, current)?)),
            Err(error) if is_not_found(&error) => {
                log::warn!(resource:% = identity; "Object no longer exists");
                Ok(ReadOutcome::Gone(identity))
            }
            Err(source) => Err(request_error(Verb::Get, &identity, source)),
        }
    }

    /// Applies the desired state of an existing object. Like [`Reconciler::create`], the
    /// returned `id` always follows the server's metadata.
    pub async fn update(&self, desired: &ResourceState, cancellation: &Cancellation) -> Result<ResourceState> {
        self.apply(desired, cancellation).await
    }

    /// Deletes the object. Deleting an object that is already gone succeeds.
    pub async fn delete(&self, current: &ResourceState, cancellation: &Cancellation) -> Result<()> {
        self.config.ensure_online(Verb::Delete)?;
        let identity = self.descriptor.identity(&current.metadata)?;

        log::debug!(resource:% = identity; "Deleting object");
        match cancellation.run(Verb::Delete, self.client.delete(&identity)).await? {
            Ok(()) => {
                log::info!(resource:% = identity; "Deleted object");
                Ok(())
            }
            Err(error) if is_not_found(&error) => {
                log::debug!(resource:% = identity; "Object was already deleted");
                Ok(())
            }
            Err(source) => Err(request_error(Verb::Delete, &identity, source)),
        }
    }

    /// Seeds a state from an import identifier so that a following [`Reconciler::read`] can
    /// fill in the rest. Works offline.
    pub fn import(&self, raw_id: &str) -> Result<ResourceState> {
        let id = ImportId::parse(raw_id, self.descriptor.scope)?;

        Ok(ResourceState {
            id: Some(id.composite_id()),
            api_version: Some(self.descriptor.api_version()),
            kind: Some(self.descriptor.kind.clone()),
            metadata: Metadata {
                name: Some(id.name),
                namespace: id.namespace,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn apply(&self, desired: &ResourceState, cancellation: &Cancellation) -> Result<ResourceState> {
        self.config.ensure_online(Verb::Patch)?;
        let identity = self.descriptor.identity(&desired.metadata)?;
        let payload = self.descriptor.encode(desired)?;
        let params = self.config.apply_params(desired);

        log::debug!(resource:% = identity, params:serde = params; "Applying object");
        let object = cancellation
            .run(Verb::Patch, self.client.apply(&identity, &payload, &params))
            .await?
            .map_err(|source| request_error(Verb::Patch, &identity, source))?;

        let state = self.descriptor.decode(object, desired)?;
        log::info!(resource:% = identity; "Applied object");

        if !desired.wait_for.is_empty() {
            Waiter::new(self.client.as_ref())
                .with_poll_interval(self.poll_interval)
                .wait(&identity, &desired.wait_for, cancellation)
                .await?;
        }

        Ok(state)
    }
}

/// Wraps a failed request. Responses the client could not deserialize are decode errors, not
/// server rejections.
pub(crate) fn request_error(verb: Verb, identity: &ResourceIdentity, source: kube::Error) -> Error {
    let target = identity.to_string();
    match (verb, source) {
        (_, kube::Error::SerdeError(error)) => Error::Decode {
            kind: identity.kind.clone(),
            message: error.to_string(),
        },
        (Verb::Get, source) => Error::Get { target, source },
        (Verb::Patch, source) => Error::Apply { target, source },
        (Verb::Delete, source) => Error::Delete { target, source },
    }
}
