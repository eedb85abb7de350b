//! Read-only lookup of an existing object.

use crate::cancel::Cancellation;
use crate::client::DynamicClient;
use crate::error::Error;
use crate::error::Result;
use crate::reconciler::ReadOutcome;
use crate::reconciler::Reconciler;
use crate::state::ResourceState;

/// Fetches objects of one kind by name without managing them.
pub struct DataSource<C: ?Sized> {
    reconciler: Reconciler<C>,
}

impl<C> DataSource<C>
where
    C: DynamicClient + ?Sized,
{
    pub fn new(reconciler: Reconciler<C>) -> Self {
        Self { reconciler }
    }

    /// Looks up the object named by `selector.metadata`. Unlike a managed read, a missing
    /// object is an error.
    pub async fn fetch(&self, selector: &ResourceState, cancellation: &Cancellation) -> Result<ResourceState> {
        match self.reconciler.read(selector, cancellation).await? {
            ReadOutcome::Present(state) => Ok(state),
            ReadOutcome::Gone(identity) => Err(Error::NotFound {
                target: identity.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::MockClient;
    use crate::client::Verb;
    use crate::config::ProviderConfig;
    use crate::kind::KindDescriptor;
    use crate::schema::FieldTree;
    use crate::schema::FieldType;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn data_source(config: ProviderConfig, client: &MockClient) -> DataSource<MockClient> {
        let descriptor = KindDescriptor::namespaced("hive.openshift.io", "v1", "ClusterDeployment", "clusterdeployments")
            .with_schema(FieldTree::new().field("spec", FieldType::Any));
        DataSource::new(Reconciler::new(Arc::new(descriptor), Arc::new(config), Arc::new(client.clone())))
    }

    fn selector() -> ResourceState {
        ResourceState::named("east").in_namespace("hive")
    }

    #[tokio::test]
    async fn test_fetch_existing_object() {
        // Given: An object created by someone else
        let client = MockClient::new();
        let data_source = data_source(ProviderConfig::default(), &client);
        let identity = data_source.reconciler.descriptor().identity(&selector().metadata).unwrap();
        client.insert(
            &identity,
            json!({
                "apiVersion": "hive.openshift.io/v1",
                "kind": "ClusterDeployment",
                "metadata": { "name": "east", "namespace": "hive" },
                "spec": { "clusterName": "east", "baseDomain": "example.com" }
            }),
        );

        // When: Fetching it by name
        let state = data_source.fetch(&selector(), &Cancellation::never()).await.unwrap();

        // Then: Its current fields are returned
        assert_eq!(state.id.as_deref(), Some("hive/east"));
        assert_eq!(state.fields["spec"]["baseDomain"], "example.com");
        assert_eq!(client.calls(), vec![(Verb::Get, identity.to_string())]);
    }

    #[tokio::test]
    async fn test_fetch_missing_object_is_an_error() {
        let client = MockClient::new();
        let data_source = data_source(ProviderConfig::default(), &client);

        let result = data_source.fetch(&selector(), &Cancellation::never()).await;

        assert_matches!(result, Err(Error::NotFound { target }) if target.ends_with("/namespaces/hive/clusterdeployments/east"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_fetch() {
        // Given: A hanging API server
        let client = MockClient::new();
        client.block();
        let data_source = data_source(ProviderConfig::default(), &client);
        let (handle, cancellation) = Cancellation::new();

        // When: Cancelling while the lookup is in flight
        let selector = selector();
        let fetch = data_source.fetch(&selector, &cancellation);
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(fetch, cancel);

        // Then: The lookup reports the cancellation
        assert_matches!(result, Err(Error::Cancelled { verb: Verb::Get }));
    }

    #[tokio::test]
    async fn test_fetch_offline() {
        let client = MockClient::new();
        let data_source = data_source(ProviderConfig::offline(), &client);

        let result = data_source.fetch(&selector(), &Cancellation::never()).await;

        assert_matches!(result, Err(Error::OfflineMode { verb: Verb::Get }));
        assert!(client.calls().is_empty());
    }
}
