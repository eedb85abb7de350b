//! Bounded waits for a JSONPath condition on a live object after it was applied.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::cancel::Cancellation;
use crate::client::is_not_found;
use crate::client::DynamicClient;
use crate::client::Verb;
use crate::error::Error;
use crate::error::Result;
use crate::identity::ResourceIdentity;
use crate::jsonpath::text;
use crate::jsonpath::JsonPath;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Waits until `jsonpath` resolves to `value`, or to anything non-empty when `value` is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitCondition {
    pub jsonpath: String,
    pub value: Option<String>,
    /// Seconds. Unset means 30s, zero a single check and a negative value up to one week.
    pub timeout: Option<i64>,
}

impl WaitCondition {
    pub fn new(jsonpath: impl Into<String>) -> Self {
        Self {
            jsonpath: jsonpath.into(),
            value: None,
            timeout: None,
        }
    }

    pub fn equals(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn within(mut self, seconds: i64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn deadline(&self) -> Duration {
        match self.timeout {
            None => DEFAULT_TIMEOUT,
            Some(seconds) if seconds < 0 => MAX_TIMEOUT,
            Some(seconds) => Duration::from_secs(seconds.unsigned_abs()),
        }
    }

    fn is_met(&self, path: &JsonPath, object: &Value) -> bool {
        let actual = path.resolve(object).map(text).unwrap_or_default();
        match &self.value {
            Some(expected) => actual == *expected,
            None => !actual.is_empty(),
        }
    }
}

/// Polls an object until every condition holds.
pub struct Waiter<'a, C: ?Sized> {
    client: &'a C,
    poll_interval: Duration,
}

impl<'a, C> Waiter<'a, C>
where
    C: DynamicClient + ?Sized,
{
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Checks the conditions one after another, each against its own deadline.
    pub async fn wait(
        &self,
        identity: &ResourceIdentity,
        conditions: &[WaitCondition],
        cancellation: &Cancellation,
    ) -> Result<()> {
        for condition in conditions {
            self.wait_for(identity, condition, cancellation).await?;
        }
        Ok(())
    }

    async fn wait_for(
        &self,
        identity: &ResourceIdentity,
        condition: &WaitCondition,
        cancellation: &Cancellation,
    ) -> Result<()> {
        let path = JsonPath::parse(&condition.jsonpath).map_err(|e| Error::UserInput(e.to_string()))?;
        let timeout = condition.deadline();
        let started = Instant::now();

        log::debug!(resource:% = identity, jsonpath:% = condition.jsonpath, timeout:? = timeout; "Waiting for condition");

        loop {
            let observed = match cancellation.run(Verb::Get, self.client.get(identity)).await? {
                Ok(object) => serde_json::to_value(&object).map_err(|e| Error::Decode {
                    kind: identity.kind.clone(),
                    message: e.to_string(),
                })?,
                Err(error) if is_not_found(&error) => Value::Null,
                Err(source) => {
                    return Err(Error::Get {
                        target: identity.to_string(),
                        source,
                    })
                }
            };

            if condition.is_met(&path, &observed) {
                log::debug!(resource:% = identity, jsonpath:% = condition.jsonpath; "Condition met");
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(Error::WaitTimeout {
                    target: identity.to_string(),
                    jsonpath: condition.jsonpath.clone(),
                    timeout,
                });
            }

            let pause = self.poll_interval.min(timeout - elapsed);
            cancellation.run(Verb::Get, tokio::time::sleep(pause)).await?;
        }
    }
}
