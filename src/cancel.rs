//! Caller driven cancellation of in-flight requests.

use std::future::Future;

use futures::future::Either;
use tokio::sync::watch;

use crate::client::Verb;
use crate::error::Error;
use crate::error::Result;

/// Cancels every [`Cancellation`] created alongside it.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// A cloneable signal every network-issuing operation listens to.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    receiver: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    pub fn new() -> (CancelHandle, Self) {
        let (sender, receiver) = watch::channel(false);
        (CancelHandle { sender }, Self { receiver: Some(receiver) })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().is_some_and(|receiver| *receiver.borrow())
    }

    /// Resolves once cancelled. A dropped [`CancelHandle`] that never cancelled never resolves.
    pub async fn cancelled(&self) {
        let Some(receiver) = &self.receiver else {
            return futures::future::pending().await;
        };
        let mut receiver = receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }

    /// Drives `request` to completion unless cancelled first. A request is never started once
    /// the signal has fired, and an in-flight one is dropped.
    pub async fn run<F, T>(&self, verb: Verb, request: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled { verb });
        }

        let request = std::pin::pin!(request);
        let cancelled = std::pin::pin!(self.cancelled());
        match futures::future::select(request, cancelled).await {
            Either::Left((output, _)) => Ok(output),
            Either::Right(((), _)) => Err(Error::Cancelled { verb }),
        }
    }
}
