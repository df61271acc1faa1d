use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::ApprovalService;
use switchyard_core::types::ApprovalRequest;

type Pending = HashMap<String, (ApprovalRequest, oneshot::Sender<String>)>;

/// Approval service fed by whoever watches the run.
///
/// A gate's `ask` parks a oneshot here under the request id (the same id the
/// run publishes in its `ApprovalRequested` event); a watcher answers with
/// [`ApprovalBroker::respond`]. Requests whose gate gave up are dropped.
#[derive(Default)]
pub struct ApprovalBroker {
    pending: Mutex<Pending>,
}

impl ApprovalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer a pending request. Returns true if the request was found and resolved.
    pub fn respond(&self, request_id: &str, answer: impl Into<String>) -> bool {
        let entry = self.lock().remove(request_id);
        match entry {
            Some((_req, tx)) => tx.send(answer.into()).is_ok(),
            None => false,
        }
    }

    /// List all pending requests.
    pub fn pending_requests(&self) -> Vec<ApprovalRequest> {
        let mut requests: Vec<_> = self.lock().values().map(|(req, _)| req.clone()).collect();
        requests.sort_by_key(|req| req.timestamp);
        requests
    }

    /// Find a pending request by prefix match on the id.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<String> {
        self.lock().keys().find(|key| key.starts_with(prefix)).cloned()
    }
}

/// Removes the pending entry when the waiting gate goes away.
struct Registration<'a> {
    broker: &'a ApprovalBroker,
    id: String,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.broker.lock().remove(&self.id);
    }
}

impl ApprovalService for ApprovalBroker {
    fn ask(&self, request: &ApprovalRequest) -> BoxFuture<'_, Result<String>> {
        // Register before returning so a fast watcher cannot miss the request.
        let (tx, rx) = oneshot::channel();
        self.lock()
            .insert(request.id.clone(), (request.clone(), tx));
        let registration = Registration {
            broker: self,
            id: request.id.clone(),
        };

        Box::pin(async move {
            let _registration = registration;
            rx.await
                .map_err(|_| SwitchyardError::ApprovalClosed("approval request dropped".into()))
        })
    }
}
