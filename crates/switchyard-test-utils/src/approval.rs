use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::ApprovalService;
use switchyard_core::types::ApprovalRequest;

/// An [`ApprovalService`] that answers from a queue and records every prompt.
///
/// When the queue runs dry it either never answers (`silent`) or reports a
/// closed channel.
pub struct ScriptedApproval {
    answers: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ApprovalRequest>>,
    silent_when_empty: bool,
}

impl ScriptedApproval {
    pub fn answering<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
            silent_when_empty: false,
        }
    }

    /// Never answers; useful for timeout and cancellation tests.
    pub fn silent() -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            silent_when_empty: true,
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ApprovalService for ScriptedApproval {
    fn ask(&self, request: &ApprovalRequest) -> BoxFuture<'_, Result<String>> {
        self.requests.lock().unwrap().push(request.clone());
        let answer = self.answers.lock().unwrap().pop_front();
        Box::pin(async move {
            match answer {
                Some(answer) => Ok(answer),
                None if self.silent_when_empty => futures::future::pending().await,
                None => Err(SwitchyardError::ApprovalClosed("no scripted answers left".into())),
            }
        })
    }
}
