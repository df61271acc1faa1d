use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::ApprovalService;
use switchyard_core::types::{ApprovalRequest, ChatMessage, Role, WorkflowEvent};

use crate::node::{AgentNode, GateSpec};
use crate::sink::EventSink;

/// One human-gate invocation, ready to run on the scheduler.
pub(crate) struct GateRun {
    pub node_id: String,
    pub spec: GateSpec,
    /// Agent re-invoked with the rejected candidate.
    pub reroute: (String, AgentNode),
    pub approval: Arc<dyn ApprovalService>,
    pub approval_timeout: Option<Duration>,
    pub max_rounds: usize,
    pub node_timeout: Option<Duration>,
    pub sink: EventSink,
}

impl GateRun {
    /// Ask until the approver accepts a candidate, then return that candidate.
    ///
    /// Each rejection re-invokes the reroute agent with the rejected message
    /// as a user turn. Only this branch waits; other branches keep running.
    /// Alongside the result comes the id of every reroute agent that completed,
    /// once per re-invocation, whether or not the gate finally succeeded.
    pub async fn run(self, candidate: ChatMessage) -> (Result<ChatMessage>, Vec<String>) {
        let mut rerouted = Vec::new();
        let result = self.rounds(candidate, &mut rerouted).await;
        (result, rerouted)
    }

    async fn rounds(
        &self,
        mut candidate: ChatMessage,
        rerouted: &mut Vec<String>,
    ) -> Result<ChatMessage> {
        let mut rejections = 0;

        loop {
            let request = ApprovalRequest::new(&self.node_id, self.spec.render_prompt(&candidate.text()));
            let answer = self.approval.ask(&request);
            self.sink.emit(WorkflowEvent::ApprovalRequested {
                request_id: request.id.clone(),
                node_id: self.node_id.clone(),
                prompt: request.prompt.clone(),
            });

            let answer = match self.approval_timeout {
                Some(limit) => tokio::time::timeout(limit, answer).await.map_err(|_| {
                    SwitchyardError::ApprovalTimeout {
                        node_id: self.node_id.clone(),
                    }
                })??,
                None => answer.await?,
            };

            let approved = self.spec.is_approval(&answer);
            self.sink.emit(WorkflowEvent::ApprovalResolved {
                request_id: request.id.clone(),
                approved,
            });

            if approved {
                info!(node_id = %self.node_id, rejections, "Gate approved");
                return Ok(candidate);
            }

            rejections += 1;
            if rejections > self.max_rounds {
                return Err(SwitchyardError::ApprovalRoundsExceeded {
                    node_id: self.node_id.clone(),
                    rounds: rejections,
                });
            }

            let (agent_id, agent) = &self.reroute;
            warn!(node_id = %self.node_id, agent = %agent_id, answer = %answer.trim(), "Gate rejected, rerouting");

            let retry = ChatMessage::new(Role::User, candidate.content().to_vec());
            self.sink.emit(WorkflowEvent::NodeStarted {
                node_id: agent_id.clone(),
            });
            candidate = agent.invoke(agent_id, retry, &self.sink, self.node_timeout).await?;
            rerouted.push(agent_id.clone());
            self.sink.emit(WorkflowEvent::NodeCompleted {
                node_id: agent_id.clone(),
                message: candidate.clone(),
            });
        }
    }
}
