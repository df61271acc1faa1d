use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchyard_core::config::RunConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::event::EventBus;
use switchyard_core::traits::{ApprovalService, DenyAll};
use switchyard_core::types::{ChatMessage, RunId, WorkflowEvent};

use crate::aggregate::FanInBuffer;
use crate::gate::GateRun;
use crate::graph::Workflow;
use crate::node::{AgentNode, Node, NodeKind};
use crate::sink::EventSink;

/// Lazy, finite, non-restartable sequence of a run's events.
pub type EventStream = UnboundedReceiverStream<WorkflowEvent>;

/// Limits and collaborators for one run.
#[derive(Clone)]
pub struct RunOptions {
    pub node_timeout: Option<Duration>,
    pub run_timeout: Option<Duration>,
    pub approval_timeout: Option<Duration>,
    /// Rejections a human gate tolerates before failing.
    pub max_approval_rounds: usize,
    pub emit_partial_output: bool,
    pub approval: Arc<dyn ApprovalService>,
    /// Extra observers; the run's own event stream is always available.
    pub event_bus: Option<Arc<EventBus>>,
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl RunOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            node_timeout: secs(config.node_timeout_secs),
            run_timeout: secs(config.run_timeout_secs),
            approval_timeout: secs(config.approval_timeout_secs),
            max_approval_rounds: config.max_approval_rounds,
            emit_partial_output: config.emit_partial_output,
            approval: Arc::new(DenyAll),
            event_bus: None,
        }
    }

    pub fn with_approval(mut self, approval: Arc<dyn ApprovalService>) -> Self {
        self.approval = approval;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_node_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&RunConfig::default())
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub output: Option<ChatMessage>,
    /// Node ids in completion order.
    pub completed: Vec<String>,
    /// `(node_id, error)` for every failed node.
    pub failed: Vec<(String, String)>,
    pub elapsed_ms: u64,
}

/// Handle to a running workflow.
pub struct WorkflowRun {
    run_id: RunId,
    events: Option<EventStream>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<RunOutcome>>,
}

impl WorkflowRun {
    pub(crate) fn start(workflow: Workflow, input: ChatMessage, options: RunOptions) -> Self {
        let run_id = RunId::new();
        let cancel = CancellationToken::new();
        let (sink, rx) = EventSink::channel(options.event_bus.clone(), options.emit_partial_output);

        let scheduler = Scheduler {
            workflow,
            options,
            run_id: run_id.clone(),
            sink,
            cancel: cancel.clone(),
            queue: VecDeque::new(),
            buffers: HashMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            first_error: None,
            last_output: None,
            fired: HashSet::new(),
            started: Instant::now(),
        };
        let handle = tokio::spawn(scheduler.run(input));

        Self {
            run_id,
            events: Some(UnboundedReceiverStream::new(rx)),
            cancel,
            handle,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Take the event stream. Only the first call returns it.
    pub fn events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish.
    pub async fn outcome(self) -> Result<RunOutcome> {
        self.handle
            .await
            .map_err(|e| SwitchyardError::RunAborted(e.to_string()))?
    }
}

/// A message waiting to be handed to `node_id`.
struct Pending {
    node_id: String,
    from: Option<String>,
    message: ChatMessage,
}

/// A finished node invocation. `rerouted` lists agents a gate re-ran on the way.
struct Settled {
    node_id: String,
    result: Result<ChatMessage>,
    rerouted: Vec<String>,
}

type InFlight = FuturesUnordered<BoxFuture<'static, Settled>>;

/// Per-run state. Nodes themselves are shared and never mutated.
struct Scheduler {
    workflow: Workflow,
    options: RunOptions,
    run_id: RunId,
    sink: EventSink,
    cancel: CancellationToken,
    queue: VecDeque<Pending>,
    buffers: HashMap<String, FanInBuffer>,
    completed: Vec<String>,
    failed: Vec<(String, String)>,
    first_error: Option<SwitchyardError>,
    last_output: Option<ChatMessage>,
    fired: HashSet<String>,
    started: Instant,
}

impl Scheduler {
    async fn run(mut self, input: ChatMessage) -> Result<RunOutcome> {
        info!(run_id = %self.run_id, workflow = %self.workflow.name(), "Workflow run started");
        self.sink.emit(WorkflowEvent::RunStarted {
            run_id: self.run_id.clone(),
        });

        self.queue.push_back(Pending {
            node_id: self.workflow.start().to_string(),
            from: None,
            message: input,
        });

        let mut in_flight: InFlight = FuturesUnordered::new();
        let cancel = self.cancel.clone();
        let run_timeout = self.options.run_timeout;
        let deadline = async move {
            match run_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => futures::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            while let Some(pending) = self.queue.pop_front() {
                if cancel.is_cancelled() {
                    return self.cancelled();
                }
                self.dispatch(pending, &mut in_flight);
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                _ = &mut deadline => {
                    let limit_ms = run_timeout.map(|d| d.as_millis() as u64).unwrap_or_default();
                    error!(run_id = %self.run_id, limit_ms, "Workflow run timed out");
                    return Err(SwitchyardError::RunTimeout(limit_ms));
                }
                Some(settled) = in_flight.next() => {
                    self.completed.extend(settled.rerouted);
                    self.settle(settled.node_id, settled.result);
                }
            }
        }

        self.finish()
    }

    fn dispatch(&mut self, pending: Pending, in_flight: &mut InFlight) {
        let Some(node) = self.workflow.node_arc(&pending.node_id) else {
            warn!(node_id = %pending.node_id, "Dropping message for unknown node");
            return;
        };

        match &node.kind {
            NodeKind::Aggregate { .. } => {
                let source = pending.from.unwrap_or_default();
                let expected = self.workflow.arity(&node.id).unwrap_or(1);
                let buffer = self
                    .buffers
                    .entry(node.id.clone())
                    .or_insert_with(|| FanInBuffer::new(node.id.as_str(), expected));
                if let Some(joined) = buffer.deliver(&source, pending.message) {
                    self.started(&node.id);
                    self.complete(&node.id, joined);
                }
            }
            NodeKind::Broadcast => {
                self.started(&node.id);
                self.complete(&node.id, pending.message);
            }
            NodeKind::Agent(agent) => {
                self.started(&node.id);
                let agent = agent.clone();
                let sink = self.sink.clone();
                let timeout = self.options.node_timeout;
                let node_id = node.id.clone();
                in_flight.push(Box::pin(async move {
                    let result = agent.invoke(&node_id, pending.message, &sink, timeout).await;
                    Settled {
                        node_id,
                        result,
                        rerouted: Vec::new(),
                    }
                }));
            }
            NodeKind::HumanGate(spec) => {
                let Some(reroute) = self.reroute_agent(&node) else {
                    self.fail(
                        &node.id,
                        SwitchyardError::Config(format!("gate '{}' has no reroute agent", node.id)),
                    );
                    return;
                };
                self.started(&node.id);
                let gate = GateRun {
                    node_id: node.id.clone(),
                    spec: spec.clone(),
                    reroute,
                    approval: self.options.approval.clone(),
                    approval_timeout: self.options.approval_timeout,
                    max_rounds: self.options.max_approval_rounds,
                    node_timeout: self.options.node_timeout,
                    sink: self.sink.clone(),
                };
                let node_id = node.id.clone();
                in_flight.push(Box::pin(async move {
                    let (result, rerouted) = gate.run(pending.message).await;
                    Settled {
                        node_id,
                        result,
                        rerouted,
                    }
                }));
            }
        }
    }

    fn reroute_agent(&self, gate: &Node) -> Option<(String, AgentNode)> {
        let target = self.workflow.reroute_target(&gate.id)?;
        let agent = self.workflow.node(target)?.as_agent()?.clone();
        Some((target.to_string(), agent))
    }

    fn started(&self, node_id: &str) {
        debug!(run_id = %self.run_id, node_id, "Node started");
        self.sink.emit(WorkflowEvent::NodeStarted {
            node_id: node_id.to_string(),
        });
    }

    fn settle(&mut self, node_id: String, result: Result<ChatMessage>) {
        match result {
            Ok(message) => self.complete(&node_id, message),
            Err(e) => self.fail(&node_id, e),
        }
    }

    /// Record a node's value and stage one copy per outgoing edge. All copies
    /// are queued together, so every target is released in the same turn.
    fn complete(&mut self, node_id: &str, message: ChatMessage) {
        info!(run_id = %self.run_id, node_id, "Node completed");
        self.completed.push(node_id.to_string());
        self.sink.emit(WorkflowEvent::NodeCompleted {
            node_id: node_id.to_string(),
            message: message.clone(),
        });

        if self.emits_output(node_id) {
            self.sink.emit(WorkflowEvent::WorkflowOutput {
                node_id: node_id.to_string(),
                value: message.clone(),
            });
        }
        if self.is_final(node_id) {
            self.fired.insert(node_id.to_string());
            self.last_output = Some(message.clone());
        }

        let staged: Vec<Pending> = self
            .workflow
            .outgoing(node_id)
            .map(|edge| Pending {
                node_id: edge.to.clone(),
                from: Some(node_id.to_string()),
                message: message.clone(),
            })
            .collect();
        self.queue.extend(staged);
    }

    fn fail(&mut self, node_id: &str, error: SwitchyardError) {
        warn!(run_id = %self.run_id, node_id, error = %error, "Node failed");
        self.sink.emit(WorkflowEvent::NodeFailed {
            node_id: node_id.to_string(),
            error: error.to_string(),
        });
        self.failed.push((node_id.to_string(), error.to_string()));
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    /// Designated outputs publish `WorkflowOutput`; without designations,
    /// terminal nodes and aggregates do.
    fn emits_output(&self, node_id: &str) -> bool {
        let outputs = self.workflow.outputs();
        if outputs.is_empty() {
            self.workflow.is_terminal(node_id)
                || matches!(self.workflow.kind_of(node_id), Some(NodeKind::Aggregate { .. }))
        } else {
            outputs.iter().any(|id| id == node_id)
        }
    }

    /// Whether this node's value can become the run's final output.
    fn is_final(&self, node_id: &str) -> bool {
        let outputs = self.workflow.outputs();
        if outputs.is_empty() {
            self.workflow.is_terminal(node_id)
        } else {
            outputs.iter().any(|id| id == node_id)
        }
    }

    fn cancelled(self) -> Result<RunOutcome> {
        info!(run_id = %self.run_id, completed = self.completed.len(), "Workflow run cancelled");
        self.sink.emit(WorkflowEvent::Cancelled);
        Err(SwitchyardError::Cancelled)
    }

    fn finish(self) -> Result<RunOutcome> {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;

        // Designated outputs that never fired, plus joins left half full.
        let outputs = self.workflow.outputs();
        let mut waiting: Vec<String> = outputs
            .iter()
            .filter(|id| !self.fired.contains(*id))
            .cloned()
            .collect();
        waiting.extend(
            self.buffers
                .iter()
                .filter(|(_, buf)| buf.is_waiting())
                .map(|(id, _)| id.clone()),
        );
        waiting.sort();
        waiting.dedup();

        if !waiting.is_empty() {
            error!(run_id = %self.run_id, ?waiting, failed = self.failed.len(), "Workflow run incomplete");
            return Err(SwitchyardError::RunIncomplete {
                waiting,
                failed: self.failed,
            });
        }

        if self.last_output.is_none() {
            if let Some(error) = self.first_error {
                error!(run_id = %self.run_id, error = %error, "Workflow run failed");
                return Err(error);
            }
        }

        info!(
            run_id = %self.run_id,
            completed = self.completed.len(),
            failed = self.failed.len(),
            elapsed_ms,
            "Workflow run finished"
        );
        Ok(RunOutcome {
            run_id: self.run_id,
            output: self.last_output,
            completed: self.completed,
            failed: self.failed,
            elapsed_ms,
        })
    }
}
