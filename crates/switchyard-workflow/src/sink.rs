use std::sync::Arc;

use tokio::sync::mpsc;

use switchyard_core::event::EventBus;
use switchyard_core::types::WorkflowEvent;

/// Where a run writes its events: the run's own watcher channel, plus an
/// optional shared bus for any number of extra observers.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
    bus: Option<Arc<EventBus>>,
    emit_partial: bool,
}

impl EventSink {
    pub fn channel(
        bus: Option<Arc<EventBus>>,
        emit_partial: bool,
    ) -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                bus,
                emit_partial,
            },
            rx,
        )
    }

    pub fn emit(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event.clone());
        }
        // Watcher may have dropped its stream
        let _ = self.tx.send(event);
    }

    /// Forward a streamed text chunk, unless partial output is switched off.
    pub fn partial(&self, node_id: &str, text_delta: &str) {
        if self.emit_partial {
            self.emit(WorkflowEvent::PartialOutput {
                node_id: node_id.to_string(),
                text_delta: text_delta.to_string(),
            });
        }
    }
}
