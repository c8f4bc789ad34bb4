use docgen_core::WorkflowEvent;
use tokio::sync::mpsc;

/// Default bound of the per-execution event queue.
const DEFAULT_CAPACITY: usize = 64;

/// Sender half of a workflow execution's event queue.
///
/// `emit` awaits when the queue is full (back-pressure briefly blocks the
/// node) and never drops an event while the receiver lives. Events are
/// delivered strictly FIFO.
#[derive(Clone)]
pub struct ProgressBus {
    tx: mpsc::Sender<WorkflowEvent>,
}

impl ProgressBus {
    pub async fn emit(&self, event: WorkflowEvent) {
        if self.tx.send(event).await.is_err() {
            // Receiver gone: the client disconnected; the runtime will
            // observe cancellation separately.
            tracing::debug!("progress receiver dropped, event discarded");
        }
    }
}

/// Create the bounded FIFO queue for one workflow execution.
pub fn progress_channel() -> (ProgressBus, mpsc::Receiver<WorkflowEvent>) {
    let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
    (ProgressBus { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgen_core::{ProgressEvent, StepGroup};

    fn progress(n: u8) -> WorkflowEvent {
        WorkflowEvent::Progress(ProgressEvent {
            status: StepGroup::Parsing,
            progress: n,
            message: format!("step {n}"),
        })
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (bus, mut rx) = progress_channel();
        for n in 0..10 {
            bus.emit(progress(n)).await;
        }
        drop(bus);
        let mut seen = Vec::new();
        while let Some(WorkflowEvent::Progress(p)) = rx.recv().await {
            seen.push(p.progress);
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_emit_after_receiver_drop_is_silent() {
        let (bus, rx) = progress_channel();
        drop(rx);
        bus.emit(progress(1)).await;
    }
}
