use std::sync::Arc;

use tokio::spawn;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::events::{AuditEvent, AuditSink};

enum Message {
    Event(AuditEvent),
    Flush(oneshot::Sender<()>)
}

/// Fire-and-forget delivery of audit events to a set of sinks.
///
/// Events go through a single FIFO queue drained by one background task, so the
/// delivery order for an account matches the order its commits were emitted in.
/// A failing sink is logged and skipped; it never reaches back into the ledger.
pub struct AuditEmitter {
    sender: Option<mpsc::UnboundedSender<Message>>
}

impl AuditEmitter {
    /// Spawns the delivery task. Must be called from within a tokio runtime.
    pub fn spawn(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();

        spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    Message::Event(event) => {
                        for sink in &sinks {
                            if let Err(error) = sink.publish(&event) {
                                warn!("Sink [{}] dropped audit event for account [{}]: {error}", sink.name(), event.account_id);
                            }
                        }
                    }
                    Message::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }

            debug!("Audit emitter stopped");
        });

        Self { sender: Some(sender) }
    }

    /// An emitter that discards every event.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: AuditEvent) {
        let Some(sender) = &self.sender else {
            return
        };

        if sender.send(Message::Event(event)).is_err() {
            warn!("Audit emitter is closed, event dropped");
        }
    }

    /// Waits until every event emitted before this call has been offered to the sinks.
    pub async fn flush(&self) {
        let Some(sender) = &self.sender else {
            return
        };

        let (done, wait) = oneshot::channel();

        if sender.send(Message::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}
