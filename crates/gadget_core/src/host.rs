use shared::protocol::HostEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound side of the host frame. Cloning shares the same outbox.
#[derive(Clone)]
pub struct HostPort {
    outbox: mpsc::UnboundedSender<HostEvent>,
}

impl HostPort {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        (Self { outbox }, rx)
    }

    pub fn post(&self, event: HostEvent) {
        if let Err(err) = self.outbox.send(event) {
            debug!(event = ?err.0, "host: outbox closed, dropping event");
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.post(HostEvent::Error(message.into()));
    }
}
