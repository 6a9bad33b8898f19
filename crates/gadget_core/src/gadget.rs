use std::sync::Arc;

use shared::protocol::{HostEnvelope, HostEvent, PeerFrame};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    bridge::MessageBridge,
    config::GadgetSettings,
    connection::ConnectionManager,
    engine::DocumentEngine,
    host::HostPort,
    registry::{CommandRegistry, SuggestionItem},
    store::{SessionState, StateStore},
};

/// A running gadget instance.
///
/// Host messages and peer frames are consumed by a single task in arrival
/// order, so a handler always sees the effects of the ones before it.
pub struct Gadget {
    inbox: Option<mpsc::UnboundedSender<HostEnvelope>>,
    shutdown: Option<oneshot::Sender<()>>,
    dispatch: Option<JoinHandle<()>>,
    connection: Arc<ConnectionManager>,
    registry: CommandRegistry,
    store: StateStore,
}

impl Gadget {
    /// Starts the dispatch task. Must be called inside a tokio runtime.
    pub fn launch(
        settings: GadgetSettings,
        engine: Arc<dyn DocumentEngine>,
    ) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let store = StateStore::new(settings.session_state());
        let (host, host_rx) = HostPort::new();
        let (connection, peer_rx) =
            ConnectionManager::new(store.clone(), host.clone(), settings.connection_options());
        let connection = Arc::new(connection);
        let bridge = MessageBridge::new(
            store.clone(),
            Arc::clone(&engine),
            Arc::clone(&connection),
            host.clone(),
        );
        let registry = CommandRegistry::new(store.clone(), engine);

        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();

        host.post(HostEvent::GadgetReady);
        info!(
            address = %settings.server_address,
            protocol = ?settings.transport_protocol,
            "gadget: ready"
        );
        let dispatch = tokio::spawn(run_dispatch(
            bridge,
            settings.connect_on_launch,
            inbox_rx,
            peer_rx,
            shutdown_rx,
        ));

        (
            Self {
                inbox: Some(inbox),
                shutdown: Some(shutdown),
                dispatch: Some(dispatch),
                connection,
                registry,
                store,
            },
            host_rx,
        )
    }

    /// Queues a host message. Messages posted after `destroy` are dropped.
    pub fn post(&self, envelope: HostEnvelope) {
        let Some(inbox) = &self.inbox else {
            debug!("gadget: destroyed, dropping host message");
            return;
        };
        if inbox.send(envelope).is_err() {
            debug!("gadget: dispatch stopped, dropping host message");
        }
    }

    pub fn slash_menu_items(&self, query: &str) -> Vec<SuggestionItem> {
        self.registry.query(query)
    }

    pub fn state(&self) -> SessionState {
        self.store.snapshot()
    }

    /// Stops accepting messages, lets the running handler finish and closes
    /// the peer link.
    pub async fn destroy(&mut self) {
        self.inbox.take();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(dispatch) = self.dispatch.take() {
            if let Err(err) = dispatch.await {
                warn!(error = %err, "gadget: dispatch task ended abnormally");
            }
        }
        self.connection.close().await;
        info!("gadget: destroyed");
    }
}

async fn run_dispatch(
    bridge: MessageBridge,
    connect_on_launch: bool,
    mut inbox: mpsc::UnboundedReceiver<HostEnvelope>,
    mut peer_frames: mpsc::UnboundedReceiver<PeerFrame>,
    mut shutdown: oneshot::Receiver<()>,
) {
    if connect_on_launch {
        tokio::select! {
            biased;
            _ = &mut shutdown => return,
            result = bridge.connect_from_state() => {
                if let Err(err) = result {
                    warn!(error = %err, "gadget: initial connect failed, running offline");
                }
            }
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            envelope = inbox.recv() => match envelope {
                Some(envelope) => bridge.handle(envelope).await,
                None => break,
            },
            Some(frame) = peer_frames.recv() => bridge.handle_peer(frame).await,
        }
    }
    debug!("gadget: dispatch loop stopped");
}

#[cfg(test)]
#[path = "tests/gadget_tests.rs"]
mod tests;
