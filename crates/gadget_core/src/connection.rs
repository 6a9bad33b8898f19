//! Lifecycle of the websocket link to the collaboration peer.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use futures::{stream::SplitStream, SinkExt, StreamExt};
use shared::{
    domain::TransportProtocol,
    protocol::{HostEvent, PeerFrame},
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::TransportError,
    host::HostPort,
    store::{Action, StateStore},
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type PeerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    /// Upper bound on waiting for the peer to finish a close handshake.
    pub close_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

struct PeerLink {
    address: String,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

struct ReaderContext {
    address: String,
    store: StateStore,
    host: HostPort,
    peer_frames: mpsc::UnboundedSender<PeerFrame>,
    open: Arc<AtomicBool>,
}

/// Owns the single peer link.
///
/// Rebuilds are serialized: a reconnect waits for any in-flight rebuild, then
/// closes the current link and waits for its reader to finish before dialing,
/// so two sockets are never open at once.
pub struct ConnectionManager {
    store: StateStore,
    host: HostPort,
    options: ConnectionOptions,
    peer_frames: mpsc::UnboundedSender<PeerFrame>,
    link: StdMutex<Option<PeerLink>>,
    rebuild: Mutex<()>,
}

impl ConnectionManager {
    /// Returns the manager and the receiving end for decoded peer frames.
    pub fn new(
        store: StateStore,
        host: HostPort,
        options: ConnectionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<PeerFrame>) {
        let (peer_frames, peer_rx) = mpsc::unbounded_channel();
        (
            Self {
                store,
                host,
                options,
                peer_frames,
                link: StdMutex::new(None),
                rebuild: Mutex::new(()),
            },
            peer_rx,
        )
    }

    pub async fn reconnect(
        &self,
        address: &str,
        protocol: TransportProtocol,
    ) -> Result<(), TransportError> {
        let _rebuild = self.rebuild.lock().await;
        self.shutdown_link().await;

        if !protocol.is_socket() {
            debug!(address, ?protocol, "connection: transport disabled, staying offline");
            return Ok(());
        }

        match self.open_stream(address).await {
            Ok(stream) => {
                // Publish the connected state before the reader can report a close.
                self.store.dispatch(Action::ServerConnected);
                self.host.post(HostEvent::ServerConnected);
                let link = self.attach(address, stream);
                *self.link_slot() = Some(link);
                info!(address, "connection: peer connected");
                Ok(())
            }
            Err(err) => {
                warn!(address, error = %err, "connection: connect failed");
                self.store.dispatch(Action::ServerError(err.detail()));
                self.host.error(err.to_string());
                Err(err)
            }
        }
    }

    /// Queues `frame` for the peer. Dropped silently while no link is open.
    pub fn send(&self, frame: &PeerFrame) {
        let slot = self.link_slot();
        let Some(link) = slot
            .as_ref()
            .filter(|link| link.open.load(Ordering::SeqCst))
        else {
            debug!(kind = frame.kind(), "connection: offline, dropping frame");
            return;
        };

        match serde_json::to_string(frame) {
            Ok(text) => {
                if link.outbound.send(Message::Text(text)).is_err() {
                    debug!(kind = frame.kind(), "connection: writer gone, dropping frame");
                }
            }
            Err(err) => warn!(kind = frame.kind(), error = %err, "connection: failed to encode frame"),
        }
    }

    pub fn is_open(&self) -> bool {
        self.link_slot()
            .as_ref()
            .is_some_and(|link| link.open.load(Ordering::SeqCst))
    }

    pub async fn close(&self) {
        let _rebuild = self.rebuild.lock().await;
        self.shutdown_link().await;
    }

    fn link_slot(&self) -> MutexGuard<'_, Option<PeerLink>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn open_stream(&self, address: &str) -> Result<PeerStream, TransportError> {
        let url = parse_address(address)?;
        match timeout(self.options.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(err)) => Err(TransportError::Connect(err.to_string())),
            Err(_) => Err(TransportError::ConnectTimeout {
                address: address.to_string(),
                timeout: self.options.connect_timeout,
            }),
        }
    }

    fn attach(&self, address: &str, stream: PeerStream) -> PeerLink {
        let (mut sink, source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let open = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(err) = sink.send(message).await {
                    debug!(error = %err, "connection: write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader = tokio::spawn(read_peer_frames(
            source,
            ReaderContext {
                address: address.to_string(),
                store: self.store.clone(),
                host: self.host.clone(),
                peer_frames: self.peer_frames.clone(),
                open: Arc::clone(&open),
            },
        ));

        PeerLink {
            address: address.to_string(),
            outbound,
            open,
            writer,
            reader,
        }
    }

    /// Closes the current link, if any, and waits for the close to complete.
    async fn shutdown_link(&self) {
        let Some(link) = self.link_slot().take() else {
            return;
        };
        let PeerLink {
            address,
            outbound,
            open,
            writer,
            mut reader,
        } = link;

        open.store(false, Ordering::SeqCst);
        self.store.dispatch(Action::ServerDisconnected);
        let _ = outbound.send(Message::Close(None));
        drop(outbound);

        if timeout(self.options.close_timeout, &mut reader).await.is_err() {
            warn!(
                %address,
                timeout = ?self.options.close_timeout,
                "connection: peer did not finish closing, aborting reader"
            );
            reader.abort();
        }
        if !writer.is_finished() {
            writer.abort();
        }
        info!(%address, "connection: link closed");
    }
}

async fn read_peer_frames(mut source: SplitStream<PeerStream>, ctx: ReaderContext) {
    let mut failure = None;
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<PeerFrame>(&text) {
                Ok(frame) => {
                    debug!(kind = frame.kind(), "connection: peer frame received");
                    if ctx.peer_frames.send(frame).is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "connection: dropping undecodable peer frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                failure = Some(TransportError::Receive(err.to_string()));
                break;
            }
        }
    }

    // A local shutdown clears the flag first; only remote closes are reported here.
    if !ctx.open.swap(false, Ordering::SeqCst) {
        return;
    }
    match failure {
        Some(err) => {
            warn!(address = %ctx.address, error = %err, "connection: receive failed");
            ctx.store.dispatch(Action::ServerError(err.detail()));
            ctx.host.error(err.to_string());
        }
        None => {
            info!(address = %ctx.address, "connection: peer closed the link");
            ctx.store.dispatch(Action::ServerDisconnected);
        }
    }
}

fn parse_address(address: &str) -> Result<Url, TransportError> {
    let url = Url::parse(address).map_err(|err| TransportError::InvalidAddress {
        address: address.to_string(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        scheme => Err(TransportError::InvalidAddress {
            address: address.to_string(),
            reason: format!("unsupported scheme {scheme}"),
        }),
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
