use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use shared::protocol::{HostEvent, PeerFrame};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, Mutex},
};

#[derive(Debug, Clone)]
pub enum PeerCommand {
    Push(String),
    Close,
}

#[derive(Clone)]
struct PeerState {
    received: mpsc::UnboundedSender<PeerFrame>,
    commands: broadcast::Sender<PeerCommand>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
}

/// Websocket peer bound to an ephemeral local port.
pub struct TestPeer {
    pub address: String,
    received: Mutex<mpsc::UnboundedReceiver<PeerFrame>>,
    commands: broadcast::Sender<PeerCommand>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
}

impl TestPeer {
    pub async fn spawn() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (commands, _) = broadcast::channel(64);
        let state = PeerState {
            received: received_tx,
            commands: commands.clone(),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            accepted: Arc::new(AtomicUsize::new(0)),
        };
        let peer = Self {
            address: format!("ws://{addr}/collab"),
            received: Mutex::new(received_rx),
            commands,
            live: Arc::clone(&state.live),
            max_live: Arc::clone(&state.max_live),
            accepted: Arc::clone(&state.accepted),
        };
        let app = Router::new()
            .route("/collab", get(peer_upgrade))
            .with_state(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(peer)
    }

    pub fn push_frame(&self, frame: &PeerFrame) {
        let text = serde_json::to_string(frame).expect("encode frame");
        self.push_raw(text);
    }

    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.commands.send(PeerCommand::Push(text.into()));
    }

    pub fn close_sessions(&self) {
        let _ = self.commands.send(PeerCommand::Close);
    }

    pub async fn next_frame(&self) -> PeerFrame {
        let mut received = self.received.lock().await;
        tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .expect("peer frame timeout")
            .expect("peer channel closed")
    }

    pub async fn assert_no_frame(&self) {
        let mut received = self.received.lock().await;
        let next = tokio::time::timeout(Duration::from_millis(150), received.recv()).await;
        assert!(next.is_err(), "unexpected peer frame: {next:?}");
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub async fn wait_for_accepted(&self, count: usize) {
        eventually(move || async move { self.accepted() >= count }).await;
    }

    pub async fn wait_for_live(&self, count: usize) {
        eventually(move || async move { self.live() == count }).await;
    }
}

async fn peer_upgrade(ws: WebSocketUpgrade, State(state): State<PeerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| peer_session(state, socket))
}

async fn peer_session(state: PeerState, mut socket: WebSocket) {
    let mut commands = state.commands.subscribe();
    let live = state.live.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_live.fetch_max(live, Ordering::SeqCst);
    state.accepted.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Ok(frame) = serde_json::from_str::<PeerFrame>(&text) {
                        let _ = state.received.send(frame);
                    }
                }
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            command = commands.recv() => match command {
                Ok(PeerCommand::Push(text)) => {
                    if socket.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(PeerCommand::Close) => {
                    let _ = socket.send(WsMessage::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    state.live.fetch_sub(1, Ordering::SeqCst);
}

/// Websocket peer that completes the upgrade and then never reads or answers.
pub async fn spawn_silent_peer() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route("/collab", get(silent_upgrade));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("ws://{addr}/collab")
}

async fn silent_upgrade(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(hold_silently)
}

async fn hold_silently(socket: WebSocket) {
    tokio::time::sleep(Duration::from_secs(30)).await;
    drop(socket);
}

/// Returns an address that accepts TCP connections but never answers the
/// websocket handshake.
pub async fn stalled_handshake_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("ws://{addr}/collab")
}

/// Polls `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drains host events that are already queued.
pub fn drain_host(rx: &mut mpsc::UnboundedReceiver<HostEvent>) -> Vec<HostEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub async fn next_host(rx: &mut mpsc::UnboundedReceiver<HostEvent>) -> HostEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("host event timeout")
        .expect("host channel closed")
}

/// Returns an address nothing listens on.
pub async fn refused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("ws://{addr}/collab")
}
