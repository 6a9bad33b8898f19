use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use gadget_core::{DocumentEngine, Gadget, GadgetSettings, InMemoryDocumentEngine};
use serde_json::json;
use shared::{
    domain::{Block, TransportProtocol},
    protocol::{HostEnvelope, HostEvent, PeerFrame},
};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
};

#[derive(Clone)]
struct Peer {
    frames: mpsc::UnboundedSender<PeerFrame>,
    push: broadcast::Sender<String>,
}

async fn spawn_peer() -> (
    String,
    mpsc::UnboundedReceiver<PeerFrame>,
    broadcast::Sender<String>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (frames, frames_rx) = mpsc::unbounded_channel();
    let (push, _) = broadcast::channel(16);
    let app = Router::new().route("/ws", get(upgrade)).with_state(Peer {
        frames,
        push: push.clone(),
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("ws://{addr}/ws"), frames_rx, push)
}

async fn upgrade(ws: WebSocketUpgrade, State(peer): State<Peer>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session(peer, socket))
}

async fn session(peer: Peer, mut socket: WebSocket) {
    let mut push = peer.push.subscribe();
    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(frame) = serde_json::from_str(&text) {
                        let _ = peer.frames.send(frame);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            Ok(text) = push.recv() => {
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

#[tokio::test]
async fn host_and_peer_round_trip_through_a_configured_session() {
    let (address, mut peer_frames, peer_push) = spawn_peer().await;
    let settings = GadgetSettings {
        transport_protocol: TransportProtocol::None,
        initial_content: vec![Block::paragraph("start").with_id("start")],
        ..GadgetSettings::default()
    };
    let engine = Arc::new(InMemoryDocumentEngine::new(settings.initial_content.clone()));
    let (mut gadget, mut host) = Gadget::launch(settings, engine.clone());
    assert_eq!(next(&mut host).await, HostEvent::GadgetReady);

    gadget.post(HostEnvelope::new(
        "CONFIGURE",
        json!({ "serverAddress": address, "transportProtocol": "ws" }),
    ));
    assert_eq!(next(&mut host).await, HostEvent::ServerConnected);
    assert_eq!(gadget.state().server_address, address);

    gadget.post(HostEnvelope::new(
        "INSERT_BLOCK",
        json!({ "type": "divider" }),
    ));
    match next(&mut peer_frames).await {
        PeerFrame::BlockInserted { content } => {
            assert_eq!(content.len(), 2);
            assert_eq!(content[1].kind, "divider");
        }
        other => panic!("unexpected frame: {other:?}"),
    }

    let remote = vec![Block::paragraph("edited elsewhere").with_id("start")];
    let text = serde_json::to_string(&PeerFrame::ContentUpdate {
        content: remote.clone(),
    })
    .expect("encode");
    peer_push.send(text.clone()).expect("push");
    assert_eq!(next(&mut host).await, HostEvent::ContentUpdated(remote.clone()));

    // The same content again is an echo and produces nothing.
    peer_push.send(text).expect("push");
    gadget.post(HostEnvelope::new("GET_CONTENT", serde_json::Value::Null));
    assert_eq!(next(&mut host).await, HostEvent::ContentResponse(remote.clone()));
    assert_eq!(
        next(&mut peer_frames).await,
        PeerFrame::ContentUpdate { content: remote }
    );

    gadget.post(HostEnvelope::new("BOGUS", serde_json::Value::Null));
    assert_eq!(
        next(&mut host).await,
        HostEvent::Error("Unknown event type: BOGUS".into())
    );

    gadget.destroy().await;
    assert!(!gadget.state().is_connected);
    assert_eq!(engine.document().await.expect("doc").len(), 1);
}
