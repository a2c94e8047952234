mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use tokenform_notify::db::{memory_store, MemoryBlob};
use tokenform_notify::realtime::LocalHub;
use tokenform_notify::routes::{self, AppState};
use tokenform_notify::{BroadcastEnvelope, DismissalEvent, NotificationRecord};

use common::{wait_until, CHANNEL};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, routes::app(state)).await.unwrap() });
    addr
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/api/ws")).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, envelope: impl Into<BroadcastEnvelope>) {
    let envelope: BroadcastEnvelope = envelope.into();
    let text = envelope.to_json().unwrap();
    socket.send(Message::Text(text)).await.unwrap();
}

/// Next envelope on the socket, or `None` if nothing arrives in time.
async fn next_envelope(socket: &mut Socket, within: Duration) -> Option<BroadcastEnvelope> {
    loop {
        match tokio::time::timeout(within, socket.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(BroadcastEnvelope::from_json(&text).unwrap()),
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn socket_frames_reach_other_tabs_but_not_the_sender() {
    let hub = LocalHub::new();
    let addr = serve(AppState::new(memory_store(&MemoryBlob::new()), hub.clone(), CHANNEL)).await;
    let mut tab_a = connect(addr).await;
    let mut tab_b = connect(addr).await;
    assert!(wait_until(|| hub.subscriber_count(CHANNEL) == 2).await);

    // Undecodable frames are dropped, the socket stays usable.
    tab_a.send(Message::Text("not an envelope".into())).await.unwrap();
    let record = NotificationRecord::pending("0xabc", "Sending 1 ETH to 0x11...1234");
    send(&mut tab_a, record.clone()).await;

    let got = next_envelope(&mut tab_b, Duration::from_secs(1)).await;
    assert_eq!(got, Some(BroadcastEnvelope::Notification(record)));
    assert_eq!(next_envelope(&mut tab_a, Duration::from_millis(100)).await, None);

    send(&mut tab_b, DismissalEvent::new("0xabc")).await;
    let got = next_envelope(&mut tab_a, Duration::from_secs(1)).await;
    assert_eq!(got, Some(BroadcastEnvelope::Dismissal(DismissalEvent::new("0xabc"))));
    assert_eq!(next_envelope(&mut tab_b, Duration::from_millis(100)).await, None);
}

#[tokio::test]
async fn closed_socket_leaves_the_hub() {
    let hub = LocalHub::new();
    let addr = serve(AppState::new(memory_store(&MemoryBlob::new()), hub.clone(), CHANNEL)).await;
    let mut tab = connect(addr).await;
    assert!(wait_until(|| hub.subscriber_count(CHANNEL) == 1).await);

    tab.close(None).await.unwrap();
    assert!(wait_until(|| hub.subscriber_count(CHANNEL) == 0).await);
}

#[tokio::test]
async fn isolated_relay_does_not_forward_between_sockets() {
    let addr = serve(AppState::isolated(memory_store(&MemoryBlob::new()), CHANNEL)).await;
    let mut tab_a = connect(addr).await;
    let mut tab_b = connect(addr).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    send(&mut tab_a, NotificationRecord::success("0xabc", "Sent 1 ETH to 0x11...1234")).await;
    assert_eq!(next_envelope(&mut tab_b, Duration::from_millis(200)).await, None);

    // Both sockets stay open even though nothing is ever forwarded.
    send(&mut tab_a, DismissalEvent::new("0xabc")).await;
    send(&mut tab_b, DismissalEvent::new("0xabc")).await;
    assert_eq!(next_envelope(&mut tab_a, Duration::from_millis(100)).await, None);
}
