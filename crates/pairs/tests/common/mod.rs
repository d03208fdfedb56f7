#![allow(dead_code)]

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pair_common::{Envelope, PeerId};
use pairs::config::ServerConfig;
use pairs::server::ServerState;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        path: "/".to_string(),
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_conns: 1000,
        max_message_size: 65_536,
    }
}

pub fn peer(id: &str) -> PeerId {
    PeerId::new(id).unwrap()
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), pairs::error::PairsError>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("ws://{}{}", self.addr, self.state.config.path)
    }

    /// Trigger shutdown and wait for the accept loop to drain.
    pub async fn shutdown(mut self) -> Result<(), pairs::error::PairsError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not drain in time")
            .unwrap()
    }

    /// Poll until `id` is bound in the registry.
    pub async fn wait_registered(&self, id: &str) {
        let id = peer(id);
        wait_for(|| self.state.registry.contains(&id)).await;
    }

    /// Poll until `id` is no longer bound in the registry.
    pub async fn wait_unregistered(&self, id: &str) {
        let id = peer(id);
        wait_for(|| !self.state.registry.contains(&id)).await;
    }
}

pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

pub async fn start_server_with(tweak: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    tweak(&mut config);
    let state = Arc::new(ServerState::new(config));

    let (tx, rx) = oneshot::channel::<()>();
    let task = spawn_server(listener, Arc::clone(&state), async move {
        let _ = rx.await;
    });

    TestServer {
        addr,
        state,
        shutdown: Some(tx),
        task,
    }
}

fn spawn_server<F>(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: F,
) -> JoinHandle<Result<(), pairs::error::PairsError>>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(pairs::run_with_shutdown(listener, state, shutdown))
}

pub struct TestClient {
    pub ws_tx: SplitSink<Ws, Message>,
    pub ws_rx: SplitStream<Ws>,
}

impl TestClient {
    pub async fn connect(server: &TestServer) -> Self {
        Self::connect_url(&server.url()).await
    }

    pub async fn connect_url(url: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    /// Connect and register under `id`, waiting until the server has bound it.
    pub async fn registered(server: &TestServer, id: &str) -> Self {
        let mut client = Self::connect(server).await;
        client.register(id).await;
        server.wait_registered(id).await;
        client
    }

    pub async fn register(&mut self, id: &str) {
        self.send_envelope(&Envelope::register(peer(id))).await;
    }

    pub async fn send_envelope(&mut self, envelope: &Envelope) {
        self.send_raw(&envelope.encode().unwrap()).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws_tx
            .send(Message::Text(text.to_string()))
            .await
            .unwrap();
    }

    pub async fn send_message(&mut self, message: Message) {
        self.ws_tx.send(message).await.unwrap();
    }

    pub async fn close(mut self) {
        let _ = self.ws_tx.close().await;
    }

    /// Next text frame, skipping control frames.
    pub async fn recv_text(&mut self) -> String {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .expect("timeout waiting for message")
                .unwrap()
                .unwrap();
            match msg {
                Message::Text(text) => return text,
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("expected text message, got {other:?}"),
            }
        }
    }

    pub async fn recv_envelope(&mut self) -> Envelope {
        Envelope::decode_str(&self.recv_text().await).unwrap()
    }

    pub async fn recv_text_timeout(&mut self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.recv_text()).await.ok()
    }
}
