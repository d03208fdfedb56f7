use crate::error::{PairsError, SessionError};
use crate::handle::{ConnId, ConnectionHandle};
use crate::metrics::{counters, histograms};
use crate::server::ServerState;
use crate::session::{Dispatch, Session};
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

/// Accept the upgrade only on the configured path. A root path of `/`
/// serves every request path. Any origin is allowed.
fn check_path(request: &Request, path: &str) -> Result<(), ErrorResponse> {
    if path == "/" || request.uri().path() == path {
        return Ok(());
    }
    let mut resp = ErrorResponse::new(Some("not found".to_string()));
    *resp.status_mut() = StatusCode::NOT_FOUND;
    Err(resp)
}

/// Upgrade `stream`, serve it until it closes, then release its ids.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), PairsError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(state.config.max_message_size),
        max_frame_size: Some(state.config.max_message_size),
        ..WebSocketConfig::default()
    };

    let path = state.config.path.clone();
    let ws_stream = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        move |req: &Request, resp: Response| check_path(req, &path).map(|()| resp),
        Some(ws_config),
    )
    .await
    .map_err(|e| {
        tracing::info!(%peer_addr, "unable to upgrade: {}", e);
        PairsError::WebSocket(e)
    })?;

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let handle = ConnectionHandle::new(ws_tx);
    let conn = handle.id();
    tracing::info!(%peer_addr, %conn, "received new connection");

    let mut session = Session::new(handle, state.router.clone());
    let result = run_read_loop(&mut ws_rx, &mut session).await;

    session.close().await;
    tracing::info!(%peer_addr, %conn, "connection closed");

    result
}

/// Read frames until the peer closes or the transport fails.
///
/// Per-message failures are logged and never end the loop.
async fn run_read_loop(ws_rx: &mut WsRecv, session: &mut Session) -> Result<(), PairsError> {
    let conn = session.handle().id();

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let start = Instant::now();
                match session.handle_text(&text).await {
                    Ok(Dispatch::Relayed) => {
                        histograms::relay_latency_seconds(start.elapsed().as_secs_f64());
                    }
                    Ok(Dispatch::Registered(_)) => {}
                    Err(e) => log_dropped(conn, &e),
                }
            }
            Ok(Message::Binary(data)) => {
                counters::binary_frames_total(data.len() as u64);
                tracing::debug!(%conn, bytes = data.len(), "binary message received, ignoring");
            }
            Ok(Message::Close(frame)) => {
                tracing::debug!(%conn, ?frame, "close frame received");
                return Ok(());
            }
            // Pongs are queued by tungstenite itself.
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(());
            }
            Err(e) => return Err(PairsError::WebSocket(e)),
        }
    }

    Ok(())
}

fn log_dropped(conn: ConnId, error: &SessionError) {
    match error {
        SessionError::Decode(e) => {
            tracing::warn!(%conn, "error occurred while reading text message: {}", e);
        }
        SessionError::Register(e) => {
            tracing::warn!(%conn, "registration refused: {}", e);
        }
        SessionError::Route(e) => {
            tracing::warn!(%conn, "message not relayed: {}", e);
        }
    }
}
