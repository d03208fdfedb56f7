use crate::error::SendError;
use futures_util::{Sink, SinkExt};
use pair_common::Envelope;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};

/// Type-erased outbound half of a connection.
pub type BoxSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    /// Allocates the next connection id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for logging.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Inner {
    id: ConnId,
    sink: Mutex<BoxSink>,
    closed: AtomicBool,
}

/// Exclusive-write handle on one connection.
///
/// Cloning is cheap; all clones share the same write lock, so at most one
/// message is in flight on the connection at any time no matter how many
/// tasks hold a handle. Waiters acquire the lock in FIFO order.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Wraps the outbound half of a connection under a fresh [`ConnId`].
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<Message, Error = tungstenite::Error> + Send + 'static,
    {
        Self::with_id(ConnId::next(), sink)
    }

    /// Wraps the outbound half of a connection under a given id.
    pub fn with_id<S>(id: ConnId, sink: S) -> Self
    where
        S: Sink<Message, Error = tungstenite::Error> + Send + 'static,
    {
        let sink: BoxSink = Box::pin(sink);
        Self {
            inner: Arc::new(Inner {
                id,
                sink: Mutex::new(sink),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Identity of the underlying connection.
    #[must_use]
    pub fn id(&self) -> ConnId {
        self.inner.id
    }

    /// Returns `true` once the connection has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Encodes `envelope` and writes it as one text message.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the connection has closed, or the
    /// encode/transport failure otherwise.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), SendError> {
        let text = envelope.encode()?;
        self.send_message(Message::Text(text)).await
    }

    /// Writes one raw message under the connection's write lock.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the connection has closed, or
    /// [`SendError::Transport`] if the write fails.
    pub async fn send_message(&self, message: Message) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        let mut sink = self.inner.sink.lock().await;
        // Re-check under the lock: close() may have won the race.
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        sink.send(message).await.map_err(|e| match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                SendError::Closed
            }
            other => SendError::Transport(other),
        })
    }

    /// Marks the connection closed and shuts down its outbound half.
    ///
    /// Returns `true` if this call performed the transition. Later sends
    /// fail with [`SendError::Closed`].
    pub async fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut sink = self.inner.sink.lock().await;
        if let Err(e) = sink.close().await {
            tracing::trace!(conn = %self.inner.id, "sink close: {}", e);
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::task::{Context, Poll};
    use tokio::sync::mpsc;

    /// In-memory sink that forwards every message into an unbounded channel.
    pub struct ChannelSink {
        tx: mpsc::UnboundedSender<Message>,
    }

    impl Sink<Message> for ChannelSink {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.tx
                .send(item)
                .map_err(|_| tungstenite::Error::ConnectionClosed)
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Creates a handle backed by a channel, plus the receiving end.
    pub fn channel_handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(ChannelSink { tx }), rx)
    }

    /// Drains every text message currently queued on `rx`.
    pub fn drain_text(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                out.push(text);
            }
        }
        out
    }
}
