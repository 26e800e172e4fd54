//! The transport abstraction one response is transmitted over.
//!
//! A `Connection` owns the writable half of an established exchange plus a
//! channel of lifecycle events signalled by whoever owns the socket (or the
//! test harness). The transmitter subscribes to those events before any body
//! byte flows.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::head::render_head;
use crate::headers::Headers;

/// Lifecycle events observed while a response is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The client went away; the connection is already gone.
    Aborted,
    /// The connection closed before the response finished.
    Closed,
    /// The transport itself failed.
    Errored,
}

impl ConnectionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionEvent::Aborted => "aborted",
            ConnectionEvent::Closed => "close",
            ConnectionEvent::Errored => "error",
        }
    }
}

/// Signalling side of a connection's lifecycle events. Held by the socket
/// owner (or a test); sending after the exchange ended is a no-op.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionHandle {
    pub fn abort(&self) {
        let _ = self.tx.send(ConnectionEvent::Aborted);
    }

    pub fn close(&self) {
        let _ = self.tx.send(ConnectionEvent::Closed);
    }

    pub fn error(&self) {
        let _ = self.tx.send(ConnectionEvent::Errored);
    }
}

/// Inspection state of an injected (in-memory) connection: the raw bytes the
/// client would have received plus the raw result value attached for plain
/// responses.
#[derive(Debug, Clone, Default)]
pub struct Inspection {
    wire: Arc<Mutex<Vec<u8>>>,
    result: Arc<Mutex<Option<serde_json::Value>>>,
    ended: Arc<Mutex<bool>>,
}

impl Inspection {
    /// Everything written to the connection so far (head + body).
    pub fn wire(&self) -> Vec<u8> {
        self.wire.lock().expect("inspection lock poisoned").clone()
    }

    /// The raw result value attached by the transmitter, when the response
    /// was a plain one.
    pub fn result(&self) -> Option<serde_json::Value> {
        self.result.lock().expect("inspection lock poisoned").clone()
    }

    /// Whether end-of-response ran on the connection.
    pub fn ended(&self) -> bool {
        *self.ended.lock().expect("inspection lock poisoned")
    }
}

/// In-memory sink backing injected connections.
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl AsyncWrite for SharedBuf {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0
            .lock()
            .expect("inspection lock poisoned")
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub struct Connection {
    sink: Box<dyn AsyncWrite + Send + Unpin>,
    events: Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
    inspection: Option<Inspection>,
    head_written: bool,
    ended: bool,
}

impl Connection {
    /// Wrap a real writable transport.
    pub fn new(sink: Box<dyn AsyncWrite + Send + Unpin>) -> (Self, ConnectionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            sink,
            events: Some(rx),
            inspection: None,
            head_written: false,
            ended: false,
        };
        (conn, ConnectionHandle { tx })
    }

    /// An in-memory connection for tests and injection tooling. Writes land
    /// in the returned [`Inspection`] instead of a socket.
    pub fn injected() -> (Self, ConnectionHandle, Inspection) {
        let inspection = Inspection::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            sink: Box::new(SharedBuf(Arc::clone(&inspection.wire))),
            events: Some(rx),
            inspection: Some(inspection.clone()),
            head_written: false,
            ended: false,
        };
        (conn, ConnectionHandle { tx }, inspection)
    }

    pub fn is_injected(&self) -> bool {
        self.inspection.is_some()
    }

    /// Attach a raw result value to an injected connection. No-op on real
    /// connections; this is a test-support side channel, not wire data.
    pub fn attach_result(&self, value: serde_json::Value) {
        if let Some(inspection) = &self.inspection {
            *inspection.result.lock().expect("inspection lock poisoned") = Some(value);
        }
    }

    /// Take the lifecycle event subscription. The transmitter claims it once,
    /// before any body byte flows.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.events.take()
    }

    /// Write the status line and header block. Must happen exactly once and
    /// before any body chunk.
    pub async fn write_head(&mut self, status: u16, headers: &Headers) -> io::Result<()> {
        if self.head_written {
            return Err(io::Error::other("response head already written"));
        }
        self.head_written = true;
        self.sink.write_all(&render_head(status, headers)).await
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.sink.write_all(chunk).await
    }

    /// End-of-response primitive: flush and shut the writable half down.
    /// Idempotent; callers skip it entirely when the client aborted.
    pub async fn end(&mut self) -> io::Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        if let Some(inspection) = &self.inspection {
            *inspection.ended.lock().expect("inspection lock poisoned") = true;
        }
        self.sink.flush().await?;
        self.sink.shutdown().await
    }
}
