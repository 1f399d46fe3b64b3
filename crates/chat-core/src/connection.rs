//! One outbound chat connection and its lifecycle.
//!
//! [`Connection::open`] returns immediately; a background task performs the
//! connect, then runs the receive loop while a second task drains the
//! outbound queue. Lifecycle events are reported through a
//! [`ConnectionListener`]:
//!
//! ```text
//! Connecting ──► Open ──► Closed   (peer closed / caller close)
//!     │            └────► Failed   (read or write error)
//!     └──────────────────► Failed  (connect error or timeout)
//! ```
//!
//! `Closed` and `Failed` are terminal. Exactly one terminal callback fires
//! per connection (none for a caller-initiated [`Connection::close`]) and no
//! callback of any kind fires after it.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::config::{ConnectOptions, Endpoint};
use crate::tcp_transport::TcpTransport;
use crate::transport::{Frame, FrameReader, FrameWriter, Transport, TransportError};

// ---------------------------------------------------------------------------
// State and errors
// ---------------------------------------------------------------------------

/// Where a [`Connection`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Coarse classification of a [`ConnectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectFailure,
    ReadFailure,
    WriteFailure,
    NotOpen,
}

/// Errors reported by a [`Connection`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("could not connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: TransportError,
    },

    #[error("timed out after {timeout:?} connecting to {endpoint}")]
    ConnectTimeout { endpoint: Endpoint, timeout: Duration },

    #[error("read failed: {0}")]
    Read(#[source] TransportError),

    #[error("write failed: {0}")]
    Write(#[source] TransportError),

    #[error("connection is {0}")]
    NotOpen(ConnectionState),
}

impl ConnectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. } | Self::ConnectTimeout { .. } => ErrorKind::ConnectFailure,
            Self::Read(_) => ErrorKind::ReadFailure,
            Self::Write(_) => ErrorKind::WriteFailure,
            Self::NotOpen(_) => ErrorKind::NotOpen,
        }
    }
}

// ---------------------------------------------------------------------------
// Listener contract
// ---------------------------------------------------------------------------

/// Receives lifecycle and data events from a [`Connection`].
///
/// Callbacks run on the connection's worker tasks while its lifecycle lock is
/// held, so they must be quick and must not call back into the same
/// connection. Use a [`DispatchingListener`] to hand events to another
/// thread.
pub trait ConnectionListener: Send + Sync + 'static {
    fn on_connected(&self);
    fn on_message(&self, text: String);
    fn on_disconnected(&self);
    fn on_error(&self, err: ConnectionError);
}

/// The listener callbacks as data.
#[derive(Debug)]
pub enum ConnectionEvent {
    Connected,
    Message(String),
    Disconnected,
    Error(ConnectionError),
}

/// Delivers [`ConnectionEvent`]s to whatever thread owns the display.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, event: ConnectionEvent);
}

impl Dispatcher for mpsc::UnboundedSender<ConnectionEvent> {
    fn dispatch(&self, event: ConnectionEvent) {
        // A dropped receiver means nobody is rendering any more.
        let _ = self.send(event);
    }
}

/// Adapts a plain closure into a [`Dispatcher`].
pub struct FnDispatcher<F>(pub F);

impl<F> Dispatcher for FnDispatcher<F>
where
    F: Fn(ConnectionEvent) + Send + Sync + 'static,
{
    fn dispatch(&self, event: ConnectionEvent) {
        (self.0)(event)
    }
}

/// A [`ConnectionListener`] that forwards every callback to a [`Dispatcher`].
pub struct DispatchingListener<D> {
    dispatcher: D,
}

impl<D: Dispatcher> DispatchingListener<D> {
    pub fn new(dispatcher: D) -> Self {
        Self { dispatcher }
    }
}

impl<D: Dispatcher> ConnectionListener for DispatchingListener<D> {
    fn on_connected(&self) {
        self.dispatcher.dispatch(ConnectionEvent::Connected);
    }

    fn on_message(&self, text: String) {
        self.dispatcher.dispatch(ConnectionEvent::Message(text));
    }

    fn on_disconnected(&self) {
        self.dispatcher.dispatch(ConnectionEvent::Disconnected);
    }

    fn on_error(&self, err: ConnectionError) {
        self.dispatcher.dispatch(ConnectionEvent::Error(err));
    }
}

// ---------------------------------------------------------------------------
// Shared lifecycle
// ---------------------------------------------------------------------------

/// How a connection ended, from the worker's point of view.
enum Termination {
    PeerClosed,
    Failed(ConnectionError),
}

/// State shared between the [`Connection`] handle and its worker tasks.
///
/// All transitions and all listener callbacks happen under `state`'s lock,
/// which is what keeps callbacks from trailing a terminal event.
struct Lifecycle {
    endpoint: Endpoint,
    state: Mutex<ConnectionState>,
    listener: Arc<dyn ConnectionListener>,
    shutdown: watch::Sender<bool>,
}

impl Lifecycle {
    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        *self.lock()
    }

    /// `Connecting → Open`. Returns `false` if the connection was closed
    /// while the connect was in flight.
    fn mark_open(&self) -> bool {
        let mut state = self.lock();
        if *state != ConnectionState::Connecting {
            return false;
        }
        *state = ConnectionState::Open;
        tracing::info!(endpoint = %self.endpoint, "Connected");
        self.listener.on_connected();
        true
    }

    /// Hand one inbound frame to the listener. Returns `false` once the
    /// connection is no longer open.
    fn deliver(&self, text: String) -> bool {
        let state = self.lock();
        if *state != ConnectionState::Open {
            return false;
        }
        self.listener.on_message(text);
        true
    }

    /// Move to a terminal state and report it, unless already terminal.
    fn terminate(&self, termination: Termination) {
        let mut state = self.lock();
        if state.is_terminal() {
            return;
        }
        match termination {
            Termination::PeerClosed => {
                *state = ConnectionState::Closed;
                tracing::info!(endpoint = %self.endpoint, "Peer closed the connection");
                self.listener.on_disconnected();
            }
            Termination::Failed(err) => {
                *state = ConnectionState::Failed;
                tracing::warn!(endpoint = %self.endpoint, error = %err, "Connection failed");
                self.listener.on_error(err);
            }
        }
        self.shutdown.send_replace(true);
    }

    /// Caller-initiated close: terminal, but silent.
    fn close(&self) {
        let mut state = self.lock();
        if !state.is_terminal() {
            *state = ConnectionState::Closed;
            tracing::debug!(endpoint = %self.endpoint, "Connection closed locally");
        }
        self.shutdown.send_replace(true);
    }
}

/// Resolves once the shutdown flag is raised (or its sender is gone).
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Handle to one chat connection.
///
/// Cheap operations only: [`send`](Self::send) enqueues, [`close`](Self::close)
/// raises a flag. All socket I/O happens on background tasks, so the handle
/// can be used from a UI loop. Dropping the handle closes the connection.
///
/// Must be created from within a tokio runtime.
pub struct Connection {
    lifecycle: Arc<Lifecycle>,
    outgoing: mpsc::UnboundedSender<String>,
}

impl Connection {
    /// Start connecting to `endpoint` in the background.
    ///
    /// Returns at once in [`ConnectionState::Connecting`]. The outcome of the
    /// connect arrives as `on_connected` or `on_error` on `listener`.
    pub fn open(
        endpoint: Endpoint,
        options: ConnectOptions,
        listener: Arc<dyn ConnectionListener>,
    ) -> Self {
        let target = endpoint.clone();
        Self::open_with(endpoint, options, listener, async move {
            TcpTransport::connect(&target).await
        })
    }

    /// Like [`open`](Self::open), but the transport comes from `connector`
    /// instead of a TCP connect to `endpoint`.
    ///
    /// `options.connect_timeout` bounds `connector`; `endpoint` is only used
    /// for reporting.
    pub fn open_with<T, F>(
        endpoint: Endpoint,
        options: ConnectOptions,
        listener: Arc<dyn ConnectionListener>,
        connector: F,
    ) -> Self
    where
        T: Transport,
        F: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        let (conn, outgoing_rx) = Self::new(endpoint.clone(), listener);

        let lifecycle = Arc::clone(&conn.lifecycle);
        tokio::spawn(async move {
            let mut shutdown = lifecycle.shutdown.subscribe();
            tracing::debug!(endpoint = %endpoint, "Connecting");

            let result = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return,
                result = connect(&endpoint, connector, options.connect_timeout) => result,
            };

            match result {
                Ok(transport) => {
                    run(transport, lifecycle, outgoing_rx, options.read_timeout).await;
                }
                Err(err) => lifecycle.terminate(Termination::Failed(err)),
            }
        });

        conn
    }

    /// Adopt an already-established transport.
    ///
    /// Behaves as if a connect had just succeeded: `on_connected` fires from
    /// the worker, then the receive loop starts.
    pub fn from_transport<T: Transport>(
        transport: T,
        endpoint: Endpoint,
        options: ConnectOptions,
        listener: Arc<dyn ConnectionListener>,
    ) -> Self {
        let (conn, outgoing_rx) = Self::new(endpoint, listener);
        let lifecycle = Arc::clone(&conn.lifecycle);
        tokio::spawn(run(transport, lifecycle, outgoing_rx, options.read_timeout));
        conn
    }

    /// Queue `text` for transmission as a single frame.
    ///
    /// Never blocks. Frames are written in the order `send` was called. Fails
    /// with [`ConnectionError::NotOpen`] unless the connection is open; no
    /// listener callback is fired for that failure.
    pub fn send(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        let state = self.lifecycle.state();
        if state != ConnectionState::Open {
            return Err(ConnectionError::NotOpen(state));
        }
        self.outgoing
            .send(text.into())
            .map_err(|_| ConnectionError::NotOpen(self.lifecycle.state()))
    }

    /// Stop all workers and release the socket. Idempotent; fires no
    /// callback.
    pub fn close(&self) {
        self.lifecycle.close();
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.lifecycle.endpoint
    }

    // -- private -----------------------------------------------------------

    fn new(
        endpoint: Endpoint,
        listener: Arc<dyn ConnectionListener>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (shutdown, _) = watch::channel(false);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let lifecycle = Arc::new(Lifecycle {
            endpoint,
            state: Mutex::new(ConnectionState::Connecting),
            listener,
            shutdown,
        });
        (
            Self {
                lifecycle,
                outgoing,
            },
            outgoing_rx,
        )
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.lifecycle.close();
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

async fn connect<T, F>(
    endpoint: &Endpoint,
    attempt: F,
    timeout: Option<Duration>,
) -> Result<T, ConnectionError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    let result = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| ConnectionError::ConnectTimeout {
                endpoint: endpoint.clone(),
                timeout,
            })?,
        None => attempt.await,
    };
    result.map_err(|source| ConnectionError::Connect {
        endpoint: endpoint.clone(),
        source,
    })
}

/// Mark the connection open, start the writer, and run the receive loop on
/// the current task.
async fn run<T: Transport>(
    transport: T,
    lifecycle: Arc<Lifecycle>,
    outgoing_rx: mpsc::UnboundedReceiver<String>,
    read_timeout: Option<Duration>,
) {
    if !lifecycle.mark_open() {
        return;
    }
    let (reader, writer) = transport.split();
    tracing::debug!(
        endpoint = %lifecycle.endpoint,
        frame_limit = reader.frame_limit(),
        "Receive loop starting"
    );
    spawn_writer_task(writer, Arc::clone(&lifecycle), outgoing_rx);
    receive_loop(reader, lifecycle, read_timeout).await;
}

async fn receive_loop<R: FrameReader>(
    mut reader: R,
    lifecycle: Arc<Lifecycle>,
    read_timeout: Option<Duration>,
) {
    let mut shutdown = lifecycle.shutdown.subscribe();
    loop {
        let next = tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => break,
            next = read_frame(&mut reader, read_timeout) => next,
        };
        match next {
            Ok(Frame::Line(text)) => {
                if !lifecycle.deliver(text) {
                    break;
                }
            }
            Ok(Frame::End) => {
                lifecycle.terminate(Termination::PeerClosed);
                break;
            }
            Err(e) => {
                lifecycle.terminate(Termination::Failed(ConnectionError::Read(e)));
                break;
            }
        }
    }
    // Reader half dropped here; the writer task drops the other half.
}

async fn read_frame<R: FrameReader>(
    reader: &mut R,
    read_timeout: Option<Duration>,
) -> Result<Frame, TransportError> {
    match read_timeout {
        Some(timeout) => tokio::time::timeout(timeout, reader.read_frame())
            .await
            .map_err(|_| TransportError::TimedOut)?,
        None => reader.read_frame().await,
    }
}

/// Single writer: the only place frames hit the socket, so sends never
/// interleave and keep their queue order.
fn spawn_writer_task<W: FrameWriter>(
    mut writer: W,
    lifecycle: Arc<Lifecycle>,
    mut outgoing_rx: mpsc::UnboundedReceiver<String>,
) {
    tokio::spawn(async move {
        let mut shutdown = lifecycle.shutdown.subscribe();
        loop {
            let text = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                text = outgoing_rx.recv() => match text {
                    Some(text) => text,
                    None => break,
                },
            };
            if let Err(e) = writer.write_frame(&text).await {
                lifecycle.terminate(Termination::Failed(ConnectionError::Write(e)));
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::{assert_err, assert_ok};

    const QUIET: Duration = Duration::from_millis(150);
    const PATIENCE: Duration = Duration::from_secs(5);

    fn listener() -> (
        Arc<dyn ConnectionListener>,
        mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(DispatchingListener::new(tx)), rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
        tokio::time::timeout(PATIENCE, rx.recv())
            .await
            .expect("timed out waiting for a connection event")
            .expect("event channel closed")
    }

    async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) {
        if let Ok(Some(event)) = tokio::time::timeout(QUIET, rx.recv()).await {
            panic!("unexpected event: {event:?}");
        }
    }

    async fn bind() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    async fn open_pair() -> (
        Connection,
        mpsc::UnboundedReceiver<ConnectionEvent>,
        TcpStream,
    ) {
        let (server, endpoint) = bind().await;
        let (listener, mut rx) = listener();
        let conn = Connection::open(endpoint, ConnectOptions::default(), listener);
        let (peer, _) = server.accept().await.unwrap();
        assert!(matches!(next_event(&mut rx).await, ConnectionEvent::Connected));
        assert_eq!(conn.state(), ConnectionState::Open);
        (conn, rx, peer)
    }

    #[tokio::test]
    async fn refused_connect_reports_one_error() {
        let (server, endpoint) = bind().await;
        drop(server);

        let (listener, mut rx) = listener();
        let conn = Connection::open(endpoint, ConnectOptions::default(), listener);
        assert_eq!(conn.state(), ConnectionState::Connecting);

        match next_event(&mut rx).await {
            ConnectionEvent::Error(err) => assert_eq!(err.kind(), ErrorKind::ConnectFailure),
            other => panic!("expected an error, got {other:?}"),
        }
        assert_quiet(&mut rx).await;
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn slow_connect_times_out() {
        let (listener, mut rx) = listener();
        let options = ConnectOptions {
            connect_timeout: Some(Duration::from_millis(50)),
            ..ConnectOptions::default()
        };
        let never = std::future::pending::<Result<TcpTransport, TransportError>>();
        let conn = Connection::open_with(Endpoint::new("10.255.255.1", 5999), options, listener, never);

        match next_event(&mut rx).await {
            ConnectionEvent::Error(err) => {
                assert_eq!(err.kind(), ErrorKind::ConnectFailure);
                assert!(
                    matches!(err, ConnectionError::ConnectTimeout { timeout, .. } if timeout == Duration::from_millis(50)),
                    "expected a connect timeout, got {err:?}"
                );
            }
            other => panic!("expected an error, got {other:?}"),
        }
        assert_quiet(&mut rx).await;
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn inbound_lines_become_messages() {
        let (_conn, mut rx, mut peer) = open_pair().await;
        peer.write_all(b"bob: hello\r\nnull\r\n").await.unwrap();

        match next_event(&mut rx).await {
            ConnectionEvent::Message(text) => assert_eq!(text, "bob: hello"),
            other => panic!("expected a message, got {other:?}"),
        }
        // The sentinel is passed through; filtering it is the consumer's job.
        match next_event(&mut rx).await {
            ConnectionEvent::Message(text) => assert_eq!(text, "null"),
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_connection() {
        let (conn, mut rx, mut peer) = open_pair().await;
        peer.write_all(b"bob: caf\xe9\r\nbob: still here\r\n")
            .await
            .unwrap();

        match next_event(&mut rx).await {
            ConnectionEvent::Message(text) => assert_eq!(text, "bob: caf\u{fffd}"),
            other => panic!("expected a message, got {other:?}"),
        }
        match next_event(&mut rx).await {
            ConnectionEvent::Message(text) => assert_eq!(text, "bob: still here"),
            other => panic!("expected a message, got {other:?}"),
        }
        assert_quiet(&mut rx).await;
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn overlong_frame_is_a_read_failure() {
        let (server, endpoint) = bind().await;
        let stream = TcpStream::connect(("127.0.0.1", endpoint.port)).await.unwrap();
        let (mut peer, _) = server.accept().await.unwrap();

        let (listener, mut rx) = listener();
        let transport = TcpTransport::from_stream(stream).with_frame_limit(16);
        let conn = Connection::from_transport(transport, endpoint, ConnectOptions::default(), listener);
        assert!(matches!(next_event(&mut rx).await, ConnectionEvent::Connected));

        peer.write_all(&[b'x'; 64]).await.unwrap();
        match next_event(&mut rx).await {
            ConnectionEvent::Error(ConnectionError::Read(TransportError::FrameTooLong { limit })) => {
                assert_eq!(limit, 16)
            }
            other => panic!("expected an oversized frame error, got {other:?}"),
        }
        assert_quiet(&mut rx).await;
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    /// A transport whose peer never speaks and whose every write fails.
    struct BrokenPipe;
    struct SilentReader;
    struct FailingWriter;

    impl FrameReader for SilentReader {
        async fn read_frame(&mut self) -> Result<Frame, TransportError> {
            std::future::pending().await
        }
    }

    impl FrameWriter for FailingWriter {
        async fn write_frame(&mut self, _line: &str) -> Result<(), TransportError> {
            Err(TransportError::ConnectionClosed)
        }
    }

    impl Transport for BrokenPipe {
        type Reader = SilentReader;
        type Writer = FailingWriter;

        fn split(self) -> (SilentReader, FailingWriter) {
            (SilentReader, FailingWriter)
        }
    }

    #[tokio::test]
    async fn write_failure_reports_one_error() {
        let (listener, mut rx) = listener();
        let conn = Connection::from_transport(
            BrokenPipe,
            Endpoint::new("127.0.0.1", 5999),
            ConnectOptions::default(),
            listener,
        );
        assert!(matches!(next_event(&mut rx).await, ConnectionEvent::Connected));

        assert_ok!(conn.send("alice: hi"));
        match next_event(&mut rx).await {
            ConnectionEvent::Error(err) => {
                assert_eq!(err.kind(), ErrorKind::WriteFailure);
                assert!(matches!(err, ConnectionError::Write(TransportError::ConnectionClosed)));
            }
            other => panic!("expected a write failure, got {other:?}"),
        }
        assert_quiet(&mut rx).await;
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert_err!(conn.send("alice: again"));
    }

    #[tokio::test]
    async fn peer_close_reports_one_disconnect() {
        let (conn, mut rx, mut peer) = open_pair().await;
        peer.write_all(b"bye\n").await.unwrap();
        drop(peer);

        assert!(matches!(next_event(&mut rx).await, ConnectionEvent::Message(_)));
        assert!(matches!(next_event(&mut rx).await, ConnectionEvent::Disconnected));
        assert_quiet(&mut rx).await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_err!(conn.send("too late"));
    }

    #[tokio::test]
    async fn sends_arrive_in_call_order() {
        let (conn, _rx, peer) = open_pair().await;
        for i in 0..50 {
            assert_ok!(conn.send(format!("alice: m{i}")));
        }

        let mut lines = BufReader::new(peer).lines();
        for i in 0..50 {
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(line, format!("alice: m{i}"));
        }
    }

    #[tokio::test]
    async fn embedded_newlines_stay_one_frame() {
        let (conn, _rx, peer) = open_pair().await;
        assert_ok!(conn.send("alice: one\ntwo"));
        assert_ok!(conn.send("alice: three"));

        let mut lines = BufReader::new(peer).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "alice: one two");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "alice: three");
    }

    #[tokio::test]
    async fn send_before_open_is_rejected() {
        let (_server, endpoint) = bind().await;
        let (listener, _rx) = listener();
        let conn = Connection::open(endpoint, ConnectOptions::default(), listener);
        // Nothing has been accepted yet; the connect task cannot have run on
        // this single-threaded runtime.
        match conn.send("alice: early") {
            Err(ConnectionError::NotOpen(ConnectionState::Connecting)) => {}
            other => panic!("expected NotOpen(Connecting), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_is_silent_and_releases_socket() {
        let (conn, mut rx, peer) = open_pair().await;
        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_quiet(&mut rx).await;

        let mut lines = BufReader::new(peer).lines();
        let eof = tokio::time::timeout(PATIENCE, lines.next_line()).await.unwrap();
        assert!(matches!(eof, Ok(None)));
    }

    #[tokio::test]
    async fn read_timeout_fails_the_connection() {
        let (server, endpoint) = bind().await;
        let (listener, mut rx) = listener();
        let options = ConnectOptions {
            read_timeout: Some(Duration::from_millis(50)),
            ..ConnectOptions::default()
        };
        let _conn = Connection::open(endpoint, options, listener);
        let (_peer, _) = server.accept().await.unwrap();

        assert!(matches!(next_event(&mut rx).await, ConnectionEvent::Connected));
        match next_event(&mut rx).await {
            ConnectionEvent::Error(err) => assert_eq!(err.kind(), ErrorKind::ReadFailure),
            other => panic!("expected a read failure, got {other:?}"),
        }
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn closure_dispatcher_receives_events() {
        let (server, endpoint) = bind().await;
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();
        let dispatcher = FnDispatcher(move |event: ConnectionEvent| {
            let tag = match event {
                ConnectionEvent::Connected => "connected",
                ConnectionEvent::Message(_) => "message",
                ConnectionEvent::Disconnected => "disconnected",
                ConnectionEvent::Error(_) => "error",
            };
            let _ = tx.send(tag);
        });
        let _conn = Connection::open(
            endpoint,
            ConnectOptions::default(),
            Arc::new(DispatchingListener::new(dispatcher)),
        );
        let (peer, _) = server.accept().await.unwrap();
        drop(peer);

        assert_eq!(rx.recv().await, Some("connected"));
        assert_eq!(rx.recv().await, Some("disconnected"));
    }
}
