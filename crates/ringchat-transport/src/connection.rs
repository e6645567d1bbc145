//! A framed duplex connection with request/response correlation.
//!
//! A [`Connection`] owns one TCP stream. The write half lives in a
//! writer task fed through a channel, so frames are never interleaved
//! and a caller that gives up mid-send never leaves half a frame on the
//! wire. The read half is driven by [`Connection::run`], which decodes
//! frames in arrival order and either resolves a waiting
//! [`request`](Connection::request) or dispatches to a registered
//! handler.
//!
//! ```text
//!  request() ──insert waiter──▶ pending[uid]
//!      │                             ▲
//!      ▼                             │ Response{uid}
//!  writer task ──frame──▶ peer ──frame──▶ run() ──Request──▶ handler
//!                                                    │
//!                                         Response ◀─┘ (if the kind expects one)
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use ringchat_protocol::{
    Codec, ErrorCode, JsonCodec, Message, Request, RequestId, RequestKind, RequestPayload,
    Response, ResponseError, ResponsePayload,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, mpsc, oneshot};

use crate::framing::{read_frame, write_frame};
use crate::{ConnectionId, TransportError};

/// What a request handler produces. For kinds that expect no response
/// the value is only logged on error.
pub type HandlerResult = Result<ResponsePayload, ResponseError>;

type Handler = Arc<dyn Fn(RequestPayload) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

type PendingMap = HashMap<RequestId, oneshot::Sender<Response>>;

/// Depth of the outbound frame queue.
const WRITE_QUEUE_DEPTH: usize = 256;

/// Settings for a single connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Default limit on how long [`Connection::request`] waits for a
    /// response. `None` waits until the response arrives or the
    /// connection closes.
    pub request_timeout: Option<Duration>,
}

enum WriterCommand {
    Frame {
        body: Vec<u8>,
        ack: oneshot::Sender<Result<(), TransportError>>,
    },
    Shutdown,
}

struct Inner {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    codec: Arc<dyn Codec>,
    config: ConnectionConfig,
    writer: mpsc::Sender<WriterCommand>,
    stop_writer: Arc<Notify>,
    reader: Mutex<Option<OwnedReadHalf>>,
    /// `None` once the connection has been torn down.
    pending: Mutex<Option<PendingMap>>,
    handlers: Mutex<HashMap<RequestKind, Handler>>,
    disconnect_callbacks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

/// A cheaply clonable handle to one framed connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// Locks a std mutex, ignoring poisoning. None of the guarded state is
/// left half-updated by a panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn closed(reason: &str) -> TransportError {
    TransportError::ConnectionClosed(reason.to_string())
}

impl Connection {
    /// Wraps an established stream and starts its writer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(stream: TcpStream, id: ConnectionId, config: ConnectionConfig) -> Self {
        let peer_addr = stream.peer_addr().ok();
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%id, error = %e, "could not set TCP_NODELAY");
        }
        let (read_half, write_half) = stream.into_split();
        let (writer, commands) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let stop_writer = Arc::new(Notify::new());

        tokio::spawn(run_writer(id, write_half, commands, Arc::clone(&stop_writer)));

        Self {
            inner: Arc::new(Inner {
                id,
                peer_addr,
                codec: Arc::new(JsonCodec),
                config,
                writer,
                stop_writer,
                reader: Mutex::new(Some(read_half)),
                pending: Mutex::new(Some(HashMap::new())),
                handlers: Mutex::new(HashMap::new()),
                disconnect_callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Dials `addr` and wraps the resulting stream.
    pub async fn connect(addr: &str, config: ConnectionConfig) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        tracing::debug!(addr, "connected");
        Ok(Self::new(stream, ConnectionId::new(0), config))
    }

    /// Returns the identifier assigned at accept time.
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the remote address, if the socket reported one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr
    }

    /// Returns `true` once the receive loop has exited.
    pub fn is_closed(&self) -> bool {
        lock(&self.inner.pending).is_none()
    }

    /// Number of requests currently waiting for a response.
    pub fn pending_requests(&self) -> usize {
        lock(&self.inner.pending).as_ref().map_or(0, HashMap::len)
    }

    /// Encodes and writes one message, returning once the frame has been
    /// flushed to the socket.
    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let body = self.inner.codec.encode(message)?;
        let (ack, done) = oneshot::channel();
        self.inner
            .writer
            .send(WriterCommand::Frame { body, ack })
            .await
            .map_err(|_| closed("writer stopped"))?;
        done.await.map_err(|_| closed("writer stopped"))?
    }

    /// Sends a request using the connection's default timeout.
    ///
    /// For kinds that expect a response, waits for it and returns its
    /// payload. For one-way kinds, returns [`ResponsePayload::Ack`] as
    /// soon as the frame is written.
    pub async fn request(
        &self,
        payload: RequestPayload,
    ) -> Result<ResponsePayload, TransportError> {
        self.request_with_timeout(payload, self.inner.config.request_timeout)
            .await
    }

    /// Like [`request`](Self::request) with an explicit timeout.
    ///
    /// # Errors
    /// - [`TransportError::Remote`] — the peer answered with an error
    /// - [`TransportError::Timeout`] — `timeout` elapsed first
    /// - [`TransportError::ConnectionClosed`] — the connection went away
    pub async fn request_with_timeout(
        &self,
        payload: RequestPayload,
        timeout: Option<Duration>,
    ) -> Result<ResponsePayload, TransportError> {
        let kind = payload.kind();
        if !kind.expects_response() {
            self.send(&Message::Request(Request::new(payload))).await?;
            return Ok(ResponsePayload::Ack);
        }

        // The waiter is registered before the frame is written so a fast
        // response can never arrive ahead of its slot.
        let (tx, rx) = oneshot::channel();
        let request = self.insert_pending(payload, tx)?;
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            uid: request.uid.clone(),
        };

        tracing::trace!(conn_id = %self.inner.id, uid = %request.uid, %kind, "sending request");
        self.send(&Message::Request(request)).await?;

        let response = match timeout {
            Some(after) => tokio::time::timeout(after, rx)
                .await
                .map_err(|_| TransportError::Timeout { kind, after })?,
            None => rx.await,
        }
        .map_err(|_| closed("closed while awaiting response"))?;

        response.into_result().map_err(TransportError::Remote)
    }

    fn insert_pending(
        &self,
        payload: RequestPayload,
        tx: oneshot::Sender<Response>,
    ) -> Result<Request, TransportError> {
        let mut pending = lock(&self.inner.pending);
        let map = pending.as_mut().ok_or_else(|| closed("connection torn down"))?;
        let mut request = Request::new(payload);
        while map.contains_key(&request.uid) {
            request.uid = RequestId::generate();
        }
        map.insert(request.uid.clone(), tx);
        Ok(request)
    }

    /// Registers the handler for one request kind. A later registration
    /// for the same kind replaces the earlier one.
    ///
    /// Handlers run inline in the receive loop, in frame order. A handler
    /// must not await a response on its own connection.
    pub fn register_handler<F, Fut>(&self, kind: RequestKind, handler: F)
    where
        F: Fn(RequestPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload| handler(payload).boxed());
        lock(&self.inner.handlers).insert(kind, handler);
    }

    /// Registers a callback to run once when the receive loop exits.
    /// Runs immediately if the connection is already torn down.
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = lock(&self.inner.disconnect_callbacks);
        if !self.is_closed() {
            callbacks.push(Box::new(callback));
            return;
        }
        drop(callbacks);
        callback();
    }

    /// Flushes queued frames, then shuts down the write half. The peer
    /// sees EOF; our receive loop ends when the peer closes its side.
    pub async fn close(&self) {
        let _ = self.inner.writer.send(WriterCommand::Shutdown).await;
    }

    /// Runs the receive loop until the peer disconnects or the stream
    /// breaks, then tears the connection down.
    ///
    /// Teardown fails every pending request with `ConnectionClosed`,
    /// drops all handlers, runs the disconnect callbacks, and stops the
    /// writer task. It also runs if this future is dropped.
    pub async fn run(&self) -> Result<(), TransportError> {
        let mut reader = lock(&self.inner.reader)
            .take()
            .ok_or(TransportError::AlreadyRunning)?;
        let _teardown = Teardown(self);

        let result = self.receive_loop(&mut reader).await;
        match &result {
            Ok(()) => tracing::debug!(conn_id = %self.inner.id, "peer closed connection"),
            Err(e) => tracing::debug!(conn_id = %self.inner.id, error = %e, "receive loop ended"),
        }
        result
    }

    async fn receive_loop(&self, reader: &mut OwnedReadHalf) -> Result<(), TransportError> {
        let conn_id = self.inner.id;
        while let Some(body) = read_frame(reader).await? {
            let message = match self.inner.codec.decode(&body) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(%conn_id, error = %e, "dropping undecodable frame");
                    continue;
                }
            };

            match message {
                Message::Response(response) => self.resolve(response),
                Message::Request(request) => self.dispatch(request).await,
            }
        }
        Ok(())
    }

    fn resolve(&self, response: Response) {
        let waiter = lock(&self.inner.pending)
            .as_mut()
            .and_then(|map| map.remove(&response.uid));

        match waiter {
            Some(tx) => {
                // The requester may have timed out in the meantime.
                let _ = tx.send(response);
            }
            None => tracing::warn!(
                conn_id = %self.inner.id,
                uid = %response.uid,
                "response matches no pending request"
            ),
        }
    }

    async fn dispatch(&self, request: Request) {
        let conn_id = self.inner.id;
        let kind = request.payload.kind();
        let handler = lock(&self.inner.handlers).get(&kind).cloned();

        let result = match handler {
            Some(handler) => handler(request.payload).await,
            None => Err(ResponseError::new(
                ErrorCode::UnhandledRequest,
                format!("no handler registered for {kind}"),
            )),
        };

        if !kind.expects_response() {
            if let Err(e) = result {
                tracing::warn!(%conn_id, %kind, error = %e, "one-way request failed");
            }
            return;
        }

        let response = Response::from_result(request.uid, result);
        if let Err(e) = self.send(&Message::Response(response)).await {
            tracing::debug!(%conn_id, %kind, error = %e, "could not send response");
        }
    }

    fn teardown(&self) {
        // Dropping the senders wakes every waiter with a receive error.
        let abandoned = lock(&self.inner.pending).take().unwrap_or_default();
        if !abandoned.is_empty() {
            tracing::debug!(
                conn_id = %self.inner.id,
                count = abandoned.len(),
                "failing pending requests"
            );
        }
        drop(abandoned);

        // Handlers typically hold clones of this connection.
        lock(&self.inner.handlers).clear();
        self.inner.stop_writer.notify_one();

        let callbacks = std::mem::take(&mut *lock(&self.inner.disconnect_callbacks));
        for callback in callbacks {
            callback();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.peer_addr)
            .finish()
    }
}

/// Removes a pending slot on every exit path of `request`.
struct PendingGuard<'a> {
    pending: &'a Mutex<Option<PendingMap>>,
    uid: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(map) = lock(self.pending).as_mut() {
            map.remove(&self.uid);
        }
    }
}

struct Teardown<'a>(&'a Connection);

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.0.teardown();
    }
}

async fn run_writer(
    id: ConnectionId,
    mut half: OwnedWriteHalf,
    mut commands: mpsc::Receiver<WriterCommand>,
    stop: Arc<Notify>,
) {
    loop {
        let command = tokio::select! {
            biased;
            command = commands.recv() => command,
            _ = stop.notified() => None,
        };

        match command {
            Some(WriterCommand::Frame { body, ack }) => {
                let result = write_frame(&mut half, &body).await;
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    break;
                }
            }
            Some(WriterCommand::Shutdown) | None => break,
        }
    }

    if let Err(e) = half.shutdown().await {
        tracing::trace!(%id, error = %e, "write half shutdown failed");
    }
    tracing::trace!(%id, "writer stopped");
}
