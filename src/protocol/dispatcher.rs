//! Request/reply state machine for one module connection.
//!
//! A [`Connection`] owns the write half of a [`Transport`] and a background reader
//! task that owns the read half. Every call follows the same path:
//!
//! 1. Acquire the half-duplex slot (reject or wait, per [`BusyPolicy`]).
//! 2. Register the pending call, then write the encoded request.
//! 3. Await the reply routed by the reader task, bounded by the read timeout.
//! 4. Check correlation and hand back the `parameters` bag.
//!
//! The reader task decodes every transport read and routes each frame, in order:
//! push telemetry and final reports go to the notification broadcast, late replies
//! to timed-out calls are discarded, a frame arriving while a call is pending is
//! that call's reply, and anything else is broadcast as unsolicited. After a read
//! that fills the receive ceiling, bytes up to the next envelope opening are
//! dropped so the tail of the oversized reply never reaches a later call.
//!
//! While a late reply is still owed to a timed-out request, repeating that
//! request under its catalogue id would make the two answers indistinguishable,
//! so the repeat is sent under a sequential id instead.
//!
//! Errors are local to the call. The only terminal condition is the transport
//! itself failing, which moves the connection to [`ConnectionState::Closed`].

use crate::error::{IceBlocError, Result};
use crate::protocol::codec::{self, Envelope, Parameters, MAX_FRAME_BYTES};
use crate::protocol::notification::{self, Frame, Notification};
use crate::protocol::transport::{Transport, TransportReader, TransportWriter};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// What a second concurrent `call` on the same connection does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Fail immediately with [`IceBlocError::State`].
    #[default]
    Reject,
    /// Queue behind the outstanding call.
    Wait,
}

/// How the wire `transmission_id` of a request is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// The operation's catalogue id, as the module documentation prescribes.
    /// Falls back to a sequential id while the catalogue id is owed a late reply.
    #[default]
    Catalogue,
    /// A rolling per-connection counter, so every request is uniquely identifiable.
    Sequential,
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// No call outstanding.
    Idle,
    /// A request was sent and its reply is awaited.
    AwaitingReply,
    /// Closed locally or by the peer; every call fails.
    Closed,
}

/// Tunables for a connection and its calls.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    /// Upper bound for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Upper bound for one reply. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Receive ceiling; a read that fills it is reported as truncated.
    pub max_frame_bytes: usize,
    /// Behaviour of concurrent calls.
    pub busy_policy: BusyPolicy,
    /// Choice of transmission ids.
    pub id_strategy: IdStrategy,
    /// Fail on replies whose id or op does not match the request.
    pub verify_correlation: bool,
    /// How long a timed-out request waits for its late reply to be discarded.
    pub stale_reply_window: Duration,
    /// Re-issues after a timeout. Other errors are never retried.
    pub retries: u32,
    /// Pause between retries.
    pub retry_backoff: Duration,
    /// Notification broadcast buffer; slow subscribers lose the oldest entries.
    pub notification_capacity: usize,
    /// Op names treated as push telemetry.
    pub push_ops: Vec<String>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(10)),
            max_frame_bytes: MAX_FRAME_BYTES,
            busy_policy: BusyPolicy::default(),
            id_strategy: IdStrategy::default(),
            verify_correlation: true,
            stale_reply_window: Duration::from_secs(30),
            retries: 0,
            retry_backoff: Duration::from_millis(250),
            notification_capacity: 64,
            push_ops: notification::default_push_ops(),
        }
    }
}

/// `poll_wave_m_reply` and `poll_wave_m` both answer `poll_wave_m`.
fn reply_base(op: &str) -> &str {
    op.strip_suffix("_reply").unwrap_or(op)
}

type ReplySlot = oneshot::Sender<Result<Envelope>>;

struct Pending {
    op: String,
    id: u32,
    slot: ReplySlot,
}

struct Orphan {
    op: String,
    id: u32,
    expires: Instant,
}

#[derive(Default)]
struct Inner {
    pending: Option<Pending>,
    orphans: Vec<Orphan>,
    closed: bool,
}

/// State shared between callers and the reader task.
struct Shared {
    peer: String,
    inner: parking_lot::Mutex<Inner>,
    notifications: broadcast::Sender<Notification>,
    push_ops: Vec<String>,
}

impl Shared {
    /// Route one decoded frame.
    fn route(&self, envelope: Envelope) {
        let envelope = match notification::classify(envelope, &self.push_ops) {
            Frame::Notification(n) => {
                self.notify(n);
                return;
            }
            Frame::ReplyCandidate(envelope) => envelope,
        };

        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.orphans.retain(|o| o.expires > now);

        let base = reply_base(&envelope.op);
        let stale = inner
            .orphans
            .iter()
            .position(|o| o.op == base && envelope.id() == Some(o.id));
        if let Some(pos) = stale {
            let orphan = inner.orphans.remove(pos);
            warn!(peer = %self.peer, op = %orphan.op, id = orphan.id, "Discarding late reply to timed-out request");
            return;
        }

        if let Some(pending) = inner.pending.take() {
            drop(inner);
            debug!(peer = %self.peer, op = %envelope.op, id = ?envelope.id(), "Reply received");
            if pending.slot.send(Ok(envelope)).is_err() {
                debug!(peer = %self.peer, op = %pending.op, "Caller went away before its reply");
            }
            return;
        }
        drop(inner);

        debug!(peer = %self.peer, op = %envelope.op, "Unsolicited frame");
        self.notify(Notification::Unsolicited(envelope));
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is normal
        if self.notifications.send(notification).is_err() {
            debug!(peer = %self.peer, "Notification dropped, no subscribers");
        }
    }

    /// Resolve the pending call with an error, or log it if nobody is waiting.
    fn fail_pending(&self, error: IceBlocError) {
        let pending = self.inner.lock().pending.take();
        match pending {
            Some(p) => {
                let _ = p.slot.send(Err(error));
            }
            None => warn!(peer = %self.peer, error = %error, "Undeliverable frame"),
        }
    }

    fn mark_closed(&self, error: IceBlocError) {
        let pending = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.orphans.clear();
            inner.pending.take()
        };
        if let Some(p) = pending {
            let _ = p.slot.send(Err(error));
        }
    }
}

/// Clears the pending slot when a call ends without a routed reply.
///
/// Dropping the guard while the request is still pending (timeout, or the call
/// future being cancelled) turns the request into an orphan so its late reply is
/// discarded instead of being handed to the next call.
struct PendingGuard<'a> {
    shared: &'a Shared,
    op: &'a str,
    id: u32,
    window: Duration,
}

impl PendingGuard<'_> {
    /// Clear the slot without expecting a late reply (the request never left).
    fn clear(self) {
        let mut inner = self.shared.inner.lock();
        if inner.pending.as_ref().is_some_and(|p| p.id == self.id) {
            inner.pending = None;
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        let still_pending = inner
            .pending
            .as_ref()
            .is_some_and(|p| p.id == self.id && p.op == self.op);
        if still_pending {
            inner.pending = None;
            inner.orphans.push(Orphan {
                op: self.op.to_string(),
                id: self.id,
                expires: Instant::now() + self.window,
            });
        }
    }
}

/// One persistent connection to one ICE Bloc module.
pub struct Connection {
    shared: Arc<Shared>,
    writer: Mutex<TransportWriter>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    options: CallOptions,
    next_id: AtomicU32,
}

impl Connection {
    /// Connect to `host:port` and start the reader task.
    ///
    /// # Errors
    /// [`IceBlocError::Connection`] if the peer cannot be reached.
    pub async fn open(host: &str, port: u16, options: CallOptions) -> Result<Self> {
        let transport =
            Transport::open(host, port, options.connect_timeout, options.max_frame_bytes).await?;
        Ok(Self::new(transport, options))
    }

    /// Take over an open transport. Must run inside a tokio runtime.
    pub fn new(transport: Transport, options: CallOptions) -> Self {
        let (notifications, _) = broadcast::channel(options.notification_capacity.max(1));
        let shared = Arc::new(Shared {
            peer: transport.peer().to_string(),
            inner: parking_lot::Mutex::new(Inner::default()),
            notifications,
            push_ops: options.push_ops.clone(),
        });
        let (reader, writer) = transport.split();
        let handle = tokio::spawn(read_loop(reader, Arc::clone(&shared)));

        Self {
            shared,
            writer: Mutex::new(writer),
            reader: parking_lot::Mutex::new(Some(handle)),
            options,
            // Sequential ids stay clear of the catalogue range
            next_id: AtomicU32::new(1000),
        }
    }

    /// Remote `host:port`.
    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// Options this connection was opened with.
    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        let inner = self.shared.inner.lock();
        if inner.closed {
            ConnectionState::Closed
        } else if inner.pending.is_some() {
            ConnectionState::AwaitingReply
        } else {
            ConnectionState::Idle
        }
    }

    /// Receive push telemetry, final reports and unsolicited frames.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.shared.notifications.subscribe()
    }

    /// Send one request and return the `parameters` bag of its reply.
    ///
    /// `id` is the operation's catalogue id; with [`IdStrategy::Sequential`] a
    /// unique id is sent instead. Timeouts are retried up to
    /// [`CallOptions::retries`] times.
    ///
    /// # Errors
    /// Any [`IceBlocError`] variant except the configuration ones.
    pub async fn call(&self, id: u32, op: &str, parameters: Option<Parameters>) -> Result<Parameters> {
        let mut attempt = 0;
        loop {
            match self.call_once(id, op, parameters.clone()).await {
                Err(e) if e.is_timeout() && attempt < self.options.retries => {
                    attempt += 1;
                    warn!(peer = %self.peer(), op, attempt, "Retrying after timeout");
                    tokio::time::sleep(self.options.retry_backoff).await;
                }
                other => return other,
            }
        }
    }

    #[instrument(skip(self, parameters), fields(peer = %self.shared.peer))]
    async fn call_once(&self, id: u32, op: &str, parameters: Option<Parameters>) -> Result<Parameters> {
        let mut writer = match self.options.busy_policy {
            BusyPolicy::Reject => self.writer.try_lock().map_err(|_| IceBlocError::State {
                requested: op.to_string(),
                outstanding: self.outstanding_op(),
            })?,
            BusyPolicy::Wait => self.writer.lock().await,
        };

        let (slot, reply) = oneshot::channel();
        let wire_id = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(IceBlocError::connection(self.peer(), "connection is closed"));
            }
            let now = Instant::now();
            inner.orphans.retain(|o| o.expires > now);
            // A late reply still owed under the catalogue id would be
            // indistinguishable from this request's own answer
            let owed = inner.orphans.iter().any(|o| o.op == op && o.id == id);
            let wire_id = match self.options.id_strategy {
                IdStrategy::Catalogue if !owed => id,
                _ => self.next_id.fetch_add(1, Ordering::Relaxed),
            };
            inner.pending = Some(Pending {
                op: op.to_string(),
                id: wire_id,
                slot,
            });
            wire_id
        };
        let guard = PendingGuard {
            shared: &self.shared,
            op,
            id: wire_id,
            window: self.options.stale_reply_window,
        };

        let bytes = match codec::encode(&Envelope::new(wire_id, op, parameters)) {
            Ok(bytes) => bytes,
            Err(e) => {
                guard.clear();
                return Err(e);
            }
        };
        if wire_id != id && self.options.id_strategy == IdStrategy::Catalogue {
            debug!(op, catalogue_id = id, id = wire_id, "Catalogue id still owed a late reply");
        }
        debug!(op, id = wire_id, bytes = bytes.len(), "Sending request");
        if let Err(e) = writer.send(&bytes).await {
            guard.clear();
            return Err(e);
        }

        let routed = match self.options.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(routed) => routed,
                Err(_) => {
                    // guard drop records the orphan
                    drop(guard);
                    return Err(IceBlocError::Timeout {
                        op: op.to_string(),
                        after: limit,
                    });
                }
            },
            None => reply.await,
        };
        drop(guard);

        let envelope = routed
            .map_err(|_| IceBlocError::connection(self.peer(), "reader task stopped"))??;
        self.check_correlation(op, wire_id, &envelope)?;
        codec::into_parameters(envelope)
    }

    fn outstanding_op(&self) -> String {
        self.shared
            .inner
            .lock()
            .pending
            .as_ref()
            .map_or_else(|| "<in flight>".to_string(), |p| p.op.clone())
    }

    fn check_correlation(&self, op: &str, id: u32, reply: &Envelope) -> Result<()> {
        let op_matches = reply_base(&reply.op) == op;
        let id_matches = reply.id() == Some(id);
        if op_matches && id_matches {
            return Ok(());
        }
        let detail = format!(
            "request '{op}' id {id} answered by '{}' id {:?}",
            reply.op,
            reply.id()
        );
        if self.options.verify_correlation {
            Err(IceBlocError::Protocol(format!("reply desync: {detail}")))
        } else {
            warn!(peer = %self.peer(), "Accepting uncorrelated reply: {detail}");
            Ok(())
        }
    }

    /// Close the connection. Safe to call more than once.
    ///
    /// A call still awaiting its reply fails with [`IceBlocError::Connection`].
    pub async fn close(&self) {
        self.shared
            .mark_closed(IceBlocError::connection(self.peer(), "connection closed locally"));
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        let mut writer = self.writer.lock().await;
        if !writer.is_closed() {
            writer.close().await;
            info!(peer = %self.peer(), "Connection closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.abort();
        }
    }
}

async fn read_loop(mut reader: TransportReader, shared: Arc<Shared>) {
    let limit = reader.limit();
    // set while the tail of a truncated reply may still be arriving
    let mut draining = false;
    loop {
        let chunk = match reader.receive().await {
            Ok(chunk) => chunk,
            Err(e) => {
                info!(peer = %shared.peer, error = %e, "Reader stopped");
                shared.mark_closed(e);
                return;
            }
        };

        let mut frame = &chunk[..];
        if draining {
            let Some(start) = codec::envelope_start(&chunk) else {
                draining = chunk.len() >= limit;
                debug!(peer = %shared.peer, bytes = chunk.len(), "Dropping tail of truncated reply");
                continue;
            };
            debug!(peer = %shared.peer, bytes = start, "Dropping tail of truncated reply");
            draining = false;
            frame = &chunk[start..];
        }

        if chunk.len() >= limit {
            warn!(peer = %shared.peer, limit, "Read filled the receive ceiling");
            shared.fail_pending(IceBlocError::Truncation { limit });
            draining = true;
            continue;
        }

        match codec::split_frames(frame) {
            Ok(frames) => {
                for envelope in frames {
                    shared.route(envelope);
                }
            }
            Err(e) => shared.fail_pending(e),
        }
    }
}
