//! Connection handle and the state shared with its driver and streams.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

use futures::channel::mpsc;
use libp2p::{Multiaddr, PeerId};
use parking_lot::Mutex;
use tokio::{net::TcpStream, sync::oneshot, sync::watch};
use tracing::{Instrument, debug, debug_span};

use crate::{
    InboundRouter, MuxConfig, MuxError, Stream, StreamError,
    driver,
    frame::{Frame, MAX_PROTOCOL_LEN},
};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side established the underlying TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

/// Why a connection stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed through [`Connection::close`].
    Local,
    /// The remote closed the socket.
    RemoteClosed,
    /// I/O or framing error.
    Error(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::RemoteClosed => f.write_str("closed by remote"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Outcome of an outbound `Open` that did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenFailure {
    Rejected,
    Reset,
}

/// Items delivered to a stream's read side, in wire order.
#[derive(Debug)]
pub(crate) enum Inbound {
    Data(bytes::Bytes),
    Fin,
    Reset,
}

pub(crate) struct Entry {
    /// Bounded; the driver stops reading the socket while it is full.
    pub(crate) inbound: mpsc::Sender<Inbound>,
    /// Present until the remote answers an outbound `Open`.
    pub(crate) pending: Option<oneshot::Sender<Result<(), OpenFailure>>>,
}

#[derive(Default)]
pub(crate) struct StreamTable {
    pub(crate) entries: HashMap<u32, Entry>,
    /// Set once the driver exits; no entries are added afterwards.
    pub(crate) closed: bool,
}

pub(crate) struct Shared {
    pub(crate) id: ConnectionId,
    pub(crate) remote: PeerId,
    pub(crate) remote_addr: Multiaddr,
    pub(crate) direction: Direction,
    pub(crate) config: MuxConfig,
    /// Stream data and FIN frames; bounded for backpressure.
    pub(crate) data_tx: mpsc::Sender<Frame>,
    /// Open/Accept/Reject/Reset frames; written ahead of data.
    pub(crate) ctrl_tx: mpsc::UnboundedSender<Frame>,
    next_stream_id: AtomicU32,
    pub(crate) streams: Mutex<StreamTable>,
    shutdown: watch::Sender<bool>,
    pub(crate) closed: watch::Sender<Option<CloseReason>>,
}

impl Shared {
    fn next_stream_id(&self) -> u32 {
        self.next_stream_id.fetch_add(2, Ordering::Relaxed)
    }

    /// Whether `id` belongs to the remote's id space.
    pub(crate) fn is_remote_id(&self, id: u32) -> bool {
        let odd = id % 2 == 1;
        match self.direction {
            // The dialer opens odd ids.
            Direction::Inbound => odd,
            Direction::Outbound => !odd,
        }
    }

    pub(crate) fn send_ctrl(&self, frame: Frame) -> bool {
        self.ctrl_tx.unbounded_send(frame).is_ok()
    }

    /// `None` while the stream is usable, otherwise why it is not.
    pub(crate) fn stream_status(&self, id: u32) -> Option<StreamError> {
        let table = self.streams.lock();
        if table.closed {
            Some(StreamError::ConnectionLost)
        } else if !table.entries.contains_key(&id) {
            Some(StreamError::Reset)
        } else {
            None
        }
    }

    /// Drop every stream entry and refuse new ones.
    pub(crate) fn mark_closed(&self) -> usize {
        let entries = {
            let mut table = self.streams.lock();
            table.closed = true;
            std::mem::take(&mut table.entries)
        };
        entries.len()
    }
}

/// Handle to a multiplexed connection.
///
/// Cheap to clone. The connection keeps running until [`Connection::close`]
/// is called or the socket fails; dropping handles does not close it.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Start multiplexing over an authenticated socket.
    ///
    /// Must be called from within a tokio runtime; the driver runs on its own
    /// task.
    pub fn new(
        socket: TcpStream,
        remote: PeerId,
        remote_addr: Multiaddr,
        direction: Direction,
        config: MuxConfig,
        router: Arc<dyn InboundRouter>,
    ) -> Self {
        let (data_tx, data_rx) = mpsc::channel(config.write_queue);
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (closed, _) = watch::channel(None);
        let first_id = match direction {
            Direction::Outbound => 1,
            Direction::Inbound => 2,
        };

        let shared = Arc::new(Shared {
            id: ConnectionId::next(),
            remote,
            remote_addr,
            direction,
            config,
            data_tx,
            ctrl_tx,
            next_stream_id: AtomicU32::new(first_id),
            streams: Mutex::new(StreamTable::default()),
            shutdown,
            closed,
        });

        let span = debug_span!("conn", id = %shared.id, peer = %remote, %direction);
        tokio::spawn(
            driver::run(
                shared.clone(),
                socket,
                router,
                driver::Queues {
                    ctrl_rx,
                    data_rx,
                    shutdown_rx,
                },
            )
            .instrument(span),
        );

        debug!(id = %shared.id, peer = %remote, %direction, "connection started");
        Self { shared }
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn remote_peer(&self) -> PeerId {
        self.shared.remote
    }

    pub fn remote_addr(&self) -> &Multiaddr {
        &self.shared.remote_addr
    }

    pub fn direction(&self) -> Direction {
        self.shared.direction
    }

    pub fn is_closed(&self) -> bool {
        self.shared.streams.lock().closed
    }

    /// Streams currently open in either direction.
    pub fn num_streams(&self) -> usize {
        self.shared.streams.lock().entries.len()
    }

    /// Open a stream speaking `protocol`.
    ///
    /// Waits for the remote to accept, at most `open_timeout`. If this future
    /// is dropped or times out before an answer arrives the half-open stream
    /// is reset.
    pub async fn open_stream(&self, protocol: &str) -> Result<Stream, MuxError> {
        if protocol.is_empty() || protocol.len() > MAX_PROTOCOL_LEN {
            return Err(MuxError::InvalidProtocol);
        }

        let id = self.shared.next_stream_id();
        let (inbound_tx, inbound_rx) = mpsc::channel(self.shared.config.read_buffer);
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut table = self.shared.streams.lock();
            if table.closed {
                return Err(MuxError::ConnectionLost);
            }
            table.entries.insert(
                id,
                Entry {
                    inbound: inbound_tx,
                    pending: Some(reply_tx),
                },
            );
        }
        let mut guard = OpenGuard {
            shared: &self.shared,
            id,
            armed: true,
        };

        if !self.shared.send_ctrl(Frame::open(id, protocol)) {
            return Err(MuxError::ConnectionLost);
        }

        let timeout = self.shared.config.open_timeout();
        let outcome = match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            // Entry dropped by the driver on teardown.
            Ok(Err(_)) => return Err(MuxError::ConnectionLost),
            Err(_) => {
                debug!(peer = %self.shared.remote, protocol, stream = id, "stream open timed out");
                return Err(MuxError::DeadlineExceeded(timeout));
            }
        };

        // The driver already removed the entry on Reject/Reset.
        guard.armed = false;
        match outcome {
            Ok(()) => Ok(Stream::new(
                id,
                protocol.to_owned(),
                self.shared.clone(),
                inbound_rx,
            )),
            Err(OpenFailure::Rejected) => Err(MuxError::ProtocolRejected {
                protocol: protocol.to_owned(),
            }),
            Err(OpenFailure::Reset) => Err(MuxError::StreamReset),
        }
    }

    /// Ask the driver to stop and wait until it has.
    ///
    /// Frames already queued are flushed before the socket is shut down.
    /// Streams see `ConnectionLost` on their next operation.
    pub async fn close(&self) -> CloseReason {
        self.shared.shutdown.send_replace(true);
        self.closed().await
    }

    /// Resolves once the connection has stopped.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.shared.closed.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        reason.unwrap_or(CloseReason::Local)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("remote", &self.shared.remote)
            .field("remote_addr", &self.shared.remote_addr)
            .field("direction", &self.shared.direction)
            .finish()
    }
}

/// Resets an outbound stream whose open did not complete.
struct OpenGuard<'a> {
    shared: &'a Shared,
    id: u32,
    armed: bool,
}

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let removed = self.shared.streams.lock().entries.remove(&self.id).is_some();
        if removed {
            self.shared.send_ctrl(Frame::reset(self.id));
        }
    }
}
