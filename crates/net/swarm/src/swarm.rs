//! The live connection set and everything that feeds it.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared, join_all},
};
use libp2p::{Multiaddr, PeerId};
use parking_lot::Mutex;
use tokio::{
    net::TcpStream,
    sync::{broadcast, watch},
    task::{AbortHandle, JoinHandle},
};
use tracing::{Instrument, debug, debug_span, info, trace, warn};
use weft_identity::Identity;
use weft_net_mux::{Connection, Direction, InboundRouter, MuxConfig};
use weft_net_peerstore::{AddressBook, RECENTLY_CONNECTED_ADDR_TTL};
use weft_net_transport::{BindError, Listener};

use crate::{
    DialError, DialFailure, EventEmitter, HandshakeError, SwarmConfig, SwarmEvent,
    handshake::handshake,
};

type DialResult = Result<Connection, DialError>;
type SharedDial = Shared<BoxFuture<'static, DialResult>>;

enum PeerSlot {
    /// A dial task is running; every caller awaits the same result.
    Dialing { dial: SharedDial, task: AbortHandle },
    Connected(Connection),
}

struct ListenerTask {
    addr: Multiaddr,
    task: JoinHandle<()>,
}

struct Inner {
    identity: Identity,
    config: SwarmConfig,
    mux: MuxConfig,
    book: Arc<AddressBook>,
    router: Arc<dyn InboundRouter>,
    peers: DashMap<PeerId, PeerSlot>,
    listeners: Mutex<Vec<ListenerTask>>,
    events: EventEmitter,
    shutdown: watch::Sender<bool>,
}

/// Connection manager.
///
/// Owns at most one live, authenticated [`Connection`] per remote peer.
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Swarm {
    inner: Arc<Inner>,
}

impl Swarm {
    pub fn new(
        identity: Identity,
        book: Arc<AddressBook>,
        router: Arc<dyn InboundRouter>,
        config: SwarmConfig,
        mux: MuxConfig,
    ) -> Self {
        let events = EventEmitter::new(config.event_capacity);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                identity,
                config,
                mux,
                book,
                router,
                peers: DashMap::new(),
                listeners: Mutex::new(Vec::new()),
                events,
                shutdown,
            }),
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.inner.identity.peer_id()
    }

    pub fn address_book(&self) -> &Arc<AddressBook> {
        &self.inner.book
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwarmEvent> {
        self.inner.events.subscribe()
    }

    /// Bind `addr` and start accepting on it. Returns the bound address.
    pub async fn listen(&self, addr: &Multiaddr) -> Result<Multiaddr, BindError> {
        let listener = Listener::bind(addr).await?;
        Ok(self.add_listener(listener))
    }

    /// Start accepting on an already-bound listener.
    pub fn add_listener(&self, listener: Listener) -> Multiaddr {
        let addr = listener.local_addr().clone();
        let inner = self.inner.clone();
        let span = debug_span!("listener", %addr);
        let task = tokio::spawn(inner.accept_loop(listener).instrument(span));
        self.inner.listeners.lock().push(ListenerTask {
            addr: addr.clone(),
            task,
        });
        addr
    }

    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.inner
            .listeners
            .lock()
            .iter()
            .filter(|l| !l.task.is_finished())
            .map(|l| l.addr.clone())
            .collect()
    }

    /// Get a live connection to `peer`, dialing its known addresses if needed.
    ///
    /// Concurrent calls for one peer share a single dial. The dial runs on its
    /// own task, so dropping this future never leaves a half-dialed socket.
    pub async fn dial(&self, peer: PeerId) -> DialResult {
        if peer == self.local_peer_id() {
            return Err(DialError::DialSelf);
        }
        if self.is_shut_down() {
            return Err(DialError::Shutdown);
        }

        let dial = match self.inner.peers.entry(peer) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                PeerSlot::Connected(conn) if !conn.is_closed() => {
                    trace!(%peer, "reusing live connection");
                    return Ok(conn.clone());
                }
                PeerSlot::Dialing { dial, .. } => {
                    trace!(%peer, "joining in-flight dial");
                    dial.clone()
                }
                // Closed but not yet reaped.
                PeerSlot::Connected(_) => {
                    let (dial, task) = self.start_dial(peer)?;
                    occupied.insert(PeerSlot::Dialing {
                        dial: dial.clone(),
                        task,
                    });
                    dial
                }
            },
            Entry::Vacant(vacant) => {
                let (dial, task) = self.start_dial(peer)?;
                vacant.insert(PeerSlot::Dialing {
                    dial: dial.clone(),
                    task,
                });
                dial
            }
        };

        dial.await
    }

    fn start_dial(&self, peer: PeerId) -> Result<(SharedDial, AbortHandle), DialError> {
        let addrs = self.inner.book.addrs(&peer);
        if addrs.is_empty() {
            debug!(%peer, "no addresses to dial");
            return Err(DialError::NoAddresses(peer));
        }

        let inner = self.inner.clone();
        let span = debug_span!("dial", %peer);
        let task = tokio::spawn(inner.dial_addrs(peer, addrs).instrument(span));
        let abort = task.abort_handle();
        let dial = async move { task.await.unwrap_or(Err(DialError::Shutdown)) }
            .boxed()
            .shared();
        Ok((dial, abort))
    }

    pub fn connection(&self, peer: &PeerId) -> Option<Connection> {
        match self.inner.peers.get(peer).as_deref() {
            Some(PeerSlot::Connected(conn)) if !conn.is_closed() => Some(conn.clone()),
            _ => None,
        }
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connection(peer).is_some()
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.inner
            .peers
            .iter()
            .filter(|slot| matches!(slot.value(), PeerSlot::Connected(conn) if !conn.is_closed()))
            .map(|slot| *slot.key())
            .collect()
    }

    /// Tear down the connection to `peer`. Returns whether one existed.
    ///
    /// Streams on it fail with `ConnectionLost` on their next operation.
    pub async fn close_connection(&self, peer: &PeerId) -> bool {
        let removed = self
            .inner
            .peers
            .remove_if(peer, |_, slot| matches!(slot, PeerSlot::Connected(_)));
        let Some((_, PeerSlot::Connected(conn))) = removed else {
            return false;
        };

        debug!(%peer, id = %conn.id(), "closing connection");
        conn.close().await;
        self.inner.events.closed(*peer);
        true
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Stop listeners, abort in-flight dials and close every connection.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        info!("shutting down connection manager");

        // Accept loops watch the shutdown flag and release their sockets.
        let listeners = std::mem::take(&mut *self.inner.listeners.lock());
        for listener in listeners {
            let _ = listener.task.await;
        }

        let peers: Vec<PeerId> = self.inner.peers.iter().map(|slot| *slot.key()).collect();
        let mut closing = Vec::new();
        for peer in peers {
            match self.inner.peers.remove(&peer) {
                Some((_, PeerSlot::Dialing { task, .. })) => task.abort(),
                Some((_, PeerSlot::Connected(conn))) => closing.push((peer, conn)),
                None => {}
            }
        }

        join_all(closing.iter().map(|(_, conn)| conn.close())).await;
        for (peer, _) in closing {
            self.inner.events.closed(peer);
        }
    }
}

impl std::fmt::Debug for Swarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swarm")
            .field("local_peer_id", &self.inner.identity.peer_id())
            .field("peers", &self.inner.peers.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn accept_loop(self: Arc<Self>, listener: Listener) {
        let addr = listener.local_addr().clone();
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.wait_for(|stop| *stop) => break,
            };

            match accepted {
                Ok((socket, remote)) => {
                    let inner = self.clone();
                    let span = debug_span!("inbound", %remote);
                    tokio::spawn(inner.authenticate_inbound(socket, remote).instrument(span));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }

        debug!("listener stopped");
        self.events.listener_closed(addr);
    }

    async fn authenticate_inbound(self: Arc<Self>, mut socket: TcpStream, remote: Multiaddr) {
        let timeout = self.config.handshake_timeout();
        let result = tokio::time::timeout(timeout, handshake(&mut socket, &self.identity, None))
            .await
            .unwrap_or(Err(HandshakeError::Timeout));

        match result {
            Ok(peer) => {
                let _ = self.register(peer, socket, remote, Direction::Inbound);
            }
            Err(e) => {
                debug!(error = %e, "inbound handshake failed");
                self.events.incoming_error(remote, e.to_string());
            }
        }
    }

    async fn dial_addrs(self: Arc<Self>, peer: PeerId, addrs: Vec<Multiaddr>) -> DialResult {
        let mut failures = Vec::with_capacity(addrs.len());

        for addr in addrs {
            match self.connect(peer, &addr).await {
                Ok(socket) => return self.register(peer, socket, addr, Direction::Outbound),
                Err(failure) => {
                    debug!(%addr, error = %failure, "dial attempt failed");
                    failures.push((addr, failure));
                }
            }
        }

        if let Entry::Occupied(occupied) = self.peers.entry(peer) {
            let live = match occupied.get() {
                PeerSlot::Connected(conn) if !conn.is_closed() => Some(conn.clone()),
                _ => None,
            };
            // The remote dialed in while we were failing.
            if let Some(conn) = live {
                debug!(%peer, id = %conn.id(), "dial failed, using inbound connection");
                return Ok(conn);
            }
            if matches!(occupied.get(), PeerSlot::Dialing { .. }) {
                occupied.remove();
            }
        }
        self.events.dial_failed(peer);
        Err(DialError::AllFailed { peer, failures })
    }

    /// TCP connect plus handshake against one address.
    async fn connect(&self, peer: PeerId, addr: &Multiaddr) -> Result<TcpStream, DialFailure> {
        let mut socket = weft_net_transport::dial(addr, self.config.dial_timeout())
            .await
            .map_err(|e| DialFailure::Transport(e.to_string()))?;

        let timeout = self.config.handshake_timeout();
        tokio::time::timeout(timeout, handshake(&mut socket, &self.identity, Some(peer)))
            .await
            .unwrap_or(Err(HandshakeError::Timeout))?;
        Ok(socket)
    }

    /// Admit an authenticated socket into the live set.
    ///
    /// If the peer already has a live connection, the loser of [`supersedes`]
    /// is closed and the survivor returned.
    fn register(
        self: &Arc<Self>,
        peer: PeerId,
        socket: TcpStream,
        addr: Multiaddr,
        direction: Direction,
    ) -> DialResult {
        let conn = Connection::new(
            socket,
            peer,
            addr.clone(),
            direction,
            self.mux.clone(),
            self.router.clone(),
        );

        if *self.shutdown.borrow() {
            tokio::spawn(async move { conn.close().await });
            return Err(DialError::Shutdown);
        }

        let replaced = match self.peers.entry(peer) {
            Entry::Occupied(mut occupied) => {
                let live = match occupied.get() {
                    PeerSlot::Connected(existing) if !existing.is_closed() => Some(existing.clone()),
                    _ => None,
                };
                if let Some(existing) = &live
                    && !supersedes(self.identity.peer_id(), &conn, existing)
                {
                    debug!(%peer, kept = %existing.id(), dropped = %conn.id(), "duplicate connection");
                    let existing = existing.clone();
                    tokio::spawn(async move { conn.close().await });
                    return Ok(existing);
                }
                occupied.insert(PeerSlot::Connected(conn.clone()));
                live
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PeerSlot::Connected(conn.clone()));
                None
            }
        };

        if direction == Direction::Outbound {
            self.book
                .add_addr(peer, addr.clone(), RECENTLY_CONNECTED_ADDR_TTL);
        }
        match replaced {
            // Already connected as far as subscribers are concerned.
            Some(existing) => {
                debug!(%peer, kept = %conn.id(), dropped = %existing.id(), "duplicate connection");
                tokio::spawn(async move { existing.close().await });
            }
            None => {
                info!(%peer, %addr, %direction, id = %conn.id(), "connection established");
                self.events.established(peer, direction, addr);
            }
        }

        let inner = self.clone();
        let watched = conn.clone();
        tokio::spawn(async move {
            let reason = watched.closed().await;
            let id = watched.id();
            let removed = inner.peers.remove_if(&peer, |_, slot| {
                matches!(slot, PeerSlot::Connected(conn) if conn.id() == id)
            });
            if removed.is_some() {
                info!(%peer, %reason, "connection closed");
                inner.events.closed(peer);
            }
        });

        Ok(conn)
    }
}

/// Whether `new` should replace `existing` as the connection to one peer.
///
/// Both ends must pick the same socket, so the connection dialed by the
/// smaller peer id wins. Two connections dialed by the same side keep the
/// existing one.
fn supersedes(local: PeerId, new: &Connection, existing: &Connection) -> bool {
    let dialer = |conn: &Connection| match conn.direction() {
        Direction::Outbound => local,
        Direction::Inbound => conn.remote_peer(),
    };
    dialer(new) < dialer(existing)
}

