use std::sync::Arc;

use libp2p::{Multiaddr, PeerId};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace};
use weft_identity::Identity;
use weft_net_mux::{MuxError, Stream, handler};
use weft_net_peerstore::{AddressBook, PERMANENT_ADDR_TTL, PeerInfo};
use weft_net_swarm::{Swarm, SwarmEvent};
use weft_net_transport::Listener;

use crate::{
    HostConfig, HostError, ShutdownHandle,
    handlers::HandlerTable,
    shutdown::requested,
};

struct Inner {
    identity: Identity,
    book: Arc<AddressBook>,
    handlers: Arc<HandlerTable>,
    swarm: Swarm,
    shutdown: ShutdownHandle,
    /// Flips to `true` once teardown has finished.
    stopped: watch::Receiver<bool>,
}

/// A peer on the network: one identity, its listeners, its protocol handlers
/// and its connections to other peers.
///
/// Cheap to clone. Shutdown is explicit ([`Host::shutdown`] or a
/// [`ShutdownHandle`]), and also happens once every clone and handle is gone.
#[derive(Clone)]
pub struct Host {
    inner: Arc<Inner>,
}

impl Host {
    /// Bind every listen address and start serving.
    ///
    /// If any address fails to bind, the ones already bound are released and
    /// the error returned. An empty list gives a dial-only host.
    pub async fn new(
        identity: Identity,
        listen_addrs: &[Multiaddr],
        config: HostConfig,
    ) -> Result<Self, HostError> {
        let mut listeners = Vec::with_capacity(listen_addrs.len());
        for addr in listen_addrs {
            listeners.push(Listener::bind(addr).await?);
        }

        let book = Arc::new(AddressBook::new());
        let handlers = Arc::new(HandlerTable::default());
        let swarm = Swarm::new(
            identity.clone(),
            book.clone(),
            handlers.clone(),
            config.swarm,
            config.mux,
        );
        let bound: Vec<Multiaddr> = listeners
            .into_iter()
            .map(|listener| swarm.add_listener(listener))
            .collect();

        let shutdown = ShutdownHandle::new();
        let (stopped_tx, stopped) = watch::channel(false);

        let sweep = {
            let book = book.clone();
            let mut rx = shutdown.subscribe();
            let period = config.peerstore.sweep_interval();
            tokio::spawn(async move {
                let mut ticks = tokio::time::interval(period);
                ticks.tick().await;
                loop {
                    tokio::select! {
                        _ = ticks.tick() => {
                            let removed = book.sweep_expired();
                            trace!(removed, "swept expired addresses");
                        }
                        _ = requested(&mut rx) => break,
                    }
                }
            })
        };

        {
            let swarm = swarm.clone();
            let mut rx = shutdown.subscribe();
            tokio::spawn(async move {
                requested(&mut rx).await;
                info!("host shutting down");
                swarm.shutdown().await;
                let _ = sweep.await;
                stopped_tx.send_replace(true);
                info!("host stopped");
            });
        }

        info!(peer = %identity.peer_id(), addrs = ?bound, "host started");
        Ok(Self {
            inner: Arc::new(Inner {
                identity,
                book,
                handlers,
                swarm,
                shutdown,
                stopped,
            }),
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.inner.identity.peer_id()
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// Addresses currently being listened on, with port 0 resolved.
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.inner.swarm.listen_addrs()
    }

    pub fn peerstore(&self) -> &Arc<AddressBook> {
        &self.inner.book
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwarmEvent> {
        self.inner.swarm.subscribe()
    }

    /// Register (or replace) the handler for `protocol`.
    ///
    /// Each inbound stream for it runs the handler on its own task. Streams
    /// already dispatched keep the handler they started with.
    pub fn set_stream_handler<F, Fut>(&self, protocol: impl Into<String>, f: F)
    where
        F: Fn(Stream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.insert(protocol.into(), handler(f));
    }

    /// Returns whether a handler was registered.
    pub fn remove_stream_handler(&self, protocol: &str) -> bool {
        self.inner.handlers.remove(protocol)
    }

    pub fn protocols(&self) -> Vec<String> {
        self.inner.handlers.protocols()
    }

    /// Remember `info`'s addresses permanently and make sure a connection to
    /// the peer is live, dialing if needed.
    pub async fn connect(&self, info: &PeerInfo) -> Result<(), HostError> {
        self.guarded(async {
            self.inner
                .book
                .add_addrs(info.id, info.addrs.iter().cloned(), PERMANENT_ADDR_TTL);
            self.inner.swarm.dial(info.id).await?;
            Ok(())
        })
        .await
    }

    /// Open a stream to `peer` speaking `protocol`, dialing first if needed.
    pub async fn new_stream(&self, peer: PeerId, protocol: &str) -> Result<Stream, HostError> {
        self.guarded(async {
            let conn = self.inner.swarm.dial(peer).await?;
            debug!(%peer, protocol, "opening stream");
            match conn.open_stream(protocol).await {
                // Closed as a duplicate while we held it; use the survivor.
                Err(MuxError::ConnectionLost) => match self.inner.swarm.connection(&peer) {
                    Some(live) if live.id() != conn.id() => Ok(live.open_stream(protocol).await?),
                    _ => Err(HostError::ConnectionLost),
                },
                opened => Ok(opened?),
            }
        })
        .await
    }

    /// Returns whether a connection existed.
    pub async fn close_connection(&self, peer: &PeerId) -> bool {
        self.inner.swarm.close_connection(peer).await
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.inner.swarm.is_connected(peer)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.inner.swarm.connected_peers()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.inner.shutdown.clone()
    }

    /// Serve until shutdown is requested and teardown has finished.
    pub async fn run(&self) {
        let mut stopped = self.inner.stopped.clone();
        let _ = stopped.wait_for(|done| *done).await;
    }

    /// Stop listeners, close every connection and stop background tasks.
    ///
    /// Operations still in flight fail with [`HostError::Canceled`].
    pub async fn shutdown(&self) {
        self.inner.shutdown.shutdown();
        self.run().await;
    }

    /// Fail `fut` with `Canceled` if shutdown is requested before it completes.
    async fn guarded<T>(
        &self,
        fut: impl Future<Output = Result<T, HostError>>,
    ) -> Result<T, HostError> {
        let mut rx = self.inner.shutdown.subscribe();
        if *rx.borrow() {
            return Err(HostError::Canceled);
        }
        tokio::select! {
            biased;
            _ = requested(&mut rx) => Err(HostError::Canceled),
            result = fut => result,
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("peer_id", &self.peer_id())
            .field("protocols", &self.protocols())
            .finish_non_exhaustive()
    }
}
