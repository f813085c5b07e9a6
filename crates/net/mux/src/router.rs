//! Dispatch of remotely-opened streams.

use std::sync::Arc;

use auto_impl::auto_impl;
use futures::future::BoxFuture;
use libp2p::PeerId;

use crate::Stream;

/// Callback run on its own task for every accepted inbound stream.
pub type StreamHandler = Arc<dyn Fn(Stream) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`StreamHandler`].
pub fn handler<F, Fut>(f: F) -> StreamHandler
where
    F: Fn(Stream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |stream| Box::pin(f(stream)))
}

/// Resolves the handler for an inbound `Open`.
///
/// Returning `None` rejects the stream.
#[auto_impl(Arc, Box)]
pub trait InboundRouter: Send + Sync + 'static {
    fn route(&self, remote: &PeerId, protocol: &str) -> Option<StreamHandler>;
}

/// Rejects every inbound stream. Used by dial-only connections in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

impl InboundRouter for RejectAll {
    fn route(&self, _remote: &PeerId, _protocol: &str) -> Option<StreamHandler> {
        None
    }
}
