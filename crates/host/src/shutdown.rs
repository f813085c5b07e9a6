use std::{io, sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::HostError;

/// Triggers host shutdown from anywhere, e.g. a signal handler.
///
/// Cloned out of a running [`Host`](crate::Host) with
/// [`Host::shutdown_handle`](crate::Host::shutdown_handle).
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Idempotent; returns immediately.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once shutdown was requested or every handle is gone.
pub(crate) async fn requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// A caller deadline passed before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} exceeded")]
pub struct Elapsed(pub Duration);

impl From<Elapsed> for HostError {
    fn from(elapsed: Elapsed) -> Self {
        Self::DeadlineExceeded(elapsed.0)
    }
}

impl From<Elapsed> for io::Error {
    fn from(elapsed: Elapsed) -> Self {
        io::Error::new(io::ErrorKind::TimedOut, elapsed)
    }
}

/// Run `fut`, failing with [`Elapsed`] converted into its error type if it
/// takes longer than `deadline`. The future is dropped (canceled) on expiry.
///
/// Works for host operations (`HostError::DeadlineExceeded`) and stream I/O
/// (`io::ErrorKind::TimedOut`) alike.
pub async fn with_deadline<F, T, E>(deadline: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<Elapsed>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| E::from(Elapsed(deadline)))?
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn deadline_maps_to_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, HostError>(())
        };
        assert_matches!(
            with_deadline(Duration::from_millis(20), slow).await,
            Err(HostError::DeadlineExceeded(d)) if d == Duration::from_millis(20)
        );

        let fast = async { Ok::<_, HostError>(7) };
        assert_eq!(with_deadline(Duration::from_secs(1), fast).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn deadline_applies_to_io() {
        let stuck = std::future::pending::<io::Result<usize>>();
        let err = with_deadline(Duration::from_millis(20), stuck).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn handle_wakes_waiters() {
        let handle = ShutdownHandle::new();
        let mut rx = handle.subscribe();
        let waiter = tokio::spawn(async move { requested(&mut rx).await });

        assert!(!handle.is_shutdown());
        handle.clone().shutdown();
        waiter.await.unwrap();
        assert!(handle.is_shutdown());
    }
}
