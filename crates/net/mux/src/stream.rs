//! A single multiplexed byte stream.

use std::{
    fmt, io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use bytes::{Buf, Bytes};
use futures::{AsyncRead, AsyncWrite, StreamExt, channel::mpsc};
use libp2p::PeerId;

use crate::{
    ConnectionId, StreamError,
    connection::{Inbound, Shared},
    frame::Frame,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Open,
    Eof,
    Reset,
    Lost,
}

/// Ordered, bidirectional byte channel over a [`Connection`](crate::Connection).
///
/// `close()` half-closes: the remote reads EOF once everything written before
/// it has arrived, while this side can keep reading. Dropping a stream whose
/// write side is still open resets it.
pub struct Stream {
    id: u32,
    protocol: String,
    shared: Arc<Shared>,
    data_tx: mpsc::Sender<Frame>,
    inbound: mpsc::Receiver<Inbound>,
    read_buf: Bytes,
    read_state: ReadState,
    write_closed: bool,
    /// Entry already released; nothing left to do on drop.
    released: bool,
}

impl Stream {
    pub(crate) fn new(
        id: u32,
        protocol: String,
        shared: Arc<Shared>,
        inbound: mpsc::Receiver<Inbound>,
    ) -> Self {
        Self {
            id,
            protocol,
            data_tx: shared.data_tx.clone(),
            shared,
            inbound,
            read_buf: Bytes::new(),
            read_state: ReadState::Open,
            write_closed: false,
            released: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn remote_peer(&self) -> PeerId {
        self.shared.remote
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Abort the stream in both directions.
    pub fn reset(mut self) {
        if self.release() {
            self.shared.send_ctrl(Frame::reset(self.id));
        }
    }

    /// Drop the stream's entry. Returns whether it was still registered.
    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.shared.streams.lock().entries.remove(&self.id).is_some()
    }

    /// Queue a `Reset` behind the `Close` already on the data queue, so the
    /// remote still reads everything written before it.
    fn reset_after_close(&self) {
        // A fresh sender always has a slot of its own.
        if let Err(e) = self.data_tx.clone().try_send(Frame::reset(self.id))
            && !e.is_disconnected()
        {
            self.shared.send_ctrl(e.into_inner());
        }
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.write_closed {
            return Err(StreamError::WriteClosed.into());
        }
        match self.shared.stream_status(self.id) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        loop {
            if !this.read_buf.is_empty() {
                let n = io::Read::read(&mut this.read_buf.as_ref(), buf)?;
                this.read_buf.advance(n);
                return Poll::Ready(Ok(n));
            }

            match this.read_state {
                ReadState::Open => {}
                ReadState::Eof => return Poll::Ready(Ok(0)),
                ReadState::Reset => return Poll::Ready(Err(StreamError::Reset.into())),
                ReadState::Lost => return Poll::Ready(Err(StreamError::ConnectionLost.into())),
            }

            this.read_state = match ready!(this.inbound.poll_next_unpin(cx)) {
                Some(Inbound::Data(data)) => {
                    this.read_buf = data;
                    continue;
                }
                Some(Inbound::Fin) => ReadState::Eof,
                Some(Inbound::Reset) => ReadState::Reset,
                // Sender dropped with the table on connection teardown.
                None => ReadState::Lost,
            };
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        this.check_writable()?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        ready!(this.data_tx.poll_ready(cx)).map_err(|_| StreamError::ConnectionLost)?;

        let n = buf.len().min(this.shared.config.max_frame_size);
        let chunk = Bytes::copy_from_slice(&buf[..n]);
        this.data_tx
            .start_send(Frame::data(this.id, chunk))
            .map_err(|_| StreamError::ConnectionLost)?;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Frames are flushed to the socket by the connection driver.
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.write_closed {
            return Poll::Ready(Ok(()));
        }
        this.check_writable()?;

        ready!(this.data_tx.poll_ready(cx)).map_err(|_| StreamError::ConnectionLost)?;
        this.data_tx
            .start_send(Frame::close(this.id))
            .map_err(|_| StreamError::ConnectionLost)?;
        this.write_closed = true;
        Poll::Ready(Ok(()))
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if !self.release() {
            return;
        }
        if !self.write_closed {
            self.shared.send_ctrl(Frame::reset(self.id));
        } else if self.read_state == ReadState::Open {
            // The remote may still be writing; fail its writes instead of
            // discarding them.
            self.reset_after_close();
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("remote", &self.shared.remote)
            .field("read_state", &self.read_state)
            .field("write_closed", &self.write_closed)
            .finish()
    }
}
