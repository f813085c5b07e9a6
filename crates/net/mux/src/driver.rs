//! Per-connection task: demultiplexes inbound frames and writes queued ones.

use std::{sync::Arc, time::Duration};

use asynchronous_codec::{FramedRead, FramedWrite};
use futures::{SinkExt, StreamExt, channel::mpsc};
use tokio::{
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::watch,
};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tracing::{Instrument, debug, debug_span, trace, warn};

use crate::{
    InboundRouter, Stream,
    connection::{CloseReason, Entry, Inbound, OpenFailure, Shared},
    frame::{Frame, FrameCodec, FrameKind},
};

/// Upper bound on flushing queued frames during a local close.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type Reader = FramedRead<Compat<OwnedReadHalf>, FrameCodec>;
type Writer = FramedWrite<Compat<OwnedWriteHalf>, FrameCodec>;

pub(crate) struct Queues {
    pub(crate) ctrl_rx: mpsc::UnboundedReceiver<Frame>,
    pub(crate) data_rx: mpsc::Receiver<Frame>,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
}

pub(crate) async fn run(
    shared: Arc<Shared>,
    socket: TcpStream,
    router: Arc<dyn InboundRouter>,
    queues: Queues,
) {
    let Queues {
        mut ctrl_rx,
        mut data_rx,
        mut shutdown_rx,
    } = queues;

    let max = shared.config.max_frame_size;
    let (read_half, write_half) = socket.into_split();
    let mut reader = FramedRead::new(read_half.compat(), FrameCodec::new(max));
    let mut writer = FramedWrite::new(write_half.compat_write(), FrameCodec::new(max));

    let reason = tokio::select! {
        reason = read_loop(&shared, &mut reader, router.as_ref()) => reason,
        reason = write_loop(&mut writer, &mut ctrl_rx, &mut data_rx) => reason,
        _ = shutdown_rx.wait_for(|stop| *stop) => CloseReason::Local,
    };

    let dropped = shared.mark_closed();

    if reason == CloseReason::Local
        && tokio::time::timeout(DRAIN_TIMEOUT, drain(&mut writer, ctrl_rx, data_rx))
            .await
            .is_err()
    {
        debug!("timed out flushing queued frames");
    }

    match &reason {
        CloseReason::Error(e) => warn!(error = %e, streams = dropped, "connection failed"),
        other => debug!(reason = %other, streams = dropped, "connection closed"),
    }
    shared.closed.send_replace(Some(reason));
}

async fn read_loop(
    shared: &Arc<Shared>,
    reader: &mut Reader,
    router: &dyn InboundRouter,
) -> CloseReason {
    loop {
        let frame = match reader.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return CloseReason::Error(e.to_string()),
            None => return CloseReason::RemoteClosed,
        };
        trace!(stream = frame.stream_id, kind = ?frame.kind, len = frame.payload.len(), "frame in");

        match frame.kind {
            FrameKind::Open => on_open(shared, router, frame),
            FrameKind::Accept => {
                let pending = shared
                    .streams
                    .lock()
                    .entries
                    .get_mut(&frame.stream_id)
                    .and_then(|entry| entry.pending.take());
                if let Some(reply) = pending {
                    let _ = reply.send(Ok(()));
                }
            }
            FrameKind::Reject => {
                let entry = shared.streams.lock().entries.remove(&frame.stream_id);
                if let Some(reply) = entry.and_then(|entry| entry.pending) {
                    let _ = reply.send(Err(OpenFailure::Rejected));
                }
            }
            FrameKind::Data => {
                deliver(shared, frame.stream_id, Inbound::Data(frame.payload)).await;
            }
            FrameKind::Close => deliver(shared, frame.stream_id, Inbound::Fin).await,
            FrameKind::Reset => {
                let entry = shared.streams.lock().entries.remove(&frame.stream_id);
                if let Some(mut entry) = entry {
                    match entry.pending.take() {
                        Some(reply) => {
                            let _ = reply.send(Err(OpenFailure::Reset));
                        }
                        None => {
                            let _ = entry.inbound.send(Inbound::Reset).await;
                        }
                    }
                }
            }
        }
    }
}

/// Push to a stream's read side, waiting while its buffer is full. Nothing
/// else is read from the socket meanwhile, so a stream that is not being
/// read eventually stalls the remote writer.
///
/// Also used while an open is pending, in case the remote's data races its
/// `Accept`.
async fn deliver(shared: &Shared, id: u32, item: Inbound) {
    let inbound = shared
        .streams
        .lock()
        .entries
        .get(&id)
        .map(|entry| entry.inbound.clone());
    match inbound {
        // Fails only if the stream was dropped meanwhile.
        Some(mut inbound) => {
            let _ = inbound.send(item).await;
        }
        None => trace!(stream = id, "frame for unknown stream"),
    }
}

fn on_open(shared: &Arc<Shared>, router: &dyn InboundRouter, frame: Frame) {
    let id = frame.stream_id;
    let protocol = match frame.protocol() {
        Ok(protocol) => protocol.to_owned(),
        Err(e) => {
            debug!(stream = id, error = %e, "malformed open");
            shared.send_ctrl(Frame::reset(id));
            return;
        }
    };

    let mut table = shared.streams.lock();
    if !shared.is_remote_id(id) || table.entries.contains_key(&id) {
        drop(table);
        debug!(stream = id, "open with invalid stream id");
        shared.send_ctrl(Frame::reset(id));
        return;
    }

    let inbound = table
        .entries
        .keys()
        .filter(|id| shared.is_remote_id(**id))
        .count();
    if inbound >= shared.config.max_inbound_streams {
        drop(table);
        debug!(stream = id, %protocol, "inbound stream limit reached");
        shared.send_ctrl(Frame::reject(id));
        return;
    }

    let Some(handler) = router.route(&shared.remote, &protocol) else {
        drop(table);
        debug!(stream = id, %protocol, "no handler for protocol");
        shared.send_ctrl(Frame::reject(id));
        return;
    };

    let (inbound_tx, inbound_rx) = mpsc::channel(shared.config.read_buffer);
    table.entries.insert(
        id,
        Entry {
            inbound: inbound_tx,
            pending: None,
        },
    );
    // Queued under the lock so Accept precedes anything the handler writes.
    shared.send_ctrl(Frame::accept(id));
    drop(table);

    let stream = Stream::new(id, protocol.clone(), shared.clone(), inbound_rx);
    let span = debug_span!("stream", stream = id, %protocol);
    debug!(stream = id, %protocol, "accepted inbound stream");
    tokio::spawn(handler(stream).instrument(span));
}

async fn write_loop(
    writer: &mut Writer,
    ctrl_rx: &mut mpsc::UnboundedReceiver<Frame>,
    data_rx: &mut mpsc::Receiver<Frame>,
) -> CloseReason {
    loop {
        let frame = tokio::select! {
            biased;
            Some(frame) = ctrl_rx.next() => frame,
            Some(frame) = data_rx.next() => frame,
            else => return CloseReason::Local,
        };
        trace!(stream = frame.stream_id, kind = ?frame.kind, len = frame.payload.len(), "frame out");

        if let Err(e) = writer.send(frame).await {
            return CloseReason::Error(e.to_string());
        }
    }
}

/// Write whatever was queued before the close, then shut the write half.
async fn drain(
    writer: &mut Writer,
    mut ctrl_rx: mpsc::UnboundedReceiver<Frame>,
    mut data_rx: mpsc::Receiver<Frame>,
) {
    ctrl_rx.close();
    data_rx.close();

    while let Ok(Some(frame)) = ctrl_rx.try_next() {
        if writer.feed(frame).await.is_err() {
            return;
        }
    }
    while let Ok(Some(frame)) = data_rx.try_next() {
        if writer.feed(frame).await.is_err() {
            return;
        }
    }
    let _ = writer.close().await;
}
