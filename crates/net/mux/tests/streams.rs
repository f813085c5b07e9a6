use std::{collections::HashMap, io, sync::Arc, time::Duration};

use assert_matches::assert_matches;
use futures::{AsyncReadExt, AsyncWriteExt};
use libp2p::{Multiaddr, PeerId};
use tokio::{
    io::AsyncWriteExt as _,
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use weft_net_mux::{
    CloseReason, Connection, Direction, InboundRouter, MuxConfig, MuxError, RejectAll, Stream,
    StreamError, StreamHandler, handler, stream_error,
};

#[derive(Default)]
struct Handlers(HashMap<String, StreamHandler>);

impl Handlers {
    fn with(mut self, protocol: &str, h: StreamHandler) -> Self {
        self.0.insert(protocol.to_owned(), h);
        self
    }
}

impl InboundRouter for Handlers {
    fn route(&self, _remote: &PeerId, protocol: &str) -> Option<StreamHandler> {
        self.0.get(protocol).cloned()
    }
}

fn addr() -> Multiaddr {
    "/ip4/127.0.0.1/tcp/0".parse().unwrap()
}

async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    let (dialed, accepted) = tokio::join!(TcpStream::connect(target), listener.accept());
    (dialed.unwrap(), accepted.unwrap().0)
}

/// Dialer connection with no handlers, listener connection using `router`.
async fn pair_with(router: impl InboundRouter, config: MuxConfig) -> (Connection, Connection) {
    let (dialed, accepted) = socket_pair().await;
    let dialer = Connection::new(
        dialed,
        PeerId::random(),
        addr(),
        Direction::Outbound,
        config.clone(),
        Arc::new(RejectAll),
    );
    let listener = Connection::new(
        accepted,
        PeerId::random(),
        addr(),
        Direction::Inbound,
        config,
        Arc::new(router),
    );
    (dialer, listener)
}

async fn pair(router: impl InboundRouter) -> (Connection, Connection) {
    pair_with(router, MuxConfig::default()).await
}

fn echo_handler() -> StreamHandler {
    handler(|mut stream: Stream| async move {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        stream.write_all(&buf).await.unwrap();
        stream.close().await.unwrap();
    })
}

#[tokio::test]
async fn handler_writes_then_closes() {
    let router = Handlers::default().with(
        "/echo/1.0.0",
        handler(|mut stream: Stream| async move {
            stream.write_all(b"hello libp2p!").await.unwrap();
            stream.close().await.unwrap();
        }),
    );
    let (dialer, _listener) = pair(router).await;

    let mut stream = dialer.open_stream("/echo/1.0.0").await.unwrap();
    assert_eq!(stream.protocol(), "/echo/1.0.0");
    assert_eq!(stream.id() % 2, 1);

    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "hello libp2p!");
}

#[tokio::test]
async fn unmatched_protocol_is_rejected() {
    let (dialer, _listener) = pair(Handlers::default()).await;

    let err = dialer.open_stream("/nope/1.0.0").await.unwrap_err();
    assert_eq!(
        err,
        MuxError::ProtocolRejected {
            protocol: "/nope/1.0.0".into()
        }
    );
    assert_eq!(dialer.num_streams(), 0);
}

#[tokio::test]
async fn half_close_still_reads_reply() {
    let (dialer, _listener) = pair(Handlers::default().with("/echo", echo_handler())).await;

    let mut stream = dialer.open_stream("/echo").await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    stream.close().await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, b"ping");
}

#[tokio::test]
async fn handler_runs_once_and_sees_exact_bytes() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let router = Handlers::default().with(
        "/sink",
        handler(move |mut stream: Stream| {
            let tx = tx.clone();
            async move {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf).await.unwrap();
                tx.send(buf).unwrap();
            }
        }),
    );
    let (dialer, _listener) = pair(router).await;

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let mut stream = dialer.open_stream("/sink").await.unwrap();
    stream.write_all(&payload).await.unwrap();
    stream.close().await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), payload);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_streams_do_not_mix() {
    let (dialer, _listener) = pair(Handlers::default().with("/echo", echo_handler())).await;

    let tasks: Vec<_> = (0..32u8)
        .map(|n| {
            let conn = dialer.clone();
            tokio::spawn(async move {
                let payload = vec![n; 4096 + n as usize];
                let mut stream = conn.open_stream("/echo").await.unwrap();
                for chunk in payload.chunks(500) {
                    stream.write_all(chunk).await.unwrap();
                }
                stream.close().await.unwrap();

                let mut reply = Vec::new();
                stream.read_to_end(&mut reply).await.unwrap();
                assert_eq!(reply, payload);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn writes_larger_than_a_frame_are_split() {
    let config = MuxConfig::default().with_max_frame_size(16);
    let (dialer, _listener) =
        pair_with(Handlers::default().with("/echo", echo_handler()), config).await;

    let mut stream = dialer.open_stream("/echo").await.unwrap();
    stream.write_all(&[7u8; 100]).await.unwrap();
    stream.close().await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, vec![7u8; 100]);
}

#[tokio::test]
async fn dropping_unclosed_stream_resets_it() {
    let router = Handlers::default().with(
        "/drop",
        handler(|stream: Stream| async move {
            drop(stream);
        }),
    );
    let (dialer, _listener) = pair(router).await;

    let mut stream = dialer.open_stream("/drop").await.unwrap();
    let mut buf = [0u8; 8];
    let err = stream.read(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    assert_eq!(stream_error(&err), Some(StreamError::Reset));
}

#[tokio::test]
async fn write_after_close_is_broken_pipe() {
    let (dialer, _listener) = pair(Handlers::default().with("/echo", echo_handler())).await;

    let mut stream = dialer.open_stream("/echo").await.unwrap();
    stream.close().await.unwrap();
    let err = stream.write_all(b"late").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
}

#[tokio::test]
async fn closing_connection_fails_streams() {
    let (opened_tx, mut opened_rx) = mpsc::unbounded_channel();
    let router = Handlers::default().with(
        "/hold",
        handler(move |mut stream: Stream| {
            let opened_tx = opened_tx.clone();
            async move {
                opened_tx.send(()).unwrap();
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf).await;
            }
        }),
    );
    let (dialer, _listener) = pair(router).await;

    let mut stream = dialer.open_stream("/hold").await.unwrap();
    opened_rx.recv().await.unwrap();

    assert_eq!(dialer.close().await, CloseReason::Local);
    assert!(dialer.is_closed());

    let err = stream.write_all(b"x").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);

    let mut buf = [0u8; 1];
    let err = stream.read(&mut buf).await.unwrap_err();
    assert_eq!(stream_error(&err), Some(StreamError::ConnectionLost));

    assert_matches!(
        dialer.open_stream("/hold").await,
        Err(MuxError::ConnectionLost)
    );
}

#[tokio::test]
async fn remote_close_is_observed() {
    let (dialer, listener) = pair(Handlers::default()).await;

    listener.close().await;
    assert_eq!(dialer.closed().await, CloseReason::RemoteClosed);
}

#[tokio::test]
async fn unanswered_open_times_out_and_is_cleaned_up() {
    let (dialed, _silent) = socket_pair().await;
    let config = MuxConfig::default().with_open_timeout(Duration::from_millis(100));
    let conn = Connection::new(
        dialed,
        PeerId::random(),
        addr(),
        Direction::Outbound,
        config,
        Arc::new(RejectAll),
    );

    let err = conn.open_stream("/echo/1.0.0").await.unwrap_err();
    assert_matches!(err, MuxError::DeadlineExceeded(d) if d == Duration::from_millis(100));
    assert_eq!(conn.num_streams(), 0);
}

#[tokio::test]
async fn inbound_stream_limit_rejects_extra_opens() {
    let router = Handlers::default().with(
        "/hold",
        handler(|mut stream: Stream| async move {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf).await;
        }),
    );
    let config = MuxConfig::default().with_max_inbound_streams(1);
    let (dialer, _listener) = pair_with(router, config).await;

    let _first = dialer.open_stream("/hold").await.unwrap();
    assert_matches!(
        dialer.open_stream("/hold").await,
        Err(MuxError::ProtocolRejected { .. })
    );
}

#[tokio::test]
async fn oversized_frame_tears_down_connection() {
    let (dialed, accepted) = socket_pair().await;
    let config = MuxConfig::default().with_max_frame_size(64);
    let conn = Connection::new(
        accepted,
        PeerId::random(),
        addr(),
        Direction::Inbound,
        config,
        Arc::new(RejectAll),
    );

    let mut raw = dialed;
    // stream 1, Data, length 65
    raw.write_all(&[0, 0, 0, 1, 3, 0, 0, 0, 65]).await.unwrap();

    assert_matches!(conn.closed().await, CloseReason::Error(_));
}

#[tokio::test]
async fn unread_stream_stalls_the_writer() {
    let (parked_tx, mut parked_rx) = mpsc::unbounded_channel();
    let router = Handlers::default().with(
        "/park",
        handler(move |stream: Stream| {
            let parked_tx = parked_tx.clone();
            async move {
                parked_tx.send(stream).unwrap();
            }
        }),
    );
    let config = MuxConfig::default()
        .with_max_frame_size(16 * 1024)
        .with_write_queue(4)
        .with_read_buffer(4);
    let (dialer, _listener) = pair_with(router, config).await;

    let mut stream = dialer.open_stream("/park").await.unwrap();
    let mut parked = parked_rx.recv().await.unwrap();

    let chunk = vec![0u8; 256 * 1024];
    let flood = async {
        for _ in 0..256 {
            stream.write_all(&chunk).await?;
        }
        io::Result::Ok(())
    };
    assert!(
        tokio::time::timeout(Duration::from_secs(2), flood)
            .await
            .is_err(),
        "64 MiB were accepted by a stream nobody reads"
    );

    // What was buffered is still there.
    let mut buf = vec![0u8; 1024];
    assert_eq!(parked.read(&mut buf).await.unwrap(), 1024);
}

#[tokio::test]
async fn dropping_after_close_resets_remote_writer() {
    let router = Handlers::default().with(
        "/bye",
        handler(|mut stream: Stream| async move {
            stream.write_all(b"bye").await.unwrap();
            stream.close().await.unwrap();
        }),
    );
    let (dialer, _listener) = pair(router).await;

    let mut stream = dialer.open_stream("/bye").await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"bye");

    let chunk = [1u8; 1024];
    let mut failure = None;
    for _ in 0..200 {
        if let Err(e) = stream.write_all(&chunk).await {
            failure = Some(e);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let err = failure.expect("writes to a dropped stream kept succeeding");
    assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    assert_eq!(stream_error(&err), Some(StreamError::Reset));
}
