//! `weft hello`: print everything peers send on `/hello/1.0.0`, or send a
//! single line to a listening peer.

use eyre::{Result, WrapErr};
use futures::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use weft_host::{Host, HostConfig, PeerInfo};

use crate::cli::HelloArgs;

pub(crate) const PROTOCOL: &str = "/hello/1.0.0";

const MESSAGE: &[u8] = b"Hello World!\n";

pub(crate) async fn run(args: HelloArgs, config: HostConfig) -> Result<()> {
    let host = super::start_host(&args.identity, args.port, config).await?;

    match args.target {
        Some(target) => {
            let sent = send(&host, &target).await;
            host.shutdown().await;
            sent
        }
        None => {
            let (tx, mut rx) = mpsc::unbounded_channel();
            register(&host, tx);
            let printer = tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    println!("{message}");
                }
            });
            info!("waiting for greetings...");
            let served = super::serve_until_ctrl_c(&host).await;
            printer.abort();
            served
        }
    }
}

/// Forward the contents of every inbound stream to `out`.
pub(crate) fn register(host: &Host, out: mpsc::UnboundedSender<String>) {
    host.set_stream_handler(PROTOCOL, move |mut stream| {
        let out = out.clone();
        async move {
            let mut buf = Vec::new();
            match stream.read_to_end(&mut buf).await {
                Ok(_) => {
                    let _ = out.send(String::from_utf8_lossy(&buf).into_owned());
                }
                Err(e) => warn!(peer = %stream.remote_peer(), error = %e, "failed to read stream"),
            }
        }
    });
}

pub(crate) async fn send(host: &Host, target: &PeerInfo) -> Result<()> {
    host.connect(target)
        .await
        .wrap_err_with(|| format!("failed to connect to {target}"))?;

    let mut stream = host
        .new_stream(target.id, PROTOCOL)
        .await
        .wrap_err("failed to open stream")?;
    stream.write_all(MESSAGE).await.wrap_err("failed to send")?;
    stream.close().await.wrap_err("failed to close stream")?;
    info!(peer = %target.id, "greeting sent");
    Ok(())
}
