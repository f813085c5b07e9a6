//! `weft echo`: greet every stream on `/echo/1.0.0`; optionally dial a peer
//! and print its greeting.

use eyre::{Result, WrapErr};
use futures::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};
use weft_host::{Host, HostConfig, PeerInfo};

use crate::cli::EchoArgs;

pub(crate) const PROTOCOL: &str = "/echo/1.0.0";

pub(crate) const GREETING: &[u8] = b"hello libp2p!";

pub(crate) async fn run(args: EchoArgs, config: HostConfig) -> Result<()> {
    let host = super::start_host(&args.identity, args.port, config).await?;
    register(&host);

    match args.target {
        None => {
            info!("listening for connections...");
            super::serve_until_ctrl_c(&host).await
        }
        Some(target) => {
            let got = fetch_greeting(&host, &target).await;
            host.shutdown().await;
            println!("GOT: {}", got?);
            Ok(())
        }
    }
}

pub(crate) fn register(host: &Host) {
    host.set_stream_handler(PROTOCOL, |mut stream| async move {
        info!(peer = %stream.remote_peer(), "writing message");
        if let Err(e) = stream.write_all(GREETING).await {
            warn!(error = %e, "failed to write greeting");
            return;
        }
        let _ = stream.close().await;
    });
}

pub(crate) async fn fetch_greeting(host: &Host, target: &PeerInfo) -> Result<String> {
    info!(peer = %target.id, "connecting to target");
    host.connect(target)
        .await
        .wrap_err_with(|| format!("failed to connect to {target}"))?;

    info!("opening stream...");
    let mut stream = host
        .new_stream(target.id, PROTOCOL)
        .await
        .wrap_err("failed to open stream")?;

    info!("reading message");
    let mut out = String::new();
    stream
        .read_to_string(&mut out)
        .await
        .wrap_err("failed to read greeting")?;
    Ok(out)
}
