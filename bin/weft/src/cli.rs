//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use weft_host::{Multiaddr, PeerInfo};

/// Weft - peer host over multiplexed TCP
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    /// Host configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Serve `/echo/1.0.0`, and optionally read the greeting from another peer.
    Echo(EchoArgs),
    /// Print what peers send on `/hello/1.0.0`, or send them a line.
    Hello(HelloArgs),
    /// Print a peer id.
    Id(IdArgs),
}

/// Logging configuration.
#[derive(Debug, Default, Args, Clone)]
#[command(next_help_heading = "Logging")]
pub(crate) struct LogArgs {
    /// Silence all output except errors.
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Verbose mode (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbosity: u8,

    /// Log filter directive (e.g., "weft_net_mux=trace,weft_host=debug").
    #[arg(long = "log.filter", global = true, value_name = "DIRECTIVE")]
    pub(crate) filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json", global = true)]
    pub(crate) json: bool,
}

/// Identity selection shared by the host-running commands.
#[derive(Debug, Args, Clone, Copy)]
pub(crate) struct IdentityArgs {
    /// Derive the identity from this seed instead of generating a random one.
    #[arg(long, value_name = "N")]
    pub(crate) seed: Option<u8>,
}

#[derive(Debug, Args)]
pub(crate) struct EchoArgs {
    /// Port to listen on (0 picks a free one).
    #[arg(short = 'l', long = "listen", default_value_t = 0, value_name = "PORT")]
    pub(crate) port: u16,

    /// Peer to dial, e.g. /ip4/127.0.0.1/tcp/5550/p2p/<id>.
    #[arg(short = 'd', long = "dial", value_name = "MULTIADDR", value_parser = parse_peer_info)]
    pub(crate) target: Option<PeerInfo>,

    #[command(flatten)]
    pub(crate) identity: IdentityArgs,
}

#[derive(Debug, Args)]
pub(crate) struct HelloArgs {
    /// Port to listen on.
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub(crate) port: u16,

    /// Peer to greet, e.g. /ip4/127.0.0.1/tcp/5550/p2p/<id>.
    #[arg(long, value_name = "MULTIADDR", value_parser = parse_peer_info)]
    pub(crate) target: Option<PeerInfo>,

    #[command(flatten)]
    pub(crate) identity: IdentityArgs,
}

#[derive(Debug, Args)]
pub(crate) struct IdArgs {
    #[command(flatten)]
    pub(crate) identity: IdentityArgs,
}

fn parse_peer_info(s: &str) -> Result<PeerInfo, String> {
    let info: PeerInfo = s.parse().map_err(|e| format!("{e}"))?;
    if info.addrs.is_empty() {
        return Err(format!("{s} has no transport address before /p2p/"));
    }
    Ok(info)
}

/// `/ip4/0.0.0.0/tcp/<port>`
pub(crate) fn listen_addr(port: u16) -> Multiaddr {
    Multiaddr::empty()
        .with(std::net::Ipv4Addr::UNSPECIFIED.into())
        .with(weft_host::Protocol::Tcp(port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_flags() {
        let id = weft_host::Identity::from_seed(1).unwrap().peer_id();
        let cli = Cli::try_parse_from([
            "weft",
            "-vv",
            "echo",
            "-l",
            "5551",
            "-d",
            &format!("/ip4/127.0.0.1/tcp/5550/ipfs/{id}"),
        ])
        .unwrap();

        assert_eq!(cli.logs.verbosity, 2);
        let Commands::Echo(args) = cli.command else {
            panic!("expected echo");
        };
        assert_eq!(args.port, 5551);
        let target = args.target.unwrap();
        assert_eq!(target.id, id);
        assert_eq!(target.addrs[0].to_string(), "/ip4/127.0.0.1/tcp/5550");
    }

    #[test]
    fn dial_target_needs_peer_id() {
        let err = Cli::try_parse_from(["weft", "echo", "-d", "/ip4/127.0.0.1/tcp/5550"]);
        assert!(err.is_err());
    }

    #[test]
    fn hello_requires_port() {
        assert!(Cli::try_parse_from(["weft", "hello"]).is_err());
        let cli = Cli::try_parse_from(["weft", "hello", "-p", "4001", "--seed", "3"]).unwrap();
        let Commands::Hello(args) = cli.command else {
            panic!("expected hello");
        };
        assert_eq!(args.port, 4001);
        assert_eq!(args.identity.seed, Some(3));
        assert!(args.target.is_none());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["weft", "id", "--log.json", "--config", "weft.toml"]).unwrap();
        assert!(cli.logs.json);
        assert_eq!(cli.config, Some(PathBuf::from("weft.toml")));
    }

    #[test]
    fn listen_addr_is_unspecified_ipv4() {
        assert_eq!(listen_addr(5550).to_string(), "/ip4/0.0.0.0/tcp/5550");
    }
}
