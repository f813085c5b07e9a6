//! `weft id`: print a peer id.

use eyre::Result;

use crate::cli::IdArgs;

pub(crate) fn run(args: IdArgs) -> Result<()> {
    println!("example peer id: {}", args.identity.identity()?.peer_id());
    Ok(())
}
