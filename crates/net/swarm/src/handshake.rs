//! Identity handshake run on every raw connection, in both directions.
//!
//! Each side writes:
//! 1. the 12-byte protocol tag and a fresh 32-byte nonce
//! 2. its protobuf-encoded public key and a signature over the *remote's*
//!    nonce, each prefixed with a big-endian `u16` length
//!
//! Both sides write before they read, so neither waits on the other. Reads
//! are exact, leaving the socket positioned at the first multiplexer frame.
//! The session stays plaintext; only identities are authenticated.

use libp2p::PeerId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;
use weft_identity::{Identity, verify_remote};

use crate::HandshakeError;

pub const PROTOCOL_TAG: &[u8; 12] = b"/weft/auth/1";

pub const NONCE_LEN: usize = 32;

/// Longest public key or signature accepted from a remote.
const MAX_FIELD_LEN: usize = 1024;

/// Authenticate the remote end of `socket`.
///
/// With `expected` set (the dialing side), a remote presenting any other
/// peer id fails with [`HandshakeError::PeerIdMismatch`].
pub async fn handshake<S>(
    socket: &mut S,
    identity: &Identity,
    expected: Option<PeerId>,
) -> Result<PeerId, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let local_nonce: [u8; NONCE_LEN] = rand::random();

    let mut hello = Vec::with_capacity(PROTOCOL_TAG.len() + NONCE_LEN);
    hello.extend_from_slice(PROTOCOL_TAG);
    hello.extend_from_slice(&local_nonce);
    socket.write_all(&hello).await?;
    socket.flush().await?;

    let mut tag = [0u8; PROTOCOL_TAG.len()];
    socket.read_exact(&mut tag).await?;
    if &tag != PROTOCOL_TAG {
        return Err(HandshakeError::ProtocolMismatch);
    }
    let mut remote_nonce = [0u8; NONCE_LEN];
    socket.read_exact(&mut remote_nonce).await?;
    trace!("nonces exchanged");

    let key = identity.public().encode_protobuf();
    let signature = identity.sign(&remote_nonce)?;
    let mut proof = Vec::with_capacity(4 + key.len() + signature.len());
    put_field(&mut proof, &key);
    put_field(&mut proof, &signature);
    socket.write_all(&proof).await?;
    socket.flush().await?;

    let remote_key = read_field(socket).await?;
    let remote_sig = read_field(socket).await?;
    let actual = verify_remote(&remote_key, &local_nonce, &remote_sig)?;

    if let Some(expected) = expected
        && expected != actual
    {
        return Err(HandshakeError::PeerIdMismatch { expected, actual });
    }

    trace!(peer = %actual, "remote authenticated");
    Ok(actual)
}

fn put_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u16).to_be_bytes());
    buf.extend_from_slice(field);
}

async fn read_field<S>(socket: &mut S) -> Result<Vec<u8>, HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let len = socket.read_u16().await? as usize;
    if len > MAX_FIELD_LEN {
        return Err(HandshakeError::FieldTooLong(len));
    }
    let mut field = vec![0u8; len];
    socket.read_exact(&mut field).await?;
    Ok(field)
}
