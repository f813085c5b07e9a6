//! Local node identity for Weft hosts.
//!
//! Provides [`Identity`], an ed25519 keypair together with the [`PeerId`] derived
//! from its public key. The peer id is cached at construction time.

use std::fmt;
use std::sync::Arc;

use libp2p_identity::{DecodingError, Keypair, PublicKey, SigningError};

pub use libp2p::PeerId;

/// Errors from identity construction and signing.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid secret key: {0}")]
    InvalidKey(#[from] DecodingError),
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),
}

/// Local node identity: signing keypair and derived peer id.
///
/// Cheap to clone; the keypair is shared behind an `Arc`.
#[derive(Clone)]
pub struct Identity {
    keypair: Arc<Keypair>,
    peer_id: PeerId,
}

impl Identity {
    /// Creates an identity from an existing keypair.
    pub fn from_keypair(keypair: Keypair) -> Self {
        let peer_id = keypair.public().to_peer_id();
        Self {
            keypair: Arc::new(keypair),
            peer_id,
        }
    }

    /// Creates a random ephemeral identity.
    pub fn random() -> Self {
        Self::from_keypair(Keypair::generate_ed25519())
    }

    /// Creates a deterministic identity from a single seed byte.
    ///
    /// Two processes started with the same seed share a peer id, which lets a
    /// dialer name its target before the target has printed its address.
    pub fn from_seed(seed: u8) -> Result<Self, IdentityError> {
        let mut bytes = [0u8; 32];
        bytes[0] = seed;
        Self::from_ed25519_secret(bytes)
    }

    /// Creates an identity from a raw 32-byte ed25519 secret.
    pub fn from_ed25519_secret(secret: [u8; 32]) -> Result<Self, IdentityError> {
        let keypair = Keypair::ed25519_from_bytes(secret)?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn public(&self) -> PublicKey {
        self.keypair.public()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Signs `msg` with the identity key.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, IdentityError> {
        Ok(self.keypair.sign(msg)?)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

/// Decodes a protobuf-encoded public key received from a remote peer and
/// checks `signature` over `msg`. Returns the key's peer id on success.
pub fn verify_remote(
    encoded_key: &[u8],
    msg: &[u8],
    signature: &[u8],
) -> Result<PeerId, VerifyError> {
    let key = PublicKey::try_decode_protobuf(encoded_key)?;
    if !key.verify(msg, signature) {
        return Err(VerifyError::BadSignature);
    }
    Ok(key.to_peer_id())
}

/// Errors from [`verify_remote`].
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed public key: {0}")]
    MalformedKey(#[from] DecodingError),
    #[error("signature does not match public key")]
    BadSignature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_identities_differ() {
        let a = Identity::random();
        let b = Identity::random();
        assert_ne!(a.peer_id(), b.peer_id());
    }

    #[test]
    fn seed_is_deterministic() {
        let a = Identity::from_seed(7).unwrap();
        let b = Identity::from_seed(7).unwrap();
        let c = Identity::from_seed(8).unwrap();

        assert_eq!(a.peer_id(), b.peer_id());
        assert_ne!(a.peer_id(), c.peer_id());
    }

    #[test]
    fn peer_id_matches_public_key() {
        let identity = Identity::random();
        assert_eq!(identity.public().to_peer_id(), identity.peer_id());
    }

    #[test]
    fn sign_and_verify_remote() {
        let identity = Identity::random();
        let msg = b"nonce-bytes";
        let sig = identity.sign(msg).unwrap();

        let encoded = identity.public().encode_protobuf();
        let peer = verify_remote(&encoded, msg, &sig).unwrap();
        assert_eq!(peer, identity.peer_id());
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let identity = Identity::random();
        let sig = identity.sign(b"one").unwrap();

        let encoded = identity.public().encode_protobuf();
        let err = verify_remote(&encoded, b"two", &sig).unwrap_err();
        assert!(matches!(err, VerifyError::BadSignature));
    }

    #[test]
    fn verify_rejects_garbage_key() {
        let err = verify_remote(&[1, 2, 3], b"msg", &[0; 64]).unwrap_err();
        assert!(matches!(err, VerifyError::MalformedKey(_)));
    }

    #[test]
    fn debug_hides_key_material() {
        let identity = Identity::random();
        let rendered = format!("{identity:?}");
        assert!(rendered.contains(&identity.peer_id().to_string()));
    }
}
