//! Ed25519 identity and signing.
//!
//! Each agent owns one [`Identity`] (an Ed25519 keypair) for the lifetime
//! of the process. Blocks are signed over their canonical signing bytes
//! with a detached signature; verification goes through the creator's
//! [`PublicKey`].

use std::fmt;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

use crate::types::{Block, PublicKey, SIGNATURE_LEN, Signature};

/// Errors produced by key handling and signature verification.
#[derive(Debug)]
pub enum CryptoError {
    /// The 32 bytes do not decode to a valid Ed25519 point.
    InvalidPublicKey,
    /// The signature bytes have the wrong length or shape.
    MalformedSignature,
    /// The signature does not verify under the given key and message.
    VerificationFailed,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidPublicKey => write!(f, "invalid Ed25519 public key"),
            CryptoError::MalformedSignature => write!(f, "malformed Ed25519 signature"),
            CryptoError::VerificationFailed => write!(f, "signature verification failed"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// An agent's Ed25519 keypair.
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Derives a deterministic identity from a 32-byte seed.
    ///
    /// Used by tests and simulations that need reproducible agents.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Returns the public half of the keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs a message with a detached Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing_key.sign(message);
        Signature(sig.to_bytes().to_vec())
    }
}

impl PublicKey {
    /// Verifies a detached signature over `message` under this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(self.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)?;

        let bytes: [u8; SIGNATURE_LEN] = signature
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::MalformedSignature)?;
        let sig = ed25519_dalek::Signature::from_bytes(&bytes);

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl Block {
    /// Verifies the block signature against the creator's public key.
    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        self.public_key.verify(&self.signing_bytes(), &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::block::GENESIS_HASH;
    use crate::types::{Transaction, UNKNOWN_SEQ};

    #[test]
    fn sign_and_verify_roundtrip() {
        let identity = Identity::generate();
        let message = b"pairwise interaction";

        let signature = identity.sign(message);
        assert!(identity.public_key().verify(message, &signature).is_ok());
    }

    #[test]
    fn wrong_message_fails() {
        let identity = Identity::generate();
        let signature = identity.sign(b"one");
        assert!(identity.public_key().verify(b"two", &signature).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let a = Identity::generate();
        let b = Identity::generate();
        let signature = a.sign(b"message");
        assert!(b.public_key().verify(b"message", &signature).is_err());
    }

    #[test]
    fn seeded_identity_is_deterministic() {
        let a = Identity::from_seed([0xAB; 32]);
        let b = Identity::from_seed([0xAB; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn block_signature_covers_signing_bytes() {
        let identity = Identity::generate();
        let mut block = Block {
            public_key: identity.public_key(),
            sequence_number: 1,
            link_public_key: identity.public_key(),
            link_sequence_number: UNKNOWN_SEQ,
            previous_hash: GENESIS_HASH,
            signature: Signature::empty(),
            payload: Transaction::Empty.to_bytes(),
        };
        block.signature = identity.sign(&block.signing_bytes());

        assert!(block.verify_signature().is_ok());

        // Tampering with the payload invalidates the signature.
        block.payload = Transaction::Empty.to_bytes();
        block.sequence_number = 2;
        assert!(block.verify_signature().is_err());
    }

    #[test]
    fn empty_signature_is_rejected() {
        let identity = Identity::generate();
        let block = Block {
            public_key: identity.public_key(),
            sequence_number: 1,
            link_public_key: identity.public_key(),
            link_sequence_number: UNKNOWN_SEQ,
            previous_hash: GENESIS_HASH,
            signature: Signature::empty(),
            payload: Transaction::Empty.to_bytes(),
        };
        assert!(matches!(
            block.verify_signature(),
            Err(CryptoError::MalformedSignature)
        ));
    }
}
