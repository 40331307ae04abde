//! Node identity: signing, verification, and key agreement.
//!
//! The fabric components treat identity as an opaque collaborator. This
//! module defines that contract ([`Identity`]) and a default implementation
//! ([`NodeKeys`]) backed by Ed25519 signatures and X25519 key agreement.
//!
//! # Security Model
//!
//! - All critical messages must be signed and verified before trust
//! - Private key material never leaves this module
//! - Secrets must never be logged or hardcoded

use crate::error::{CoreError, CoreResult};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Nonce size for the one-shot seal/open cipher (96 bits).
const SEAL_NONCE_SIZE: usize = 12;

/// Key derivation context for one-shot authenticated encryption.
const SEAL_CONTEXT: &str = "sovra identity seal v1";

/// A signature together with the public key that produced it.
#[derive(Debug, Clone)]
pub struct SignatureBundle {
    /// Ed25519 signature (64 bytes)
    pub signature: Vec<u8>,
    /// Signer's public key
    pub public_key: [u8; 32],
}

/// Identity contract consumed by the channel, routing, and trust components.
///
/// Implementations own the private key material; callers only ever see
/// public keys, signatures, and derived symmetric secrets.
pub trait Identity: Send + Sync {
    /// Stable node identifier.
    fn node_id(&self) -> &str;

    /// Sign a message with the node's long-term signing key.
    fn sign(&self, message: &[u8]) -> CoreResult<SignatureBundle>;

    /// Verify a signature against the given public key.
    ///
    /// Returns `Ok(false)` for a well-formed but mismatching signature;
    /// `Err` only when the key or signature bytes cannot be parsed.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8; 32]) -> CoreResult<bool>;

    /// Public half of the Ed25519 signing keypair.
    fn signing_public_key(&self) -> [u8; 32];

    /// Public half of the X25519 exchange keypair.
    fn exchange_public_key(&self) -> [u8; 32];

    /// Derive a shared symmetric key with a peer via X25519.
    fn derive_shared_key(&self, peer_exchange_key: &[u8; 32]) -> CoreResult<[u8; 32]>;

    /// One-shot authenticated encryption to a peer (nonce prepended).
    fn seal(&self, plaintext: &[u8], peer_exchange_key: &[u8; 32]) -> CoreResult<Vec<u8>>;

    /// One-shot authenticated decryption from a peer.
    fn open(&self, ciphertext: &[u8], peer_exchange_key: &[u8; 32]) -> CoreResult<Vec<u8>>;
}

/// Read-only lookup of known signing keys by node id.
///
/// The trust store implements this; routing consults it (then discovery,
/// then self) when verifying hop signatures.
pub trait KeyDirectory: Send + Sync {
    /// Resolve the signing public key for a node, if known.
    fn signing_key_for(&self, node_id: &str) -> Option<[u8; 32]>;
}

/// Default in-process identity backed by Ed25519 + X25519 keypairs.
pub struct NodeKeys {
    node_id: String,
    signing_key: SigningKey,
    exchange_secret: StaticSecret,
    exchange_public: X25519PublicKey,
}

impl NodeKeys {
    /// Generate a fresh identity with keys from the OS RNG.
    pub fn generate(node_id: impl Into<String>) -> Self {
        let mut rng = rand::thread_rng();
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        let exchange_secret = StaticSecret::random_from_rng(&mut rng);
        let exchange_public = X25519PublicKey::from(&exchange_secret);

        Self {
            node_id: node_id.into(),
            signing_key,
            exchange_secret,
            exchange_public,
        }
    }

    /// Restore an identity from stored 32-byte seeds.
    pub fn from_seeds(
        node_id: impl Into<String>,
        signing_seed: [u8; 32],
        exchange_seed: [u8; 32],
    ) -> Self {
        let signing_key = SigningKey::from_bytes(&signing_seed);
        let exchange_secret = StaticSecret::from(exchange_seed);
        let exchange_public = X25519PublicKey::from(&exchange_secret);

        Self {
            node_id: node_id.into(),
            signing_key,
            exchange_secret,
            exchange_public,
        }
    }

    fn seal_cipher(&self, peer_exchange_key: &[u8; 32]) -> CoreResult<ChaCha20Poly1305> {
        let shared = self.derive_shared_key(peer_exchange_key)?;
        let key = blake3::derive_key(SEAL_CONTEXT, &shared);
        Ok(ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(
            &key,
        )))
    }
}

impl Identity for NodeKeys {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn sign(&self, message: &[u8]) -> CoreResult<SignatureBundle> {
        let signature = self.signing_key.sign(message);
        Ok(SignatureBundle {
            signature: signature.to_bytes().to_vec(),
            public_key: self.signing_key.verifying_key().to_bytes(),
        })
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8; 32]) -> CoreResult<bool> {
        let key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        let sig = Signature::from_slice(signature)
            .map_err(|e| CoreError::Crypto(format!("malformed signature: {e}")))?;
        Ok(key.verify(message, &sig).is_ok())
    }

    fn signing_public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    fn exchange_public_key(&self) -> [u8; 32] {
        self.exchange_public.to_bytes()
    }

    fn derive_shared_key(&self, peer_exchange_key: &[u8; 32]) -> CoreResult<[u8; 32]> {
        let peer_public = X25519PublicKey::from(*peer_exchange_key);
        let shared = self.exchange_secret.diffie_hellman(&peer_public);
        Ok(shared.to_bytes())
    }

    fn seal(&self, plaintext: &[u8], peer_exchange_key: &[u8; 32]) -> CoreResult<Vec<u8>> {
        let cipher = self.seal_cipher(peer_exchange_key)?;
        let mut nonce_bytes = [0u8; SEAL_NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CoreError::Crypto(format!("seal failed: {e}")))?;

        let mut out = Vec::with_capacity(SEAL_NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, ciphertext: &[u8], peer_exchange_key: &[u8; 32]) -> CoreResult<Vec<u8>> {
        if ciphertext.len() < SEAL_NONCE_SIZE {
            return Err(CoreError::Crypto("ciphertext too short".to_string()));
        }
        let cipher = self.seal_cipher(peer_exchange_key)?;
        let (nonce_bytes, body) = ciphertext.split_at(SEAL_NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, body)
            .map_err(|e| CoreError::Crypto(format!("open failed: {e}")))
    }
}
