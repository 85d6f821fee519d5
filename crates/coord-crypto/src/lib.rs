//! Keypair management and the authenticated wire codec (spec module A).
//!
//! Every message a node exchanges with the core is sealed with NaCl-box-style
//! authenticated encryption: an X25519 Diffie-Hellman exchange between the
//! sender's static key and the recipient's static key derives a shared
//! secret, which is stretched via HKDF-SHA256 into an XChaCha20-Poly1305 key.
//! The sealed frame is `nonce (24 bytes) || ciphertext`, matching the
//! "random nonce prepended to ciphertext" convention spec.md §6.1 requires.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::XChaCha20Poly1305;
use hkdf::Hkdf;
use rand_core::OsRng as WireCsprng;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

pub use x25519_dalek::PublicKey as NodePublicKey;

/// Domain separation label for the HKDF expand step. Any change here
/// invalidates every previously-sealed message, so it is fixed for the
/// lifetime of the wire protocol's version 1.
const WIRE_HKDF_INFO: &[u8] = b"coord-wire-v1";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("sealed message is too short to contain a nonce")]
    Truncated,
    #[error("authenticated decryption failed")]
    OpenFailed,
    #[error("invalid public key encoding: {0}")]
    InvalidPublicKey(String),
}

/// A long-term X25519 keypair, used both for the server's stable identity
/// (exposed via `GET /key`) and for a node's `machine_key`.
#[derive(Clone)]
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(WireCsprng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct a keypair from a 64-hex-character secret scalar, as read
    /// from persisted server configuration.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey("expected 32 bytes".into()))?;
        let secret = StaticSecret::from(arr);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    pub fn public(&self) -> PublicKey {
        self.public
    }

    /// The server's public key as the stable hex string `GET /key` returns.
    pub fn public_hex(&self) -> String {
        public_key_to_hex(&self.public)
    }

    /// Seal `plaintext` for `their_public`, authenticated with our secret key.
    pub fn seal(&self, their_public: &PublicKey, plaintext: &[u8]) -> Vec<u8> {
        seal(&self.secret, their_public, plaintext)
    }

    /// Open a frame sealed to our public key by `their_public`.
    pub fn open(&self, their_public: &PublicKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        open(&self.secret, their_public, sealed)
    }
}

fn derive_symmetric_key(secret: &StaticSecret, their_public: &PublicKey) -> [u8; 32] {
    let shared = secret.diffie_hellman(their_public);
    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(WIRE_HKDF_INFO, &mut key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    key
}

/// Seal `plaintext` so that only the holder of `their_public`'s matching
/// secret key can open it, authenticated as coming from `our_secret`.
pub fn seal(our_secret: &StaticSecret, their_public: &PublicKey, plaintext: &[u8]) -> Vec<u8> {
    let key = derive_symmetric_key(our_secret, their_public);
    let cipher = XChaCha20Poly1305::new((&key).into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("encryption over an unbounded-size buffer does not fail");

    let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out
}

/// Open a frame produced by [`seal`] from the peer holding `their_public`.
pub fn open(
    our_secret: &StaticSecret,
    their_public: &PublicKey,
    sealed: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    const NONCE_LEN: usize = 24;
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::Truncated);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let key = derive_symmetric_key(our_secret, their_public);
    let cipher = XChaCha20Poly1305::new((&key).into());
    cipher
        .decrypt(nonce_bytes.into(), ciphertext)
        .map_err(|_| CryptoError::OpenFailed)
}

/// Parse a hex-encoded X25519 public key, as nodes present their
/// `machine_key`/`node_key` on the wire.
pub fn parse_public_key_hex(s: &str) -> Result<PublicKey, CryptoError> {
    let trimmed = s.trim().trim_start_matches("mkey:").trim_start_matches("nkey:");
    let bytes = hex::decode(trimmed).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey("expected 32 bytes".into()))?;
    Ok(PublicKey::from(arr))
}

pub fn public_key_to_hex(pk: &PublicKey) -> String {
    hex::encode(pk.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let server = Keypair::generate();
        let node = Keypair::generate();

        let msg = b"register-request-payload";
        let sealed = node.seal(&server.public(), msg);
        let opened = server.open(&node.public(), &sealed).unwrap();
        assert_eq!(opened, msg);
    }

    #[test]
    fn open_rejects_tampered_ciphertext() {
        let server = Keypair::generate();
        let node = Keypair::generate();

        let mut sealed = node.seal(&server.public(), b"hello");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        assert!(server.open(&node.public(), &sealed).is_err());
    }

    #[test]
    fn open_rejects_wrong_sender_key() {
        let server = Keypair::generate();
        let node = Keypair::generate();
        let impostor = Keypair::generate();

        let sealed = node.seal(&server.public(), b"hello");
        assert!(server.open(&impostor.public(), &sealed).is_err());
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let server = Keypair::generate();
        let node = Keypair::generate();
        assert!(matches!(
            server.open(&node.public(), b"short"),
            Err(CryptoError::Truncated)
        ));
    }

    #[test]
    fn public_hex_round_trips() {
        let kp = Keypair::generate();
        let hex_str = kp.public_hex();
        let parsed = parse_public_key_hex(&hex_str).unwrap();
        assert_eq!(parsed.as_bytes(), kp.public().as_bytes());
    }

    #[test]
    fn parse_public_key_hex_accepts_prefixed_form() {
        let kp = Keypair::generate();
        let prefixed = format!("mkey:{}", kp.public_hex());
        let parsed = parse_public_key_hex(&prefixed).unwrap();
        assert_eq!(parsed.as_bytes(), kp.public().as_bytes());
    }
}
