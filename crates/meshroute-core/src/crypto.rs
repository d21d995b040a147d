//! Cryptographic primitives for meshroute.
//!
//! Provides two things:
//!   1. BLAKE3 key derivation for the sealed box
//!   2. A sealed box: anyone holding a recipient's public key can encrypt
//!      to it; only the holder of the private key can open the result
//!
//! The sealed box is what NodeInfo records are encrypted with when an
//! operator sets a management key. Transit agents without the key relay the
//! blob untouched.
//!
//! Keypairs are managed via x25519-dalek. All key material is zeroized on
//! drop. There is no unsafe code in this module.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

// ── BLAKE3 ────────────────────────────────────────────────────────────────────

/// BLAKE3 key-derivation context for sealed boxes. Changing this string
/// makes every existing sealed blob unreadable.
const SEAL_CONTEXT: &str = "meshroute 2024 sealed-box v1";

/// Derive the symmetric key for one sealed box.
///
///   key = BLAKE3-KDF(ctx, shared || ephemeral_pub || recipient_pub)
fn seal_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut material = Zeroizing::new([0u8; 96]);
    material[..32].copy_from_slice(shared);
    material[32..64].copy_from_slice(ephemeral);
    material[64..].copy_from_slice(recipient);
    Zeroizing::new(blake3::derive_key(SEAL_CONTEXT, &material[..]))
}

// ── Keypair ───────────────────────────────────────────────────────────────────

/// A long-term X25519 keypair.
///
/// For NodeInfo this is the management key: the public half is configured
/// on every agent, the private half only where metadata should be readable.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    /// Zeroized on drop.
    private: Zeroizing<[u8; 32]>,
    pub public: [u8; 32],
}

impl Keypair {
    /// Generate a new random X25519 keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(secret.to_bytes()),
            public: *public.as_bytes(),
        }
    }

    /// Reconstruct a keypair from stored private key bytes.
    /// The public key is derived deterministically from the private key.
    pub fn from_private(private_bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private_bytes);
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(private_bytes),
            public: *public.as_bytes(),
        }
    }

    /// Parse a private key from 64 hex characters, as stored in config.
    pub fn from_private_hex(text: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(hex::decode(text.trim()).map_err(|_| CryptoError::BadKey)?);
        let private: [u8; 32] = bytes.as_slice().try_into().map_err(|_| CryptoError::BadKey)?;
        Ok(Self::from_private(private))
    }

    /// Serialize the private key for persistent storage.
    pub fn private_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(*self.private)
    }

    /// Open a blob produced by [`seal`] for this keypair's public key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(CryptoError::TooShort);
        }
        let (ephemeral, rest) = sealed.split_at(32);
        let (nonce, ciphertext) = rest.split_at(12);
        let ephemeral: [u8; 32] = ephemeral.try_into().map_err(|_| CryptoError::TooShort)?;

        let secret = StaticSecret::from(*self.private);
        let shared = secret.diffie_hellman(&PublicKey::from(ephemeral));
        let key = seal_key(shared.as_bytes(), &ephemeral, &self.public);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Open)
    }
}

// ── Sealed box ────────────────────────────────────────────────────────────────

/// Bytes a sealed box adds to its plaintext: ephemeral key, nonce, MAC.
pub const SEAL_OVERHEAD: usize = 32 + 12 + 16;

/// Encrypt `plaintext` so that only the holder of `recipient`'s private key
/// can read it.
///
/// Wire layout:
///   [ephemeral X25519 public (32)] [nonce (12)] [ciphertext + MAC (len + 16)]
pub fn seal(recipient: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = StaticSecret::random_from_rng(rand::thread_rng());
    let ephemeral_pub = *PublicKey::from(&ephemeral).as_bytes();
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient));
    let key = seal_key(shared.as_bytes(), &ephemeral_pub, recipient);

    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Seal)?;

    let mut out = Vec::with_capacity(SEAL_OVERHEAD + plaintext.len());
    out.extend_from_slice(&ephemeral_pub);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Something that can open sealed blobs. The NodeInfo store holds one of
/// these when a management key is configured.
pub trait SealedOpener: Send + Sync {
    fn open_sealed(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

impl SealedOpener for Keypair {
    fn open_sealed(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.open(sealed)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("sealed blob too short (need at least {SEAL_OVERHEAD} bytes)")]
    TooShort,

    #[error("sealed blob failed authentication")]
    Open,

    #[error("encryption failed")]
    Seal,

    #[error("private key must be 32 bytes of hex")]
    BadKey,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
