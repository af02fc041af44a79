//! Ed25519 key pairs and signatures for account credentials.

use crate::{Address, HexError};
use ed25519_dalek::{Signer, Verifier};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A signing credential for one account.
#[derive(Clone)]
pub struct KeyPair(ed25519_dalek::SigningKey);

impl KeyPair {
    /// Generate a new random keypair from the OS RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self::generate_with(&mut csprng)
    }

    /// Generate a keypair from the given RNG.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        KeyPair(ed25519_dalek::SigningKey::generate(rng))
    }

    /// Build a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        KeyPair(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    /// Parse a keypair from its hex-encoded secret seed.
    pub fn from_seed_hex(seed: &str) -> Result<Self, KeyError> {
        let seed = seed.trim();
        if seed.len() != 64 {
            return Err(KeyError::InvalidSeed(HexError::InvalidLength {
                expected: 64,
                actual: seed.len(),
            }));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(seed, &mut bytes)
            .map_err(|_| KeyError::InvalidSeed(HexError::InvalidHex))?;
        Ok(Self::from_seed(&bytes))
    }

    /// Hex-encoded secret seed.
    pub fn seed_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message).to_bytes())
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    /// Account address controlled by this keypair.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.address().short())
    }
}

/// An ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Verify a signature.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let pk = match ed25519_dalek::VerifyingKey::from_bytes(&self.0) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        pk.verify(message, &sig).is_ok()
    }

    /// Address derived from this key.
    pub fn address(&self) -> Address {
        Address::new(hex::encode(self.0))
    }

    /// Recover the public key behind an address.
    pub fn from_address(address: &Address) -> Result<Self, KeyError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(address.as_str(), &mut bytes)
            .map_err(|_| KeyError::InvalidAddress(address.to_string()))?;
        Ok(PublicKey(bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

/// An ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Get signature as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", &hex::encode(self.0)[..16])
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(&hex, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(Signature(bytes))
    }
}

/// Errors from parsing key material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid secret seed: {0}")]
    InvalidSeed(HexError),

    #[error("Address is not a public key: {0}")]
    InvalidAddress(String),
}
