//! Key material for fixture signing
//!
//! Keys are Ed25519. Fixtures are compared across runs, so keys are never
//! drawn from the OS RNG: a [`KeyStore`] derives every secret from its seed
//! and a running index.
//!
//! Key types:
//! - `KeyPair`: Ed25519 key pair used to sign metadata
//! - `PublicKey`: Ed25519 public key listed as a role's verification key
//! - `KeyStore`: deterministic source of key pairs
//! - `SignatureEntry`: one `{keyid, sig}` entry of a document

use crate::canonical::{canonical_bytes, sha256_hex};
use crate::error::{FixtureError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Key type and signature scheme written into key metadata
pub const KEY_TYPE: &str = "ed25519";

/// Hash algorithms advertised for key id computation
pub const KEYID_HASH_ALGORITHMS: [&str; 2] = ["sha256", "sha512"];

/// Public part of a key as it appears in root and delegation metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub keyid_hash_algorithms: Vec<String>,
    pub keytype: String,
    pub keyval: KeyValue,
    pub scheme: String,
}

/// Hex-encoded public key bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub public: String,
}

/// A single signature in a metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// Id of the signing key
    pub keyid: String,
    /// Hex-encoded signature bytes
    pub sig: String,
}

/// Ed25519 key pair for signing metadata
#[derive(Clone)]
pub struct KeyPair {
    /// Key identifier (hex SHA-256 of the canonical key metadata)
    keyid: String,
    /// Ed25519 signing key (private)
    signing_key: SigningKey,
    /// Ed25519 verifying key (public)
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("keyid", &self.keyid)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Create a key pair from a 32-byte secret
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        let keyid = key_id(&verifying_key)?;

        Ok(Self {
            keyid,
            signing_key,
            verifying_key,
        })
    }

    /// Get the key identifier
    pub fn keyid(&self) -> &str {
        &self.keyid
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            keyid: self.keyid.clone(),
            verifying_key: self.verifying_key,
        }
    }

    /// Get the raw signing key bytes
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign the canonical encoding of a body
    pub fn sign<T: Serialize + ?Sized>(&self, body: &T) -> Result<SignatureEntry> {
        let payload = canonical_bytes(body)?;
        Ok(self.sign_bytes(&payload))
    }

    /// Sign raw bytes
    pub fn sign_bytes(&self, payload: &[u8]) -> SignatureEntry {
        let signature = self.signing_key.sign(payload);
        SignatureEntry {
            keyid: self.keyid.clone(),
            sig: hex::encode(signature.to_bytes()),
        }
    }
}

/// Ed25519 public key listed as a verification key
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Key identifier
    keyid: String,
    /// Ed25519 verifying key
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("keyid", &self.keyid)
            .finish()
    }
}

impl PublicKey {
    /// Create a public key from raw bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes)?;
        let keyid = key_id(&verifying_key)?;
        Ok(Self {
            keyid,
            verifying_key,
        })
    }

    /// Get the key identifier
    pub fn keyid(&self) -> &str {
        &self.keyid
    }

    /// Get the raw verifying key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// The key as it appears in root and delegation metadata
    pub fn metadata(&self) -> KeyMetadata {
        key_metadata(&self.verifying_key)
    }

    /// Verify a signature entry over the canonical encoding of a body
    ///
    /// The builder never verifies what it produces; this exists so tests
    /// can check that fixtures are validly signed.
    pub fn verify<T: Serialize + ?Sized>(&self, body: &T, entry: &SignatureEntry) -> Result<()> {
        if entry.keyid != self.keyid {
            return Err(FixtureError::Crypto(format!(
                "Key ID mismatch: expected '{}', got '{}'",
                self.keyid, entry.keyid
            )));
        }

        let bytes = hex::decode(&entry.sig).map_err(|e| FixtureError::Crypto(e.to_string()))?;
        let bytes: [u8; 64] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| FixtureError::Crypto("Invalid signature length".into()))?;
        let signature = Signature::from_bytes(&bytes);

        let payload = canonical_bytes(body)?;
        self.verifying_key
            .verify(&payload, &signature)
            .map_err(|e| FixtureError::Crypto(e.to_string()))
    }
}

fn key_metadata(verifying_key: &VerifyingKey) -> KeyMetadata {
    KeyMetadata {
        keyid_hash_algorithms: KEYID_HASH_ALGORITHMS.iter().map(|s| s.to_string()).collect(),
        keytype: KEY_TYPE.to_string(),
        keyval: KeyValue {
            public: hex::encode(verifying_key.to_bytes()),
        },
        scheme: KEY_TYPE.to_string(),
    }
}

fn key_id(verifying_key: &VerifyingKey) -> Result<String> {
    let encoded = canonical_bytes(&key_metadata(verifying_key))?;
    Ok(sha256_hex(&encoded))
}

/// Deterministic source of key pairs
///
/// Key `i` is derived from `SHA-256("<seed>:<i>")`. Each builder session owns
/// its own store, so fixture output does not depend on what other fixtures
/// were generated earlier in the run.
#[derive(Debug, Clone)]
pub struct KeyStore {
    seed: String,
    issued: Vec<KeyPair>,
}

impl KeyStore {
    /// Create a key store from a seed
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            issued: Vec::new(),
        }
    }

    /// The seed keys are derived from
    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Derive the key at a given index without issuing it
    pub fn derive(&self, index: u32) -> Result<KeyPair> {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.as_bytes());
        hasher.update(b":");
        hasher.update(index.to_string().as_bytes());
        let secret: [u8; 32] = hasher.finalize().into();
        KeyPair::from_bytes(&secret)
    }

    /// Issue the next key pair
    pub fn next_key(&mut self) -> Result<KeyPair> {
        let index = self.issued.len() as u32;
        let key = self.derive(index)?;
        debug!(index, keyid = %key.keyid(), "Issued key");
        self.issued.push(key.clone());
        Ok(key)
    }

    /// Look up an issued key pair by id
    pub fn get(&self, keyid: &str) -> Option<&KeyPair> {
        self.issued.iter().find(|k| k.keyid() == keyid)
    }

    /// Number of keys issued so far
    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}
