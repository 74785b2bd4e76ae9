//! Password credential derivation and verification.
//!
//! Credentials are derived with PBKDF2-HMAC-SHA256 over a per-credential random
//! salt and stored as `hex(salt):hex(derived_key)`. Verification re-derives the
//! key with the stored salt and compares in constant time.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Iteration count used for every credential unless configured otherwise.
pub const DEFAULT_ITERATIONS: u32 = 100_000;
/// Length of a freshly generated salt in bytes.
pub const SALT_LEN: usize = 32;
/// Length of the derived key in bytes.
pub const KEY_LEN: usize = 32;

const SEPARATOR: char = ':';

/// A salted, derived password credential.
///
/// The derived key is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedCredential {
    salt: Vec<u8>,
    derived_key: Vec<u8>,
}

impl HashedCredential {
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Encodes the credential for storage.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HashedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", hex::encode(&self.salt), SEPARATOR, hex::encode(&self.derived_key))
    }
}

impl fmt::Debug for HashedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedCredential")
            .field("salt_len", &self.salt.len())
            .field("derived_key", &"<redacted>")
            .finish()
    }
}

/// Why a stored credential could not be parsed. Never surfaced to clients.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialFormatError {
    #[error("expected exactly one separator")]
    Separator,
    #[error("credential component is not valid hex")]
    Hex,
    #[error("credential component is empty")]
    Empty,
}

impl FromStr for HashedCredential {
    type Err = CredentialFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(SEPARATOR);
        let (Some(salt_hex), Some(key_hex), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CredentialFormatError::Separator);
        };
        let salt = hex::decode(salt_hex).map_err(|_| CredentialFormatError::Hex)?;
        let derived_key = hex::decode(key_hex).map_err(|_| CredentialFormatError::Hex)?;
        if salt.is_empty() || derived_key.is_empty() {
            return Err(CredentialFormatError::Empty);
        }
        Ok(Self { salt, derived_key })
    }
}

/// Derives and verifies password credentials.
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    iterations: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl CredentialHasher {
    pub fn new(iterations: u32) -> Self {
        Self { iterations: iterations.max(1) }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hashes `plaintext` with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> HashedCredential {
        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        self.hash_with_salt(plaintext, &salt)
    }

    /// Hashes `plaintext` with a caller-supplied salt. Deterministic.
    pub fn hash_with_salt(&self, plaintext: &str, salt: &[u8]) -> HashedCredential {
        HashedCredential { salt: salt.to_vec(), derived_key: self.derive(plaintext, salt) }
    }

    /// Checks `plaintext` against an encoded credential.
    ///
    /// Any parse failure counts as a mismatch.
    pub fn verify(&self, plaintext: &str, encoded: &str) -> bool {
        match encoded.parse::<HashedCredential>() {
            Ok(stored) => self.verify_credential(plaintext, &stored),
            Err(e) => {
                tracing::debug!("Stored credential rejected: {}", e);
                false
            }
        }
    }

    pub fn verify_credential(&self, plaintext: &str, stored: &HashedCredential) -> bool {
        let computed = self.derive(plaintext, &stored.salt);
        // ct_eq on slices of unequal length is false without leaking where they differ
        computed.as_slice().ct_eq(stored.derived_key.as_slice()).into()
    }

    fn derive(&self, plaintext: &str, salt: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), salt, self.iterations, &mut out);
        out
    }
}
