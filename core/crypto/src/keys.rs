//! Key types with secure memory handling.
//!
//! Key types zeroize their memory on drop to prevent sensitive data from
//! persisting in memory.

use rand::{rngs::OsRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use quickcrypt_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of password-hashing salts in bytes.
pub const SALT_LENGTH: usize = 16;

/// The symmetric key every stream is encrypted under.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; KEY_LENGTH],
}

impl SecretKey {
    /// Create a secret key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a secret key from a slice.
    ///
    /// # Errors
    /// - Returns error if `bytes` is not exactly KEY_LENGTH bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Generate a key from the operating system's RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// Salt for password-based key derivation.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// The all-zero salt used when none was supplied.
    pub fn zero() -> Self {
        Self([0u8; SALT_LENGTH])
    }

    /// Create from a full-size array.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create from up to SALT_LENGTH bytes, zero-padding on the right.
    ///
    /// # Errors
    /// - Returns a configuration error if `bytes` is longer than SALT_LENGTH
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > SALT_LENGTH {
            return Err(Error::Config(format!(
                "the salt provided is longer than {} bytes",
                SALT_LENGTH
            )));
        }
        let mut salt = [0u8; SALT_LENGTH];
        salt[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(salt))
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}
