//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks. The presets
//! mirror libsodium's `crypto_pwhash` limits so that a password and salt
//! produce the same key as other libsodium-based tools.

use argon2::{Algorithm, Argon2, Block, Params, Version};
use zeroize::Zeroizing;

use crate::keys::{Salt, SecretKey, KEY_LENGTH};
use quickcrypt_common::{Error, Result};

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    ///
    /// Equivalent to `crypto_pwhash_OPSLIMIT_INTERACTIVE` /
    /// `crypto_pwhash_MEMLIMIT_INTERACTIVE`.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }

    /// Create moderate parameters.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 3,
            parallelism: 1,
        }
    }

    /// Create parameters suitable for sensitive data.
    ///
    /// Higher security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 1048576, // 1 GiB
            time_cost: 4,
            parallelism: 1,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive a secret key from a password and salt using Argon2id.
///
/// # Preconditions
/// - `password` must not be empty
/// - `params` must have valid Argon2id parameters
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - `InvalidInput` if password is empty
/// - `Config` if the Argon2id parameters are invalid
/// - `Resource` if the working memory cannot be allocated
///
/// # Security
/// - Password is not stored or logged
/// - The intermediate key buffer is zeroized after derivation
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<SecretKey> {
    if password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| Error::Config(format!("Invalid KDF parameters: {}", e)))?;

    let block_count = argon2_params.block_count();
    let mut blocks: Vec<Block> = Vec::new();
    blocks.try_reserve_exact(block_count).map_err(|_| {
        Error::Resource(format!(
            "out of memory: password hashing needs {} KiB",
            block_count
        ))
    })?;
    blocks.resize(block_count, Block::default());

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = Zeroizing::new([0u8; KEY_LENGTH]);
    argon2
        .hash_password_into_with_memory(
            password,
            salt.as_bytes(),
            &mut key_bytes[..],
            &mut blocks,
        )
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(SecretKey::from_bytes(*key_bytes))
}
