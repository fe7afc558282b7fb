//! Cryptographic primitives for QuickCrypt.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - The XChaCha20-Poly1305 secret stream (chunked authenticated encryption)
//! - Stream encryption and decryption over any `Read`/`Write` pair
//! - Secure key handling with automatic zeroization
//!
//! # Security Guarantees
//! - All key material and cipher state is zeroized on drop
//! - No plaintext or key material is ever logged
//! - MAC verification is constant-time
//! - Truncation, reordering and trailing data are detected on decryption

pub mod aead;
pub mod frame;
pub mod kdf;
pub mod keys;
pub mod stream;

pub use aead::{PullState, PushState};
pub use frame::{StreamHeader, Tag};
pub use kdf::{derive_key, KdfParams};
pub use keys::{Salt, SecretKey};
pub use stream::{decrypt_bytes, encrypt_bytes, StreamDecryptor, StreamEncryptor};
