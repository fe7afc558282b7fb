//! Key establishment for QuickCrypt.
//!
//! This module provides:
//! - Session configuration (key file, key file encoding, KDF strength)
//! - Key providers for key files and password derivation
//! - A session that establishes exactly one key and zeroizes it on drop

pub mod config;
pub mod provider;
pub mod session;

pub use config::{KdfStrength, KeyFileFormat, SessionConfig};
pub use provider::KeyProvider;
pub use session::{KeyOrigin, Session};
