//! Wire format of an encrypted stream.
//!
//! ```text
//! [header: 24 bytes][chunk 1][chunk 2]...[chunk n]
//! chunk = [encrypted tag: 1 byte][ciphertext: <= CHUNK_SIZE bytes][MAC: 16 bytes]
//! ```
//!
//! Every chunk except the last carries exactly `CHUNK_SIZE` plaintext bytes.
//! The last chunk is the only one tagged [`Tag::Final`]. The layout is the
//! one used by libsodium's `crypto_secretstream_xchacha20poly1305`.

use std::fmt;

use quickcrypt_common::{Error, Result};

/// Size of the stream header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Plaintext bytes per chunk.
pub const CHUNK_SIZE: usize = 4096;

/// Poly1305 MAC size.
pub const MAC_SIZE: usize = 16;

/// Per-chunk overhead: encrypted tag byte plus MAC.
pub const ABYTES: usize = 1 + MAC_SIZE;

/// Largest ciphertext chunk for the default chunk size.
pub const MAX_CIPHERTEXT_CHUNK: usize = CHUNK_SIZE + ABYTES;

/// Stream position carried, encrypted, in every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// More chunks follow.
    Message,
    /// Marks a message boundary inside the stream.
    Push,
    /// Ratchets the stream key after this chunk.
    Rekey,
    /// Last chunk of the stream.
    Final,
}

impl Tag {
    const MESSAGE: u8 = 0;
    const PUSH: u8 = 1;
    const REKEY: u8 = 2;
    const FINAL: u8 = Self::PUSH | Self::REKEY;

    /// Wire value of this tag.
    pub fn to_byte(self) -> u8 {
        match self {
            Tag::Message => Self::MESSAGE,
            Tag::Push => Self::PUSH,
            Tag::Rekey => Self::REKEY,
            Tag::Final => Self::FINAL,
        }
    }

    /// Parse a decrypted tag byte.
    ///
    /// # Errors
    /// - `Protocol` for values outside the known tag set
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            Self::MESSAGE => Ok(Tag::Message),
            Self::PUSH => Ok(Tag::Push),
            Self::REKEY => Ok(Tag::Rekey),
            Self::FINAL => Ok(Tag::Final),
            other => Err(Error::Protocol(format!("unknown chunk tag {:#04x}", other))),
        }
    }

    /// Whether processing this tag ratchets the stream key.
    pub(crate) fn forces_rekey(self) -> bool {
        self.to_byte() & Self::REKEY != 0
    }
}

/// One-time stream setup value sent ahead of the first chunk.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamHeader([u8; HEADER_SIZE]);

impl StreamHeader {
    /// Wrap raw header bytes.
    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the header bytes.
    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.0
    }

    /// Portion fed to HChaCha20 to derive the stream key.
    pub(crate) fn key_nonce(&self) -> &[u8] {
        &self.0[..16]
    }

    /// Portion used as the initial ratchet nonce.
    pub(crate) fn stream_nonce(&self) -> &[u8] {
        &self.0[16..]
    }
}

impl fmt::Debug for StreamHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamHeader(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// Ciphertext size of a chunk carrying `plaintext_len` bytes.
pub fn ciphertext_len(plaintext_len: usize) -> usize {
    plaintext_len + ABYTES
}
