//! Streaming encryption of unbounded inputs.
//!
//! The input is cut into fixed-size chunks which are sealed one at a time,
//! so memory use does not depend on the stream length. The last chunk is
//! tagged final; decryption refuses streams that end early or continue past
//! it.

use std::io::{self, Read, Write};
use std::num::NonZeroUsize;

use zeroize::Zeroizing;

use crate::aead::{PullState, PushState};
use crate::frame::{ciphertext_len, StreamHeader, Tag, CHUNK_SIZE, HEADER_SIZE};
use crate::keys::SecretKey;
use quickcrypt_common::{Error, Result};

/// Encrypts a byte stream into a header followed by authenticated chunks.
pub struct StreamEncryptor<'a> {
    key: &'a SecretKey,
    chunk_size: usize,
}

impl<'a> StreamEncryptor<'a> {
    /// Create a new encryptor using the default chunk size.
    pub fn new(key: &'a SecretKey) -> Self {
        Self {
            key,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Set custom chunk size. The decryptor must use the same value.
    pub fn with_chunk_size(mut self, size: NonZeroUsize) -> Self {
        self.chunk_size = size.get();
        self
    }

    /// Encrypt data from reader and write to writer.
    ///
    /// # Format
    /// - Header: 24 bytes
    /// - Chunks: `chunk_size` plaintext bytes each, plus 17 bytes overhead;
    ///   the last chunk is shorter (possibly empty) and tagged final
    ///
    /// # Postconditions
    /// - Reader is drained and writer is flushed
    /// - Returns the number of plaintext bytes encrypted
    ///
    /// # Errors
    /// - I/O errors from reader/writer
    pub fn encrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let (mut state, header) = PushState::new(self.key);
        writer.write_all(header.as_bytes())?;

        let mut buffer = Zeroizing::new(vec![0u8; self.chunk_size]);
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = read_chunk(&mut reader, &mut buffer)?;
            // A short read means the input is exhausted.
            let tag = if bytes_read < buffer.len() {
                Tag::Final
            } else {
                Tag::Message
            };

            let sealed = state.push(&buffer[..bytes_read], tag)?;
            writer.write_all(&sealed)?;
            total_bytes += bytes_read as u64;

            if tag == Tag::Final {
                break;
            }
        }

        writer.flush()?;
        Ok(total_bytes)
    }
}

/// Decrypts a stream produced by [`StreamEncryptor`], failing closed.
pub struct StreamDecryptor<'a> {
    key: &'a SecretKey,
    chunk_size: usize,
}

impl<'a> StreamDecryptor<'a> {
    /// Create a new decryptor using the default chunk size.
    pub fn new(key: &'a SecretKey) -> Self {
        Self {
            key,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Set custom chunk size. Must match the encryptor's.
    pub fn with_chunk_size(mut self, size: NonZeroUsize) -> Self {
        self.chunk_size = size.get();
        self
    }

    /// Decrypt data from reader and write to writer.
    ///
    /// # Preconditions
    /// - Format must match StreamEncryptor output
    ///
    /// # Postconditions
    /// - Plaintext of each chunk is written only after it verifies
    /// - Returns the number of plaintext bytes written
    ///
    /// # Errors
    /// - `Auth` for wrong key, bad header or tampered chunks
    /// - `Protocol` for a missing header, a missing final chunk, or data
    ///   after the final chunk
    /// - I/O errors from reader/writer
    pub fn decrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let mut header = [0u8; HEADER_SIZE];
        let header_read = read_chunk(&mut reader, &mut header)?;
        if header_read < HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "stream truncated: header has {} of {} bytes",
                header_read, HEADER_SIZE
            )));
        }

        let mut state = PullState::new(self.key, &StreamHeader::from_bytes(header));
        let mut buffer = vec![0u8; ciphertext_len(self.chunk_size)];
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = read_chunk(&mut reader, &mut buffer)?;
            if bytes_read == 0 {
                return Err(Error::Protocol(
                    "stream truncated: missing final chunk".to_string(),
                ));
            }
            let at_eof = bytes_read < buffer.len();
            let chunk = &buffer[..bytes_read];

            let (plaintext, tag) = match state.pull(chunk) {
                Ok(opened) => opened,
                Err(Error::Auth(reason)) => {
                    if state.final_chunk_prefix(chunk).is_some() {
                        return Err(trailing_data());
                    }
                    return Err(Error::Auth(reason));
                }
                Err(e) => return Err(e),
            };

            if tag == Tag::Final {
                if !at_eof && has_more(&mut reader)? {
                    return Err(trailing_data());
                }
                writer.write_all(&plaintext)?;
                total_bytes += plaintext.len() as u64;
                break;
            }

            if at_eof {
                return Err(Error::Protocol(
                    "stream truncated: last chunk is not final".to_string(),
                ));
            }
            writer.write_all(&plaintext)?;
            total_bytes += plaintext.len() as u64;
        }

        writer.flush()?;
        Ok(total_bytes)
    }
}

fn trailing_data() -> Error {
    Error::Protocol("trailing data after final chunk".to_string())
}

/// Fill `buffer` from the reader, stopping early only at end of input.
///
/// Pipes and terminals hand out data in pieces, so a single `read` says
/// nothing about where the input ends.
fn read_chunk<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut total_read = 0;

    while total_read < buffer.len() {
        match reader.read(&mut buffer[total_read..]) {
            Ok(0) => break,
            Ok(n) => total_read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(total_read)
}

/// Whether the reader has at least one more byte.
fn has_more<R: Read>(reader: &mut R) -> Result<bool> {
    let mut probe = [0u8; 1];
    Ok(read_chunk(reader, &mut probe)? > 0)
}

/// Encrypt a complete byte slice using streaming encryption.
///
/// This is a convenience function for when the complete data is available.
pub fn encrypt_bytes(key: &SecretKey, data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    StreamEncryptor::new(key).encrypt_stream(data, &mut output)?;
    Ok(output)
}

/// Decrypt a complete byte slice that was encrypted with streaming encryption.
pub fn decrypt_bytes(key: &SecretKey, data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    StreamDecryptor::new(key).decrypt_stream(data, &mut output)?;
    Ok(output)
}
