//! Chunked authenticated encryption using the XChaCha20-Poly1305 secret stream.
//!
//! A stream key is derived from the secret key and the first 16 header bytes
//! with HChaCha20. Every chunk is then sealed with ChaCha20 (IETF) under a
//! 12-byte nonce made of a 32-bit counter and an 8-byte ratchet value, and
//! authenticated with Poly1305 over the encrypted tag block and the
//! ciphertext. After each chunk the ratchet value absorbs the chunk's MAC, so
//! chunks cannot be dropped, reordered or replayed without detection.
//!
//! The construction is byte-compatible with libsodium's
//! `crypto_secretstream_xchacha20poly1305` without additional data.

use chacha20::cipher::{
    consts::U10, generic_array::GenericArray, KeyIvInit, StreamCipher, StreamCipherSeek,
};
use chacha20::{hchacha, ChaCha20};
use poly1305::{universal_hash::KeyInit, Poly1305};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::frame::{ciphertext_len, StreamHeader, Tag, ABYTES, HEADER_SIZE, MAC_SIZE};
use crate::keys::{SecretKey, KEY_LENGTH};
use quickcrypt_common::{Error, Result};

const COUNTER_SIZE: usize = 4;
const NONCE_SIZE: usize = 12;
const BLOCK_SIZE: usize = 64;

/// Key and nonce shared by both stream directions.
#[derive(Zeroize, ZeroizeOnDrop)]
struct CipherState {
    key: [u8; KEY_LENGTH],
    /// Little-endian counter followed by the ratchet value.
    nonce: [u8; NONCE_SIZE],
}

impl CipherState {
    fn new(key: &SecretKey, header: &StreamHeader) -> Self {
        let mut stream_key = hchacha::<U10>(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(header.key_nonce()),
        );

        let mut state = Self {
            key: [0u8; KEY_LENGTH],
            nonce: [0u8; NONCE_SIZE],
        };
        state.key.copy_from_slice(&stream_key);
        stream_key.as_mut_slice().zeroize();

        state.nonce[COUNTER_SIZE..].copy_from_slice(header.stream_nonce());
        state.reset_counter();
        state
    }

    fn reset_counter(&mut self) {
        self.nonce[..COUNTER_SIZE].copy_from_slice(&1u32.to_le_bytes());
    }

    fn counter(&self) -> u32 {
        let mut bytes = [0u8; COUNTER_SIZE];
        bytes.copy_from_slice(&self.nonce[..COUNTER_SIZE]);
        u32::from_le_bytes(bytes)
    }

    /// ChaCha20 positioned at keystream block `block`.
    fn cipher_at(&self, block: u64) -> ChaCha20 {
        let mut cipher = ChaCha20::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(&self.nonce),
        );
        cipher.seek(block * BLOCK_SIZE as u64);
        cipher
    }

    /// Block 1 encrypts the tag block.
    fn apply_tag_keystream(&self, block: &mut [u8; BLOCK_SIZE]) {
        self.cipher_at(1).apply_keystream(block);
    }

    /// Message bytes start at block 2.
    fn apply_message_keystream(&self, data: &mut [u8]) {
        self.cipher_at(2).apply_keystream(data);
    }

    /// Poly1305 over `tag_block || ciphertext || pad || le64(0) || le64(64 + len)`.
    ///
    /// Block 0 of the keystream supplies the one-time Poly1305 key. The pad
    /// is `len % 16` zero bytes, which is what libsodium emits.
    fn compute_mac(&self, tag_block: &[u8; BLOCK_SIZE], ciphertext: &[u8]) -> [u8; MAC_SIZE] {
        let mut poly_key = Zeroizing::new([0u8; BLOCK_SIZE]);
        self.cipher_at(0).apply_keystream(&mut poly_key[..]);

        let pad = ciphertext.len() % 16;
        let mut input = Vec::with_capacity(BLOCK_SIZE + ciphertext.len() + pad + 16);
        input.extend_from_slice(tag_block);
        input.extend_from_slice(ciphertext);
        input.resize(input.len() + pad, 0);
        input.extend_from_slice(&0u64.to_le_bytes());
        input.extend_from_slice(&((BLOCK_SIZE + ciphertext.len()) as u64).to_le_bytes());

        let tag = Poly1305::new(GenericArray::from_slice(&poly_key[..32])).compute_unpadded(&input);
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&tag);
        mac
    }

    /// Fold the chunk MAC into the ratchet and step the counter.
    fn advance(&mut self, mac: &[u8; MAC_SIZE], tag: Tag) {
        for (n, m) in self.nonce[COUNTER_SIZE..].iter_mut().zip(mac.iter()) {
            *n ^= m;
        }
        let counter = self.counter().wrapping_add(1);
        self.nonce[..COUNTER_SIZE].copy_from_slice(&counter.to_le_bytes());

        if tag.forces_rekey() || counter == 0 {
            self.rekey();
        }
    }

    /// Replace key and ratchet value with keystream-encrypted versions of themselves.
    fn rekey(&mut self) {
        let mut next = Zeroizing::new([0u8; KEY_LENGTH + NONCE_SIZE - COUNTER_SIZE]);
        next[..KEY_LENGTH].copy_from_slice(&self.key);
        next[KEY_LENGTH..].copy_from_slice(&self.nonce[COUNTER_SIZE..]);
        self.cipher_at(0).apply_keystream(&mut next[..]);

        self.key.copy_from_slice(&next[..KEY_LENGTH]);
        self.nonce[COUNTER_SIZE..].copy_from_slice(&next[KEY_LENGTH..]);
        self.reset_counter();
    }
}

/// Encrypting direction of a secret stream.
pub struct PushState {
    state: CipherState,
    finished: bool,
}

impl PushState {
    /// Start a new stream under `key` with a random header.
    ///
    /// # Postconditions
    /// - The returned header must be sent before the first chunk
    pub fn new(key: &SecretKey) -> (Self, StreamHeader) {
        let mut bytes = [0u8; HEADER_SIZE];
        OsRng.fill_bytes(&mut bytes);
        let header = StreamHeader::from_bytes(bytes);
        (Self::with_header(key, &header), header)
    }

    fn with_header(key: &SecretKey, header: &StreamHeader) -> Self {
        Self {
            state: CipherState::new(key, header),
            finished: false,
        }
    }

    /// Seal one chunk.
    ///
    /// # Postconditions
    /// - Output is `plaintext.len() + ABYTES` bytes
    /// - After a `Tag::Final` chunk the state refuses further chunks
    ///
    /// # Errors
    /// - `Protocol` if the stream was already finalized
    pub fn push(&mut self, plaintext: &[u8], tag: Tag) -> Result<Vec<u8>> {
        if self.finished {
            return Err(Error::Protocol("stream already finalized".to_string()));
        }

        let mut block = Zeroizing::new([0u8; BLOCK_SIZE]);
        block[0] = tag.to_byte();
        self.state.apply_tag_keystream(&mut block);

        let mut out = Vec::with_capacity(ciphertext_len(plaintext.len()));
        out.push(block[0]);
        out.extend_from_slice(plaintext);
        self.state.apply_message_keystream(&mut out[1..]);

        let mac = self.state.compute_mac(&block, &out[1..]);
        out.extend_from_slice(&mac);

        self.state.advance(&mac, tag);
        self.finished = tag == Tag::Final;
        Ok(out)
    }

    /// Whether the final chunk has been sealed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Decrypting direction of a secret stream.
pub struct PullState {
    state: CipherState,
    finished: bool,
}

impl PullState {
    /// Resume a stream from its header.
    ///
    /// A header that does not belong to `key` is only detected when the
    /// first chunk fails verification.
    pub fn new(key: &SecretKey, header: &StreamHeader) -> Self {
        Self {
            state: CipherState::new(key, header),
            finished: false,
        }
    }

    /// Verify and decrypt one chunk.
    ///
    /// # Errors
    /// - `Auth` if the chunk is too short or fails MAC verification
    /// - `Protocol` if the stream was already finalized or the tag is unknown
    ///
    /// The state only advances when the chunk verifies.
    pub fn pull(&mut self, chunk: &[u8]) -> Result<(Zeroizing<Vec<u8>>, Tag)> {
        if self.finished {
            return Err(Error::Protocol("stream already finalized".to_string()));
        }

        let (tag_byte, mac) = self
            .verify(chunk)
            .ok_or_else(|| Error::Auth("chunk failed verification".to_string()))?;
        let tag = Tag::from_byte(tag_byte)?;

        let mut plaintext = Zeroizing::new(chunk[1..chunk.len() - MAC_SIZE].to_vec());
        self.state.apply_message_keystream(&mut plaintext);

        self.state.advance(&mac, tag);
        self.finished = tag == Tag::Final;
        Ok((plaintext, tag))
    }

    /// Length of the shortest proper prefix of `data` that is a valid final
    /// chunk at the current stream position, if any.
    ///
    /// Used to tell a final chunk followed by trailing garbage apart from a
    /// corrupted chunk. Does not advance the state.
    pub fn final_chunk_prefix(&self, data: &[u8]) -> Option<usize> {
        if self.finished {
            return None;
        }
        (ABYTES..data.len()).find(|&len| {
            matches!(self.verify(&data[..len]), Some((tag, _)) if tag == Tag::Final.to_byte())
        })
    }

    /// Whether the final chunk has been opened.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Check the MAC of `chunk`, returning the decrypted tag byte and the MAC.
    fn verify(&self, chunk: &[u8]) -> Option<(u8, [u8; MAC_SIZE])> {
        if chunk.len() < ABYTES {
            return None;
        }
        let (body, stored_mac) = chunk.split_at(chunk.len() - MAC_SIZE);

        let mut block = Zeroizing::new([0u8; BLOCK_SIZE]);
        block[0] = body[0];
        self.state.apply_tag_keystream(&mut block);
        let tag_byte = block[0];
        block[0] = body[0];

        let mac = self.state.compute_mac(&block, &body[1..]);
        if bool::from(mac[..].ct_eq(stored_mac)) {
            Some((tag_byte, mac))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SecretKey {
        SecretKey::from_bytes([42u8; KEY_LENGTH])
    }

    #[test]
    fn test_push_pull_roundtrip() {
        let key = test_key();
        let (mut push, header) = PushState::new(&key);
        let c1 = push.push(b"first chunk", Tag::Message).unwrap();
        let c2 = push.push(b"second", Tag::Final).unwrap();

        let mut pull = PullState::new(&key, &header);
        let (p1, t1) = pull.pull(&c1).unwrap();
        let (p2, t2) = pull.pull(&c2).unwrap();

        assert_eq!(&p1[..], b"first chunk");
        assert_eq!(t1, Tag::Message);
        assert_eq!(&p2[..], b"second");
        assert_eq!(t2, Tag::Final);
        assert!(pull.is_finished());
    }

    #[test]
    fn test_ciphertext_size() {
        let (mut push, _) = PushState::new(&test_key());
        let chunk = push.push(b"Test message", Tag::Message).unwrap();
        assert_eq!(chunk.len(), b"Test message".len() + ABYTES);

        let empty = push.push(b"", Tag::Final).unwrap();
        assert_eq!(empty.len(), ABYTES);
    }

    #[test]
    fn test_same_header_is_deterministic() {
        let key = test_key();
        let header = StreamHeader::from_bytes([7u8; HEADER_SIZE]);

        let c1 = PushState::with_header(&key, &header)
            .push(b"Deterministic", Tag::Final)
            .unwrap();
        let c2 = PushState::with_header(&key, &header)
            .push(b"Deterministic", Tag::Final)
            .unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_fresh_header_each_stream() {
        let key = test_key();
        let (mut push1, h1) = PushState::new(&key);
        let (mut push2, h2) = PushState::new(&key);

        assert_ne!(h1, h2);
        assert_ne!(
            push1.push(b"Same plaintext", Tag::Final).unwrap(),
            push2.push(b"Same plaintext", Tag::Final).unwrap()
        );
    }

    #[test]
    fn test_identical_chunks_differ_after_ratchet() {
        let (mut push, _) = PushState::new(&test_key());
        let c1 = push.push(b"repeat", Tag::Message).unwrap();
        let c2 = push.push(b"repeat", Tag::Message).unwrap();
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (mut push, header) = PushState::new(&SecretKey::from_bytes([1u8; KEY_LENGTH]));
        let chunk = push.push(b"Secret data", Tag::Final).unwrap();

        let mut pull = PullState::new(&SecretKey::from_bytes([2u8; KEY_LENGTH]), &header);
        assert!(matches!(pull.pull(&chunk), Err(Error::Auth(_))));
    }

    #[test]
    fn test_tampered_chunk_fails() {
        let key = test_key();
        let (mut push, header) = PushState::new(&key);
        let chunk = push.push(b"Important data", Tag::Final).unwrap();

        for i in 0..chunk.len() {
            let mut tampered = chunk.clone();
            tampered[i] ^= 0x01;
            let mut pull = PullState::new(&key, &header);
            assert!(matches!(pull.pull(&tampered), Err(Error::Auth(_))), "byte {}", i);
        }
    }

    #[test]
    fn test_reordered_chunks_fail() {
        let key = test_key();
        let (mut push, header) = PushState::new(&key);
        let _c1 = push.push(b"one", Tag::Message).unwrap();
        let c2 = push.push(b"two", Tag::Final).unwrap();

        let mut pull = PullState::new(&key, &header);
        assert!(matches!(pull.pull(&c2), Err(Error::Auth(_))));
    }

    #[test]
    fn test_failed_pull_does_not_advance() {
        let key = test_key();
        let (mut push, header) = PushState::new(&key);
        let chunk = push.push(b"payload", Tag::Final).unwrap();

        let mut pull = PullState::new(&key, &header);
        let mut bad = chunk.clone();
        bad[3] ^= 0x80;
        assert!(pull.pull(&bad).is_err());

        let (plaintext, tag) = pull.pull(&chunk).unwrap();
        assert_eq!(&plaintext[..], b"payload");
        assert_eq!(tag, Tag::Final);
    }

    #[test]
    fn test_short_chunk_rejected() {
        let key = test_key();
        let (_, header) = PushState::new(&key);
        let mut pull = PullState::new(&key, &header);
        assert!(matches!(pull.pull(&[0u8; ABYTES - 1]), Err(Error::Auth(_))));
        assert!(matches!(pull.pull(&[]), Err(Error::Auth(_))));
    }

    #[test]
    fn test_use_after_final_rejected() {
        let key = test_key();
        let (mut push, header) = PushState::new(&key);
        let chunk = push.push(b"last", Tag::Final).unwrap();
        assert!(push.is_finished());
        assert!(matches!(push.push(b"more", Tag::Message), Err(Error::Protocol(_))));

        let mut pull = PullState::new(&key, &header);
        pull.pull(&chunk).unwrap();
        assert!(matches!(pull.pull(&chunk), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_rekey_tag_roundtrip() {
        let key = test_key();
        let (mut push, header) = PushState::new(&key);
        let chunks = [
            push.push(b"before", Tag::Rekey).unwrap(),
            push.push(b"after", Tag::Push).unwrap(),
            push.push(b"end", Tag::Final).unwrap(),
        ];

        let mut pull = PullState::new(&key, &header);
        let tags: Vec<Tag> = chunks.iter().map(|c| pull.pull(c).unwrap().1).collect();
        assert_eq!(tags, vec![Tag::Rekey, Tag::Push, Tag::Final]);
    }

    #[test]
    fn test_final_chunk_prefix_finds_trailing_data() {
        let key = test_key();
        let (mut push, header) = PushState::new(&key);
        let mut data = push.push(b"the end", Tag::Final).unwrap();
        let final_len = data.len();
        data.extend_from_slice(b"garbage");

        let pull = PullState::new(&key, &header);
        assert_eq!(pull.final_chunk_prefix(&data), Some(final_len));
    }

    #[test]
    fn test_final_chunk_prefix_ignores_message_chunks() {
        let key = test_key();
        let (mut push, header) = PushState::new(&key);
        let mut data = push.push(b"not the end", Tag::Message).unwrap();
        data.push(0);

        let pull = PullState::new(&key, &header);
        assert_eq!(pull.final_chunk_prefix(&data), None);
    }
}
