//! Key establishment session.
//!
//! A session holds at most one key for its lifetime. The key is loaded,
//! generated, or derived exactly once and is zeroized when the session is
//! dropped.

use quickcrypt_common::{Error, Result};
use quickcrypt_crypto::{Salt, SecretKey};
use tracing::info;

use crate::config::SessionConfig;
use crate::provider::KeyProvider;

/// How the session's key was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Read from the key file.
    Loaded,
    /// Freshly generated and written to the key file.
    Generated,
    /// Derived from a password.
    Derived,
}

/// Owns the single key used for one encryption or decryption run.
pub struct Session {
    /// Key sources.
    provider: KeyProvider,
    /// Salt for password derivation, if one was set.
    salt: Option<Salt>,
    /// Established key (zeroized on drop).
    key: Option<SecretKey>,
    /// How `key` was established.
    origin: Option<KeyOrigin>,
}

impl Session {
    /// Create a session with no key.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            provider: KeyProvider::new(&config),
            salt: None,
            key: None,
            origin: None,
        }
    }

    /// Set the salt used by [`Session::derive_key`].
    ///
    /// Shorter salts are zero-padded to 16 bytes.
    ///
    /// # Preconditions
    /// - No salt has been set yet
    /// - No key has been derived yet
    ///
    /// # Errors
    /// - `Config` if the salt is longer than 16 bytes or a precondition fails
    pub fn set_salt(&mut self, bytes: &[u8]) -> Result<()> {
        if self.salt.is_some() {
            return Err(Error::Config("the salt was already set".to_string()));
        }
        if self.origin == Some(KeyOrigin::Derived) {
            return Err(Error::Config(
                "the salt must be set before deriving a key".to_string(),
            ));
        }
        self.salt = Some(Salt::from_slice(bytes)?);
        Ok(())
    }

    /// Load the key from the configured key file.
    ///
    /// # Preconditions
    /// - No key has been established
    ///
    /// # Errors
    /// - `Config` if a key already exists or no key file is configured
    /// - `FileAccess` if the key file cannot be read
    pub fn load_key(&mut self) -> Result<&SecretKey> {
        self.ensure_no_key()?;
        let key = self.provider.load()?;
        Ok(self.establish(key, KeyOrigin::Loaded))
    }

    /// Generate a random key and store it in the configured key file.
    ///
    /// # Preconditions
    /// - No key has been established
    ///
    /// # Postconditions
    /// - The key file exists and holds the returned key
    ///
    /// # Errors
    /// - `Config` if a key already exists, no key file is configured, or
    ///   the key file already exists
    /// - `FileAccess` if the key file cannot be written
    pub fn generate_key(&mut self) -> Result<&SecretKey> {
        self.ensure_no_key()?;
        let key = self.provider.generate()?;
        Ok(self.establish(key, KeyOrigin::Generated))
    }

    /// Derive the key from a password and the session salt.
    ///
    /// # Preconditions
    /// - No key has been established
    ///
    /// # Errors
    /// - `Config` if a key already exists or the KDF parameters are invalid
    /// - `InvalidInput` if the password is empty
    /// - `Resource` if the KDF memory cannot be allocated
    pub fn derive_key(&mut self, password: &[u8]) -> Result<&SecretKey> {
        self.ensure_no_key()?;
        let key = self.provider.derive(password, self.salt.as_ref())?;
        Ok(self.establish(key, KeyOrigin::Derived))
    }

    /// Return the key, loading it from the key file if none exists yet.
    ///
    /// # Errors
    /// See [`Session::load_key`].
    pub fn require_key(&mut self) -> Result<&SecretKey> {
        if self.key.is_none() {
            self.load_key()?;
        }
        self.key
            .as_ref()
            .ok_or_else(|| Error::Config("no key was provided".to_string()))
    }

    /// The established key, if any.
    pub fn key(&self) -> Option<&SecretKey> {
        self.key.as_ref()
    }

    /// How the key was established, if it was.
    pub fn origin(&self) -> Option<KeyOrigin> {
        self.origin
    }

    /// Whether a key has been established.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    fn ensure_no_key(&self) -> Result<()> {
        match self.origin {
            None => Ok(()),
            Some(origin) => Err(Error::Config(format!(
                "a key was already {}",
                match origin {
                    KeyOrigin::Loaded => "loaded",
                    KeyOrigin::Generated => "generated",
                    KeyOrigin::Derived => "derived from a password",
                }
            ))),
        }
    }

    fn establish(&mut self, key: SecretKey, origin: KeyOrigin) -> &SecretKey {
        info!(origin = ?origin, "Key established");
        self.origin = Some(origin);
        self.key.insert(key)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key_path", &self.provider.key_path())
            .field("salt", &self.salt)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyFileFormat;
    use quickcrypt_crypto::KdfParams;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn test_params() -> KdfParams {
        KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn create_test_session(key_path: Option<PathBuf>) -> Session {
        Session::new(SessionConfig {
            key_path,
            key_format: KeyFileFormat::Raw,
            kdf_params: test_params(),
        })
    }

    fn write_key_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("key");
        fs::write(&path, [7u8; 32]).unwrap();
        path
    }

    #[test]
    fn test_new_session_has_no_key() {
        let session = create_test_session(None);
        assert!(!session.has_key());
        assert!(session.key().is_none());
        assert!(session.origin().is_none());
    }

    #[test]
    fn test_load_key() {
        let dir = TempDir::new().unwrap();
        let mut session = create_test_session(Some(write_key_file(&dir)));

        let key = session.load_key().unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 32]);
        assert_eq!(session.origin(), Some(KeyOrigin::Loaded));
    }

    #[test]
    fn test_generate_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        let mut session = create_test_session(Some(path.clone()));

        let key = session.generate_key().unwrap().as_bytes().to_vec();
        assert_eq!(fs::read(&path).unwrap(), key);
        assert_eq!(session.origin(), Some(KeyOrigin::Generated));
    }

    #[test]
    fn test_second_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut session = create_test_session(Some(write_key_file(&dir)));
        session.load_key().unwrap();

        assert!(matches!(session.load_key(), Err(Error::Config(_))));
        assert!(matches!(session.generate_key(), Err(Error::Config(_))));
        assert!(matches!(session.derive_key(b"password"), Err(Error::Config(_))));
        assert_eq!(session.origin(), Some(KeyOrigin::Loaded));
    }

    #[test]
    fn test_derive_after_generate_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut session = create_test_session(Some(dir.path().join("key")));
        session.generate_key().unwrap();

        assert!(matches!(session.derive_key(b"password"), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_after_derive_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut session = create_test_session(Some(write_key_file(&dir)));
        session.derive_key(b"password").unwrap();

        assert!(matches!(session.load_key(), Err(Error::Config(_))));
    }

    #[test]
    fn test_derive_is_deterministic() {
        let mut first = create_test_session(None);
        let mut second = create_test_session(None);
        first.set_salt(b"salt").unwrap();
        second.set_salt(b"salt").unwrap();

        let a = first.derive_key(b"password").unwrap().as_bytes().to_vec();
        let b = second.derive_key(b"password").unwrap().as_bytes().to_vec();
        assert_eq!(a, b);
        assert_eq!(first.origin(), Some(KeyOrigin::Derived));
    }

    #[test]
    fn test_salt_changes_derived_key() {
        let mut unsalted = create_test_session(None);
        let mut salted = create_test_session(None);
        salted.set_salt(b"pepper").unwrap();

        let a = unsalted.derive_key(b"password").unwrap().as_bytes().to_vec();
        let b = salted.derive_key(b"password").unwrap().as_bytes().to_vec();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_salt_equals_default() {
        let mut unsalted = create_test_session(None);
        let mut empty = create_test_session(None);
        empty.set_salt(b"").unwrap();

        let a = unsalted.derive_key(b"password").unwrap().as_bytes().to_vec();
        let b = empty.derive_key(b"password").unwrap().as_bytes().to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn test_salt_length_limit() {
        let mut session = create_test_session(None);
        assert!(matches!(session.set_salt(&[1u8; 17]), Err(Error::Config(_))));

        let mut session = create_test_session(None);
        session.set_salt(&[1u8; 16]).unwrap();
    }

    #[test]
    fn test_salt_twice_is_rejected() {
        let mut session = create_test_session(None);
        session.set_salt(b"one").unwrap();
        assert!(matches!(session.set_salt(b"two"), Err(Error::Config(_))));
    }

    #[test]
    fn test_salt_after_derive_is_rejected() {
        let mut session = create_test_session(None);
        session.derive_key(b"password").unwrap();
        assert!(matches!(session.set_salt(b"late"), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_password_is_rejected() {
        let mut session = create_test_session(None);
        assert!(matches!(session.derive_key(b""), Err(Error::InvalidInput(_))));
        assert!(!session.has_key());
    }

    #[test]
    fn test_require_key_loads_lazily() {
        let dir = TempDir::new().unwrap();
        let mut session = create_test_session(Some(write_key_file(&dir)));

        assert_eq!(session.require_key().unwrap().as_bytes(), &[7u8; 32]);
        assert_eq!(session.origin(), Some(KeyOrigin::Loaded));
        // Second call reuses the loaded key
        assert!(session.require_key().is_ok());
    }

    #[test]
    fn test_require_key_keeps_derived_key() {
        let mut session = create_test_session(None);
        let derived = session.derive_key(b"password").unwrap().as_bytes().to_vec();

        assert_eq!(session.require_key().unwrap().as_bytes().to_vec(), derived);
        assert_eq!(session.origin(), Some(KeyOrigin::Derived));
    }

    #[test]
    fn test_require_key_without_source() {
        let mut session = create_test_session(None);
        assert!(matches!(session.require_key(), Err(Error::Config(_))));
    }

    #[test]
    fn test_failed_load_leaves_session_empty() {
        let dir = TempDir::new().unwrap();
        let mut session = create_test_session(Some(dir.path().join("missing")));

        assert!(matches!(session.load_key(), Err(Error::FileAccess { .. })));
        assert!(!session.has_key());
        session.derive_key(b"password").unwrap();
    }

    #[test]
    fn test_debug_hides_key() {
        let mut session = create_test_session(None);
        session.derive_key(b"password").unwrap();
        let debug = format!("{:?}", session);
        assert!(debug.contains("Derived"));
        assert!(!debug.contains("key:"));
    }
}
