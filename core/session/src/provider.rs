//! Key sources: key files on disk and password derivation.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use quickcrypt_common::{Error, Result};
use quickcrypt_crypto::keys::KEY_LENGTH;
use quickcrypt_crypto::{derive_key, KdfParams, Salt, SecretKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{KeyFileFormat, SessionConfig};

/// Produces a [`SecretKey`] from one of the configured sources.
#[derive(Debug, Clone)]
pub struct KeyProvider {
    key_path: Option<PathBuf>,
    format: KeyFileFormat,
    kdf_params: KdfParams,
}

impl KeyProvider {
    /// Create a provider from a session configuration.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            key_path: config.key_path.clone(),
            format: config.key_format,
            kdf_params: config.kdf_params,
        }
    }

    /// Configured key file, if any.
    pub fn key_path(&self) -> Option<&Path> {
        self.key_path.as_deref()
    }

    fn require_path(&self) -> Result<&Path> {
        self.key_path
            .as_deref()
            .ok_or_else(|| Error::Config("no key was provided".to_string()))
    }

    /// Read the key from the configured key file.
    ///
    /// Raw files must hold at least 32 bytes; anything after them is
    /// ignored. Base64 files are trimmed before decoding and must decode to
    /// exactly 32 bytes.
    ///
    /// # Errors
    /// - `Config` if no key file is configured
    /// - `FileAccess` if the file cannot be opened, is too short, or is not
    ///   valid base64
    pub fn load(&self) -> Result<SecretKey> {
        let path = self.require_path()?;
        debug!(path = %path.display(), format = ?self.format, "Loading key file");

        let mut file = File::open(path).map_err(|e| Error::file_access(path, e))?;

        match self.format {
            KeyFileFormat::Raw => {
                let mut bytes = Zeroizing::new([0u8; KEY_LENGTH]);
                file.read_exact(&mut bytes[..]).map_err(|e| {
                    let e = if e.kind() == ErrorKind::UnexpectedEof {
                        io::Error::new(
                            ErrorKind::UnexpectedEof,
                            format!("key file is shorter than {} bytes", KEY_LENGTH),
                        )
                    } else {
                        e
                    };
                    Error::file_access(path, e)
                })?;
                Ok(SecretKey::from_bytes(*bytes))
            }
            KeyFileFormat::Base64 => {
                let mut text = Zeroizing::new(String::new());
                file.read_to_string(&mut text)
                    .map_err(|e| Error::file_access(path, e))?;

                let decoded = Zeroizing::new(STANDARD.decode(text.trim()).map_err(|e| {
                    let reason = format!("invalid base64 key: {}", e);
                    Error::file_access(path, io::Error::new(ErrorKind::InvalidData, reason))
                })?);
                if decoded.len() != KEY_LENGTH {
                    return Err(Error::file_access(
                        path,
                        io::Error::new(
                            ErrorKind::InvalidData,
                            format!("key must be {} bytes, found {}", KEY_LENGTH, decoded.len()),
                        ),
                    ));
                }
                SecretKey::from_slice(&decoded)
            }
        }
    }

    /// Generate a fresh random key and write it to the configured key file.
    ///
    /// The file is created exclusively, with owner-only permissions on unix.
    /// A partially written file is removed.
    ///
    /// # Errors
    /// - `Config` if no key file is configured or the file already exists
    /// - `FileAccess` if the file cannot be created or written
    pub fn generate(&self) -> Result<SecretKey> {
        let path = self.require_path()?;
        debug!(path = %path.display(), format = ?self.format, "Generating key file");

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => Error::Config(format!("{} already exists", path.display())),
            _ => Error::file_access(path, e),
        })?;

        let key = SecretKey::generate();
        if let Err(e) = write_key(&mut file, &key, self.format) {
            drop(file);
            let _ = fs::remove_file(path);
            return Err(Error::file_access(path, e));
        }

        Ok(key)
    }

    /// Derive a key from a password with Argon2id.
    ///
    /// Without a salt the all-zero salt is used.
    ///
    /// # Errors
    /// See [`derive_key`].
    pub fn derive(&self, password: &[u8], salt: Option<&Salt>) -> Result<SecretKey> {
        let salt = salt.cloned().unwrap_or_default();
        debug!(
            memory_cost = self.kdf_params.memory_cost,
            time_cost = self.kdf_params.time_cost,
            parallelism = self.kdf_params.parallelism,
            "Deriving key from password"
        );
        derive_key(password, &salt, &self.kdf_params)
    }
}

fn write_key(file: &mut File, key: &SecretKey, format: KeyFileFormat) -> io::Result<()> {
    match format {
        KeyFileFormat::Raw => file.write_all(key.as_bytes())?,
        KeyFileFormat::Base64 => {
            let mut text = Zeroizing::new(STANDARD.encode(key.as_bytes()));
            text.push('\n');
            file.write_all(text.as_bytes())?;
        }
    }
    file.sync_all()
}
