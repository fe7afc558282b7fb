//! Session configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use quickcrypt_common::{Error, Result};
use quickcrypt_crypto::KdfParams;

/// On-disk encoding of a key file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFileFormat {
    /// The 32 key bytes, nothing else.
    #[default]
    Raw,
    /// Standard base64 of the 32 key bytes followed by a newline.
    Base64,
}

/// Argon2id cost preset for password-derived keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KdfStrength {
    #[default]
    Interactive,
    Moderate,
    Sensitive,
}

impl KdfStrength {
    /// Argon2id parameters for this preset.
    pub fn params(self) -> KdfParams {
        match self {
            KdfStrength::Interactive => KdfParams::interactive(),
            KdfStrength::Moderate => KdfParams::moderate(),
            KdfStrength::Sensitive => KdfParams::sensitive(),
        }
    }
}

impl FromStr for KdfStrength {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "interactive" => Ok(KdfStrength::Interactive),
            "moderate" => Ok(KdfStrength::Moderate),
            "sensitive" => Ok(KdfStrength::Sensitive),
            _ => Err(Error::Config(
                "Invalid strength. Use: interactive, moderate, or sensitive".to_string(),
            )),
        }
    }
}

impl fmt::Display for KdfStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KdfStrength::Interactive => "interactive",
            KdfStrength::Moderate => "moderate",
            KdfStrength::Sensitive => "sensitive",
        };
        f.write_str(name)
    }
}

/// Everything a [`Session`](crate::Session) needs before any key exists.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Key file to load from or generate into.
    pub key_path: Option<PathBuf>,
    /// Encoding of the key file.
    pub key_format: KeyFileFormat,
    /// Argon2id parameters for password derivation.
    pub kdf_params: KdfParams,
}
