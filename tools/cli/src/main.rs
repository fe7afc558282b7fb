//! QuickCrypt CLI - authenticated encryption of stdin to stdout.
//!
//! The key comes from a key file, a freshly generated key file, or a
//! password. Data is read from stdin and written to stdout; logs go to
//! stderr.

use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use quickcrypt_common::{Error, EXIT_FAILURE, EXIT_SUCCESS};
use quickcrypt_crypto::{StreamDecryptor, StreamEncryptor};
use quickcrypt_session::{KdfStrength, KeyFileFormat, Session, SessionConfig};

#[derive(Parser)]
#[command(name = "qc")]
#[command(about = "QuickCrypt - Streaming authenticated encryption")]
#[command(
    long_about = "QuickCrypt - Streaming authenticated encryption\n\n\
    Reads stdin and writes stdout. Keys are 256-bit and come from a key file \
    (-k), a newly generated key file (-k -g), or a password (-p/-P, with an \
    optional salt -s)."
)]
#[command(version, arg_required_else_help = true)]
struct Cli {
    /// Key file to read, or to write with --generate.
    #[arg(short, long, value_name = "PATH")]
    key: Option<PathBuf>,

    /// Key file is base64 text instead of raw bytes.
    #[arg(short, long)]
    base64: bool,

    /// Generate a random key and write it to the key file.
    #[arg(short, long)]
    generate: bool,

    /// Salt for password derivation (at most 16 bytes).
    #[arg(short, long)]
    salt: Option<OsString>,

    /// Derive the key from this password.
    #[arg(short, long, conflicts_with = "ask_password")]
    password: Option<OsString>,

    /// Prompt for the password on the terminal.
    #[arg(short = 'P', long)]
    ask_password: bool,

    /// KDF strength: "interactive", "moderate", or "sensitive".
    #[arg(long, default_value_t = KdfStrength::Interactive)]
    strength: KdfStrength,

    /// Encrypt stdin to stdout.
    #[arg(short, long, conflicts_with = "decrypt")]
    encrypt: bool,

    /// Decrypt stdin to stdout.
    #[arg(short, long)]
    decrypt: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayVersion => ExitCode::from(EXIT_SUCCESS),
                _ => ExitCode::from(EXIT_FAILURE),
            };
        }
    };

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    match run(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides the level.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Map a failure to the process exit code of its underlying error.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<Error>()
        .map(Error::exit_code)
        .unwrap_or(EXIT_FAILURE)
}

fn run(mut cli: Cli) -> Result<()> {
    let config = SessionConfig {
        key_path: cli.key.take(),
        key_format: if cli.base64 {
            KeyFileFormat::Base64
        } else {
            KeyFileFormat::Raw
        },
        kdf_params: cli.strength.params(),
    };
    debug!(strength = %cli.strength, format = ?config.key_format, "Session configured");
    let mut session = Session::new(config);

    if let Some(salt) = cli.salt.take() {
        session.set_salt(salt.as_encoded_bytes()).context("Failed to set salt")?;
    }

    if cli.generate {
        session.generate_key().context("Failed to generate key file")?;
        info!("Key file written");
    }

    if let Some(password) = read_password(&mut cli)? {
        session.derive_key(&password).context("Failed to derive key from password")?;
    }

    if !(cli.encrypt || cli.decrypt) {
        return Ok(());
    }

    let key = session.require_key().context("Failed to load key file")?;
    let stdin = io::stdin();
    let stdout = io::stdout();

    if cli.encrypt {
        let written = StreamEncryptor::new(key)
            .encrypt_stream(stdin.lock(), stdout.lock())
            .context("Failed to encrypt stdin")?;
        info!(bytes = written, "Encryption complete");
    } else {
        let written = StreamDecryptor::new(key)
            .decrypt_stream(stdin.lock(), stdout.lock())
            .context("Failed to decrypt stdin")?;
        info!(bytes = written, "Decryption complete");
    }

    Ok(())
}

/// Password bytes from `-p`, or from the terminal with `-P`.
///
/// Arguments are taken as raw bytes, so passwords need not be UTF-8.
fn read_password(cli: &mut Cli) -> Result<Option<Zeroizing<Vec<u8>>>> {
    if let Some(password) = cli.password.take() {
        return Ok(Some(Zeroizing::new(password.into_encoded_bytes())));
    }
    if cli.ask_password {
        let password =
            rpassword::prompt_password("Password: ").context("Failed to read password")?;
        return Ok(Some(Zeroizing::new(password.into_bytes())));
    }
    Ok(None)
}
