//! Common types shared across QuickCrypt crates.
//!
//! This crate provides the error taxonomy used by the crypto engine, the
//! key-management session and the command line front end.

pub mod error;

pub use error::{Error, Result, EXIT_FAILURE, EXIT_INTEGRITY_FAILURE, EXIT_SUCCESS};
