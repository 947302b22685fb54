//! Signature Codec
//!
//! Everything a participant needs to prove authorship of a message:
//!
//! - `canonical`: byte-exact JSON encoding that every peer reproduces
//! - `keys`: RSA key pairs, PEM import/export, per-identity key directories
//! - `signer`: detached PKCS#1 v1.5 / SHA-256 signatures, base64 on the wire
//!
//! The canonical PEM text of a public key doubles as the player identity.

pub mod canonical;
pub mod keys;
pub mod signer;

use thiserror::Error;

pub use canonical::{canonicalize, canonicalize_map};
pub use keys::{KeyPair, KeyError, canonical_public_pem, load_public_key_pem};
pub use signer::{sign, verify};

/// Failures while encoding or signing.
///
/// Verification never produces one of these; it answers `false` instead.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Canonical JSON could not be produced
    #[error("canonical encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The RSA primitive refused to sign
    #[error("signing failed: {0}")]
    Sign(String),

    /// Public key text was not a PEM-encoded RSA key
    #[error("invalid public key: {0}")]
    PublicKey(String),
}
