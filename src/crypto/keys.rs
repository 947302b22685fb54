//! Identity Keys
//!
//! RSA-2048 key pairs stored as PEM files. Private keys are written as PKCS#1
//! (`BEGIN RSA PRIVATE KEY`), public keys as SubjectPublicKeyInfo
//! (`BEGIN PUBLIC KEY`), LF line endings, no trailing newline. That public PEM
//! text is the identity string every peer compares against.
//!
//! On disk, each operator name owns a directory:
//!
//! ```text
//! keys/
//!   alice/client_private_key.pem
//!   alice/client_public_key.pem
//!   server_public_key.pem        <- trusted relay identity
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

use super::{signer, CodecError};

/// Modulus size for generated keys.
pub const KEY_BITS: usize = 2048;

/// File name of an identity's private key.
pub const PRIVATE_KEY_FILE: &str = "client_private_key.pem";

/// File name of an identity's public key.
pub const PUBLIC_KEY_FILE: &str = "client_public_key.pem";

/// File name of the provisioned relay public key, directly under the key directory.
pub const RELAY_PUBLIC_KEY_FILE: &str = "server_public_key.pem";

/// Key loading and storage errors.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Reading or writing a key file failed
    #[error("key file {}: {source}", path.display())]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Private key PEM could not be decoded
    #[error("malformed private key: {0}")]
    PrivateKey(String),

    /// Public key PEM could not be decoded or encoded
    #[error("malformed public key: {0}")]
    PublicKey(String),

    /// RSA key generation failed
    #[error("key generation failed: {0}")]
    Generate(String),
}

/// An identity: private key plus its canonical public PEM.
#[derive(Clone)]
pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_pem: String,
}

impl KeyPair {
    /// Generate a fresh 2048-bit key pair.
    pub fn generate() -> Result<Self, KeyError> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS)
            .map_err(|e| KeyError::Generate(e.to_string()))?;
        Self::from_private_key(private_key)
    }

    /// Wrap an existing private key.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, KeyError> {
        let public_pem = encode_public_pem(&private_key.to_public_key())?;
        Ok(Self { private_key, public_pem })
    }

    /// Decode a private key from PEM (PKCS#1, or PKCS#8 as a fallback).
    pub fn from_private_pem(pem: &str) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| KeyError::PrivateKey(e.to_string()))?;
        Self::from_private_key(private_key)
    }

    /// Load from a private key file.
    ///
    /// The public half is derived from the private key, so a stale or
    /// mismatched public file can never leak into the identity.
    pub fn load(private_path: &Path) -> Result<Self, KeyError> {
        Self::from_private_pem(&read_file(private_path)?)
    }

    /// Load the identity stored under `key_dir/<name>/`.
    pub fn load_named(key_dir: &Path, name: &str) -> Result<Self, KeyError> {
        Self::load(&identity_dir(key_dir, name).join(PRIVATE_KEY_FILE))
    }

    /// Write both halves as PEM files.
    pub fn save(&self, private_path: &Path, public_path: &Path) -> Result<(), KeyError> {
        let private_pem = self
            .private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| KeyError::PrivateKey(e.to_string()))?;
        write_file(private_path, private_pem.trim_end())?;
        write_file(public_path, &self.public_pem)
    }

    /// Write both halves under `key_dir/<name>/`, creating the directory.
    pub fn save_named(&self, key_dir: &Path, name: &str) -> Result<PathBuf, KeyError> {
        let dir = identity_dir(key_dir, name);
        fs::create_dir_all(&dir).map_err(|source| KeyError::Io {
            path: dir.clone(),
            source,
        })?;
        self.save(&dir.join(PRIVATE_KEY_FILE), &dir.join(PUBLIC_KEY_FILE))?;
        Ok(dir)
    }

    /// Export the public half as the trusted relay key for peers.
    pub fn save_as_relay_key(&self, key_dir: &Path) -> Result<PathBuf, KeyError> {
        fs::create_dir_all(key_dir).map_err(|source| KeyError::Io {
            path: key_dir.to_path_buf(),
            source,
        })?;
        let path = relay_public_key_path(key_dir);
        write_file(&path, &self.public_pem)?;
        Ok(path)
    }

    /// Canonical public PEM, which is also the identity string.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// The private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Sign `message`, returning a base64 signature.
    pub fn sign(&self, message: &[u8]) -> Result<String, CodecError> {
        signer::sign(message, &self.private_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("identity", &short_identity(&self.public_pem))
            .finish_non_exhaustive()
    }
}

/// Directory holding the keys of identity `name`.
pub fn identity_dir(key_dir: &Path, name: &str) -> PathBuf {
    key_dir.join(name)
}

/// Location of the provisioned relay public key.
pub fn relay_public_key_path(key_dir: &Path) -> PathBuf {
    key_dir.join(RELAY_PUBLIC_KEY_FILE)
}

/// Check whether an identity already has a private key on disk.
pub fn identity_exists(key_dir: &Path, name: &str) -> bool {
    identity_dir(key_dir, name).join(PRIVATE_KEY_FILE).is_file()
}

/// Read a public key file and return its canonical PEM.
pub fn load_public_key_pem(path: &Path) -> Result<String, KeyError> {
    canonical_public_pem(&read_file(path)?)
}

/// Parse a public key PEM, accepting trailing whitespace or CRLF.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, KeyError> {
    let normalized = format!("{}\n", pem.replace("\r\n", "\n").trim_end());
    RsaPublicKey::from_public_key_pem(&normalized).map_err(|e| KeyError::PublicKey(e.to_string()))
}

/// Re-encode a public key PEM into its canonical identity form.
pub fn canonical_public_pem(pem: &str) -> Result<String, KeyError> {
    encode_public_pem(&parse_public_key(pem)?)
}

/// Short human-readable form of an identity for logs.
///
/// Twenty characters of the base64 body, taken after the algorithm prefix
/// that every RSA-2048 key shares.
pub fn short_identity(pem: &str) -> String {
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let distinctive = body.get(44..64).or_else(|| body.get(..20)).unwrap_or(body.as_str());
    format!("{}...", distinctive)
}

fn encode_public_pem(public_key: &RsaPublicKey) -> Result<String, KeyError> {
    let pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::PublicKey(e.to_string()))?;
    Ok(pem.trim_end().to_string())
}

fn read_file(path: &Path) -> Result<String, KeyError> {
    fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), KeyError> {
    fs::write(path, contents).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// TESTS
// =============================================================================
