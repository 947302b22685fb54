//! Detached Signatures
//!
//! RSASSA-PKCS1-v1_5 over SHA-256. Signatures travel as standard base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::keys::parse_public_key;
use super::CodecError;

/// Sign `message` and return the base64 signature.
///
/// PKCS#1 v1.5 is deterministic; the RNG only blinds the private-key
/// operation.
pub fn sign(message: &[u8], private_key: &RsaPrivateKey) -> Result<String, CodecError> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand::thread_rng();
    let signature = signing_key
        .try_sign_with_rng(&mut rng, message)
        .map_err(|e| CodecError::Sign(e.to_string()))?;
    Ok(BASE64.encode(signature.to_bytes()))
}

/// Check a base64 signature over `message` against a PEM public key.
///
/// Any failure (bad base64, bad key, wrong length, mismatch) is `false`.
pub fn verify(message: &[u8], signature_b64: &str, public_key_pem: &str) -> bool {
    match parse_public_key(public_key_pem) {
        Ok(public_key) => verify_with_key(message, signature_b64, &public_key),
        Err(_) => false,
    }
}

/// Like [`verify`], with an already-parsed key.
pub fn verify_with_key(message: &[u8], signature_b64: &str, public_key: &RsaPublicKey) -> bool {
    let Ok(bytes) = BASE64.decode(signature_b64.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(message, &signature)
        .is_ok()
}

// =============================================================================
// TESTS
// =============================================================================
