//! Sealed connection tokens.
//!
//! A token is `base64url(nonce || seal(key, nonce, json(identity)))` under
//! ChaCha20-Poly1305. The AEAD tag makes decryption and authentication the
//! same step: anything that opens under the shared key was minted by a key
//! holder. Tokens travel in a URL query parameter, hence the url-safe
//! alphabet.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use sha2::{Digest, Sha256};

use relay_core::Identity;

use crate::TokenVerifier;

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token sealing failed")]
    SealingFailed,

    #[error("identity serialization failed: {0}")]
    Serialization(String),
}

/// Verifies (and mints) tokens sealed under a shared symmetric key.
pub struct SealedTokenVerifier {
    cipher: ChaCha20Poly1305,
}

impl SealedTokenVerifier {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.into()),
        }
    }

    /// Derive the sealing key from an operator-supplied secret string, so
    /// the identity service and this subsystem only have to share a string.
    pub fn from_secret(secret: &str) -> Self {
        let key: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        Self::new(&key)
    }

    /// Issue a token for an identity. Production tokens come from the
    /// identity service holding the same key; this end is used by
    /// provisioning tooling and tests.
    pub fn mint(&self, identity: &Identity) -> Result<String, AuthError> {
        let payload =
            serde_json::to_vec(identity).map_err(|e| AuthError::Serialization(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, payload.as_slice())
            .map_err(|_| AuthError::SealingFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(combined))
    }
}

impl TokenVerifier for SealedTokenVerifier {
    fn verify(&self, credential: &str) -> Option<Identity> {
        let combined = URL_SAFE_NO_PAD.decode(credential).ok()?;
        if combined.len() < NONCE_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.cipher.decrypt(nonce, ciphertext).ok()?;
        serde_json::from_slice(&plaintext).ok()
    }
}

/// Generate a random 32-byte sealing key.
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Role, VendorId};

    fn vendor_identity() -> Identity {
        Identity::vendor(&VendorId::from_raw("ven_test"))
    }

    #[test]
    fn mint_and_verify_round_trip() {
        let verifier = SealedTokenVerifier::new(&generate_key());
        let token = verifier.mint(&vendor_identity()).unwrap();
        let identity = verifier.verify(&token).unwrap();
        assert_eq!(identity, vendor_identity());
    }

    #[test]
    fn role_survives_round_trip() {
        let verifier = SealedTokenVerifier::new(&generate_key());
        let token = verifier.mint(&Identity::new("usr_7", Role::Customer)).unwrap();
        let identity = verifier.verify(&token).unwrap();
        assert_eq!(identity.role, Role::Customer);
        assert_eq!(identity.subject, "usr_7");
    }

    #[test]
    fn minting_twice_produces_different_tokens() {
        let verifier = SealedTokenVerifier::new(&generate_key());
        let a = verifier.mint(&vendor_identity()).unwrap();
        let b = verifier.mint(&vendor_identity()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_verification() {
        let minter = SealedTokenVerifier::new(&generate_key());
        let verifier = SealedTokenVerifier::new(&generate_key());
        let token = minter.mint(&vendor_identity()).unwrap();
        assert!(verifier.verify(&token).is_none());
    }

    #[test]
    fn from_secret_is_deterministic() {
        let a = SealedTokenVerifier::from_secret("shared-secret");
        let b = SealedTokenVerifier::from_secret("shared-secret");
        let token = a.mint(&vendor_identity()).unwrap();
        assert_eq!(b.verify(&token), Some(vendor_identity()));
    }

    #[test]
    fn tampered_token_fails_verification() {
        let verifier = SealedTokenVerifier::new(&generate_key());
        let token = verifier.mint(&vendor_identity()).unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(&bytes);
        assert!(verifier.verify(&tampered).is_none());
    }

    #[test]
    fn truncated_token_fails_verification() {
        let verifier = SealedTokenVerifier::new(&generate_key());
        let token = verifier.mint(&vendor_identity()).unwrap();
        assert!(verifier.verify(&token[..8]).is_none());
    }

    #[test]
    fn garbage_fails_verification() {
        let verifier = SealedTokenVerifier::new(&generate_key());
        assert!(verifier.verify("").is_none());
        assert!(verifier.verify("not a token").is_none());
    }

    #[test]
    fn generated_keys_are_distinct() {
        assert_ne!(generate_key(), generate_key());
    }
}
