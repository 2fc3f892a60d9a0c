//! Repository credential sealing
//!
//! Credentials are opaque bytes at rest: AES-256-GCM with a process-wide
//! key, a fresh 96-bit nonce per seal, and the nonce stored as a prefix of
//! the hex-encoded ciphertext.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::error::{StoreError, StoreResult};

const NONCE_LEN: usize = 12;

pub struct CredentialSealer {
    cipher: Aes256Gcm,
}

impl CredentialSealer {
    /// Build from a 64-hex-char (32-byte) master key.
    pub fn from_hex_key(hex_key: &str) -> StoreResult<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| StoreError::Crypto(format!("master key is not hex: {}", e)))?;
        if bytes.len() != 32 {
            return Err(StoreError::Crypto(format!(
                "master key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Seal a plaintext credential into `hex(nonce || ciphertext)`.
    pub fn seal(&self, plaintext: &str) -> StoreResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| StoreError::Crypto(format!("encrypt failed: {}", e)))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    /// Recover the plaintext credential from a sealed value.
    pub fn unseal(&self, sealed: &str) -> StoreResult<String> {
        let bytes = hex::decode(sealed)
            .map_err(|e| StoreError::Crypto(format!("sealed credential is not hex: {}", e)))?;
        if bytes.len() <= NONCE_LEN {
            return Err(StoreError::Crypto("sealed credential too short".to_string()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| StoreError::Crypto(format!("decrypt failed: {}", e)))?;
        String::from_utf8(plaintext)
            .map_err(|e| StoreError::Crypto(format!("credential is not utf-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn seal_unseal_round_trip() {
        let sealer = CredentialSealer::from_hex_key(KEY).unwrap();
        let sealed = sealer.seal("ghp_secrettoken").unwrap();
        assert_ne!(sealed, "ghp_secrettoken");
        assert_eq!(sealer.unseal(&sealed).unwrap(), "ghp_secrettoken");
    }

    #[test]
    fn nonce_makes_sealing_nondeterministic() {
        let sealer = CredentialSealer::from_hex_key(KEY).unwrap();
        let a = sealer.seal("token").unwrap();
        let b = sealer.seal("token").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_unseal() {
        let sealer = CredentialSealer::from_hex_key(KEY).unwrap();
        let sealed = sealer.seal("token").unwrap();
        let other = CredentialSealer::from_hex_key(
            "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .unwrap();
        assert!(other.unseal(&sealed).is_err());
    }

    #[test]
    fn short_key_rejected() {
        assert!(CredentialSealer::from_hex_key("abcd").is_err());
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let sealer = CredentialSealer::from_hex_key(KEY).unwrap();
        let mut sealed = sealer.seal("token").unwrap();
        let flipped = if sealed.ends_with('0') { '1' } else { '0' };
        sealed.pop();
        sealed.push(flipped);
        assert!(sealer.unseal(&sealed).is_err());
    }
}
