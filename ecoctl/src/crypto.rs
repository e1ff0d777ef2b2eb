//! Encryption of OAuth tokens at rest.
//!
//! Google access and refresh tokens are stored AES-256-GCM encrypted. The stored form is
//! `base64(nonce || ciphertext)` with a fresh 96-bit nonce per value.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose};

const NONCE_LEN: usize = 12;

/// Cipher used to seal and open stored OAuth tokens.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not valid base64 or not 32 bytes long.
    pub fn from_base64_key(key_b64: &str) -> anyhow::Result<Self> {
        let key_bytes = general_purpose::STANDARD
            .decode(key_b64)
            .map_err(|e| anyhow::anyhow!("Failed to decode encryption key: {}", e))?;

        if key_bytes.len() != 32 {
            return Err(anyhow::anyhow!(
                "Encryption key must be 32 bytes (256 bits), got {} bytes",
                key_bytes.len()
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes).map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;
        Ok(Self { cipher })
    }

    /// Encrypt a token, returning `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(sealed))
    }

    /// Decrypt a value produced by [`TokenCipher::encrypt`].
    pub fn decrypt(&self, sealed_b64: &str) -> anyhow::Result<String> {
        let sealed = general_purpose::STANDARD
            .decode(sealed_b64)
            .map_err(|e| anyhow::anyhow!("Failed to decode encrypted data: {}", e))?;

        if sealed.len() < NONCE_LEN {
            return Err(anyhow::anyhow!("Encrypted data too short"));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| anyhow::anyhow!("Decryption failed: {}", e))?;

        String::from_utf8(plaintext).map_err(|e| anyhow::anyhow!("Decrypted token is not UTF-8: {}", e))
    }
}
