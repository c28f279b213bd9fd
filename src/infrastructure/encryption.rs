use crate::domain::card::{CardData, EncryptedCard};
use crate::domain::ports::CardVault;
use crate::error::{PaymentError, Result};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Card vault using AES-256-GCM.
///
/// The 256-bit key is the SHA-256 digest of the configured passphrase. Each blob is
/// `base64(nonce || ciphertext)` where the plaintext is the card serialized as JSON.
#[derive(Clone)]
pub struct AesCardVault {
    cipher: Aes256Gcm,
}

impl AesCardVault {
    pub fn new(passphrase: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(PaymentError::EncryptionError(
                "encryption key must not be empty".to_string(),
            ));
        }
        let key = Sha256::digest(passphrase.as_bytes());
        Ok(Self {
            cipher: Aes256Gcm::new(&key),
        })
    }
}

impl CardVault for AesCardVault {
    fn encrypt_card(&self, card: &CardData) -> Result<EncryptedCard> {
        let plaintext = serde_json::to_vec(card).map_err(|e| {
            PaymentError::EncryptionError(format!("card serialization failed: {}", e))
        })?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| PaymentError::EncryptionError(format!("AES encryption failed: {}", e)))?;

        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(EncryptedCard(STANDARD.encode(blob)))
    }

    fn decrypt_card(&self, blob: &EncryptedCard) -> Result<CardData> {
        let data = STANDARD
            .decode(&blob.0)
            .map_err(|e| PaymentError::EncryptionError(format!("invalid card blob: {}", e)))?;
        if data.len() <= NONCE_LEN {
            return Err(PaymentError::EncryptionError(
                "card blob too short (missing nonce)".to_string(),
            ));
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                PaymentError::EncryptionError(
                    "AES decryption failed (wrong key or tampered data)".to_string(),
                )
            })?;
        serde_json::from_slice(&plaintext).map_err(|e| {
            PaymentError::EncryptionError(format!("card deserialization failed: {}", e))
        })
    }
}
