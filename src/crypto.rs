//! Credential encryption using AES-256-GCM
//!
//! Connection credentials (API keys, OAuth tokens, database passwords) are stored as an
//! encrypted JSON blob. The additional authenticated data binds each blob to the team,
//! connector and connection it was written for, so a ciphertext copied onto another row fails
//! to decrypt.
//!
//! Blob layout: `0x01 | nonce (12) | ciphertext + tag (16)`.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_LEN: usize = 32;
const BLOB_VERSION: u8 = 0x01;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + NONCE_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("crypto key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed: wrong key or bound to another connection")]
    Decrypt,
    #[error("credential blob is not in the encrypted format")]
    MalformedBlob,
    #[error("credentials are not valid JSON: {0}")]
    InvalidCredentials(#[from] serde_json::Error),
}

/// AES-256 key, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey([u8; KEY_LEN]);

impl std::fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKey(..)")
    }
}

impl CryptoKey {
    pub fn new(mut bytes: Vec<u8>) -> Result<Self, CryptoError> {
        let len = bytes.len();
        let key = <[u8; KEY_LEN]>::try_from(bytes.as_slice())
            .map_err(|_| CryptoError::InvalidKeyLength(len));
        bytes.zeroize();
        key.map(Self)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }

    /// Encrypt `plaintext` under a fresh random nonce
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher()
            .encrypt(&nonce, Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::Encrypt)?;

        let mut blob = Vec::with_capacity(HEADER_LEN + sealed.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`CryptoKey::seal`] with the same `aad`
    pub fn open(&self, aad: &[u8], blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if !is_sealed(blob) {
            return Err(CryptoError::MalformedBlob);
        }
        let (header, sealed) = blob.split_at(HEADER_LEN);
        let nonce = Nonce::from_slice(&header[1..]);

        self.cipher()
            .decrypt(nonce, Payload { msg: sealed, aad })
            .map_err(|_| CryptoError::Decrypt)
    }
}

/// Whether `blob` carries the version byte and room for nonce and tag
pub fn is_sealed(blob: &[u8]) -> bool {
    blob.len() >= HEADER_LEN + TAG_LEN && blob[0] == BLOB_VERSION
}

/// AAD binding a credential blob to its connection row.
pub fn credentials_aad(team_id: Uuid, connector_slug: &str, connection_id: Uuid) -> String {
    format!("{team_id}|{connector_slug}|{connection_id}")
}

pub fn encrypt_credentials(
    key: &CryptoKey,
    aad: &str,
    credentials: &JsonValue,
) -> Result<Vec<u8>, CryptoError> {
    let mut plaintext = serde_json::to_vec(credentials)?;
    let blob = key.seal(aad.as_bytes(), &plaintext);
    plaintext.zeroize();
    blob
}

pub fn decrypt_credentials(
    key: &CryptoKey,
    aad: &str,
    blob: &[u8],
) -> Result<JsonValue, CryptoError> {
    let mut plaintext = key.open(aad.as_bytes(), blob)?;
    let credentials = serde_json::from_slice(&plaintext);
    plaintext.zeroize();
    Ok(credentials?)
}
