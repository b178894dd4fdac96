// src/encryption/mod.rs
//! Optional AES-256-GCM at-rest layer with per-user, per-purpose keys
//! (spec §4.13). Wire format: `version:algorithm:iv:authTag:ciphertext`,
//! each segment base64.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const WIRE_VERSION: &str = "1";
const ALGORITHM: &str = "aes-256-gcm";
const NONCE_LEN: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("malformed ciphertext envelope")]
    MalformedEnvelope,
    #[error("unsupported version or algorithm")]
    UnsupportedVersion,
    #[error("authentication failed")]
    AuthFailed,
    #[error("invalid key material")]
    InvalidKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    SemanticContent,
    EpisodicMessages,
    ProceduralRules,
}

impl Purpose {
    fn label(&self) -> &'static str {
        match self {
            Self::SemanticContent => "SEMANTIC_CONTENT",
            Self::EpisodicMessages => "EPISODIC_MESSAGES",
            Self::ProceduralRules => "PROCEDURAL_RULES",
        }
    }
}

/// Derives a per-user, per-purpose 256-bit key from the root key via
/// SHA-256 domain separation (HKDF-equivalent per SPEC_FULL §4.13).
fn derive_key(root_key: &[u8], user_id: &str, purpose: Purpose) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(root_key);
    hasher.update(b"|");
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(purpose.label().as_bytes());
    hasher.finalize().into()
}

pub struct EncryptionService {
    root_key: Vec<u8>,
}

impl EncryptionService {
    pub fn new(root_key_hex: &str) -> Result<Self, EncryptionError> {
        let root_key = hex::decode(root_key_hex).map_err(|_| EncryptionError::InvalidKey)?;
        if root_key.is_empty() {
            return Err(EncryptionError::InvalidKey);
        }
        Ok(Self { root_key })
    }

    pub fn encrypt(&self, plaintext: &str, user_id: &str, purpose: Purpose) -> Result<String, EncryptionError> {
        let key_bytes = derive_key(&self.root_key, user_id, purpose);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        let cipher = Aes256Gcm::new(key);

        let mut iv = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let ciphertext_and_tag = cipher
            .encrypt(nonce, Payload { msg: plaintext.as_bytes(), aad: &[] })
            .map_err(|_| EncryptionError::AuthFailed)?;

        // aes-gcm appends the 16-byte tag to the ciphertext; split it back
        // out so the wire format can carry `authTag` as its own segment.
        let tag_start = ciphertext_and_tag.len().saturating_sub(16);
        let (ciphertext, tag) = ciphertext_and_tag.split_at(tag_start);

        Ok(format!(
            "{WIRE_VERSION}:{ALGORITHM}:{}:{}:{}",
            B64.encode(iv),
            B64.encode(tag),
            B64.encode(ciphertext),
        ))
    }

    pub fn decrypt(&self, envelope: &str, user_id: &str, purpose: Purpose) -> Result<String, EncryptionError> {
        let parts: Vec<&str> = envelope.split(':').collect();
        let [version, algorithm, iv_b64, tag_b64, ciphertext_b64] = parts[..] else {
            return Err(EncryptionError::MalformedEnvelope);
        };
        if version.parse::<u32>().is_err() || algorithm != ALGORITHM {
            return Err(EncryptionError::UnsupportedVersion);
        }

        let iv = B64.decode(iv_b64).map_err(|_| EncryptionError::MalformedEnvelope)?;
        let tag = B64.decode(tag_b64).map_err(|_| EncryptionError::MalformedEnvelope)?;
        let ciphertext = B64.decode(ciphertext_b64).map_err(|_| EncryptionError::MalformedEnvelope)?;
        if iv.len() != NONCE_LEN {
            return Err(EncryptionError::MalformedEnvelope);
        }

        let key_bytes = derive_key(&self.root_key, user_id, purpose);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(&iv);

        let mut combined = ciphertext;
        combined.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(nonce, Payload { msg: &combined, aad: &[] })
            .map_err(|_| EncryptionError::AuthFailed)?;

        String::from_utf8(plaintext).map_err(|_| EncryptionError::AuthFailed)
    }

    /// True iff the first component parses as a non-negative integer and
    /// the algorithm token matches (spec §6) — a lighter check than a full
    /// decrypt, used to decide whether a stored value needs decrypting at
    /// all before a key/user is known.
    pub fn is_encrypted_string(value: &str) -> bool {
        let parts: Vec<&str> = value.splitn(5, ':').collect();
        parts.len() == 5 && parts[0].parse::<u32>().is_ok() && parts[1] == ALGORITHM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> EncryptionService {
        EncryptionService::new(&hex::encode([7u8; 32])).unwrap()
    }

    #[test]
    fn round_trips() {
        let svc = service();
        let envelope = svc.encrypt("hello world", "u1", Purpose::SemanticContent).unwrap();
        assert!(EncryptionService::is_encrypted_string(&envelope));
        let plain = svc.decrypt(&envelope, "u1", Purpose::SemanticContent).unwrap();
        assert_eq!(plain, "hello world");
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let svc = service();
        let mut envelope = svc.encrypt("hello world", "u1", Purpose::SemanticContent).unwrap();
        envelope.push('x');
        let err = svc.decrypt(&envelope, "u1", Purpose::SemanticContent);
        assert!(err.is_err());
    }

    #[test]
    fn wrong_user_fails_auth() {
        let svc = service();
        let envelope = svc.encrypt("hello world", "u1", Purpose::SemanticContent).unwrap();
        let err = svc.decrypt(&envelope, "u2", Purpose::SemanticContent);
        assert!(matches!(err, Err(EncryptionError::AuthFailed)));
    }

    #[test]
    fn malformed_envelope_rejected() {
        let svc = service();
        assert!(matches!(
            svc.decrypt("not-an-envelope", "u1", Purpose::SemanticContent),
            Err(EncryptionError::MalformedEnvelope)
        ));
    }
}
