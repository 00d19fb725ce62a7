use aes_gcm::{
    aead::{consts::U16, Aead, AeadCore, KeyInit, OsRng},
    aes::Aes256,
    AesGcm, Nonce,
};
use authvault_core::StorageError;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// AES-256-GCM with a 128-bit IV.
type TenantAead = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
    #[error("authentication failed")]
    Integrity,
    #[error("encrypt failed: {0}")]
    Encrypt(String),
}

impl From<CipherError> for StorageError {
    fn from(err: CipherError) -> Self {
        StorageError::Integrity(err.to_string())
    }
}

/// Authenticated encryption with a key derived per tenant from a shared secret.
///
/// Output is `hex(iv):hex(tag):hex(ciphertext)`. Decrypting with a different
/// tenant id than the one used to encrypt fails with `CipherError::Integrity`.
#[derive(Clone)]
pub struct TenantCipher {
    secret: String,
}

impl std::fmt::Debug for TenantCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCipher").finish_non_exhaustive()
    }
}

impl TenantCipher {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn encrypt(&self, plaintext: &str, tenant_id: &str) -> Result<String, CipherError> {
        let cipher = self.cipher_for(tenant_id)?;
        let iv = TenantAead::generate_nonce(&mut OsRng);
        let mut sealed = cipher
            .encrypt(&iv, plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;
        // aes-gcm appends the tag to the ciphertext.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(sealed)
        ))
    }

    pub fn decrypt(&self, encoded: &str, tenant_id: &str) -> Result<String, CipherError> {
        let parts: Vec<&str> = encoded.split(':').collect();
        let [iv_hex, tag_hex, body_hex] = parts.as_slice() else {
            return Err(CipherError::Malformed(format!(
                "expected 3 fields, got {}",
                parts.len()
            )));
        };

        let iv = decode_field("iv", iv_hex)?;
        let tag = decode_field("tag", tag_hex)?;
        let mut sealed = decode_field("ciphertext", body_hex)?;
        if iv.len() != IV_LEN {
            return Err(CipherError::Malformed(format!(
                "expected {IV_LEN}-byte iv, got {}",
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(CipherError::Malformed(format!(
                "expected {TAG_LEN}-byte tag, got {}",
                tag.len()
            )));
        }
        sealed.extend_from_slice(&tag);

        let cipher = self.cipher_for(tenant_id)?;
        let plaintext = cipher
            .decrypt(Nonce::<U16>::from_slice(&iv), sealed.as_slice())
            .map_err(|_| CipherError::Integrity)?;
        String::from_utf8(plaintext).map_err(|e| CipherError::Malformed(e.to_string()))
    }

    fn cipher_for(&self, tenant_id: &str) -> Result<TenantAead, CipherError> {
        let key = derive_key(&self.secret, tenant_id);
        TenantAead::new_from_slice(&key).map_err(|e| CipherError::Encrypt(e.to_string()))
    }
}

/// SHA-256 over `secret || tenant_id`.
fn derive_key(secret: &str, tenant_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(tenant_id.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&hasher.finalize());
    key
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CipherError> {
    hex::decode(value).map_err(|e| CipherError::Malformed(format!("{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{"access_token":"t","token_type":"bearer"}"#;

    #[test]
    fn round_trip_for_same_tenant() {
        let cipher = TenantCipher::new("s3cret");
        let sealed = cipher.encrypt(PAYLOAD, "u1").expect("encrypt");

        let fields: Vec<&str> = sealed.split(':').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].len(), IV_LEN * 2);
        assert_eq!(fields[1].len(), TAG_LEN * 2);
        assert!(!sealed.contains("access_token"));

        assert_eq!(cipher.decrypt(&sealed, "u1").expect("decrypt"), PAYLOAD);
    }

    #[test]
    fn fresh_iv_per_encryption() {
        let cipher = TenantCipher::new("s3cret");
        let a = cipher.encrypt(PAYLOAD, "u1").expect("encrypt");
        let b = cipher.encrypt(PAYLOAD, "u1").expect("encrypt");
        assert_ne!(a, b);
    }

    #[test]
    fn other_tenant_cannot_decrypt() {
        let cipher = TenantCipher::new("s3cret");
        let sealed = cipher.encrypt(PAYLOAD, "tenant-a").expect("encrypt");
        assert_eq!(
            cipher.decrypt(&sealed, "tenant-b"),
            Err(CipherError::Integrity)
        );
    }

    #[test]
    fn other_secret_cannot_decrypt() {
        let sealed = TenantCipher::new("one")
            .encrypt(PAYLOAD, "u1")
            .expect("encrypt");
        assert_eq!(
            TenantCipher::new("two").decrypt(&sealed, "u1"),
            Err(CipherError::Integrity)
        );
    }

    #[test]
    fn tampered_ciphertext_fails_integrity() {
        let cipher = TenantCipher::new("s3cret");
        let sealed = cipher.encrypt(PAYLOAD, "u1").expect("encrypt");
        let tampered = flip_last_hex_char(&sealed);
        assert_eq!(cipher.decrypt(&tampered, "u1"), Err(CipherError::Integrity));
    }

    #[test]
    fn malformed_input_is_an_error() {
        let cipher = TenantCipher::new("s3cret");
        assert!(matches!(
            cipher.decrypt("deadbeef", "u1"),
            Err(CipherError::Malformed(_))
        ));
        assert!(matches!(
            cipher.decrypt("a:b:c:d", "u1"),
            Err(CipherError::Malformed(_))
        ));
        assert!(matches!(
            cipher.decrypt("zz:00:00", "u1"),
            Err(CipherError::Malformed(_))
        ));
        assert!(matches!(
            cipher.decrypt("00:00:00", "u1"),
            Err(CipherError::Malformed(_))
        ));
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", TenantCipher::new("s3cret"));
        assert!(!rendered.contains("s3cret"));
    }

    fn flip_last_hex_char(sealed: &str) -> String {
        let mut chars: Vec<char> = sealed.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        chars.into_iter().collect()
    }
}
