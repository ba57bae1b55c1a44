//! AES-256-GCM sealing
//!
//! Sealed format: `{nonce_hex}:{tag_hex}:{ciphertext_hex}`
//! - nonce: 12 bytes, random per seal
//! - tag: 16 bytes
//! - ciphertext: same length as the plaintext

use std::fmt;
use std::str::FromStr;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use super::{CryptoError, VaultKey};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Authenticated ciphertext with its nonce and tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    nonce: [u8; NONCE_LEN],
    tag: [u8; TAG_LEN],
    ciphertext: Vec<u8>,
}

impl fmt::Display for SealedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            hex::encode(self.nonce),
            hex::encode(self.tag),
            hex::encode(&self.ciphertext)
        )
    }
}

impl FromStr for SealedBox {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(nonce), Some(tag), Some(ciphertext), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::Malformed(
                "expected nonce:tag:ciphertext".to_string(),
            ));
        };

        let nonce = decode_fixed::<NONCE_LEN>(nonce, "nonce")?;
        let tag = decode_fixed::<TAG_LEN>(tag, "tag")?;
        let ciphertext = hex::decode(ciphertext)
            .map_err(|e| CryptoError::Malformed(format!("ciphertext: {}", e)))?;

        Ok(Self {
            nonce,
            tag,
            ciphertext,
        })
    }
}

fn decode_fixed<const N: usize>(hex_str: &str, what: &str) -> Result<[u8; N], CryptoError> {
    let bytes =
        hex::decode(hex_str).map_err(|e| CryptoError::Malformed(format!("{}: {}", what, e)))?;
    bytes.as_slice().try_into().map_err(|_| {
        CryptoError::Malformed(format!(
            "{} length: expected {}, got {}",
            what,
            N,
            bytes.len()
        ))
    })
}

/// Seal `plaintext` under `key` with a fresh random nonce
pub fn seal(plaintext: &[u8], key: &VaultKey) -> Result<SealedBox, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    // aes-gcm appends the tag to the ciphertext
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let tag_start = sealed
        .len()
        .checked_sub(TAG_LEN)
        .ok_or_else(|| CryptoError::Encryption("ciphertext shorter than tag".to_string()))?;
    let tag: [u8; TAG_LEN] = sealed[tag_start..]
        .try_into()
        .map_err(|_| CryptoError::Encryption("bad tag length".to_string()))?;
    sealed.truncate(tag_start);

    Ok(SealedBox {
        nonce,
        tag,
        ciphertext: sealed,
    })
}

/// Open a sealed box; fails on a wrong key or tampered data
pub fn open(sealed: &SealedBox, key: &VaultKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;

    let mut ciphertext_with_tag = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    ciphertext_with_tag.extend_from_slice(&sealed.ciphertext);
    ciphertext_with_tag.extend_from_slice(&sealed.tag);

    cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), ciphertext_with_tag.as_slice())
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

pub fn seal_string(plaintext: &str, key: &VaultKey) -> Result<String, CryptoError> {
    Ok(seal(plaintext.as_bytes(), key)?.to_string())
}

pub fn open_string(sealed: &str, key: &VaultKey) -> Result<String, CryptoError> {
    let sealed: SealedBox = sealed.parse()?;
    let plaintext = open(&sealed, key)?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {}", e)))
}

/// Wrap `key` under a key-encryption key
pub fn wrap_key(key: &VaultKey, kek: &VaultKey) -> Result<String, CryptoError> {
    Ok(seal(key.as_bytes(), kek)?.to_string())
}

/// Recover a key wrapped by [`wrap_key`]
pub fn unwrap_key(wrapped: &str, kek: &VaultKey) -> Result<VaultKey, CryptoError> {
    let sealed: SealedBox = wrapped.parse()?;
    let bytes = open(&sealed, kek)?;
    VaultKey::from_slice(&bytes)
        .ok_or_else(|| CryptoError::Decryption(format!("unwrapped key has {} bytes", bytes.len())))
}
