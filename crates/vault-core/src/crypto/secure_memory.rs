//! Key material that is zeroed when dropped

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 256-bit symmetric key (data key, code key or biometric key)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; 32],
}

impl VaultKey {
    pub const LEN: usize = 32;

    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Fresh random key from the OS RNG
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Exactly 32 bytes, or `None`
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let key: [u8; 32] = slice.try_into().ok()?;
        Some(Self { key })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl PartialEq for VaultKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for VaultKey {}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
