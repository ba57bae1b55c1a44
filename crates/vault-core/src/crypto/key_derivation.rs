//! Unlock-code key derivation using Argon2id

use argon2::{password_hash::SaltString, Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use super::{CryptoError, VaultKey};

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests and constrained devices
    pub fn fast() -> Self {
        Self {
            memory_cost: 8192,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Random salt for a new unlock code
pub fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

/// Derive the key-encryption key for an unlock code
pub fn derive_code_key(code: &str, salt: &str, params: &KdfParams) -> Result<VaultKey, CryptoError> {
    if salt.is_empty() {
        return Err(CryptoError::KeyDerivation("empty salt".to_string()));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(VaultKey::LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(code.as_bytes(), salt.as_bytes(), &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(VaultKey::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salts_differ() {
        let a = generate_salt();
        let b = generate_salt();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn test_deterministic() {
        let salt = generate_salt();
        let a = derive_code_key("1234", &salt, &KdfParams::fast()).unwrap();
        let b = derive_code_key("1234", &salt, &KdfParams::fast()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_code_and_salt_both_matter() {
        let salt = generate_salt();
        let params = KdfParams::fast();

        let base = derive_code_key("1234", &salt, &params).unwrap();
        assert_ne!(base, derive_code_key("1235", &salt, &params).unwrap());
        assert_ne!(base, derive_code_key("1234", &generate_salt(), &params).unwrap());
    }

    #[test]
    fn test_empty_salt_rejected() {
        assert!(matches!(
            derive_code_key("1234", "", &KdfParams::fast()),
            Err(CryptoError::KeyDerivation(_))
        ));
    }
}
