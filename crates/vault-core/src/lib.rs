//! # vault-core
//!
//! Client side of a code- and biometry-gated credential vault:
//! - One error taxonomy for every backend, with normalization of the
//!   loosely typed payloads native modules produce
//! - A client facade whose biometric calls can be cancelled
//! - Adapters for callback-style and error-first native modules
//! - A software reference vault (Argon2id + AES-256-GCM) over keychain,
//!   file or in-memory record stores

pub mod backend;
pub mod biometry;
pub mod cancel;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod normalize;
pub mod settings;
pub mod software;
pub mod storage;
mod client;

pub use backend::{CallbackAdapter, CancelSupport, ErrorFirstAdapter, Options, VaultBackend};
pub use biometry::{BiometricSensor, NoSensor, SimulatedSensor};
pub use cancel::{CancelHandle, CancellableOperation};
pub use client::{BiometryKind, VaultClient};
pub use credential::Credential;
pub use error::{ErrorCategory, ErrorCode, Result, SubCode, VaultError};
pub use normalize::{normalize, NativeError, RawError};
pub use settings::{SettingsManager, VaultSettings};
pub use software::{SoftwareVault, VaultState};
pub use storage::{FileStorage, KeychainStorage, MemoryStorage, SecureStorage};
