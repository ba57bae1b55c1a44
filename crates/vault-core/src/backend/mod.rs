//! Backend contract and adapters for native completion styles
//!
//! [`VaultBackend`] is what [`crate::VaultClient`] talks to. Native modules
//! that report through callbacks are wrapped by [`CallbackAdapter`]
//! (separate error and success callbacks) or [`ErrorFirstAdapter`] (one
//! `(error, value)` completion).

mod bridge;
mod callback;
mod error_first;

pub use callback::{CallbackAdapter, CallbackModule, ErrorCallback, SuccessCallback};
pub use error_first::{Completion, ErrorFirstAdapter, ErrorFirstModule};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::normalize::RawError;

/// Opaque per-call options, passed through without validation
pub type Options = Option<Value>;

/// Backend results carry the raw failure; the client normalizes it
pub type BackendResult<T> = std::result::Result<T, RawError>;

/// Whether an in-flight biometric prompt can be aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSupport {
    /// `cancel_biometry` aborts the prompt
    Abortable,
    /// The prompt is modal; `cancel_biometry` is a no-op
    Modal,
}

#[async_trait]
pub trait VaultBackend: Send + Sync {
    /// Prepare the vault for first use; clears invalid residual state
    async fn initial_setup(&self, options: Options) -> BackendResult<()>;

    /// Store the credential blob; `None` clears it
    async fn save(&self, creds: Option<String>, options: Options) -> BackendResult<()>;

    async fn read(&self, options: Options) -> BackendResult<Option<String>>;

    async fn lock(&self, options: Options) -> BackendResult<()>;

    /// Destroy all data and both gates
    async fn clean(&self, options: Options) -> BackendResult<()>;

    async fn set_unlock_code(&self, code: String, options: Options) -> BackendResult<()>;

    /// `Some(blob)` only from backends that return the credential on unlock
    async fn unlock_by_code(&self, code: String, options: Options) -> BackendResult<Option<String>>;

    /// Enroll biometry. `cancel` fires when the caller cancels, possibly
    /// before the prompt is shown.
    async fn set_unlock_biometry(&self, options: Options, cancel: CancellationToken) -> BackendResult<()>;

    async fn unlock_by_biometry(
        &self,
        options: Options,
        cancel: CancellationToken,
    ) -> BackendResult<Option<String>>;

    async fn cancel_biometry(&self, options: Options) -> BackendResult<()>;

    async fn has_fingerprint_changed(&self) -> BackendResult<bool>;

    fn cancel_support(&self) -> CancelSupport;

    fn backend_name(&self) -> &'static str;
}
