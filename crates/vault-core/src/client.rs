//! Vault client facade
//!
//! Every operation goes through the backend and every failure through
//! [`normalize`], so callers only ever see a [`VaultError`]. Biometric
//! operations return a [`CancellableOperation`].

use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{BackendResult, CancelSupport, Options, VaultBackend};
use crate::cancel::{AbortFn, CancelHandle, CancellableOperation};
use crate::credential::Credential;
use crate::error::{ErrorCode, Result, VaultError};
use crate::normalize::normalize;
use crate::settings::VaultSettings;

/// The two biometric operations that show a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BiometryKind {
    UnlockByBiometry,
    SetUnlockBiometry,
}

impl BiometryKind {
    fn operation(self) -> &'static str {
        match self {
            BiometryKind::UnlockByBiometry => "unlock_by_biometry",
            BiometryKind::SetUnlockBiometry => "set_unlock_biometry",
        }
    }
}

/// Outstanding biometric requests per kind
#[derive(Default)]
struct PendingRegistry {
    counts: Mutex<HashMap<BiometryKind, usize>>,
}

impl PendingRegistry {
    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<BiometryKind, usize>> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(self: &Arc<Self>, kind: BiometryKind) -> PendingRequest {
        let id = Uuid::new_v4();
        let outstanding = {
            let mut counts = self.counts();
            let count = counts.entry(kind).or_insert(0);
            *count += 1;
            *count
        };

        if outstanding > 1 {
            warn!(
                request = %id,
                operation = kind.operation(),
                outstanding,
                "Biometric request started while another of the same kind is pending"
            );
        } else {
            debug!(request = %id, operation = kind.operation(), "Biometric request started");
        }

        PendingRequest {
            registry: self.clone(),
            kind,
            id,
        }
    }

    fn outstanding(&self, kind: BiometryKind) -> usize {
        self.counts().get(&kind).copied().unwrap_or(0)
    }
}

/// Removed from the registry when dropped
struct PendingRequest {
    registry: Arc<PendingRegistry>,
    kind: BiometryKind,
    id: Uuid,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        let mut counts = self.registry.counts();
        if let Some(count) = counts.get_mut(&self.kind) {
            *count = count.saturating_sub(1);
        }
        debug!(request = %self.id, operation = self.kind.operation(), "Biometric request finished");
    }
}

/// Await a backend call under the timeout policy and normalize failures
async fn settle<T, F>(operation: &'static str, timeout: Option<Duration>, call: F) -> Result<T>
where
    F: Future<Output = BackendResult<T>>,
{
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, ?limit, "Vault operation timed out");
                return Err(VaultError::timeout(operation));
            }
        },
        None => call.await,
    };

    result.map_err(|raw| {
        let err = normalize(raw);
        debug!(operation, error = %err, "Vault operation failed");
        err
    })
}

/// Client for a credential vault backend
#[derive(Clone)]
pub struct VaultClient {
    backend: Arc<dyn VaultBackend>,
    timeout: Option<Duration>,
    pending: Arc<PendingRegistry>,
}

impl VaultClient {
    pub fn new(backend: Arc<dyn VaultBackend>) -> Self {
        Self {
            backend,
            timeout: None,
            pending: Arc::new(PendingRegistry::default()),
        }
    }

    /// Fail operations that take longer than `timeout` (`None` waits forever)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settings(self, settings: &VaultSettings) -> Self {
        self.with_timeout(settings.operation_timeout())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub fn cancel_support(&self) -> CancelSupport {
        self.backend.cancel_support()
    }

    /// Biometric requests of `kind` that have not settled yet
    pub fn pending_biometry(&self, kind: BiometryKind) -> usize {
        self.pending.outstanding(kind)
    }

    pub async fn initial_setup(&self, options: Options) -> Result<()> {
        settle("initial_setup", self.timeout, self.backend.initial_setup(options)).await
    }

    /// Store the credential blob; `None` clears it
    pub async fn save(&self, creds: Option<String>, options: Options) -> Result<()> {
        settle("save", self.timeout, self.backend.save(creds, options)).await
    }

    pub async fn read(&self, options: Options) -> Result<Option<String>> {
        settle("read", self.timeout, self.backend.read(options)).await
    }

    pub async fn lock(&self, options: Options) -> Result<()> {
        settle("lock", self.timeout, self.backend.lock(options)).await
    }

    /// Destroy all data and both unlock gates. Irreversible.
    pub async fn clean(&self, options: Options) -> Result<()> {
        settle("clean", self.timeout, self.backend.clean(options)).await
    }

    pub async fn set_unlock_code(&self, code: impl Into<String>, options: Options) -> Result<()> {
        settle(
            "set_unlock_code",
            self.timeout,
            self.backend.set_unlock_code(code.into(), options),
        )
        .await
    }

    /// Unlock with the code. Legacy backends return the stored blob.
    pub async fn unlock_by_code(&self, code: impl Into<String>, options: Options) -> Result<Option<String>> {
        settle(
            "unlock_by_code",
            self.timeout,
            self.backend.unlock_by_code(code.into(), options),
        )
        .await
    }

    /// Enroll biometry; shows a prompt.
    ///
    /// The backend call starts immediately on the current tokio runtime.
    pub fn set_unlock_biometry(&self, options: Options) -> CancellableOperation<()> {
        let backend = self.backend.clone();
        self.cancellable(BiometryKind::SetUnlockBiometry, move |cancel| async move {
            backend.set_unlock_biometry(options, cancel).await
        })
    }

    /// Unlock with biometry; shows a prompt.
    ///
    /// The backend call starts immediately on the current tokio runtime.
    pub fn unlock_by_biometry(&self, options: Options) -> CancellableOperation<Option<String>> {
        let backend = self.backend.clone();
        self.cancellable(BiometryKind::UnlockByBiometry, move |cancel| async move {
            backend.unlock_by_biometry(options, cancel).await
        })
    }

    /// Abort the outstanding prompt, if any. A no-op on modal backends.
    pub async fn cancel_biometry(&self, options: Options) -> Result<()> {
        settle("cancel_biometry", self.timeout, self.backend.cancel_biometry(options)).await
    }

    pub async fn has_fingerprint_changed(&self) -> Result<bool> {
        settle(
            "has_fingerprint_changed",
            self.timeout,
            self.backend.has_fingerprint_changed(),
        )
        .await
    }

    pub async fn save_credential(&self, credential: &Credential, options: Options) -> Result<()> {
        let blob = credential.to_blob().map_err(|e| {
            VaultError::new(ErrorCode::CantSaveLogin).with_message(e.to_string())
        })?;
        self.save(Some(blob), options).await
    }

    /// Read the stored blob as a [`Credential`]
    pub async fn read_credential(&self, options: Options) -> Result<Option<Credential>> {
        let Some(blob) = self.read(options).await? else {
            return Ok(None);
        };
        Credential::from_blob(&blob).map(Some).map_err(|e| {
            VaultError::new(ErrorCode::CantGetLoginPassword)
                .with_message(format!("stored blob is not a credential: {}", e))
        })
    }

    fn abort_fn(&self) -> AbortFn {
        let client = self.clone();
        Arc::new(move || {
            let client = client.clone();
            async move { client.cancel_biometry(None).await }.boxed()
        })
    }

    fn cancellable<T, C, F>(&self, kind: BiometryKind, call: C) -> CancellableOperation<T>
    where
        T: Send + 'static,
        C: FnOnce(CancellationToken) -> F,
        F: Future<Output = BackendResult<T>> + Send + 'static,
    {
        let handle = CancelHandle::new(self.abort_fn());
        let request = self.pending.begin(kind);
        let timeout = self.timeout;
        let call = call(handle.token());

        let task = {
            let handle = handle.clone();
            tokio::spawn(async move {
                let result = settle(kind.operation(), timeout, call).await;
                handle.mark_settled();
                drop(request);
                result
            })
        };

        let result = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(operation = kind.operation(), "Biometric task failed: {}", e);
                    Err(VaultError::new(ErrorCode::Undefined).with_message(e.to_string()))
                }
            }
        }
        .boxed();

        CancellableOperation::new(result, handle)
    }
}
