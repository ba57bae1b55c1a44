//! Reference vault backend
//!
//! [`SoftwareVault`] enforces the vault state machine in-process over a
//! [`SecureStorage`] and a [`BiometricSensor`]:
//! - a random data key seals the credential blob
//! - the data key is wrapped by a key derived from the unlock code and,
//!   once enrolled, by the key the sensor releases on a successful prompt
//! - one attempt counter is shared by both gates
//!
//! Only one biometric prompt is in flight at a time; starting another
//! aborts the first.

mod records;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BackendResult, CancelSupport, Options, VaultBackend};
use crate::biometry::{BiometricSensor, PromptInfo, SensorAvailability, SensorOutcome};
use crate::crypto::{
    derive_code_key, generate_salt, open_string, seal_string, unwrap_key, wrap_key, CryptoError,
    KdfParams, VaultKey,
};
use crate::error::{android_subcode, ErrorCode, Result, VaultError};
use crate::normalize::RawError;
use crate::settings::VaultSettings;
use crate::storage::SecureStorage;

use records::{BiometryGate, CodeGate, Records, BIOMETRY_OBSERVED, CREDS};

/// Vault state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// Records have not been examined yet
    Uninitialized,
    /// An unlock is required before save/read
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Code,
    Biometry,
}

struct Inner {
    initialized: bool,
    /// Present exactly while unlocked
    data_key: Option<VaultKey>,
}

struct ActivePrompt {
    id: u64,
    token: CancellationToken,
}

/// Ends a prompt: cancels its token and frees the slot if the prompt
/// still owns it. Runs even when the prompt's future is dropped.
struct PromptGuard<'a> {
    slot: &'a std::sync::Mutex<Option<ActivePrompt>>,
    id: u64,
    token: CancellationToken,
}

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|active| active.id == self.id) {
            *slot = None;
        }
        debug!(prompt = self.id, "Biometric prompt finished");
    }
}

fn failure(code: ErrorCode, err: impl std::fmt::Display) -> VaultError {
    VaultError::new(code).with_message(err.to_string())
}

fn locked() -> VaultError {
    VaultError::new(ErrorCode::Locked)
}

/// In-process vault over pluggable record storage and sensor
pub struct SoftwareVault {
    records: Records,
    sensor: Arc<dyn BiometricSensor>,
    settings: VaultSettings,
    kdf: KdfParams,
    inner: Mutex<Inner>,
    prompt: std::sync::Mutex<Option<ActivePrompt>>,
    prompt_seq: AtomicU64,
}

impl SoftwareVault {
    pub fn new(storage: Arc<dyn SecureStorage>, sensor: Arc<dyn BiometricSensor>) -> Self {
        Self {
            records: Records::new(storage),
            sensor,
            settings: VaultSettings::default(),
            kdf: KdfParams::default(),
            inner: Mutex::new(Inner {
                initialized: false,
                data_key: None,
            }),
            prompt: std::sync::Mutex::new(None),
            prompt_seq: AtomicU64::new(0),
        }
    }

    pub fn with_settings(mut self, settings: VaultSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    pub async fn state(&self) -> VaultState {
        let inner = self.inner.lock().await;
        match (inner.initialized, inner.data_key.is_some()) {
            (false, _) => VaultState::Uninitialized,
            (true, false) => VaultState::Locked,
            (true, true) => VaultState::Unlocked,
        }
    }

    /// Lock the inner state, running first-use setup if needed
    async fn ready(&self) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().await;
        if !inner.initialized {
            self.setup(&mut inner).await?;
        }
        Ok(inner)
    }

    async fn setup(&self, inner: &mut Inner) -> Result<()> {
        let snapshot = match self.records.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Vault records unreadable, cleaning: {}", e);
                return self.wipe(inner).await;
            }
        };

        if !snapshot.is_consistent() {
            warn!(?snapshot, "Inconsistent vault records, cleaning");
            return self.wipe(inner).await;
        }

        if snapshot.has_gate() {
            inner.data_key = None;
            info!("Vault opened locked ({})", self.records.backend_name());
        } else {
            inner.data_key = Some(VaultKey::generate());
            info!("Empty vault opened unlocked ({})", self.records.backend_name());
        }
        inner.initialized = true;
        Ok(())
    }

    /// Delete every record and start over as an empty, unlocked vault
    async fn wipe(&self, inner: &mut Inner) -> Result<()> {
        self.abort_prompt();
        inner.data_key = None;
        self.records
            .wipe()
            .await
            .map_err(|e| failure(ErrorCode::CantDeleteCred, e))?;

        inner.data_key = Some(VaultKey::generate());
        inner.initialized = true;
        info!("Vault cleaned");
        Ok(())
    }

    /// Count a failed unlock. Reaching the limit fails with the gate's
    /// lockout code without storing the count; a code lockout also cleans.
    async fn count_attempt(&self, inner: &mut Inner, gate: Gate) -> Result<()> {
        let next = self
            .records
            .attempts()
            .await
            .map_err(|e| failure(ErrorCode::Undefined, e))?
            + 1;

        if next >= self.settings.max_unlock_attempts {
            warn!(?gate, attempts = next, "Unlock attempts exhausted");
            return Err(match gate {
                Gate::Code => {
                    if self.settings.clean_on_code_lockout {
                        self.wipe(inner).await?;
                    }
                    VaultError::new(ErrorCode::PincodeTooManyAttempts)
                }
                Gate::Biometry => VaultError::new(ErrorCode::FingerprintTooManyAttempts),
            });
        }

        self.records
            .set_attempts(next)
            .await
            .map_err(|e| failure(ErrorCode::Undefined, e))?;
        debug!(?gate, attempts = next, "Failed unlock attempt recorded");
        Ok(())
    }

    async fn reset_attempts(&self) -> Result<()> {
        self.records
            .set_attempts(0)
            .await
            .map_err(|e| failure(ErrorCode::Undefined, e))
    }

    async fn save_blob(&self, creds: Option<String>) -> Result<()> {
        let inner = self.ready().await?;
        let key = inner.data_key.as_ref().ok_or_else(locked)?;

        match creds {
            None => self
                .records
                .remove(CREDS)
                .await
                .map_err(|e| failure(ErrorCode::CantSavePassword, e))?,
            Some(blob) => {
                let sealed =
                    seal_string(&blob, key).map_err(|e| failure(ErrorCode::PincodeEncryptFailed, e))?;
                self.records
                    .put(CREDS, &sealed)
                    .await
                    .map_err(|e| failure(ErrorCode::CantSavePassword, e))?;
            }
        }
        debug!("Credentials saved");
        Ok(())
    }

    async fn read_blob(&self) -> Result<Option<String>> {
        let inner = self.ready().await?;
        let key = inner.data_key.as_ref().ok_or_else(locked)?;

        let Some(sealed) = self
            .records
            .get(CREDS)
            .await
            .map_err(|e| failure(ErrorCode::CantGetLoginPassword, e))?
        else {
            return Ok(None);
        };

        open_string(&sealed, key)
            .map(Some)
            .map_err(|e| failure(ErrorCode::PincodeDecryptFailed, e))
    }

    async fn lock_vault(&self) -> Result<()> {
        let mut inner = self.ready().await?;
        inner.data_key = None;
        info!("Vault locked");
        Ok(())
    }

    async fn clean_vault(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.wipe(&mut inner).await
    }

    async fn set_code(&self, code: &str) -> Result<()> {
        let inner = self.ready().await?;
        let data_key = inner.data_key.as_ref().ok_or_else(locked)?;

        let salt = generate_salt();
        let code_key =
            derive_code_key(code, &salt, &self.kdf).map_err(|e| failure(ErrorCode::CantSetCode, e))?;
        let wrapped = wrap_key(data_key, &code_key).map_err(|e| failure(ErrorCode::CantSetCode, e))?;

        self.records
            .set_code_gate(&CodeGate {
                salt,
                wrapped_key: wrapped,
            })
            .await
            .map_err(|e| failure(ErrorCode::CantSetCode, e))?;

        info!("Unlock code set");
        Ok(())
    }

    /// The data key if `code` opens the code gate
    async fn verify_code(&self, code: &str) -> Result<Option<VaultKey>> {
        let gate = self
            .records
            .code_gate()
            .await
            .map_err(|e| failure(ErrorCode::CantGetLoginPassword, e))?;
        let Some(gate) = gate else {
            debug!("No code gate set");
            return Ok(None);
        };

        let code_key = derive_code_key(code, &gate.salt, &self.kdf)
            .map_err(|e| failure(ErrorCode::PincodeDecryptFailed, e))?;
        match unwrap_key(&gate.wrapped_key, &code_key) {
            Ok(data_key) => Ok(Some(data_key)),
            Err(CryptoError::Decryption(_)) => Ok(None),
            Err(e) => Err(failure(ErrorCode::PincodeDecryptFailed, e)),
        }
    }

    async fn unlock_code(&self, code: &str) -> Result<()> {
        let mut inner = self.ready().await?;

        match self.verify_code(code).await? {
            Some(data_key) => {
                inner.data_key = Some(data_key);
                self.reset_attempts().await?;
                info!("Vault unlocked by code");
                Ok(())
            }
            None => {
                self.count_attempt(&mut inner, Gate::Code).await?;
                Err(VaultError::new(ErrorCode::PincodeCheckFailed))
            }
        }
    }

    fn check_sensor(&self) -> Result<String> {
        match self.sensor.availability() {
            SensorAvailability::NoHardware => {
                return Err(VaultError::new(ErrorCode::FingerprintNotSupported))
            }
            SensorAvailability::NotEnrolled => return Err(VaultError::new(ErrorCode::NoTouchIdFingers)),
            SensorAvailability::Available => {}
        }
        self.sensor
            .enrollment_id()
            .ok_or_else(|| VaultError::new(ErrorCode::NoTouchIdFingers))
    }

    fn prompt_slot(&self) -> std::sync::MutexGuard<'_, Option<ActivePrompt>> {
        self.prompt.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn abort_prompt(&self) -> bool {
        let active = self.prompt_slot().take();
        match active {
            Some(active) => {
                debug!(prompt = active.id, "Aborting biometric prompt");
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Show a prompt, replacing any prompt still on screen. `cancel`
    /// aborts it, including when it fired before the prompt was shown.
    async fn run_prompt(&self, prompt: &PromptInfo, cancel: &CancellationToken) -> SensorOutcome {
        if cancel.is_cancelled() {
            debug!("Biometric prompt cancelled before it was shown");
            return SensorOutcome::Cancelled { by_user: false };
        }

        let id = self.prompt_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let token = cancel.child_token();

        let previous = self.prompt_slot().replace(ActivePrompt {
            id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            debug!(prompt = previous.id, "Superseded by a new prompt");
            previous.token.cancel();
        }

        let _guard = PromptGuard {
            slot: &self.prompt,
            id,
            token: token.clone(),
        };
        debug!(prompt = id, sensor = self.sensor.sensor_name(), "Biometric prompt started");
        self.sensor.authenticate(prompt, token).await
    }

    /// Map a failed prompt onto an error, updating the counter and lock
    /// state the way the gate requires
    async fn prompt_failed<T>(
        &self,
        inner: &mut Inner,
        error: VaultError,
        counted: bool,
        lock_on_fail: bool,
    ) -> Result<T> {
        if lock_on_fail && inner.data_key.take().is_some() {
            info!("Vault locked after failed biometric unlock");
        }
        if counted {
            self.count_attempt(inner, Gate::Biometry).await?;
        }
        Err(error)
    }

    fn outcome_error(outcome: &SensorOutcome) -> Option<(VaultError, bool)> {
        let failed = match outcome {
            SensorOutcome::Authenticated(_) => return None,
            SensorOutcome::Rejected => (
                VaultError::new(ErrorCode::FingerprintFailed)
                    .with_sub_code(android_subcode::ACQUIRED_IMAGER_DIRTY),
                true,
            ),
            SensorOutcome::Cancelled { by_user } => (
                VaultError::new(ErrorCode::FingerprintCanceled).with_sub_code(if *by_user {
                    android_subcode::ERROR_USER_CANCELED
                } else {
                    android_subcode::ERROR_CANCELED
                }),
                false,
            ),
            SensorOutcome::LockedOut { permanent } => (
                VaultError::new(ErrorCode::FingerprintTooManyAttempts).with_sub_code(if *permanent {
                    android_subcode::ERROR_LOCKOUT_PERMANENT
                } else {
                    android_subcode::ERROR_LOCKOUT
                }),
                true,
            ),
        };
        Some(failed)
    }

    async fn enroll_biometry(&self, options: Options, cancel: CancellationToken) -> Result<()> {
        let (enrollment, prompt) = {
            let inner = self.ready().await?;
            if inner.data_key.is_none() {
                return Err(locked());
            }
            let enrollment = self.check_sensor()?;
            (enrollment, self.settings.prompt.resolve(options.as_ref()))
        };

        let outcome = self.run_prompt(&prompt, &cancel).await;
        let mut inner = self.inner.lock().await;

        if let Some((error, counted)) = Self::outcome_error(&outcome) {
            return self.prompt_failed(&mut inner, error, counted, false).await;
        }
        let SensorOutcome::Authenticated(biometric_key) = outcome else {
            return Err(VaultError::new(ErrorCode::Undefined));
        };

        let data_key = inner.data_key.as_ref().ok_or_else(locked)?;
        let wrapped = wrap_key(data_key, &biometric_key)
            .map_err(|e| failure(ErrorCode::CantSetBiometry, e))?;

        // The baseline goes first: on its own it only adopts the current
        // enrollment
        self.records
            .put(BIOMETRY_OBSERVED, &enrollment)
            .await
            .map_err(|e| failure(ErrorCode::CantSetBiometry, e))?;
        self.records
            .set_biometry_gate(&BiometryGate {
                wrapped_key: wrapped,
                enrollment,
            })
            .await
            .map_err(|e| failure(ErrorCode::CantSetBiometry, e))?;

        info!("Biometric unlock enabled");
        Ok(())
    }

    async fn unlock_biometry(&self, options: Options, cancel: CancellationToken) -> Result<()> {
        let (gate, prompt) = {
            let _inner = self.ready().await?;

            let gate = self
                .records
                .biometry_gate()
                .await
                .map_err(|e| failure(ErrorCode::FingerprintDecryptFailed, e))?
                .ok_or_else(|| VaultError::new(ErrorCode::FingerprintNotSetup))?;

            let current = self.check_sensor()?;
            if current != gate.enrollment {
                warn!("Biometric enrollment changed since biometry was set");
                return Err(VaultError::new(ErrorCode::BiometryNeedRenew));
            }

            (gate, self.settings.prompt.resolve(options.as_ref()))
        };

        let outcome = self.run_prompt(&prompt, &cancel).await;
        let mut inner = self.inner.lock().await;

        if let Some((error, counted)) = Self::outcome_error(&outcome) {
            return self.prompt_failed(&mut inner, error, counted, true).await;
        }
        let SensorOutcome::Authenticated(biometric_key) = outcome else {
            return Err(VaultError::new(ErrorCode::Undefined));
        };

        match unwrap_key(&gate.wrapped_key, &biometric_key) {
            Ok(data_key) => {
                inner.data_key = Some(data_key);
                self.reset_attempts().await?;
                info!("Vault unlocked by biometry");
                Ok(())
            }
            Err(e) => {
                let error = failure(ErrorCode::FingerprintDecryptFailed, e);
                self.prompt_failed(&mut inner, error, false, true).await
            }
        }
    }

    async fn fingerprint_changed(&self) -> Result<bool> {
        let _inner = self.ready().await?;
        let current = self.check_sensor()?;

        let observed = self
            .records
            .get(BIOMETRY_OBSERVED)
            .await
            .map_err(|e| failure(ErrorCode::Undefined, e))?;
        if observed.as_deref() == Some(current.as_str()) {
            return Ok(false);
        }

        self.records
            .put(BIOMETRY_OBSERVED, &current)
            .await
            .map_err(|e| failure(ErrorCode::Undefined, e))?;

        match observed {
            Some(_) => {
                info!("Biometric enrollment changed");
                Ok(true)
            }
            None => {
                debug!("Biometric enrollment baseline recorded");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl VaultBackend for SoftwareVault {
    async fn initial_setup(&self, _options: Options) -> BackendResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.initialized {
            debug!("Vault already set up");
            return Ok(());
        }
        self.setup(&mut inner).await.map_err(RawError::from)
    }

    async fn save(&self, creds: Option<String>, _options: Options) -> BackendResult<()> {
        self.save_blob(creds).await.map_err(RawError::from)
    }

    async fn read(&self, _options: Options) -> BackendResult<Option<String>> {
        self.read_blob().await.map_err(RawError::from)
    }

    async fn lock(&self, _options: Options) -> BackendResult<()> {
        self.lock_vault().await.map_err(RawError::from)
    }

    async fn clean(&self, _options: Options) -> BackendResult<()> {
        self.clean_vault().await.map_err(RawError::from)
    }

    async fn set_unlock_code(&self, code: String, _options: Options) -> BackendResult<()> {
        self.set_code(&code).await.map_err(RawError::from)
    }

    async fn unlock_by_code(&self, code: String, _options: Options) -> BackendResult<Option<String>> {
        self.unlock_code(&code)
            .await
            .map(|()| None)
            .map_err(RawError::from)
    }

    async fn set_unlock_biometry(&self, options: Options, cancel: CancellationToken) -> BackendResult<()> {
        self.enroll_biometry(options, cancel).await.map_err(RawError::from)
    }

    async fn unlock_by_biometry(
        &self,
        options: Options,
        cancel: CancellationToken,
    ) -> BackendResult<Option<String>> {
        self.unlock_biometry(options, cancel)
            .await
            .map(|()| None)
            .map_err(RawError::from)
    }

    async fn cancel_biometry(&self, _options: Options) -> BackendResult<()> {
        if !self.abort_prompt() {
            debug!("No biometric prompt to cancel");
        }
        Ok(())
    }

    async fn has_fingerprint_changed(&self) -> BackendResult<bool> {
        self.fingerprint_changed().await.map_err(RawError::from)
    }

    fn cancel_support(&self) -> CancelSupport {
        CancelSupport::Abortable
    }

    fn backend_name(&self) -> &'static str {
        "software vault"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometry::{SimulatedSensor, Touch};
    use crate::error::SubCode;
    use crate::normalize::normalize;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn vault(storage: &Arc<MemoryStorage>, sensor: &Arc<SimulatedSensor>) -> SoftwareVault {
        SoftwareVault::new(storage.clone(), sensor.clone()).with_kdf_params(KdfParams::fast())
    }

    fn fresh() -> (SoftwareVault, Arc<MemoryStorage>, Arc<SimulatedSensor>) {
        let storage = Arc::new(MemoryStorage::new());
        let sensor = Arc::new(SimulatedSensor::enrolled());
        (vault(&storage, &sensor), storage, sensor)
    }

    fn error<T: std::fmt::Debug>(result: BackendResult<T>) -> VaultError {
        normalize(result.unwrap_err())
    }

    fn blob(text: &str) -> Option<String> {
        Some(text.to_string())
    }

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_empty_vault_starts_unlocked() {
        let (vault, _, _) = fresh();
        assert_eq!(vault.state().await, VaultState::Uninitialized);

        vault.initial_setup(None).await.unwrap();
        vault.initial_setup(None).await.unwrap();
        assert_eq!(vault.state().await, VaultState::Unlocked);
        assert_eq!(vault.read(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_read_and_clear() {
        let (vault, _, _) = fresh();

        vault.save(blob("first"), None).await.unwrap();
        vault.save(blob("second"), None).await.unwrap();
        assert_eq!(vault.read(None).await.unwrap(), blob("second"));

        vault.save(None, None).await.unwrap();
        assert_eq!(vault.read(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_locked_vault_refuses_access() {
        let (vault, _, _) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.save(blob("secret"), None).await.unwrap();

        vault.lock(None).await.unwrap();
        vault.lock(None).await.unwrap();
        assert_eq!(vault.state().await, VaultState::Locked);

        assert!(error(vault.read(None).await).is(ErrorCode::Locked));
        assert!(error(vault.save(blob("other"), None).await).is(ErrorCode::Locked));
        assert!(error(vault.set_unlock_code("0000".to_string(), None).await).is(ErrorCode::Locked));

        assert_eq!(vault.unlock_by_code("1234".to_string(), None).await.unwrap(), None);
        assert_eq!(vault.read(None).await.unwrap(), blob("secret"));
    }

    #[tokio::test]
    async fn test_records_survive_restart() {
        let storage = Arc::new(MemoryStorage::new());
        let sensor = Arc::new(SimulatedSensor::enrolled());
        {
            let vault = vault(&storage, &sensor);
            vault.set_unlock_code("1234".to_string(), None).await.unwrap();
            vault.save(blob("secret"), None).await.unwrap();
        }

        let vault = vault(&storage, &sensor);
        vault.initial_setup(None).await.unwrap();
        assert_eq!(vault.state().await, VaultState::Locked);

        vault.unlock_by_code("1234".to_string(), None).await.unwrap();
        assert_eq!(vault.read(None).await.unwrap(), blob("secret"));
    }

    #[tokio::test]
    async fn test_changing_code() {
        let (vault, _, _) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.save(blob("secret"), None).await.unwrap();
        vault.set_unlock_code("5678".to_string(), None).await.unwrap();
        vault.lock(None).await.unwrap();

        assert!(error(vault.unlock_by_code("1234".to_string(), None).await).is(ErrorCode::PincodeCheckFailed));
        vault.unlock_by_code("5678".to_string(), None).await.unwrap();
        assert_eq!(vault.read(None).await.unwrap(), blob("secret"));
    }

    #[tokio::test]
    async fn test_code_lockout_cleans() {
        let (vault, storage, _) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.save(blob("secret"), None).await.unwrap();
        vault.lock(None).await.unwrap();

        for _ in 0..2 {
            let err = error(vault.unlock_by_code("0000".to_string(), None).await);
            assert!(err.is(ErrorCode::PincodeCheckFailed));
        }
        let err = error(vault.unlock_by_code("0000".to_string(), None).await);
        assert!(err.is(ErrorCode::PincodeTooManyAttempts));
        assert!(err.is_lockout());

        assert!(storage.is_empty().await);
        assert_eq!(vault.state().await, VaultState::Unlocked);
        assert_eq!(vault.read(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_code_lockout_without_clean() {
        let storage = Arc::new(MemoryStorage::new());
        let sensor = Arc::new(SimulatedSensor::enrolled());
        let vault = vault(&storage, &sensor).with_settings(VaultSettings {
            clean_on_code_lockout: false,
            ..VaultSettings::default()
        });
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.save(blob("secret"), None).await.unwrap();
        vault.lock(None).await.unwrap();

        for expected in [
            ErrorCode::PincodeCheckFailed,
            ErrorCode::PincodeCheckFailed,
            ErrorCode::PincodeTooManyAttempts,
            ErrorCode::PincodeTooManyAttempts,
        ] {
            assert!(error(vault.unlock_by_code("0000".to_string(), None).await).is(expected));
        }
        assert_eq!(vault.state().await, VaultState::Locked);

        vault.unlock_by_code("1234".to_string(), None).await.unwrap();
        assert_eq!(vault.read(None).await.unwrap(), blob("secret"));
    }

    #[tokio::test]
    async fn test_successful_unlock_resets_attempts() {
        let (vault, _, _) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.lock(None).await.unwrap();

        for _ in 0..2 {
            error(vault.unlock_by_code("0000".to_string(), None).await);
        }
        vault.unlock_by_code("1234".to_string(), None).await.unwrap();
        vault.lock(None).await.unwrap();

        let err = error(vault.unlock_by_code("0000".to_string(), None).await);
        assert!(err.is(ErrorCode::PincodeCheckFailed));
    }

    #[tokio::test]
    async fn test_inconsistent_records_are_cleaned() {
        let storage = Arc::new(MemoryStorage::new());
        storage.store(CREDS, b"orphaned").await.unwrap();
        storage.store(BIOMETRY_OBSERVED, b"enrollment").await.unwrap();

        let sensor = Arc::new(SimulatedSensor::enrolled());
        let vault = vault(&storage, &sensor);
        vault.initial_setup(None).await.unwrap();

        assert!(storage.is_empty().await);
        assert_eq!(vault.state().await, VaultState::Unlocked);
    }

    #[tokio::test]
    async fn test_unparsable_gate_is_cleaned() {
        let storage = Arc::new(MemoryStorage::new());
        storage.store(CREDS, b"sealed").await.unwrap();
        storage.store(records::CODE_GATE, b"{\"salt\":").await.unwrap();

        let sensor = Arc::new(SimulatedSensor::enrolled());
        let vault = vault(&storage, &sensor);
        vault.initial_setup(None).await.unwrap();

        assert!(storage.is_empty().await);
        assert_eq!(vault.state().await, VaultState::Unlocked);
    }

    #[tokio::test]
    async fn test_failed_code_change_keeps_old_code() {
        let (vault, storage, _) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.save(blob("secret"), None).await.unwrap();

        storage.fail_writes_after(Some(0));
        let err = error(vault.set_unlock_code("5678".to_string(), None).await);
        assert!(err.is(ErrorCode::CantSetCode));
        storage.fail_writes_after(None);

        vault.lock(None).await.unwrap();
        assert!(error(vault.unlock_by_code("5678".to_string(), None).await).is(ErrorCode::PincodeCheckFailed));
        vault.unlock_by_code("1234".to_string(), None).await.unwrap();
        assert_eq!(vault.read(None).await.unwrap(), blob("secret"));
    }

    #[tokio::test]
    async fn test_failed_enrollment_leaves_vault_usable() {
        let storage = Arc::new(MemoryStorage::new());
        let sensor = Arc::new(SimulatedSensor::enrolled());
        {
            let vault = vault(&storage, &sensor);
            vault.set_unlock_code("1234".to_string(), None).await.unwrap();
            vault.save(blob("secret"), None).await.unwrap();

            // The baseline write succeeds, the gate write fails
            storage.fail_writes_after(Some(1));
            let err = error(vault.set_unlock_biometry(None, no_cancel()).await);
            assert!(err.is(ErrorCode::CantSetBiometry));
            storage.fail_writes_after(None);
        }

        let vault = vault(&storage, &sensor);
        vault.initial_setup(None).await.unwrap();
        assert_eq!(vault.state().await, VaultState::Locked);

        let err = error(vault.unlock_by_biometry(None, no_cancel()).await);
        assert!(err.is(ErrorCode::FingerprintNotSetup));
        vault.unlock_by_code("1234".to_string(), None).await.unwrap();
        assert_eq!(vault.read(None).await.unwrap(), blob("secret"));
    }

    #[tokio::test]
    async fn test_storage_failures() {
        let (vault, storage, _) = fresh();
        vault.initial_setup(None).await.unwrap();

        storage.set_failing(true);
        assert!(error(vault.save(blob("x"), None).await).is(ErrorCode::CantSavePassword));
        assert!(error(vault.read(None).await).is(ErrorCode::CantGetLoginPassword));
        assert!(error(vault.clean(None).await).is(ErrorCode::CantDeleteCred));
    }

    #[tokio::test]
    async fn test_biometric_unlock() {
        let (vault, _, sensor) = fresh();
        vault.save(blob("secret"), None).await.unwrap();
        vault
            .set_unlock_biometry(Some(json!({ "title": "Enable biometry" })), no_cancel())
            .await
            .unwrap();
        vault.lock(None).await.unwrap();

        assert_eq!(vault.unlock_by_biometry(None, no_cancel()).await.unwrap(), None);
        assert_eq!(vault.read(None).await.unwrap(), blob("secret"));

        let prompts = sensor.prompts_shown();
        assert_eq!(prompts[0].title, "Enable biometry");
        assert_eq!(prompts[1].title, "Unlock vault");
    }

    #[tokio::test]
    async fn test_biometry_availability_errors() {
        let storage = Arc::new(MemoryStorage::new());

        let vault_without_hw = vault(&storage, &Arc::new(SimulatedSensor::without_hardware()));
        let err = error(vault_without_hw.set_unlock_biometry(None, no_cancel()).await);
        assert!(err.is(ErrorCode::FingerprintNotSupported));

        let vault_without_fingers = vault(&storage, &Arc::new(SimulatedSensor::without_enrollment()));
        let err = error(vault_without_fingers.set_unlock_biometry(None, no_cancel()).await);
        assert!(err.is(ErrorCode::NoTouchIdFingers));

        let (vault, _, _) = fresh();
        let err = error(vault.unlock_by_biometry(None, no_cancel()).await);
        assert!(err.is(ErrorCode::FingerprintNotSetup));
    }

    #[tokio::test]
    async fn test_unlock_without_fingers_reports_missing_fingers() {
        let (vault, _, sensor) = fresh();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        vault.lock(None).await.unwrap();

        sensor.unenroll();
        let err = error(vault.unlock_by_biometry(None, no_cancel()).await);
        assert!(err.is(ErrorCode::NoTouchIdFingers));
        assert!(!err.needs_renewal());
    }

    #[tokio::test]
    async fn test_enrolling_requires_unlock() {
        let (vault, _, sensor) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.lock(None).await.unwrap();

        assert!(error(vault.set_unlock_biometry(None, no_cancel()).await).is(ErrorCode::Locked));
        assert!(sensor.prompts_shown().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_reads_share_the_counter() {
        let (vault, _, sensor) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        vault.lock(None).await.unwrap();

        error(vault.unlock_by_code("0000".to_string(), None).await);

        sensor.push(Touch::Reject);
        let err = error(vault.unlock_by_biometry(None, no_cancel()).await);
        assert!(err.is(ErrorCode::FingerprintFailed));
        assert_eq!(err.sub_code(), Some(&SubCode::Int(android_subcode::ACQUIRED_IMAGER_DIRTY)));

        sensor.push(Touch::Reject);
        let err = error(vault.unlock_by_biometry(None, no_cancel()).await);
        assert!(err.is(ErrorCode::FingerprintTooManyAttempts));

        // A biometric lockout does not clean
        vault.unlock_by_code("1234".to_string(), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_user_cancel_is_not_counted() {
        let (vault, _, sensor) = fresh();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        vault.lock(None).await.unwrap();

        for _ in 0..4 {
            sensor.push(Touch::UserCancel);
            let err = error(vault.unlock_by_biometry(None, no_cancel()).await);
            assert!(err.is_cancellation());
            assert_eq!(err.sub_code(), Some(&SubCode::Int(android_subcode::ERROR_USER_CANCELED)));
        }

        vault.unlock_by_biometry(None, no_cancel()).await.unwrap();
        assert_eq!(vault.state().await, VaultState::Unlocked);
    }

    #[tokio::test]
    async fn test_failed_biometric_unlock_relocks() {
        let (vault, _, sensor) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        assert_eq!(vault.state().await, VaultState::Unlocked);

        sensor.push(Touch::UserCancel);
        error(vault.unlock_by_biometry(None, no_cancel()).await);
        assert_eq!(vault.state().await, VaultState::Locked);
    }

    #[tokio::test]
    async fn test_sensor_lockout() {
        let (vault, _, sensor) = fresh();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        vault.lock(None).await.unwrap();

        sensor.push(Touch::Lockout { permanent: true });
        let err = error(vault.unlock_by_biometry(None, no_cancel()).await);
        assert!(err.is(ErrorCode::FingerprintTooManyAttempts));
        assert_eq!(err.sub_code(), Some(&SubCode::Int(android_subcode::ERROR_LOCKOUT_PERMANENT)));
    }

    #[tokio::test]
    async fn test_cancel_aborts_prompt() {
        let (vault, _, sensor) = fresh();
        let vault = Arc::new(vault);
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        vault.lock(None).await.unwrap();

        sensor.push(Touch::Hold);
        let pending = {
            let vault = vault.clone();
            tokio::spawn(async move { vault.unlock_by_biometry(None, no_cancel()).await })
        };
        sensor.wait_for_prompts(2).await;

        vault.cancel_biometry(None).await.unwrap();
        let err = error(pending.await.unwrap());
        assert!(err.is(ErrorCode::FingerprintCanceled));
        assert_eq!(err.sub_code(), Some(&SubCode::Int(android_subcode::ERROR_CANCELED)));

        vault.cancel_biometry(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_before_prompt_is_shown() {
        let (vault, _, sensor) = fresh();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        vault.lock(None).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = error(vault.unlock_by_biometry(None, cancel).await);
        assert!(err.is(ErrorCode::FingerprintCanceled));
        assert_eq!(err.sub_code(), Some(&SubCode::Int(android_subcode::ERROR_CANCELED)));

        // Only the enrollment prompt was shown
        assert_eq!(sensor.prompts_shown().len(), 1);
        assert_eq!(vault.state().await, VaultState::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_prompt_frees_its_slot() {
        let (vault, _, sensor) = fresh();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        vault.lock(None).await.unwrap();

        sensor.push(Touch::Hold);
        let abandoned = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            vault.unlock_by_biometry(None, no_cancel()),
        )
        .await;
        assert!(abandoned.is_err());

        assert!(vault.prompt_slot().is_none());
        assert!(!vault.abort_prompt());
    }

    #[tokio::test]
    async fn test_new_prompt_supersedes_old_one() {
        let (vault, _, sensor) = fresh();
        let vault = Arc::new(vault);

        sensor.push(Touch::Hold);
        let first = {
            let vault = vault.clone();
            tokio::spawn(async move { vault.set_unlock_biometry(None, no_cancel()).await })
        };
        sensor.wait_for_prompts(1).await;

        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        assert!(error(first.await.unwrap()).is(ErrorCode::FingerprintCanceled));
    }

    #[tokio::test]
    async fn test_re_enrollment_needs_renewal() {
        let (vault, _, sensor) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        assert!(!vault.has_fingerprint_changed().await.unwrap());

        sensor.re_enroll();
        assert!(vault.has_fingerprint_changed().await.unwrap());
        assert!(!vault.has_fingerprint_changed().await.unwrap());

        vault.lock(None).await.unwrap();
        let err = error(vault.unlock_by_biometry(None, no_cancel()).await);
        assert!(err.needs_renewal());

        vault.unlock_by_code("1234".to_string(), None).await.unwrap();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        vault.lock(None).await.unwrap();
        vault.unlock_by_biometry(None, no_cancel()).await.unwrap();
    }

    #[tokio::test]
    async fn test_fingerprint_baseline() {
        let (vault, _, sensor) = fresh();
        assert!(!vault.has_fingerprint_changed().await.unwrap());
        assert!(!vault.has_fingerprint_changed().await.unwrap());

        sensor.unenroll();
        assert!(error(vault.has_fingerprint_changed().await).is(ErrorCode::NoTouchIdFingers));
    }

    #[tokio::test]
    async fn test_clean_resets_everything() {
        let (vault, storage, _) = fresh();
        vault.set_unlock_code("1234".to_string(), None).await.unwrap();
        vault.set_unlock_biometry(None, no_cancel()).await.unwrap();
        vault.save(blob("secret"), None).await.unwrap();
        vault.lock(None).await.unwrap();

        vault.clean(None).await.unwrap();
        assert!(storage.is_empty().await);
        assert_eq!(vault.state().await, VaultState::Unlocked);
        assert_eq!(vault.read(None).await.unwrap(), None);
        assert!(error(vault.unlock_by_biometry(None, no_cancel()).await).is(ErrorCode::FingerprintNotSetup));
    }
}
