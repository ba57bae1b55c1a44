//! Adapter for modules that report through a single `(error, value)`
//! completion, with modal biometric prompts

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::bridge::{self, Settler};
use super::{BackendResult, CancelSupport, Options, VaultBackend};
use crate::normalize::RawError;

/// Error-first completion. An error wins over a value; a success without a
/// value means "nothing" (`None`, `false` or `()`).
pub type Completion<T> = Box<dyn FnOnce(Option<RawError>, Option<T>) + Send>;

/// Native module with error-first completions.
///
/// There is no cancel entry point: prompts on these platforms are modal
/// and can only be dismissed by the user.
pub trait ErrorFirstModule: Send + Sync {
    fn initial_setup(&self, options: Options, done: Completion<()>);

    fn save(&self, creds: Option<String>, options: Options, done: Completion<()>);

    fn read(&self, options: Options, done: Completion<String>);

    fn lock(&self, options: Options, done: Completion<()>);

    fn clean(&self, options: Options, done: Completion<()>);

    fn set_unlock_code(&self, code: String, options: Options, done: Completion<()>);

    fn unlock_by_code(&self, code: String, options: Options, done: Completion<String>);

    fn set_unlock_biometry(&self, options: Options, done: Completion<()>);

    fn unlock_by_biometry(&self, options: Options, done: Completion<String>);

    fn has_fingerprint_changed(&self, done: Completion<bool>);
}

/// [`VaultBackend`] over an [`ErrorFirstModule`]; prompts are modal
pub struct ErrorFirstAdapter<M> {
    module: M,
}

impl<M: ErrorFirstModule> ErrorFirstAdapter<M> {
    pub fn new(module: M) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &M {
        &self.module
    }
}

fn completion<T, U>(settler: Settler<U>, map: fn(Option<T>) -> U) -> Completion<T>
where
    T: Send + 'static,
    U: Send + 'static,
{
    Box::new(move |err, value| {
        settler.settle(match err {
            Some(err) => Err(err),
            None => Ok(map(value)),
        })
    })
}

async fn call<T, U, F>(operation: &'static str, map: fn(Option<T>) -> U, invoke: F) -> BackendResult<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(Completion<T>) + Send,
{
    let (settler, rx) = bridge::channel(operation);
    invoke(completion(settler, map));
    bridge::wait(rx, operation).await
}

fn or_default<T: Default>(value: Option<T>) -> T {
    value.unwrap_or_default()
}

fn optional<T>(value: Option<T>) -> Option<T> {
    value
}

#[async_trait]
impl<M: ErrorFirstModule> VaultBackend for ErrorFirstAdapter<M> {
    async fn initial_setup(&self, options: Options) -> BackendResult<()> {
        call("initial_setup", or_default, |done| {
            self.module.initial_setup(options, done)
        })
        .await
    }

    async fn save(&self, creds: Option<String>, options: Options) -> BackendResult<()> {
        call("save", or_default, |done| self.module.save(creds, options, done)).await
    }

    async fn read(&self, options: Options) -> BackendResult<Option<String>> {
        call("read", optional, |done| self.module.read(options, done)).await
    }

    async fn lock(&self, options: Options) -> BackendResult<()> {
        call("lock", or_default, |done| self.module.lock(options, done)).await
    }

    async fn clean(&self, options: Options) -> BackendResult<()> {
        call("clean", or_default, |done| self.module.clean(options, done)).await
    }

    async fn set_unlock_code(&self, code: String, options: Options) -> BackendResult<()> {
        call("set_unlock_code", or_default, |done| {
            self.module.set_unlock_code(code, options, done)
        })
        .await
    }

    async fn unlock_by_code(&self, code: String, options: Options) -> BackendResult<Option<String>> {
        call("unlock_by_code", optional, |done| {
            self.module.unlock_by_code(code, options, done)
        })
        .await
    }

    async fn set_unlock_biometry(&self, options: Options, _cancel: CancellationToken) -> BackendResult<()> {
        call("set_unlock_biometry", or_default, |done| {
            self.module.set_unlock_biometry(options, done)
        })
        .await
    }

    async fn unlock_by_biometry(
        &self,
        options: Options,
        _cancel: CancellationToken,
    ) -> BackendResult<Option<String>> {
        call("unlock_by_biometry", optional, |done| {
            self.module.unlock_by_biometry(options, done)
        })
        .await
    }

    async fn cancel_biometry(&self, _options: Options) -> BackendResult<()> {
        debug!("cancel_biometry ignored: prompts are modal");
        Ok(())
    }

    async fn has_fingerprint_changed(&self) -> BackendResult<bool> {
        call("has_fingerprint_changed", or_default, |done| {
            self.module.has_fingerprint_changed(done)
        })
        .await
    }

    fn cancel_support(&self) -> CancelSupport {
        CancelSupport::Modal
    }

    fn backend_name(&self) -> &'static str {
        "error-first module"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::normalize::normalize;
    use std::sync::Mutex;

    /// Module in the style of the iOS bridge: JSON string errors, legacy
    /// unlock that hands back the stored blob
    #[derive(Default)]
    struct IosLikeModule {
        creds: Mutex<Option<String>>,
        prompt: Mutex<Option<Completion<String>>>,
    }

    fn json_error(code: i64) -> Option<RawError> {
        Some(RawError::Json(format!(r#"{{"code":"{}","message":"failed"}}"#, code)))
    }

    impl ErrorFirstModule for IosLikeModule {
        fn initial_setup(&self, _: Options, done: Completion<()>) {
            done(None, None)
        }

        fn save(&self, creds: Option<String>, _: Options, done: Completion<()>) {
            *self.creds.lock().unwrap() = creds;
            done(None, Some(()))
        }

        fn read(&self, _: Options, done: Completion<String>) {
            done(None, self.creds.lock().unwrap().clone())
        }

        fn lock(&self, _: Options, done: Completion<()>) {
            done(None, None)
        }

        fn clean(&self, _: Options, done: Completion<()>) {
            // Never completes
            drop(done);
        }

        fn set_unlock_code(&self, _: String, _: Options, done: Completion<()>) {
            done(json_error(41), None)
        }

        fn unlock_by_code(&self, code: String, _: Options, done: Completion<String>) {
            if code == "1234" {
                done(None, self.creds.lock().unwrap().clone())
            } else {
                done(json_error(21), None)
            }
        }

        fn set_unlock_biometry(&self, _: Options, done: Completion<()>) {
            done(json_error(36), Some(()))
        }

        fn unlock_by_biometry(&self, _: Options, done: Completion<String>) {
            *self.prompt.lock().unwrap() = Some(done);
        }

        fn has_fingerprint_changed(&self, done: Completion<bool>) {
            done(None, None)
        }
    }

    #[tokio::test]
    async fn test_values_and_defaults() {
        let adapter = ErrorFirstAdapter::new(IosLikeModule::default());

        adapter.initial_setup(None).await.unwrap();
        assert_eq!(adapter.read(None).await.unwrap(), None);

        adapter.save(Some("blob".to_string()), None).await.unwrap();
        assert_eq!(adapter.read(None).await.unwrap(), Some("blob".to_string()));
        assert_eq!(
            adapter.unlock_by_code("1234".to_string(), None).await.unwrap(),
            Some("blob".to_string())
        );
        assert!(!adapter.has_fingerprint_changed().await.unwrap());
    }

    #[tokio::test]
    async fn test_error_wins_over_value() {
        let adapter = ErrorFirstAdapter::new(IosLikeModule::default());

        let err = normalize(
            adapter
                .set_unlock_biometry(None, CancellationToken::new())
                .await
                .unwrap_err(),
        );
        assert!(err.is(ErrorCode::FingerprintNotSupported));

        let err = normalize(adapter.unlock_by_code("9999".to_string(), None).await.unwrap_err());
        assert!(err.is(ErrorCode::PincodeCheckFailed));
        assert_eq!(err.message(), Some("failed"));
    }

    #[tokio::test]
    async fn test_cancel_is_modal_no_op() {
        let adapter = std::sync::Arc::new(ErrorFirstAdapter::new(IosLikeModule::default()));
        assert_eq!(adapter.cancel_support(), CancelSupport::Modal);

        let pending = {
            let adapter = adapter.clone();
            tokio::spawn(async move {
                adapter
                    .unlock_by_biometry(None, CancellationToken::new())
                    .await
            })
        };
        while adapter.module().prompt.lock().unwrap().is_none() {
            tokio::task::yield_now().await;
        }

        adapter.cancel_biometry(None).await.unwrap();
        assert!(!pending.is_finished());

        // The user answers the modal prompt
        let done = adapter.module().prompt.lock().unwrap().take().unwrap();
        done(None, Some("blob".to_string()));
        assert_eq!(pending.await.unwrap().unwrap(), Some("blob".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_completion_is_undefined() {
        let adapter = ErrorFirstAdapter::new(IosLikeModule::default());

        let err = normalize(adapter.clean(None).await.unwrap_err());
        assert!(err.is(ErrorCode::Undefined));
        assert_eq!(err.message(), Some("native completion dropped"));
    }
}
