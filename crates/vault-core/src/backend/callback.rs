//! Adapter for modules that report through separate error and success
//! callbacks

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::bridge;
use super::{BackendResult, CancelSupport, Options, VaultBackend};
use crate::normalize::RawError;

pub type ErrorCallback = Box<dyn FnOnce(RawError) + Send>;
pub type SuccessCallback<T> = Box<dyn FnOnce(T) + Send>;

/// Native module with dual callbacks.
///
/// Exactly one of the two callbacks should be invoked, once. The adapter
/// tolerates modules that break this: extra invocations are ignored and a
/// module that drops both reports `UNDEFINED`.
pub trait CallbackModule: Send + Sync {
    fn initial_setup(&self, options: Options, on_error: ErrorCallback, on_success: SuccessCallback<()>);

    fn save(
        &self,
        creds: Option<String>,
        options: Options,
        on_error: ErrorCallback,
        on_success: SuccessCallback<()>,
    );

    fn read(&self, options: Options, on_error: ErrorCallback, on_success: SuccessCallback<Option<String>>);

    fn lock(&self, options: Options, on_error: ErrorCallback, on_success: SuccessCallback<()>);

    fn clean(&self, options: Options, on_error: ErrorCallback, on_success: SuccessCallback<()>);

    fn set_unlock_code(
        &self,
        code: String,
        options: Options,
        on_error: ErrorCallback,
        on_success: SuccessCallback<()>,
    );

    fn unlock_by_code(
        &self,
        code: String,
        options: Options,
        on_error: ErrorCallback,
        on_success: SuccessCallback<Option<String>>,
    );

    fn set_unlock_biometry(&self, options: Options, on_error: ErrorCallback, on_success: SuccessCallback<()>);

    fn unlock_by_biometry(
        &self,
        options: Options,
        on_error: ErrorCallback,
        on_success: SuccessCallback<Option<String>>,
    );

    fn cancel_biometry(&self, options: Options, on_error: ErrorCallback, on_success: SuccessCallback<()>);

    fn has_fingerprint_changed(&self, on_error: ErrorCallback, on_success: SuccessCallback<bool>);
}

/// [`VaultBackend`] over a [`CallbackModule`]; prompts are abortable
pub struct CallbackAdapter<M> {
    module: M,
}

impl<M: CallbackModule> CallbackAdapter<M> {
    pub fn new(module: M) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &M {
        &self.module
    }
}

type Callbacks<T> = (ErrorCallback, SuccessCallback<T>, oneshot::Receiver<BackendResult<T>>);

fn callbacks<T: Send + 'static>(operation: &'static str) -> Callbacks<T> {
    let (settler, rx) = bridge::channel(operation);
    let on_error: ErrorCallback = {
        let settler = settler.clone();
        Box::new(move |err| settler.settle(Err(err)))
    };
    let on_success: SuccessCallback<T> = Box::new(move |value| settler.settle(Ok(value)));
    (on_error, on_success, rx)
}

async fn call<T, F>(operation: &'static str, invoke: F) -> BackendResult<T>
where
    T: Send + 'static,
    F: FnOnce(ErrorCallback, SuccessCallback<T>) + Send,
{
    let (on_error, on_success, rx) = callbacks(operation);
    invoke(on_error, on_success);
    bridge::wait(rx, operation).await
}

impl<M: CallbackModule> CallbackAdapter<M> {
    /// Open a prompt through `invoke`.
    ///
    /// A cancel that arrived before the module registered its prompt found
    /// nothing to abort, so it is sent to the module again once the prompt
    /// is open.
    async fn prompt<T, F>(
        &self,
        operation: &'static str,
        cancel: CancellationToken,
        invoke: F,
    ) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(ErrorCallback, SuccessCallback<T>) + Send,
    {
        let (on_error, on_success, rx) = callbacks(operation);
        invoke(on_error, on_success);

        if cancel.is_cancelled() {
            debug!(operation, "Cancelled before the prompt opened; cancelling again");
            self.module.cancel_biometry(None, Box::new(|_| {}), Box::new(|()| {}));
        }
        bridge::wait(rx, operation).await
    }
}

#[async_trait]
impl<M: CallbackModule> VaultBackend for CallbackAdapter<M> {
    async fn initial_setup(&self, options: Options) -> BackendResult<()> {
        call("initial_setup", |err, ok| self.module.initial_setup(options, err, ok)).await
    }

    async fn save(&self, creds: Option<String>, options: Options) -> BackendResult<()> {
        call("save", |err, ok| self.module.save(creds, options, err, ok)).await
    }

    async fn read(&self, options: Options) -> BackendResult<Option<String>> {
        call("read", |err, ok| self.module.read(options, err, ok)).await
    }

    async fn lock(&self, options: Options) -> BackendResult<()> {
        call("lock", |err, ok| self.module.lock(options, err, ok)).await
    }

    async fn clean(&self, options: Options) -> BackendResult<()> {
        call("clean", |err, ok| self.module.clean(options, err, ok)).await
    }

    async fn set_unlock_code(&self, code: String, options: Options) -> BackendResult<()> {
        call("set_unlock_code", |err, ok| {
            self.module.set_unlock_code(code, options, err, ok)
        })
        .await
    }

    async fn unlock_by_code(&self, code: String, options: Options) -> BackendResult<Option<String>> {
        call("unlock_by_code", |err, ok| {
            self.module.unlock_by_code(code, options, err, ok)
        })
        .await
    }

    async fn set_unlock_biometry(&self, options: Options, cancel: CancellationToken) -> BackendResult<()> {
        self.prompt("set_unlock_biometry", cancel, |err, ok| {
            self.module.set_unlock_biometry(options, err, ok)
        })
        .await
    }

    async fn unlock_by_biometry(
        &self,
        options: Options,
        cancel: CancellationToken,
    ) -> BackendResult<Option<String>> {
        self.prompt("unlock_by_biometry", cancel, |err, ok| {
            self.module.unlock_by_biometry(options, err, ok)
        })
        .await
    }

    async fn cancel_biometry(&self, options: Options) -> BackendResult<()> {
        call("cancel_biometry", |err, ok| {
            self.module.cancel_biometry(options, err, ok)
        })
        .await
    }

    async fn has_fingerprint_changed(&self) -> BackendResult<bool> {
        call("has_fingerprint_changed", |err, ok| {
            self.module.has_fingerprint_changed(err, ok)
        })
        .await
    }

    fn cancel_support(&self) -> CancelSupport {
        CancelSupport::Abortable
    }

    fn backend_name(&self) -> &'static str {
        "callback module"
    }
}
