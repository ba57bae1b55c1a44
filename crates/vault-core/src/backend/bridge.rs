//! One-shot bridge from native completions to futures

use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::warn;

use super::BackendResult;
use crate::error::{ErrorCode, VaultError};
use crate::normalize::RawError;

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<BackendResult<T>>>>>;

/// Shared sending side. The first completion wins; later ones are dropped
/// with a warning.
pub(crate) struct Settler<T> {
    slot: Slot<T>,
    operation: &'static str,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            operation: self.operation,
        }
    }
}

impl<T> Settler<T> {
    pub(crate) fn settle(&self, result: BackendResult<T>) {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match sender {
            Some(tx) => {
                // The caller may have stopped waiting
                let _ = tx.send(result);
            }
            None => warn!(
                operation = self.operation,
                "native module completed more than once; ignoring"
            ),
        }
    }
}

pub(crate) fn channel<T>(
    operation: &'static str,
) -> (Settler<T>, oneshot::Receiver<BackendResult<T>>) {
    let (tx, rx) = oneshot::channel();
    let settler = Settler {
        slot: Arc::new(Mutex::new(Some(tx))),
        operation,
    };
    (settler, rx)
}

/// Await the native completion
pub(crate) async fn wait<T>(
    rx: oneshot::Receiver<BackendResult<T>>,
    operation: &'static str,
) -> BackendResult<T> {
    match rx.await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, "native module dropped its completion");
            Err(RawError::from(
                VaultError::new(ErrorCode::Undefined).with_message("native completion dropped"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    #[tokio::test]
    async fn test_first_completion_wins() {
        let (settler, rx) = channel::<u32>("read");
        let other = settler.clone();

        settler.settle(Ok(1));
        other.settle(Ok(2));

        assert_eq!(wait(rx, "read").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_completion() {
        let (settler, rx) = channel::<u32>("lock");
        drop(settler);

        let err = normalize(wait(rx, "lock").await.unwrap_err());
        assert!(err.is(ErrorCode::Undefined));
        assert_eq!(err.message(), Some("native completion dropped"));
    }
}
