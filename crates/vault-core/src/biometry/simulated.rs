//! Scripted sensor for tests and demos

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::{BiometricSensor, PromptInfo, SensorAvailability, SensorOutcome};
use crate::crypto::VaultKey;

/// What the simulated user does when the next prompt appears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    Accept,
    Reject,
    /// Keep the prompt open until it is cancelled
    Hold,
    UserCancel,
    Lockout { permanent: bool },
}

struct Enrollment {
    id: String,
    key: VaultKey,
}

struct SensorState {
    has_hardware: bool,
    enrollment: Option<Enrollment>,
    script: VecDeque<Touch>,
    prompts: Vec<PromptInfo>,
}

/// Biometric sensor driven by a queue of [`Touch`]es.
///
/// An empty queue accepts.
pub struct SimulatedSensor {
    state: Mutex<SensorState>,
    prompt_shown: Notify,
}

impl SimulatedSensor {
    fn with_state(has_hardware: bool, enrolled: bool) -> Self {
        Self {
            state: Mutex::new(SensorState {
                has_hardware,
                enrollment: enrolled.then(new_enrollment),
                script: VecDeque::new(),
                prompts: Vec::new(),
            }),
            prompt_shown: Notify::new(),
        }
    }

    /// Sensor with one enrolled finger
    pub fn enrolled() -> Self {
        Self::with_state(true, true)
    }

    pub fn without_hardware() -> Self {
        Self::with_state(false, false)
    }

    pub fn without_enrollment() -> Self {
        Self::with_state(true, false)
    }

    /// Queue the response to a future prompt
    pub fn push(&self, touch: Touch) {
        self.lock_state().script.push_back(touch);
    }

    /// Replace the enrollment set, invalidating the previous key
    pub fn re_enroll(&self) {
        let mut state = self.lock_state();
        state.has_hardware = true;
        state.enrollment = Some(new_enrollment());
    }

    /// Remove every enrolled finger
    pub fn unenroll(&self) {
        self.lock_state().enrollment = None;
    }

    /// Prompts shown so far, oldest first
    pub fn prompts_shown(&self) -> Vec<PromptInfo> {
        self.lock_state().prompts.clone()
    }

    /// Wait until `count` prompts have been shown in total
    pub async fn wait_for_prompts(&self, count: usize) {
        loop {
            let shown = self.prompt_shown.notified();
            if self.lock_state().prompts.len() >= count {
                return;
            }
            shown.await;
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SensorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn new_enrollment() -> Enrollment {
    Enrollment {
        id: Uuid::new_v4().to_string(),
        key: VaultKey::generate(),
    }
}

#[async_trait]
impl BiometricSensor for SimulatedSensor {
    fn availability(&self) -> SensorAvailability {
        let state = self.lock_state();
        match (state.has_hardware, state.enrollment.is_some()) {
            (false, _) => SensorAvailability::NoHardware,
            (true, false) => SensorAvailability::NotEnrolled,
            (true, true) => SensorAvailability::Available,
        }
    }

    fn enrollment_id(&self) -> Option<String> {
        self.lock_state().enrollment.as_ref().map(|e| e.id.clone())
    }

    async fn authenticate(&self, prompt: &PromptInfo, cancel: CancellationToken) -> SensorOutcome {
        let (touch, key) = {
            let mut state = self.lock_state();
            state.prompts.push(prompt.clone());
            let touch = state.script.pop_front().unwrap_or(Touch::Accept);
            (touch, state.enrollment.as_ref().map(|e| e.key.clone()))
        };
        self.prompt_shown.notify_waiters();
        debug!(?touch, title = %prompt.title, "simulated prompt shown");

        if cancel.is_cancelled() {
            return SensorOutcome::Cancelled { by_user: false };
        }

        match touch {
            Touch::Accept => match key {
                Some(key) => SensorOutcome::Authenticated(key),
                None => SensorOutcome::Rejected,
            },
            Touch::Reject => SensorOutcome::Rejected,
            Touch::Hold => {
                cancel.cancelled().await;
                SensorOutcome::Cancelled { by_user: false }
            }
            Touch::UserCancel => SensorOutcome::Cancelled { by_user: true },
            Touch::Lockout { permanent } => SensorOutcome::LockedOut { permanent },
        }
    }

    fn sensor_name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> PromptInfo {
        PromptInfo {
            title: "Unlock".to_string(),
            subtitle: None,
            negative_text: "Cancel".to_string(),
        }
    }

    #[test]
    fn test_availability() {
        assert_eq!(
            SimulatedSensor::enrolled().availability(),
            SensorAvailability::Available
        );
        assert_eq!(
            SimulatedSensor::without_hardware().availability(),
            SensorAvailability::NoHardware
        );
        assert_eq!(
            SimulatedSensor::without_enrollment().availability(),
            SensorAvailability::NotEnrolled
        );
    }

    #[tokio::test]
    async fn test_key_is_stable_until_re_enrollment() {
        let sensor = SimulatedSensor::enrolled();
        let first_id = sensor.enrollment_id();

        let SensorOutcome::Authenticated(a) = sensor.authenticate(&prompt(), CancellationToken::new()).await else {
            panic!("expected authentication");
        };
        let SensorOutcome::Authenticated(b) = sensor.authenticate(&prompt(), CancellationToken::new()).await else {
            panic!("expected authentication");
        };
        assert_eq!(a, b);

        sensor.re_enroll();
        assert_ne!(sensor.enrollment_id(), first_id);
        let SensorOutcome::Authenticated(c) = sensor.authenticate(&prompt(), CancellationToken::new()).await else {
            panic!("expected authentication");
        };
        assert_ne!(a, c);
        assert_eq!(sensor.prompts_shown().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let sensor = SimulatedSensor::enrolled();
        sensor.push(Touch::Reject);
        sensor.push(Touch::UserCancel);
        sensor.push(Touch::Lockout { permanent: true });

        let token = CancellationToken::new();
        assert!(matches!(
            sensor.authenticate(&prompt(), token.clone()).await,
            SensorOutcome::Rejected
        ));
        assert!(matches!(
            sensor.authenticate(&prompt(), token.clone()).await,
            SensorOutcome::Cancelled { by_user: true }
        ));
        assert!(matches!(
            sensor.authenticate(&prompt(), token).await,
            SensorOutcome::LockedOut { permanent: true }
        ));
    }

    #[tokio::test]
    async fn test_hold_until_cancelled() {
        let sensor = std::sync::Arc::new(SimulatedSensor::enrolled());
        sensor.push(Touch::Hold);

        let token = CancellationToken::new();
        let task = {
            let sensor = sensor.clone();
            let token = token.clone();
            tokio::spawn(async move { sensor.authenticate(&prompt(), token).await })
        };

        sensor.wait_for_prompts(1).await;
        token.cancel();

        assert!(matches!(
            task.await.unwrap(),
            SensorOutcome::Cancelled { by_user: false }
        ));
    }
}
