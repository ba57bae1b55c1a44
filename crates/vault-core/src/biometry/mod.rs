//! Biometric sensor abstraction
//!
//! The software vault never sees fingerprints; it asks a [`BiometricSensor`]
//! to run a prompt and, on success, receives the key material the sensor
//! guards for the current enrollment. Re-enrolling invalidates that key.

mod simulated;

pub use simulated::{SimulatedSensor, Touch};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::crypto::VaultKey;

/// Whether the sensor can be used at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SensorAvailability {
    Available,
    NoHardware,
    NotEnrolled,
}

/// Text shown by the platform prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub negative_text: String,
}

/// How a prompt ended
#[derive(Debug)]
pub enum SensorOutcome {
    /// Accepted; carries the key bound to the current enrollment
    Authenticated(VaultKey),
    /// A read that did not match
    Rejected,
    /// Dismissed, by the user or through the cancel token
    Cancelled { by_user: bool },
    /// The sensor refuses further reads
    LockedOut { permanent: bool },
}

#[async_trait]
pub trait BiometricSensor: Send + Sync {
    fn availability(&self) -> SensorAvailability;

    /// Identifier of the current enrollment set; changes on re-enrollment
    fn enrollment_id(&self) -> Option<String>;

    /// Run one prompt. Must settle with `Cancelled { by_user: false }`
    /// once `cancel` fires.
    async fn authenticate(&self, prompt: &PromptInfo, cancel: CancellationToken) -> SensorOutcome;

    fn sensor_name(&self) -> &'static str;
}

/// Sensor for hosts without biometric hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSensor;

#[async_trait]
impl BiometricSensor for NoSensor {
    fn availability(&self) -> SensorAvailability {
        SensorAvailability::NoHardware
    }

    fn enrollment_id(&self) -> Option<String> {
        None
    }

    async fn authenticate(&self, _prompt: &PromptInfo, _cancel: CancellationToken) -> SensorOutcome {
        SensorOutcome::LockedOut { permanent: true }
    }

    fn sensor_name(&self) -> &'static str {
        "none"
    }
}
